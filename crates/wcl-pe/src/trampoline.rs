//! The entry-point trampoline (spec.md §4.9 step 7): invokes loaded
//! machine code under the Windows calling convention on the host
//! architecture. There is no teacher precedent for this — it is the one
//! piece of the loader with no safe Rust equivalent, since it means
//! jumping into code the loader itself wrote into memory.

use crate::error::PeError;

/// Calls `entry` as a zero-argument `mainCRTStartup`-shaped Windows
/// entry point and returns its process exit code.
///
/// # Safety
/// `entry` must point at code mapped executable by a prior successful
/// [`crate::loader::load`], built for the host's actual CPU architecture,
/// and whose imports have all been resolved to valid stub functions.
/// Calling into anything else is undefined behavior.
pub unsafe fn call_entry(entry: usize) -> Result<i32, PeError> {
    #[cfg(target_arch = "x86_64")]
    {
        Ok(call_entry_x86_64(entry))
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        let _ = entry;
        Err(PeError::UnsupportedHostArch)
    }
}

/// Bridges System V (Rust's calling convention on this host) to
/// Microsoft x64: allocates the 32-byte shadow space the Win64 ABI
/// requires above the return address before `call`, then tears it down
/// after. The entry point takes no arguments, so no register shuffling
/// of the first four integer args is needed here, unlike a trampoline for
/// an arbitrary stdcall export.
#[cfg(target_arch = "x86_64")]
unsafe fn call_entry_x86_64(entry: usize) -> i32 {
    let result: i64;
    std::arch::asm!(
        "sub rsp, 32",
        "call {entry}",
        "add rsp, 32",
        entry = in(reg) entry,
        out("rax") result,
        out("rcx") _,
        out("rdx") _,
        out("r8") _,
        out("r9") _,
        out("r10") _,
        out("r11") _,
        clobber_abi("C"),
    );
    result as i32
}
