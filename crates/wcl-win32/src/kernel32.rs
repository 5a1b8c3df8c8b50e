//! kernel32 surface: just enough to boot a minimal `.exe` (spec.md §4.10):
//! process exit, standard handles, file I/O, heap allocation, module
//! handle queries, TLS slots, critical sections, thread creation.
//!
//! Handles returned to guest code are either real heap pointers (from
//! `HeapAlloc`, which the guest dereferences directly) or small opaque
//! indices (file/thread handles, looked back up through `HandleTable`);
//! `CRITICAL_SECTION`, by contrast, embeds its lock word directly in
//! guest memory so `EnterCriticalSection` never needs a side table.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::Mutex;

use crate::types::{BOOL, DWORD, HANDLE, HMODULE, TRUE};

pub const STD_INPUT_HANDLE: i32 = -10;
pub const STD_OUTPUT_HANDLE: i32 = -11;
pub const STD_ERROR_HANDLE: i32 = -12;
pub const INVALID_HANDLE_VALUE: HANDLE = usize::MAX;

const HEAP_ZERO_MEMORY: DWORD = 0x0000_0008;

enum StdStream {
    Stdin,
    Stdout,
    Stderr,
    File(std::fs::File),
}

static FILES: Mutex<Option<HandleTableCell>> = Mutex::new(None);

struct HandleTableCell {
    table: crate::handle::HandleTable<StdStream>,
}

fn with_files<R>(f: impl FnOnce(&mut crate::handle::HandleTable<StdStream>) -> R) -> R {
    let mut guard = FILES.lock().unwrap();
    let cell = guard.get_or_insert_with(|| HandleTableCell { table: crate::handle::HandleTable::new() });
    f(&mut cell.table)
}

/// Base module handle returned for the main image; there is no second
/// module to distinguish it from since `wcl-win32` never loads a second
/// PE.
const MAIN_MODULE: HMODULE = 0x0040_0000;

static NEXT_TLS_SLOT: AtomicU32 = AtomicU32::new(0);

thread_local! {
    static TLS: RefCell<HashMap<u32, usize>> = RefCell::new(HashMap::new());
}

pub extern "win64" fn exit_process(code: u32) -> ! {
    log::info!("ExitProcess({code})");
    std::process::exit(code as i32)
}

pub extern "win64" fn get_std_handle(which: i32) -> HANDLE {
    match which {
        STD_INPUT_HANDLE => with_files(|t| t.insert(StdStream::Stdin)),
        STD_OUTPUT_HANDLE => with_files(|t| t.insert(StdStream::Stdout)),
        STD_ERROR_HANDLE => with_files(|t| t.insert(StdStream::Stderr)),
        _ => INVALID_HANDLE_VALUE,
    }
}

/// # Safety
/// `path` must point at a NUL-terminated byte string readable in the
/// guest's address space.
pub unsafe extern "win64" fn create_file_a(
    path: *const c_char,
    _desired_access: u32,
    _share_mode: u32,
    _security_attrs: usize,
    creation_disposition: u32,
    _flags_and_attrs: u32,
    _template_file: HANDLE,
) -> HANDLE {
    const OPEN_EXISTING: u32 = 3;
    const CREATE_ALWAYS: u32 = 2;
    let Some(name) = CStr::from_ptr(path).to_str().ok() else { return INVALID_HANDLE_VALUE };
    let result = if creation_disposition == OPEN_EXISTING {
        std::fs::File::open(name)
    } else if creation_disposition == CREATE_ALWAYS {
        std::fs::File::create(name)
    } else {
        std::fs::OpenOptions::new().read(true).write(true).create(true).open(name)
    };
    match result {
        Ok(file) => with_files(|t| t.insert(StdStream::File(file))),
        Err(e) => {
            log::warn!("CreateFileA({name}) failed: {e}");
            INVALID_HANDLE_VALUE
        }
    }
}

/// # Safety
/// `buf` must point at at least `len` writable bytes in the guest's
/// address space; `bytes_read` (if non-null) must be writable for one
/// `u32`.
pub unsafe extern "win64" fn read_file(
    handle: HANDLE,
    buf: *mut u8,
    len: u32,
    bytes_read: *mut u32,
    _overlapped: usize,
) -> BOOL {
    use std::io::Read;
    let dest = std::slice::from_raw_parts_mut(buf, len as usize);
    let n = with_files(|t| match t.get_mut(handle) {
        Some(StdStream::Stdin) => std::io::stdin().read(dest).unwrap_or(0),
        Some(StdStream::File(f)) => f.read(dest).unwrap_or(0),
        _ => 0,
    });
    if !bytes_read.is_null() {
        *bytes_read = n as u32;
    }
    TRUE
}

/// # Safety
/// `buf` must point at at least `len` readable bytes; `bytes_written`
/// (if non-null) must be writable for one `u32`.
pub unsafe extern "win64" fn write_file(
    handle: HANDLE,
    buf: *const u8,
    len: u32,
    bytes_written: *mut u32,
    _overlapped: usize,
) -> BOOL {
    use std::io::Write;
    let src = std::slice::from_raw_parts(buf, len as usize);
    let n = with_files(|t| match t.get_mut(handle) {
        Some(StdStream::Stdout) => std::io::stdout().write(src).unwrap_or(0),
        Some(StdStream::Stderr) => std::io::stderr().write(src).unwrap_or(0),
        Some(StdStream::File(f)) => f.write(src).unwrap_or(0),
        _ => 0,
    });
    if !bytes_written.is_null() {
        *bytes_written = n as u32;
    }
    TRUE
}

pub extern "win64" fn close_handle(handle: HANDLE) -> BOOL {
    with_files(|t| t.remove(handle).is_some()) as BOOL
}

pub extern "win64" fn get_process_heap() -> HANDLE {
    1
}

/// # Safety
/// The returned pointer, if non-null, is a real `malloc`'d block of
/// `size` bytes the guest now owns; it must eventually reach `HeapFree`
/// exactly once.
pub unsafe extern "win64" fn heap_alloc(_heap: HANDLE, flags: DWORD, size: usize) -> usize {
    let ptr = libc::malloc(size);
    if ptr.is_null() {
        return 0;
    }
    if flags & HEAP_ZERO_MEMORY != 0 {
        std::ptr::write_bytes(ptr as *mut u8, 0, size);
    }
    ptr as usize
}

/// # Safety
/// `ptr` must be exactly a value previously returned by `heap_alloc` (or
/// zero), and must not have already been freed.
pub unsafe extern "win64" fn heap_free(_heap: HANDLE, _flags: DWORD, ptr: usize) -> BOOL {
    if ptr != 0 {
        libc::free(ptr as *mut std::ffi::c_void);
    }
    TRUE
}

/// `GetModuleHandleA(NULL)` only; named lookups of a second module
/// always fail since this runtime never hosts more than one image.
///
/// # Safety
/// `name`, if non-null, must point at a NUL-terminated byte string.
pub unsafe extern "win64" fn get_module_handle_a(name: *const c_char) -> HMODULE {
    if name.is_null() {
        MAIN_MODULE
    } else {
        0
    }
}

pub extern "win64" fn tls_alloc() -> DWORD {
    NEXT_TLS_SLOT.fetch_add(1, Ordering::SeqCst)
}

pub extern "win64" fn tls_get_value(slot: DWORD) -> usize {
    TLS.with(|t| t.borrow().get(&slot).copied().unwrap_or(0))
}

pub extern "win64" fn tls_set_value(slot: DWORD, value: usize) -> BOOL {
    TLS.with(|t| t.borrow_mut().insert(slot, value));
    TRUE
}

pub extern "win64" fn tls_free(_slot: DWORD) -> BOOL {
    TRUE
}

/// Layout matches a real `CRITICAL_SECTION` only in spirit: a single
/// lock word at offset 0, spun on directly in guest memory so no side
/// table is needed.
///
/// # Safety
/// `cs` must point at at least 4 writable bytes.
pub unsafe extern "win64" fn initialize_critical_section(cs: *mut i32) {
    std::ptr::write_volatile(cs, 0);
}

/// # Safety
/// `cs` must be a pointer previously passed to
/// `initialize_critical_section`.
pub unsafe extern "win64" fn enter_critical_section(cs: *mut i32) {
    let word = &*(cs as *const AtomicI32);
    while word.compare_exchange_weak(0, 1, Ordering::Acquire, Ordering::Relaxed).is_err() {
        std::thread::yield_now();
    }
}

/// # Safety
/// `cs` must be held by the calling thread.
pub unsafe extern "win64" fn leave_critical_section(cs: *mut i32) {
    let word = &*(cs as *const AtomicI32);
    word.store(0, Ordering::Release);
}

/// # Safety
/// `cs` must not be entered by any thread when this is called.
pub unsafe extern "win64" fn delete_critical_section(_cs: *mut i32) {}

struct ThreadSlot {
    join: Option<std::thread::JoinHandle<()>>,
}

static THREADS: Mutex<Option<crate::handle::HandleTable<ThreadSlot>>> = Mutex::new(None);

fn with_threads<R>(f: impl FnOnce(&mut crate::handle::HandleTable<ThreadSlot>) -> R) -> R {
    let mut guard = THREADS.lock().unwrap();
    let table = guard.get_or_insert_with(crate::handle::HandleTable::new);
    f(table)
}

/// Invokes `entry(param)` under the Win64 ABI from a freshly spawned
/// native thread, the one-argument sibling of `wcl_pe::call_entry`
/// (which only supports the zero-argument process entry point).
unsafe fn call_one_arg_x86_64(entry: usize, param: usize) -> i32 {
    let result: i64;
    std::arch::asm!(
        "sub rsp, 32",
        "call {entry}",
        "add rsp, 32",
        entry = in(reg) entry,
        in("rcx") param,
        out("rax") result,
        out("rdx") _,
        out("r8") _,
        out("r9") _,
        out("r10") _,
        out("r11") _,
        clobber_abi("C"),
    );
    result as i32
}

/// # Safety
/// `start_address` must point at code mapped executable for the host
/// architecture, matching the `LPTHREAD_START_ROUTINE` signature.
pub unsafe extern "win64" fn create_thread(
    _attrs: usize,
    _stack_size: usize,
    start_address: usize,
    parameter: usize,
    _creation_flags: DWORD,
    thread_id: *mut DWORD,
) -> HANDLE {
    let join = std::thread::spawn(move || {
        let _ = call_one_arg_x86_64(start_address, parameter);
    });
    if !thread_id.is_null() {
        *thread_id = 0;
    }
    with_threads(|t| t.insert(ThreadSlot { join: Some(join) }))
}

pub extern "win64" fn sleep(ms: DWORD) {
    std::thread::sleep(std::time::Duration::from_millis(ms as u64));
}

pub extern "win64" fn get_last_error() -> DWORD {
    crate::error::last_error_code()
}

pub extern "win64" fn set_last_error(code: DWORD) {
    crate::error::set_raw_last_error(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_round_trip_zeroes_on_request() {
        unsafe {
            let ptr = heap_alloc(get_process_heap(), HEAP_ZERO_MEMORY, 64);
            assert_ne!(ptr, 0);
            let slice = std::slice::from_raw_parts(ptr as *const u8, 64);
            assert!(slice.iter().all(|&b| b == 0));
            assert_eq!(heap_free(get_process_heap(), 0, ptr), TRUE);
        }
    }

    #[test]
    fn tls_slots_are_distinct_and_thread_local() {
        let a = tls_alloc();
        let b = tls_alloc();
        assert_ne!(a, b);
        assert_eq!(tls_set_value(a, 42), TRUE);
        assert_eq!(tls_get_value(a), 42);
        assert_eq!(tls_get_value(b), 0);
    }

    #[test]
    fn critical_section_excludes_concurrent_entry() {
        let mut word: i32 = 0;
        let cs = &mut word as *mut i32;
        unsafe {
            initialize_critical_section(cs);
            enter_critical_section(cs);
            leave_critical_section(cs);
            enter_critical_section(cs);
            leave_critical_section(cs);
        }
    }
}
