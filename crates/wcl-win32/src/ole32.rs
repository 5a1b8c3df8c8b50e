//! A minimal COM runtime (spec.md §4.10): `CoInitializeEx`/
//! `CoUninitialize` track a per-thread init flag, `CoCreateInstance`
//! consults a static CLSID registry, `CoTaskMemAlloc/Realloc/Free` wrap
//! the process heap, and the GUID helpers are pure.

use std::cell::Cell;
use std::ffi::c_void;

use crate::types::{BOOL, FALSE, TRUE};

#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

/// The real `CLSID_DirectSound8` value; the only class this registry
/// wires up (spec.md §4.10's "currently only DirectSound8 is wired").
pub const CLSID_DIRECTSOUND8: Guid = Guid {
    data1: 0x3901_CC3F,
    data2: 0x84B5,
    data3: 0x4FA1,
    data4: [0x9C, 0x7B, 0x34, 0x77, 0xC4, 0x9D, 0x1A, 0x94],
};

thread_local! {
    static CO_INITIALIZED: Cell<bool> = Cell::new(false);
}

const S_OK: i32 = 0;
const S_FALSE: i32 = 1;
const E_NOINTERFACE: i32 = -2147467262; // 0x80004002
const E_NOTIMPL: i32 = -2147467263; // 0x80004001

pub extern "win64" fn co_initialize_ex(_reserved: usize, _coinit: u32) -> i32 {
    CO_INITIALIZED.with(|f| {
        if f.get() {
            S_FALSE
        } else {
            f.set(true);
            S_OK
        }
    })
}

pub extern "win64" fn co_uninitialize() {
    CO_INITIALIZED.with(|f| f.set(false));
}

/// # Safety
/// `clsid` must point at a readable `GUID`; `ppv` must be writable for
/// one pointer.
pub unsafe extern "win64" fn co_create_instance(
    clsid: *const Guid,
    _outer: usize,
    _cls_context: u32,
    _iid: *const Guid,
    ppv: *mut usize,
) -> i32 {
    let clsid = *clsid;
    if clsid == CLSID_DIRECTSOUND8 {
        *ppv = crate::dsound::create_directsound8();
        S_OK
    } else {
        *ppv = 0;
        E_NOINTERFACE
    }
}

/// # Safety
/// `ptr` must be a valid allocation size to request from the process
/// heap.
pub unsafe extern "win64" fn co_task_mem_alloc(size: usize) -> usize {
    crate::kernel32::heap_alloc(crate::kernel32::get_process_heap(), 0, size)
}

/// # Safety
/// `ptr` must be exactly a prior `CoTaskMemAlloc`/`CoTaskMemRealloc`
/// result, or zero.
pub unsafe extern "win64" fn co_task_mem_realloc(ptr: usize, size: usize) -> usize {
    let new_ptr = libc::realloc(ptr as *mut c_void, size);
    if new_ptr.is_null() {
        0
    } else {
        new_ptr as usize
    }
}

/// # Safety
/// `ptr` must be exactly a prior `CoTaskMemAlloc`/`CoTaskMemRealloc`
/// result, or zero.
pub unsafe extern "win64" fn co_task_mem_free(ptr: usize) {
    crate::kernel32::heap_free(crate::kernel32::get_process_heap(), 0, ptr);
}

/// # Safety
/// Both pointers must be readable `GUID`s.
pub unsafe extern "win64" fn is_equal_guid(a: *const Guid, b: *const Guid) -> BOOL {
    if *a == *b {
        TRUE
    } else {
        FALSE
    }
}

/// # Safety
/// `guid` must be readable; `out` must have room for the formatted
/// string (39 `u16` code units including the NUL, the real contract's
/// `cchMax`).
pub unsafe extern "win64" fn string_from_guid2(guid: *const Guid, out: *mut u16, _cch_max: i32) -> i32 {
    let g = *guid;
    let text = format!(
        "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
        g.data1, g.data2, g.data3, g.data4[0], g.data4[1], g.data4[2], g.data4[3], g.data4[4], g.data4[5], g.data4[6], g.data4[7]
    );
    let units: Vec<u16> = text.encode_utf16().chain(std::iter::once(0)).collect();
    std::ptr::copy_nonoverlapping(units.as_ptr(), out, units.len());
    units.len() as i32
}

/// Parses only the one CLSID string format this runtime ever needs to
/// round-trip; not a general GUID parser.
///
/// # Safety
/// `text` must point at a NUL-terminated UTF-16 string.
pub unsafe extern "win64" fn clsid_from_string(text: *const u16, clsid: *mut Guid) -> i32 {
    let mut len = 0usize;
    while *text.add(len) != 0 {
        len += 1;
    }
    let s = String::from_utf16_lossy(std::slice::from_raw_parts(text, len));
    let trimmed = s.trim_matches(|c| c == '{' || c == '}');
    let parts: Vec<&str> = trimmed.split('-').collect();
    if parts.len() != 5 {
        return E_NOTIMPL;
    }
    let Ok(data1) = u32::from_str_radix(parts[0], 16) else { return E_NOTIMPL };
    let Ok(data2) = u16::from_str_radix(parts[1], 16) else { return E_NOTIMPL };
    let Ok(data3) = u16::from_str_radix(parts[2], 16) else { return E_NOTIMPL };
    let tail = format!("{}{}", parts[3], parts[4]);
    if tail.len() != 16 {
        return E_NOTIMPL;
    }
    let mut data4 = [0u8; 8];
    for i in 0..8 {
        let Ok(b) = u8::from_str_radix(&tail[i * 2..i * 2 + 2], 16) else { return E_NOTIMPL };
        data4[i] = b;
    }
    *clsid = Guid { data1, data2, data3, data4 };
    S_OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent_and_reports_reentry() {
        assert_eq!(co_initialize_ex(0, 0), S_OK);
        assert_eq!(co_initialize_ex(0, 0), S_FALSE);
        co_uninitialize();
        assert_eq!(co_initialize_ex(0, 0), S_OK);
        co_uninitialize();
    }

    #[test]
    fn guid_round_trips_through_string_form() {
        let mut buf = [0u16; 40];
        unsafe {
            string_from_guid2(&CLSID_DIRECTSOUND8, buf.as_mut_ptr(), 40);
            let mut parsed = Guid { data1: 0, data2: 0, data3: 0, data4: [0; 8] };
            assert_eq!(clsid_from_string(buf.as_ptr(), &mut parsed), S_OK);
            assert_eq!(is_equal_guid(&parsed, &CLSID_DIRECTSOUND8), TRUE);
        }
    }

    #[test]
    fn unknown_clsid_reports_no_interface() {
        let other = Guid { data1: 1, data2: 2, data3: 3, data4: [0; 8] };
        let mut ppv: usize = 0xdead;
        unsafe {
            let hr = co_create_instance(&other, 0, 0, &other, &mut ppv);
            assert_eq!(hr, E_NOINTERFACE);
            assert_eq!(ppv, 0);
        }
    }
}
