//! The `WNDCLASS` table (spec.md §4.10).

use std::collections::HashMap;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::sync::Mutex;

use crate::types::{ATOM, HBRUSH, HCURSOR, HICON, HINSTANCE, WndProc};

#[derive(Clone)]
pub struct WndClassEntry {
    pub wndproc: WndProc,
    pub hinstance: HINSTANCE,
    pub icon: HICON,
    pub cursor: HCURSOR,
    pub background: HBRUSH,
}

static CLASSES: Mutex<Option<HashMap<String, WndClassEntry>>> = Mutex::new(None);

fn with_classes<R>(f: impl FnOnce(&mut HashMap<String, WndClassEntry>) -> R) -> R {
    let mut guard = CLASSES.lock().unwrap();
    let table = guard.get_or_insert_with(HashMap::new);
    f(table)
}

pub(crate) fn lookup(name: &str) -> Option<WndClassEntry> {
    with_classes(|t| t.get(name).cloned())
}

/// Mirrors `WNDCLASSA`'s layout closely enough for the fields this
/// runtime actually reads: style, wndproc, icon/cursor/background,
/// class name, and the owning instance.
#[repr(C)]
pub struct WndClassA {
    pub style: u32,
    pub lpfn_wnd_proc: WndProc,
    pub cb_cls_extra: i32,
    pub cb_wnd_extra: i32,
    pub h_instance: HINSTANCE,
    pub h_icon: HICON,
    pub h_cursor: HCURSOR,
    pub hbr_background: HBRUSH,
    pub lpsz_menu_name: *const c_char,
    pub lpsz_class_name: *const c_char,
}

/// Registering an already-registered class name overwrites the previous
/// entry, matching `ERROR_CLASS_ALREADY_EXISTS` only being returned by
/// the real API when `style` carries `CS_GLOBALCLASS`-adjacent flags this
/// runtime never sets — simpler to just allow re-registration.
///
/// # Safety
/// `wc` must point at a readable `WndClassA` whose `lpsz_class_name`
/// points at a NUL-terminated byte string.
pub unsafe extern "win64" fn register_class_a(wc: *const WndClassA) -> ATOM {
    let wc = &*wc;
    let Some(name) = CStr::from_ptr(wc.lpsz_class_name).to_str().ok() else { return 0 };
    let entry = WndClassEntry {
        wndproc: wc.lpfn_wnd_proc,
        hinstance: wc.h_instance,
        icon: wc.h_icon,
        cursor: wc.h_cursor,
        background: wc.hbr_background,
    };
    with_classes(|t| {
        let is_new = !t.contains_key(name);
        t.insert(name.to_string(), entry);
        is_new
    });
    // A real ATOM is a 16-bit handle identifying the class, not a bool;
    // this runtime never needs to look a class back up by atom, only by
    // name, so any non-zero value serves as "success".
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "win64" fn dummy_wndproc(_hwnd: usize, _msg: u32, _w: usize, _l: isize) -> isize {
        0
    }

    #[test]
    fn registering_twice_overwrites_rather_than_erroring() {
        let name = std::ffi::CString::new("TestWindowClass").unwrap();
        let wc = WndClassA {
            style: 0,
            lpfn_wnd_proc: dummy_wndproc,
            cb_cls_extra: 0,
            cb_wnd_extra: 0,
            h_instance: 0,
            h_icon: 0,
            h_cursor: 0,
            hbr_background: 0,
            lpsz_menu_name: std::ptr::null(),
            lpsz_class_name: name.as_ptr(),
        };
        unsafe {
            assert_ne!(register_class_a(&wc), 0);
            assert_ne!(register_class_a(&wc), 0);
        }
        assert!(lookup("TestWindowClass").is_some());
        assert!(lookup("NoSuchClass").is_none());
    }
}
