//! The window table and the handful of `user32` entry points that touch
//! it directly (spec.md §4.10). `CreateWindowExA` lazily connects to the
//! compositor; if that never answers, the window keeps a local pixel
//! buffer instead, so the rest of this runtime never has to know which
//! one backs a given `HWND`.

use std::ffi::CStr;
use std::os::raw::c_char;
use std::sync::Mutex;

use crate::error::{set_last_error, Win32Error};
use crate::handle::HandleTable;
use crate::types::{
    BOOL, DWORD, FALSE, HDC, HINSTANCE, HWND, TRUE, WndProc, GWL_EXSTYLE, GWL_STYLE, GWL_USERDATA, GWL_WNDPROC,
    SM_CXSCREEN, SM_CYSCREEN,
};

pub(crate) enum PixelBuffer {
    Compositor(citc_client::Surface),
    Local { pixels: Vec<u32>, width: u32, height: u32 },
}

impl PixelBuffer {
    fn dims(&self) -> (u32, u32) {
        match self {
            PixelBuffer::Compositor(s) => (s.width, s.height),
            PixelBuffer::Local { width, height, .. } => (*width, *height),
        }
    }

    pub(crate) fn as_mut_u32_slice(&mut self) -> &mut [u32] {
        match self {
            PixelBuffer::Compositor(s) => {
                let bytes = s.pixels_mut();
                unsafe { std::slice::from_raw_parts_mut(bytes.as_mut_ptr() as *mut u32, bytes.len() / 4) }
            }
            PixelBuffer::Local { pixels, .. } => pixels,
        }
    }
}

pub(crate) struct Window {
    pub class_name: String,
    pub wndproc: WndProc,
    pub hinstance: HINSTANCE,
    pub style: DWORD,
    pub exstyle: DWORD,
    pub title: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub user_data: isize,
    pub needs_paint: bool,
    pub visible: bool,
    pub buffer: PixelBuffer,
}

static WINDOWS: Mutex<Option<HandleTable<Window>>> = Mutex::new(None);
static FOCUSED: Mutex<HWND> = Mutex::new(0);

fn with_windows<R>(f: impl FnOnce(&mut HandleTable<Window>) -> R) -> R {
    let mut guard = WINDOWS.lock().unwrap();
    let table = guard.get_or_insert_with(HandleTable::new);
    f(table)
}

pub(crate) fn with_window<R>(hwnd: HWND, f: impl FnOnce(&mut Window) -> R) -> Option<R> {
    with_windows(|t| t.get_mut(hwnd).map(f))
}

pub(crate) fn wndproc_of(hwnd: HWND) -> Option<WndProc> {
    with_windows(|t| t.get(hwnd).map(|w| w.wndproc))
}

fn read_cstr(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string()) }
}

/// # Safety
/// `class_name` must be NUL-terminated if non-null; `window_name`, if
/// non-null, must also be NUL-terminated.
pub unsafe extern "win64" fn create_window_ex_a(
    exstyle: DWORD,
    class_name: *const c_char,
    window_name: *const c_char,
    style: DWORD,
    x: i32,
    y: i32,
    width: i32,
    height: i32,
    _parent: HWND,
    _menu: usize,
    hinstance: HINSTANCE,
    _param: usize,
) -> HWND {
    let Some(class_name) = read_cstr(class_name) else {
        set_last_error(Win32Error::InvalidParameter);
        return 0;
    };
    let Some(entry) = crate::user32::wndclass::lookup(&class_name) else {
        set_last_error(Win32Error::ClassDoesNotExist);
        return 0;
    };
    let title = read_cstr(window_name).unwrap_or_default();
    let w = width.max(1) as u32;
    let h = height.max(1) as u32;

    let buffer = if crate::compositor::ensure_connected() {
        match crate::compositor::with_connection(|conn| conn.create_surface(x, y, w, h, &title)) {
            Some(Ok(surface)) => Some(PixelBuffer::Compositor(surface)),
            _ => None,
        }
    } else {
        None
    };
    let buffer = buffer.unwrap_or_else(|| PixelBuffer::Local { pixels: vec![0u32; (w * h) as usize], width: w, height: h });

    let surface_id = if let PixelBuffer::Compositor(s) = &buffer { Some(s.id) } else { None };

    let window = Window {
        class_name,
        wndproc: entry.wndproc,
        hinstance: entry.hinstance,
        style,
        exstyle,
        title,
        x,
        y,
        width: w,
        height: h,
        user_data: 0,
        needs_paint: true,
        visible: false,
        buffer,
    };
    let hwnd = with_windows(|t| t.insert(window));
    if hinstance != 0 {
        with_window(hwnd, |win| win.hinstance = hinstance);
    }
    if let Some(id) = surface_id {
        crate::compositor::register_surface(id, hwnd);
    }
    crate::user32::message::invoke_wndproc(hwnd, crate::types::WM_CREATE, 0, 0);
    hwnd
}

pub extern "win64" fn destroy_window(hwnd: HWND) -> BOOL {
    let existed = with_windows(|t| t.remove(hwnd).is_some());
    if existed {
        crate::user32::message::invoke_wndproc(hwnd, crate::types::WM_DESTROY, 0, 0);
        let mut focused = FOCUSED.lock().unwrap();
        if *focused == hwnd {
            *focused = 0;
        }
        TRUE
    } else {
        set_last_error(Win32Error::InvalidHandle);
        FALSE
    }
}

pub const SW_HIDE: i32 = 0;
pub const SW_SHOW: i32 = 5;
pub const SW_SHOWNORMAL: i32 = 1;

pub extern "win64" fn show_window(hwnd: HWND, cmd: i32) -> BOOL {
    with_window(hwnd, |w| {
        let was_visible = w.visible;
        w.visible = cmd != SW_HIDE;
        if w.visible && !was_visible {
            w.needs_paint = true;
        }
        was_visible as BOOL
    })
    .unwrap_or(FALSE)
}

pub extern "win64" fn update_window(hwnd: HWND) -> BOOL {
    let needs = with_window(hwnd, |w| std::mem::take(&mut w.needs_paint));
    match needs {
        Some(true) => {
            crate::user32::message::invoke_wndproc(hwnd, crate::types::WM_PAINT, 0, 0);
            TRUE
        }
        Some(false) => TRUE,
        None => FALSE,
    }
}

pub extern "win64" fn move_window(hwnd: HWND, x: i32, y: i32, width: i32, height: i32, repaint: BOOL) -> BOOL {
    with_window(hwnd, |w| {
        w.x = x;
        w.y = y;
        let (old_w, old_h) = w.buffer.dims();
        let new_w = width.max(1) as u32;
        let new_h = height.max(1) as u32;
        if new_w != old_w || new_h != old_h {
            if let PixelBuffer::Local { pixels, width, height } = &mut w.buffer {
                *pixels = vec![0u32; (new_w * new_h) as usize];
                *width = new_w;
                *height = new_h;
            }
            w.width = new_w;
            w.height = new_h;
        }
        if repaint != FALSE {
            w.needs_paint = true;
        }
        TRUE
    })
    .unwrap_or(FALSE)
}

/// # Safety
/// `text` must point at a NUL-terminated byte string.
pub unsafe extern "win64" fn set_window_text_a(hwnd: HWND, text: *const c_char) -> BOOL {
    let Some(text) = read_cstr(text) else { return FALSE };
    with_window(hwnd, |w| {
        w.title = text;
        TRUE
    })
    .unwrap_or(FALSE)
}

/// # Safety
/// `buf` must be writable for `max_count` bytes (including the NUL).
pub unsafe extern "win64" fn get_window_text_a(hwnd: HWND, buf: *mut c_char, max_count: i32) -> i32 {
    let Some(title) = with_window(hwnd, |w| w.title.clone()) else { return 0 };
    let max = max_count.max(0) as usize;
    if max == 0 {
        return 0;
    }
    let bytes = title.as_bytes();
    let n = bytes.len().min(max - 1);
    std::ptr::copy_nonoverlapping(bytes.as_ptr() as *const c_char, buf, n);
    *buf.add(n) = 0;
    n as i32
}

pub extern "win64" fn get_window_long_a(hwnd: HWND, index: i32) -> isize {
    with_window(hwnd, |w| match index {
        GWL_STYLE => w.style as isize,
        GWL_EXSTYLE => w.exstyle as isize,
        GWL_USERDATA => w.user_data,
        GWL_WNDPROC => w.wndproc as usize as isize,
        _ => 0,
    })
    .unwrap_or(0)
}

pub extern "win64" fn set_window_long_a(hwnd: HWND, index: i32, new_value: isize) -> isize {
    with_window(hwnd, |w| {
        let prev = match index {
            GWL_STYLE => w.style as isize,
            GWL_EXSTYLE => w.exstyle as isize,
            GWL_USERDATA => w.user_data,
            GWL_WNDPROC => w.wndproc as usize as isize,
            _ => 0,
        };
        match index {
            GWL_STYLE => w.style = new_value as DWORD,
            GWL_EXSTYLE => w.exstyle = new_value as DWORD,
            GWL_USERDATA => w.user_data = new_value,
            GWL_WNDPROC => w.wndproc = unsafe { std::mem::transmute::<usize, WndProc>(new_value as usize) },
            _ => {}
        }
        prev
    })
    .unwrap_or(0)
}

pub extern "win64" fn get_focus() -> HWND {
    *FOCUSED.lock().unwrap()
}

pub extern "win64" fn set_focus(hwnd: HWND) -> HWND {
    let mut focused = FOCUSED.lock().unwrap();
    let prev = *focused;
    if with_windows(|t| t.contains(hwnd)) || hwnd == 0 {
        *focused = hwnd;
    }
    prev
}

pub extern "win64" fn get_system_metrics(index: i32) -> i32 {
    let (w, h) = crate::compositor::with_connection(|c| (c.screen_w, c.screen_h)).unwrap_or((1920, 1080));
    match index {
        SM_CXSCREEN => w as i32,
        SM_CYSCREEN => h as i32,
        _ => 0,
    }
}

/// # Safety
/// `hdc` (if this succeeds) is handed back bound to the window's current
/// pixel buffer and must be released through `ReleaseDC`.
pub(crate) fn create_paint_dc(hwnd: HWND) -> Option<HDC> {
    with_window(hwnd, |w| {
        let (width, height) = w.buffer.dims();
        let ptr = w.buffer.as_mut_u32_slice().as_mut_ptr();
        crate::gdi32::create_dc_for_buffer(ptr, width, height)
    })
}

pub(crate) fn mark_needs_paint(hwnd: HWND) -> bool {
    with_window(hwnd, |w| w.needs_paint = true).is_some()
}

pub(crate) fn any_needing_paint() -> Option<HWND> {
    with_windows(|t| {
        // `HandleTable` doesn't expose iteration; a window runtime this
        // small can afford a linear probe over a bounded handle range
        // instead of adding one just for this.
        (1..10_000).find(|&h| t.get(h).map(|w| w.visible && w.needs_paint).unwrap_or(false))
    })
}

/// Blits a D3D back buffer into a window's pixel buffer (spec.md §4.12's
/// "Present" note) and marks the window for repaint. Sizes need not
/// match: excess rows/columns on either side are left untouched rather
/// than scaled, since no guest in this runtime resizes its swap chain
/// mid-frame.
pub(crate) fn present_d3d_frame(hwnd: HWND, src: &[u32], src_w: u32, src_h: u32) -> bool {
    let blitted = with_window(hwnd, |w| {
        let (dst_w, dst_h) = w.buffer.dims();
        let dst = w.buffer.as_mut_u32_slice();
        let w_copy = src_w.min(dst_w);
        let h_copy = src_h.min(dst_h);
        for y in 0..h_copy {
            let src_row = &src[(y * src_w) as usize..(y * src_w + w_copy) as usize];
            let dst_off = (y * dst_w) as usize;
            dst[dst_off..dst_off + w_copy as usize].copy_from_slice(src_row);
        }
        w.needs_paint = true;
    })
    .is_some();
    if blitted {
        commit_if_compositor(hwnd);
    }
    blitted
}

pub(crate) fn commit_if_compositor(hwnd: HWND) {
    with_window(hwnd, |w| {
        if let PixelBuffer::Compositor(surface) = &w.buffer {
            let id = surface.id;
            crate::compositor::with_connection(|conn| {
                let _ = conn.commit(id);
            });
        }
    });
}

/// Print-only (spec.md §4.10): there is no modal UI in this runtime, so
/// the message just goes to the log and the button the caller asked for
/// is reported pressed.
///
/// # Safety
/// `text` and `caption`, if non-null, must be NUL-terminated.
pub unsafe extern "win64" fn message_box_a(_hwnd: HWND, text: *const c_char, caption: *const c_char, _kind: u32) -> i32 {
    let text = read_cstr(text).unwrap_or_default();
    let caption = read_cstr(caption).unwrap_or_default();
    log::info!("MessageBoxA[{caption}]: {text}");
    const IDOK: i32 = 1;
    IDOK
}

/// Cursors and icons are opaque tokens in this runtime; the resource id
/// itself (or, for a named resource, its address) serves as the handle
/// since nothing ever dereferences it.
///
/// # Safety
/// `name`, if it does not fit in a `u16` (i.e. is a real pointer rather
/// than an `MAKEINTRESOURCE` id), must be a NUL-terminated string.
pub unsafe extern "win64" fn load_cursor_a(_hinstance: HINSTANCE, name: usize) -> HANDLE_TOKEN {
    name
}

/// # Safety
/// Same contract as `load_cursor_a`.
pub unsafe extern "win64" fn load_icon_a(_hinstance: HINSTANCE, name: usize) -> HANDLE_TOKEN {
    name
}

type HANDLE_TOKEN = usize;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn focus_requires_a_live_window() {
        assert_eq!(set_focus(0), 0);
        assert_eq!(get_focus(), 0);
        assert_eq!(set_focus(12345), 0);
        assert_eq!(get_focus(), 0);
    }
}
