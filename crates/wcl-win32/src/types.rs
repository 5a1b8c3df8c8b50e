//! Win32 type aliases and wire-compatible structs, in the style of
//! `jo12bar-triangle-from-scratch/src/win32.rs`'s FFI surface — except
//! here the functions behind these types are implemented, not imported.

#![allow(non_camel_case_types)]

pub type BOOL = i32;
pub type DWORD = u32;
pub type WORD = u16;
pub type WPARAM = usize;
pub type LPARAM = isize;
pub type LRESULT = isize;
pub type HANDLE = usize;
pub type HWND = usize;
pub type HDC = usize;
pub type HBRUSH = usize;
pub type HCURSOR = usize;
pub type HICON = usize;
pub type HINSTANCE = usize;
pub type HMODULE = usize;
pub type ATOM = u16;
pub type COLORREF = u32;

pub const TRUE: BOOL = 1;
pub const FALSE: BOOL = 0;
pub const NULL_HANDLE: usize = 0;

/// `WNDPROC`: called back under the Windows ABI, so the caller must
/// re-enter through `wcl_pe::call_entry`-style trampoline, not a direct
/// Rust call.
pub type WndProc = extern "win64" fn(HWND, DWORD, WPARAM, LPARAM) -> LRESULT;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct Msg {
    pub hwnd: HWND,
    pub message: DWORD,
    pub wparam: WPARAM,
    pub lparam: LPARAM,
    pub time: DWORD,
    pub pt: Point,
}

// Window messages actually produced/consumed by this runtime (spec.md §4.10).
pub const WM_NULL: DWORD = 0x0000;
pub const WM_CREATE: DWORD = 0x0001;
pub const WM_DESTROY: DWORD = 0x0002;
pub const WM_MOVE: DWORD = 0x0003;
pub const WM_SIZE: DWORD = 0x0005;
pub const WM_SETFOCUS: DWORD = 0x0007;
pub const WM_KILLFOCUS: DWORD = 0x0008;
pub const WM_PAINT: DWORD = 0x000F;
pub const WM_CLOSE: DWORD = 0x0010;
pub const WM_QUIT: DWORD = 0x0012;
pub const WM_KEYDOWN: DWORD = 0x0100;
pub const WM_KEYUP: DWORD = 0x0101;
pub const WM_CHAR: DWORD = 0x0102;
pub const WM_TIMER: DWORD = 0x0113;
pub const WM_MOUSEMOVE: DWORD = 0x0200;
pub const WM_LBUTTONDOWN: DWORD = 0x0201;
pub const WM_LBUTTONUP: DWORD = 0x0202;
pub const WM_RBUTTONDOWN: DWORD = 0x0204;
pub const WM_RBUTTONUP: DWORD = 0x0205;
pub const WM_USER: DWORD = 0x0400;

pub const GWL_WNDPROC: i32 = -4;
pub const GWL_STYLE: i32 = -16;
pub const GWL_EXSTYLE: i32 = -20;
pub const GWL_USERDATA: i32 = -21;

pub const SM_CXSCREEN: i32 = 0;
pub const SM_CYSCREEN: i32 = 1;
