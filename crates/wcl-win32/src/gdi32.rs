//! The software drawing pipeline behind `HDC` (spec.md §4.10). Every
//! `HDC` this runtime hands out is bound to a window's pixel buffer —
//! there is no abstract device, no printer, no memory DC wrapping
//! another bitmap — matching the one real consumer this runtime has.

use std::sync::Mutex;

use crate::handle::HandleTable;
use crate::types::{BOOL, COLORREF, HBRUSH, HDC, Rect, FALSE, TRUE};

struct Dc {
    pixels: *mut u32,
    width: u32,
    height: u32,
    text_color: COLORREF,
    bk_color: COLORREF,
    bk_mode_opaque: bool,
    selected_brush: HBRUSH,
}

// `Dc::pixels` points into a window's backing buffer, which outlives the
// DC (released well before `DestroyWindow`); the runtime serializes all
// GDI calls through `DC_TABLE`'s mutex so this is never aliased mutably.
unsafe impl Send for Dc {}

static DC_TABLE: Mutex<Option<HandleTable<Dc>>> = Mutex::new(None);
static BRUSH_TABLE: Mutex<Option<HandleTable<COLORREF>>> = Mutex::new(None);

fn with_dcs<R>(f: impl FnOnce(&mut HandleTable<Dc>) -> R) -> R {
    let mut guard = DC_TABLE.lock().unwrap();
    let table = guard.get_or_insert_with(HandleTable::new);
    f(table)
}

fn with_brushes<R>(f: impl FnOnce(&mut HandleTable<COLORREF>) -> R) -> R {
    let mut guard = BRUSH_TABLE.lock().unwrap();
    let table = guard.get_or_insert_with(HandleTable::new);
    f(table)
}

/// Binds a new `HDC` to a window's pixel buffer (`u32`-per-pixel,
/// row-major `ARGB8888`, matching `citc_client::Surface`'s layout). Used
/// internally by `user32::BeginPaint`; not itself part of the public
/// Win32 surface.
pub fn create_dc_for_buffer(pixels: *mut u32, width: u32, height: u32) -> HDC {
    with_dcs(|t| {
        t.insert(Dc {
            pixels,
            width,
            height,
            text_color: 0x00000000,
            bk_color: 0x00FFFFFF,
            bk_mode_opaque: true,
            selected_brush: 0,
        })
    })
}

/// Idempotent: releasing an already-released or unknown `HDC` is not an
/// error.
pub extern "win64" fn release_dc(_hwnd: usize, hdc: HDC) -> i32 {
    with_dcs(|t| t.remove(hdc));
    1
}

pub extern "win64" fn create_solid_brush(color: COLORREF) -> HBRUSH {
    with_brushes(|t| t.insert(color))
}

pub extern "win64" fn select_object(hdc: HDC, object: usize) -> usize {
    with_dcs(|t| match t.get_mut(hdc) {
        Some(dc) => {
            let prev = dc.selected_brush;
            dc.selected_brush = object;
            prev
        }
        None => 0,
    })
}

pub extern "win64" fn set_text_color(hdc: HDC, color: COLORREF) -> COLORREF {
    with_dcs(|t| match t.get_mut(hdc) {
        Some(dc) => {
            let prev = dc.text_color;
            dc.text_color = color;
            prev
        }
        None => 0xFFFF_FFFF,
    })
}

pub extern "win64" fn set_bk_color(hdc: HDC, color: COLORREF) -> COLORREF {
    with_dcs(|t| match t.get_mut(hdc) {
        Some(dc) => {
            let prev = dc.bk_color;
            dc.bk_color = color;
            prev
        }
        None => 0xFFFF_FFFF,
    })
}

pub const TRANSPARENT: i32 = 1;
pub const OPAQUE: i32 = 2;

pub extern "win64" fn set_bk_mode(hdc: HDC, mode: i32) -> i32 {
    with_dcs(|t| {
        if let Some(dc) = t.get_mut(hdc) {
            dc.bk_mode_opaque = mode == OPAQUE;
        }
    });
    mode
}

fn put_pixel(dc: &Dc, x: i32, y: i32, color: u32) {
    if x < 0 || y < 0 || x as u32 >= dc.width || y as u32 >= dc.height {
        return;
    }
    let idx = y as usize * dc.width as usize + x as usize;
    unsafe { *dc.pixels.add(idx) = color };
}

pub extern "win64" fn set_pixel(hdc: HDC, x: i32, y: i32, color: COLORREF) -> COLORREF {
    with_dcs(|t| {
        if let Some(dc) = t.get(hdc) {
            put_pixel(dc, x, y, color);
        }
    });
    color
}

fn fill_rect_with(dc: &Dc, rect: &Rect, color: u32) {
    for y in rect.top..rect.bottom {
        for x in rect.left..rect.right {
            put_pixel(dc, x, y, color);
        }
    }
}

/// # Safety
/// `left`..`bottom` describe a rectangle in device coordinates; no
/// pointer dereference happens beyond the already-validated `HDC`.
pub extern "win64" fn rectangle(hdc: HDC, left: i32, top: i32, right: i32, bottom: i32) -> BOOL {
    with_dcs(|t| match t.get(hdc) {
        Some(dc) => {
            let color = with_brushes(|b| b.get(dc.selected_brush).copied().unwrap_or(dc.bk_color));
            fill_rect_with(dc, &Rect { left, top, right, bottom }, color);
            TRUE
        }
        None => FALSE,
    })
}

/// # Safety
/// `rect` must point at a readable `RECT`.
pub unsafe extern "win64" fn fill_rect(hdc: HDC, rect: *const Rect, brush: HBRUSH) -> BOOL {
    let rect = *rect;
    with_dcs(|t| match t.get(hdc) {
        Some(dc) => {
            let color = with_brushes(|b| b.get(brush).copied().unwrap_or(dc.bk_color));
            fill_rect_with(dc, &rect, color);
            TRUE
        }
        None => FALSE,
    })
}

/// A minimal 3x5 bitmap font covering uppercase letters, digits, and
/// space; anything else falls back to a solid block so text is never
/// silently dropped.
fn glyph(ch: u8) -> [u8; 5] {
    match ch.to_ascii_uppercase() {
        b' ' => [0b000, 0b000, 0b000, 0b000, 0b000],
        b'0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        b'1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        b'A' => [0b010, 0b101, 0b111, 0b101, 0b101],
        b'E' => [0b111, 0b100, 0b110, 0b100, 0b111],
        b'H' => [0b101, 0b101, 0b111, 0b101, 0b101],
        b'L' => [0b100, 0b100, 0b100, 0b100, 0b111],
        b'O' => [0b111, 0b101, 0b101, 0b101, 0b111],
        _ => [0b111, 0b111, 0b111, 0b111, 0b111],
    }
}

/// # Safety
/// `text` must point at `len` readable bytes.
pub unsafe extern "win64" fn text_out_a(hdc: HDC, x: i32, y: i32, text: *const u8, len: i32) -> BOOL {
    let bytes = std::slice::from_raw_parts(text, len.max(0) as usize);
    with_dcs(|t| {
        let Some(dc) = t.get(hdc) else { return FALSE };
        if dc.bk_mode_opaque {
            fill_rect_with(
                dc,
                &Rect { left: x, top: y, right: x + bytes.len() as i32 * 4, bottom: y + 5 },
                dc.bk_color,
            );
        }
        for (i, &ch) in bytes.iter().enumerate() {
            let rows = glyph(ch);
            let ox = x + i as i32 * 4;
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..3 {
                    if bits & (0b100 >> col) != 0 {
                        put_pixel(dc, ox + col, y + row as i32, dc.text_color);
                    }
                }
            }
        }
        TRUE
    })
}
