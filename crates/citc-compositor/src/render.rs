//! Compositing renderer (spec.md §4.5 / C5): paints background, status
//! bar, windows back-to-front, panels, and the software cursor into the
//! framebuffer's back buffer. Grounded on the teacher's
//! `compositor/handlers/compositor.rs` (surface-commit -> damage ->
//! repaint pipeline) and on the servo `compositing/compositor_task.rs`
//! and anyos `libs/libanyui/src/compositor.rs` paint-loop shape, both
//! generalized here from a Wayland/X11 surface tree to the flat
//! `WindowTable` this crate uses.

use citc_proto::PixelFormat;

use crate::fb::{Backbuffer, Framebuffer};
use crate::server::Surface;
use crate::wintable::{Content, Window, WindowTable, TITLEBAR_H};

const BACKGROUND: u32 = 0x001E1E2E;
const STATUS_BAR_H: i32 = 20;
const STATUS_BAR_COLOR: u32 = 0x00111118;
const TITLEBAR_COLOR: u32 = 0x00404040;
const TITLEBAR_ACTIVE_COLOR: u32 = 0x005A5A8C;
const CLOSE_COLOR: u32 = 0x00B03030;
const CURSOR_COLOR: u32 = 0x00FFFFFF;
const CURSOR_SIZE: i32 = 8;

/// Runs one repaint pass (spec.md §4.5, steps 1-5; `present()` and the
/// `FrameDone`/damage-reset bookkeeping that follow are the caller's job,
/// since only the server knows which surfaces requested a frame).
pub fn composite_frame(fb: &mut Framebuffer, windows: &WindowTable, surfaces: &[Option<Surface>], cursor: (i32, i32)) {
    let back = fb.begin_frame();
    paint_background(back);
    paint_status_bar(back);

    let focused = windows.focused();
    for (id, win) in windows.iter_back_to_front() {
        if !win.style.visible {
            continue;
        }
        if win.style.panel {
            continue;
        }
        paint_chrome(back, win, focused == Some(id));
        paint_content(back, win, surfaces);
    }

    for (_id, win) in windows.iter_back_to_front() {
        if !win.style.visible || !win.style.panel {
            continue;
        }
        paint_content(back, win, surfaces);
    }

    paint_cursor(back, cursor.0, cursor.1);
}

fn paint_background(back: &mut Backbuffer) {
    for y in 0..back.height as i32 {
        for x in 0..back.width as i32 {
            back.put_pixel(x, y, BACKGROUND);
        }
    }
}

fn paint_status_bar(back: &mut Backbuffer) {
    for y in 0..STATUS_BAR_H.min(back.height as i32) {
        for x in 0..back.width as i32 {
            back.put_pixel(x, y, STATUS_BAR_COLOR);
        }
    }
}

fn paint_chrome(back: &mut Backbuffer, win: &Window, focused: bool) {
    let g = win.geometry;
    let color = if focused { TITLEBAR_ACTIVE_COLOR } else { TITLEBAR_COLOR };
    for y in g.y..g.y + TITLEBAR_H {
        for x in g.x..g.x + g.w as i32 {
            back.put_pixel(x, y, color);
        }
    }
    let close_x0 = g.x + g.w as i32 - 20;
    for y in g.y..g.y + TITLEBAR_H {
        for x in close_x0..g.x + g.w as i32 {
            back.put_pixel(x, y, CLOSE_COLOR);
        }
    }
    // Drop shadow: a translucent strip along the bottom and right edges,
    // alpha-blended over whatever was painted below/left of this window
    // in the back-to-front walk (spec.md §4.5 step 3's "source-over").
    let shadow_alpha = 0x60u32;
    for x in g.x..g.x + g.w as i32 + 4 {
        blend_pixel(back, x + 4, g.y + g.h as i32, 0x00000000, shadow_alpha);
    }
    for y in g.y..g.y + g.h as i32 + 4 {
        blend_pixel(back, g.x + g.w as i32, y + 4, 0x00000000, shadow_alpha);
    }
}

fn paint_content(back: &mut Backbuffer, win: &Window, surfaces: &[Option<Surface>]) {
    let sid = match &win.content {
        Content::External(sid) => *sid,
        Content::Internal(_) => {
            fill_placeholder(back, win);
            return;
        }
    };
    let Some(Some(surface)) = surfaces.get(sid.slot()) else { return };
    if !surface.committed {
        fill_placeholder(back, win);
        return;
    }
    let Some(pixels) = surface.pixels() else { return };
    let content_y_off = if win.style.panel { 0 } else { TITLEBAR_H };
    let g = win.geometry;
    let dst_x = g.x;
    let dst_y = g.y + content_y_off;
    // Clip to the window's own content rect, not just the screen (spec.md
    // §4.5 step 3), so an oversized client buffer can't overdraw whatever
    // is stacked behind/beside this window.
    let clip = ClipRect { x0: g.x, y0: g.y + content_y_off, x1: g.x + g.w as i32, y1: g.y + g.h as i32 };
    blit_surface(back, pixels, surface.width, surface.height, surface.stride, surface.format, dst_x, dst_y, clip);
}

#[derive(Clone, Copy)]
struct ClipRect {
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
}

impl ClipRect {
    fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x0 && y >= self.y0 && x < self.x1 && y < self.y1
    }
}

fn fill_placeholder(back: &mut Backbuffer, win: &Window) {
    let content_y_off = if win.style.panel { 0 } else { TITLEBAR_H };
    let g = win.geometry;
    for y in (g.y + content_y_off)..(g.y + g.h as i32) {
        for x in g.x..g.x + g.w as i32 {
            back.put_pixel(x, y, win.chrome_color);
        }
    }
}

/// Clips to both the destination buffer (via `Backbuffer::put_pixel`'s own
/// bounds check) and `clip`, the window's content rect (spec.md §4.5 step
/// 3, "clip to window and screen bounds") — a client-declared buffer
/// larger than its window's content area must not paint over neighboring
/// windows or panels. Per-pixel source format dictates plain copy vs.
/// blend.
fn blit_surface(
    back: &mut Backbuffer,
    pixels: &[u8],
    width: u32,
    height: u32,
    stride: u32,
    format: PixelFormat,
    dst_x: i32,
    dst_y: i32,
    clip: ClipRect,
) {
    for y in 0..height as i32 {
        let row_off = (y as u32 * stride) as usize;
        if row_off + (width as usize) * 4 > pixels.len() {
            break;
        }
        let py = dst_y + y;
        if py < clip.y0 || py >= clip.y1 {
            continue;
        }
        for x in 0..width as i32 {
            let px = dst_x + x;
            if !clip.contains(px, py) {
                continue;
            }
            let off = row_off + (x as usize) * 4;
            let b = pixels[off] as u32;
            let g = pixels[off + 1] as u32;
            let r = pixels[off + 2] as u32;
            let a = pixels[off + 3] as u32;
            let xrgb = (r << 16) | (g << 8) | b;
            match format {
                PixelFormat::Xrgb8888 => back.put_pixel(px, py, xrgb),
                PixelFormat::Argb8888 => blend_pixel(back, px, py, xrgb, a),
            }
        }
    }
}

/// `out = s + d*(1 - s_a)`, applied per channel, with the fast paths
/// spec.md §4.5 calls out explicitly: `s_a == 0xFF` is a pure copy,
/// `s_a == 0` is a no-op.
fn blend_pixel(back: &mut Backbuffer, x: i32, y: i32, src_xrgb: u32, src_a: u32) {
    if src_a == 0 {
        return;
    }
    if src_a == 0xFF {
        back.put_pixel(x, y, src_xrgb);
        return;
    }
    let dst = back.get_pixel(x, y);
    let blend = |s: u32, d: u32| -> u32 { (s * 0xFF + d * (0xFF - src_a)) / 0xFF };
    let sr = (src_xrgb >> 16) & 0xFF;
    let sg = (src_xrgb >> 8) & 0xFF;
    let sb = src_xrgb & 0xFF;
    let dr = (dst >> 16) & 0xFF;
    let dg = (dst >> 8) & 0xFF;
    let db = dst & 0xFF;
    let out = (blend(sr, dr) << 16) | (blend(sg, dg) << 8) | blend(sb, db);
    back.put_pixel(x, y, out);
}

fn paint_cursor(back: &mut Backbuffer, x: i32, y: i32) {
    for i in -CURSOR_SIZE..=CURSOR_SIZE {
        back.put_pixel(x + i, y, CURSOR_COLOR);
        back.put_pixel(x, y + i, CURSOR_COLOR);
    }
}
