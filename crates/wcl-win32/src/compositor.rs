//! The lazy compositor connection `CreateWindowExA` needs (spec.md
//! §4.10): connects on first use, translates CDP events into queued
//! `MSG`s, and is simply absent if the compositor never answers —
//! `window.rs` then falls back to a local pixel buffer per window.

use std::collections::HashMap;
use std::sync::Mutex;

use citc_client::Connection;

use crate::user32::message;

struct State {
    conn: Option<Connection>,
    surface_to_hwnd: HashMap<u32, usize>,
    tried: bool,
}

static STATE: Mutex<Option<State>> = Mutex::new(None);

fn with_state<R>(f: impl FnOnce(&mut State) -> R) -> R {
    let mut guard = STATE.lock().unwrap();
    let state = guard.get_or_insert_with(|| State { conn: None, surface_to_hwnd: HashMap::new(), tried: false });
    f(state)
}

fn install_callbacks(conn: &mut Connection) {
    conn.callbacks.on_key = Some(Box::new(|keycode, pressed, ch, _mods| {
        message::push_key(keycode, pressed, ch);
    }));
    conn.callbacks.on_pointer_motion = Some(Box::new(|id, x, y| {
        if let Some(hwnd) = with_state(|s| s.surface_to_hwnd.get(&id).copied()) {
            message::push_pointer_motion(hwnd, x, y);
        }
    }));
    conn.callbacks.on_pointer_button = Some(Box::new(|id, btn, pressed| {
        if let Some(hwnd) = with_state(|s| s.surface_to_hwnd.get(&id).copied()) {
            message::push_pointer_button(hwnd, btn, pressed);
        }
    }));
    conn.callbacks.on_focus_in = Some(Box::new(|id| {
        if let Some(hwnd) = with_state(|s| s.surface_to_hwnd.get(&id).copied()) {
            message::push_focus(hwnd, true);
        }
    }));
    conn.callbacks.on_focus_out = Some(Box::new(|id| {
        if let Some(hwnd) = with_state(|s| s.surface_to_hwnd.get(&id).copied()) {
            message::push_focus(hwnd, false);
        }
    }));
    conn.callbacks.on_configure = Some(Box::new(|id, w, h| {
        if let Some(hwnd) = with_state(|s| s.surface_to_hwnd.get(&id).copied()) {
            message::push_configure(hwnd, w, h);
        }
    }));
}

fn socket_path() -> String {
    std::env::var("CITC_SOCKET").unwrap_or_else(|_| "/run/citc/compositor.sock".to_string())
}

/// Attempts the connection exactly once; later calls reuse the cached
/// result (success or failure) instead of retrying every window.
pub fn ensure_connected() -> bool {
    with_state(|s| {
        if !s.tried {
            s.tried = true;
            match Connection::connect(&socket_path()) {
                Ok(mut conn) => {
                    install_callbacks(&mut conn);
                    s.conn = Some(conn);
                }
                Err(e) => {
                    log::warn!("compositor unavailable, windows fall back to local pixel buffers: {e}");
                }
            }
        }
        s.conn.is_some()
    })
}

pub fn is_connected() -> bool {
    with_state(|s| s.conn.is_some())
}

pub fn register_surface(surface_id: u32, hwnd: usize) {
    with_state(|s| {
        s.surface_to_hwnd.insert(surface_id, hwnd);
    });
}

pub fn with_connection<R>(f: impl FnOnce(&mut Connection) -> R) -> Option<R> {
    with_state(|s| s.conn.as_mut().map(f))
}

/// Reads and translates exactly one server event, used by `GetMessageA`
/// as its last-resort wait source. Returns `false` if the connection
/// dropped (it is then dropped here too, so subsequent windows fall back
/// to local buffers).
pub fn dispatch_once() -> bool {
    let disconnected = with_state(|s| match s.conn.as_mut() {
        Some(conn) => conn.dispatch().is_err(),
        None => true,
    });
    if disconnected {
        with_state(|s| s.conn = None);
    }
    !disconnected
}
