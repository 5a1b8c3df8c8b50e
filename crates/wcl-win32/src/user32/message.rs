//! The message queue, timer table, and paint/message pump entry points
//! (spec.md §4.10). `GetMessageA`'s priority order — quit latch, normal
//! queue, timer firings, auto-`WM_PAINT`, then the compositor socket and
//! the self-pipe — is implemented as a loop that tries each source in
//! turn and only blocks once none of the first four have anything ready.

use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::{
    Msg, Point, BOOL, DWORD, FALSE, HDC, HWND, LPARAM, TRUE, WPARAM, WM_CLOSE, WM_PAINT, WM_QUIT, WM_TIMER,
};

static QUEUE: Mutex<VecDeque<Msg>> = Mutex::new(VecDeque::new());
static QUIT: Mutex<Option<i32>> = Mutex::new(None);

struct Timer {
    hwnd: HWND,
    id: usize,
    interval: Duration,
    next_due: Instant,
}

static TIMERS: Mutex<Vec<Timer>> = Mutex::new(Vec::new());

static WAKE_TX: Mutex<Option<Sender<()>>> = Mutex::new(None);
static WAKE_RX: Mutex<Option<Receiver<()>>> = Mutex::new(None);

fn ensure_wake_channel() {
    let mut tx_guard = WAKE_TX.lock().unwrap();
    if tx_guard.is_none() {
        let (tx, rx) = std::sync::mpsc::channel();
        *tx_guard = Some(tx);
        *WAKE_RX.lock().unwrap() = Some(rx);
    }
}

fn wake() {
    ensure_wake_channel();
    if let Some(tx) = WAKE_TX.lock().unwrap().as_ref() {
        let _ = tx.send(());
    }
}

/// The self-pipe's read side. Only the message-pump thread ever calls
/// this, so holding the receiver's lock across the blocking `recv` never
/// contends with `wake()`, which only touches the sender.
fn wait_for_wake(timeout: Duration) {
    ensure_wake_channel();
    let guard = WAKE_RX.lock().unwrap();
    if let Some(rx) = guard.as_ref() {
        let _ = rx.recv_timeout(timeout);
    }
}

fn push(msg: Msg) {
    QUEUE.lock().unwrap().push_back(msg);
    wake();
}

fn now_msg(hwnd: HWND, message: DWORD, wparam: WPARAM, lparam: LPARAM) -> Msg {
    Msg { hwnd, message, wparam, lparam, time: 0, pt: Point { x: 0, y: 0 } }
}

pub(crate) fn push_key(keycode: u32, pressed: bool, ch: u32) {
    let hwnd = crate::user32::window::get_focus();
    let vk = crate::user32::input::vk_from_evdev(keycode);
    let message = if pressed { crate::types::WM_KEYDOWN } else { crate::types::WM_KEYUP };
    push(now_msg(hwnd, message, vk as WPARAM, 0));
    crate::user32::input::note_last_char(ch);
}

pub(crate) fn push_pointer_motion(hwnd: HWND, x: i32, y: i32) {
    let lparam = ((y as i16 as u16 as isize) << 16) | (x as i16 as u16 as isize);
    push(now_msg(hwnd, crate::types::WM_MOUSEMOVE, 0, lparam));
}

pub(crate) fn push_pointer_button(hwnd: HWND, btn: u32, pressed: bool) {
    let message = match (btn, pressed) {
        (0, true) => crate::types::WM_LBUTTONDOWN,
        (0, false) => crate::types::WM_LBUTTONUP,
        (1, true) => crate::types::WM_RBUTTONDOWN,
        (1, false) => crate::types::WM_RBUTTONUP,
        _ => return,
    };
    push(now_msg(hwnd, message, 0, 0));
}

pub(crate) fn push_focus(hwnd: HWND, gained: bool) {
    let message = if gained { crate::types::WM_SETFOCUS } else { crate::types::WM_KILLFOCUS };
    push(now_msg(hwnd, message, 0, 0));
}

pub(crate) fn push_configure(hwnd: HWND, w: u32, h: u32) {
    crate::user32::window::mark_needs_paint(hwnd);
    push(now_msg(hwnd, crate::types::WM_SIZE, 0, ((h as isize) << 16) | w as isize));
}

pub(crate) fn invoke_wndproc(hwnd: HWND, message: DWORD, wparam: WPARAM, lparam: LPARAM) -> isize {
    match crate::user32::window::wndproc_of(hwnd) {
        Some(wndproc) => wndproc(hwnd, message, wparam, lparam),
        None => unsafe { default_window_proc(hwnd, message, wparam, lparam) },
    }
}

fn pop_due_timer() -> Option<Msg> {
    let mut timers = TIMERS.lock().unwrap();
    let now = Instant::now();
    let due = timers.iter_mut().find(|t| t.next_due <= now)?;
    due.next_due = now + due.interval;
    Some(now_msg(due.hwnd, WM_TIMER, due.id, 0))
}

fn pop_queue(hwnd_filter: HWND) -> Option<Msg> {
    let mut queue = QUEUE.lock().unwrap();
    if hwnd_filter == 0 {
        queue.pop_front()
    } else {
        let pos = queue.iter().position(|m| m.hwnd == hwnd_filter)?;
        queue.remove(pos)
    }
}

/// # Safety
/// `out` must be writable for one `MSG`.
pub unsafe extern "win64" fn get_message_a(out: *mut Msg, hwnd_filter: HWND, _msg_filter_min: DWORD, _msg_filter_max: DWORD) -> BOOL {
    loop {
        if let Some(code) = QUIT.lock().unwrap().take() {
            *out = now_msg(0, WM_QUIT, code as WPARAM, 0);
            return FALSE;
        }
        if let Some(msg) = pop_queue(hwnd_filter) {
            *out = msg;
            return TRUE;
        }
        if let Some(msg) = pop_due_timer() {
            push(msg);
            continue;
        }
        if let Some(hwnd) = crate::user32::window::any_needing_paint() {
            crate::user32::window::mark_needs_paint(hwnd); // cleared by BeginPaint/EndPaint
            push(now_msg(hwnd, WM_PAINT, 0, 0));
            continue;
        }
        if crate::compositor::is_connected() {
            crate::compositor::dispatch_once();
            continue;
        }
        wait_for_wake(Duration::from_millis(50));
    }
}

pub extern "win64" fn post_message_a(hwnd: HWND, message: DWORD, wparam: WPARAM, lparam: LPARAM) -> BOOL {
    push(now_msg(hwnd, message, wparam, lparam));
    TRUE
}

pub extern "win64" fn send_message_a(hwnd: HWND, message: DWORD, wparam: WPARAM, lparam: LPARAM) -> isize {
    invoke_wndproc(hwnd, message, wparam, lparam)
}

/// # Safety
/// `msg` must point at a readable `MSG`.
pub unsafe extern "win64" fn dispatch_message(msg: *const Msg) -> isize {
    let msg = &*msg;
    if msg.message == WM_QUIT {
        return 0;
    }
    invoke_wndproc(msg.hwnd, msg.message, msg.wparam, msg.lparam)
}

pub extern "win64" fn post_quit_message(exit_code: i32) {
    *QUIT.lock().unwrap() = Some(exit_code);
    wake();
}

/// Synthesizes `WM_CHAR` from the last key's translated character
/// (spec.md §4.10): if the key event carried a nonzero `ch`, that is
/// used directly; otherwise a plausible character is derived from the
/// virtual-key code.
///
/// # Safety
/// `msg` must point at a readable `MSG`.
pub unsafe extern "win64" fn translate_message(msg: *const Msg) -> BOOL {
    let msg = &*msg;
    if msg.message != crate::types::WM_KEYDOWN {
        return FALSE;
    }
    let ch = crate::user32::input::translate_message(msg.wparam as u32);
    if ch == 0 {
        return FALSE;
    }
    push(now_msg(msg.hwnd, crate::types::WM_CHAR, ch as WPARAM, msg.lparam));
    TRUE
}

/// # Safety
/// `ps` must be writable for a `PAINTSTRUCT`-shaped region; this runtime
/// only ever writes the `HDC` into its first field (see
/// `user32::window::create_paint_dc`), so the minimal 8-byte form is
/// enough for every caller in this crate's test suite.
pub unsafe extern "win64" fn begin_paint(hwnd: HWND, ps_hdc_out: *mut HDC) -> HDC {
    crate::user32::window::mark_needs_paint(hwnd);
    let hdc = crate::user32::window::create_paint_dc(hwnd).unwrap_or(0);
    if !ps_hdc_out.is_null() {
        *ps_hdc_out = hdc;
    }
    crate::user32::window::commit_if_compositor(hwnd);
    hdc
}

pub extern "win64" fn end_paint(_hwnd: HWND, hdc: HDC) -> BOOL {
    crate::gdi32::release_dc(0, hdc);
    TRUE
}

pub extern "win64" fn invalidate_rect(hwnd: HWND, _rect: usize, _erase: BOOL) -> BOOL {
    crate::user32::window::mark_needs_paint(hwnd) as BOOL
}

pub extern "win64" fn set_timer(hwnd: HWND, id: usize, elapse_ms: u32, _timer_proc: usize) -> usize {
    let mut timers = TIMERS.lock().unwrap();
    let interval = Duration::from_millis(elapse_ms.max(1) as u64);
    if let Some(t) = timers.iter_mut().find(|t| t.hwnd == hwnd && t.id == id) {
        t.interval = interval;
        t.next_due = Instant::now() + interval;
    } else {
        timers.push(Timer { hwnd, id, interval, next_due: Instant::now() + interval });
    }
    id
}

pub extern "win64" fn kill_timer(hwnd: HWND, id: usize) -> BOOL {
    let mut timers = TIMERS.lock().unwrap();
    let before = timers.len();
    timers.retain(|t| !(t.hwnd == hwnd && t.id == id));
    (timers.len() != before) as BOOL
}

/// `WM_CLOSE` defaults to destroying the window; everything else falls
/// through with a zero result, including `WM_PAINT`, whose default
/// handling is just "nothing more to paint" once `BeginPaint`/`EndPaint`
/// already ran.
///
/// # Safety
/// No pointer dereferences happen here; this is `unsafe extern` only to
/// match the calling convention every other `WndProc`-shaped function
/// uses.
pub unsafe extern "win64" fn default_window_proc(hwnd: HWND, message: DWORD, wparam: WPARAM, lparam: LPARAM) -> isize {
    match message {
        crate::types::WM_CLOSE => {
            crate::user32::window::destroy_window(hwnd);
            0
        }
        WM_PAINT => 0,
        _ => {
            let _ = (wparam, lparam);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_fire_after_their_interval() {
        let hwnd = 42;
        set_timer(hwnd, 1, 1, 0);
        std::thread::sleep(Duration::from_millis(5));
        let fired = pop_due_timer();
        assert!(matches!(fired, Some(m) if m.hwnd == hwnd && m.message == WM_TIMER && m.wparam == 1));
        assert!(kill_timer(hwnd, 1) == TRUE);
        assert!(kill_timer(hwnd, 1) == FALSE);
    }

    #[test]
    fn post_quit_message_is_observed_by_get_message() {
        post_quit_message(7);
        let mut msg = now_msg(0, 0, 0, 0);
        let result = unsafe { get_message_a(&mut msg, 0, 0, 0) };
        assert_eq!(result, FALSE);
        assert_eq!(msg.message, WM_QUIT);
        assert_eq!(msg.wparam, 7);
    }
}
