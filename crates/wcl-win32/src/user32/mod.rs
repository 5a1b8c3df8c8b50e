//! user32: WNDCLASS table, window table, timer table, message queue, and
//! focused HWND (spec.md §4.10), plus the bridge that turns CDP server
//! events into `MSG`s.

pub mod input;
pub mod message;
pub mod window;
pub mod wndclass;

pub use input::{translate_message, vk_from_evdev};
pub use message::{
    begin_paint, default_window_proc, dispatch_message, end_paint, get_message_a, invalidate_rect, kill_timer,
    post_message_a, post_quit_message, send_message_a, set_timer,
};
pub use window::{
    create_window_ex_a, destroy_window, get_focus, get_system_metrics, get_window_long_a, get_window_text_a,
    move_window, set_focus, set_window_long_a, set_window_text_a, show_window, update_window,
};
pub use wndclass::register_class_a;
