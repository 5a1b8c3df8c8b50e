//! Win32 stub runtime (spec.md §4.10 / C10): the kernel32/user32/gdi32/
//! ole32/dsound/xaudio2/xinput surfaces a loaded PE actually calls into,
//! implemented as real Rust functions rather than bindings to a real OS.
//! `wcl-pe`'s loader resolves imports against [`Resolver`], which maps
//! each `(dll, symbol)` pair onto one of these functions' address.

pub mod audio_sink;
pub mod compositor;
pub mod d3d11;
pub mod dsound;
pub mod error;
pub mod gdi32;
pub mod handle;
pub mod kernel32;
pub mod ole32;
pub mod types;
pub mod user32;
pub mod xaudio2;
pub mod xinput;

use wcl_pe::imports::{ImportResolver, ImportSymbol};

/// Resolves a loaded PE's imports against this crate's export tables
/// (spec.md §4.9 step 5). DLL name matching is case-insensitive, matching
/// the real loader's own behavior; symbol matching is exact.
pub struct Resolver;

macro_rules! export_table {
    ($symbol:expr, { $($name:literal => $addr:expr),* $(,)? }) => {
        match $symbol {
            ImportSymbol::Name(n) => match n.as_str() {
                $($name => Some($addr as usize),)*
                _ => None,
            },
            ImportSymbol::Ordinal(_) => None,
        }
    };
}

impl ImportResolver for Resolver {
    fn resolve(&self, dll: &str, symbol: &ImportSymbol) -> Option<usize> {
        match dll.to_ascii_lowercase().as_str() {
            "kernel32.dll" => export_table!(symbol, {
                "ExitProcess" => kernel32::exit_process,
                "GetStdHandle" => kernel32::get_std_handle,
                "CreateFileA" => kernel32::create_file_a,
                "ReadFile" => kernel32::read_file,
                "WriteFile" => kernel32::write_file,
                "CloseHandle" => kernel32::close_handle,
                "GetProcessHeap" => kernel32::get_process_heap,
                "HeapAlloc" => kernel32::heap_alloc,
                "HeapFree" => kernel32::heap_free,
                "GetModuleHandleA" => kernel32::get_module_handle_a,
                "TlsAlloc" => kernel32::tls_alloc,
                "TlsGetValue" => kernel32::tls_get_value,
                "TlsSetValue" => kernel32::tls_set_value,
                "TlsFree" => kernel32::tls_free,
                "InitializeCriticalSection" => kernel32::initialize_critical_section,
                "EnterCriticalSection" => kernel32::enter_critical_section,
                "LeaveCriticalSection" => kernel32::leave_critical_section,
                "DeleteCriticalSection" => kernel32::delete_critical_section,
                "CreateThread" => kernel32::create_thread,
                "Sleep" => kernel32::sleep,
                "GetLastError" => kernel32::get_last_error,
                "SetLastError" => kernel32::set_last_error,
            }),
            "user32.dll" => export_table!(symbol, {
                "RegisterClassA" => user32::wndclass::register_class_a,
                "CreateWindowExA" => user32::window::create_window_ex_a,
                "DestroyWindow" => user32::window::destroy_window,
                "ShowWindow" => user32::window::show_window,
                "UpdateWindow" => user32::window::update_window,
                "MoveWindow" => user32::window::move_window,
                "SetWindowTextA" => user32::window::set_window_text_a,
                "GetWindowTextA" => user32::window::get_window_text_a,
                "GetWindowLongA" => user32::window::get_window_long_a,
                "SetWindowLongA" => user32::window::set_window_long_a,
                "GetFocus" => user32::window::get_focus,
                "SetFocus" => user32::window::set_focus,
                "GetSystemMetrics" => user32::window::get_system_metrics,
                "MessageBoxA" => user32::window::message_box_a,
                "LoadCursorA" => user32::window::load_cursor_a,
                "LoadIconA" => user32::window::load_icon_a,
                "GetMessageA" => user32::message::get_message_a,
                "PostMessageA" => user32::message::post_message_a,
                "SendMessageA" => user32::message::send_message_a,
                "DispatchMessageA" => user32::message::dispatch_message,
                "PostQuitMessage" => user32::message::post_quit_message,
                "TranslateMessage" => user32::message::translate_message,
                "BeginPaint" => user32::message::begin_paint,
                "EndPaint" => user32::message::end_paint,
                "InvalidateRect" => user32::message::invalidate_rect,
                "SetTimer" => user32::message::set_timer,
                "KillTimer" => user32::message::kill_timer,
                "DefWindowProcA" => user32::message::default_window_proc,
            }),
            "gdi32.dll" => export_table!(symbol, {
                "ReleaseDC" => gdi32::release_dc,
                "CreateSolidBrush" => gdi32::create_solid_brush,
                "SelectObject" => gdi32::select_object,
                "SetTextColor" => gdi32::set_text_color,
                "SetBkColor" => gdi32::set_bk_color,
                "SetBkMode" => gdi32::set_bk_mode,
                "SetPixel" => gdi32::set_pixel,
                "Rectangle" => gdi32::rectangle,
                "FillRect" => gdi32::fill_rect,
                "TextOutA" => gdi32::text_out_a,
            }),
            "ole32.dll" => export_table!(symbol, {
                "CoInitializeEx" => ole32::co_initialize_ex,
                "CoUninitialize" => ole32::co_uninitialize,
                "CoCreateInstance" => ole32::co_create_instance,
                "CoTaskMemAlloc" => ole32::co_task_mem_alloc,
                "CoTaskMemRealloc" => ole32::co_task_mem_realloc,
                "CoTaskMemFree" => ole32::co_task_mem_free,
                "IsEqualGUID" => ole32::is_equal_guid,
                "StringFromGUID2" => ole32::string_from_guid2,
                "CLSIDFromString" => ole32::clsid_from_string,
            }),
            "dsound.dll" => export_table!(symbol, {
                "DirectSoundCreate8" => dsound::direct_sound_create8,
            }),
            "d3d11.dll" | "d3d12.dll" => export_table!(symbol, {
                "D3D11CreateDeviceAndSwapChain" => d3d11::d3d11_create_device_and_swap_chain,
            }),
            "dxgi.dll" => export_table!(symbol, {
                "CreateDXGIFactory1" => d3d11::create_dxgi_factory1,
                "CreateDXGIFactory" => d3d11::create_dxgi_factory1,
            }),
            "xaudio2_9.dll" | "xaudio2_8.dll" | "xaudio2_7.dll" => export_table!(symbol, {
                "XAudio2Create" => xaudio2::x_audio2_create,
            }),
            "xinput1_4.dll" | "xinput1_3.dll" | "xinput9_1_0.dll" => export_table!(symbol, {
                "XInputGetState" => xinput_get_state,
                "XInputSetState" => xinput_set_state,
            }),
            _ => None,
        }
    }
}

/// # Safety
/// `out` must be writable for one `XInputState`.
unsafe extern "win64" fn xinput_get_state(index: u32, out: *mut xinput::XInputState) -> u32 {
    const ERROR_SUCCESS: u32 = 0;
    const ERROR_DEVICE_NOT_CONNECTED: u32 = 1167;
    match xinput::poll(index) {
        Some(state) => {
            *out = state;
            ERROR_SUCCESS
        }
        None => ERROR_DEVICE_NOT_CONNECTED,
    }
}

extern "win64" fn xinput_set_state(index: u32, vibration: usize) -> u32 {
    const ERROR_SUCCESS: u32 = 0;
    // `vibration` is a pointer to `XINPUT_VIBRATION { wLeftMotorSpeed,
    // wRightMotorSpeed }`, two packed u16s.
    let left = unsafe { *(vibration as *const u16) };
    let right = unsafe { *((vibration as *const u16).add(1)) };
    xinput::set_vibration(index, left, right);
    ERROR_SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_a_known_kernel32_export() {
        let r = Resolver;
        let addr = r.resolve("KERNEL32.dll", &ImportSymbol::Name("ExitProcess".to_string()));
        assert_eq!(addr, Some(kernel32::exit_process as usize));
    }

    #[test]
    fn unknown_dll_or_symbol_resolves_to_none() {
        let r = Resolver;
        assert!(r.resolve("notreal.dll", &ImportSymbol::Name("Foo".to_string())).is_none());
        assert!(r.resolve("kernel32.dll", &ImportSymbol::Name("NoSuchThing".to_string())).is_none());
        assert!(r.resolve("kernel32.dll", &ImportSymbol::Ordinal(5)).is_none());
    }
}
