//! The C8 CDP client: connect, create/drive surfaces, dispatch server
//! events into installed callbacks. Grounded on the teacher's
//! `web/shared.rs` + `transport/websocket.rs` connect/dispatch/callback
//! shape, rehomed from an async WebSocket onto a blocking `UnixStream`
//! (CDP is a single local socket, not a browser-facing transport).

use std::ffi::CString;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::thread;
use std::time::Duration;

use citc_proto::wire::{self, WindowListEntry};
use citc_proto::{Edge, Event, PixelFormat, Request};

use crate::error::ClientError;

const CONNECT_ATTEMPTS: u32 = 20;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Callbacks installed by the application, invoked from `dispatch()`.
/// Unset slots silently drop their event, matching the teacher's
/// `handle_command_message`-style "not for me, ignore" dispatch.
#[derive(Default)]
pub struct Callbacks {
    pub on_frame_done: Option<Box<dyn FnMut(u32)>>,
    pub on_pointer_motion: Option<Box<dyn FnMut(u32, i32, i32)>>,
    pub on_pointer_button: Option<Box<dyn FnMut(u32, u32, bool)>>,
    pub on_key: Option<Box<dyn FnMut(u32, bool, u32, u32)>>,
    pub on_focus_in: Option<Box<dyn FnMut(u32)>>,
    pub on_focus_out: Option<Box<dyn FnMut(u32)>>,
    pub on_configure: Option<Box<dyn FnMut(u32, u32, u32)>>,
}

/// A client-owned surface: a shared-memory buffer the compositor reads
/// directly, plus the id the wire protocol uses to refer to it.
pub struct Surface {
    pub id: u32,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
    _shm: std::fs::File,
    map: memmap2::MmapMut,
}

impl Surface {
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.map[..]
    }
}

pub struct Connection {
    stream: UnixStream,
    pub screen_w: u32,
    pub screen_h: u32,
    pub version: u32,
    pub callbacks: Callbacks,
}

fn create_anon_shm(size: usize) -> Result<std::fs::File, ClientError> {
    let name = CString::new("citc-surface").unwrap();
    let fd = unsafe { libc::memfd_create(name.as_ptr(), libc::MFD_CLOEXEC as u32) };
    if fd < 0 {
        return Err(ClientError::Io(std::io::Error::last_os_error()));
    }
    let owned = unsafe { OwnedFd::from_raw_fd(fd) };
    let file = std::fs::File::from(owned);
    file.set_len(size as u64)?;
    Ok(file)
}

impl Connection {
    /// Opens `path`, retrying on `ECONNREFUSED` for a boot race against the
    /// compositor (spec.md §4.8), then blocks for `WELCOME`.
    pub fn connect(path: &str) -> Result<Self, ClientError> {
        let mut attempt = 0;
        let stream = loop {
            match UnixStream::connect(path) {
                Ok(s) => break s,
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused || e.kind() == std::io::ErrorKind::NotFound => {
                    attempt += 1;
                    if attempt >= CONNECT_ATTEMPTS {
                        return Err(ClientError::ConnectTimeout(attempt));
                    }
                    thread::sleep(CONNECT_RETRY_DELAY);
                }
                Err(e) => return Err(ClientError::Io(e)),
            }
        };
        let mut conn = Connection {
            stream,
            screen_w: 0,
            screen_h: 0,
            version: 0,
            callbacks: Callbacks::default(),
        };
        match conn.read_event()? {
            Event::Welcome { screen_w, screen_h, version } => {
                conn.screen_w = screen_w;
                conn.screen_h = screen_h;
                conn.version = version;
            }
            _ => return Err(ClientError::UnexpectedEvent("Welcome")),
        }
        Ok(conn)
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    fn read_event(&mut self) -> Result<Event, ClientError> {
        Ok(wire::read_event(&mut self.stream)?)
    }

    fn send(&mut self, req: &Request) -> Result<(), ClientError> {
        wire::write_request(&mut self.stream, req)?;
        Ok(())
    }

    /// Blocks for one particular event variant, dispatching any other
    /// event it sees along the way to the installed callbacks (the same
    /// "not for me" drop-through as `dispatch`). This is how
    /// `create_surface`, `list_windows`, and `clipboard_get` "await" their
    /// reply without losing interleaved input events.
    fn await_event<T>(&mut self, name: &'static str, mut extract: impl FnMut(&Event) -> Option<T>) -> Result<T, ClientError> {
        loop {
            let ev = self.read_event()?;
            if let Some(v) = extract(&ev) {
                return Ok(v);
            }
            self.dispatch_event(ev);
            let _ = name;
        }
    }

    /// Creates a surface at `(x, y)` sized `w`x`h`, allocates and maps an
    /// anonymous shared-memory buffer for it (`ARGB8888`, one `u32` per
    /// pixel, row-major), attaches it, and sets its title (spec.md §4.8).
    pub fn create_surface(&mut self, x: i32, y: i32, w: u32, h: u32, title: &str) -> Result<Surface, ClientError> {
        self.send(&Request::CreateSurface { x, y, w, h })?;
        let id = self.await_event("SurfaceId", |ev| match ev {
            Event::SurfaceId { id } => Some(*id),
            _ => None,
        })?;

        let format = PixelFormat::Argb8888;
        let stride = w * 4;
        let size = (stride as usize) * (h as usize);
        let file = create_anon_shm(size)?;
        let map = unsafe { memmap2::MmapOptions::new().len(size).map_mut(&file)? };

        self.send(&Request::AttachBuffer { id, w, h, stride, format: format as u32 })?;
        wire::send_fd(&self.stream, file.as_raw_fd())?;
        self.send(&Request::SetTitle { id, title: title.to_string() })?;

        Ok(Surface { id, width: w, height: h, stride, format, _shm: file, map })
    }

    pub fn commit(&mut self, id: u32) -> Result<(), ClientError> {
        self.send(&Request::Commit { id })
    }

    pub fn request_frame(&mut self, id: u32) -> Result<(), ClientError> {
        self.send(&Request::Frame { id })
    }

    pub fn damage(&mut self, id: u32, x: i32, y: i32, w: u32, h: u32) -> Result<(), ClientError> {
        self.send(&Request::Damage { id, x, y, w, h })
    }

    pub fn destroy_surface(&mut self, id: u32) -> Result<(), ClientError> {
        self.send(&Request::DestroySurface { id })
    }

    pub fn set_panel(&mut self, id: u32, edge: Edge, height: u32) -> Result<(), ClientError> {
        self.send(&Request::SetPanel { id, edge: edge as u32, height })
    }

    pub fn raise_surface(&mut self, id: u32) -> Result<(), ClientError> {
        self.send(&Request::RaiseSurface { id })
    }

    pub fn list_windows(&mut self) -> Result<Vec<WindowListEntry>, ClientError> {
        self.send(&Request::ListWindows)?;
        self.await_event("WindowList", |ev| match ev {
            Event::WindowList { windows } => Some(windows.clone()),
            _ => None,
        })
    }

    pub fn clipboard_set(&mut self, data: Vec<u8>) -> Result<(), ClientError> {
        self.send(&Request::ClipboardSet { data })
    }

    pub fn clipboard_get(&mut self) -> Result<Vec<u8>, ClientError> {
        self.send(&Request::ClipboardGet)?;
        self.await_event("ClipboardData", |ev| match ev {
            Event::ClipboardData { data } => Some(data.clone()),
            _ => None,
        })
    }

    /// Reads one event and routes it to the matching callback, if any is
    /// installed. Returns `Ok(())` normally; propagates `Disconnected` on
    /// end-of-stream so the caller's loop can exit (spec.md §4.8).
    pub fn dispatch(&mut self) -> Result<(), ClientError> {
        let ev = match self.read_event() {
            Ok(ev) => ev,
            Err(ClientError::Proto(citc_proto::ProtoError::Eof)) => return Err(ClientError::Disconnected),
            Err(e) => return Err(e),
        };
        self.dispatch_event(ev);
        Ok(())
    }

    fn dispatch_event(&mut self, ev: Event) {
        match ev {
            Event::FrameDone { id } => {
                if let Some(cb) = self.callbacks.on_frame_done.as_mut() {
                    cb(id);
                }
            }
            Event::PointerMotion { id, x, y } => {
                if let Some(cb) = self.callbacks.on_pointer_motion.as_mut() {
                    cb(id, x, y);
                }
            }
            Event::PointerButton { id, btn, state } => {
                if let Some(cb) = self.callbacks.on_pointer_button.as_mut() {
                    cb(id, btn, state != 0);
                }
            }
            Event::Key { keycode, state, ch, mods } => {
                if let Some(cb) = self.callbacks.on_key.as_mut() {
                    cb(keycode, state != 0, ch, mods);
                }
            }
            Event::FocusIn { id } => {
                if let Some(cb) = self.callbacks.on_focus_in.as_mut() {
                    cb(id);
                }
            }
            Event::FocusOut { id } => {
                if let Some(cb) = self.callbacks.on_focus_out.as_mut() {
                    cb(id);
                }
            }
            Event::Configure { id, w, h } => {
                if let Some(cb) = self.callbacks.on_configure.as_mut() {
                    cb(id, w, h);
                }
            }
            // Welcome only ever arrives once, at connect time; SurfaceId /
            // WindowList / ClipboardData / PointerEnter / PointerLeave are
            // either consumed by `await_event` or have no standing
            // callback in this client.
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    fn fake_socket_path(name: &str) -> String {
        std::env::temp_dir()
            .join(format!("citc-client-test-{}-{}", std::process::id(), name))
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn connect_awaits_welcome() {
        let path = fake_socket_path("welcome");
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            wire::write_event(&mut stream, &Event::Welcome { screen_w: 1024, screen_h: 768, version: 1 }).unwrap();
        });
        let conn = Connection::connect(&path).unwrap();
        assert_eq!((conn.screen_w, conn.screen_h, conn.version), (1024, 768, 1));
        server.join().unwrap();
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn create_surface_round_trip() {
        let path = fake_socket_path("surface");
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            wire::write_event(&mut stream, &Event::Welcome { screen_w: 800, screen_h: 600, version: 1 }).unwrap();

            let req = wire::read_request(&mut stream).unwrap();
            assert_eq!(req, Request::CreateSurface { x: 10, y: 20, w: 100, h: 50 });
            wire::write_event(&mut stream, &Event::SurfaceId { id: 1 }).unwrap();

            let req = wire::read_request(&mut stream).unwrap();
            assert!(matches!(req, Request::AttachBuffer { id: 1, w: 100, h: 50, .. }));
            let _fd = wire::recv_fd(&stream).unwrap();

            let req = wire::read_request(&mut stream).unwrap();
            assert_eq!(req, Request::SetTitle { id: 1, title: "demo".to_string() });

            let req = wire::read_request(&mut stream).unwrap();
            assert_eq!(req, Request::Commit { id: 1 });
        });

        let mut conn = Connection::connect(&path).unwrap();
        let mut surface = conn.create_surface(10, 20, 100, 50, "demo").unwrap();
        assert_eq!(surface.id, 1);
        surface.pixels_mut()[0] = 0xFF;
        conn.commit(surface.id).unwrap();
        server.join().unwrap();
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn dispatch_routes_key_event_to_callback() {
        let path = fake_socket_path("dispatch");
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            wire::write_event(&mut stream, &Event::Welcome { screen_w: 800, screen_h: 600, version: 1 }).unwrap();
            wire::write_event(&mut stream, &Event::Key { keycode: 30, state: 1, ch: b'a' as u32, mods: 0 }).unwrap();
        });

        let mut conn = Connection::connect(&path).unwrap();
        let seen = std::rc::Rc::new(std::cell::RefCell::new(None));
        let seen2 = seen.clone();
        conn.callbacks.on_key = Some(Box::new(move |keycode, pressed, ch, _mods| {
            *seen2.borrow_mut() = Some((keycode, pressed, ch));
        }));
        conn.dispatch().unwrap();
        assert_eq!(*seen.borrow(), Some((30, true, b'a' as u32)));
        server.join().unwrap();
        let _ = std::fs::remove_file(&path);
    }
}
