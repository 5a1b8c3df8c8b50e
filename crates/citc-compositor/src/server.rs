//! CDP server (spec.md §4.7 / C7): accepts clients, owns per-client
//! sockets and per-surface shared-memory mappings, translates requests
//! into C4 mutations, and routes input into client messages. Grounded on
//! the teacher's `compositor/state.rs::init_wayland_listener` (calloop
//! wiring of a listening socket plus a display fd onto one `EventLoop`,
//! generalized here to N clients and N input devices) and on
//! `web/shared.rs`'s client-slot bookkeeping for `disconnect_client`.

use std::collections::VecDeque;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};

use citc_proto::wire::{self, ProtoError, Request};
use citc_proto::{ClientIdx, DamageList, Event, PixelFormat, Rect, SurfaceId};
use thiserror::Error;

use crate::fb::Framebuffer;
use crate::input::{InputDevice, KeyTranslator, ModifierState, NormalizedEvent};
use crate::render;
use crate::wintable::{Content, Geometry, WindowEvent, WindowId, WindowTable, TITLEBAR_H};

pub const MAX_CLIENTS: usize = 64;
const PROTOCOL_VERSION: u32 = 1;
const DEFAULT_CHROME_COLOR: u32 = 0x00303030;
const KEY_ESC: u16 = 1;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no free {0} slot")]
    NoFreeSlot(&'static str),
    #[error("bad argument: {0}")]
    BadArgument(&'static str),
    #[error("fatal: {0}")]
    Fatal(String),
}

struct ShmMapping {
    _file: std::fs::File,
    map: memmap2::Mmap,
}

pub struct Surface {
    pub client_idx: ClientIdx,
    pub window: Option<WindowId>,
    shm: Option<ShmMapping>,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
    pub committed: bool,
    pub frame_requested: bool,
}

impl Surface {
    fn new(client_idx: ClientIdx) -> Self {
        Self {
            client_idx,
            window: None,
            shm: None,
            width: 0,
            height: 0,
            stride: 0,
            format: PixelFormat::Xrgb8888,
            committed: false,
            frame_requested: false,
        }
    }

    /// Read-only view of the last attached buffer, valid while
    /// `committed` is true (spec.md §3).
    pub fn pixels(&self) -> Option<&[u8]> {
        self.shm.as_ref().map(|m| &m.map[..])
    }
}

struct ClientSlot {
    stream: UnixStream,
    pending_out: VecDeque<Event>,
}

pub struct CdpServer {
    pub screen_w: u32,
    pub screen_h: u32,
    listener: UnixListener,
    clients: Vec<Option<ClientSlot>>,
    surfaces: Vec<Option<Surface>>,
    pub windows: WindowTable,
    pub damage: DamageList,
    pub fb: Framebuffer,
    devices: Vec<InputDevice>,
    modifiers: ModifierState,
    key_xlat: KeyTranslator,
    cursor: (i32, i32),
    clipboard: Vec<u8>,
    quit: bool,
}

/// Resolves an already-listening inherited socket via `LISTEN_FDS`/
/// `LISTEN_PID` socket activation, or binds `path` fresh (spec.md §4.7,
/// §6, §9).
fn bind_or_inherit(path: &str) -> Result<UnixListener, ServerError> {
    if let (Ok(nfds), Ok(pid)) = (std::env::var("LISTEN_FDS"), std::env::var("LISTEN_PID")) {
        let nfds: u32 = nfds.parse().unwrap_or(0);
        let pid: u32 = pid.parse().unwrap_or(0);
        if nfds >= 1 && pid == std::process::id() {
            let fd: RawFd = 3;
            let owned = unsafe { OwnedFd::from_raw_fd(fd) };
            let listener = UnixListener::from(owned);
            listener.set_nonblocking(true)?;
            return Ok(listener);
        }
    }
    let _ = std::fs::remove_file(path);
    let listener = UnixListener::bind(path).map_err(ServerError::Io)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Globally suppresses `SIGPIPE`'s default action so a disconnecting
/// client cannot crash the server on the next write (spec.md §5/§9).
fn ignore_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

impl CdpServer {
    pub fn new(socket_path: &str, screen_w: u32, screen_h: u32, devices: Vec<InputDevice>) -> Result<Self, ServerError> {
        ignore_sigpipe();
        let listener = bind_or_inherit(socket_path)?;
        let fb = Framebuffer::new_headless(screen_w, screen_h);
        let mut windows = WindowTable::new();
        windows.set_screen_size(screen_w, screen_h);
        Ok(Self {
            screen_w,
            screen_h,
            listener,
            clients: Vec::new(),
            surfaces: Vec::new(),
            windows,
            damage: DamageList::new(),
            fb,
            devices,
            modifiers: ModifierState::default(),
            key_xlat: KeyTranslator::default(),
            cursor: (0, 0),
            clipboard: Vec::new(),
            quit: false,
        })
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn listener_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }

    pub fn device_fds(&self) -> Vec<RawFd> {
        self.devices.iter().map(|d| d.as_raw_fd()).collect()
    }

    pub fn client_fds(&self) -> Vec<(usize, RawFd)> {
        self.clients
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (i, c.stream.as_raw_fd())))
            .collect()
    }

    /// Accepts one pending connection, if any, bounded by `MAX_CLIENTS`
    /// (spec.md §4.7: "on exhaustion the new connection is closed").
    pub fn accept_one(&mut self) -> std::io::Result<()> {
        match self.listener.accept() {
            Ok((stream, _addr)) => {
                stream.set_nonblocking(true)?;
                let free = self.clients.iter().position(|c| c.is_none());
                let idx = match free {
                    Some(i) => i,
                    None if self.clients.len() < MAX_CLIENTS => {
                        self.clients.push(None);
                        self.clients.len() - 1
                    }
                    None => {
                        log::warn!("client capacity exhausted, dropping connection");
                        drop(stream);
                        return Ok(());
                    }
                };
                let mut slot = ClientSlot { stream, pending_out: VecDeque::new() };
                let welcome = Event::Welcome { screen_w: self.screen_w, screen_h: self.screen_h, version: PROTOCOL_VERSION };
                let _ = wire::write_event(&mut slot.stream, &welcome);
                self.clients[idx] = Some(slot);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Services one readable client socket: reads exactly one frame (and,
    /// for `ATTACH_BUFFER`, the descriptor that follows it), applies it,
    /// and sends any reply events. Any I/O error or protocol violation
    /// disconnects the client (spec.md §4.7, §7).
    pub fn service_client(&mut self, idx: usize) {
        let req = {
            let Some(slot) = self.clients.get_mut(idx).and_then(|c| c.as_mut()) else { return };
            wire::read_request(&mut slot.stream)
        };
        match req {
            Ok(req) => {
                if let Err(e) = self.handle_request(ClientIdx(idx), req) {
                    log::warn!("client {idx}: request failed: {e}");
                    self.disconnect_client(ClientIdx(idx));
                }
            }
            Err(ProtoError::Eof) => self.disconnect_client(ClientIdx(idx)),
            Err(e) => {
                log::warn!("client {idx}: protocol error, disconnecting: {e}");
                self.disconnect_client(ClientIdx(idx));
            }
        }
    }

    fn handle_request(&mut self, client: ClientIdx, req: Request) -> Result<(), ServerError> {
        match req {
            Request::CreateSurface { x, y, w, h } => self.create_surface(client, x, y, w, h),
            Request::AttachBuffer { id, w, h, stride, format } => self.attach_buffer(client, id, w, h, stride, format),
            Request::Commit { id } => self.commit(id),
            Request::Frame { id } => self.frame_request(id),
            Request::SetTitle { id, title } => self.set_title(id, title),
            Request::SetPanel { id, edge, height } => self.set_panel(id, edge, height),
            Request::DestroySurface { id } => self.destroy_surface(id),
            Request::Damage { id, x, y, w, h } => self.client_damage(id, x, y, w, h),
            Request::RaiseSurface { id } => self.raise_surface(id),
            Request::ListWindows => self.list_windows(client),
            Request::ClipboardSet { data } => {
                self.clipboard = data;
                Ok(())
            }
            Request::ClipboardGet => self.clipboard_get(client),
            Request::SetMode { .. } => Ok(()),
        }
    }

    fn surface_id_of(&self, id: u32) -> Option<SurfaceId> {
        SurfaceId::from_raw(id)
    }

    fn create_surface(&mut self, client: ClientIdx, x: i32, y: i32, w: u32, h: u32) -> Result<(), ServerError> {
        let slot = self.surfaces.iter().position(|s| s.is_none());
        let slot = match slot {
            Some(i) => i,
            None => {
                self.surfaces.push(None);
                self.surfaces.len() - 1
            }
        };
        let sid = SurfaceId::from_slot(slot);
        let geometry = Geometry { x, y, w, h: h + TITLEBAR_H as u32 };
        let win = self.windows.create(geometry, String::new(), DEFAULT_CHROME_COLOR, Content::External(sid));
        let mut surface = Surface::new(client);
        surface.window = Some(win);
        self.surfaces[slot] = Some(surface);
        self.damage.add_full();
        self.send_to(client, Event::SurfaceId { id: sid.raw() });
        Ok(())
    }

    fn attach_buffer(&mut self, client: ClientIdx, id: u32, w: u32, h: u32, stride: u32, format: u32) -> Result<(), ServerError> {
        let sid = self.surface_id_of(id).ok_or(ServerError::BadArgument("surface id"))?;
        let fmt = PixelFormat::from_u32(format).ok_or(ServerError::BadArgument("pixel format"))?;
        let Some(surface) = self.surfaces.get_mut(sid.slot()).and_then(|s| s.as_mut()) else {
            return Err(ServerError::BadArgument("unknown surface"));
        };
        let Some(client_slot) = self.clients.get(client.0).and_then(|c| c.as_ref()) else {
            return Err(ServerError::BadArgument("unknown client"));
        };
        let fd = wire::recv_fd(&client_slot.stream).map_err(|_| ServerError::BadArgument("missing fd"))?;
        let file = std::fs::File::from(fd);
        let size = (stride as usize) * (h as usize);
        let map = unsafe { memmap2::MmapOptions::new().len(size).map(&file).map_err(ServerError::Io)? };
        surface.shm = Some(ShmMapping { _file: file, map });
        surface.width = w;
        surface.height = h;
        surface.stride = stride;
        surface.format = fmt;
        Ok(())
    }

    fn commit(&mut self, id: u32) -> Result<(), ServerError> {
        let sid = self.surface_id_of(id).ok_or(ServerError::BadArgument("surface id"))?;
        let Some(surface) = self.surfaces.get_mut(sid.slot()).and_then(|s| s.as_mut()) else {
            return Err(ServerError::BadArgument("unknown surface"));
        };
        surface.committed = true;
        if let Some(win) = surface.window {
            if let Some(w) = self.windows.get(win) {
                self.damage.add_rect(Rect::new(w.geometry.x, w.geometry.y, w.geometry.w, w.geometry.h));
            }
        }
        Ok(())
    }

    fn frame_request(&mut self, id: u32) -> Result<(), ServerError> {
        let sid = self.surface_id_of(id).ok_or(ServerError::BadArgument("surface id"))?;
        let Some(surface) = self.surfaces.get_mut(sid.slot()).and_then(|s| s.as_mut()) else {
            return Err(ServerError::BadArgument("unknown surface"));
        };
        surface.frame_requested = true;
        Ok(())
    }

    fn set_title(&mut self, id: u32, title: String) -> Result<(), ServerError> {
        let sid = self.surface_id_of(id).ok_or(ServerError::BadArgument("surface id"))?;
        let win = self.surfaces.get(sid.slot()).and_then(|s| s.as_ref()).and_then(|s| s.window);
        if let Some(win) = win {
            if let Some(w) = self.windows.get_mut(win) {
                w.title = title;
                self.damage.add_rect(Rect::new(w.geometry.x, w.geometry.y, w.geometry.w, w.geometry.h));
            }
        }
        Ok(())
    }

    fn set_panel(&mut self, id: u32, edge: u32, height: u32) -> Result<(), ServerError> {
        let sid = self.surface_id_of(id).ok_or(ServerError::BadArgument("surface id"))?;
        let edge = citc_proto::Edge::from_u32(edge).ok_or(ServerError::BadArgument("edge"))?;
        let win = self.surfaces.get(sid.slot()).and_then(|s| s.as_ref()).and_then(|s| s.window);
        if let Some(win) = win {
            self.windows.set_panel(win, edge, height, self.screen_w, self.screen_h);
        }
        self.damage.add_full();
        Ok(())
    }

    fn destroy_surface(&mut self, id: u32) -> Result<(), ServerError> {
        let sid = self.surface_id_of(id).ok_or(ServerError::BadArgument("surface id"))?;
        self.destroy_surface_inner(sid);
        self.damage.add_full();
        Ok(())
    }

    fn destroy_surface_inner(&mut self, sid: SurfaceId) {
        if let Some(Some(surface)) = self.surfaces.get_mut(sid.slot()) {
            if let Some(win) = surface.window {
                self.windows.destroy(win);
            }
        }
        if let Some(slot) = self.surfaces.get_mut(sid.slot()) {
            *slot = None;
        }
    }

    fn client_damage(&mut self, id: u32, x: i32, y: i32, w: u32, h: u32) -> Result<(), ServerError> {
        let sid = self.surface_id_of(id).ok_or(ServerError::BadArgument("surface id"))?;
        let win = self.surfaces.get(sid.slot()).and_then(|s| s.as_ref()).and_then(|s| s.window);
        if let Some(win) = win {
            if let Some(window) = self.windows.get(win) {
                let content_y_off = if window.style.panel { 0 } else { TITLEBAR_H };
                self.damage.add_rect(Rect::new(window.geometry.x + x, window.geometry.y + content_y_off + y, w, h));
            }
        }
        Ok(())
    }

    fn raise_surface(&mut self, id: u32) -> Result<(), ServerError> {
        let sid = self.surface_id_of(id).ok_or(ServerError::BadArgument("surface id"))?;
        let win = self.surfaces.get(sid.slot()).and_then(|s| s.as_ref()).and_then(|s| s.window);
        if let Some(win) = win {
            let events = self.windows.raise(win);
            self.apply_window_events(events);
            self.damage.add_full();
        }
        Ok(())
    }

    fn list_windows(&mut self, client: ClientIdx) -> Result<(), ServerError> {
        let mut windows = Vec::new();
        for (_id, w) in self.windows.list_windows() {
            let surface_id = w.surface().map(|s| s.raw()).unwrap_or(0);
            windows.push(citc_proto::wire::WindowListEntry { surface_id, title: w.title.clone(), minimized: w.style.minimized });
        }
        self.send_to(client, Event::WindowList { windows });
        Ok(())
    }

    fn clipboard_get(&mut self, client: ClientIdx) -> Result<(), ServerError> {
        let data = self.clipboard.clone();
        self.send_to(client, Event::ClipboardData { data });
        Ok(())
    }

    fn send_to(&mut self, client: ClientIdx, ev: Event) {
        if let Some(slot) = self.clients.get_mut(client.0).and_then(|c| c.as_mut()) {
            if wire::write_event(&mut slot.stream, &ev).is_err() {
                slot.pending_out.push_back(ev);
            }
        }
    }

    /// Closes the socket, unmaps every shm buffer owned by this client,
    /// hides the corresponding windows, and marks full damage (spec.md
    /// §4.7, §8 "client cleanup").
    pub fn disconnect_client(&mut self, client: ClientIdx) {
        for slot in self.surfaces.iter_mut() {
            if let Some(surface) = slot {
                if surface.client_idx == client {
                    if let Some(win) = surface.window {
                        if let Some(w) = self.windows.get_mut(win) {
                            w.style.visible = false;
                        }
                        self.windows.clear_focus_if(win);
                    }
                    *slot = None;
                }
            }
        }
        if let Some(c) = self.clients.get_mut(client.0) {
            *c = None;
        }
        self.damage.add_full();
    }

    /// Dispatches one batch of input events from all devices, routing
    /// per spec.md §4.7's "Input routing" rule: keys go only to the
    /// focused external window's client; motion/button go to whichever
    /// panel the pointer is over, else to the focused client. Internal
    /// focused windows consume input locally.
    pub fn pump_input(&mut self) {
        let mut batches = Vec::new();
        for dev in self.devices.iter_mut() {
            if let Ok(events) = dev.read_events() {
                batches.push(events);
            }
        }
        for events in batches {
            for ev in events {
                self.handle_input_event(ev);
            }
        }
    }

    fn handle_input_event(&mut self, ev: NormalizedEvent) {
        match ev {
            NormalizedEvent::Key { raw_code, pressed } => {
                if self.modifiers.apply(raw_code, pressed) {
                    return;
                }
                if raw_code == KEY_ESC && pressed && self.windows.focused().is_none() {
                    self.request_quit();
                    return;
                }
                let ch = self.key_xlat.translate(raw_code, self.modifiers).map(|c| c as u32).unwrap_or(0);
                let mods = (self.modifiers.shift as u32) | ((self.modifiers.ctrl as u32) << 1);
                if let Some(win) = self.windows.focused() {
                    if let Some(w) = self.windows.get(win) {
                        if let Content::External(sid) = w.content.clone() {
                            if let Some(surface) = self.surfaces.get(sid.slot()).and_then(|s| s.as_ref()) {
                                let client = surface.client_idx;
                                self.send_to(client, Event::Key { keycode: raw_code as u32, state: pressed as u32, ch, mods });
                            }
                        }
                        // Internal focused windows consume input locally: nothing to route.
                    }
                }
            }
            NormalizedEvent::PointerRel { dx, dy } => {
                self.cursor.0 += dx;
                self.cursor.1 += dy;
                self.clamp_cursor();
                self.route_pointer_motion();
            }
            NormalizedEvent::PointerAbs { x_raw, y_raw, max_x, max_y } => {
                if max_x > 0 {
                    self.cursor.0 = (x_raw as i64 * self.screen_w as i64 / max_x as i64) as i32;
                }
                if max_y > 0 {
                    self.cursor.1 = (y_raw as i64 * self.screen_h as i64 / max_y as i64) as i32;
                }
                self.clamp_cursor();
                self.route_pointer_motion();
            }
            NormalizedEvent::Button { code, pressed } => self.route_pointer_button(code, pressed),
        }
        self.damage.add_full();
    }

    fn clamp_cursor(&mut self) {
        self.cursor.0 = self.cursor.0.clamp(0, self.screen_w as i32 - 1);
        self.cursor.1 = self.cursor.1.clamp(0, self.screen_h as i32 - 1);
    }

    /// Motion/button events go to the panel under the pointer when
    /// applicable, otherwise to the focused client (spec.md §4.7) — a hit
    /// on a non-panel, unfocused window must not redirect events there.
    fn target_window(&self) -> Option<WindowId> {
        self.windows
            .hit_test(self.cursor.0, self.cursor.1)
            .filter(|&id| self.windows.get(id).is_some_and(|w| w.style.panel))
            .or_else(|| self.windows.focused())
    }

    fn route_pointer_motion(&mut self) {
        let (x, y) = self.cursor;
        if let Some(win) = self.target_window() {
            self.forward_to_external(win, |id, lx, ly| Event::PointerMotion { id, x: lx, y: ly }, x, y);
        }
    }

    fn route_pointer_button(&mut self, code: u16, pressed: bool) {
        let (x, y) = self.cursor;
        let Some(win) = self.windows.hit_test(x, y) else { return };
        let is_panel = self.windows.get(win).map(|w| w.style.panel).unwrap_or(false);
        if pressed && !is_panel {
            let events = self.windows.button_down(win, x, y);
            self.apply_window_events(events);
        } else if !pressed {
            let events = self.windows.button_up();
            self.apply_window_events(events);
        } else {
            // Panels never receive focus/drag; still forward the button event.
        }
        self.forward_to_external(win, move |id, _lx, _ly| Event::PointerButton { id, btn: code as u32, state: pressed as u32 }, x, y);
        self.damage.add_full();
    }

    fn forward_to_external(&mut self, win: WindowId, make_event: impl FnOnce(u32, i32, i32) -> Event, x: i32, y: i32) {
        let Some(w) = self.windows.get(win) else { return };
        let Content::External(sid) = w.content.clone() else { return };
        let local_x = x - w.geometry.x;
        let local_y = y - w.geometry.y - if w.style.panel { 0 } else { TITLEBAR_H };
        let Some(surface) = self.surfaces.get(sid.slot()).and_then(|s| s.as_ref()) else { return };
        let client = surface.client_idx;
        let ev = make_event(sid.raw(), local_x, local_y);
        self.send_to(client, ev);
    }

    fn apply_window_events(&mut self, events: Vec<WindowEvent>) {
        for ev in events {
            match ev {
                WindowEvent::Configure { win, content_w, content_h } => {
                    if let Some(w) = self.windows.get(win) {
                        if let Content::External(sid) = w.content.clone() {
                            if let Some(surface) = self.surfaces.get(sid.slot()).and_then(|s| s.as_ref()) {
                                let client = surface.client_idx;
                                self.send_to(client, Event::Configure { id: sid.raw(), w: content_w, h: content_h });
                            }
                        }
                    }
                }
                WindowEvent::FocusChanged { old, new } => {
                    if let Some(old) = old {
                        self.notify_focus(old, false);
                    }
                    if let Some(new) = new {
                        self.notify_focus(new, true);
                    }
                }
                WindowEvent::VisibilityChanged { win } => {
                    if let Some(w) = self.windows.get(win) {
                        if !w.style.visible {
                            if let Content::External(sid) = w.content.clone() {
                                self.destroy_surface_inner(sid);
                            }
                        }
                    }
                }
            }
        }
        self.damage.add_full();
    }

    fn notify_focus(&mut self, win: WindowId, focused: bool) {
        let Some(w) = self.windows.get(win) else { return };
        let Content::External(sid) = w.content.clone() else { return };
        let Some(surface) = self.surfaces.get(sid.slot()).and_then(|s| s.as_ref()) else { return };
        let client = surface.client_idx;
        let ev = if focused { Event::FocusIn { id: sid.raw() } } else { Event::FocusOut { id: sid.raw() } };
        self.send_to(client, ev);
    }

    /// One compositor frame: paint, present, FrameDone bookkeeping, reset
    /// damage (spec.md §4.5). Returns `true` if a frame was actually
    /// rendered (the render loop's only idle-CPU mechanism).
    pub fn render_frame(&mut self) -> bool {
        if !self.damage.has_any() {
            return false;
        }
        render::composite_frame(&mut self.fb, &self.windows, &self.surfaces, self.cursor);
        self.fb.present();
        let mut done = Vec::new();
        for slot in self.surfaces.iter_mut() {
            if let Some(surface) = slot {
                if surface.frame_requested {
                    done.push((surface.client_idx, surface.window));
                    surface.frame_requested = false;
                }
            }
        }
        for (client, win) in done {
            if let Some(win) = win {
                if let Some(w) = self.windows.get(win) {
                    if let Content::External(sid) = w.content.clone() {
                        self.send_to(client, Event::FrameDone { id: sid.raw() });
                    }
                }
            }
        }
        self.damage.reset();
        true
    }

    /// The distinguished key (Escape on the compositor's own focus) that
    /// ends the event loop (spec.md §5).
    pub fn request_quit(&mut self) {
        self.quit = true;
    }
}

