//! Frame format and message sets (spec.md §4.6, §6).
//!
//! `(type: u32 LE, size: u32 LE, payload[size])`. `type` values for
//! requests and events are drawn from disjoint ranges so a message can
//! never be misinterpreted as the wrong direction's tag. `ATTACH_BUFFER`
//! is the one request immediately followed, on the same stream, by a
//! single file descriptor carried over the socket's ancillary-data
//! channel (ownership transfers to the reader).

use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use nix::cmsg_space;
use nix::sys::socket::{recvmsg, sendmsg, ControlMessage, ControlMessageOwned, MsgFlags};
use thiserror::Error;

/// Maximum payload size for any single frame (spec.md §6).
pub const MAX_PAYLOAD: usize = 256;
/// Maximum length of a title string embedded in `SET_TITLE`.
pub const MAX_TITLE: usize = 64;
/// Maximum length of the clipboard payload carried in one frame.
pub const MAX_CLIPBOARD: usize = 192;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("connection closed")]
    Eof,
    #[error("frame payload {0} exceeds MAX_PAYLOAD ({MAX_PAYLOAD})")]
    Oversized(usize),
    #[error("unknown message tag {0}")]
    UnknownTag(u32),
    #[error("malformed payload for tag {0}")]
    Malformed(u32),
    #[error("ATTACH_BUFFER sent without a trailing descriptor")]
    MissingFd,
    #[error("nix error: {0}")]
    Nix(#[from] nix::Error),
}

// ---------------------------------------------------------------------
// Request / Event message sets
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    CreateSurface { x: i32, y: i32, w: u32, h: u32 },
    DestroySurface { id: u32 },
    AttachBuffer { id: u32, w: u32, h: u32, stride: u32, format: u32 },
    Commit { id: u32 },
    Frame { id: u32 },
    SetTitle { id: u32, title: String },
    SetPanel { id: u32, edge: u32, height: u32 },
    Damage { id: u32, x: i32, y: i32, w: u32, h: u32 },
    SetMode { w: u32, h: u32 },
    ListWindows,
    RaiseSurface { id: u32 },
    ClipboardSet { data: Vec<u8> },
    ClipboardGet,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Welcome { screen_w: u32, screen_h: u32, version: u32 },
    SurfaceId { id: u32 },
    FrameDone { id: u32 },
    PointerMotion { id: u32, x: i32, y: i32 },
    PointerButton { id: u32, btn: u32, state: u32 },
    PointerEnter { id: u32, x: i32, y: i32 },
    PointerLeave { id: u32 },
    Key { keycode: u32, state: u32, ch: u32, mods: u32 },
    FocusIn { id: u32 },
    FocusOut { id: u32 },
    Configure { id: u32, w: u32, h: u32 },
    WindowList { windows: Vec<WindowListEntry> },
    ClipboardData { data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowListEntry {
    pub surface_id: u32,
    pub title: String,
    pub minimized: bool,
}

// Request tags: 0x00.. ; event tags: 0x100.. — disjoint ranges so the two
// enums can never collide on the wire.
mod tag {
    pub const CREATE_SURFACE: u32 = 0x00;
    pub const DESTROY_SURFACE: u32 = 0x01;
    pub const ATTACH_BUFFER: u32 = 0x02;
    pub const COMMIT: u32 = 0x03;
    pub const FRAME: u32 = 0x04;
    pub const SET_TITLE: u32 = 0x05;
    pub const SET_PANEL: u32 = 0x06;
    pub const DAMAGE: u32 = 0x07;
    pub const SET_MODE: u32 = 0x08;
    pub const LIST_WINDOWS: u32 = 0x09;
    pub const RAISE_SURFACE: u32 = 0x0A;
    pub const CLIPBOARD_SET: u32 = 0x0B;
    pub const CLIPBOARD_GET: u32 = 0x0C;

    pub const WELCOME: u32 = 0x100;
    pub const SURFACE_ID: u32 = 0x101;
    pub const FRAME_DONE: u32 = 0x102;
    pub const POINTER_MOTION: u32 = 0x103;
    pub const POINTER_BUTTON: u32 = 0x104;
    pub const POINTER_ENTER: u32 = 0x105;
    pub const POINTER_LEAVE: u32 = 0x106;
    pub const KEY: u32 = 0x107;
    pub const FOCUS_IN: u32 = 0x108;
    pub const FOCUS_OUT: u32 = 0x109;
    pub const CONFIGURE: u32 = 0x10A;
    pub const WINDOW_LIST: u32 = 0x10B;
    pub const CLIPBOARD_DATA: u32 = 0x10C;
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn put_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn get_u32(buf: &[u8], off: usize) -> Result<u32, ProtoError> {
    let bytes: [u8; 4] = buf
        .get(off..off + 4)
        .ok_or(ProtoError::Malformed(0))?
        .try_into()
        .unwrap();
    Ok(u32::from_le_bytes(bytes))
}
fn get_i32(buf: &[u8], off: usize) -> Result<i32, ProtoError> {
    get_u32(buf, off).map(|v| v as i32)
}

fn put_str_fixed(buf: &mut Vec<u8>, s: &str, max: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(max);
    put_u32(buf, n as u32);
    buf.extend_from_slice(&bytes[..n]);
}
fn get_str_fixed(buf: &[u8], off: usize, tag_for_err: u32) -> Result<(String, usize), ProtoError> {
    let n = get_u32(buf, off)? as usize;
    let start = off + 4;
    let data = buf
        .get(start..start + n)
        .ok_or(ProtoError::Malformed(tag_for_err))?;
    let s = String::from_utf8_lossy(data).into_owned();
    Ok((s, start + n))
}

impl Request {
    pub fn encode(&self) -> Result<(u32, Vec<u8>), ProtoError> {
        let mut buf = Vec::new();
        let t = match self {
            Request::CreateSurface { x, y, w, h } => {
                put_i32(&mut buf, *x);
                put_i32(&mut buf, *y);
                put_u32(&mut buf, *w);
                put_u32(&mut buf, *h);
                tag::CREATE_SURFACE
            }
            Request::DestroySurface { id } => {
                put_u32(&mut buf, *id);
                tag::DESTROY_SURFACE
            }
            Request::AttachBuffer { id, w, h, stride, format } => {
                put_u32(&mut buf, *id);
                put_u32(&mut buf, *w);
                put_u32(&mut buf, *h);
                put_u32(&mut buf, *stride);
                put_u32(&mut buf, *format);
                tag::ATTACH_BUFFER
            }
            Request::Commit { id } => {
                put_u32(&mut buf, *id);
                tag::COMMIT
            }
            Request::Frame { id } => {
                put_u32(&mut buf, *id);
                tag::FRAME
            }
            Request::SetTitle { id, title } => {
                put_u32(&mut buf, *id);
                put_str_fixed(&mut buf, title, MAX_TITLE);
                tag::SET_TITLE
            }
            Request::SetPanel { id, edge, height } => {
                put_u32(&mut buf, *id);
                put_u32(&mut buf, *edge);
                put_u32(&mut buf, *height);
                tag::SET_PANEL
            }
            Request::Damage { id, x, y, w, h } => {
                put_u32(&mut buf, *id);
                put_i32(&mut buf, *x);
                put_i32(&mut buf, *y);
                put_u32(&mut buf, *w);
                put_u32(&mut buf, *h);
                tag::DAMAGE
            }
            Request::SetMode { w, h } => {
                put_u32(&mut buf, *w);
                put_u32(&mut buf, *h);
                tag::SET_MODE
            }
            Request::ListWindows => tag::LIST_WINDOWS,
            Request::RaiseSurface { id } => {
                put_u32(&mut buf, *id);
                tag::RAISE_SURFACE
            }
            Request::ClipboardSet { data } => {
                let n = data.len().min(MAX_CLIPBOARD);
                put_u32(&mut buf, n as u32);
                buf.extend_from_slice(&data[..n]);
                tag::CLIPBOARD_SET
            }
            Request::ClipboardGet => tag::CLIPBOARD_GET,
        };
        if buf.len() > MAX_PAYLOAD {
            return Err(ProtoError::Oversized(buf.len()));
        }
        Ok((t, buf))
    }

    pub fn decode(t: u32, p: &[u8]) -> Result<Self, ProtoError> {
        Ok(match t {
            tag::CREATE_SURFACE => Request::CreateSurface {
                x: get_i32(p, 0)?,
                y: get_i32(p, 4)?,
                w: get_u32(p, 8)?,
                h: get_u32(p, 12)?,
            },
            tag::DESTROY_SURFACE => Request::DestroySurface { id: get_u32(p, 0)? },
            tag::ATTACH_BUFFER => Request::AttachBuffer {
                id: get_u32(p, 0)?,
                w: get_u32(p, 4)?,
                h: get_u32(p, 8)?,
                stride: get_u32(p, 12)?,
                format: get_u32(p, 16)?,
            },
            tag::COMMIT => Request::Commit { id: get_u32(p, 0)? },
            tag::FRAME => Request::Frame { id: get_u32(p, 0)? },
            tag::SET_TITLE => {
                let id = get_u32(p, 0)?;
                let (title, _) = get_str_fixed(p, 4, t)?;
                Request::SetTitle { id, title }
            }
            tag::SET_PANEL => Request::SetPanel {
                id: get_u32(p, 0)?,
                edge: get_u32(p, 4)?,
                height: get_u32(p, 8)?,
            },
            tag::DAMAGE => Request::Damage {
                id: get_u32(p, 0)?,
                x: get_i32(p, 4)?,
                y: get_i32(p, 8)?,
                w: get_u32(p, 12)?,
                h: get_u32(p, 16)?,
            },
            tag::SET_MODE => Request::SetMode { w: get_u32(p, 0)?, h: get_u32(p, 4)? },
            tag::LIST_WINDOWS => Request::ListWindows,
            tag::RAISE_SURFACE => Request::RaiseSurface { id: get_u32(p, 0)? },
            tag::CLIPBOARD_SET => {
                let n = get_u32(p, 0)? as usize;
                let data = p.get(4..4 + n).ok_or(ProtoError::Malformed(t))?.to_vec();
                Request::ClipboardSet { data }
            }
            tag::CLIPBOARD_GET => Request::ClipboardGet,
            other => return Err(ProtoError::UnknownTag(other)),
        })
    }

    /// `true` for the one request that is immediately followed by a
    /// passed file descriptor on the same stream.
    pub fn carries_fd(&self) -> bool {
        matches!(self, Request::AttachBuffer { .. })
    }
}

impl Event {
    pub fn encode(&self) -> Result<(u32, Vec<u8>), ProtoError> {
        let mut buf = Vec::new();
        let t = match self {
            Event::Welcome { screen_w, screen_h, version } => {
                put_u32(&mut buf, *screen_w);
                put_u32(&mut buf, *screen_h);
                put_u32(&mut buf, *version);
                tag::WELCOME
            }
            Event::SurfaceId { id } => {
                put_u32(&mut buf, *id);
                tag::SURFACE_ID
            }
            Event::FrameDone { id } => {
                put_u32(&mut buf, *id);
                tag::FRAME_DONE
            }
            Event::PointerMotion { id, x, y } => {
                put_u32(&mut buf, *id);
                put_i32(&mut buf, *x);
                put_i32(&mut buf, *y);
                tag::POINTER_MOTION
            }
            Event::PointerButton { id, btn, state } => {
                put_u32(&mut buf, *id);
                put_u32(&mut buf, *btn);
                put_u32(&mut buf, *state);
                tag::POINTER_BUTTON
            }
            Event::PointerEnter { id, x, y } => {
                put_u32(&mut buf, *id);
                put_i32(&mut buf, *x);
                put_i32(&mut buf, *y);
                tag::POINTER_ENTER
            }
            Event::PointerLeave { id } => {
                put_u32(&mut buf, *id);
                tag::POINTER_LEAVE
            }
            Event::Key { keycode, state, ch, mods } => {
                put_u32(&mut buf, *keycode);
                put_u32(&mut buf, *state);
                put_u32(&mut buf, *ch);
                put_u32(&mut buf, *mods);
                tag::KEY
            }
            Event::FocusIn { id } => {
                put_u32(&mut buf, *id);
                tag::FOCUS_IN
            }
            Event::FocusOut { id } => {
                put_u32(&mut buf, *id);
                tag::FOCUS_OUT
            }
            Event::Configure { id, w, h } => {
                put_u32(&mut buf, *id);
                put_u32(&mut buf, *w);
                put_u32(&mut buf, *h);
                tag::CONFIGURE
            }
            Event::WindowList { windows } => {
                put_u32(&mut buf, windows.len() as u32);
                for w in windows {
                    put_u32(&mut buf, w.surface_id);
                    put_u32(&mut buf, w.minimized as u32);
                    put_str_fixed(&mut buf, &w.title, MAX_TITLE);
                }
                tag::WINDOW_LIST
            }
            Event::ClipboardData { data } => {
                let n = data.len().min(MAX_CLIPBOARD);
                put_u32(&mut buf, n as u32);
                buf.extend_from_slice(&data[..n]);
                tag::CLIPBOARD_DATA
            }
        };
        if buf.len() > MAX_PAYLOAD {
            return Err(ProtoError::Oversized(buf.len()));
        }
        Ok((t, buf))
    }

    pub fn decode(t: u32, p: &[u8]) -> Result<Self, ProtoError> {
        Ok(match t {
            tag::WELCOME => Event::Welcome {
                screen_w: get_u32(p, 0)?,
                screen_h: get_u32(p, 4)?,
                version: get_u32(p, 8)?,
            },
            tag::SURFACE_ID => Event::SurfaceId { id: get_u32(p, 0)? },
            tag::FRAME_DONE => Event::FrameDone { id: get_u32(p, 0)? },
            tag::POINTER_MOTION => Event::PointerMotion {
                id: get_u32(p, 0)?,
                x: get_i32(p, 4)?,
                y: get_i32(p, 8)?,
            },
            tag::POINTER_BUTTON => Event::PointerButton {
                id: get_u32(p, 0)?,
                btn: get_u32(p, 4)?,
                state: get_u32(p, 8)?,
            },
            tag::POINTER_ENTER => Event::PointerEnter {
                id: get_u32(p, 0)?,
                x: get_i32(p, 4)?,
                y: get_i32(p, 8)?,
            },
            tag::POINTER_LEAVE => Event::PointerLeave { id: get_u32(p, 0)? },
            tag::KEY => Event::Key {
                keycode: get_u32(p, 0)?,
                state: get_u32(p, 4)?,
                ch: get_u32(p, 8)?,
                mods: get_u32(p, 12)?,
            },
            tag::FOCUS_IN => Event::FocusIn { id: get_u32(p, 0)? },
            tag::FOCUS_OUT => Event::FocusOut { id: get_u32(p, 0)? },
            tag::CONFIGURE => Event::Configure {
                id: get_u32(p, 0)?,
                w: get_u32(p, 4)?,
                h: get_u32(p, 8)?,
            },
            tag::WINDOW_LIST => {
                let count = get_u32(p, 0)? as usize;
                let mut off = 4;
                let mut windows = Vec::with_capacity(count);
                for _ in 0..count {
                    let surface_id = get_u32(p, off)?;
                    let minimized = get_u32(p, off + 4)? != 0;
                    let (title, next) = get_str_fixed(p, off + 8, t)?;
                    off = next;
                    windows.push(WindowListEntry { surface_id, title, minimized });
                }
                Event::WindowList { windows }
            }
            tag::CLIPBOARD_DATA => {
                let n = get_u32(p, 0)? as usize;
                let data = p.get(4..4 + n).ok_or(ProtoError::Malformed(t))?.to_vec();
                Event::ClipboardData { data }
            }
            other => return Err(ProtoError::UnknownTag(other)),
        })
    }
}

// ---------------------------------------------------------------------
// Framing I/O
// ---------------------------------------------------------------------

/// Reads exactly `buf.len()` bytes, retrying on `EINTR`. A 0-byte read is
/// end-of-stream.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<(), ProtoError> {
    let mut off = 0;
    while off < buf.len() {
        match r.read(&mut buf[off..]) {
            Ok(0) => return Err(ProtoError::Eof),
            Ok(n) => off += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ProtoError::Io(e)),
        }
    }
    Ok(())
}

fn write_full<W: Write>(w: &mut W, buf: &[u8]) -> Result<(), ProtoError> {
    let mut off = 0;
    while off < buf.len() {
        match w.write(&buf[off..]) {
            Ok(0) => return Err(ProtoError::Eof),
            Ok(n) => off += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ProtoError::Io(e)),
        }
    }
    Ok(())
}

/// Reads one `(type, payload)` frame. Rejects oversized payloads as a
/// protocol violation without attempting to read (and discard) the body.
pub fn read_frame<R: Read>(r: &mut R) -> Result<(u32, Vec<u8>), ProtoError> {
    let mut hdr = [0u8; 8];
    read_full(r, &mut hdr)?;
    let t = u32::from_le_bytes(hdr[0..4].try_into().unwrap());
    let size = u32::from_le_bytes(hdr[4..8].try_into().unwrap()) as usize;
    if size > MAX_PAYLOAD {
        return Err(ProtoError::Oversized(size));
    }
    let mut payload = vec![0u8; size];
    read_full(r, &mut payload)?;
    Ok((t, payload))
}

pub fn write_frame<W: Write>(w: &mut W, t: u32, payload: &[u8]) -> Result<(), ProtoError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(ProtoError::Oversized(payload.len()));
    }
    let mut hdr = [0u8; 8];
    hdr[0..4].copy_from_slice(&t.to_le_bytes());
    hdr[4..8].copy_from_slice(&(payload.len() as u32).to_le_bytes());
    write_full(w, &hdr)?;
    write_full(w, payload)?;
    Ok(())
}

pub fn write_request<W: Write>(w: &mut W, req: &Request) -> Result<(), ProtoError> {
    let (t, payload) = req.encode()?;
    write_frame(w, t, &payload)
}

pub fn write_event<W: Write>(w: &mut W, ev: &Event) -> Result<(), ProtoError> {
    let (t, payload) = ev.encode()?;
    write_frame(w, t, &payload)
}

pub fn read_request<R: Read>(r: &mut R) -> Result<Request, ProtoError> {
    let (t, p) = read_frame(r)?;
    Request::decode(t, &p)
}

pub fn read_event<R: Read>(r: &mut R) -> Result<Event, ProtoError> {
    let (t, p) = read_frame(r)?;
    Event::decode(t, &p)
}

// ---------------------------------------------------------------------
// Descriptor passing (ATTACH_BUFFER's out-of-band fd)
// ---------------------------------------------------------------------

/// Sends one descriptor as ancillary data, with one filler byte of
/// regular payload as the kernel requires for `SCM_RIGHTS` to carry any
/// data at all.
pub fn send_fd<S: AsRawFd>(sock: &S, fd: RawFd) -> Result<(), ProtoError> {
    let iov = [std::io::IoSlice::new(&[0u8])];
    let fds = [fd];
    let cmsg = [ControlMessage::ScmRights(&fds)];
    sendmsg::<()>(sock.as_raw_fd(), &iov, &cmsg, MsgFlags::empty(), None)?;
    Ok(())
}

/// Receives one descriptor passed via `send_fd`. The caller is
/// responsible for setting close-on-exec and mapping it before reading
/// any further framed message on the connection (spec.md §4.6/§9).
pub fn recv_fd<S: AsRawFd>(sock: &S) -> Result<OwnedFd, ProtoError> {
    let mut filler = [0u8; 1];
    let mut iov = [std::io::IoSliceMut::new(&mut filler)];
    let mut space = cmsg_space!([RawFd; 1]);
    let msg = recvmsg::<()>(sock.as_raw_fd(), &mut iov, Some(&mut space), MsgFlags::empty())?;
    for cmsg in msg.cmsgs() {
        if let ControlMessageOwned::ScmRights(fds) = cmsg {
            if let Some(&fd) = fds.first() {
                use std::os::fd::FromRawFd;
                return Ok(unsafe { OwnedFd::from_raw_fd(fd) });
            }
        }
    }
    Err(ProtoError::MissingFd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;

    #[test]
    fn framing_round_trip() {
        let reqs = vec![
            Request::CreateSurface { x: 100, y: 100, w: 300, h: 200 },
            Request::SetTitle { id: 1, title: "hello".into() },
            Request::ClipboardSet { data: b"clip".to_vec() },
            Request::ListWindows,
        ];
        for req in reqs {
            let (t, payload) = req.encode().unwrap();
            assert!(payload.len() <= MAX_PAYLOAD);
            let decoded = Request::decode(t, &payload).unwrap();
            assert_eq!(decoded, req);
        }
    }

    #[test]
    fn event_round_trip() {
        let evs = vec![
            Event::Welcome { screen_w: 1920, screen_h: 1080, version: 1 },
            Event::SurfaceId { id: 1 },
            Event::Key { keycode: 30, state: 1, ch: b'a' as u32, mods: 0 },
            Event::WindowList {
                windows: vec![WindowListEntry { surface_id: 1, title: "t".into(), minimized: false }],
            },
        ];
        for ev in evs {
            let (t, payload) = ev.encode().unwrap();
            let decoded = Event::decode(t, &payload).unwrap();
            assert_eq!(decoded, ev);
        }
    }

    #[test]
    fn oversized_payload_rejected() {
        let req = Request::ClipboardSet { data: vec![0u8; MAX_CLIPBOARD] };
        let (t, payload) = req.encode().unwrap();
        assert!(payload.len() <= MAX_PAYLOAD);
        // A hand-crafted oversized frame must be rejected before the body is read.
        let huge = MAX_PAYLOAD as u32 + 1;
        let mut hdr = Vec::new();
        hdr.extend_from_slice(&t.to_le_bytes());
        hdr.extend_from_slice(&huge.to_le_bytes());
        let mut cursor = std::io::Cursor::new(hdr);
        let err = read_frame(&mut cursor).unwrap_err();
        assert!(matches!(err, ProtoError::Oversized(_)));
    }

    #[test]
    fn socket_frame_round_trip() {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        let req = Request::CreateSurface { x: 1, y: 2, w: 3, h: 4 };
        write_request(&mut a, &req).unwrap();
        let got = read_request(&mut b).unwrap();
        assert_eq!(got, req);
    }

    #[test]
    fn fd_passing_round_trip() {
        let (a, b) = UnixStream::pair().unwrap();
        let tmp = tempfile_like();
        send_fd(&a, tmp.as_raw_fd()).unwrap();
        let received = recv_fd(&b).unwrap();
        // The received descriptor refers to the same open file.
        let stat_a = nix::sys::stat::fstat(tmp.as_raw_fd()).unwrap();
        let stat_b = nix::sys::stat::fstat(received.as_raw_fd()).unwrap();
        assert_eq!(stat_a.st_ino, stat_b.st_ino);
    }

    fn tempfile_like() -> std::fs::File {
        use std::io::Seek;
        let mut f = tempfile_shim();
        f.set_len(4096).unwrap();
        f.seek(std::io::SeekFrom::Start(0)).unwrap();
        f
    }

    fn tempfile_shim() -> std::fs::File {
        let path = std::env::temp_dir().join(format!("citc-proto-test-{}", std::process::id()));
        std::fs::File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .unwrap()
    }
}
