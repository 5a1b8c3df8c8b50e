//! Mixing server (spec.md §4.11 / C11): accepts per-stream connections,
//! dispatches their frames into the [`Mixer`], and periodically drains the
//! mixed result to a [`Sink`]. Grounded on `citc_compositor::server`'s
//! `CdpServer` (bind-or-inherit listener, non-blocking per-client slots,
//! disconnect cleanup), generalized from "one client owns many surfaces"
//! to "one client owns many streams".

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};

use thiserror::Error;

use crate::mixer::Mixer;
use crate::protocol::{self, Frame, ProtoError};
use crate::sink::Sink;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

struct ClientSlot {
    stream: UnixStream,
    owned_streams: Vec<u32>,
}

pub struct AudioServer {
    listener: UnixListener,
    clients: Vec<Option<ClientSlot>>,
    mixer: Mixer,
    sink: Sink,
}

/// Resolves an already-listening inherited socket via `LISTEN_FDS`/
/// `LISTEN_PID` socket activation, or binds `path` fresh (spec.md §6, §9 —
/// the same activation contract `citc-compositor` honors).
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
    let listener = UnixListener::bind(path)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

fn ignore_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

impl AudioServer {
    pub fn new(socket_path: &str, sink_device: &str) -> Result<Self, ServerError> {
        ignore_sigpipe();
        let listener = bind_or_inherit(socket_path)?;
        Ok(Self {
            listener,
            clients: Vec::new(),
            mixer: Mixer::new(),
            sink: Sink::open(sink_device),
        })
    }

    pub fn listener_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }

    pub fn client_fds(&self) -> Vec<(usize, RawFd)> {
        self.clients
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (i, c.stream.as_raw_fd())))
            .collect()
    }

    pub fn accept_one(&mut self) -> std::io::Result<()> {
        match self.listener.accept() {
            Ok((stream, _addr)) => {
                stream.set_nonblocking(true)?;
                let free = self.clients.iter().position(|c| c.is_none());
                let idx = match free {
                    Some(i) => i,
                    None => {
                        self.clients.push(None);
                        self.clients.len() - 1
                    }
                };
                self.clients[idx] = Some(ClientSlot { stream, owned_streams: Vec::new() });
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Services one readable client socket: reads exactly one frame and
    /// applies it. Any I/O error or protocol violation disconnects the
    /// client, closing every stream it still owns.
    pub fn service_client(&mut self, idx: usize) {
        let frame = {
            let Some(slot) = self.clients.get_mut(idx).and_then(|c| c.as_mut()) else { return };
            protocol::read_frame(&mut slot.stream)
        };
        match frame {
            Ok(Frame::OpenStream { rate, channels, bits }) => {
                let id = self.mixer.open_stream(rate, channels, bits);
                let Some(slot) = self.clients.get_mut(idx).and_then(|c| c.as_mut()) else { return };
                slot.owned_streams.push(id);
                if protocol::write_stream_id(&mut slot.stream, id).is_err() {
                    self.disconnect_client(idx);
                }
            }
            Ok(Frame::Write { stream_id, payload }) => {
                self.mixer.write(stream_id, &payload);
            }
            Ok(Frame::CloseStream { stream_id }) => {
                self.mixer.close_stream(stream_id);
                if let Some(slot) = self.clients.get_mut(idx).and_then(|c| c.as_mut()) {
                    slot.owned_streams.retain(|&id| id != stream_id);
                }
            }
            Err(ProtoError::Eof) => self.disconnect_client(idx),
            Err(e) => {
                log::warn!("client {idx}: protocol error, disconnecting: {e}");
                self.disconnect_client(idx);
            }
        }
    }

    pub fn disconnect_client(&mut self, idx: usize) {
        if let Some(Some(slot)) = self.clients.get_mut(idx).map(std::mem::take) {
            for id in slot.owned_streams {
                self.mixer.close_stream(id);
            }
        }
    }

    /// One mixing tick: pulls `frame_samples` from every open stream and
    /// writes the saturating sum to the sink (spec.md §4.11, §5).
    pub fn mix_tick(&mut self, frame_samples: usize) {
        if self.mixer.is_empty() {
            return;
        }
        let mixed = self.mixer.mix_tick(frame_samples);
        self.sink.write_samples(&mixed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnecting_idle_slot_is_a_no_op() {
        let mut server = AudioServer::new("/tmp/citc-audio-test-disconnect.sock", "/nonexistent-sink").unwrap();
        server.disconnect_client(0);
        let _ = std::fs::remove_file("/tmp/citc-audio-test-disconnect.sock");
    }
}
