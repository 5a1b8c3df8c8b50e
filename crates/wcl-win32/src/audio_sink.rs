//! The background PCM path shared by `dsound` and `xaudio2` (spec.md
//! §4.10): stream to the mixing server over its per-stream Unix socket
//! protocol, falling back to raw OSS, and ultimately to a bit bucket if
//! neither is available. Grounded on `citc_client::connection`'s
//! connect-then-degrade shape, generalized from "CDP socket" to "audio
//! mixer socket".

use std::io::Write;
use std::os::unix::net::UnixStream;

const DEFAULT_MIXER_SOCKET: &str = "/run/citc/audio.sock";
const OSS_DEVICE: &str = "/dev/dsp";

const TAG_OPEN_STREAM: u8 = 0;
const TAG_WRITE: u8 = 1;
const TAG_CLOSE_STREAM: u8 = 2;

enum Backend {
    Mixer { stream: UnixStream, stream_id: u32 },
    Oss(std::fs::File),
    BitBucket,
}

pub struct AudioSink {
    backend: Backend,
}

fn mixer_socket_path() -> String {
    std::env::var("CITC_AUDIO_SOCKET").unwrap_or_else(|_| DEFAULT_MIXER_SOCKET.to_string())
}

fn try_open_mixer_stream(rate: u32, channels: u16, bits: u16) -> Option<(UnixStream, u32)> {
    let mut stream = UnixStream::connect(mixer_socket_path()).ok()?;
    let mut frame = vec![TAG_OPEN_STREAM];
    frame.extend_from_slice(&rate.to_le_bytes());
    frame.extend_from_slice(&channels.to_le_bytes());
    frame.extend_from_slice(&bits.to_le_bytes());
    stream.write_all(&frame).ok()?;
    let mut reply = [0u8; 4];
    std::io::Read::read_exact(&mut stream, &mut reply).ok()?;
    Some((stream, u32::from_le_bytes(reply)))
}

impl AudioSink {
    /// Opens the best available path for a `rate`/`channels`/`bits` PCM
    /// stream: the mixing server, then raw OSS, then a bit bucket
    /// (spec.md §4.10's "dsound/xaudio2 ... fall back to raw OSS ...
    /// ultimately to a bit-bucket").
    pub fn open_best_effort(rate: u32, channels: u16, bits: u16) -> Self {
        if let Some((stream, stream_id)) = try_open_mixer_stream(rate, channels, bits) {
            log::info!("audio stream {stream_id} opened against mixing server");
            return Self { backend: Backend::Mixer { stream, stream_id } };
        }
        match std::fs::OpenOptions::new().write(true).open(OSS_DEVICE) {
            Ok(f) => {
                log::warn!("mixing server unavailable, falling back to {OSS_DEVICE}");
                Self { backend: Backend::Oss(f) }
            }
            Err(_) => {
                log::warn!("no audio sink available, discarding PCM data");
                Self { backend: Backend::BitBucket }
            }
        }
    }

    pub fn write_pcm(&mut self, data: &[u8]) {
        match &mut self.backend {
            Backend::Mixer { stream, stream_id } => {
                let mut frame = vec![TAG_WRITE];
                frame.extend_from_slice(&stream_id.to_le_bytes());
                frame.extend_from_slice(&(data.len() as u32).to_le_bytes());
                frame.extend_from_slice(data);
                if stream.write_all(&frame).is_err() {
                    log::warn!("audio stream {stream_id} write failed, dropping packet");
                }
            }
            Backend::Oss(f) => {
                let _ = f.write_all(data);
            }
            Backend::BitBucket => {}
        }
    }
}

impl Drop for AudioSink {
    fn drop(&mut self) {
        if let Backend::Mixer { stream, stream_id } = &mut self.backend {
            let mut frame = vec![TAG_CLOSE_STREAM];
            frame.extend_from_slice(&stream_id.to_le_bytes());
            let _ = stream.write_all(&frame);
        }
    }
}
