//! The mixing server's wire format (spec.md §4.11): `open-stream
//! {rate, channels, bits}` returns a stream id; `write` packets carry
//! `{stream_id, payload}`; `close-stream` ends the stream. No length
//! prefix beyond what each frame's own fixed fields need — this is the
//! server side of the exact byte layout `wcl_win32::audio_sink::AudioSink`
//! writes.

use std::io::{Read, Write};

use thiserror::Error;

pub const TAG_OPEN_STREAM: u8 = 0;
pub const TAG_WRITE: u8 = 1;
pub const TAG_CLOSE_STREAM: u8 = 2;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection closed")]
    Eof,
    #[error("unknown frame tag {0}")]
    UnknownTag(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    OpenStream { rate: u32, channels: u16, bits: u16 },
    Write { stream_id: u32, payload: Vec<u8> },
    CloseStream { stream_id: u32 },
}

fn io_to_proto(e: std::io::Error) -> ProtoError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        ProtoError::Eof
    } else {
        ProtoError::Io(e)
    }
}

/// Reads exactly one frame. The caller is expected to only call this when
/// the underlying socket has reported readable, the same discipline
/// `citc_proto::wire::read_request` relies on.
pub fn read_frame<R: Read>(r: &mut R) -> Result<Frame, ProtoError> {
    let mut tag = [0u8; 1];
    r.read_exact(&mut tag).map_err(io_to_proto)?;
    match tag[0] {
        TAG_OPEN_STREAM => {
            let mut buf = [0u8; 8];
            r.read_exact(&mut buf).map_err(io_to_proto)?;
            let rate = u32::from_le_bytes(buf[0..4].try_into().unwrap());
            let channels = u16::from_le_bytes(buf[4..6].try_into().unwrap());
            let bits = u16::from_le_bytes(buf[6..8].try_into().unwrap());
            Ok(Frame::OpenStream { rate, channels, bits })
        }
        TAG_WRITE => {
            let mut header = [0u8; 8];
            r.read_exact(&mut header).map_err(io_to_proto)?;
            let stream_id = u32::from_le_bytes(header[0..4].try_into().unwrap());
            let len = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;
            let mut payload = vec![0u8; len];
            r.read_exact(&mut payload).map_err(io_to_proto)?;
            Ok(Frame::Write { stream_id, payload })
        }
        TAG_CLOSE_STREAM => {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf).map_err(io_to_proto)?;
            Ok(Frame::CloseStream { stream_id: u32::from_le_bytes(buf) })
        }
        other => Err(ProtoError::UnknownTag(other)),
    }
}

/// Replies to `OpenStream` with the allocated id, the only reply this
/// protocol ever sends.
pub fn write_stream_id<W: Write>(w: &mut W, stream_id: u32) -> std::io::Result<()> {
    w.write_all(&stream_id.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_open_stream() {
        let mut bytes = vec![TAG_OPEN_STREAM];
        bytes.extend_from_slice(&44100u32.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        let frame = read_frame(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(frame, Frame::OpenStream { rate: 44100, channels: 2, bits: 16 });
    }

    #[test]
    fn round_trips_write() {
        let mut bytes = vec![TAG_WRITE];
        bytes.extend_from_slice(&7u32.to_le_bytes());
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        let frame = read_frame(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(frame, Frame::Write { stream_id: 7, payload: vec![1, 2, 3, 4] });
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let bytes = vec![99u8];
        assert!(matches!(read_frame(&mut Cursor::new(bytes)), Err(ProtoError::UnknownTag(99))));
    }
}
