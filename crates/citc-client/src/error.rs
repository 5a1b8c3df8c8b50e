//! Client-side error type, mirroring the repo-wide "thiserror enum wraps
//! the lower-level error" shape used by `citc-proto::wire::ProtoError`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Proto(#[from] citc_proto::ProtoError),
    #[error("connect timed out after {0} attempts")]
    ConnectTimeout(u32),
    #[error("server closed the connection")]
    Disconnected,
    #[error("unexpected event while awaiting {0}")]
    UnexpectedEvent(&'static str),
}
