//! Errors for the D3D software rasterizer (spec.md §4.12 / C12).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum D3dError {
    #[error("unknown resource handle {0}")]
    UnknownHandle(usize),
    #[error("resource {0} is not a {1}")]
    WrongKind(usize, &'static str),
    #[error("command list already closed")]
    AlreadyClosed,
    #[error("command list not closed")]
    NotClosed,
    #[error("no render target bound")]
    NoRenderTarget,
}

/// DXBC parse failures are never fatal: a malformed blob degrades to the
/// fixed-function path rather than aborting (spec.md §4.12).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ShaderError {
    #[error("truncated shader blob")]
    Truncated,
    #[error("unknown opcode {0}")]
    UnknownOpcode(u32),
    #[error("unknown register file {0}")]
    UnknownRegisterFile(u32),
}
