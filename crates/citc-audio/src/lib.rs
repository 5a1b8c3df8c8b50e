//! PCM mixing server (spec.md §4.11 / C11): a connectionless per-stream
//! protocol over a Unix socket, mixing concurrent 16-bit PCM streams by
//! saturating sum and emitting the result to the system audio sink.

pub mod args;
pub mod config;
pub mod mixer;
pub mod protocol;
pub mod server;
pub mod sink;
