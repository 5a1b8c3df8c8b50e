//! The CDP client library (spec.md §4.8 / C8): connects to the
//! compositor's Unix socket, creates shared-memory-backed surfaces, and
//! dispatches server events into application-installed callbacks.

pub mod connection;
pub mod error;

pub use connection::{Callbacks, Connection, Surface};
pub use error::ClientError;
