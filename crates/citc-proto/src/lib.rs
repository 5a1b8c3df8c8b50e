//! CDP — the compositor's wire protocol.
//!
//! Length-prefixed binary framing over a Unix stream socket, with a side
//! channel for passing file descriptors alongside `ATTACH_BUFFER`. See
//! `spec.md` §4.6/§6 for the normative frame and message-set definitions.

pub mod damage;
pub mod ids;
pub mod wire;

pub use damage::{DamageList, Rect};
pub use ids::{ClientIdx, Edge, PixelFormat, SurfaceId};
pub use wire::{Event, ProtoError, Request, MAX_PAYLOAD};
