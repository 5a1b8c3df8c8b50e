//! Small typed indices, kept disjoint so a mis-typed handle fails to
//! compile rather than silently aliasing another family (spec.md §9).

use std::num::NonZeroU32;

/// A server-side surface identifier. `slot_index + 1`; `0` means "no
/// surface" and is never a valid `SurfaceId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(NonZeroU32);

impl SurfaceId {
    pub fn from_slot(slot: usize) -> Self {
        SurfaceId(NonZeroU32::new(slot as u32 + 1).expect("slot+1 is never zero"))
    }

    pub fn slot(self) -> usize {
        (self.0.get() - 1) as usize
    }

    pub fn raw(self) -> u32 {
        self.0.get()
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(SurfaceId)
    }
}

/// Index of a connected client's slot in the server's client table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientIdx(pub usize);

/// Pixel format declared by `ATTACH_BUFFER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PixelFormat {
    Xrgb8888 = 0,
    Argb8888 = 1,
}

impl PixelFormat {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(PixelFormat::Xrgb8888),
            1 => Some(PixelFormat::Argb8888),
            _ => None,
        }
    }
}

/// Screen edge a panel is anchored to. The reference compositor only ever
/// anchors to the bottom, but the wire format carries the full set so a
/// future panel shell can pick a different edge without a protocol bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Edge {
    Top = 0,
    Bottom = 1,
    Left = 2,
    Right = 3,
}

impl Edge {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Edge::Top),
            1 => Some(Edge::Bottom),
            2 => Some(Edge::Left),
            3 => Some(Edge::Right),
            _ => None,
        }
    }
}
