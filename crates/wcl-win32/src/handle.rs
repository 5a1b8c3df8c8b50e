//! A generic opaque-handle table, the same "index into a typed slot
//! table, handle is index+1" shape `citc_proto::ids::SurfaceId` uses,
//! reused here for HWNDs, HDCs, GDI objects, and COM objects alike.

use std::collections::HashMap;

/// Handles are never zero (`0` is `NULL`); slot `n` maps to handle `n+1`.
#[derive(Default)]
pub struct HandleTable<T> {
    slots: HashMap<usize, T>,
    next: usize,
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self { slots: HashMap::new(), next: 1 }
    }

    pub fn insert(&mut self, value: T) -> usize {
        let handle = self.next;
        self.next += 1;
        self.slots.insert(handle, value);
        handle
    }

    pub fn get(&self, handle: usize) -> Option<&T> {
        self.slots.get(&handle)
    }

    pub fn get_mut(&mut self, handle: usize) -> Option<&mut T> {
        self.slots.get_mut(&handle)
    }

    pub fn remove(&mut self, handle: usize) -> Option<T> {
        self.slots.remove(&handle)
    }

    pub fn contains(&self, handle: usize) -> bool {
        self.slots.contains_key(&handle)
    }
}
