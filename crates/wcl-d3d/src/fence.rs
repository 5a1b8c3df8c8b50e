//! Fence semantics (spec.md §4.12): the rasterizer is synchronous, so
//! `Signal(value)` makes `GetCompletedValue` return `value` immediately
//! and `SetEventOnCompletion` always reports success without blocking.

use std::sync::atomic::Ordering;

use crate::error::D3dError;
use crate::resource::{Resource, ResourceTable};

pub fn signal(table: &mut ResourceTable, handle: usize, value: u64) -> Result<(), D3dError> {
    match table.get_mut(handle).ok_or(D3dError::UnknownHandle(handle))? {
        Resource::Fence { value: v } => {
            v.store(value, Ordering::SeqCst);
            Ok(())
        }
        _ => Err(D3dError::WrongKind(handle, "Fence")),
    }
}

pub fn completed_value(table: &ResourceTable, handle: usize) -> Result<u64, D3dError> {
    match table.get(handle).ok_or(D3dError::UnknownHandle(handle))? {
        Resource::Fence { value } => Ok(value.load(Ordering::SeqCst)),
        _ => Err(D3dError::WrongKind(handle, "Fence")),
    }
}

/// Always returns success immediately: there is nothing to wait on in a
/// synchronous rasterizer.
pub fn set_event_on_completion(table: &ResourceTable, handle: usize, _value: u64) -> Result<(), D3dError> {
    match table.get(handle).ok_or(D3dError::UnknownHandle(handle))? {
        Resource::Fence { .. } => Ok(()),
        _ => Err(D3dError::WrongKind(handle, "Fence")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn signal_is_visible_immediately() {
        let mut table = ResourceTable::new();
        let h = table.insert(Resource::Fence { value: AtomicU64::new(0) });
        signal(&mut table, h, 42).unwrap();
        assert_eq!(completed_value(&table, h).unwrap(), 42);
        assert!(set_event_on_completion(&table, h, 42).is_ok());
    }
}
