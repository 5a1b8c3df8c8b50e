//! The damage tracker (spec.md §4.3 / C3): a bounded set of invalidated
//! screen rectangles plus a `full` escape hatch, shared between the
//! compositor and tests that want to assert on its behavior directly.

/// Maximum number of discrete rectangles tracked before collapsing to a
/// full-screen redraw.
pub const CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }
}

#[derive(Debug, Default)]
pub struct DamageList {
    rects: Vec<Rect>,
    full: bool,
}

impl DamageList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all damage, returning to the idle state.
    pub fn reset(&mut self) {
        self.rects.clear();
        self.full = false;
    }

    /// Once `full`, further rectangles are a no-op; once capacity would be
    /// exceeded, `full` is set instead of growing unbounded.
    pub fn add_rect(&mut self, rect: Rect) {
        if self.full {
            return;
        }
        if rect.w == 0 || rect.h == 0 {
            return;
        }
        if self.rects.len() >= CAPACITY {
            self.full = true;
            self.rects.clear();
            return;
        }
        self.rects.push(rect);
    }

    pub fn add_full(&mut self) {
        self.full = true;
        self.rects.clear();
    }

    pub fn has_any(&self) -> bool {
        self.full || !self.rects.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_has_no_damage() {
        let d = DamageList::new();
        assert!(!d.has_any());
    }

    #[test]
    fn add_rect_accumulates() {
        let mut d = DamageList::new();
        d.add_rect(Rect::new(0, 0, 10, 10));
        assert!(d.has_any());
        assert!(!d.is_full());
        assert_eq!(d.rects().len(), 1);
    }

    #[test]
    fn full_after_add_full_absorbs_further_rects() {
        let mut d = DamageList::new();
        d.add_full();
        d.add_rect(Rect::new(1, 1, 1, 1));
        d.add_rect(Rect::new(2, 2, 2, 2));
        assert!(d.has_any());
        assert!(d.is_full());
        assert!(d.rects().is_empty());
    }

    #[test]
    fn overflow_collapses_to_full() {
        let mut d = DamageList::new();
        for i in 0..CAPACITY {
            d.add_rect(Rect::new(i as i32, 0, 1, 1));
        }
        assert!(!d.is_full());
        d.add_rect(Rect::new(999, 0, 1, 1));
        assert!(d.is_full());
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut d = DamageList::new();
        d.add_full();
        d.reset();
        assert!(!d.has_any());
        assert!(!d.is_full());
    }

    #[test]
    fn damage_idempotence_property() {
        // add_full() followed by any sequence of add_rect leaves has_any()
        // true, and reset() returns to idle (spec.md §8).
        let mut d = DamageList::new();
        d.add_full();
        for i in 0..5 {
            d.add_rect(Rect::new(i, i, 5, 5));
        }
        assert!(d.has_any());
        d.reset();
        assert!(!d.has_any());
    }
}
