//! Surface/window table (spec.md §4.4 / C4): stacking order, visibility,
//! focus, and drag/resize/maximize modality. Grounded on the teacher's
//! `compositor/state.rs` (`Space<Window>` ownership, `surface_under`
//! hit-testing) and `compositor/grabs/move_grab.rs` (drag-grab state
//! machine), generalized from smithay's `Space` to an explicit Z-ordered
//! `Vec` of slots since CDP surfaces are not Wayland surfaces.

use citc_proto::{Edge, SurfaceId};

pub const MIN_W: u32 = 120;
pub const MIN_H: u32 = 80;
pub const TITLEBAR_H: i32 = 24;
const BUTTON_W: i32 = 20;
const RESIZE_MARGIN: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub usize);

#[derive(Debug, Clone)]
pub enum Content {
    /// Server-owned content (e.g. the compositor's own status surfaces).
    Internal(String),
    /// Backed by a client's CDP surface.
    External(SurfaceId),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Style {
    pub visible: bool,
    pub panel: bool,
    pub minimized: bool,
    pub maximized: bool,
}

#[derive(Debug, Clone)]
pub struct Window {
    pub geometry: Geometry,
    pub title: String,
    pub content: Content,
    pub style: Style,
    pub saved_geometry: Option<Geometry>,
    pub chrome_color: u32,
}

impl Window {
    pub fn surface(&self) -> Option<SurfaceId> {
        match &self.content {
            Content::External(id) => Some(*id),
            Content::Internal(_) => None,
        }
    }

    fn content_height(&self) -> i32 {
        if self.style.panel {
            self.geometry.h as i32
        } else {
            (self.geometry.h as i32 - TITLEBAR_H).max(0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeEdge {
    Top,
    Bottom,
    Left,
    Right,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Close,
    Minimize,
    Maximize,
    Resize(ResizeEdge),
    Titlebar,
    Client,
}

#[derive(Debug, Clone, Copy)]
enum Modality {
    None,
    Dragging { win: WindowId, offset: (i32, i32) },
    Resizing { win: WindowId, edge: ResizeEdge, orig: Geometry, cursor_origin: (i32, i32) },
}

/// Outbound effects produced by a table mutation, for the caller (the CDP
/// server) to translate into wire events.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowEvent {
    Configure { win: WindowId, content_w: u32, content_h: u32 },
    FocusChanged { old: Option<WindowId>, new: Option<WindowId> },
    VisibilityChanged { win: WindowId },
}

pub struct WindowTable {
    slots: Vec<Option<Window>>,
    /// Back-to-front order, indices into `slots`. Panels are always kept
    /// after normal windows in this Vec and painted after them.
    order: Vec<usize>,
    focused: Option<WindowId>,
    modality: Modality,
    screen_w: u32,
    screen_h: u32,
    reserved_bottom: u32,
}

impl Default for WindowTable {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowTable {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            order: Vec::new(),
            focused: None,
            modality: Modality::None,
            screen_w: 0,
            screen_h: 0,
            reserved_bottom: 0,
        }
    }

    /// Sets the screen extents used by `Region::Maximize` (spec.md §4.4).
    /// Must be called before any window is maximized through
    /// `button_down`; `toggle_maximize` called directly still takes its
    /// own explicit `screen_size`/`reserved_bottom`.
    pub fn set_screen_size(&mut self, w: u32, h: u32) {
        self.screen_w = w;
        self.screen_h = h;
    }

    pub fn create(&mut self, mut geometry: Geometry, title: String, chrome_color: u32, content: Content) -> WindowId {
        let panel = false;
        if !panel {
            geometry.w = geometry.w.max(MIN_W);
            geometry.h = geometry.h.max(MIN_H);
        }
        let win = Window {
            geometry,
            title,
            content,
            style: Style { visible: true, panel, minimized: false, maximized: false },
            saved_geometry: None,
            chrome_color,
        };
        let idx = self.alloc_slot(win);
        self.order.push(idx);
        WindowId(idx)
    }

    fn alloc_slot(&mut self, win: Window) -> usize {
        if let Some(idx) = self.slots.iter().position(|s| s.is_none()) {
            self.slots[idx] = Some(win);
            idx
        } else {
            self.slots.push(Some(win));
            self.slots.len() - 1
        }
    }

    pub fn get(&self, id: WindowId) -> Option<&Window> {
        self.slots.get(id.0).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: WindowId) -> Option<&mut Window> {
        self.slots.get_mut(id.0).and_then(|s| s.as_mut())
    }

    pub fn focused(&self) -> Option<WindowId> {
        self.focused
    }

    /// Back-to-front iteration order, matching the C5 renderer's walk.
    pub fn iter_back_to_front(&self) -> impl Iterator<Item = (WindowId, &Window)> {
        self.order.iter().filter_map(move |&idx| self.slots[idx].as_ref().map(|w| (WindowId(idx), w)))
    }

    pub fn destroy(&mut self, id: WindowId) -> bool {
        if self.slots.get(id.0).map(|s| s.is_some()) != Some(true) {
            return false;
        }
        self.slots[id.0] = None;
        self.order.retain(|&idx| idx != id.0);
        if self.focused == Some(id) {
            self.focused = None;
        }
        true
    }

    /// Moves `w` to the top of the non-panel region and updates focus
    /// (spec.md §4.4, §8 "window-stack monotonicity").
    pub fn focus(&mut self, id: WindowId) -> Vec<WindowEvent> {
        let mut events = Vec::new();
        let Some(win) = self.get(id) else { return events };
        if win.style.panel {
            return events;
        }
        let old = self.focused;
        // Remove id from order, then reinsert just before the first panel
        // (or at the very end if there is none), keeping panels last.
        self.order.retain(|&idx| idx != id.0);
        let insert_at = self.order.iter().position(|&idx| self.slots[idx].as_ref().is_some_and(|w| w.style.panel))
            .unwrap_or(self.order.len());
        self.order.insert(insert_at, id.0);
        if old != Some(id) {
            self.focused = Some(id);
            events.push(WindowEvent::FocusChanged { old, new: Some(id) });
        }
        events
    }

    pub fn clear_focus_if(&mut self, id: WindowId) -> Vec<WindowEvent> {
        if self.focused == Some(id) {
            self.focused = None;
            return vec![WindowEvent::FocusChanged { old: Some(id), new: None }];
        }
        Vec::new()
    }

    /// Panels are hit first (their hit zone is their entire rect), then
    /// non-panels front-to-back (spec.md §4.4, §8 "hit-test priority").
    pub fn hit_test(&self, x: i32, y: i32) -> Option<WindowId> {
        for &idx in self.order.iter().rev() {
            let Some(win) = self.slots[idx].as_ref() else { continue };
            if !win.style.panel || !win.style.visible {
                continue;
            }
            if contains(win.geometry, x, y) {
                return Some(WindowId(idx));
            }
        }
        for &idx in self.order.iter().rev() {
            let Some(win) = self.slots[idx].as_ref() else { continue };
            if win.style.panel || !win.style.visible {
                continue;
            }
            if contains(win.geometry, x, y) {
                return Some(WindowId(idx));
            }
        }
        None
    }

    /// Classifies a point within a known window's rect (spec.md §4.4's
    /// button-down region table).
    pub fn region_at(&self, id: WindowId, x: i32, y: i32) -> Option<Region> {
        let win = self.get(id)?;
        if win.style.panel {
            return Some(Region::Client);
        }
        let g = win.geometry;
        let local_x = x - g.x;
        let local_y = y - g.y;
        if local_x < 0 || local_y < 0 || local_x >= g.w as i32 || local_y >= g.h as i32 {
            return None;
        }
        // Resize edges take priority near the border.
        let near_left = local_x < RESIZE_MARGIN;
        let near_right = local_x >= g.w as i32 - RESIZE_MARGIN;
        let near_top = local_y < RESIZE_MARGIN;
        let near_bottom = local_y >= g.h as i32 - RESIZE_MARGIN;
        let edge = match (near_top, near_bottom, near_left, near_right) {
            (true, _, true, _) => Some(ResizeEdge::TopLeft),
            (true, _, _, true) => Some(ResizeEdge::TopRight),
            (_, true, true, _) => Some(ResizeEdge::BottomLeft),
            (_, true, _, true) => Some(ResizeEdge::BottomRight),
            (true, _, _, _) => Some(ResizeEdge::Top),
            (_, true, _, _) => Some(ResizeEdge::Bottom),
            (_, _, true, _) => Some(ResizeEdge::Left),
            (_, _, _, true) => Some(ResizeEdge::Right),
            _ => None,
        };
        if let Some(edge) = edge {
            return Some(Region::Resize(edge));
        }
        if local_y < TITLEBAR_H {
            if local_x >= g.w as i32 - BUTTON_W {
                return Some(Region::Close);
            }
            if local_x >= g.w as i32 - BUTTON_W * 2 {
                return Some(Region::Maximize);
            }
            if local_x >= g.w as i32 - BUTTON_W * 3 {
                return Some(Region::Minimize);
            }
            return Some(Region::Titlebar);
        }
        Some(Region::Client)
    }

    /// Runs the full button-down state machine for a pointer press at
    /// `(x, y)` on `id` (spec.md §4.4's region table).
    pub fn button_down(&mut self, id: WindowId, x: i32, y: i32) -> Vec<WindowEvent> {
        let Some(region) = self.region_at(id, x, y) else { return Vec::new() };
        match region {
            Region::Close => {
                let mut events = self.clear_focus_if(id);
                if let Some(win) = self.get_mut(id) {
                    win.style.visible = false;
                }
                events.push(WindowEvent::VisibilityChanged { win: id });
                events
            }
            Region::Minimize => {
                self.minimize(id)
            }
            Region::Maximize => self.toggle_maximize(id, (self.screen_w, self.screen_h), self.reserved_bottom),
            Region::Resize(edge) => {
                if let Some(win) = self.get(id) {
                    self.modality = Modality::Resizing { win: id, edge, orig: win.geometry, cursor_origin: (x, y) };
                }
                Vec::new()
            }
            Region::Titlebar => {
                let events = self.focus(id);
                if let Some(win) = self.get(id) {
                    let offset = (x - win.geometry.x, y - win.geometry.y);
                    self.modality = Modality::Dragging { win: id, offset };
                }
                events
            }
            Region::Client => self.focus(id),
        }
    }

    /// Called on pointer motion while a drag/resize is active.
    pub fn pointer_moved(&mut self, x: i32, y: i32) {
        match self.modality {
            Modality::Dragging { win, offset } => {
                if let Some(w) = self.get_mut(win) {
                    w.geometry.x = x - offset.0;
                    w.geometry.y = y - offset.1;
                }
            }
            Modality::Resizing { win, edge, orig, cursor_origin } => {
                let dx = x - cursor_origin.0;
                let dy = y - cursor_origin.1;
                if let Some(w) = self.get_mut(win) {
                    apply_resize(w, orig, edge, dx, dy);
                }
            }
            Modality::None => {}
        }
    }

    /// Exits drag/resize on button-up; a resize exit emits `Configure`
    /// with the new content size (spec.md §4.4).
    pub fn button_up(&mut self) -> Vec<WindowEvent> {
        match std::mem::replace(&mut self.modality, Modality::None) {
            Modality::Resizing { win, .. } => {
                if let Some(w) = self.get(win) {
                    let content_h = w.content_height().max(0) as u32;
                    return vec![WindowEvent::Configure { win, content_w: w.geometry.w, content_h }];
                }
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    pub fn begin_drag(&mut self, id: WindowId, cursor_off: (i32, i32)) {
        self.modality = Modality::Dragging { win: id, offset: cursor_off };
    }

    pub fn begin_resize(&mut self, id: WindowId, edge: ResizeEdge, cursor_pos: (i32, i32)) {
        if let Some(win) = self.get(id) {
            self.modality = Modality::Resizing { win: id, edge, orig: win.geometry, cursor_origin: cursor_pos };
        }
    }

    pub fn toggle_maximize(&mut self, id: WindowId, screen_size: (u32, u32), reserved_bottom: u32) -> Vec<WindowEvent> {
        let Some(win) = self.get_mut(id) else { return Vec::new() };
        if win.style.maximized {
            if let Some(saved) = win.saved_geometry.take() {
                win.geometry = saved;
            }
            win.style.maximized = false;
        } else {
            win.saved_geometry = Some(win.geometry);
            win.geometry = Geometry { x: 0, y: 0, w: screen_size.0, h: screen_size.1.saturating_sub(reserved_bottom) };
            win.style.maximized = true;
        }
        let content_h = win.content_height().max(0) as u32;
        let content_w = win.geometry.w;
        vec![WindowEvent::Configure { win: id, content_w, content_h }]
    }

    pub fn minimize(&mut self, id: WindowId) -> Vec<WindowEvent> {
        let mut events = self.clear_focus_if(id);
        if let Some(win) = self.get_mut(id) {
            win.style.visible = false;
            win.style.minimized = true;
        }
        events.push(WindowEvent::VisibilityChanged { win: id });
        events
    }

    pub fn restore(&mut self, id: WindowId) {
        if let Some(win) = self.get_mut(id) {
            win.style.visible = true;
            win.style.minimized = false;
        }
    }

    /// Re-anchors `id` as a bottom panel spanning the screen width
    /// (spec.md §4.4 "Panels are anchored to an edge").
    pub fn set_panel(&mut self, id: WindowId, _edge: Edge, height: u32, screen_w: u32, screen_h: u32) {
        if let Some(win) = self.get_mut(id) {
            win.style.panel = true;
            win.geometry = Geometry { x: 0, y: screen_h as i32 - height as i32, w: screen_w, h: height };
            win.chrome_color = 0;
        }
        self.order.retain(|&idx| idx != id.0);
        self.order.push(id.0);
        self.reserved_bottom = height;
    }

    /// Un-minimizes (if needed) and raises `id` to the top; repairs
    /// nothing else since this table doesn't store back-references from
    /// surfaces (the server owns that mapping) — see spec.md §4.7.
    pub fn raise(&mut self, id: WindowId) -> Vec<WindowEvent> {
        self.restore(id);
        self.focus(id)
    }

    pub fn list_windows(&self) -> Vec<(WindowId, &Window)> {
        self.order
            .iter()
            .rev()
            .filter_map(|&idx| self.slots[idx].as_ref().map(|w| (WindowId(idx), w)))
            .filter(|(_, w)| !w.style.panel)
            .collect()
    }
}

fn contains(g: Geometry, x: i32, y: i32) -> bool {
    x >= g.x && y >= g.y && x < g.x + g.w as i32 && y < g.y + g.h as i32
}

fn apply_resize(w: &mut Window, orig: Geometry, edge: ResizeEdge, dx: i32, dy: i32) {
    let mut g = orig;
    let grows_right = matches!(edge, ResizeEdge::Right | ResizeEdge::TopRight | ResizeEdge::BottomRight);
    let grows_bottom = matches!(edge, ResizeEdge::Bottom | ResizeEdge::BottomLeft | ResizeEdge::BottomRight);
    let grows_left = matches!(edge, ResizeEdge::Left | ResizeEdge::TopLeft | ResizeEdge::BottomLeft);
    let grows_top = matches!(edge, ResizeEdge::Top | ResizeEdge::TopLeft | ResizeEdge::TopRight);

    if grows_right {
        g.w = (orig.w as i32 + dx).max(MIN_W as i32) as u32;
    }
    if grows_bottom {
        g.h = (orig.h as i32 + dy).max(MIN_H as i32) as u32;
    }
    if grows_left {
        let new_w = (orig.w as i32 - dx).max(MIN_W as i32);
        g.x = orig.x + (orig.w as i32 - new_w);
        g.w = new_w as u32;
    }
    if grows_top {
        let new_h = (orig.h as i32 - dy).max(MIN_H as i32);
        g.y = orig.y + (orig.h as i32 - new_h);
        g.h = new_h as u32;
    }
    w.geometry = g;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk(table: &mut WindowTable, x: i32, y: i32, w: u32, h: u32) -> WindowId {
        table.create(Geometry { x, y, w, h }, "w".into(), 0, Content::Internal(String::new()))
    }

    #[test]
    fn focus_moves_window_to_top_of_non_panel_region() {
        let mut t = WindowTable::new();
        let a = mk(&mut t, 0, 0, 200, 200);
        let b = mk(&mut t, 0, 0, 200, 200);
        t.focus(a);
        assert_eq!(t.focused(), Some(a));
        let order: Vec<_> = t.iter_back_to_front().map(|(id, _)| id).collect();
        assert_eq!(order.last().copied(), Some(a));
        let _ = b;
    }

    #[test]
    fn hit_test_prefers_panel_over_window() {
        let mut t = WindowTable::new();
        let win = mk(&mut t, 0, 0, 400, 400);
        let panel = t.create(Geometry { x: 0, y: 350, w: 400, h: 32 }, "panel".into(), 0, Content::Internal(String::new()));
        t.set_panel(panel, Edge::Bottom, 32, 400, 400);
        assert_eq!(t.hit_test(10, 360), Some(panel));
        assert_eq!(t.focused(), None);
        let _ = win;
    }

    #[test]
    fn destroy_clears_focus_and_removes_from_order() {
        let mut t = WindowTable::new();
        let a = mk(&mut t, 0, 0, 200, 200);
        t.focus(a);
        assert!(t.destroy(a));
        assert_eq!(t.focused(), None);
        assert_eq!(t.hit_test(10, 10), None);
    }

    #[test]
    fn resize_bottom_right_then_button_up_emits_configure() {
        let mut t = WindowTable::new();
        let a = mk(&mut t, 0, 0, 300, 200 + TITLEBAR_H as u32);
        let down_point = (296, 196 + TITLEBAR_H); // inside bottom-right margin
        let region = t.region_at(a, down_point.0, down_point.1);
        assert_eq!(region, Some(Region::Resize(ResizeEdge::BottomRight)));
        t.begin_resize(a, ResizeEdge::BottomRight, down_point);
        t.pointer_moved(down_point.0 + 40, down_point.1 + 30);
        let events = t.button_up();
        assert_eq!(events.len(), 1);
        match events[0] {
            WindowEvent::Configure { win, content_w, content_h } => {
                assert_eq!(win, a);
                assert_eq!(content_w, 340);
                assert_eq!(content_h, 230);
            }
            _ => panic!("expected Configure"),
        }
    }

    #[test]
    fn maximize_then_restore_round_trips_geometry() {
        let mut t = WindowTable::new();
        let a = mk(&mut t, 10, 10, 300, 200);
        let before = t.get(a).unwrap().geometry;
        t.toggle_maximize(a, (800, 600), 32);
        assert!(t.get(a).unwrap().style.maximized);
        t.toggle_maximize(a, (800, 600), 32);
        assert!(!t.get(a).unwrap().style.maximized);
        let after = t.get(a).unwrap().geometry;
        assert_eq!((before.x, before.y, before.w, before.h), (after.x, after.y, after.w, after.h));
    }
}
