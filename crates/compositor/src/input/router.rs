//! Event Router & Focus Engine
//!
//! Decides which window and view receive each input event.
//!
//! - Keyboard events go to the focus window regardless of the pointer.
//! - While a button is held, pointer events go to the window that received
//!   the press (the capture target), skipping hit-testing.
//! - Otherwise the pointer is hit-tested front to back through the scene.
//! - Enter/exit crossings are synthesized whenever the hovered view chain
//!   changes, captured or not.
//! - Temporary listeners registered during a press are cleared on button-up.
//! - A capture whose button no longer shows in `InputEvent::buttons` is
//!   force-removed, so a lost button-up never pins the pointer to one window.

use super::{Buttons, InputEvent, InputEventKind};
use super::server::CursorSlot;
use crate::decorator::HitRegion;
use crate::types::{Point, WindowId};
use crate::window::ViewId;
use std::sync::Arc;

// ============================================================================
// Constants
// ============================================================================

/// Maximum focus history size.
pub const MAX_FOCUS_HISTORY: usize = 16;

// ============================================================================
// Scene access
// ============================================================================

/// What the router needs to know about the desktop.
pub trait Scene {
    /// Front-most shown window whose visible region contains `p`.
    fn window_at(&self, p: Point) -> Option<WindowId>;

    /// Decorator region of `window` under `p`.
    fn decorator_hit(&self, window: WindowId, p: Point) -> HitRegion;

    /// Deepest view of `window` whose visible region contains `p`.
    fn view_at(&self, window: WindowId, p: Point) -> Option<ViewId>;

    /// Views from the window's root down to `view`.
    fn view_chain(&self, view: ViewId) -> Vec<ViewId>;

    fn focus_view(&self, window: WindowId) -> Option<ViewId>;

    fn window_exists(&self, window: WindowId) -> bool;

    fn is_activatable(&self, window: WindowId) -> bool;
}

// ============================================================================
// Targets
// ============================================================================

/// Part of a window an event landed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitArea {
    Content,
    Decorator(HitRegion),
}

/// Receiver of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventTarget {
    pub window: WindowId,
    pub view: Option<ViewId>,
    /// Non-zero for temporary listeners.
    pub token: u64,
}

impl EventTarget {
    pub fn new(window: WindowId, view: Option<ViewId>) -> Self {
        Self { window, view, token: 0 }
    }
}

/// Synthetic hover transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Crossing {
    Entered { window: WindowId, view: ViewId },
    Exited { window: WindowId, view: ViewId },
}

/// Why an event reached nobody.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    NoFocus,
    NoTarget,
    TargetGone(WindowId),
}

/// Result of `Desktop::dispatch`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered { window: WindowId, view: Option<ViewId> },
    Dropped(DropReason),
}

/// Everything the desktop must do for one routed event.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteResult {
    /// The event with click count filled in.
    pub event: InputEvent,
    pub target: Option<EventTarget>,
    pub area: HitArea,
    pub crossings: Vec<Crossing>,
    /// Window to raise and focus before delivery.
    pub activate: Option<WindowId>,
    /// Temporary listeners that also receive this pointer event.
    pub listeners: Vec<EventTarget>,
    /// Temporary listeners cleared by this event.
    pub released: Vec<EventTarget>,
    /// Windows whose capture ended without a matching button-up.
    pub interrupted: Vec<WindowId>,
    pub dropped: Option<DropReason>,
    /// Delivered through a capture rather than by hit-testing.
    pub captured: bool,
}

impl RouteResult {
    fn new(event: InputEvent) -> Self {
        Self {
            event,
            target: None,
            area: HitArea::Content,
            crossings: Vec::new(),
            activate: None,
            listeners: Vec::new(),
            released: Vec::new(),
            interrupted: Vec::new(),
            dropped: None,
            captured: false,
        }
    }

    fn drop_with(mut self, reason: DropReason) -> Self {
        self.dropped = Some(reason);
        self.target = None;
        self
    }
}

#[derive(Clone, Copy, Debug)]
struct Capture {
    button: Buttons,
    target: EventTarget,
    area: HitArea,
}

#[derive(Clone, Copy, Debug)]
struct ClickRecord {
    button: Buttons,
    window: WindowId,
    position: Point,
    timestamp_us: u64,
    count: u32,
}

// ============================================================================
// Focus Stack
// ============================================================================

/// Focus history, most recent first.
#[derive(Debug, Clone, Default)]
pub struct FocusStack {
    history: Vec<WindowId>,
}

impl FocusStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a window to the front of the focus stack.
    pub fn push(&mut self, window: WindowId) {
        self.remove(window);
        self.history.insert(0, window);
        self.history.truncate(MAX_FOCUS_HISTORY);
    }

    pub fn remove(&mut self, window: WindowId) {
        self.history.retain(|w| *w != window);
    }

    pub fn current(&self) -> Option<WindowId> {
        self.history.first().copied()
    }

    pub fn get(&self, index: usize) -> Option<WindowId> {
        self.history.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Most recent entry accepted by `eligible`.
    pub fn most_recent(&self, eligible: impl Fn(WindowId) -> bool) -> Option<WindowId> {
        self.history.iter().copied().find(|w| eligible(*w))
    }

    /// Send the current window to the back and return the next eligible one.
    pub fn rotate_forward(&mut self, eligible: impl Fn(WindowId) -> bool) -> Option<WindowId> {
        let candidates = self.history.iter().filter(|w| eligible(**w)).count();
        if candidates < 2 {
            return None;
        }
        loop {
            let first = self.history.remove(0);
            self.history.push(first);
            let next = self.history[0];
            if eligible(next) {
                return Some(next);
            }
        }
    }

    /// Bring the least recent eligible window to the front.
    pub fn rotate_backward(&mut self, eligible: impl Fn(WindowId) -> bool) -> Option<WindowId> {
        let candidates = self.history.iter().filter(|w| eligible(**w)).count();
        if candidates < 2 {
            return None;
        }
        loop {
            let last = self.history.pop()?;
            self.history.insert(0, last);
            if eligible(last) {
                return Some(last);
            }
        }
    }
}

// ============================================================================
// Router
// ============================================================================

pub struct EventRouter {
    focus: Option<WindowId>,
    focus_stack: FocusStack,
    hover_window: Option<WindowId>,
    hover_chain: Vec<ViewId>,
    captures: Vec<Capture>,
    temporary: Vec<EventTarget>,
    next_token: u64,
    last_click: Option<ClickRecord>,
    double_click_us: u64,
    double_click_distance: i32,
    cursor: Arc<CursorSlot>,
    routed: u64,
    dropped: u64,
}

impl EventRouter {
    pub fn new(double_click_us: u64, double_click_distance: i32, cursor: Arc<CursorSlot>) -> Self {
        Self {
            focus: None,
            focus_stack: FocusStack::new(),
            hover_window: None,
            hover_chain: Vec::new(),
            captures: Vec::new(),
            temporary: Vec::new(),
            next_token: 1,
            last_click: None,
            double_click_us,
            double_click_distance,
            cursor,
            routed: 0,
            dropped: 0,
        }
    }

    pub fn focus(&self) -> Option<WindowId> {
        self.focus
    }

    pub fn set_focus(&mut self, window: Option<WindowId>) {
        if let Some(w) = window {
            self.focus_stack.push(w);
            log::debug!("Focus -> {}", w);
        }
        self.focus = window;
    }

    pub fn focus_stack(&self) -> &FocusStack {
        &self.focus_stack
    }

    pub fn focus_stack_mut(&mut self) -> &mut FocusStack {
        &mut self.focus_stack
    }

    pub fn cursor(&self) -> Point {
        self.cursor.load()
    }

    pub fn is_captured(&self) -> bool {
        !self.captures.is_empty()
    }

    pub fn capture_target(&self) -> Option<EventTarget> {
        self.captures.first().map(|c| c.target)
    }

    pub fn hovered(&self) -> Option<(WindowId, &[ViewId])> {
        self.hover_window.map(|w| (w, self.hover_chain.as_slice()))
    }

    /// (routed, dropped) counters.
    pub fn stats(&self) -> (u64, u64) {
        (self.routed, self.dropped)
    }

    /// Register a listener that receives pointer events until every button is
    /// released. Only valid while a button is held.
    pub fn add_temporary_listener(&mut self, window: WindowId, view: Option<ViewId>) -> Option<u64> {
        if self.captures.is_empty() {
            return None;
        }
        let token = self.next_token;
        self.next_token += 1;
        self.temporary.push(EventTarget { window, view, token });
        Some(token)
    }

    pub fn remove_temporary_listener(&mut self, token: u64) -> bool {
        let before = self.temporary.len();
        self.temporary.retain(|t| t.token != token);
        before != self.temporary.len()
    }

    pub fn temporary_listeners(&self) -> &[EventTarget] {
        &self.temporary
    }

    /// Forget everything about a window that went away.
    pub fn window_removed(&mut self, window: WindowId) {
        self.focus_stack.remove(window);
        if self.focus == Some(window) {
            self.focus = None;
        }
        self.captures.retain(|c| c.target.window != window);
        self.temporary.retain(|t| t.window != window);
        if self.hover_window == Some(window) {
            self.hover_window = None;
            self.hover_chain.clear();
        }
        if self.last_click.map(|c| c.window) == Some(window) {
            self.last_click = None;
        }
    }

    /// Drop views that were removed from the tree.
    pub fn views_removed(&mut self, views: &[ViewId]) {
        if let Some(pos) = self.hover_chain.iter().position(|v| views.contains(v)) {
            self.hover_chain.truncate(pos);
        }
        for capture in &mut self.captures {
            if capture.target.view.map_or(false, |v| views.contains(&v)) {
                capture.target.view = None;
            }
        }
        self.temporary.retain(|t| t.view.map_or(true, |v| !views.contains(&v)));
    }

    /// Abort any press in progress (screen reconfiguration, window teardown).
    pub fn cancel_captures(&mut self) -> Vec<EventTarget> {
        self.captures.clear();
        std::mem::take(&mut self.temporary)
    }

    // ========================================================================
    // Routing
    // ========================================================================

    pub fn route(&mut self, scene: &dyn Scene, event: InputEvent) -> RouteResult {
        let result = if event.is_keyboard() {
            self.route_keyboard(scene, event)
        } else {
            self.route_pointer(scene, event)
        };
        if result.dropped.is_some() {
            self.dropped += 1;
        } else {
            self.routed += 1;
        }
        result
    }

    fn route_keyboard(&mut self, scene: &dyn Scene, event: InputEvent) -> RouteResult {
        let result = RouteResult::new(event);
        let Some(focus) = self.focus else {
            return result.drop_with(DropReason::NoFocus);
        };
        if !scene.window_exists(focus) {
            self.window_removed(focus);
            return result.drop_with(DropReason::TargetGone(focus));
        }
        RouteResult {
            target: Some(EventTarget::new(focus, scene.focus_view(focus))),
            ..result
        }
    }

    fn route_pointer(&mut self, scene: &dyn Scene, mut event: InputEvent) -> RouteResult {
        self.cursor.store(event.position);

        // Hover chain follows the pointer even while captured.
        let hit_window = scene.window_at(event.position);
        let (hit_view, hit_area) = match hit_window {
            Some(w) => match scene.decorator_hit(w, event.position) {
                HitRegion::Content | HitRegion::None => (scene.view_at(w, event.position), HitArea::Content),
                region => (None, HitArea::Decorator(region)),
            },
            None => (None, HitArea::Content),
        };
        let crossings = self.update_hover(scene, hit_window, hit_view);

        let mut result = RouteResult::new(event);
        result.crossings = crossings;

        result.interrupted = self.expire_captures(&event);
        if !result.interrupted.is_empty() {
            log::debug!("Button-up lost; releasing capture of {:?}", result.interrupted);
            if self.captures.is_empty() {
                result.released = std::mem::take(&mut self.temporary);
            }
        }

        if let Some(capture) = self.capture_for(&event) {
            if !scene.window_exists(capture.target.window) {
                self.window_removed(capture.target.window);
                return result.drop_with(DropReason::TargetGone(capture.target.window));
            }
            result.target = Some(capture.target);
            result.area = capture.area;
            result.captured = true;
            result.listeners = self.temporary.clone();
            if let InputEventKind::MouseUp { button } = event.kind {
                self.captures.retain(|c| !button.contains(c.button));
                if self.captures.is_empty() {
                    result.released = std::mem::take(&mut self.temporary);
                }
            }
            return result;
        }

        let Some(window) = hit_window else {
            return result.drop_with(DropReason::NoTarget);
        };

        if let InputEventKind::MouseDown { button } = event.kind {
            if self.focus != Some(window) && scene.is_activatable(window) {
                result.activate = Some(window);
                self.set_focus(Some(window));
            }
            event.clicks = self.count_click(button, window, event.position, event.timestamp_us);
            result.event = event;
            self.captures.push(Capture {
                button,
                target: EventTarget::new(window, hit_view),
                area: hit_area,
            });
        }

        result.target = Some(EventTarget::new(window, hit_view));
        result.area = hit_area;
        result
    }

    /// Drop captures whose button is no longer held. Pressing a button that
    /// is already captured means its release went missing as well.
    fn expire_captures(&mut self, event: &InputEvent) -> Vec<WindowId> {
        let (pressed, releasing) = match event.kind {
            InputEventKind::MouseDown { button } => (button, Buttons::empty()),
            InputEventKind::MouseUp { button } => (Buttons::empty(), button),
            _ => (Buttons::empty(), Buttons::empty()),
        };
        let mut expired = Vec::new();
        self.captures.retain(|c| {
            let held = event.buttons.contains(c.button) || releasing.contains(c.button);
            let live = held && !pressed.intersects(c.button);
            if !live {
                expired.push(c.target.window);
            }
            live
        });
        expired
    }

    /// Capture governing a pointer event, if any button is held.
    fn capture_for(&self, event: &InputEvent) -> Option<Capture> {
        match event.kind {
            InputEventKind::MouseUp { button } => self
                .captures
                .iter()
                .find(|c| button.contains(c.button))
                .or_else(|| self.captures.first())
                .copied(),
            _ => self.captures.first().copied(),
        }
    }

    fn count_click(&mut self, button: Buttons, window: WindowId, position: Point, now: u64) -> u32 {
        let count = match self.last_click {
            Some(last)
                if last.button == button
                    && last.window == window
                    && now.saturating_sub(last.timestamp_us) <= self.double_click_us
                    && (position.x - last.position.x).abs() <= self.double_click_distance
                    && (position.y - last.position.y).abs() <= self.double_click_distance =>
            {
                last.count + 1
            }
            _ => 1,
        };
        self.last_click = Some(ClickRecord { button, window, position, timestamp_us: now, count });
        count
    }

    fn update_hover(&mut self, scene: &dyn Scene, window: Option<WindowId>, view: Option<ViewId>) -> Vec<Crossing> {
        let new_chain = match view {
            Some(v) => scene.view_chain(v),
            None => Vec::new(),
        };
        let mut crossings = Vec::new();
        if let Some(old_window) = self.hover_window {
            for v in self.hover_chain.iter().rev() {
                if window != Some(old_window) || !new_chain.contains(v) {
                    crossings.push(Crossing::Exited { window: old_window, view: *v });
                }
            }
        }
        if let Some(new_window) = window {
            for v in &new_chain {
                if self.hover_window != Some(new_window) || !self.hover_chain.contains(v) {
                    crossings.push(Crossing::Entered { window: new_window, view: *v });
                }
            }
        }
        self.hover_window = window;
        self.hover_chain = new_chain;
        crossings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Modifiers;
    use crate::types::Rect;
    use slotmap::SlotMap;

    /// Two overlapping windows, each with a root view and one child.
    struct FakeScene {
        windows: Vec<(WindowId, Rect, bool)>,
        views: SlotMap<ViewId, (WindowId, Rect, Option<ViewId>)>,
        tab_height: i32,
    }

    impl FakeScene {
        fn new() -> Self {
            Self { windows: Vec::new(), views: SlotMap::with_key(), tab_height: 0 }
        }

        fn add_window(&mut self, id: u32, frame: Rect) -> (WindowId, ViewId) {
            let id = WindowId(id);
            self.windows.push((id, frame, true));
            let root = self.views.insert((id, frame, None));
            (id, root)
        }

        fn add_view(&mut self, parent: ViewId, frame: Rect) -> ViewId {
            let window = self.views[parent].0;
            self.views.insert((window, frame, Some(parent)))
        }

        fn remove_window(&mut self, id: WindowId) {
            self.windows.retain(|w| w.0 != id);
        }
    }

    impl Scene for FakeScene {
        fn window_at(&self, p: Point) -> Option<WindowId> {
            self.windows.iter().rev().find(|w| w.1.contains(p)).map(|w| w.0)
        }

        fn decorator_hit(&self, window: WindowId, p: Point) -> HitRegion {
            let frame = self.windows.iter().find(|w| w.0 == window).map(|w| w.1);
            match frame {
                Some(f) if p.y < f.top + self.tab_height => HitRegion::Tab(0),
                Some(_) => HitRegion::Content,
                None => HitRegion::None,
            }
        }

        fn view_at(&self, window: WindowId, p: Point) -> Option<ViewId> {
            // Deepest match wins: children are inserted after parents.
            self.views
                .iter()
                .filter(|(_, v)| v.0 == window && v.1.contains(p))
                .map(|(k, _)| k)
                .last()
        }

        fn view_chain(&self, view: ViewId) -> Vec<ViewId> {
            let mut chain = vec![view];
            let mut cursor = self.views.get(view).and_then(|v| v.2);
            while let Some(p) = cursor {
                chain.insert(0, p);
                cursor = self.views.get(p).and_then(|v| v.2);
            }
            chain
        }

        fn focus_view(&self, _window: WindowId) -> Option<ViewId> {
            None
        }

        fn window_exists(&self, window: WindowId) -> bool {
            self.windows.iter().any(|w| w.0 == window)
        }

        fn is_activatable(&self, window: WindowId) -> bool {
            self.windows.iter().any(|w| w.0 == window && w.2)
        }
    }

    fn router() -> EventRouter {
        EventRouter::new(500_000, 4, Arc::new(CursorSlot::new()))
    }

    // --- Unit Tests ---

    #[test]
    fn test_focus_stack_basic() {
        let mut stack = FocusStack::new();
        assert!(stack.is_empty());
        stack.push(WindowId(1));
        stack.push(WindowId(2));
        stack.push(WindowId(3));
        assert_eq!(stack.current(), Some(WindowId(3)));
        assert_eq!(stack.get(2), Some(WindowId(1)));

        stack.remove(WindowId(2));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.get(1), Some(WindowId(1)));
    }

    #[test]
    fn test_focus_stack_rotation() {
        let mut stack = FocusStack::new();
        for i in [3, 2, 1] {
            stack.push(WindowId(i));
        }
        let all = |_| true;
        assert_eq!(stack.rotate_forward(all), Some(WindowId(2)));
        assert_eq!(stack.rotate_forward(all), Some(WindowId(3)));
        assert_eq!(stack.rotate_forward(all), Some(WindowId(1)));
        assert_eq!(stack.rotate_backward(all), Some(WindowId(3)));
        assert_eq!(stack.rotate_forward(|w| w != WindowId(2)), Some(WindowId(1)));
    }

    #[test]
    fn test_keyboard_goes_to_focus() {
        let mut scene = FakeScene::new();
        let (w1, _) = scene.add_window(1, Rect::new(0, 0, 100, 100));
        let mut router = router();

        let r = router.route(&scene, InputEvent::key_down(30, Some('a'), 0));
        assert_eq!(r.dropped, Some(DropReason::NoFocus));

        router.set_focus(Some(w1));
        let r = router.route(&scene, InputEvent::key_down(30, Some('a'), 1).with_modifiers(Modifiers::SHIFT));
        assert_eq!(r.target.map(|t| t.window), Some(w1));
    }

    #[test]
    fn test_click_activates_unfocused_window() {
        let mut scene = FakeScene::new();
        let (w1, _) = scene.add_window(1, Rect::new(0, 0, 100, 100));
        let (w2, _) = scene.add_window(2, Rect::new(50, 50, 100, 100));
        let mut router = router();
        router.set_focus(Some(w1));

        let r = router.route(&scene, InputEvent::mouse_down(Point::new(60, 60), Buttons::PRIMARY, 0));
        assert_eq!(r.activate, Some(w2));
        assert_eq!(r.target.map(|t| t.window), Some(w2));
        assert_eq!(router.focus(), Some(w2));
    }

    #[test]
    fn test_avoid_focus_window_not_activated() {
        let mut scene = FakeScene::new();
        let (w1, _) = scene.add_window(1, Rect::new(0, 0, 100, 100));
        scene.windows[0].2 = false;
        let mut router = router();
        let r = router.route(&scene, InputEvent::mouse_down(Point::new(10, 10), Buttons::PRIMARY, 0));
        assert_eq!(r.activate, None);
        assert_eq!(r.target.map(|t| t.window), Some(w1));
        assert_eq!(router.focus(), None);
    }

    #[test]
    fn test_double_click_counting() {
        let mut scene = FakeScene::new();
        scene.add_window(1, Rect::new(0, 0, 100, 100));
        let mut router = router();
        let p = Point::new(10, 10);

        let r = router.route(&scene, InputEvent::mouse_down(p, Buttons::PRIMARY, 0));
        assert_eq!(r.event.clicks, 1);
        router.route(&scene, InputEvent::mouse_up(p, Buttons::PRIMARY, 50_000));
        let r = router.route(&scene, InputEvent::mouse_down(p.offset_by(2, 2), Buttons::PRIMARY, 200_000));
        assert_eq!(r.event.clicks, 2);
        router.route(&scene, InputEvent::mouse_up(p, Buttons::PRIMARY, 250_000));
        let r = router.route(&scene, InputEvent::mouse_down(p, Buttons::PRIMARY, 2_000_000));
        assert_eq!(r.event.clicks, 1);
    }

    #[test]
    fn test_crossings_on_hover_change() {
        let mut scene = FakeScene::new();
        let (w1, root) = scene.add_window(1, Rect::new(0, 0, 100, 100));
        let child = scene.add_view(root, Rect::new(0, 0, 50, 50));
        let mut router = router();

        let r = router.route(&scene, InputEvent::mouse_moved(Point::new(10, 10), Buttons::empty(), 0));
        assert_eq!(
            r.crossings,
            vec![
                Crossing::Entered { window: w1, view: root },
                Crossing::Entered { window: w1, view: child }
            ]
        );

        let r = router.route(&scene, InputEvent::mouse_moved(Point::new(80, 80), Buttons::empty(), 1));
        assert_eq!(r.crossings, vec![Crossing::Exited { window: w1, view: child }]);

        let r = router.route(&scene, InputEvent::mouse_moved(Point::new(500, 500), Buttons::empty(), 2));
        assert_eq!(r.crossings, vec![Crossing::Exited { window: w1, view: root }]);
        assert_eq!(r.dropped, Some(DropReason::NoTarget));
    }

    #[test]
    fn test_decorator_hits_report_region() {
        let mut scene = FakeScene::new();
        scene.tab_height = 10;
        scene.add_window(1, Rect::new(0, 0, 100, 100));
        let mut router = router();
        let r = router.route(&scene, InputEvent::mouse_down(Point::new(5, 5), Buttons::PRIMARY, 0));
        assert_eq!(r.area, HitArea::Decorator(HitRegion::Tab(0)));
        assert_eq!(r.target.and_then(|t| t.view), None);
    }

    #[test]
    fn test_target_gone_is_silently_dropped() {
        let mut scene = FakeScene::new();
        let (w1, _) = scene.add_window(1, Rect::new(0, 0, 100, 100));
        let mut router = router();
        router.route(&scene, InputEvent::mouse_down(Point::new(5, 5), Buttons::PRIMARY, 0));
        scene.remove_window(w1);
        let r = router.route(&scene, InputEvent::mouse_moved(Point::new(6, 6), Buttons::PRIMARY, 1));
        assert_eq!(r.dropped, Some(DropReason::TargetGone(w1)));
        assert!(!router.is_captured());
    }

    #[test]
    fn test_lost_button_up_releases_capture() {
        let mut scene = FakeScene::new();
        let (w1, _) = scene.add_window(1, Rect::new(0, 0, 100, 100));
        let (w2, _) = scene.add_window(2, Rect::new(200, 0, 200, 100));
        let mut router = router();

        router.route(&scene, InputEvent::mouse_down(Point::new(10, 10), Buttons::PRIMARY, 0));
        router.add_temporary_listener(w2, None).unwrap();

        // No button held any more: the press on w1 is over.
        let r = router.route(&scene, InputEvent::mouse_moved(Point::new(350, 50), Buttons::empty(), 10));
        assert!(!r.captured);
        assert_eq!(r.target.map(|t| t.window), Some(w2));
        assert_eq!(r.interrupted, vec![w1]);
        assert_eq!(r.released.len(), 1);
        assert!(!router.is_captured());
        assert!(router.temporary_listeners().is_empty());

        let r = router.route(&scene, InputEvent::mouse_down(Point::new(350, 50), Buttons::PRIMARY, 1_000_000));
        assert_eq!(r.target.map(|t| t.window), Some(w2));
        assert_eq!(r.activate, Some(w2));
        assert_eq!(router.focus(), Some(w2));
    }

    #[test]
    fn test_repeated_press_replaces_stale_capture() {
        let mut scene = FakeScene::new();
        let (w1, _) = scene.add_window(1, Rect::new(0, 0, 100, 100));
        let (w2, _) = scene.add_window(2, Rect::new(200, 0, 100, 100));
        let mut router = router();

        router.route(&scene, InputEvent::mouse_down(Point::new(10, 10), Buttons::PRIMARY, 0));
        let r = router.route(&scene, InputEvent::mouse_down(Point::new(250, 50), Buttons::PRIMARY, 10));
        assert_eq!(r.interrupted, vec![w1]);
        assert_eq!(r.target.map(|t| t.window), Some(w2));
        assert_eq!(router.capture_target().map(|t| t.window), Some(w2));
    }

    // --- Scenario Tests ---

    #[test]
    fn scenario_drag_capture_survives_leaving_window() {
        let mut scene = FakeScene::new();
        let (w1, root1) = scene.add_window(1, Rect::new(0, 0, 100, 100));
        let (w2, _) = scene.add_window(2, Rect::new(200, 0, 100, 100));
        let mut router = router();

        router.route(&scene, InputEvent::mouse_down(Point::new(10, 10), Buttons::PRIMARY, 0));
        let token = router.add_temporary_listener(w2, None).unwrap();

        // Over w2 while dragging: still delivered to w1, with crossings.
        let r = router.route(&scene, InputEvent::mouse_moved(Point::new(250, 50), Buttons::PRIMARY, 10));
        assert!(r.captured);
        assert_eq!(r.target.map(|t| t.window), Some(w1));
        assert!(r.crossings.contains(&Crossing::Exited { window: w1, view: root1 }));
        assert_eq!(r.listeners.len(), 1);

        // Outside every window: still delivered.
        let r = router.route(&scene, InputEvent::mouse_moved(Point::new(900, 900), Buttons::PRIMARY, 20));
        assert_eq!(r.target.map(|t| t.window), Some(w1));

        let r = router.route(&scene, InputEvent::mouse_up(Point::new(900, 900), Buttons::PRIMARY, 30));
        assert_eq!(r.target.map(|t| t.window), Some(w1));
        assert_eq!(r.released.len(), 1);
        assert_eq!(r.released[0].token, token);
        assert!(router.temporary_listeners().is_empty());
        assert!(!router.is_captured());

        // After release hit-testing resumes.
        let r = router.route(&scene, InputEvent::mouse_moved(Point::new(250, 50), Buttons::empty(), 40));
        assert_eq!(r.target.map(|t| t.window), Some(w2));
        assert!(!r.captured);
    }
}
