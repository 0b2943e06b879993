//! Decorators: pluggable window chrome.
//!
//! A decorator owns the geometry of a stack's border, tab bar and buttons,
//! answers hit tests and draws the chrome. Skins share their bookkeeping
//! (`DecoratorState`) and differ only in metrics, tab layout and painting.
//! Skins are created through a `DecoratorRegistry` factory table and can be
//! swapped at runtime; tab settings survive the swap through
//! `archive_settings` / `restore_settings`.

pub mod classic;
pub mod flat;
pub mod layout;

pub use classic::ClassicDecorator;
pub use flat::FlatDecorator;
pub use layout::{DecoratorState, DecoratorTab};

use crate::canvas::Canvas;
use crate::error::{CompositorError, Result};
use crate::hal::font::{BlockFont, FontEngine};
use crate::region::ClipRegion;
use crate::types::{Insets, Point, Rect, WindowId};
use crate::window::{WindowFlags, WindowLook};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Name of the built-in skin used as fallback.
pub const DEFAULT_DECORATOR: &str = "classic";

// ============================================================================
// Hit regions
// ============================================================================

/// Border side or corner grabbed for resizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResizeEdge {
    Left,
    Right,
    Top,
    Bottom,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl ResizeEdge {
    pub fn moves_left(self) -> bool {
        matches!(self, ResizeEdge::Left | ResizeEdge::TopLeft | ResizeEdge::BottomLeft)
    }

    pub fn moves_right(self) -> bool {
        matches!(self, ResizeEdge::Right | ResizeEdge::TopRight | ResizeEdge::BottomRight)
    }

    pub fn moves_top(self) -> bool {
        matches!(self, ResizeEdge::Top | ResizeEdge::TopLeft | ResizeEdge::TopRight)
    }

    pub fn moves_bottom(self) -> bool {
        matches!(self, ResizeEdge::Bottom | ResizeEdge::BottomLeft | ResizeEdge::BottomRight)
    }

    /// Drag the grabbed edges of `frame` by (dx, dy).
    pub fn apply(self, frame: Rect, dx: i32, dy: i32) -> Rect {
        let mut r = frame;
        if self.moves_left() {
            r.left += dx;
        }
        if self.moves_right() {
            r.right += dx;
        }
        if self.moves_top() {
            r.top += dy;
        }
        if self.moves_bottom() {
            r.bottom += dy;
        }
        r
    }
}

/// Part of a decorated window under a point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HitRegion {
    None,
    Tab(usize),
    CloseButton,
    ZoomButton,
    MinimizeButton,
    ResizeBorder(ResizeEdge),
    MoveArea,
    Content,
}

impl HitRegion {
    pub fn is_button(self) -> bool {
        matches!(self, HitRegion::CloseButton | HitRegion::ZoomButton | HitRegion::MinimizeButton)
    }
}

/// Persisted decorator settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DecoratorSettings {
    pub tab_location: f32,
    #[serde(default)]
    pub skin: String,
}

// ============================================================================
// Decorator trait
// ============================================================================

pub trait Decorator: Send + Sync {
    fn name(&self) -> &'static str;

    fn state(&self) -> &DecoratorState;

    fn state_mut(&mut self) -> &mut DecoratorState;

    /// Border thickness for the current look.
    fn border_width(&self) -> i32;

    /// Tab height for the current look (0 when the look has no tab).
    fn tab_height(&self) -> i32;

    /// Rectangles of every tab, in tab order, screen coordinates.
    fn tab_rects(&self) -> Vec<Rect>;

    fn draw(&self, canvas: &mut Canvas<'_>);

    /// Largest tab offset accepted by `set_tab_location`.
    fn max_tab_location(&self) -> f32 {
        0.0
    }

    // ------------------------------------------------------------------------
    // Look and frame
    // ------------------------------------------------------------------------

    fn set_look(&mut self, look: WindowLook, flags: WindowFlags) {
        let state = self.state_mut();
        state.look = look;
        state.flags = flags;
    }

    fn look(&self) -> WindowLook {
        self.state().look
    }

    /// Set the content frame the chrome surrounds.
    fn set_frame(&mut self, content: Rect) {
        self.state_mut().content = content;
        let location = self.state().tab_location;
        self.set_tab_location(location);
    }

    fn frame(&self) -> Rect {
        self.state().content
    }

    /// Chrome thickness around the content frame.
    fn insets(&self) -> Insets {
        let b = self.border_width();
        Insets::new(b, b + self.tab_height(), b, b)
    }

    /// Content frame plus every inset (the frame Stack & Tile lays out).
    fn outer_frame(&self) -> Rect {
        self.insets().expand(self.frame())
    }

    /// Content frame plus border, without the tab row.
    fn border_rect(&self) -> Rect {
        let b = self.border_width();
        self.frame().inset_by(-b, -b)
    }

    // ------------------------------------------------------------------------
    // Tabs
    // ------------------------------------------------------------------------

    fn add_tab(&mut self, window: WindowId, title: &str, index: usize) -> usize {
        self.state_mut().add_tab(window, title, index)
    }

    fn remove_tab(&mut self, index: usize) -> bool {
        self.state_mut().remove_tab(index)
    }

    fn move_tab(&mut self, from: usize, to: usize) -> bool {
        self.state_mut().move_tab(from, to)
    }

    fn tab_count(&self) -> usize {
        self.state().tabs.len()
    }

    fn tab_index(&self, window: WindowId) -> Option<usize> {
        self.state().tabs.iter().position(|t| t.window == window)
    }

    fn set_tab_title(&mut self, index: usize, title: &str) -> bool {
        match self.state_mut().tabs.get_mut(index) {
            Some(tab) => {
                tab.title = title.to_string();
                true
            }
            None => false,
        }
    }

    fn set_focused(&mut self, focused: bool) {
        self.state_mut().focused = focused;
    }

    fn is_focused(&self) -> bool {
        self.state().focused
    }

    fn set_front_tab(&mut self, index: usize) -> bool {
        if index >= self.tab_count() {
            return false;
        }
        self.state_mut().front = index;
        true
    }

    fn front_tab(&self) -> usize {
        self.state().front
    }

    /// Slide the tab along the top edge; returns the clamped offset.
    fn set_tab_location(&mut self, location: f32) -> f32 {
        let clamped = location.clamp(0.0, self.max_tab_location().max(0.0));
        self.state_mut().tab_location = clamped;
        clamped
    }

    fn tab_location(&self) -> f32 {
        self.state().tab_location
    }

    fn tab_rect(&self, index: usize) -> Option<Rect> {
        self.tab_rects().get(index).copied()
    }

    /// Bounds of all tabs together; the drop target for stacking.
    fn tab_bar_rect(&self) -> Rect {
        self.tab_rects().iter().fold(Rect::EMPTY, |acc, r| acc.union(r))
    }

    /// Tab index a window dropped at `p` would be inserted at.
    fn drop_index(&self, p: Point) -> usize {
        let rects = self.tab_rects();
        rects
            .iter()
            .position(|r| p.x < r.left + r.width() / 2)
            .unwrap_or(rects.len())
    }

    // ------------------------------------------------------------------------
    // Buttons
    // ------------------------------------------------------------------------

    fn close_rect(&self) -> Option<Rect> {
        if self.state().flags.contains(WindowFlags::NOT_CLOSABLE) {
            return None;
        }
        let tab = self.tab_rect(self.front_tab())?;
        Some(layout::leading_button(tab, self.tab_height()))
    }

    fn zoom_rect(&self) -> Option<Rect> {
        if self.state().flags.contains(WindowFlags::NOT_ZOOMABLE) {
            return None;
        }
        let tab = self.tab_rect(self.front_tab())?;
        Some(layout::trailing_button(tab, self.tab_height(), 0))
    }

    fn minimize_rect(&self) -> Option<Rect> {
        if self.state().flags.contains(WindowFlags::NOT_MINIMIZABLE) {
            return None;
        }
        let tab = self.tab_rect(self.front_tab())?;
        let slot = if self.zoom_rect().is_some() { 1 } else { 0 };
        Some(layout::trailing_button(tab, self.tab_height(), slot))
    }

    // ------------------------------------------------------------------------
    // Shape and hit testing
    // ------------------------------------------------------------------------

    /// Pixels covered by chrome: the border ring plus the tabs.
    fn footprint(&self) -> ClipRegion {
        let mut region = ClipRegion::from_rect(self.border_rect());
        region.exclude(self.frame());
        for tab in self.tab_rects() {
            region.include(tab);
        }
        region
    }

    fn hit_test(&self, p: Point) -> HitRegion {
        let content = self.frame();
        if content.contains(p) {
            return HitRegion::Content;
        }
        let tabs = self.tab_rects();
        if let Some(index) = tabs.iter().position(|t| t.contains(p)) {
            if index == self.front_tab() {
                let buttons = [
                    (self.close_rect(), HitRegion::CloseButton),
                    (self.zoom_rect(), HitRegion::ZoomButton),
                    (self.minimize_rect(), HitRegion::MinimizeButton),
                ];
                for (rect, region) in buttons {
                    if rect.map_or(false, |r| r.contains(p)) {
                        return region;
                    }
                }
            }
            return HitRegion::Tab(index);
        }
        let border = self.border_rect();
        if border.contains(p) {
            if self.state().flags.contains(WindowFlags::NOT_RESIZABLE) {
                return HitRegion::MoveArea;
            }
            return HitRegion::ResizeBorder(layout::border_edge(border, content, p));
        }
        HitRegion::None
    }

    // ------------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------------

    fn archive_settings(&self) -> Result<Vec<u8>> {
        let settings = DecoratorSettings {
            tab_location: self.tab_location(),
            skin: self.name().to_string(),
        };
        Ok(serde_json::to_vec(&settings)?)
    }

    fn restore_settings(&mut self, blob: &[u8]) -> Result<()> {
        let settings: DecoratorSettings = serde_json::from_slice(blob)?;
        self.set_tab_location(settings.tab_location);
        Ok(())
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Shared services handed to decorator factories.
#[derive(Clone)]
pub struct DecoratorContext {
    pub fonts: Arc<dyn FontEngine>,
}

impl Default for DecoratorContext {
    fn default() -> Self {
        Self { fonts: Arc::new(BlockFont) }
    }
}

pub type DecoratorFactory = Arc<dyn Fn(&DecoratorContext) -> Result<Box<dyn Decorator>> + Send + Sync>;

/// Factory table of decorator skins, populated at startup.
pub struct DecoratorRegistry {
    factories: BTreeMap<String, DecoratorFactory>,
    context: DecoratorContext,
    failures: AtomicU64,
}

impl DecoratorRegistry {
    /// Registry with no skins besides the built-in fallback.
    pub fn empty(context: DecoratorContext) -> Self {
        Self { factories: BTreeMap::new(), context, failures: AtomicU64::new(0) }
    }

    /// Registry with the built-in `classic` and `flat` skins.
    pub fn with_builtin(context: DecoratorContext) -> Self {
        let mut registry = Self::empty(context);
        registry.register("classic", Arc::new(|ctx: &DecoratorContext| -> Result<Box<dyn Decorator>> {
            Ok(Box::new(ClassicDecorator::with_fonts(Arc::clone(&ctx.fonts))))
        }));
        registry.register("flat", Arc::new(|ctx: &DecoratorContext| -> Result<Box<dyn Decorator>> {
            Ok(Box::new(FlatDecorator::with_fonts(Arc::clone(&ctx.fonts))))
        }));
        registry
    }

    pub fn register(&mut self, name: &str, factory: DecoratorFactory) {
        log::debug!("Registered decorator '{}'", name);
        self.factories.insert(name.to_string(), factory);
    }

    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn context(&self) -> &DecoratorContext {
        &self.context
    }

    /// Run the named factory.
    pub fn try_create(&self, name: &str) -> Result<Box<dyn Decorator>> {
        let factory = self.factories.get(name).ok_or_else(|| CompositorError::DecoratorLoadFailure {
            name: name.to_string(),
            reason: "no such decorator".to_string(),
        })?;
        factory(&self.context).map_err(|e| match e {
            CompositorError::DecoratorLoadFailure { .. } => e,
            other => CompositorError::DecoratorLoadFailure {
                name: name.to_string(),
                reason: other.to_string(),
            },
        })
    }

    /// Create the named decorator, falling back to the built-in one.
    pub fn create(&self, name: &str) -> Box<dyn Decorator> {
        match self.try_create(name) {
            Ok(decorator) => decorator,
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("{}; using built-in decorator", e);
                self.fallback()
            }
        }
    }

    pub fn fallback(&self) -> Box<dyn Decorator> {
        Box::new(ClassicDecorator::with_fonts(Arc::clone(&self.context.fonts)))
    }

    /// Number of creations that fell back.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Move tab state and settings from `old` into `new`.
pub fn transfer_state(old: &dyn Decorator, new: &mut dyn Decorator) -> Result<()> {
    *new.state_mut() = old.state().clone();
    let blob = old.archive_settings()?;
    new.restore_settings(&blob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Size;

    fn titled(content: Rect) -> ClassicDecorator {
        let mut d = ClassicDecorator::new();
        d.set_look(WindowLook::Titled, WindowFlags::empty());
        d.add_tab(WindowId(1), "Terminal", 0);
        d.set_frame(content);
        d
    }

    // --- Unit Tests ---

    #[test]
    fn test_resize_edge_apply() {
        let frame = Rect::new(10, 10, 100, 100);
        assert_eq!(ResizeEdge::BottomRight.apply(frame, 5, 7), Rect::new(10, 10, 105, 107));
        assert_eq!(ResizeEdge::TopLeft.apply(frame, 5, 7), Rect::new(15, 17, 95, 93));
        assert_eq!(ResizeEdge::Left.apply(frame, -3, 50), Rect::new(7, 10, 103, 100));
    }

    #[test]
    fn test_hit_test_regions() {
        let d = titled(Rect::new(100, 100, 200, 150));
        let tab = d.tab_rect(0).unwrap();
        assert_eq!(d.hit_test(Point::new(150, 150)), HitRegion::Content);
        let close = d.close_rect().unwrap();
        assert_eq!(d.hit_test(Point::new(close.left + 1, close.top + 1)), HitRegion::CloseButton);
        let zoom = d.zoom_rect().unwrap();
        assert_eq!(d.hit_test(Point::new(zoom.left + 1, zoom.top + 1)), HitRegion::ZoomButton);
        let mid = Point::new(tab.left + tab.width() / 2, tab.top + tab.height() / 2);
        assert_eq!(d.hit_test(mid), HitRegion::Tab(0));
        assert_eq!(
            d.hit_test(Point::new(97, 200)),
            HitRegion::ResizeBorder(ResizeEdge::Left)
        );
        assert_eq!(
            d.hit_test(Point::new(302, 252)),
            HitRegion::ResizeBorder(ResizeEdge::BottomRight)
        );
        assert_eq!(d.hit_test(Point::new(0, 0)), HitRegion::None);
    }

    #[test]
    fn test_not_resizable_border_is_move_area() {
        let mut d = titled(Rect::new(100, 100, 200, 150));
        d.set_look(WindowLook::Titled, WindowFlags::NOT_RESIZABLE | WindowFlags::NOT_CLOSABLE);
        assert_eq!(d.hit_test(Point::new(97, 200)), HitRegion::MoveArea);
        assert!(d.close_rect().is_none());
    }

    #[test]
    fn test_footprint_surrounds_content() {
        let d = titled(Rect::new(100, 100, 200, 150));
        let footprint = d.footprint();
        assert!(!footprint.contains(Point::new(150, 150)));
        assert!(footprint.contains(Point::new(96, 100)));
        let outer = d.outer_frame();
        let insets = d.insets();
        assert_eq!(outer.size(), Size::new(200 + insets.horizontal(), 150 + insets.vertical()));
        footprint.validate().unwrap();
    }

    #[test]
    fn test_no_border_look_has_no_chrome() {
        let mut d = ClassicDecorator::new();
        d.set_look(WindowLook::NoBorder, WindowFlags::empty());
        d.add_tab(WindowId(1), "x", 0);
        d.set_frame(Rect::new(0, 0, 50, 50));
        assert_eq!(d.insets(), Insets::NONE);
        assert!(d.footprint().is_empty());
        assert!(d.tab_rects().is_empty());
        assert_eq!(d.hit_test(Point::new(60, 60)), HitRegion::None);
    }

    #[test]
    fn test_registry_falls_back_on_unknown_and_failing_factories() {
        let mut registry = DecoratorRegistry::with_builtin(DecoratorContext::default());
        assert_eq!(registry.create("flat").name(), "flat");
        assert_eq!(registry.create("chrome").name(), "classic");

        registry.register("broken", Arc::new(|_: &DecoratorContext| -> Result<Box<dyn Decorator>> {
            Err(CompositorError::Settings("missing resources".into()))
        }));
        assert!(matches!(
            registry.try_create("broken"),
            Err(CompositorError::DecoratorLoadFailure { .. })
        ));
        assert_eq!(registry.create("broken").name(), "classic");
        assert_eq!(registry.failures(), 2);
    }

    // --- Scenario Tests ---

    #[test]
    fn scenario_hot_swap_preserves_tabs_and_location() {
        let registry = DecoratorRegistry::with_builtin(DecoratorContext::default());
        let mut old = registry.create("classic");
        old.set_look(WindowLook::Titled, WindowFlags::empty());
        old.add_tab(WindowId(1), "A", 0);
        old.add_tab(WindowId(2), "B", 1);
        old.set_frame(Rect::new(0, 30, 600, 400));
        old.set_front_tab(1);
        let location = old.set_tab_location(40.0);
        assert_eq!(location, 40.0);

        let mut new = registry.create("classic");
        transfer_state(old.as_ref(), new.as_mut()).unwrap();
        assert_eq!(new.tab_count(), 2);
        assert_eq!(new.front_tab(), 1);
        assert_eq!(new.tab_location(), 40.0);
        assert_eq!(new.tab_rects(), old.tab_rects());

        let mut flat = registry.create("flat");
        transfer_state(new.as_ref(), flat.as_mut()).unwrap();
        assert_eq!(flat.tab_count(), 2);
        assert_eq!(flat.frame(), Rect::new(0, 30, 600, 400));
    }
}
