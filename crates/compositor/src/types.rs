//! Core geometry and identity types shared by every subsystem.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

// ============================================================================
// Identifiers
// ============================================================================

static NEXT_WINDOW_ID: AtomicU32 = AtomicU32::new(1);
static NEXT_STACK_ID: AtomicU32 = AtomicU32::new(1);

/// Stable identifier of a server-side window. Never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowId(pub u32);

impl WindowId {
    pub fn next() -> Self {
        WindowId(NEXT_WINDOW_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W{}", self.0)
    }
}

/// Identifier of a window stack (tab group).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackId(pub u32);

impl StackId {
    pub fn next() -> Self {
        StackId(NEXT_STACK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// A pixel position in screen or local coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset_by(self, dx: i32, dy: i32) -> Self {
        Point::new(self.x.saturating_add(dx), self.y.saturating_add(dy))
    }

    /// Manhattan distance, used for click slop and corner distance.
    pub fn manhattan(self, other: Point) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

/// Width and height in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

/// Integer pixel rectangle with exclusive right and bottom edges.
///
/// A rectangle whose right edge lies left of its left edge (or bottom above top)
/// has negative area and is *invalid*; one with zero width or height is *empty*.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const EMPTY: Rect = Rect { left: 0, top: 0, right: 0, bottom: 0 };

    /// Rectangle from origin and size. Edges saturate at the i32 range.
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { left: x, top: y, right: x.saturating_add(width), bottom: y.saturating_add(height) }
    }

    pub const fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> i32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> i32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    pub fn origin(&self) -> Point {
        Point::new(self.left, self.top)
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width() as i64 * self.height() as i64
        }
    }

    /// True when the rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// False for negative-area rectangles.
    pub fn is_valid(&self) -> bool {
        self.right >= self.left && self.bottom >= self.top
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x < self.right && p.y >= self.top && p.y < self.bottom
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.is_empty()
            || (other.left >= self.left
                && other.right <= self.right
                && other.top >= self.top
                && other.bottom <= self.bottom)
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    /// Overlapping part of both rectangles, `None` when they do not overlap.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        if !self.intersects(other) {
            return None;
        }
        Some(Rect::from_edges(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        ))
    }

    /// Bounding box of both rectangles; empty inputs are ignored.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::from_edges(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    pub fn offset_by(&self, dx: i32, dy: i32) -> Rect {
        Rect::from_edges(
            self.left.saturating_add(dx),
            self.top.saturating_add(dy),
            self.right.saturating_add(dx),
            self.bottom.saturating_add(dy),
        )
    }

    pub fn offset_to(&self, x: i32, y: i32) -> Rect {
        Rect::new(x, y, self.width(), self.height())
    }

    /// Shrinks by `dx`/`dy` on each side; negative values grow the rectangle.
    pub fn inset_by(&self, dx: i32, dy: i32) -> Rect {
        Rect::from_edges(self.left + dx, self.top + dy, self.right - dx, self.bottom - dy)
    }

    pub fn with_size(&self, width: i32, height: i32) -> Rect {
        Rect::new(self.left, self.top, width, height)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}x{})",
            self.left,
            self.top,
            self.width(),
            self.height()
        )
    }
}

/// Per-edge thickness of window chrome around the content frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insets {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Insets {
    pub const NONE: Insets = Insets { left: 0, top: 0, right: 0, bottom: 0 };

    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn horizontal(&self) -> i32 {
        self.left + self.right
    }

    pub fn vertical(&self) -> i32 {
        self.top + self.bottom
    }

    /// Grows a content frame to the outer frame.
    pub fn expand(&self, content: Rect) -> Rect {
        Rect::from_edges(
            content.left - self.left,
            content.top - self.top,
            content.right + self.right,
            content.bottom + self.bottom,
        )
    }

    /// Shrinks an outer frame to its content frame.
    pub fn shrink(&self, outer: Rect) -> Rect {
        Rect::from_edges(
            outer.left + self.left,
            outer.top + self.top,
            outer.right - self.right,
            outer.bottom - self.bottom,
        )
    }
}

// ============================================================================
// Color
// ============================================================================

/// Packed 0xAARRGGBB pixel value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Color(pub u32);

impl Color {
    pub const BLACK: Color = Color(0xFF00_0000);
    pub const WHITE: Color = Color(0xFFFF_FFFF);
    pub const TRANSPARENT: Color = Color(0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color(0xFF00_0000 | (r as u32) << 16 | (g as u32) << 8 | b as u32)
    }

    pub fn red(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn blue(self) -> u8 {
        self.0 as u8
    }

    /// Bitwise complement of the color channels, alpha kept opaque.
    pub fn inverted(self) -> Self {
        Color(0xFF00_0000 | (!self.0 & 0x00FF_FFFF))
    }

    /// Blends `self` over `dst` with an 8-bit coverage value.
    pub fn blend_over(self, dst: Color, coverage: u8) -> Color {
        let a = coverage as u32;
        let mix = |s: u8, d: u8| -> u32 { (s as u32 * a + d as u32 * (255 - a)) / 255 };
        Color(
            0xFF00_0000
                | mix(self.red(), dst.red()) << 16
                | mix(self.green(), dst.green()) << 8
                | mix(self.blue(), dst.blue()),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_exclusive_edges() {
        let r = Rect::new(0, 0, 200, 200);
        assert_eq!(r.width(), 200);
        assert!(r.contains(Point::new(199, 199)));
        assert!(!r.contains(Point::new(200, 0)));
        assert_eq!(r.area(), 40_000);
    }

    #[test]
    fn test_rect_intersection() {
        let a = Rect::new(0, 0, 200, 200);
        let b = Rect::new(100, 100, 200, 200);
        assert_eq!(a.intersection(&b), Some(Rect::new(100, 100, 100, 100)));
        assert_eq!(a.intersection(&Rect::new(200, 0, 10, 10)), None);
        assert_eq!(a.union(&b), Rect::new(0, 0, 300, 300));
    }

    #[test]
    fn test_rect_validity() {
        assert!(Rect::new(5, 5, 0, 0).is_valid());
        assert!(Rect::new(5, 5, 0, 0).is_empty());
        assert!(!Rect::from_edges(10, 0, 5, 10).is_valid());
    }

    #[test]
    fn test_rect_edges_saturate() {
        let r = Rect::new(2_000_000_000, -2_000_000_000, 2_000_000_000, 10);
        assert_eq!(r.right, i32::MAX);
        assert_eq!(r.width(), i32::MAX - 2_000_000_000);
        let wide = Rect::from_edges(-2_000_000_000, 0, 2_000_000_000, 1);
        assert_eq!(wide.width(), i32::MAX);
        assert_eq!(wide.offset_by(i32::MAX, 0).right, i32::MAX);
    }

    #[test]
    fn test_insets_round_trip() {
        let insets = Insets::new(5, 26, 5, 5);
        let content = Rect::new(100, 100, 300, 200);
        assert_eq!(insets.shrink(insets.expand(content)), content);
        assert_eq!(insets.expand(content).width(), 310);
    }

    #[test]
    fn test_color_blend() {
        let c = Color::WHITE.blend_over(Color::BLACK, 255);
        assert_eq!(c, Color::WHITE);
        let c = Color::WHITE.blend_over(Color::BLACK, 0);
        assert_eq!(c, Color::BLACK);
        assert_eq!(Color::BLACK.inverted(), Color::WHITE);
    }
}
