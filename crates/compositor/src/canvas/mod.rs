//! Stateful drawing context.
//!
//! A `Canvas` draws into one surface through a fixed base clip (the visible
//! part of the target window or view). Drawing state is a stack: origin,
//! scale and clip nest across `push_state`/`pop_state`, and clipping only
//! ever narrows. Primitives outside the effective clip touch nothing.

pub mod ops;
pub mod surface;

pub use ops::{replay, DrawBatch, DrawOp};
pub use surface::{PixelFormat, Surface};

use crate::hal::font::{Font, FontEngine};
use crate::region::ClipRegion;
use crate::types::{Color, Point, Rect};

/// One level of the drawing-state stack.
#[derive(Debug, Clone)]
pub struct DrawState {
    origin: Point,
    scale: f32,
    base_origin: Point,
    base_scale: f32,
    /// Effective clip in surface coordinates (base clip already applied).
    clip: ClipRegion,
    pub high_color: Color,
    pub low_color: Color,
    pub font: Font,
    pub pen_size: i32,
}

impl DrawState {
    fn root(clip: ClipRegion) -> Self {
        Self {
            origin: Point::ORIGIN,
            scale: 1.0,
            base_origin: Point::ORIGIN,
            base_scale: 1.0,
            clip,
            high_color: Color::BLACK,
            low_color: Color::WHITE,
            font: Font::default(),
            pen_size: 1,
        }
    }

    fn nested(&self) -> Self {
        Self {
            origin: Point::ORIGIN,
            scale: 1.0,
            base_origin: self.combined_origin(),
            base_scale: self.combined_scale(),
            ..self.clone()
        }
    }

    fn combined_origin(&self) -> Point {
        Point::new(
            self.base_origin.x.saturating_add(scaled(self.origin.x, self.base_scale)),
            self.base_origin.y.saturating_add(scaled(self.origin.y, self.base_scale)),
        )
    }

    fn combined_scale(&self) -> f32 {
        self.base_scale * self.scale
    }
}

/// Widest pen a client can select.
pub const MAX_PEN_SIZE: i32 = 1024;

fn scaled(v: i32, scale: f32) -> i32 {
    (v as f32 * scale).round() as i32
}

/// Liang-Barsky: the part of segment `a`-`b` inside `bounds`, or `None` when
/// the segment misses it. Endpoints already inside come back unchanged.
fn clip_line(a: Point, b: Point, bounds: Rect) -> Option<(Point, Point)> {
    let (x0, y0) = (a.x as f64, a.y as f64);
    let (dx, dy) = (b.x as f64 - x0, b.y as f64 - y0);
    let edges = [
        (-dx, x0 - bounds.left as f64),
        (dx, (bounds.right as f64 - 1.0) - x0),
        (-dy, y0 - bounds.top as f64),
        (dy, (bounds.bottom as f64 - 1.0) - y0),
    ];
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else if p < 0.0 {
            t0 = t0.max(q / p);
        } else {
            t1 = t1.min(q / p);
        }
        if t0 > t1 {
            return None;
        }
    }
    let at = |t: f64| {
        if t <= 0.0 {
            a
        } else if t >= 1.0 {
            b
        } else {
            Point::new((x0 + t * dx).round() as i32, (y0 + t * dy).round() as i32)
        }
    };
    Some((at(t0), at(t1)))
}

pub struct Canvas<'a> {
    surface: &'a mut Surface,
    fonts: &'a dyn FontEngine,
    states: Vec<DrawState>,
    dirty: ClipRegion,
}

impl<'a> Canvas<'a> {
    pub fn new(surface: &'a mut Surface, mut base_clip: ClipRegion, fonts: &'a dyn FontEngine) -> Self {
        base_clip.intersect_rect(surface.bounds());
        Self {
            surface,
            fonts,
            states: vec![DrawState::root(base_clip)],
            dirty: ClipRegion::new(),
        }
    }

    fn state(&self) -> &DrawState {
        // The root state is never popped.
        &self.states[self.states.len() - 1]
    }

    fn state_mut(&mut self) -> &mut DrawState {
        let last = self.states.len() - 1;
        &mut self.states[last]
    }

    // ========================================================================
    // State stack
    // ========================================================================

    pub fn push_state(&mut self) {
        let nested = self.state().nested();
        self.states.push(nested);
    }

    /// Pop one level; refuses to pop the root state.
    pub fn pop_state(&mut self) -> bool {
        if self.states.len() <= 1 {
            return false;
        }
        self.states.pop();
        true
    }

    pub fn state_depth(&self) -> usize {
        self.states.len()
    }

    /// Origin relative to the enclosing state.
    pub fn set_origin(&mut self, origin: Point) {
        self.state_mut().origin = origin;
    }

    pub fn origin(&self) -> Point {
        self.state().origin
    }

    pub fn set_scale(&mut self, scale: f32) {
        if scale.is_finite() && scale > 0.0 {
            self.state_mut().scale = scale;
        }
    }

    pub fn scale(&self) -> f32 {
        self.state().scale
    }

    pub fn set_high_color(&mut self, color: Color) {
        self.state_mut().high_color = color;
    }

    pub fn set_low_color(&mut self, color: Color) {
        self.state_mut().low_color = color;
    }

    pub fn high_color(&self) -> Color {
        self.state().high_color
    }

    pub fn low_color(&self) -> Color {
        self.state().low_color
    }

    pub fn set_font(&mut self, font: Font) {
        self.state_mut().font = font;
    }

    pub fn set_pen_size(&mut self, size: i32) {
        self.state_mut().pen_size = size.clamp(1, MAX_PEN_SIZE);
    }

    /// Narrow the clip to a rectangle in local coordinates.
    pub fn clip_to_rect(&mut self, rect: Rect) {
        let r = self.transform_rect(rect);
        self.state_mut().clip.intersect_rect(r);
    }

    /// Narrow the clip to a shape in local coordinates.
    pub fn clip_to_shape(&mut self, shape: &ClipRegion) {
        let mut mapped = ClipRegion::new();
        for r in shape.rects() {
            mapped.include(self.transform_rect(*r));
        }
        self.state_mut().clip.intersect(&mapped);
    }

    /// Clip currently in force, in surface coordinates.
    pub fn clip(&self) -> &ClipRegion {
        &self.state().clip
    }

    pub fn transform_point(&self, p: Point) -> Point {
        let state = self.state();
        let o = state.combined_origin();
        let s = state.combined_scale();
        Point::new(o.x.saturating_add(scaled(p.x, s)), o.y.saturating_add(scaled(p.y, s)))
    }

    pub fn transform_rect(&self, r: Rect) -> Rect {
        let state = self.state();
        let o = state.combined_origin();
        let s = state.combined_scale();
        Rect::from_edges(
            o.x.saturating_add(scaled(r.left, s)),
            o.y.saturating_add(scaled(r.top, s)),
            o.x.saturating_add(scaled(r.right, s)),
            o.y.saturating_add(scaled(r.bottom, s)),
        )
    }

    // ========================================================================
    // Primitives
    // ========================================================================

    pub fn fill_rect(&mut self, rect: Rect) {
        let color = self.state().high_color;
        self.fill_device_rect(self.transform_rect(rect), color);
    }

    pub fn fill_rect_low(&mut self, rect: Rect) {
        let color = self.state().low_color;
        self.fill_device_rect(self.transform_rect(rect), color);
    }

    pub fn fill_region(&mut self, region: &ClipRegion) {
        let color = self.state().high_color;
        for r in region.rects() {
            let dst = self.transform_rect(*r);
            self.fill_device_rect(dst, color);
        }
    }

    pub fn stroke_rect(&mut self, rect: Rect) {
        let pen = self.state().pen_size;
        if rect.width() <= pen.saturating_mul(2) || rect.height() <= pen.saturating_mul(2) {
            self.fill_rect(rect);
            return;
        }
        let (top, bottom) = (rect.top + pen, rect.bottom - pen);
        self.fill_rect(Rect::from_edges(rect.left, rect.top, rect.right, top));
        self.fill_rect(Rect::from_edges(rect.left, bottom, rect.right, rect.bottom));
        self.fill_rect(Rect::from_edges(rect.left, top, rect.left + pen, bottom));
        self.fill_rect(Rect::from_edges(rect.right - pen, top, rect.right, bottom));
    }

    pub fn stroke_line(&mut self, from: Point, to: Point) {
        let a = self.transform_point(from);
        let b = self.transform_point(to);
        let pen = scaled(self.state().pen_size, self.state().combined_scale()).clamp(1, MAX_PEN_SIZE);
        let color = self.state().high_color;
        let half = pen / 2;

        // Only the stretch of the line that can reach the clip is walked.
        let clip = self.state().clip.bounds();
        if clip.is_empty() {
            return;
        }
        let reach = Rect::from_edges(
            clip.left.saturating_sub(pen),
            clip.top.saturating_sub(pen),
            clip.right.saturating_add(pen),
            clip.bottom.saturating_add(pen),
        );
        let Some((a, b)) = clip_line(a, b, reach) else {
            return;
        };

        let (mut x, mut y) = (a.x as i64, a.y as i64);
        let (bx, by) = (b.x as i64, b.y as i64);
        let dx = (bx - x).abs();
        let dy = -(by - y).abs();
        let sx = if x < bx { 1 } else { -1 };
        let sy = if y < by { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            let (px, py) = (x as i32, y as i32);
            self.fill_device_rect(Rect::new(px.saturating_sub(half), py.saturating_sub(half), pen, pen), color);
            if x == bx && y == by {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    pub fn invert_rect(&mut self, rect: Rect) {
        let dst = self.transform_rect(rect);
        let mut touched = Vec::new();
        for c in self.state().clip.rects() {
            if let Some(r) = c.intersection(&dst) {
                touched.push(r);
            }
        }
        for r in touched {
            self.surface.invert_rect(r);
            self.dirty.include(r);
        }
    }

    /// Draw text with its top-left corner at `at`.
    pub fn draw_text(&mut self, text: &str, at: Point) {
        let state = self.state();
        let run = self.fonts.rasterize_glyph_run(&state.font, text);
        let color = state.high_color;
        let origin = self.transform_point(at);
        let dst = Rect::new(origin.x, origin.y, run.width, run.height);

        let mut touched = Vec::new();
        for c in self.state().clip.rects() {
            if let Some(r) = c.intersection(&dst) {
                touched.push(r);
            }
        }
        for r in touched {
            for y in r.top..r.bottom {
                for x in r.left..r.right {
                    let coverage = run.coverage_at(x.saturating_sub(origin.x), y.saturating_sub(origin.y));
                    if coverage > 0 {
                        self.surface.blend_pixel(x, y, color, coverage);
                    }
                }
            }
            self.dirty.include(r);
        }
    }

    /// Draw `src` of `bitmap` scaled into `dst` (local coordinates).
    pub fn draw_bitmap(&mut self, bitmap: &Surface, src: Rect, dst: Rect) {
        let Some(src) = src.intersection(&bitmap.bounds()) else {
            return;
        };
        let d = self.transform_rect(dst);
        if d.is_empty() {
            return;
        }
        let mut touched = Vec::new();
        for c in self.state().clip.rects() {
            if let Some(r) = c.intersection(&d) {
                touched.push(r);
            }
        }
        for r in touched {
            let (dw, dh) = (d.right as i64 - d.left as i64, d.bottom as i64 - d.top as i64);
            for y in r.top..r.bottom {
                let sy = src.top + ((y as i64 - d.top as i64) * src.height() as i64 / dh) as i32;
                for x in r.left..r.right {
                    let sx = src.left + ((x as i64 - d.left as i64) * src.width() as i64 / dw) as i32;
                    if let Some(color) = bitmap.pixel(sx, sy) {
                        self.surface.put_pixel(x, y, color);
                    }
                }
            }
            self.dirty.include(r);
        }
    }

    fn fill_device_rect(&mut self, dst: Rect, color: Color) {
        if dst.is_empty() {
            return;
        }
        let mut touched = Vec::new();
        for c in self.state().clip.rects() {
            if let Some(r) = c.intersection(&dst) {
                touched.push(r);
            }
        }
        for r in touched {
            self.surface.fill_rect(r, color);
            self.dirty.include(r);
        }
    }

    /// Pixels touched so far, in surface coordinates.
    pub fn dirty(&self) -> &ClipRegion {
        &self.dirty
    }

    pub fn finish(self) -> ClipRegion {
        self.dirty
    }
}
