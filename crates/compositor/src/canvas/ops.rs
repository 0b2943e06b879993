//! Recorded drawing commands.
//!
//! Clients submit batches of `DrawOp`s; the compositor replays them onto a
//! window surface at commit time and again whenever part of the window is
//! exposed.

use super::{Canvas, Surface};
use crate::hal::font::Font;
use crate::region::ClipRegion;
use crate::types::{Color, Point, Rect};
use crate::window::ViewId;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum DrawOp {
    PushState,
    PopState,
    SetOrigin(Point),
    SetScale(f32),
    SetHighColor(Color),
    SetLowColor(Color),
    SetFont(Font),
    SetPenSize(i32),
    ClipToRect(Rect),
    ClipToShape(ClipRegion),
    FillRect(Rect),
    FillRectLow(Rect),
    StrokeRect(Rect),
    StrokeLine(Point, Point),
    FillRegion(ClipRegion),
    InvertRect(Rect),
    DrawText { text: String, at: Point },
    DrawBitmap { bitmap: Arc<Surface>, src: Rect, dst: Rect },
}

/// Drawing commands targeting one view (or the whole content area).
#[derive(Debug, Clone, Default)]
pub struct DrawBatch {
    pub view: Option<ViewId>,
    pub ops: Vec<DrawOp>,
}

impl DrawBatch {
    pub fn new(view: Option<ViewId>) -> Self {
        Self { view, ops: Vec::new() }
    }

    pub fn push(&mut self, op: DrawOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn with(mut self, op: DrawOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Execute `ops` on `canvas`. The state stack is left as it was found,
/// whatever pushes and pops the batch contains.
pub fn replay(canvas: &mut Canvas<'_>, ops: &[DrawOp]) {
    canvas.push_state();
    let floor = canvas.state_depth();
    for op in ops {
        match op {
            DrawOp::PushState => canvas.push_state(),
            DrawOp::PopState => {
                // Unbalanced pops never escape the batch.
                if canvas.state_depth() > floor {
                    canvas.pop_state();
                }
            }
            DrawOp::SetOrigin(p) => canvas.set_origin(*p),
            DrawOp::SetScale(s) => canvas.set_scale(*s),
            DrawOp::SetHighColor(c) => canvas.set_high_color(*c),
            DrawOp::SetLowColor(c) => canvas.set_low_color(*c),
            DrawOp::SetFont(f) => canvas.set_font(*f),
            DrawOp::SetPenSize(p) => canvas.set_pen_size(*p),
            DrawOp::ClipToRect(r) => canvas.clip_to_rect(*r),
            DrawOp::ClipToShape(shape) => canvas.clip_to_shape(shape),
            DrawOp::FillRect(r) => canvas.fill_rect(*r),
            DrawOp::FillRectLow(r) => canvas.fill_rect_low(*r),
            DrawOp::StrokeRect(r) => canvas.stroke_rect(*r),
            DrawOp::StrokeLine(a, b) => canvas.stroke_line(*a, *b),
            DrawOp::FillRegion(region) => canvas.fill_region(region),
            DrawOp::InvertRect(r) => canvas.invert_rect(*r),
            DrawOp::DrawText { text, at } => canvas.draw_text(text, *at),
            DrawOp::DrawBitmap { bitmap, src, dst } => canvas.draw_bitmap(bitmap, *src, *dst),
        }
    }
    while canvas.state_depth() >= floor {
        if !canvas.pop_state() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::PixelFormat;
    use crate::hal::font::BlockFont;

    #[test]
    fn test_replay_balances_state_stack() {
        let mut surface = Surface::new(20, 20, PixelFormat::Argb8888);
        let mut canvas = Canvas::new(&mut surface, ClipRegion::from_rect(Rect::new(0, 0, 20, 20)), &BlockFont);
        let batch = DrawBatch::new(None)
            .with(DrawOp::PushState)
            .with(DrawOp::PushState)
            .with(DrawOp::SetOrigin(Point::new(5, 5)))
            .with(DrawOp::FillRect(Rect::new(0, 0, 2, 2)));
        replay(&mut canvas, &batch.ops);
        assert_eq!(canvas.state_depth(), 1);
        assert_eq!(canvas.dirty().rects(), &[Rect::new(5, 5, 2, 2)]);
    }

    #[test]
    fn test_replay_ignores_extra_pops() {
        let mut surface = Surface::new(20, 20, PixelFormat::Argb8888);
        let mut canvas = Canvas::new(&mut surface, ClipRegion::from_rect(Rect::new(0, 0, 20, 20)), &BlockFont);
        canvas.set_origin(Point::new(3, 3));
        let ops = vec![DrawOp::PopState, DrawOp::PopState, DrawOp::FillRect(Rect::new(0, 0, 1, 1))];
        replay(&mut canvas, &ops);
        assert_eq!(canvas.state_depth(), 1);
        assert_eq!(canvas.origin(), Point::new(3, 3));
        assert_eq!(canvas.dirty().rects(), &[Rect::new(3, 3, 1, 1)]);
    }
}
