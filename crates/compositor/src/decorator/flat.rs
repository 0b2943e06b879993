//! Flat skin: a full-width tab bar split evenly between the stacked windows.

use super::layout::{self, DecoratorState, TITLE_PADDING};
use super::Decorator;
use crate::canvas::Canvas;
use crate::hal::font::{BlockFont, Font, FontEngine};
use crate::region::ClipRegion;
use crate::types::{Color, Point, Rect};
use crate::window::WindowLook;
use std::sync::Arc;

const TAB_HEIGHT: i32 = 24;

const BORDER_FILL: Color = Color::rgb(60, 60, 60);
const TAB_FOCUSED: Color = Color::rgb(70, 130, 180);
const TAB_FRONT: Color = Color::rgb(120, 120, 120);
const TAB_BACK: Color = Color::rgb(90, 90, 90);
const GLYPH: Color = Color::rgb(235, 235, 235);

pub struct FlatDecorator {
    state: DecoratorState,
    fonts: Arc<dyn FontEngine>,
    font: Font,
}

impl FlatDecorator {
    pub fn new() -> Self {
        Self::with_fonts(Arc::new(BlockFont))
    }

    pub fn with_fonts(fonts: Arc<dyn FontEngine>) -> Self {
        Self { state: DecoratorState::default(), fonts, font: Font::default() }
    }
}

impl Default for FlatDecorator {
    fn default() -> Self {
        Self::new()
    }
}

impl Decorator for FlatDecorator {
    fn name(&self) -> &'static str {
        "flat"
    }

    fn state(&self) -> &DecoratorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut DecoratorState {
        &mut self.state
    }

    fn border_width(&self) -> i32 {
        match self.state.look {
            WindowLook::NoBorder => 0,
            _ => 1,
        }
    }

    fn tab_height(&self) -> i32 {
        if self.state.look.has_tab() {
            TAB_HEIGHT
        } else {
            0
        }
    }

    fn tab_rects(&self) -> Vec<Rect> {
        if !self.state.look.has_tab() || self.state.tabs.is_empty() {
            return Vec::new();
        }
        let border = self.border_rect();
        let widths = layout::equal_shares(border.width(), self.state.tabs.len());
        layout::row_of_tabs(border.left, border.top - TAB_HEIGHT, TAB_HEIGHT, &widths, border.width())
    }

    fn draw(&self, canvas: &mut Canvas<'_>) {
        if self.border_width() > 0 {
            let mut ring = ClipRegion::from_rect(self.border_rect());
            ring.exclude(self.frame());
            canvas.set_high_color(BORDER_FILL);
            canvas.fill_region(&ring);
        }

        let front = self.front_tab();
        for (i, tab) in self.tab_rects().iter().enumerate() {
            let fill = if i != front {
                TAB_BACK
            } else if self.state.focused {
                TAB_FOCUSED
            } else {
                TAB_FRONT
            };
            canvas.set_high_color(fill);
            canvas.fill_rect(*tab);

            let title = &self.state.tabs[i].title;
            let text = self.fonts.measure_text(&self.font, title);
            let x = tab.left + ((tab.width() - text.width) / 2).max(TITLE_PADDING);
            canvas.push_state();
            canvas.clip_to_rect(*tab);
            canvas.set_font(self.font);
            canvas.set_high_color(GLYPH);
            canvas.draw_text(title, Point::new(x, tab.top + (tab.height() - text.height) / 2));
            canvas.pop_state();
        }

        canvas.set_high_color(GLYPH);
        canvas.set_pen_size(2);
        if let Some(close) = self.close_rect() {
            let r = close.inset_by(3, 3);
            canvas.stroke_line(Point::new(r.left, r.top), Point::new(r.right - 1, r.bottom - 1));
            canvas.stroke_line(Point::new(r.left, r.bottom - 1), Point::new(r.right - 1, r.top));
        }
        canvas.set_pen_size(1);
        if let Some(zoom) = self.zoom_rect() {
            canvas.stroke_rect(zoom.inset_by(3, 3));
        }
        if let Some(minimize) = self.minimize_rect() {
            let y = minimize.bottom - 4;
            canvas.stroke_line(Point::new(minimize.left + 3, y), Point::new(minimize.right - 4, y));
        }
    }
}
