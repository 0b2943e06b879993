//! Classic skin: yellow title-fitted tabs that slide along the top edge.

use super::layout::{self, DecoratorState, TITLE_PADDING};
use super::Decorator;
use crate::canvas::Canvas;
use crate::hal::font::{BlockFont, Font, FontEngine};
use crate::region::ClipRegion;
use crate::types::{Color, Point, Rect};
use crate::window::WindowLook;
use std::sync::Arc;

const TAB_HEIGHT: i32 = 21;
const BORDER: i32 = 5;

const BORDER_FILL: Color = Color::rgb(216, 216, 216);
const FRAME_DARK: Color = Color::rgb(108, 108, 108);
const TAB_FOCUSED: Color = Color::rgb(255, 203, 0);
const TAB_FRONT: Color = Color::rgb(232, 232, 232);
const TAB_BACK: Color = Color::rgb(200, 200, 200);
const BUTTON_FILL: Color = Color::rgb(240, 240, 240);

pub struct ClassicDecorator {
    state: DecoratorState,
    fonts: Arc<dyn FontEngine>,
    font: Font,
}

impl ClassicDecorator {
    pub fn new() -> Self {
        Self::with_fonts(Arc::new(BlockFont))
    }

    pub fn with_fonts(fonts: Arc<dyn FontEngine>) -> Self {
        Self { state: DecoratorState::default(), fonts, font: Font { size: 12, bold: true } }
    }

    fn natural_widths(&self) -> Vec<i32> {
        let h = self.tab_height();
        self.state
            .tabs
            .iter()
            .map(|t| {
                let text = self.fonts.measure_text(&self.font, &t.title).width;
                (text + 2 * TITLE_PADDING + layout::button_reserve(h)).max(2 * h)
            })
            .collect()
    }
}

impl Default for ClassicDecorator {
    fn default() -> Self {
        Self::new()
    }
}

impl Decorator for ClassicDecorator {
    fn name(&self) -> &'static str {
        "classic"
    }

    fn state(&self) -> &DecoratorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut DecoratorState {
        &mut self.state
    }

    fn border_width(&self) -> i32 {
        match self.state.look {
            WindowLook::Titled | WindowLook::Document | WindowLook::Modal => BORDER,
            WindowLook::Bordered => 1,
            WindowLook::NoBorder => 0,
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
        if !self.state.look.has_tab() {
            return Vec::new();
        }
        let border = self.border_rect();
        let h = self.tab_height();
        let x = border.left + self.state.tab_location.round() as i32;
        layout::row_of_tabs(x, border.top - h, h, &self.natural_widths(), border.width())
    }

    fn max_tab_location(&self) -> f32 {
        if !self.state.look.has_tab() {
            return 0.0;
        }
        let available = self.border_rect().width();
        let total: i32 = self.natural_widths().iter().sum();
        (available - total.min(available)).max(0) as f32
    }

    fn draw(&self, canvas: &mut Canvas<'_>) {
        if self.border_width() > 0 {
            let mut ring = ClipRegion::from_rect(self.border_rect());
            ring.exclude(self.frame());
            canvas.set_high_color(BORDER_FILL);
            canvas.fill_region(&ring);
            canvas.set_high_color(FRAME_DARK);
            canvas.set_pen_size(1);
            canvas.stroke_rect(self.border_rect());
        }

        let front = self.front_tab();
        for (i, tab) in self.tab_rects().iter().enumerate() {
            let fill = match (i == front, self.state.focused) {
                (true, true) => TAB_FOCUSED,
                (true, false) => TAB_FRONT,
                _ => TAB_BACK,
            };
            canvas.set_high_color(fill);
            canvas.fill_rect(*tab);
            canvas.set_high_color(FRAME_DARK);
            canvas.stroke_rect(*tab);

            let title = &self.state.tabs[i].title;
            let text = self.fonts.measure_text(&self.font, title);
            let x = match self.close_rect() {
                Some(close) if i == front => close.right + TITLE_PADDING,
                _ => tab.left + TITLE_PADDING,
            };
            canvas.push_state();
            canvas.clip_to_rect(tab.inset_by(1, 1));
            canvas.set_font(self.font);
            canvas.set_high_color(Color::BLACK);
            canvas.draw_text(title, Point::new(x, tab.top + (tab.height() - text.height) / 2));
            canvas.pop_state();
        }

        if let Some(close) = self.close_rect() {
            canvas.set_high_color(BUTTON_FILL);
            canvas.fill_rect(close);
            canvas.set_high_color(FRAME_DARK);
            canvas.stroke_rect(close);
        }
        if let Some(zoom) = self.zoom_rect() {
            canvas.set_high_color(BUTTON_FILL);
            canvas.fill_rect(zoom);
            canvas.set_high_color(FRAME_DARK);
            canvas.stroke_rect(zoom);
            canvas.stroke_rect(Rect::new(zoom.left, zoom.top, zoom.width() * 2 / 3, zoom.height() * 2 / 3));
        }
        if let Some(minimize) = self.minimize_rect() {
            canvas.set_high_color(FRAME_DARK);
            let y = minimize.bottom - 3;
            canvas.stroke_line(Point::new(minimize.left + 2, y), Point::new(minimize.right - 3, y));
        }
    }
}
