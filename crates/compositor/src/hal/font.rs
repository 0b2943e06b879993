//! Font engine interface and the built-in block font.

use crate::types::Size;
use serde::{Deserialize, Serialize};

/// Font selection carried in drawing state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Font {
    /// Pixel height of a line.
    pub size: u16,
    pub bold: bool,
}

impl Default for Font {
    fn default() -> Self {
        Self { size: 12, bold: false }
    }
}

/// Coverage mask produced for a run of glyphs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlyphRun {
    pub width: i32,
    pub height: i32,
    /// Row-major 8-bit coverage, `width * height` entries.
    pub coverage: Vec<u8>,
}

impl GlyphRun {
    pub fn coverage_at(&self, x: i32, y: i32) -> u8 {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return 0;
        }
        self.coverage[(y * self.width + x) as usize]
    }
}

/// Text measurement and rasterization, provided by the font subsystem.
pub trait FontEngine: Send + Sync {
    fn measure_text(&self, font: &Font, text: &str) -> Size;

    fn rasterize_glyph_run(&self, font: &Font, text: &str) -> GlyphRun;
}

/// Fixed-cell font that renders each visible glyph as a solid block.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockFont;

impl BlockFont {
    fn cell(font: &Font) -> Size {
        let height = font.size.max(4) as i32;
        Size::new(height / 2 + if font.bold { 1 } else { 0 }, height)
    }
}

impl FontEngine for BlockFont {
    fn measure_text(&self, font: &Font, text: &str) -> Size {
        let cell = Self::cell(font);
        Size::new(cell.width * text.chars().count() as i32, cell.height)
    }

    fn rasterize_glyph_run(&self, font: &Font, text: &str) -> GlyphRun {
        let cell = Self::cell(font);
        let size = self.measure_text(font, text);
        let mut coverage = vec![0u8; (size.width * size.height) as usize];
        for (i, ch) in text.chars().enumerate() {
            if ch.is_whitespace() {
                continue;
            }
            let x0 = i as i32 * cell.width;
            for y in 2..cell.height - 2 {
                for x in x0 + 1..x0 + cell.width - 1 {
                    coverage[(y * size.width + x) as usize] = 255;
                }
            }
        }
        GlyphRun { width: size.width, height: size.height, coverage }
    }
}
