//! CPU pixel buffers.

use crate::types::{Color, Point, Rect};

/// Pixel layout of a surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    #[default]
    Argb8888,
    /// Alpha ignored on scanout.
    Xrgb8888,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        4
    }
}

/// A 32-bit pixel buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Surface {
    width: i32,
    height: i32,
    format: PixelFormat,
    pixels: Vec<Color>,
}

impl Surface {
    pub fn new(width: i32, height: i32, format: PixelFormat) -> Self {
        let len = (width.max(0) as usize) * (height.max(0) as usize);
        Self { width: width.max(0), height: height.max(0), format, pixels: vec![Color::TRANSPARENT; len] }
    }

    /// Wrap a recycled buffer, clearing it to transparent.
    pub fn from_buffer(width: i32, height: i32, format: PixelFormat, mut buffer: Vec<Color>) -> Self {
        let len = (width.max(0) as usize) * (height.max(0) as usize);
        buffer.clear();
        buffer.resize(len, Color::TRANSPARENT);
        Self { width: width.max(0), height: height.max(0), format, pixels: buffer }
    }

    /// Give up the pixel storage for reuse.
    pub fn into_buffer(self) -> Vec<Color> {
        self.pixels
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len() * self.format.bytes_per_pixel()
    }

    /// Raw bytes, e.g. for a scanout copy.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<Color> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get((y * self.width + x) as usize).copied()
    }

    pub fn put_pixel(&mut self, x: i32, y: i32, color: Color) {
        if x >= 0 && y >= 0 && x < self.width && y < self.height {
            let idx = (y * self.width + x) as usize;
            self.pixels[idx] = color;
        }
    }

    pub fn blend_pixel(&mut self, x: i32, y: i32, color: Color, coverage: u8) {
        if let Some(dst) = self.pixel(x, y) {
            self.put_pixel(x, y, color.blend_over(dst, coverage));
        }
    }

    pub fn clear(&mut self, color: Color) {
        self.pixels.fill(color);
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Color) {
        let Some(r) = rect.intersection(&self.bounds()) else {
            return;
        };
        for y in r.top..r.bottom {
            let row = (y * self.width) as usize;
            self.pixels[row + r.left as usize..row + r.right as usize].fill(color);
        }
    }

    pub fn invert_rect(&mut self, rect: Rect) {
        let Some(r) = rect.intersection(&self.bounds()) else {
            return;
        };
        for y in r.top..r.bottom {
            let row = (y * self.width) as usize;
            for p in &mut self.pixels[row + r.left as usize..row + r.right as usize] {
                *p = p.inverted();
            }
        }
    }

    /// Copy `src_rect` of `src` so that its top-left lands on `dst`.
    pub fn blit_from(&mut self, src: &Surface, src_rect: Rect, dst: Point) {
        let Some(src_rect) = src_rect.intersection(&src.bounds()) else {
            return;
        };
        let target = Rect::new(dst.x, dst.y, src_rect.width(), src_rect.height());
        let Some(clipped) = target.intersection(&self.bounds()) else {
            return;
        };
        let sx = src_rect.left + (clipped.left - target.left);
        let sy = src_rect.top + (clipped.top - target.top);
        let w = clipped.width() as usize;
        for row in 0..clipped.height() {
            let s = ((sy + row) * src.width + sx) as usize;
            let d = ((clipped.top + row) * self.width + clipped.left) as usize;
            self.pixels[d..d + w].copy_from_slice(&src.pixels[s..s + w]);
        }
    }

    /// Counts pixels of `rect` equal to `color`.
    pub fn count_color(&self, rect: Rect, color: Color) -> usize {
        let Some(r) = rect.intersection(&self.bounds()) else {
            return 0;
        };
        (r.top..r.bottom)
            .map(|y| {
                let row = (y * self.width) as usize;
                self.pixels[row + r.left as usize..row + r.right as usize]
                    .iter()
                    .filter(|p| **p == color)
                    .count()
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_rect_clips_to_bounds() {
        let mut s = Surface::new(10, 10, PixelFormat::Argb8888);
        s.fill_rect(Rect::new(-5, -5, 10, 10), Color::WHITE);
        assert_eq!(s.count_color(s.bounds(), Color::WHITE), 25);
        assert_eq!(s.pixel(4, 4), Some(Color::WHITE));
        assert_eq!(s.pixel(5, 5), Some(Color::TRANSPARENT));
    }

    #[test]
    fn test_blit_offsets_and_clips() {
        let mut src = Surface::new(4, 4, PixelFormat::Argb8888);
        src.clear(Color::WHITE);
        let mut dst = Surface::new(6, 6, PixelFormat::Argb8888);
        dst.blit_from(&src, src.bounds(), Point::new(4, 4));
        assert_eq!(dst.count_color(dst.bounds(), Color::WHITE), 4);
        assert_eq!(dst.pixel(5, 5), Some(Color::WHITE));
    }

    #[test]
    fn test_bytes_view() {
        let s = Surface::new(3, 2, PixelFormat::Xrgb8888);
        assert_eq!(s.as_bytes().len(), 24);
        assert_eq!(s.byte_len(), 24);
    }
}
