//! Choosing where a dropped window tiles into a group.
//!
//! Every area offers eight candidates: each of its corners, split either
//! vertically or horizontally. The new window takes the half of the area at
//! that corner. Candidates are ranked by how well the half fits the window's
//! current frame.

use super::group::SatGroup;
use crate::config::StackTileConfig;
use crate::types::{Point, Rect, Size};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [Corner::TopLeft, Corner::TopRight, Corner::BottomLeft, Corner::BottomRight];

    pub fn is_left(self) -> bool {
        matches!(self, Corner::TopLeft | Corner::BottomLeft)
    }

    pub fn is_top(self) -> bool {
        matches!(self, Corner::TopLeft | Corner::TopRight)
    }

    /// The corner of `rect` this names, using exclusive right/bottom edges.
    pub fn point(self, rect: Rect) -> Point {
        let x = if self.is_left() { rect.left } else { rect.right };
        let y = if self.is_top() { rect.top } else { rect.bottom };
        Point::new(x, y)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Split {
    /// Divider is a vertical line; areas sit side by side.
    Vertical,
    /// Divider is a horizontal line; areas sit on top of each other.
    Horizontal,
}

impl Split {
    fn rank(self) -> u8 {
        match self {
            Split::Vertical => 0,
            Split::Horizontal => 1,
        }
    }
}

/// One tiling candidate and its fit error.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub area: usize,
    pub corner: Corner,
    pub split: Split,
    pub error: f64,
}

/// The half of `area` a new window would take.
pub fn free_rect(area: Rect, corner: Corner, split: Split) -> Rect {
    match split {
        Split::Vertical => {
            let mid = area.left + area.width() / 2;
            if corner.is_left() {
                Rect::from_edges(area.left, area.top, mid, area.bottom)
            } else {
                Rect::from_edges(mid, area.top, area.right, area.bottom)
            }
        }
        Split::Horizontal => {
            let mid = area.top + area.height() / 2;
            if corner.is_top() {
                Rect::from_edges(area.left, area.top, area.right, mid)
            } else {
                Rect::from_edges(area.left, mid, area.right, area.bottom)
            }
        }
    }
}

/// Weighted mismatch between the free half and the window's preferred size,
/// plus the distance between the area corner and the same corner of the
/// window's frame.
pub fn fit_error(area: Rect, corner: Corner, split: Split, frame: Rect, preferred: Size, config: &StackTileConfig) -> f64 {
    let free = free_rect(area, corner, split);
    let size_error = (free.width() - preferred.width).abs() + (free.height() - preferred.height).abs();
    let distance = corner.point(area).manhattan(corner.point(frame));
    config.size_weight * size_error as f64 + config.distance_weight * distance as f64
}

/// Every candidate of `group` for a window at `frame`, best first. Ties go
/// to the upper, then the leftmost corner, vertical splits before horizontal.
pub fn candidates(group: &SatGroup, frame: Rect, preferred: Size, config: &StackTileConfig) -> Vec<Placement> {
    let mut out = Vec::new();
    for area in 0..group.areas().len() {
        let Some(rect) = group.area_frame(area) else {
            continue;
        };
        for corner in Corner::ALL {
            for split in [Split::Vertical, Split::Horizontal] {
                let error = fit_error(rect, corner, split, frame, preferred, config);
                out.push(Placement { area, corner, split, error });
            }
        }
    }
    out.sort_by_key(|p| {
        let point = group.area_frame(p.area).map(|r| p.corner.point(r)).unwrap_or_default();
        // Quantised so near-equal errors fall through to the tie-breaks.
        ((p.error * 1000.0).round() as i64, point.y, point.x, p.split.rank(), p.area)
    });
    out
}
