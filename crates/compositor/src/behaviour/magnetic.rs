//! Magnetic edges: while a window is dragged or resized, an edge that comes
//! within the snap distance of a screen edge or another window's edge is
//! pulled flush with it. After a snap, snapping pauses for a cooldown so the
//! user can drag the window away again.

use crate::config::SnapConfig;
use crate::decorator::ResizeEdge;
use crate::types::Rect;

/// Snap lines collected from the screen and the other windows.
#[derive(Debug, Default, Clone)]
struct Lines {
    vertical: Vec<i32>,
    horizontal: Vec<i32>,
}

impl Lines {
    fn collect(frame: Rect, screen: Rect, others: &[Rect], distance: i32) -> Self {
        let mut lines = Lines {
            vertical: vec![screen.left, screen.right],
            horizontal: vec![screen.top, screen.bottom],
        };
        for other in others {
            // Only windows beside the frame along the other axis attract.
            if other.top - distance < frame.bottom && frame.top < other.bottom + distance {
                lines.vertical.extend([other.left, other.right]);
            }
            if other.left - distance < frame.right && frame.left < other.right + distance {
                lines.horizontal.extend([other.top, other.bottom]);
            }
        }
        lines
    }
}

/// Smallest non-zero correction that puts one of `edges` on one of `lines`.
fn nearest(edges: &[i32], lines: &[i32], distance: i32) -> Option<i32> {
    let mut best: Option<i32> = None;
    for edge in edges {
        for line in lines {
            let offset = line - edge;
            if offset == 0 || offset.abs() > distance {
                continue;
            }
            if best.map_or(true, |b| offset.abs() < b.abs()) {
                best = Some(offset);
            }
        }
    }
    best
}

#[derive(Debug, Clone)]
pub struct MagneticSnapper {
    enabled: bool,
    distance: i32,
    cooldown_us: u64,
    last_snap_us: Option<u64>,
    snaps: u64,
}

impl Default for MagneticSnapper {
    fn default() -> Self {
        Self::new(&SnapConfig::default())
    }
}

impl MagneticSnapper {
    pub fn new(config: &SnapConfig) -> Self {
        Self {
            enabled: config.enabled,
            distance: config.distance.max(0),
            cooldown_us: config.cooldown_ms * 1000,
            last_snap_us: None,
            snaps: 0,
        }
    }

    /// Forget the last snap; called when a new drag begins.
    pub fn begin_drag(&mut self) {
        self.last_snap_us = None;
    }

    pub fn snaps(&self) -> u64 {
        self.snaps
    }

    fn cooling_down(&self, now_us: u64) -> bool {
        match self.last_snap_us {
            Some(last) => now_us.saturating_sub(last) < self.cooldown_us,
            None => false,
        }
    }

    fn record(&mut self, now_us: u64) {
        self.last_snap_us = Some(now_us);
        self.snaps += 1;
    }

    /// Adjust a move of `frame` by (dx, dy); returns the corrected delta.
    ///
    /// The correction is never given back: for the rest of the drag the
    /// window stays offset from the pointer by the distance it snapped.
    pub fn snap_move(&mut self, frame: Rect, dx: i32, dy: i32, screen: Rect, others: &[Rect], now_us: u64) -> (i32, i32) {
        if !self.enabled || self.cooling_down(now_us) {
            return (dx, dy);
        }
        let moved = frame.offset_by(dx, dy);
        let lines = Lines::collect(moved, screen, others, self.distance);
        let sx = nearest(&[moved.left, moved.right], &lines.vertical, self.distance);
        let sy = nearest(&[moved.top, moved.bottom], &lines.horizontal, self.distance);
        if sx.is_none() && sy.is_none() {
            return (dx, dy);
        }
        self.record(now_us);
        log::trace!("Magnetic snap on move by ({:?}, {:?})", sx, sy);
        (dx + sx.unwrap_or(0), dy + sy.unwrap_or(0))
    }

    /// Adjust a resize of the grabbed `edge` of `frame` by (dx, dy).
    pub fn snap_resize(
        &mut self,
        frame: Rect,
        edge: ResizeEdge,
        dx: i32,
        dy: i32,
        screen: Rect,
        others: &[Rect],
        now_us: u64,
    ) -> (i32, i32) {
        if !self.enabled || self.cooling_down(now_us) {
            return (dx, dy);
        }
        let resized = edge.apply(frame, dx, dy);
        let lines = Lines::collect(resized, screen, others, self.distance);
        let sx = if edge.moves_left() {
            nearest(&[resized.left], &lines.vertical, self.distance)
        } else if edge.moves_right() {
            nearest(&[resized.right], &lines.vertical, self.distance)
        } else {
            None
        };
        let sy = if edge.moves_top() {
            nearest(&[resized.top], &lines.horizontal, self.distance)
        } else if edge.moves_bottom() {
            nearest(&[resized.bottom], &lines.horizontal, self.distance)
        } else {
            None
        };
        if sx.is_none() && sy.is_none() {
            return (dx, dy);
        }
        self.record(now_us);
        (dx + sx.unwrap_or(0), dy + sy.unwrap_or(0))
    }
}
