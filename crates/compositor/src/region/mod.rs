//! Clip regions: canonical sets of non-overlapping rectangles.
//!
//! Every mutation leaves the region in banded canonical form: rectangles are
//! ordered by (top, left), horizontally adjacent spans inside a band are merged
//! and vertically adjacent bands with identical spans are coalesced. Two regions
//! covering the same pixels therefore have bit-identical rectangle lists.

pub mod pool;

pub use pool::{RegionPool, RegionPoolStats};

use crate::error::{CompositorError, Result};
use crate::types::{Point, Rect};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SetOp {
    Union,
    Intersect,
    Difference,
}

/// Set of non-overlapping rectangles describing drawable pixels.
#[derive(Debug, Clone, Default)]
pub struct ClipRegion {
    rects: Vec<Rect>,
    bounds: Rect,
    scratch: Vec<Rect>,
}

impl PartialEq for ClipRegion {
    fn eq(&self, other: &Self) -> bool {
        self.rects == other.rects
    }
}

impl Eq for ClipRegion {}

impl ClipRegion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rect(rect: Rect) -> Self {
        let mut region = Self::new();
        region.set_to_rect(rect);
        region
    }

    pub fn from_rects(rects: &[Rect]) -> Self {
        let mut region = Self::new();
        region.apply(rects, SetOp::Union);
        region
    }

    /// Empties the region but keeps its allocations.
    pub fn clear(&mut self) {
        self.rects.clear();
        self.bounds = Rect::EMPTY;
    }

    pub fn set_to_rect(&mut self, rect: Rect) {
        self.clear();
        if !rect.is_empty() {
            self.rects.push(rect);
            self.bounds = rect;
        }
    }

    pub fn set_to(&mut self, other: &ClipRegion) {
        self.rects.clear();
        self.rects.extend_from_slice(&other.rects);
        self.bounds = other.bounds;
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn area(&self) -> i64 {
        self.rects.iter().map(Rect::area).sum()
    }

    pub fn contains(&self, p: Point) -> bool {
        self.bounds.contains(p) && self.rects.iter().any(|r| r.contains(p))
    }

    pub fn intersects(&self, rect: &Rect) -> bool {
        self.bounds.intersects(rect) && self.rects.iter().any(|r| r.intersects(rect))
    }

    pub fn is_subset_of(&self, other: &ClipRegion) -> bool {
        let mut rest = self.clone();
        rest.exclude_region(other);
        rest.is_empty()
    }

    // ========================================================================
    // Set algebra
    // ========================================================================

    pub fn include(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        if self.is_empty() {
            self.set_to_rect(rect);
            return;
        }
        self.apply(&[rect], SetOp::Union);
    }

    pub fn include_region(&mut self, other: &ClipRegion) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            self.set_to(other);
            return;
        }
        self.apply(&other.rects, SetOp::Union);
    }

    pub fn exclude(&mut self, rect: Rect) {
        if !self.intersects(&rect) {
            return;
        }
        self.apply(&[rect], SetOp::Difference);
    }

    pub fn exclude_region(&mut self, other: &ClipRegion) {
        if self.is_empty() || !self.bounds.intersects(&other.bounds) {
            return;
        }
        self.apply(&other.rects, SetOp::Difference);
    }

    pub fn intersect_rect(&mut self, rect: Rect) {
        if !self.intersects(&rect) {
            self.clear();
            return;
        }
        if rect.contains_rect(&self.bounds) {
            return;
        }
        self.apply(&[rect], SetOp::Intersect);
    }

    pub fn intersect(&mut self, other: &ClipRegion) {
        if other.is_empty() || !self.bounds.intersects(&other.bounds) {
            self.clear();
            return;
        }
        self.apply(&other.rects, SetOp::Intersect);
    }

    pub fn offset_by(&mut self, dx: i32, dy: i32) {
        if dx == 0 && dy == 0 {
            return;
        }
        for r in &mut self.rects {
            *r = r.offset_by(dx, dy);
        }
        if !self.rects.is_empty() {
            self.bounds = self.bounds.offset_by(dx, dy);
        }
    }

    /// Checks the non-overlap and positive-area invariants.
    pub fn validate(&self) -> Result<()> {
        for (i, r) in self.rects.iter().enumerate() {
            if !r.is_valid() {
                return Err(CompositorError::corruption(
                    None,
                    format!("negative-area rectangle {:?}", r),
                ));
            }
            if r.is_empty() {
                return Err(CompositorError::corruption(
                    None,
                    format!("empty rectangle {:?} in region", r),
                ));
            }
            for other in &self.rects[i + 1..] {
                if r.intersects(other) {
                    return Err(CompositorError::corruption(
                        None,
                        format!("overlapping rectangles {:?} and {:?}", r, other),
                    ));
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, other: &[Rect], op: SetOp) {
        let mut out = std::mem::take(&mut self.scratch);
        combine(&self.rects, other, op, &mut out);
        std::mem::swap(&mut self.rects, &mut out);
        out.clear();
        self.scratch = out;
        self.bounds = self.rects.iter().fold(Rect::EMPTY, |acc, r| acc.union(r));
    }

    #[cfg(test)]
    pub(crate) fn from_raw_rects(rects: Vec<Rect>) -> Self {
        let bounds = rects.iter().fold(Rect::EMPTY, |acc, r| acc.union(r));
        Self { rects, bounds, scratch: Vec::new() }
    }
}

// ============================================================================
// Band sweep
// ============================================================================

/// Combines two rectangle lists band by band and writes the canonical result.
fn combine(a: &[Rect], b: &[Rect], op: SetOp, out: &mut Vec<Rect>) {
    out.clear();

    let mut edges: Vec<i32> = a
        .iter()
        .chain(b.iter())
        .filter(|r| !r.is_empty())
        .flat_map(|r| [r.top, r.bottom])
        .collect();
    edges.sort_unstable();
    edges.dedup();

    let mut spans_a = Vec::new();
    let mut spans_b = Vec::new();
    let mut spans = Vec::new();
    // Start index in `out` and bottom edge of the band emitted last.
    let mut previous: Option<(usize, i32)> = None;

    for pair in edges.windows(2) {
        let (y0, y1) = (pair[0], pair[1]);
        band_spans(a, y0, y1, &mut spans_a);
        band_spans(b, y0, y1, &mut spans_b);
        combine_spans(&spans_a, &spans_b, op, &mut spans);

        if spans.is_empty() {
            previous = None;
            continue;
        }

        if let Some((start, bottom)) = previous {
            let band = &out[start..];
            let same = bottom == y0
                && band.len() == spans.len()
                && band
                    .iter()
                    .zip(spans.iter())
                    .all(|(r, &(l, rt))| r.left == l && r.right == rt);
            if same {
                for r in &mut out[start..] {
                    r.bottom = y1;
                }
                previous = Some((start, y1));
                continue;
            }
        }

        let start = out.len();
        out.extend(spans.iter().map(|&(l, r)| Rect::from_edges(l, y0, r, y1)));
        previous = Some((start, y1));
    }
}

/// Horizontal spans covered by `rects` inside the band `[y0, y1)`, merged.
fn band_spans(rects: &[Rect], y0: i32, y1: i32, spans: &mut Vec<(i32, i32)>) {
    spans.clear();
    spans.extend(
        rects
            .iter()
            .filter(|r| !r.is_empty() && r.top <= y0 && r.bottom >= y1)
            .map(|r| (r.left, r.right)),
    );
    merge_spans(spans);
}

fn merge_spans(spans: &mut Vec<(i32, i32)>) {
    if spans.len() < 2 {
        return;
    }
    spans.sort_unstable();
    let mut write = 0;
    for read in 1..spans.len() {
        let (l, r) = spans[read];
        if l <= spans[write].1 {
            spans[write].1 = spans[write].1.max(r);
        } else {
            write += 1;
            spans[write] = (l, r);
        }
    }
    spans.truncate(write + 1);
}

fn combine_spans(a: &[(i32, i32)], b: &[(i32, i32)], op: SetOp, out: &mut Vec<(i32, i32)>) {
    out.clear();
    match op {
        SetOp::Union => {
            out.extend_from_slice(a);
            out.extend_from_slice(b);
            merge_spans(out);
        }
        SetOp::Intersect => {
            let (mut i, mut j) = (0, 0);
            while i < a.len() && j < b.len() {
                let l = a[i].0.max(b[j].0);
                let r = a[i].1.min(b[j].1);
                if l < r {
                    out.push((l, r));
                }
                if a[i].1 < b[j].1 {
                    i += 1;
                } else {
                    j += 1;
                }
            }
        }
        SetOp::Difference => {
            let mut j = 0;
            for &(al, ar) in a {
                let mut cursor = al;
                while j < b.len() && b[j].1 <= cursor {
                    j += 1;
                }
                let mut k = j;
                while k < b.len() && b[k].0 < ar {
                    if b[k].0 > cursor {
                        out.push((cursor, b[k].0));
                    }
                    cursor = cursor.max(b[k].1);
                    k += 1;
                }
                if cursor < ar {
                    out.push((cursor, ar));
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_include_coalesces_adjacent() {
        let mut region = ClipRegion::from_rect(Rect::new(0, 0, 10, 10));
        region.include(Rect::new(10, 0, 10, 10));
        assert_eq!(region.rects(), &[Rect::new(0, 0, 20, 10)]);

        region.include(Rect::new(0, 10, 20, 5));
        assert_eq!(region.rects(), &[Rect::new(0, 0, 20, 15)]);
    }

    #[test]
    fn test_exclude_overlap_corner() {
        let mut region = ClipRegion::from_rect(Rect::new(0, 0, 200, 200));
        region.exclude(Rect::new(100, 100, 200, 200));
        assert_eq!(
            region.rects(),
            &[Rect::new(0, 0, 200, 100), Rect::new(0, 100, 100, 100)]
        );
        assert_eq!(region.area(), 200 * 200 - 100 * 100);
        assert!(region.validate().is_ok());
    }

    #[test]
    fn test_exclude_hole() {
        let mut region = ClipRegion::from_rect(Rect::new(0, 0, 30, 30));
        region.exclude(Rect::new(10, 10, 10, 10));
        assert_eq!(region.len(), 4);
        assert!(!region.contains(Point::new(15, 15)));
        assert!(region.contains(Point::new(5, 15)));
        assert!(region.contains(Point::new(25, 15)));
        assert_eq!(region.area(), 900 - 100);
    }

    #[test]
    fn test_intersect_regions() {
        let mut a = ClipRegion::from_rects(&[Rect::new(0, 0, 10, 10), Rect::new(20, 0, 10, 10)]);
        let b = ClipRegion::from_rect(Rect::new(5, 5, 20, 20));
        a.intersect(&b);
        assert_eq!(
            a.rects(),
            &[Rect::new(5, 5, 5, 5), Rect::new(20, 5, 5, 5)]
        );
    }

    #[test]
    fn test_canonical_form_is_order_independent() {
        let rects = [
            Rect::new(0, 0, 50, 50),
            Rect::new(25, 25, 50, 50),
            Rect::new(60, 0, 10, 10),
        ];
        let forward = ClipRegion::from_rects(&rects);
        let mut backward = ClipRegion::new();
        for r in rects.iter().rev() {
            backward.include(*r);
        }
        assert_eq!(forward.rects(), backward.rects());
    }

    #[test]
    fn test_validate_detects_overlap_and_negative_area() {
        let overlapping =
            ClipRegion::from_raw_rects(vec![Rect::new(0, 0, 10, 10), Rect::new(5, 5, 10, 10)]);
        assert!(matches!(
            overlapping.validate(),
            Err(CompositorError::RegionCorruption { .. })
        ));

        let negative = ClipRegion::from_raw_rects(vec![Rect::from_edges(10, 0, 0, 10)]);
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_subset_and_offset() {
        let outer = ClipRegion::from_rect(Rect::new(0, 0, 100, 100));
        let mut inner = ClipRegion::from_rect(Rect::new(10, 10, 20, 20));
        assert!(inner.is_subset_of(&outer));
        inner.offset_by(90, 0);
        assert!(!inner.is_subset_of(&outer));
        assert_eq!(inner.bounds(), Rect::new(100, 10, 20, 20));
    }

    #[test]
    fn test_empty_inputs_are_ignored() {
        let mut region = ClipRegion::new();
        region.include(Rect::new(5, 5, 0, 10));
        assert!(region.is_empty());
        region.include(Rect::new(0, 0, 10, 10));
        region.exclude(Rect::new(100, 100, 5, 5));
        assert_eq!(region.len(), 1);
        region.intersect_rect(Rect::new(50, 50, 5, 5));
        assert!(region.is_empty());
        assert_eq!(region.bounds(), Rect::EMPTY);
    }
}
