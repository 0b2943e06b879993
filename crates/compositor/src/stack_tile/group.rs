//! Window areas and the groups they form.
//!
//! A group is a set of tabs (movable lines, vertical or horizontal) and a set
//! of areas, each bounded by four tabs and hosting one window stack.
//! Neighbouring areas share the tab between them, which keeps their edges
//! aligned whatever the solver does.

use super::solver::{Difference, LinearSpec, Relation, SolveReport};
use super::tiling::{Placement, Split};
use super::GroupId;
use crate::config::StackTileConfig;
use crate::error::{CompositorError, Result};
use crate::types::{Rect, Size, WindowId};
use crate::window::SizeLimits;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Vertical line, holds an x coordinate.
    X,
    /// Horizontal line, holds a y coordinate.
    Y,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TabId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tab {
    pub axis: Axis,
    pub position: f64,
}

/// Rectangle of a group bounded by four tabs, hosting one window stack.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowArea {
    pub left: TabId,
    pub top: TabId,
    pub right: TabId,
    pub bottom: TabId,
    /// Members of the stack living in this area.
    pub windows: Vec<WindowId>,
    /// Outer-frame limits of the whole stack.
    pub limits: SizeLimits,
    pub preferred: Size,
}

impl WindowArea {
    fn tabs(&self) -> [TabId; 4] {
        [self.left, self.top, self.right, self.bottom]
    }
}

/// Soft request to keep a tab at a position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pin {
    pub tab: TabId,
    pub position: f64,
}

#[derive(Clone, Debug)]
pub struct SatGroup {
    pub id: GroupId,
    tabs: Vec<Tab>,
    areas: Vec<WindowArea>,
}

impl SatGroup {
    /// Group with a single area covering `frame`.
    pub fn new(id: GroupId, window: WindowId, frame: Rect, limits: SizeLimits) -> Self {
        let tabs = vec![
            Tab { axis: Axis::X, position: frame.left as f64 },
            Tab { axis: Axis::Y, position: frame.top as f64 },
            Tab { axis: Axis::X, position: frame.right as f64 },
            Tab { axis: Axis::Y, position: frame.bottom as f64 },
        ];
        let area = WindowArea {
            left: TabId(0),
            top: TabId(1),
            right: TabId(2),
            bottom: TabId(3),
            windows: vec![window],
            limits,
            preferred: frame.size(),
        };
        Self { id, tabs, areas: vec![area] }
    }

    /// Rebuild a group from raw parts; used when restoring archives.
    pub(crate) fn from_parts(id: GroupId, tabs: Vec<Tab>, areas: Vec<WindowArea>) -> Self {
        let mut group = Self { id, tabs, areas };
        group.compact();
        group
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn areas(&self) -> &[WindowArea] {
        &self.areas
    }

    pub fn position(&self, tab: TabId) -> f64 {
        self.tabs.get(tab.0).map_or(0.0, |t| t.position)
    }

    pub fn area_of(&self, window: WindowId) -> Option<usize> {
        self.areas.iter().position(|a| a.windows.contains(&window))
    }

    pub fn area_frame(&self, index: usize) -> Option<Rect> {
        let a = self.areas.get(index)?;
        Some(Rect::from_edges(
            self.position(a.left).round() as i32,
            self.position(a.top).round() as i32,
            self.position(a.right).round() as i32,
            self.position(a.bottom).round() as i32,
        ))
    }

    pub fn windows(&self) -> Vec<WindowId> {
        self.areas.iter().flat_map(|a| a.windows.iter().copied()).collect()
    }

    pub fn window_count(&self) -> usize {
        self.areas.iter().map(|a| a.windows.len()).sum()
    }

    pub fn contains(&self, window: WindowId) -> bool {
        self.area_of(window).is_some()
    }

    /// Bounding box of every area.
    pub fn bounds(&self) -> Rect {
        (0..self.areas.len())
            .filter_map(|i| self.area_frame(i))
            .fold(Rect::EMPTY, |acc, r| acc.union(&r))
    }

    /// Outer frame of every member window.
    pub fn frames(&self) -> Vec<(WindowId, Rect)> {
        let mut out = Vec::new();
        for (i, area) in self.areas.iter().enumerate() {
            if let Some(frame) = self.area_frame(i) {
                out.extend(area.windows.iter().map(|w| (*w, frame)));
            }
        }
        out
    }

    /// Limits in force for every member window.
    pub fn limits(&self) -> Vec<(WindowId, SizeLimits)> {
        self.areas
            .iter()
            .flat_map(|a| a.windows.iter().map(move |w| (*w, a.limits)))
            .collect()
    }

    // ========================================================================
    // Membership
    // ========================================================================

    /// Put `window` into the stack of area `index`.
    pub fn join_area(&mut self, index: usize, window: WindowId, position: usize, limits: SizeLimits) -> Result<()> {
        let area = self
            .areas
            .get_mut(index)
            .ok_or_else(|| CompositorError::InvalidGeometry(format!("no area {}", index)))?;
        let combined = area.limits.combine(&limits);
        if !combined.is_satisfiable() {
            return Err(CompositorError::GeometryInfeasible(format!(
                "stacking {} leaves no size between min and max",
                window
            )));
        }
        area.limits = combined;
        let position = position.min(area.windows.len());
        area.windows.insert(position, window);
        Ok(())
    }

    /// Split area `placement.area` in half and give the `corner` half to
    /// `window`. Returns the index of the new area.
    pub fn split(&mut self, placement: &Placement, window: WindowId, limits: SizeLimits) -> Result<usize> {
        let frame = self
            .area_frame(placement.area)
            .ok_or_else(|| CompositorError::InvalidGeometry(format!("no area {}", placement.area)))?;
        let area = self.areas[placement.area].clone();
        let (axis, mid) = match placement.split {
            Split::Vertical => (Axis::X, frame.left + frame.width() / 2),
            Split::Horizontal => (Axis::Y, frame.top + frame.height() / 2),
        };
        self.tabs.push(Tab { axis, position: mid as f64 });
        let divider = TabId(self.tabs.len() - 1);

        let mut fresh = WindowArea {
            windows: vec![window],
            limits,
            preferred: Size::default(),
            ..area.clone()
        };
        let mut rest = area;
        match (placement.split, placement.corner.is_left(), placement.corner.is_top()) {
            (Split::Vertical, true, _) => {
                fresh.right = divider;
                rest.left = divider;
            }
            (Split::Vertical, false, _) => {
                fresh.left = divider;
                rest.right = divider;
            }
            (Split::Horizontal, _, true) => {
                fresh.bottom = divider;
                rest.top = divider;
            }
            (Split::Horizontal, _, false) => {
                fresh.top = divider;
                rest.bottom = divider;
            }
        }
        let half = super::tiling::free_rect(frame, placement.corner, placement.split);
        fresh.preferred = half.size();
        rest.preferred = match placement.split {
            Split::Vertical => Size::new(frame.width() - half.width(), frame.height()),
            Split::Horizontal => Size::new(frame.width(), frame.height() - half.height()),
        };
        self.areas[placement.area] = rest;
        self.areas.push(fresh);
        Ok(self.areas.len() - 1)
    }

    /// Take `window` out of its area; the area goes away when it empties.
    /// Returns false if the window was not a member.
    pub fn remove_window(&mut self, window: WindowId) -> bool {
        let Some(index) = self.area_of(window) else {
            return false;
        };
        self.areas[index].windows.retain(|w| *w != window);
        if self.areas[index].windows.is_empty() {
            self.areas.remove(index);
            self.compact();
        }
        true
    }

    /// Recompute the limits of the area hosting `window` from its members'
    /// own limits.
    pub fn refresh_limits(&mut self, index: usize, own: &HashMap<WindowId, SizeLimits>) -> Result<()> {
        let Some(area) = self.areas.get_mut(index) else {
            return Ok(());
        };
        let combined = area
            .windows
            .iter()
            .filter_map(|w| own.get(w))
            .fold(SizeLimits::UNBOUNDED, |acc, l| acc.combine(l));
        if !combined.is_satisfiable() {
            return Err(CompositorError::GeometryInfeasible(
                "stack members have incompatible size limits".to_string(),
            ));
        }
        area.limits = combined;
        Ok(())
    }

    /// Drop tabs no area refers to and renumber the rest.
    fn compact(&mut self) {
        let mut used: Vec<usize> = self.areas.iter().flat_map(|a| a.tabs()).map(|t| t.0).collect();
        used.sort_unstable();
        used.dedup();
        let remap: HashMap<usize, usize> = used.iter().enumerate().map(|(new, old)| (*old, new)).collect();
        self.tabs = used.iter().filter_map(|old| self.tabs.get(*old).copied()).collect();
        for area in &mut self.areas {
            area.left = TabId(remap[&area.left.0]);
            area.top = TabId(remap[&area.top.0]);
            area.right = TabId(remap[&area.right.0]);
            area.bottom = TabId(remap[&area.bottom.0]);
        }
    }

    // ========================================================================
    // Connectivity
    // ========================================================================

    fn adjacent(&self, a: &WindowArea, b: &WindowArea) -> bool {
        let overlap = |lo1: TabId, hi1: TabId, lo2: TabId, hi2: TabId| {
            self.position(lo1).max(self.position(lo2)) < self.position(hi1).min(self.position(hi2))
        };
        let side_by_side = (a.right == b.left || a.left == b.right) && overlap(a.top, a.bottom, b.top, b.bottom);
        let above_below = (a.bottom == b.top || a.top == b.bottom) && overlap(a.left, a.right, b.left, b.right);
        side_by_side || above_below
    }

    /// Area indices of each connected component.
    pub fn components(&self) -> Vec<Vec<usize>> {
        let n = self.areas.len();
        let mut seen = vec![false; n];
        let mut out = Vec::new();
        for start in 0..n {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut component = vec![start];
            let mut queue = VecDeque::from([start]);
            while let Some(i) = queue.pop_front() {
                for j in 0..n {
                    if !seen[j] && self.adjacent(&self.areas[i], &self.areas[j]) {
                        seen[j] = true;
                        component.push(j);
                        queue.push_back(j);
                    }
                }
            }
            component.sort_unstable();
            out.push(component);
        }
        out
    }

    /// Split off the given areas into a group of their own.
    pub fn extract(&self, id: GroupId, areas: &[usize]) -> SatGroup {
        let areas = areas.iter().filter_map(|i| self.areas.get(*i).cloned()).collect();
        SatGroup::from_parts(id, self.tabs.clone(), areas)
    }

    // ========================================================================
    // Geometry
    // ========================================================================

    pub fn translate(&mut self, dx: i32, dy: i32) {
        for tab in &mut self.tabs {
            tab.position += match tab.axis {
                Axis::X => dx as f64,
                Axis::Y => dy as f64,
            };
        }
    }

    /// Translate the group back inside `screen`. Returns the applied offset.
    pub fn enforce_screen(&mut self, screen: Rect) -> (i32, i32) {
        let bounds = self.bounds();
        if bounds.is_empty() {
            return (0, 0);
        }
        let fit = |lo: i32, hi: i32, min: i32, max: i32| -> i32 {
            if hi - lo > max - min || lo < min {
                min - lo
            } else if hi > max {
                max - hi
            } else {
                0
            }
        };
        let dx = fit(bounds.left, bounds.right, screen.left, screen.right);
        let dy = fit(bounds.top, bounds.bottom, screen.top, screen.bottom);
        if dx != 0 || dy != 0 {
            log::debug!("Group {:?} pushed back on screen by ({}, {})", self.id, dx, dy);
            self.translate(dx, dy);
        }
        (dx, dy)
    }

    /// Solve the group layout. `pins` hold tabs near positions; `emphasis`
    /// gives one area's preferred size the resize weight. On success the tab
    /// positions are rounded to whole pixels and every area's preferred size
    /// becomes its solved size. On error nothing changes.
    pub fn solve(&mut self, config: &StackTileConfig, pins: &[Pin], emphasis: Option<(usize, Size)>) -> Result<SolveReport> {
        let mut spec = LinearSpec::new(config.max_iterations, config.regularization);
        for tab in &self.tabs {
            spec.add_variable(tab.position);
        }
        for (i, area) in self.areas.iter().enumerate() {
            let width = Difference::between(area.right.0, area.left.0);
            let height = Difference::between(area.bottom.0, area.top.0);
            let l = area.limits;
            spec.add_constraint(width, Relation::GreaterOrEqual, l.min_width as f64);
            spec.add_constraint(width, Relation::LessOrEqual, l.max_width as f64);
            spec.add_constraint(height, Relation::GreaterOrEqual, l.min_height as f64);
            spec.add_constraint(height, Relation::LessOrEqual, l.max_height as f64);

            let (preferred, weight) = match emphasis {
                Some((index, size)) if index == i => (size, config.resize_weight),
                _ => (area.preferred, config.preferred_weight),
            };
            spec.add_preference(width, preferred.width as f64, weight);
            spec.add_preference(height, preferred.height as f64, weight);
        }
        for pin in pins {
            spec.add_preference(Difference::var(pin.tab.0), pin.position, config.pin_weight);
        }

        let report = spec.solve()?;
        for (tab, value) in self.tabs.iter_mut().zip(spec.values()) {
            // Snap solver noise before rounding so integral bounds survive.
            tab.position = ((value * 1e6).round() / 1e6).round();
        }
        for i in 0..self.areas.len() {
            if let Some(frame) = self.area_frame(i) {
                self.areas[i].preferred = frame.size();
            }
        }
        log::trace!("Group {:?} solved in {} iterations", self.id, report.iterations);
        Ok(report)
    }

    /// Pins holding area `index` at `frame`.
    pub fn pins_for(&self, index: usize, frame: Rect) -> Vec<Pin> {
        let Some(a) = self.areas.get(index) else {
            return Vec::new();
        };
        vec![
            Pin { tab: a.left, position: frame.left as f64 },
            Pin { tab: a.top, position: frame.top as f64 },
            Pin { tab: a.right, position: frame.right as f64 },
            Pin { tab: a.bottom, position: frame.bottom as f64 },
        ]
    }

    /// Whether every area satisfies its limits.
    pub fn is_consistent(&self) -> bool {
        (0..self.areas.len()).all(|i| match self.area_frame(i) {
            Some(frame) => self.areas[i].limits.contains(frame.size()),
            None => false,
        })
    }
}
