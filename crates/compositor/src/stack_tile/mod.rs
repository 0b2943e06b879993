//! Stack & Tile.
//!
//! Windows dropped on each other either stack (share one area and one
//! decorator, shown as tabs) or tile (the target area is split and both
//! windows stay visible). A group's layout is a linear constraint problem:
//! tab positions are variables, size limits are hard constraints and
//! preferred sizes are soft. Every operation is all-or-nothing; on error the
//! manager is left exactly as it was.
//!
//! The manager works on outer frames (content plus decorator insets) and
//! knows nothing about the window list; callers pass [`WindowGeometry`] in and
//! apply the returned [`LayoutChange`].

pub mod archive;
pub mod group;
pub mod solver;
pub mod tiling;

pub use archive::GroupArchive;
pub use group::SatGroup;
pub use tiling::{Corner, Placement, Split};

use crate::config::StackTileConfig;
use crate::error::{CompositorError, Result};
use crate::types::{Rect, WindowId};
use crate::window::SizeLimits;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{}", self.0)
    }
}

/// What the manager needs to know about a window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowGeometry {
    pub id: WindowId,
    /// Current outer frame.
    pub frame: Rect,
    /// The window's own outer limits, ignoring any group it is in.
    pub limits: SizeLimits,
}

/// Geometry to apply after an operation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayoutChange {
    /// New outer frames.
    pub frames: Vec<(WindowId, Rect)>,
    /// Outer limits now in force because of grouping.
    pub limits: Vec<(WindowId, SizeLimits)>,
    /// Windows that left every group and get their own limits back.
    pub released: Vec<WindowId>,
}

impl LayoutChange {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty() && self.limits.is_empty() && self.released.is_empty()
    }

    pub fn frame_of(&self, window: WindowId) -> Option<Rect> {
        self.frames.iter().rev().find(|(w, _)| *w == window).map(|(_, r)| *r)
    }

    pub fn limits_of(&self, window: WindowId) -> Option<SizeLimits> {
        self.limits.iter().rev().find(|(w, _)| *w == window).map(|(_, l)| *l)
    }

    fn report(&mut self, group: &SatGroup) {
        self.frames.extend(group.frames());
        self.limits.extend(group.limits());
        let members = group.windows();
        self.released.retain(|w| !members.contains(w));
    }
}

#[derive(Clone, Debug)]
pub struct StackAndTile {
    config: StackTileConfig,
    screen: Rect,
    groups: BTreeMap<GroupId, SatGroup>,
    membership: HashMap<WindowId, GroupId>,
    /// Own limits of every grouped window.
    own_limits: HashMap<WindowId, SizeLimits>,
    next_group: u32,
}

impl StackAndTile {
    pub fn new(config: StackTileConfig, screen: Rect) -> Self {
        Self {
            config,
            screen,
            groups: BTreeMap::new(),
            membership: HashMap::new(),
            own_limits: HashMap::new(),
            next_group: 1,
        }
    }

    pub fn config(&self) -> &StackTileConfig {
        &self.config
    }

    pub fn group_of(&self, window: WindowId) -> Option<GroupId> {
        self.membership.get(&window).copied()
    }

    pub fn group(&self, id: GroupId) -> Option<&SatGroup> {
        self.groups.get(&id)
    }

    pub fn groups(&self) -> impl Iterator<Item = &SatGroup> {
        self.groups.values()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Windows sharing an area with `window`, itself included.
    pub fn stack_of(&self, window: WindowId) -> Vec<WindowId> {
        self.area(window)
            .map(|(group, index)| group.areas()[index].windows.clone())
            .unwrap_or_default()
    }

    pub fn area_frame_of(&self, window: WindowId) -> Option<Rect> {
        let (group, index) = self.area(window)?;
        group.area_frame(index)
    }

    fn area(&self, window: WindowId) -> Option<(&SatGroup, usize)> {
        let group = self.groups.get(self.membership.get(&window)?)?;
        let index = group.area_of(window)?;
        Some((group, index))
    }

    fn allocate_id(&mut self) -> GroupId {
        let id = GroupId(self.next_group);
        self.next_group += 1;
        id
    }

    /// Run `op`; on error restore the state from before the call.
    fn transaction<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let snapshot = self.clone();
        let result = op(self);
        if let Err(e) = &result {
            log::debug!("Stack & Tile operation rolled back: {}", e);
            *self = snapshot;
        }
        result
    }

    /// Group of `target`, creating a single-area group if it has none.
    fn ensure_group(&mut self, target: &WindowGeometry) -> GroupId {
        if let Some(id) = self.group_of(target.id) {
            return id;
        }
        let id = self.allocate_id();
        self.groups.insert(id, SatGroup::new(id, target.id, target.frame, target.limits));
        self.membership.insert(target.id, id);
        self.own_limits.insert(target.id, target.limits);
        log::debug!("Created group {} around {}", id, target.id);
        id
    }

    /// Take `window` out of its group and settle what remains. The window
    /// itself is not listed as released.
    fn detach(&mut self, window: WindowId, change: &mut LayoutChange) -> Result<()> {
        let Some(id) = self.membership.remove(&window) else {
            return Ok(());
        };
        self.own_limits.remove(&window);
        let Some(mut group) = self.groups.remove(&id) else {
            return Ok(());
        };
        group.remove_window(window);
        self.settle(id, group, change)
    }

    /// Split `group` into connected parts, dissolve single-window parts and
    /// solve the rest.
    fn settle(&mut self, id: GroupId, group: SatGroup, change: &mut LayoutChange) -> Result<()> {
        let components = group.components();
        let mut parts = Vec::with_capacity(components.len());
        for (n, areas) in components.iter().enumerate() {
            if components.len() == 1 {
                parts.push(group.clone());
                break;
            }
            let part_id = if n == 0 { id } else { self.allocate_id() };
            parts.push(group.extract(part_id, areas));
        }
        if parts.len() > 1 {
            log::debug!("Group {} fell apart into {} parts", id, parts.len());
        }

        for mut part in parts {
            if part.window_count() <= 1 {
                for window in part.windows() {
                    self.membership.remove(&window);
                    self.own_limits.remove(&window);
                    change.released.push(window);
                }
                continue;
            }
            for index in 0..part.areas().len() {
                part.refresh_limits(index, &self.own_limits)?;
            }
            part.solve(&self.config, &[], None)?;
            part.enforce_screen(self.screen);
            for window in part.windows() {
                self.membership.insert(window, part.id);
            }
            change.report(&part);
            self.groups.insert(part.id, part);
        }
        Ok(())
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Stack `dragged` onto `target` at tab `position`.
    pub fn stack_window(&mut self, dragged: WindowGeometry, target: WindowGeometry, position: usize) -> Result<LayoutChange> {
        if dragged.id == target.id {
            return Err(CompositorError::InvalidGeometry(format!("cannot stack {} onto itself", dragged.id)));
        }
        self.transaction(|st| {
            let mut change = LayoutChange::default();
            st.detach(dragged.id, &mut change)?;
            let id = st.ensure_group(&target);
            let group = st
                .groups
                .get_mut(&id)
                .ok_or_else(|| CompositorError::InvalidGeometry(format!("group {} vanished", id)))?;
            let area = group
                .area_of(target.id)
                .ok_or(CompositorError::UnknownWindow(target.id))?;
            group.join_area(area, dragged.id, position, dragged.limits)?;
            group.solve(&st.config, &[], None)?;
            group.enforce_screen(st.screen);
            change.report(group);
            st.membership.insert(dragged.id, id);
            st.own_limits.insert(dragged.id, dragged.limits);
            log::info!("Stacked {} onto {} in group {}", dragged.id, target.id, id);
            Ok(change)
        })
    }

    /// Tile `new` into the group of `target` at the best-fitting placement
    /// that the constraints allow.
    pub fn tile_window(&mut self, new: WindowGeometry, target: WindowGeometry) -> Result<LayoutChange> {
        self.tile(new, target, None)
    }

    /// Tile `new` into `target`'s area at a fixed corner and split.
    pub fn tile_window_at(&mut self, new: WindowGeometry, target: WindowGeometry, corner: Corner, split: Split) -> Result<LayoutChange> {
        self.tile(new, target, Some((corner, split)))
    }

    fn tile(&mut self, new: WindowGeometry, target: WindowGeometry, fixed: Option<(Corner, Split)>) -> Result<LayoutChange> {
        if new.id == target.id {
            return Err(CompositorError::InvalidGeometry(format!("cannot tile {} onto itself", new.id)));
        }
        self.transaction(|st| {
            let mut change = LayoutChange::default();
            st.detach(new.id, &mut change)?;
            let id = st.ensure_group(&target);
            let group = st
                .groups
                .get(&id)
                .cloned()
                .ok_or_else(|| CompositorError::InvalidGeometry(format!("group {} vanished", id)))?;

            let placements = match fixed {
                Some((corner, split)) => {
                    let area = group.area_of(target.id).ok_or(CompositorError::UnknownWindow(target.id))?;
                    vec![Placement { area, corner, split, error: 0.0 }]
                }
                None => tiling::candidates(&group, new.frame, new.frame.size(), &st.config),
            };

            let mut last_error = None;
            for placement in &placements {
                let mut trial = group.clone();
                trial.split(placement, new.id, new.limits)?;
                match trial.solve(&st.config, &[], None) {
                    Ok(_) => {
                        trial.enforce_screen(st.screen);
                        change.report(&trial);
                        st.groups.insert(id, trial);
                        st.membership.insert(new.id, id);
                        st.own_limits.insert(new.id, new.limits);
                        log::info!(
                            "Tiled {} into group {} at {:?} ({:?} split)",
                            new.id,
                            id,
                            placement.corner,
                            placement.split
                        );
                        return Ok(change);
                    }
                    Err(e) => {
                        log::trace!("Tiling candidate {:?} rejected: {}", placement, e);
                        last_error = Some(e);
                    }
                }
            }
            Err(last_error.unwrap_or_else(|| CompositorError::GeometryInfeasible("no tiling candidate".to_string())))
        })
    }

    /// Take `window` out of its group. The remaining areas keep their
    /// positions; the group splits if it is no longer connected and
    /// dissolves once a single window is left.
    pub fn remove_window(&mut self, window: WindowId) -> Result<LayoutChange> {
        if !self.membership.contains_key(&window) {
            return Ok(LayoutChange::default());
        }
        self.transaction(|st| {
            let mut change = LayoutChange::default();
            st.detach(window, &mut change)?;
            change.released.push(window);
            log::info!("Removed {} from its group", window);
            Ok(change)
        })
    }

    /// Drop the whole group `id`; every member gets its own limits back.
    pub fn dissolve(&mut self, id: GroupId) -> LayoutChange {
        let mut change = LayoutChange::default();
        if let Some(group) = self.groups.remove(&id) {
            for window in group.windows() {
                self.membership.remove(&window);
                self.own_limits.remove(&window);
                change.released.push(window);
            }
            log::info!("Dissolved group {}", id);
        }
        change
    }

    /// The user resizes `window` to the outer frame `requested`. Neighbours
    /// follow through the shared tabs; limits always win over the request.
    pub fn resize_window(&mut self, window: WindowId, requested: Rect) -> Result<LayoutChange> {
        let Some(id) = self.group_of(window) else {
            return Err(CompositorError::UnknownWindow(window));
        };
        self.transaction(|st| {
            let config = st.config.clone();
            let screen = st.screen;
            let group = st
                .groups
                .get_mut(&id)
                .ok_or_else(|| CompositorError::InvalidGeometry(format!("group {} vanished", id)))?;
            let index = group.area_of(window).ok_or(CompositorError::UnknownWindow(window))?;
            let pins = group.pins_for(index, requested);
            group.solve(&config, &pins, Some((index, requested.size())))?;
            group.enforce_screen(screen);
            let mut change = LayoutChange::default();
            change.report(group);
            Ok(change)
        })
    }

    /// Translate the group of `window` by (dx, dy), then back onto the screen.
    pub fn move_group(&mut self, window: WindowId, dx: i32, dy: i32) -> LayoutChange {
        let mut change = LayoutChange::default();
        let screen = self.screen;
        if let Some(group) = self.membership.get(&window).and_then(|id| self.groups.get_mut(id)) {
            group.translate(dx, dy);
            group.enforce_screen(screen);
            change.report(group);
        }
        change
    }

    /// The own limits of `window` changed.
    pub fn set_window_limits(&mut self, window: WindowId, limits: SizeLimits) -> Result<LayoutChange> {
        let Some(id) = self.group_of(window) else {
            return Ok(LayoutChange::default());
        };
        self.transaction(|st| {
            st.own_limits.insert(window, limits);
            let own = st.own_limits.clone();
            let config = st.config.clone();
            let screen = st.screen;
            let group = st
                .groups
                .get_mut(&id)
                .ok_or_else(|| CompositorError::InvalidGeometry(format!("group {} vanished", id)))?;
            let index = group.area_of(window).ok_or(CompositorError::UnknownWindow(window))?;
            group.refresh_limits(index, &own)?;
            group.solve(&config, &[], None)?;
            group.enforce_screen(screen);
            let mut change = LayoutChange::default();
            change.report(group);
            Ok(change)
        })
    }

    /// New screen bounds; every group is pushed back inside.
    pub fn set_screen(&mut self, screen: Rect) -> LayoutChange {
        self.screen = screen;
        let mut change = LayoutChange::default();
        for group in self.groups.values_mut() {
            if group.enforce_screen(screen) != (0, 0) {
                change.report(group);
            }
        }
        change
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    pub fn archive(&self, title_of: impl Fn(WindowId) -> Option<String>) -> Vec<GroupArchive> {
        self.groups.values().map(|g| GroupArchive::capture(g, &title_of)).collect()
    }

    /// Rebuild an archived group around the windows `resolve` finds by title.
    /// Windows already in a group leave it first.
    pub fn restore(&mut self, archive: &GroupArchive, mut resolve: impl FnMut(&str) -> Option<WindowGeometry>) -> Result<LayoutChange> {
        self.transaction(|st| {
            let mut change = LayoutChange::default();
            let mut own = HashMap::new();
            let id = st.allocate_id();
            let group = archive.rebuild(id, |title| resolve(title).map(|g| (g.id, g.limits)), &mut own)?;
            if group.window_count() < 2 {
                return Ok(change);
            }
            for window in group.windows() {
                st.detach(window, &mut change)?;
            }
            st.own_limits.extend(own);
            st.settle(id, group, &mut change)?;
            log::info!("Restored group {}", id);
            Ok(change)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCREEN: Rect = Rect::new(0, 0, 1024, 768);

    fn geometry(id: u32, frame: Rect, limits: SizeLimits) -> WindowGeometry {
        WindowGeometry { id: WindowId(id), frame, limits }
    }

    fn manager() -> StackAndTile {
        StackAndTile::new(StackTileConfig::default(), SCREEN)
    }

    // --- Unit Tests ---

    #[test]
    fn test_stack_combines_limits() {
        let mut sat = manager();
        let a = geometry(1, Rect::new(10, 10, 350, 200), SizeLimits::new(300, 1, 600, 1000));
        let b = geometry(2, Rect::new(10, 10, 350, 200), SizeLimits::new(100, 1, 400, 1000));
        let change = sat.stack_window(a, b, 1).unwrap();
        let combined = change.limits_of(WindowId(1)).unwrap();
        assert_eq!((combined.min_width, combined.max_width), (300, 400));
        assert_eq!(sat.stack_of(WindowId(2)), vec![WindowId(2), WindowId(1)]);
        assert_eq!(change.frame_of(WindowId(1)), change.frame_of(WindowId(2)));
    }

    #[test]
    fn test_stack_rejects_disjoint_limits() {
        let mut sat = manager();
        let a = geometry(1, Rect::new(0, 0, 300, 200), SizeLimits::new(500, 1, 600, 1000));
        let b = geometry(2, Rect::new(0, 0, 300, 200), SizeLimits::new(100, 1, 400, 1000));
        assert!(matches!(sat.stack_window(a, b, 1), Err(CompositorError::GeometryInfeasible(_))));
        assert_eq!(sat.group_count(), 0);
        assert_eq!(sat.group_of(WindowId(2)), None);
    }

    #[test]
    fn test_move_group_stays_on_screen() {
        let mut sat = manager();
        let a = geometry(1, Rect::new(0, 0, 200, 200), SizeLimits::UNBOUNDED);
        let b = geometry(2, Rect::new(0, 0, 400, 200), SizeLimits::UNBOUNDED);
        sat.tile_window_at(a, b, Corner::TopLeft, Split::Vertical).unwrap();
        let change = sat.move_group(WindowId(1), -50, 30);
        assert_eq!(change.frame_of(WindowId(1)), Some(Rect::new(0, 30, 200, 200)));
        assert_eq!(change.frame_of(WindowId(2)), Some(Rect::new(200, 30, 200, 200)));
    }

    #[test]
    fn test_resize_moves_neighbour_edge() {
        let mut sat = manager();
        let a = geometry(1, Rect::new(0, 0, 200, 200), SizeLimits::UNBOUNDED);
        let b = geometry(2, Rect::new(0, 0, 400, 200), SizeLimits::UNBOUNDED);
        sat.tile_window_at(a, b, Corner::TopLeft, Split::Vertical).unwrap();
        let change = sat.resize_window(WindowId(1), Rect::new(0, 0, 250, 200)).unwrap();
        let left = change.frame_of(WindowId(1)).unwrap();
        let right = change.frame_of(WindowId(2)).unwrap();
        assert!((left.width() - 250).abs() <= 1);
        assert_eq!(right.left, left.right);
    }

    #[test]
    fn test_resize_respects_limits() {
        let mut sat = manager();
        let a = geometry(1, Rect::new(0, 0, 200, 200), SizeLimits::new(1, 1, 220, 1000));
        let b = geometry(2, Rect::new(0, 0, 400, 200), SizeLimits::UNBOUNDED);
        sat.tile_window_at(a, b, Corner::TopLeft, Split::Vertical).unwrap();
        let change = sat.resize_window(WindowId(1), Rect::new(0, 0, 300, 200)).unwrap();
        assert!(change.frame_of(WindowId(1)).unwrap().width() <= 220);
    }

    #[test]
    fn test_removal_dissolves_pair() {
        let mut sat = manager();
        let a = geometry(1, Rect::new(0, 0, 200, 200), SizeLimits::UNBOUNDED);
        let b = geometry(2, Rect::new(0, 0, 400, 200), SizeLimits::UNBOUNDED);
        sat.tile_window_at(a, b, Corner::TopLeft, Split::Vertical).unwrap();
        let change = sat.remove_window(WindowId(1)).unwrap();
        assert!(change.released.contains(&WindowId(1)));
        assert!(change.released.contains(&WindowId(2)));
        assert_eq!(sat.group_count(), 0);
    }

    #[test]
    fn test_archive_round_trip_through_titles() {
        let mut sat = manager();
        let a = geometry(1, Rect::new(0, 0, 200, 200), SizeLimits::UNBOUNDED);
        let b = geometry(2, Rect::new(0, 0, 400, 200), SizeLimits::UNBOUNDED);
        sat.tile_window_at(a, b, Corner::TopLeft, Split::Vertical).unwrap();
        let archives = sat.archive(|w| Some(format!("t{}", w.0)));

        let mut fresh = manager();
        let change = fresh
            .restore(&archives[0], |title| match title {
                "t1" => Some(geometry(5, Rect::new(500, 500, 10, 10), SizeLimits::UNBOUNDED)),
                "t2" => Some(geometry(6, Rect::new(500, 500, 10, 10), SizeLimits::UNBOUNDED)),
                _ => None,
            })
            .unwrap();
        assert_eq!(change.frame_of(WindowId(5)), Some(Rect::new(0, 0, 200, 200)));
        assert_eq!(change.frame_of(WindowId(6)), Some(Rect::new(200, 0, 200, 200)));
        assert_eq!(fresh.group_of(WindowId(5)), fresh.group_of(WindowId(6)));
    }

    // --- Scenario Tests ---

    #[test]
    fn scenario_tile_square_window_into_square_group() {
        let mut sat = manager();
        let small = geometry(1, Rect::new(0, 0, 150, 150), SizeLimits::UNBOUNDED);
        let big = geometry(2, Rect::new(0, 0, 300, 300), SizeLimits::UNBOUNDED);
        let change = sat.tile_window(small, big).unwrap();
        assert_eq!(change.frame_of(WindowId(1)), Some(Rect::new(0, 0, 150, 300)));
        assert_eq!(change.frame_of(WindowId(2)), Some(Rect::new(150, 0, 150, 300)));
        assert_eq!(sat.group_of(WindowId(1)), sat.group_of(WindowId(2)));
    }

    #[test]
    fn scenario_stack_then_remove_restores_limits() {
        let mut sat = manager();
        let a = geometry(1, Rect::new(0, 0, 350, 200), SizeLimits::new(300, 1, 600, 1000));
        let b = geometry(2, Rect::new(0, 0, 350, 200), SizeLimits::new(100, 1, 400, 1000));
        sat.stack_window(a, b, 1).unwrap();
        let change = sat.remove_window(WindowId(1)).unwrap();
        // Only B is left, so the group dissolves and B owns its limits again.
        assert!(change.released.contains(&WindowId(2)));
        assert_eq!(sat.group_of(WindowId(2)), None);
    }

    #[test]
    fn scenario_infeasible_tiling_leaves_state_untouched() {
        let mut sat = manager();
        let c = geometry(3, Rect::new(0, 0, 400, 400), SizeLimits::new(1, 1, 400, 1000));
        let a = geometry(1, Rect::new(0, 200, 400, 200), SizeLimits::new(300, 1, 1000, 1000));
        sat.tile_window_at(a, c, Corner::BottomLeft, Split::Horizontal).unwrap();
        let before = sat.area_frame_of(WindowId(1));

        // Side by side in A's 400px wide area both would need 300px.
        let b = geometry(2, Rect::new(0, 200, 200, 200), SizeLimits::new(300, 1, 1000, 1000));
        let err = sat.tile_window_at(b, a, Corner::TopLeft, Split::Vertical);
        assert!(matches!(err, Err(CompositorError::GeometryInfeasible(_))));
        assert_eq!(sat.group_of(WindowId(2)), None);
        assert_eq!(sat.area_frame_of(WindowId(1)), before);
        assert_eq!(sat.group(sat.group_of(WindowId(1)).unwrap()).unwrap().window_count(), 2);
    }
}
