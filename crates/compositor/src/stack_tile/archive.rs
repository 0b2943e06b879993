//! Persisted group layouts. Windows are recorded by title since ids do not
//! survive a restart.

use super::group::{Axis, SatGroup, Tab, TabId, WindowArea};
use super::GroupId;
use crate::error::{CompositorError, Result};
use crate::types::{Size, WindowId};
use crate::window::SizeLimits;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabArchive {
    pub axis: Axis,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaArchive {
    pub left: usize,
    pub top: usize,
    pub right: usize,
    pub bottom: usize,
    pub windows: Vec<String>,
    pub preferred: Size,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupArchive {
    pub tabs: Vec<TabArchive>,
    pub areas: Vec<AreaArchive>,
}

impl GroupArchive {
    /// Record `group`; windows without a title are left out.
    pub fn capture(group: &SatGroup, title_of: impl Fn(WindowId) -> Option<String>) -> Self {
        let tabs = group
            .tabs()
            .iter()
            .map(|t| TabArchive { axis: t.axis, position: t.position.round() as i32 })
            .collect();
        let areas = group
            .areas()
            .iter()
            .map(|a| AreaArchive {
                left: a.left.0,
                top: a.top.0,
                right: a.right.0,
                bottom: a.bottom.0,
                windows: a.windows.iter().filter_map(|w| title_of(*w)).collect(),
                preferred: a.preferred,
            })
            .collect();
        Self { tabs, areas }
    }

    pub fn to_blob(archives: &[GroupArchive]) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(archives)?)
    }

    pub fn from_blob(blob: &[u8]) -> Result<Vec<GroupArchive>> {
        Ok(serde_json::from_slice(blob)?)
    }

    fn validate(&self) -> Result<()> {
        let axis_of = |i: usize| self.tabs.get(i).map(|t| t.axis);
        for (n, area) in self.areas.iter().enumerate() {
            let ok = axis_of(area.left) == Some(Axis::X)
                && axis_of(area.right) == Some(Axis::X)
                && axis_of(area.top) == Some(Axis::Y)
                && axis_of(area.bottom) == Some(Axis::Y);
            if !ok {
                return Err(CompositorError::Settings(format!("archived area {} refers to bad tabs", n)));
            }
        }
        Ok(())
    }

    /// Rebuild the group for the windows `resolve` finds by title. Areas
    /// whose windows are all gone are dropped. A window resolved twice stays
    /// in the first area that claimed it. `own` receives each resolved
    /// window's own limits.
    pub fn rebuild(
        &self,
        id: GroupId,
        mut resolve: impl FnMut(&str) -> Option<(WindowId, SizeLimits)>,
        own: &mut HashMap<WindowId, SizeLimits>,
    ) -> Result<SatGroup> {
        self.validate()?;
        let tabs = self
            .tabs
            .iter()
            .map(|t| Tab { axis: t.axis, position: t.position as f64 })
            .collect();
        let mut areas = Vec::new();
        let mut placed = HashSet::new();
        for archived in &self.areas {
            let mut windows = Vec::new();
            let mut limits = SizeLimits::UNBOUNDED;
            for title in &archived.windows {
                if let Some((window, window_limits)) = resolve(title) {
                    if !placed.insert(window) {
                        log::debug!("Archived '{}' resolved to {} twice; keeping the first area", title, window);
                        continue;
                    }
                    windows.push(window);
                    limits = limits.combine(&window_limits);
                    own.insert(window, window_limits);
                }
            }
            if windows.is_empty() {
                continue;
            }
            areas.push(WindowArea {
                left: TabId(archived.left),
                top: TabId(archived.top),
                right: TabId(archived.right),
                bottom: TabId(archived.bottom),
                windows,
                limits,
                preferred: archived.preferred,
            });
        }
        Ok(SatGroup::from_parts(id, tabs, areas))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack_tile::tiling::{Corner, Placement, Split};
    use crate::types::Rect;

    fn two_by_one() -> SatGroup {
        let mut group = SatGroup::new(GroupId(7), WindowId(1), Rect::new(0, 0, 400, 200), SizeLimits::UNBOUNDED);
        let placement = Placement { area: 0, corner: Corner::TopRight, split: Split::Vertical, error: 0.0 };
        group.split(&placement, WindowId(2), SizeLimits::UNBOUNDED).unwrap();
        group
    }

    fn title(w: WindowId) -> Option<String> {
        Some(format!("win-{}", w.0))
    }

    #[test]
    fn test_rebuild_by_title_with_new_ids() {
        let group = two_by_one();
        let blob = GroupArchive::to_blob(&[GroupArchive::capture(&group, title)]).unwrap();
        let archives = GroupArchive::from_blob(&blob).unwrap();
        assert_eq!(archives.len(), 1);

        let mut own = HashMap::new();
        let rebuilt = archives[0]
            .rebuild(
                GroupId(9),
                |t| match t {
                    "win-1" => Some((WindowId(11), SizeLimits::UNBOUNDED)),
                    "win-2" => Some((WindowId(12), SizeLimits::new(10, 10, 500, 500))),
                    _ => None,
                },
                &mut own,
            )
            .unwrap();
        assert_eq!(rebuilt.window_count(), 2);
        assert_eq!(rebuilt.area_frame(rebuilt.area_of(WindowId(12)).unwrap()), Some(Rect::new(200, 0, 200, 200)));
        assert_eq!(own.len(), 2);
    }

    #[test]
    fn test_missing_windows_drop_their_areas() {
        let group = two_by_one();
        let archive = GroupArchive::capture(&group, title);
        let mut own = HashMap::new();
        let rebuilt = archive
            .rebuild(GroupId(1), |t| (t == "win-1").then_some((WindowId(1), SizeLimits::UNBOUNDED)), &mut own)
            .unwrap();
        assert_eq!(rebuilt.window_count(), 1);
        assert_eq!(rebuilt.tabs().len(), 4);
    }

    #[test]
    fn test_window_resolved_twice_joins_one_area() {
        let group = two_by_one();
        let archive = GroupArchive::capture(&group, title);
        let mut own = HashMap::new();
        let rebuilt = archive
            .rebuild(GroupId(3), |_| Some((WindowId(5), SizeLimits::UNBOUNDED)), &mut own)
            .unwrap();
        assert_eq!(rebuilt.window_count(), 1);
        assert_eq!(rebuilt.areas().len(), 1);
        assert_eq!(rebuilt.area_of(WindowId(5)), Some(0));
    }

    #[test]
    fn test_corrupt_tab_reference_is_rejected() {
        let mut archive = GroupArchive::capture(&two_by_one(), title);
        archive.areas[0].left = 1;
        let err = archive.rebuild(GroupId(1), |_| None, &mut HashMap::new());
        assert!(matches!(err, Err(CompositorError::Settings(_))));
    }
}
