//! Virtual workspaces.
//!
//! Membership lives on the windows as a bit mask; the manager only tracks
//! which workspace is active and which window last had focus on each.

use crate::types::WindowId;

/// Upper bound imposed by the 32-bit workspace mask.
pub const MAX_WORKSPACES: u32 = 32;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Workspace {
    pub index: u32,
    pub name: String,
    /// Window to refocus when switching back.
    pub focused_window: Option<WindowId>,
}

impl Workspace {
    pub fn new(index: u32) -> Self {
        Self { index, name: format!("Desktop {}", index + 1), focused_window: None }
    }

    pub fn mask(&self) -> u32 {
        1 << self.index
    }
}

#[derive(Clone, Debug)]
pub struct WorkspaceManager {
    workspaces: Vec<Workspace>,
    active: u32,
}

impl Default for WorkspaceManager {
    fn default() -> Self {
        Self::new(4)
    }
}

impl WorkspaceManager {
    pub fn new(count: u32) -> Self {
        let count = count.clamp(1, MAX_WORKSPACES);
        Self { workspaces: (0..count).map(Workspace::new).collect(), active: 0 }
    }

    pub fn count(&self) -> u32 {
        self.workspaces.len() as u32
    }

    pub fn active(&self) -> u32 {
        self.active
    }

    pub fn active_mask(&self) -> u32 {
        1 << self.active
    }

    /// Mask with a bit for every workspace.
    pub fn all_mask(&self) -> u32 {
        if self.count() >= 32 {
            u32::MAX
        } else {
            (1u32 << self.count()) - 1
        }
    }

    pub fn active_workspace(&self) -> &Workspace {
        &self.workspaces[self.active as usize]
    }

    pub fn workspace(&self, index: u32) -> Option<&Workspace> {
        self.workspaces.get(index as usize)
    }

    /// Switch to a workspace. Returns false if already there or out of range.
    pub fn switch_to(&mut self, index: u32) -> bool {
        if index >= self.count() || index == self.active {
            return false;
        }
        log::info!("Workspace {} -> {}", self.active, index);
        self.active = index;
        true
    }

    pub fn switch_next(&mut self) -> bool {
        let next = (self.active + 1) % self.count();
        self.switch_to(next)
    }

    pub fn switch_prev(&mut self) -> bool {
        let prev = if self.active == 0 { self.count() - 1 } else { self.active - 1 };
        self.switch_to(prev)
    }

    pub fn remember_focus(&mut self, window: Option<WindowId>) {
        let index = self.active as usize;
        self.workspaces[index].focused_window = window;
    }

    pub fn window_removed(&mut self, window: WindowId) {
        for ws in &mut self.workspaces {
            if ws.focused_window == Some(window) {
                ws.focused_window = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switching_wraps_and_rejects_out_of_range() {
        let mut mgr = WorkspaceManager::new(4);
        assert!(!mgr.switch_to(0));
        assert!(!mgr.switch_to(9));
        assert!(mgr.switch_prev());
        assert_eq!(mgr.active(), 3);
        assert!(mgr.switch_next());
        assert_eq!(mgr.active(), 0);
        assert_eq!(mgr.active_mask(), 1);
        assert_eq!(mgr.all_mask(), 0b1111);
    }

    #[test]
    fn test_focus_memory_is_per_workspace() {
        let mut mgr = WorkspaceManager::new(2);
        mgr.remember_focus(Some(WindowId(7)));
        mgr.switch_to(1);
        assert_eq!(mgr.active_workspace().focused_window, None);
        assert_eq!(mgr.workspace(0).unwrap().focused_window, Some(WindowId(7)));
        mgr.window_removed(WindowId(7));
        assert_eq!(mgr.workspace(0).unwrap().focused_window, None);
    }
}
