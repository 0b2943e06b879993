//! Everything guarded by the desktop geometry lock.

use super::workspace::WorkspaceManager;
use crate::clip::ClipScene;
use crate::decorator::Decorator;
use crate::error::{CompositorError, Result};
use crate::region::ClipRegion;
use crate::stack_tile::{StackAndTile, WindowGeometry};
use crate::types::{Insets, Rect, StackId, WindowId};
use crate::window::{SizeLimits, ViewTree, Window, WindowFeel, WindowStack, MAX_EXTENT};
use std::collections::HashMap;

pub struct DesktopState {
    pub screen: Rect,
    pub windows: HashMap<WindowId, Window>,
    /// Back to front.
    pub z_order: Vec<WindowId>,
    pub stacks: HashMap<StackId, WindowStack>,
    pub views: ViewTree,
    pub stack_tile: StackAndTile,
    pub workspaces: WorkspaceManager,
}

impl DesktopState {
    pub fn new(screen: Rect, stack_tile: StackAndTile, workspaces: WorkspaceManager) -> Self {
        Self {
            screen,
            windows: HashMap::new(),
            z_order: Vec::new(),
            stacks: HashMap::new(),
            views: ViewTree::new(),
            stack_tile,
            workspaces,
        }
    }

    pub fn window(&self, id: WindowId) -> Result<&Window> {
        self.windows.get(&id).ok_or(CompositorError::UnknownWindow(id))
    }

    pub fn window_mut(&mut self, id: WindowId) -> Result<&mut Window> {
        self.windows.get_mut(&id).ok_or(CompositorError::UnknownWindow(id))
    }

    pub fn stack_of(&self, id: WindowId) -> Option<&WindowStack> {
        self.windows.get(&id).and_then(|w| self.stacks.get(&w.stack))
    }

    pub fn stack_of_mut(&mut self, id: WindowId) -> Option<&mut WindowStack> {
        let stack = self.windows.get(&id)?.stack;
        self.stacks.get_mut(&stack)
    }

    pub fn decorator_of(&self, id: WindowId) -> Option<&dyn Decorator> {
        self.stack_of(id).map(|s| s.decorator())
    }

    pub fn insets_of(&self, id: WindowId) -> Insets {
        self.decorator_of(id).map_or(Insets::NONE, |d| d.insets())
    }

    /// Content frame plus chrome.
    pub fn outer_frame(&self, id: WindowId) -> Option<Rect> {
        let window = self.windows.get(&id)?;
        Some(self.insets_of(id).expand(window.frame))
    }

    /// What Stack & Tile needs to know about a window.
    pub fn geometry_of(&self, id: WindowId) -> Result<WindowGeometry> {
        let window = self.window(id)?;
        let insets = self.insets_of(id);
        Ok(WindowGeometry {
            id,
            frame: insets.expand(window.frame),
            limits: outer_limits(window.own_limits(), insets),
        })
    }

    pub fn is_on_current_workspace(&self, id: WindowId) -> bool {
        self.windows
            .get(&id)
            .map_or(false, |w| w.on_workspace(self.workspaces.active()))
    }

    /// Shown windows, back to front.
    pub fn shown_windows(&self) -> Vec<WindowId> {
        self.z_order.iter().copied().filter(|w| self.is_window_shown(*w)).collect()
    }

    /// Outer frames of every shown window except `id`'s stack.
    pub fn other_frames(&self, id: WindowId) -> Vec<Rect> {
        let stack = self.windows.get(&id).map(|w| w.stack);
        self.shown_windows()
            .into_iter()
            .filter(|w| self.windows.get(w).map(|x| x.stack) != stack)
            .filter_map(|w| self.outer_frame(w))
            .collect()
    }

    // ========================================================================
    // Z-order
    // ========================================================================

    /// Insert position for a window of `feel` that should be on top of its
    /// layer.
    fn layer_top(&self, feel: WindowFeel) -> usize {
        self.z_order
            .iter()
            .rposition(|w| self.windows.get(w).map_or(false, |x| x.feel <= feel))
            .map_or(0, |i| i + 1)
    }

    /// Put `id` and its stack mates on top of their layer.
    pub fn raise(&mut self, id: WindowId) {
        let Some(window) = self.windows.get(&id) else {
            return;
        };
        let feel = window.feel;
        let mates: Vec<WindowId> = match self.stacks.get(&window.stack) {
            Some(stack) => stack.windows().to_vec(),
            None => vec![id],
        };
        self.z_order.retain(|w| !mates.contains(w));
        let at = self.layer_top(feel);
        for (i, w) in mates.into_iter().enumerate() {
            self.z_order.insert(at + i, w);
        }
    }

    pub fn insert_in_z_order(&mut self, id: WindowId, feel: WindowFeel) {
        let at = self.layer_top(feel);
        self.z_order.insert(at, id);
    }

    pub fn is_topmost(&self, id: WindowId) -> bool {
        self.shown_windows().last() == Some(&id)
    }
}

impl ClipScene for DesktopState {
    fn screen(&self) -> Rect {
        self.screen
    }

    fn z_order(&self) -> &[WindowId] {
        &self.z_order
    }

    fn is_window_shown(&self, window: WindowId) -> bool {
        let Some(w) = self.windows.get(&window) else {
            return false;
        };
        !w.minimized
            && w.on_workspace(self.workspaces.active())
            && self.stacks.get(&w.stack).map_or(false, |s| s.is_front(window))
    }

    fn window_content(&self, window: WindowId) -> Option<Rect> {
        self.windows.get(&window).map(|w| w.frame)
    }

    fn window_shape(&self, window: WindowId) -> Option<ClipRegion> {
        let frame = self.windows.get(&window)?.frame;
        let mut shape = match self.decorator_of(window) {
            Some(decorator) => decorator.footprint(),
            None => ClipRegion::new(),
        };
        shape.include(frame);
        Some(shape)
    }

    fn views(&self) -> &ViewTree {
        &self.views
    }
}

/// Content limits grown by the chrome.
pub fn outer_limits(limits: SizeLimits, insets: Insets) -> SizeLimits {
    SizeLimits::new(
        limits.min_width + insets.horizontal(),
        limits.min_height + insets.vertical(),
        limits.max_width.saturating_add(insets.horizontal()).min(MAX_EXTENT + insets.horizontal()),
        limits.max_height.saturating_add(insets.vertical()).min(MAX_EXTENT + insets.vertical()),
    )
}

/// Outer limits shrunk back to content limits.
pub fn content_limits(limits: SizeLimits, insets: Insets) -> SizeLimits {
    SizeLimits::new(
        (limits.min_width - insets.horizontal()).max(1),
        (limits.min_height - insets.vertical()).max(1),
        (limits.max_width - insets.horizontal()).max(1),
        (limits.max_height - insets.vertical()).max(1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_survive_insets_round_trip() {
        let insets = Insets::new(5, 24, 5, 5);
        let own = SizeLimits::new(300, 100, 600, 400);
        let outer = outer_limits(own, insets);
        assert_eq!(outer, SizeLimits::new(310, 129, 610, 429));
        assert_eq!(content_limits(outer, insets), own);
    }
}
