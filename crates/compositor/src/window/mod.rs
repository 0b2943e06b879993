//! Server-side windows, window stacks and the view arena.

pub mod stack;
pub mod view;

pub use stack::WindowStack;
pub use view::{View, ViewId, ViewParent, ViewTree};

use crate::types::{Rect, Size, StackId, WindowId};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Largest window extent accepted by the server.
pub const MAX_EXTENT: i32 = 32_768;

// ============================================================================
// Look / Feel / Flags
// ============================================================================

/// Visual chrome requested by the client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowLook {
    /// Tab with title, close and zoom buttons, resizable border.
    #[default]
    Titled,
    /// Like `Titled`, with a resize knob look.
    Document,
    /// Thick border, no tab.
    Modal,
    /// Thin border, no tab.
    Bordered,
    /// No chrome at all.
    NoBorder,
}

impl WindowLook {
    pub fn has_tab(self) -> bool {
        matches!(self, WindowLook::Titled | WindowLook::Document)
    }
}

/// Layer a window lives in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WindowFeel {
    /// Desktop background layer, below everything else.
    Desktop,
    #[default]
    Normal,
    /// Always above normal windows.
    Floating,
}

bitflags! {
    /// Behavioural restrictions of a window.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct WindowFlags: u32 {
        const NOT_MOVABLE = 1 << 0;
        const NOT_RESIZABLE = 1 << 1;
        const NOT_CLOSABLE = 1 << 2;
        const NOT_ZOOMABLE = 1 << 3;
        const NOT_MINIMIZABLE = 1 << 4;
        /// Never activated by clicks.
        const AVOID_FOCUS = 1 << 5;
        /// Excluded from stacking and tiling.
        const NO_STACK_AND_TILE = 1 << 6;
    }
}

// ============================================================================
// Size limits
// ============================================================================

/// Minimum and maximum content size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeLimits {
    pub min_width: i32,
    pub min_height: i32,
    pub max_width: i32,
    pub max_height: i32,
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

impl SizeLimits {
    pub const UNBOUNDED: SizeLimits = SizeLimits {
        min_width: 1,
        min_height: 1,
        max_width: MAX_EXTENT,
        max_height: MAX_EXTENT,
    };

    pub const fn new(min_width: i32, min_height: i32, max_width: i32, max_height: i32) -> Self {
        Self { min_width, min_height, max_width, max_height }
    }

    pub fn fixed(width: i32, height: i32) -> Self {
        Self::new(width, height, width, height)
    }

    pub fn is_satisfiable(&self) -> bool {
        self.min_width <= self.max_width && self.min_height <= self.max_height
    }

    pub fn clamp(&self, size: Size) -> Size {
        Size::new(
            size.width.clamp(self.min_width, self.max_width.max(self.min_width)),
            size.height.clamp(self.min_height, self.max_height.max(self.min_height)),
        )
    }

    pub fn contains(&self, size: Size) -> bool {
        size.width >= self.min_width
            && size.width <= self.max_width
            && size.height >= self.min_height
            && size.height <= self.max_height
    }

    /// Limits honouring both inputs: larger minimum, smaller maximum.
    pub fn combine(&self, other: &SizeLimits) -> SizeLimits {
        SizeLimits {
            min_width: self.min_width.max(other.min_width),
            min_height: self.min_height.max(other.min_height),
            max_width: self.max_width.min(other.max_width),
            max_height: self.max_height.min(other.max_height),
        }
    }
}

// ============================================================================
// Window
// ============================================================================

/// Parameters of a client window-creation request.
#[derive(Clone, Debug)]
pub struct WindowSpec {
    pub title: String,
    /// Content frame in screen coordinates.
    pub frame: Rect,
    pub look: WindowLook,
    pub feel: WindowFeel,
    pub flags: WindowFlags,
    pub limits: SizeLimits,
    /// Workspace bit mask, `None` for the current workspace.
    pub workspaces: Option<u32>,
}

impl WindowSpec {
    pub fn new(title: impl Into<String>, frame: Rect) -> Self {
        Self {
            title: title.into(),
            frame,
            look: WindowLook::Titled,
            feel: WindowFeel::Normal,
            flags: WindowFlags::empty(),
            limits: SizeLimits::UNBOUNDED,
            workspaces: None,
        }
    }

    pub fn look(mut self, look: WindowLook) -> Self {
        self.look = look;
        self
    }

    pub fn feel(mut self, feel: WindowFeel) -> Self {
        self.feel = feel;
        self
    }

    pub fn flags(mut self, flags: WindowFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn limits(mut self, limits: SizeLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn workspaces(mut self, mask: u32) -> Self {
        self.workspaces = Some(mask);
        self
    }
}

/// A server-side window.
#[derive(Debug, Clone)]
pub struct Window {
    pub id: WindowId,
    pub title: String,
    /// Content frame in screen coordinates (excludes decorator chrome).
    pub frame: Rect,
    pub look: WindowLook,
    pub feel: WindowFeel,
    pub flags: WindowFlags,
    /// Limits currently in force (group limits while stacked/tiled).
    pub limits: SizeLimits,
    /// The window's own limits while group limits are in force.
    pub saved_limits: Option<SizeLimits>,
    pub stack: StackId,
    pub root_view: ViewId,
    /// Bit mask of workspaces the window appears on.
    pub workspaces: u32,
    pub minimized: bool,
    pub focus_view: Option<ViewId>,
    /// Frame to return to when un-zooming.
    pub zoom_restore: Option<Rect>,
}

impl Window {
    pub fn is_movable(&self) -> bool {
        !self.flags.contains(WindowFlags::NOT_MOVABLE)
    }

    pub fn is_resizable(&self) -> bool {
        !self.flags.contains(WindowFlags::NOT_RESIZABLE)
    }

    /// Whether a click may raise and focus this window.
    pub fn is_activatable(&self) -> bool {
        !self.flags.contains(WindowFlags::AVOID_FOCUS) && self.feel != WindowFeel::Desktop
    }

    /// Limits the client asked for, whatever group the window is in.
    pub fn own_limits(&self) -> SizeLimits {
        self.saved_limits.unwrap_or(self.limits)
    }

    pub fn on_workspace(&self, index: u32) -> bool {
        index < 32 && self.workspaces & (1 << index) != 0
    }
}
