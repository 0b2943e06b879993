//! Window Behaviour
//!
//! Turns pointer gestures on a window's chrome into geometry actions. The
//! default behaviour is a small state machine:
//!
//! - `Idle`: waiting for a press.
//! - `Dragging`: tab or move area pressed, pointer motion moves the window.
//! - `Resizing`: border pressed, pointer motion drags the grabbed edges.
//! - `SlidingTab`: Shift + tab press, motion slides the tab along the top.
//! - `PressingButton`: a button is held; it fires on release inside it.
//! - `ManagingWindow`: Command + Control press anywhere in the window.
//!
//! Behaviours never touch the desktop themselves; they emit
//! `BehaviourAction`s which the desktop applies under its write lock.

pub mod magnetic;

pub use magnetic::MagneticSnapper;

use crate::config::SnapConfig;
use crate::decorator::{HitRegion, ResizeEdge};
use crate::input::{Buttons, InputEvent, InputEventKind, Modifiers};
use crate::types::{Point, Rect, WindowId};
use crate::window::WindowFlags;

// ============================================================================
// Actions
// ============================================================================

/// Geometry or lifecycle change requested by a behaviour for its window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BehaviourAction {
    MoveBy { dx: i32, dy: i32 },
    /// Move the grabbed edges; `dx`/`dy` apply to whichever horizontal and
    /// vertical edge `edge` names.
    ResizeBy { edge: ResizeEdge, dx: i32, dy: i32 },
    /// Put the content frame back to an earlier value.
    SetFrame(Rect),
    /// Raise and focus.
    Activate,
    Close,
    Zoom,
    Minimize,
    SetTabLocation(f32),
    SetFrontTab(usize),
    /// Window was dropped with Option held: stack or tile it at `at`.
    DropForStackAndTile { at: Point },
}

/// What the behaviour may read about its window for one event.
#[derive(Clone, Copy, Debug)]
pub struct BehaviourContext<'a> {
    pub window: WindowId,
    /// Content frame.
    pub content: Rect,
    /// Content frame plus chrome; the frame that snaps.
    pub frame: Rect,
    pub flags: WindowFlags,
    /// Decorator region under the event position.
    pub hit: HitRegion,
    pub tab_location: f32,
    pub screen: Rect,
    /// Outer frames of the other shown windows.
    pub others: &'a [Rect],
}

// ============================================================================
// Trait
// ============================================================================

pub trait WindowBehaviour: Send {
    fn mouse_down(&mut self, ctx: &BehaviourContext<'_>, event: &InputEvent) -> Vec<BehaviourAction>;

    fn mouse_moved(&mut self, ctx: &BehaviourContext<'_>, event: &InputEvent) -> Vec<BehaviourAction>;

    fn mouse_up(&mut self, ctx: &BehaviourContext<'_>, event: &InputEvent) -> Vec<BehaviourAction>;

    /// Abort the gesture in progress and undo it.
    fn cancel(&mut self) -> Vec<BehaviourAction>;

    fn state(&self) -> BehaviourState;

    fn is_active(&self) -> bool {
        self.state() != BehaviourState::Idle
    }

    /// Handle any pointer event.
    fn handle(&mut self, ctx: &BehaviourContext<'_>, event: &InputEvent) -> Vec<BehaviourAction> {
        match event.kind {
            InputEventKind::MouseDown { .. } => self.mouse_down(ctx, event),
            InputEventKind::MouseMoved => self.mouse_moved(ctx, event),
            InputEventKind::MouseUp { .. } => self.mouse_up(ctx, event),
            _ => Vec::new(),
        }
    }
}

/// Coarse state, for inspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BehaviourState {
    Idle,
    Dragging,
    Resizing,
    SlidingTab,
    PressingButton,
    ManagingWindow,
}

/// Modifiers that put a press anywhere into window management.
pub const MANAGE_MODIFIERS: Modifiers = Modifiers::COMMAND.union(Modifiers::CONTROL);

#[derive(Clone, Copy, Debug, PartialEq)]
enum State {
    Idle,
    Dragging {
        last: Point,
        original: Rect,
    },
    Resizing {
        edge: ResizeEdge,
        last: Point,
        original: Rect,
    },
    SlidingTab {
        start_x: i32,
        original: f32,
    },
    PressingButton {
        button: HitRegion,
    },
    ManagingWindow {
        last: Point,
        original: Rect,
        resize: Option<ResizeEdge>,
    },
}

// ============================================================================
// Default behaviour
// ============================================================================

#[derive(Debug, Clone)]
pub struct DefaultWindowBehaviour {
    state: State,
    snapper: MagneticSnapper,
}

impl Default for DefaultWindowBehaviour {
    fn default() -> Self {
        Self::new(&SnapConfig::default())
    }
}

impl DefaultWindowBehaviour {
    pub fn new(snapping: &SnapConfig) -> Self {
        Self { state: State::Idle, snapper: MagneticSnapper::new(snapping) }
    }

    pub fn snapper(&self) -> &MagneticSnapper {
        &self.snapper
    }

    fn drag_by(&mut self, ctx: &BehaviourContext<'_>, dx: i32, dy: i32, now: u64) -> Vec<BehaviourAction> {
        if !ctx.flags.contains(WindowFlags::NOT_MOVABLE) {
            let (dx, dy) = self.snapper.snap_move(ctx.frame, dx, dy, ctx.screen, ctx.others, now);
            if dx != 0 || dy != 0 {
                return vec![BehaviourAction::MoveBy { dx, dy }];
            }
        }
        Vec::new()
    }

    fn resize_by(&mut self, ctx: &BehaviourContext<'_>, edge: ResizeEdge, dx: i32, dy: i32, now: u64) -> Vec<BehaviourAction> {
        let dx = if edge.moves_left() || edge.moves_right() { dx } else { 0 };
        let dy = if edge.moves_top() || edge.moves_bottom() { dy } else { 0 };
        let (dx, dy) = self.snapper.snap_resize(ctx.frame, edge, dx, dy, ctx.screen, ctx.others, now);
        if dx == 0 && dy == 0 {
            return Vec::new();
        }
        vec![BehaviourAction::ResizeBy { edge, dx, dy }]
    }
}

/// Corner nearest to `p`, used when resizing from inside the window.
fn nearest_corner(frame: Rect, p: Point) -> ResizeEdge {
    let left = p.x < frame.left + frame.width() / 2;
    let top = p.y < frame.top + frame.height() / 2;
    match (left, top) {
        (true, true) => ResizeEdge::TopLeft,
        (false, true) => ResizeEdge::TopRight,
        (true, false) => ResizeEdge::BottomLeft,
        (false, false) => ResizeEdge::BottomRight,
    }
}

impl WindowBehaviour for DefaultWindowBehaviour {
    fn mouse_down(&mut self, ctx: &BehaviourContext<'_>, event: &InputEvent) -> Vec<BehaviourAction> {
        if self.state != State::Idle {
            return Vec::new();
        }
        let InputEventKind::MouseDown { button } = event.kind else {
            return Vec::new();
        };
        let p = event.position;
        self.snapper.begin_drag();

        if event.modifiers.contains(MANAGE_MODIFIERS) {
            let resize = if button.contains(Buttons::SECONDARY) && !ctx.flags.contains(WindowFlags::NOT_RESIZABLE) {
                Some(nearest_corner(ctx.frame, p))
            } else {
                None
            };
            self.state = State::ManagingWindow { last: p, original: ctx.content, resize };
            log::debug!("{}: managing window", ctx.window);
            return vec![BehaviourAction::Activate];
        }

        match ctx.hit {
            HitRegion::Tab(index) if event.clicks >= 2 => {
                log::debug!("{}: double click on tab {}", ctx.window, index);
                vec![BehaviourAction::Zoom]
            }
            HitRegion::Tab(_) if event.modifiers.contains(Modifiers::SHIFT) => {
                self.state = State::SlidingTab { start_x: p.x, original: ctx.tab_location };
                Vec::new()
            }
            HitRegion::Tab(index) => {
                self.state = State::Dragging { last: p, original: ctx.content };
                vec![BehaviourAction::Activate, BehaviourAction::SetFrontTab(index)]
            }
            HitRegion::MoveArea => {
                self.state = State::Dragging { last: p, original: ctx.content };
                vec![BehaviourAction::Activate]
            }
            HitRegion::ResizeBorder(edge) => {
                self.state = State::Resizing { edge, last: p, original: ctx.content };
                vec![BehaviourAction::Activate]
            }
            region if region.is_button() => {
                self.state = State::PressingButton { button: region };
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn mouse_moved(&mut self, ctx: &BehaviourContext<'_>, event: &InputEvent) -> Vec<BehaviourAction> {
        let p = event.position;
        let now = event.timestamp_us;
        match self.state {
            State::Dragging { last, original } => {
                self.state = State::Dragging { last: p, original };
                self.drag_by(ctx, p.x - last.x, p.y - last.y, now)
            }
            State::Resizing { edge, last, original } => {
                self.state = State::Resizing { edge, last: p, original };
                self.resize_by(ctx, edge, p.x - last.x, p.y - last.y, now)
            }
            State::ManagingWindow { last, original, resize } => {
                self.state = State::ManagingWindow { last: p, original, resize };
                match resize {
                    Some(edge) => self.resize_by(ctx, edge, p.x - last.x, p.y - last.y, now),
                    None => self.drag_by(ctx, p.x - last.x, p.y - last.y, now),
                }
            }
            State::SlidingTab { start_x, original } => {
                vec![BehaviourAction::SetTabLocation(original + (p.x - start_x) as f32)]
            }
            State::PressingButton { .. } | State::Idle => Vec::new(),
        }
    }

    fn mouse_up(&mut self, ctx: &BehaviourContext<'_>, event: &InputEvent) -> Vec<BehaviourAction> {
        let state = std::mem::replace(&mut self.state, State::Idle);
        match state {
            State::Dragging { .. }
                if event.modifiers.contains(Modifiers::OPTION)
                    && !ctx.flags.contains(WindowFlags::NO_STACK_AND_TILE) =>
            {
                vec![BehaviourAction::DropForStackAndTile { at: event.position }]
            }
            State::PressingButton { button } if button == ctx.hit => match button {
                HitRegion::CloseButton => vec![BehaviourAction::Close],
                HitRegion::ZoomButton => vec![BehaviourAction::Zoom],
                HitRegion::MinimizeButton => vec![BehaviourAction::Minimize],
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    fn cancel(&mut self) -> Vec<BehaviourAction> {
        let state = std::mem::replace(&mut self.state, State::Idle);
        match state {
            State::Dragging { original, .. }
            | State::Resizing { original, .. }
            | State::ManagingWindow { original, .. } => vec![BehaviourAction::SetFrame(original)],
            State::SlidingTab { original, .. } => vec![BehaviourAction::SetTabLocation(original)],
            State::PressingButton { .. } | State::Idle => Vec::new(),
        }
    }

    fn state(&self) -> BehaviourState {
        match self.state {
            State::Idle => BehaviourState::Idle,
            State::Dragging { .. } => BehaviourState::Dragging,
            State::Resizing { .. } => BehaviourState::Resizing,
            State::SlidingTab { .. } => BehaviourState::SlidingTab,
            State::PressingButton { .. } => BehaviourState::PressingButton,
            State::ManagingWindow { .. } => BehaviourState::ManagingWindow,
        }
    }
}
