//! Input pipeline: event types, the bounded event queue, the router and the
//! dedicated input thread.

pub mod queue;
pub mod router;
pub mod server;

pub use queue::{EventQueue, QueueStats};
pub use router::{Crossing, DispatchOutcome, EventRouter, FocusStack, HitArea, RouteResult, Scene};
pub use server::{CursorPoller, CursorSlot, CursorSource, InputServer};

use crate::types::Point;
use bitflags::bitflags;

// ============================================================================
// Buttons / Modifiers
// ============================================================================

bitflags! {
    /// Mouse buttons.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Buttons: u8 {
        const PRIMARY = 1 << 0;
        const SECONDARY = 1 << 1;
        const TERTIARY = 1 << 2;
    }
}

bitflags! {
    /// Keyboard modifiers held while an event was generated.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        const SHIFT = 1 << 0;
        const CONTROL = 1 << 1;
        const OPTION = 1 << 2;
        const COMMAND = 1 << 3;
        const CAPS_LOCK = 1 << 4;
    }
}

// ============================================================================
// Events
// ============================================================================

/// Input event types.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputEventKind {
    /// Button pressed; `button` has exactly one bit set.
    MouseDown { button: Buttons },
    MouseUp { button: Buttons },
    MouseMoved,
    MouseWheel { dx: f32, dy: f32 },
    KeyDown { key: u32, ch: Option<char> },
    KeyUp { key: u32 },
}

/// An event as read from an input device.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InputEvent {
    pub kind: InputEventKind,
    /// Cursor position in screen coordinates.
    pub position: Point,
    /// Buttons held after this event was applied.
    pub buttons: Buttons,
    pub modifiers: Modifiers,
    /// Microseconds on the input clock.
    pub timestamp_us: u64,
    pub device: u32,
    /// Click count of a button-down (1 = single click); filled in by the router.
    pub clicks: u32,
}

impl InputEvent {
    pub fn new(kind: InputEventKind, position: Point, timestamp_us: u64) -> Self {
        Self {
            kind,
            position,
            buttons: Buttons::empty(),
            modifiers: Modifiers::empty(),
            timestamp_us,
            device: 0,
            clicks: 0,
        }
    }

    pub fn mouse_down(position: Point, button: Buttons, timestamp_us: u64) -> Self {
        let mut event = Self::new(InputEventKind::MouseDown { button }, position, timestamp_us);
        event.buttons = button;
        event
    }

    pub fn mouse_up(position: Point, button: Buttons, timestamp_us: u64) -> Self {
        Self::new(InputEventKind::MouseUp { button }, position, timestamp_us)
    }

    pub fn mouse_moved(position: Point, buttons: Buttons, timestamp_us: u64) -> Self {
        let mut event = Self::new(InputEventKind::MouseMoved, position, timestamp_us);
        event.buttons = buttons;
        event
    }

    pub fn key_down(key: u32, ch: Option<char>, timestamp_us: u64) -> Self {
        Self::new(InputEventKind::KeyDown { key, ch }, Point::ORIGIN, timestamp_us)
    }

    pub fn key_up(key: u32, timestamp_us: u64) -> Self {
        Self::new(InputEventKind::KeyUp { key }, Point::ORIGIN, timestamp_us)
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_buttons(mut self, buttons: Buttons) -> Self {
        self.buttons = buttons;
        self
    }

    pub fn with_device(mut self, device: u32) -> Self {
        self.device = device;
        self
    }

    pub fn is_keyboard(&self) -> bool {
        matches!(self.kind, InputEventKind::KeyDown { .. } | InputEventKind::KeyUp { .. })
    }

    pub fn is_pointer(&self) -> bool {
        !self.is_keyboard()
    }

    pub fn is_mouse_moved(&self) -> bool {
        matches!(self.kind, InputEventKind::MouseMoved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_classification() {
        let down = InputEvent::mouse_down(Point::new(1, 2), Buttons::PRIMARY, 10);
        assert!(down.is_pointer());
        assert_eq!(down.buttons, Buttons::PRIMARY);
        let key = InputEvent::key_down(30, Some('a'), 11).with_modifiers(Modifiers::SHIFT);
        assert!(key.is_keyboard());
        assert!(key.modifiers.contains(Modifiers::SHIFT));
        assert!(InputEvent::mouse_moved(Point::ORIGIN, Buttons::empty(), 0).is_mouse_moved());
    }
}
