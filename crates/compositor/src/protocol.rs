//! Server to client messages.
//!
//! The transport is out of scope; the desktop hands every client-bound
//! message to a `ClientSink`. `ChannelSink` forwards them over a
//! `crossbeam::channel`, `RecordingSink` keeps them for inspection.

use crate::input::InputEvent;
use crate::types::{Point, Rect, WindowId};
use crate::window::{SizeLimits, ViewId};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

#[derive(Clone, Debug, PartialEq)]
pub enum ClientMessage {
    /// Input event for a view; `local` is the position in view coordinates.
    Input { view: Option<ViewId>, event: InputEvent, local: Point },
    Entered { view: ViewId },
    Exited { view: ViewId },
    /// Parts of the content (window coordinates) need redrawing.
    UpdateRequest { rects: Vec<Rect> },
    Activated(bool),
    /// New content frame in screen coordinates.
    FrameChanged(Rect),
    Minimized(bool),
    LimitsChanged(SizeLimits),
    WorkspacesChanged(u32),
    Closed,
}

/// Answer to a client geometry request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GeometryChange {
    Accepted(Rect),
    Rejected(String),
}

impl GeometryChange {
    pub fn is_accepted(&self) -> bool {
        matches!(self, GeometryChange::Accepted(_))
    }
}

pub trait ClientSink: Send + Sync {
    fn deliver(&self, window: WindowId, message: ClientMessage);
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ClientSink for NullSink {
    fn deliver(&self, _window: WindowId, _message: ClientMessage) {}
}

/// Unbounded channel to a client connection thread.
pub struct ChannelSink {
    tx: Sender<(WindowId, ClientMessage)>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<(WindowId, ClientMessage)>) {
        let (tx, rx) = channel::unbounded();
        (Self { tx }, rx)
    }
}

impl ClientSink for ChannelSink {
    fn deliver(&self, window: WindowId, message: ClientMessage) {
        if self.tx.send((window, message)).is_err() {
            log::trace!("Client channel closed; message for {} dropped", window);
        }
    }
}

/// Keeps every message in arrival order.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<(WindowId, ClientMessage)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(WindowId, ClientMessage)> {
        self.messages.lock().clone()
    }

    /// Messages addressed to `window`.
    pub fn for_window(&self, window: WindowId) -> Vec<ClientMessage> {
        self.messages
            .lock()
            .iter()
            .filter(|(w, _)| *w == window)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn take(&self) -> Vec<(WindowId, ClientMessage)> {
        std::mem::take(&mut *self.messages.lock())
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl ClientSink for RecordingSink {
    fn deliver(&self, window: WindowId, message: ClientMessage) {
        self.messages.lock().push((window, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink_delivers_in_order() {
        let (sink, rx) = ChannelSink::new();
        sink.deliver(WindowId(1), ClientMessage::Activated(true));
        sink.deliver(WindowId(1), ClientMessage::Closed);
        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            got,
            vec![(WindowId(1), ClientMessage::Activated(true)), (WindowId(1), ClientMessage::Closed)]
        );
    }

    #[test]
    fn test_channel_sink_survives_closed_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.deliver(WindowId(3), ClientMessage::Closed);
    }

    #[test]
    fn test_recording_sink_filters_by_window() {
        let sink = RecordingSink::new();
        sink.deliver(WindowId(1), ClientMessage::Minimized(true));
        sink.deliver(WindowId(2), ClientMessage::Closed);
        assert_eq!(sink.for_window(WindowId(2)), vec![ClientMessage::Closed]);
        assert_eq!(sink.take().len(), 2);
        assert!(sink.messages().is_empty());
    }
}
