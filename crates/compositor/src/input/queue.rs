use super::InputEvent;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;

/// Counters kept by the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pushed: u64,
    pub popped: u64,
    /// Superseded mouse-moved events discarded under backpressure.
    pub coalesced: u64,
    /// Mouse-moved events refused because the queue was full.
    pub rejected: u64,
}

struct Inner {
    events: VecDeque<InputEvent>,
    closed: bool,
    stats: QueueStats,
}

/// Bounded FIFO between input drivers and the input thread.
///
/// - Events of one device are never reordered.
/// - Once `threshold` events are waiting, mouse-moved events that a later
///   mouse-moved of the same device supersedes, and that are older than the
///   staleness limit, are discarded.
/// - At `4 * threshold` further mouse-moved events are refused. Buttons and
///   keys are always queued, past the cap if need be.
pub struct EventQueue {
    inner: Mutex<Inner>,
    ready: Condvar,
    threshold: usize,
    staleness_us: u64,
}

impl EventQueue {
    pub fn new(threshold: usize, staleness_us: u64) -> Self {
        let threshold = threshold.max(1);
        Self {
            inner: Mutex::new(Inner {
                events: VecDeque::with_capacity(threshold),
                closed: false,
                stats: QueueStats::default(),
            }),
            ready: Condvar::new(),
            threshold,
            staleness_us,
        }
    }

    pub fn capacity(&self) -> usize {
        self.threshold * 4
    }

    /// Enqueue an event; returns `false` when it was refused. Only a closed
    /// queue refuses anything but a mouse-moved event.
    pub fn push(&self, event: InputEvent) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        if inner.events.len() >= self.threshold {
            let dropped = coalesce_stale(&mut inner.events, &event, self.staleness_us);
            if dropped > 0 {
                inner.stats.coalesced += dropped as u64;
                log::trace!("Dropped {} stale mouse-moved events", dropped);
            }
        }
        if inner.events.len() >= self.capacity() && event.is_mouse_moved() {
            inner.stats.rejected += 1;
            log::warn!("Input queue full, refusing {:?}", event.kind);
            return false;
        }
        inner.events.push_back(event);
        inner.stats.pushed += 1;
        drop(inner);
        self.ready.notify_one();
        true
    }

    /// Wait up to `timeout` for the next event.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<InputEvent> {
        let mut inner = self.inner.lock();
        if inner.events.is_empty() && !inner.closed {
            self.ready.wait_for(&mut inner, timeout);
        }
        let event = inner.events.pop_front()?;
        inner.stats.popped += 1;
        Some(event)
    }

    pub fn try_pop(&self) -> Option<InputEvent> {
        let mut inner = self.inner.lock();
        let event = inner.events.pop_front()?;
        inner.stats.popped += 1;
        Some(event)
    }

    pub fn drain(&self) -> Vec<InputEvent> {
        let mut inner = self.inner.lock();
        let events: Vec<InputEvent> = inner.events.drain(..).collect();
        inner.stats.popped += events.len() as u64;
        events
    }

    /// Refuse further events and wake any waiter.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueueStats {
        self.inner.lock().stats
    }
}

/// Remove superseded, stale mouse-moved events. Relative order of the
/// remaining events is untouched.
fn coalesce_stale(events: &mut VecDeque<InputEvent>, incoming: &InputEvent, staleness_us: u64) -> usize {
    let now = incoming.timestamp_us;
    let before = events.len();
    let mut newest_seen: Vec<u32> = Vec::new();
    if incoming.is_mouse_moved() {
        newest_seen.push(incoming.device);
    }
    // Walk newest to oldest so "superseded" means a later move exists.
    let mut keep = vec![true; events.len()];
    for (i, event) in events.iter().enumerate().rev() {
        if !event.is_mouse_moved() {
            continue;
        }
        let superseded = newest_seen.contains(&event.device);
        let stale = now.saturating_sub(event.timestamp_us) > staleness_us;
        if superseded && stale && event.buttons == events_buttons_after(events, i, event) {
            keep[i] = false;
        }
        if !newest_seen.contains(&event.device) {
            newest_seen.push(event.device);
        }
    }
    let mut index = 0;
    events.retain(|_| {
        let k = keep[index];
        index += 1;
        k
    });
    before - events.len()
}

/// Button state of the next event from the same device. A move is only
/// superseded while the held buttons stay the same.
fn events_buttons_after(events: &VecDeque<InputEvent>, i: usize, event: &InputEvent) -> super::Buttons {
    events
        .iter()
        .skip(i + 1)
        .find(|e| e.device == event.device)
        .map(|e| e.buttons)
        .unwrap_or(event.buttons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{Buttons, InputEventKind};
    use crate::types::Point;

    fn moved(x: i32, t: u64) -> InputEvent {
        InputEvent::mouse_moved(Point::new(x, 0), Buttons::empty(), t)
    }

    #[test]
    fn test_fifo_order() {
        let q = EventQueue::new(8, 1_000);
        q.push(moved(1, 1));
        q.push(InputEvent::mouse_down(Point::new(1, 0), Buttons::PRIMARY, 2));
        q.push(moved(2, 3));
        let xs: Vec<i32> = q.drain().iter().map(|e| e.position.x).collect();
        assert_eq!(xs, vec![1, 1, 2]);
    }

    #[test]
    fn test_no_coalescing_below_threshold() {
        let q = EventQueue::new(8, 0);
        for i in 0..8 {
            q.push(moved(i, i as u64 * 1_000));
        }
        assert_eq!(q.len(), 8);
        assert_eq!(q.stats().coalesced, 0);
    }

    #[test]
    fn test_backpressure_drops_only_stale_superseded_moves() {
        let q = EventQueue::new(4, 50_000);
        q.push(moved(0, 0));
        q.push(InputEvent::mouse_down(Point::ORIGIN, Buttons::PRIMARY, 1_000));
        q.push(moved(1, 2_000).with_buttons(Buttons::PRIMARY));
        q.push(moved(2, 90_000).with_buttons(Buttons::PRIMARY));
        // Over threshold: the move at t=2000 is stale and superseded.
        q.push(moved(3, 100_000).with_buttons(Buttons::PRIMARY));

        let events = q.drain();
        let kinds: Vec<(bool, i32)> = events.iter().map(|e| (e.is_mouse_moved(), e.position.x)).collect();
        assert_eq!(kinds, vec![(true, 0), (false, 0), (true, 2), (true, 3)]);
        assert_eq!(q.stats().coalesced, 1);
        assert!(matches!(events[1].kind, InputEventKind::MouseDown { .. }));
    }

    #[test]
    fn test_other_device_moves_are_not_superseded() {
        let q = EventQueue::new(1, 0);
        q.push(moved(0, 0).with_device(1));
        q.push(moved(1, 10).with_device(2));
        assert_eq!(q.len(), 2);
        q.push(moved(2, 20).with_device(2));
        let xs: Vec<i32> = q.drain().iter().map(|e| e.position.x).collect();
        assert_eq!(xs, vec![0, 2]);
    }

    #[test]
    fn test_full_queue_refuses_only_moves() {
        let q = EventQueue::new(2, 1_000_000);
        for i in 0..8 {
            assert!(q.push(InputEvent::mouse_down(Point::new(i, 0), Buttons::PRIMARY, i as u64)));
        }
        assert_eq!(q.len(), q.capacity());
        assert!(!q.push(moved(9, 9)));
        assert!(q.push(InputEvent::mouse_up(Point::ORIGIN, Buttons::PRIMARY, 10)));
        assert!(q.push(InputEvent::key_down(30, Some('a'), 11)));
        assert_eq!(q.stats().rejected, 1);

        let events = q.drain();
        assert_eq!(events.len(), 10);
        assert!(matches!(events[8].kind, InputEventKind::MouseUp { .. }));
    }

    #[test]
    fn test_pop_timeout_and_close() {
        let q = EventQueue::new(4, 0);
        assert!(q.pop_timeout(Duration::from_millis(1)).is_none());
        q.push(moved(5, 0));
        assert_eq!(q.pop_timeout(Duration::from_millis(1)).map(|e| e.position.x), Some(5));
        q.close();
        assert!(!q.push(moved(6, 1)));
    }
}
