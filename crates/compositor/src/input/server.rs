//! Input thread and fast cursor path.
//!
//! `InputServer` owns the thread that drains the event queue and hands each
//! event to the desktop. It blocks on nothing but the queue. `CursorPoller`
//! optionally samples a raw cursor device and writes the latest position into
//! a `CursorSlot` without going through the queue.

use super::{EventQueue, InputEvent};
use crate::types::Point;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Latest cursor position, readable without locks.
#[derive(Debug, Default)]
pub struct CursorSlot {
    packed: AtomicU64,
}

impl CursorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, p: Point) {
        let packed = ((p.x as u32 as u64) << 32) | p.y as u32 as u64;
        self.packed.store(packed, Ordering::Release);
    }

    pub fn load(&self) -> Point {
        let packed = self.packed.load(Ordering::Acquire);
        Point::new((packed >> 32) as u32 as i32, packed as u32 as i32)
    }
}

/// Raw cursor device.
pub trait CursorSource: Send {
    fn poll(&mut self) -> Option<Point>;
}

pub struct CursorPoller {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CursorPoller {
    pub fn spawn(mut source: Box<dyn CursorSource>, slot: Arc<CursorSlot>, hz: u32) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let period = Duration::from_micros(1_000_000 / hz.max(1) as u64);
        let handle = thread::Builder::new().name("cursor-poller".into()).spawn(move || {
            while !flag.load(Ordering::Acquire) {
                if let Some(p) = source.poll() {
                    slot.store(p);
                }
                thread::sleep(period);
            }
        })?;
        log::info!("Cursor poller running at {} Hz", hz.max(1));
        Ok(Self { stop, handle: Some(handle) })
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Cursor poller panicked");
            }
        }
    }
}

impl Drop for CursorPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

pub struct InputServer {
    queue: Arc<EventQueue>,
    stop: Arc<AtomicBool>,
    dispatched: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl InputServer {
    /// Start the "input-server" thread; `handler` runs for every event in
    /// arrival order.
    pub fn spawn<F>(queue: Arc<EventQueue>, mut handler: F) -> std::io::Result<Self>
    where
        F: FnMut(InputEvent) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let dispatched = Arc::new(AtomicU64::new(0));
        let (flag, counter, events) = (Arc::clone(&stop), Arc::clone(&dispatched), Arc::clone(&queue));
        let handle = thread::Builder::new().name("input-server".into()).spawn(move || {
            log::debug!("Input thread started");
            loop {
                match events.pop_timeout(Duration::from_millis(10)) {
                    Some(event) => {
                        handler(event);
                        counter.fetch_add(1, Ordering::Relaxed);
                    }
                    None if flag.load(Ordering::Acquire) || events.is_closed() => break,
                    None => {}
                }
            }
            log::debug!("Input thread exiting");
        })?;
        log::info!("Input server started");
        Ok(Self { queue, stop, dispatched, handle: Some(handle) })
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Close the queue, let the thread drain what is left and join it.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.queue.close();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Input thread panicked");
            }
            log::info!("Input server stopped ({} events)", self.dispatched());
        }
    }
}

impl Drop for InputServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Buttons;
    use parking_lot::Mutex;

    #[test]
    fn test_cursor_slot_round_trip_negative() {
        let slot = CursorSlot::new();
        slot.store(Point::new(-5, 1200));
        assert_eq!(slot.load(), Point::new(-5, 1200));
    }

    #[test]
    fn test_server_dispatches_in_order() {
        let queue = Arc::new(EventQueue::new(64, 50_000));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut server = InputServer::spawn(Arc::clone(&queue), move |e| sink.lock().push(e.position.x)).unwrap();
        for x in 0..20 {
            queue.push(InputEvent::mouse_moved(Point::new(x, 0), Buttons::empty(), x as u64));
        }
        server.shutdown();
        assert_eq!(*seen.lock(), (0..20).collect::<Vec<_>>());
        assert_eq!(server.dispatched(), 20);
    }

    struct Scripted(Vec<Point>);

    impl CursorSource for Scripted {
        fn poll(&mut self) -> Option<Point> {
            if self.0.len() > 1 {
                Some(self.0.remove(0))
            } else {
                self.0.first().copied()
            }
        }
    }

    #[test]
    fn test_cursor_poller_updates_slot() {
        let slot = Arc::new(CursorSlot::new());
        let mut poller = CursorPoller::spawn(
            Box::new(Scripted(vec![Point::new(1, 1), Point::new(7, 9)])),
            Arc::clone(&slot),
            1_000,
        )
        .unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while slot.load() != Point::new(7, 9) && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        poller.stop();
        assert_eq!(slot.load(), Point::new(7, 9));
    }
}
