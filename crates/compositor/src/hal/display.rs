//! Display backend interface and a headless implementation.

use crate::canvas::{PixelFormat, Surface};
use crate::types::Rect;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Information handed to a present completion callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentInfo {
    pub sequence: u64,
    pub rects: usize,
}

/// Completion callback used for vsync pacing.
pub type PresentCallback = Box<dyn FnOnce(PresentInfo) + Send>;

/// Pushes composited pixels to a physical or virtual display.
///
/// Fire-and-forget: the callback, when given, runs once the update is visible.
pub trait DisplayBackend: Send + Sync {
    fn present(&self, screen: &Surface, dirty: &[Rect], done: Option<PresentCallback>);

    /// Resize the scanout after a mode change.
    fn resize(&self, width: i32, height: i32);
}

/// One recorded present call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentRecord {
    pub sequence: u64,
    pub rects: Vec<Rect>,
}

/// Display that copies presented rectangles into an in-memory framebuffer.
pub struct HeadlessDisplay {
    framebuffer: Mutex<Surface>,
    history: Mutex<Vec<PresentRecord>>,
    sequence: AtomicU64,
}

impl HeadlessDisplay {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            framebuffer: Mutex::new(Surface::new(width, height, PixelFormat::Xrgb8888)),
            history: Mutex::new(Vec::new()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn present_count(&self) -> usize {
        self.history.lock().len()
    }

    pub fn last_present(&self) -> Option<PresentRecord> {
        self.history.lock().last().cloned()
    }

    pub fn history(&self) -> Vec<PresentRecord> {
        self.history.lock().clone()
    }

    /// Copy of the scanout contents.
    pub fn snapshot(&self) -> Surface {
        self.framebuffer.lock().clone()
    }
}

impl DisplayBackend for HeadlessDisplay {
    fn present(&self, screen: &Surface, dirty: &[Rect], done: Option<PresentCallback>) {
        {
            let mut fb = self.framebuffer.lock();
            for r in dirty {
                fb.blit_from(screen, *r, r.origin());
            }
        }
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        self.history.lock().push(PresentRecord { sequence, rects: dirty.to_vec() });
        log::trace!("present #{}: {} rects", sequence, dirty.len());
        if let Some(done) = done {
            done(PresentInfo { sequence, rects: dirty.len() });
        }
    }

    fn resize(&self, width: i32, height: i32) {
        *self.framebuffer.lock() = Surface::new(width, height, PixelFormat::Xrgb8888);
    }
}
