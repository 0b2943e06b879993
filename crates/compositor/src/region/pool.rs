//! Region Pool - recycles clip regions between frames
//!
//! Clip recomputation runs from the input thread and from every render
//! worker, so the free list sits behind a mutex and the pool is shared
//! through `Arc`.

use super::ClipRegion;
use crate::types::Rect;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of pool usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionPoolStats {
    /// Acquisitions served from the free list
    pub hits: u64,
    /// Acquisitions that had to allocate
    pub misses: u64,
    /// Regions currently waiting for reuse
    pub pooled: usize,
}

pub struct RegionPool {
    free: Mutex<Vec<ClipRegion>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RegionPool {
    pub fn new(capacity: usize) -> Self {
        log::debug!("Initializing region pool (capacity {})", capacity);
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Take an empty region, reusing a released one when available.
    pub fn acquire(&self) -> ClipRegion {
        match self.free.lock().pop() {
            Some(region) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                region
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                ClipRegion::new()
            }
        }
    }

    pub fn acquire_rect(&self, rect: Rect) -> ClipRegion {
        let mut region = self.acquire();
        region.set_to_rect(rect);
        region
    }

    pub fn acquire_copy(&self, source: &ClipRegion) -> ClipRegion {
        let mut region = self.acquire();
        region.set_to(source);
        region
    }

    /// Return a region for reuse. Beyond capacity it is simply dropped.
    pub fn release(&self, mut region: ClipRegion) {
        region.clear();
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(region);
        }
    }

    pub fn stats(&self) -> RegionPoolStats {
        RegionPoolStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            pooled: self.free.lock().len(),
        }
    }
}

impl Default for RegionPool {
    fn default() -> Self {
        Self::new(256)
    }
}
