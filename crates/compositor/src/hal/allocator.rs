//! Surface Allocator - "The Backing Store"
//!
//! Hands out pixel surfaces for window backing stores. A handle is owned
//! exclusively by the window that requested it until it is released.

use crate::canvas::{PixelFormat, Surface};
use crate::error::{CompositorError, Result};
use crate::types::Color;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Exclusive ownership of an allocated surface.
#[derive(Debug)]
pub struct SurfaceHandle {
    id: u64,
    surface: Surface,
}

impl SurfaceHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut Surface {
        &mut self.surface
    }
}

/// Backing-buffer allocation, provided by the memory subsystem.
pub trait SurfaceAllocator: Send + Sync {
    fn allocate_surface(&self, width: i32, height: i32, format: PixelFormat) -> Result<SurfaceHandle>;

    fn release(&self, handle: SurfaceHandle);

    /// Number of handles currently checked out.
    fn live_surfaces(&self) -> usize;
}

/// Allocation record for a live surface
#[derive(Debug, Clone)]
struct SurfaceRecord {
    bytes: usize,
}

/// Buffer pool for fast reallocation of common sizes
struct BufferPool {
    /// Buffers up to 64K pixels
    small: Vec<Vec<Color>>,
    /// Buffers up to 1M pixels
    medium: Vec<Vec<Color>>,
    /// Anything larger
    large: Vec<Vec<Color>>,
}

impl BufferPool {
    fn new() -> Self {
        Self {
            small: Vec::with_capacity(32),
            medium: Vec::with_capacity(16),
            large: Vec::with_capacity(4),
        }
    }

    /// Take a buffer able to hold `pixels` without reallocating
    fn take(&mut self, pixels: usize) -> Option<Vec<Color>> {
        let bucket = if pixels <= 65_536 {
            &mut self.small
        } else if pixels <= 1_048_576 {
            &mut self.medium
        } else {
            &mut self.large
        };
        let pos = bucket.iter().position(|b| b.capacity() >= pixels)?;
        Some(bucket.swap_remove(pos))
    }

    fn put(&mut self, buffer: Vec<Color>) {
        let pixels = buffer.capacity();
        if pixels <= 65_536 && self.small.len() < 32 {
            self.small.push(buffer);
        } else if pixels > 65_536 && pixels <= 1_048_576 && self.medium.len() < 16 {
            self.medium.push(buffer);
        } else if pixels > 1_048_576 && self.large.len() < 4 {
            self.large.push(buffer);
        }
        // Otherwise the buffer is dropped
    }
}

/// Allocator that recycles pixel buffers by size class.
pub struct PooledSurfaceAllocator {
    records: RwLock<HashMap<u64, SurfaceRecord>>,
    pool: RwLock<BufferPool>,
    next_id: AtomicU64,
    budget_bytes: usize,
    reused: AtomicU64,
}

impl PooledSurfaceAllocator {
    pub fn new(budget_bytes: usize) -> Self {
        log::info!("Initializing surface allocator (budget {} MiB)", budget_bytes / (1024 * 1024));
        Self {
            records: RwLock::new(HashMap::new()),
            pool: RwLock::new(BufferPool::new()),
            next_id: AtomicU64::new(1),
            budget_bytes,
            reused: AtomicU64::new(0),
        }
    }

    /// Total bytes held by live surfaces
    pub fn total_allocated(&self) -> usize {
        self.records.read().values().map(|r| r.bytes).sum()
    }

    /// Allocations served from the pool
    pub fn reused(&self) -> u64 {
        self.reused.load(Ordering::Relaxed)
    }
}

impl Default for PooledSurfaceAllocator {
    fn default() -> Self {
        Self::new(256 * 1024 * 1024)
    }
}

impl SurfaceAllocator for PooledSurfaceAllocator {
    fn allocate_surface(&self, width: i32, height: i32, format: PixelFormat) -> Result<SurfaceHandle> {
        if width < 0 || height < 0 {
            return Err(CompositorError::Allocation(format!(
                "negative surface size {}x{}",
                width, height
            )));
        }
        let pixels = width as usize * height as usize;
        let bytes = pixels * format.bytes_per_pixel();
        if self.total_allocated() + bytes > self.budget_bytes {
            return Err(CompositorError::Allocation(format!(
                "{} bytes would exceed the {} byte budget",
                bytes, self.budget_bytes
            )));
        }

        let surface = match self.pool.write().take(pixels) {
            Some(buffer) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                Surface::from_buffer(width, height, format, buffer)
            }
            None => Surface::new(width, height, format),
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.records.write().insert(id, SurfaceRecord { bytes });
        log::debug!("Allocated surface #{} ({}x{}, {} bytes)", id, width, height, bytes);

        Ok(SurfaceHandle { id, surface })
    }

    fn release(&self, handle: SurfaceHandle) {
        if self.records.write().remove(&handle.id).is_none() {
            log::warn!("Released unknown surface #{}", handle.id);
            return;
        }
        self.pool.write().put(handle.surface.into_buffer());
        log::debug!("Released surface #{} (returned to pool)", handle.id);
    }

    fn live_surfaces(&self) -> usize {
        self.records.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_release_reuses_buffer() {
        let alloc = PooledSurfaceAllocator::new(1 << 20);
        let h = alloc.allocate_surface(32, 32, PixelFormat::Argb8888).unwrap();
        assert_eq!(alloc.live_surfaces(), 1);
        assert_eq!(alloc.total_allocated(), 32 * 32 * 4);
        alloc.release(h);
        assert_eq!(alloc.live_surfaces(), 0);

        let h = alloc.allocate_surface(16, 16, PixelFormat::Argb8888).unwrap();
        assert_eq!(alloc.reused(), 1);
        assert_eq!(h.surface().width(), 16);
        assert_eq!(h.surface().pixel(0, 0), Some(Color::TRANSPARENT));
    }

    #[test]
    fn test_budget_exceeded() {
        let alloc = PooledSurfaceAllocator::new(1000);
        let err = alloc.allocate_surface(100, 100, PixelFormat::Argb8888).unwrap_err();
        assert!(matches!(err, CompositorError::Allocation(_)));
    }
}
