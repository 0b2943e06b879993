//! The desktop geometry lock and lock-timeout backoff.
//!
//! Readers (hit-testing, rendering) take the read side freely. Writers get a
//! bounded budget; when it runs out the operation fails with `LockTimeout`
//! and the caller retries with exponential backoff.

use crate::error::{CompositorError, Result};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Retry bound for lock timeouts.
pub const MAX_LOCK_ATTEMPTS: u32 = 5;

/// Base retry spacing in microseconds, doubled per failed attempt.
const BACKOFF_BASE_US: u64 = 128;

pub struct GeometryLock<T> {
    inner: RwLock<T>,
    budget: Duration,
}

impl<T> GeometryLock<T> {
    pub fn new(value: T, budget: Duration) -> Self {
        Self { inner: RwLock::new(value), budget }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read()
    }

    /// Write access within the budget.
    pub fn write(&self) -> Result<RwLockWriteGuard<'_, T>> {
        self.inner
            .try_write_for(self.budget)
            .ok_or(CompositorError::LockTimeout(self.budget))
    }
}

#[derive(Default, Debug)]
pub struct BackoffMetrics {
    pub total_attempts: AtomicU32,
    pub succeeded: AtomicU32,
    pub failed_max: AtomicU32,
}

/// Exponential backoff for operations that fail with `LockTimeout`.
#[derive(Clone)]
pub struct LockBackoff {
    max_attempts: u32,
    metrics: Arc<BackoffMetrics>,
}

impl LockBackoff {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts: max_attempts.max(1), metrics: Arc::new(BackoffMetrics::default()) }
    }

    pub fn metrics(&self) -> &Arc<BackoffMetrics> {
        &self.metrics
    }

    /// Wait before retry number `attempt` (1-based).
    pub fn delay(attempt: u32) -> Duration {
        Duration::from_micros((1u64 << attempt.min(16)) * BACKOFF_BASE_US)
    }

    /// Run `op` until it returns anything but `LockTimeout`, at most
    /// `max_attempts` times.
    pub fn run<T>(&self, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            self.metrics.total_attempts.fetch_add(1, Ordering::Relaxed);
            match op() {
                Err(e) if e.is_lock_timeout() => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        self.metrics.failed_max.fetch_add(1, Ordering::Relaxed);
                        log::warn!("Giving up after {} lock timeouts", attempt);
                        return Err(e);
                    }
                    log::debug!("Lock timeout, retry {} of {}", attempt, self.max_attempts - 1);
                    std::thread::sleep(Self::delay(attempt));
                }
                other => {
                    if other.is_ok() {
                        self.metrics.succeeded.fetch_add(1, Ordering::Relaxed);
                    }
                    return other;
                }
            }
        }
    }
}

impl Default for LockBackoff {
    fn default() -> Self {
        Self::new(MAX_LOCK_ATTEMPTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_times_out_while_read_held() {
        let lock = GeometryLock::new(0u32, Duration::from_millis(5));
        let _reader = lock.read();
        assert!(matches!(lock.write(), Err(CompositorError::LockTimeout(_))));
    }

    #[test]
    fn test_backoff_retries_then_succeeds() {
        let backoff = LockBackoff::default();
        let mut calls = 0;
        let result = backoff.run(|| {
            calls += 1;
            if calls < 3 {
                Err(CompositorError::LockTimeout(Duration::from_millis(1)))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
        assert_eq!(backoff.metrics().total_attempts.load(Ordering::Relaxed), 3);
        assert_eq!(backoff.metrics().succeeded.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_backoff_gives_up_at_bound() {
        let backoff = LockBackoff::new(3);
        let result: Result<()> = backoff.run(|| Err(CompositorError::LockTimeout(Duration::from_millis(1))));
        assert!(result.unwrap_err().is_lock_timeout());
        assert_eq!(backoff.metrics().failed_max.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_other_errors_are_not_retried() {
        let backoff = LockBackoff::default();
        let mut calls = 0;
        let result: Result<()> = backoff.run(|| {
            calls += 1;
            Err(CompositorError::UnknownView)
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_delay_doubles() {
        assert_eq!(LockBackoff::delay(1), Duration::from_micros(256));
        assert_eq!(LockBackoff::delay(3), Duration::from_micros(1024));
    }
}
