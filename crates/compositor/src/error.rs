//! Error taxonomy for the window server core.

use crate::types::WindowId;
use std::time::Duration;

/// Errors raised by the compositor core.
///
/// Recovery is local for every variant: infeasible layouts are rejected,
/// corrupted windows are force-closed, vanished targets are dropped, broken
/// decorators fall back to the built-in one and lock timeouts are retried.
#[derive(Debug, thiserror::Error)]
pub enum CompositorError {
    #[error("geometry infeasible: {0}")]
    GeometryInfeasible(String),

    #[error("region corruption in {}: {detail}", describe_window(.window))]
    RegionCorruption { window: Option<WindowId>, detail: String },

    #[error("dispatch target {0} is gone")]
    DispatchTargetGone(WindowId),

    #[error("decorator '{name}' failed to load: {reason}")]
    DecoratorLoadFailure { name: String, reason: String },

    #[error("desktop write lock not acquired within {0:?}")]
    LockTimeout(Duration),

    #[error("unknown window {0}")]
    UnknownWindow(WindowId),

    #[error("unknown view")]
    UnknownView,

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("surface allocation failed: {0}")]
    Allocation(String),

    #[error("settings store: {0}")]
    Settings(String),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl CompositorError {
    pub fn corruption(window: Option<WindowId>, detail: impl Into<String>) -> Self {
        CompositorError::RegionCorruption { window, detail: detail.into() }
    }

    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, CompositorError::LockTimeout(_))
    }
}

fn describe_window(window: &Option<WindowId>) -> String {
    match window {
        Some(id) => id.to_string(),
        None => "detached node".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, CompositorError>;
