//! Server configuration, loadable from TOML.

use crate::types::{Color, Rect};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for a compositor instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    pub desktop: DesktopConfig,
    pub input: InputConfig,
    pub snapping: SnapConfig,
    pub stack_tile: StackTileConfig,
    pub render: RenderConfig,
}

impl CompositorConfig {
    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DesktopConfig {
    pub screen_width: i32,
    pub screen_height: i32,
    /// Number of virtual workspaces (at most 32).
    pub workspaces: u32,
    /// Name of the decorator used for new windows.
    pub decorator: String,
    /// Budget for acquiring the geometry write lock.
    pub lock_budget_ms: u64,
    /// Retries after a lock timeout before the mutation is abandoned.
    pub lock_attempts: u32,
    pub region_pool_capacity: usize,
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            screen_width: 1024,
            screen_height: 768,
            workspaces: 4,
            decorator: "classic".to_string(),
            lock_budget_ms: 25,
            lock_attempts: 5,
            region_pool_capacity: 256,
        }
    }
}

impl DesktopConfig {
    pub fn screen(&self) -> Rect {
        Rect::new(0, 0, self.screen_width, self.screen_height)
    }

    pub fn lock_budget(&self) -> Duration {
        Duration::from_millis(self.lock_budget_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Queue length at which superseded mouse-moved events may be dropped.
    pub backpressure_threshold: usize,
    /// Mouse-moved events older than this (relative to the newest) are droppable.
    pub staleness_ms: u64,
    pub double_click_ms: u64,
    pub double_click_distance: i32,
    /// Poll rate of the fast cursor path; zero disables the poller thread.
    pub cursor_poll_hz: u32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            backpressure_threshold: 64,
            staleness_ms: 50,
            double_click_ms: 500,
            double_click_distance: 4,
            cursor_poll_hz: 0,
        }
    }
}

impl InputConfig {
    pub fn staleness_us(&self) -> u64 {
        self.staleness_ms * 1000
    }

    pub fn double_click_us(&self) -> u64 {
        self.double_click_ms * 1000
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
    pub enabled: bool,
    /// Edges closer than this many pixels snap flush.
    pub distance: i32,
    /// Snapping is suppressed for this long after it last triggered.
    pub cooldown_ms: u64,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self { enabled: true, distance: 8, cooldown_ms: 300 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StackTileConfig {
    /// Active-set iteration cap per solve.
    pub max_iterations: usize,
    /// Weight of the preferred-size mismatch in the tiling fit error.
    pub size_weight: f64,
    /// Weight of the corner distance in the tiling fit error.
    pub distance_weight: f64,
    /// Pull of every tab towards its previous position.
    pub regularization: f64,
    pub preferred_weight: f64,
    /// Preferred-size weight of the window the user is resizing.
    pub resize_weight: f64,
    /// Weight pinning the resized window's edges to the requested frame.
    pub pin_weight: f64,
}

impl Default for StackTileConfig {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            size_weight: 1.0,
            distance_weight: 0.5,
            regularization: 0.001,
            preferred_weight: 1.0,
            resize_weight: 100.0,
            pin_weight: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub background: u32,
    /// Render dirty windows on the rayon pool.
    pub parallel: bool,
    /// Upper bound for all window backing surfaces together.
    pub surface_budget_bytes: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            background: Color::rgb(51, 102, 152).0,
            parallel: true,
            surface_budget_bytes: 256 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg = CompositorConfig::from_toml(
            r#"
            [desktop]
            screen_width = 800

            [snapping]
            distance = 12
            "#,
        )
        .unwrap();
        assert_eq!(cfg.desktop.screen_width, 800);
        assert_eq!(cfg.desktop.screen_height, 768);
        assert_eq!(cfg.snapping.distance, 12);
        assert_eq!(cfg.stack_tile.max_iterations, 15);
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let text = CompositorConfig::default().to_toml().unwrap();
        let back = CompositorConfig::from_toml(&text).unwrap();
        assert_eq!(back.desktop.decorator, "classic");
        assert_eq!(back.input.double_click_ms, 500);
    }
}
