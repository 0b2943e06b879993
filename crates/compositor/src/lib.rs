/// RayOS Compositor Library
///
/// The window server core: clip regions, per-window buffers and compositing,
/// input routing, decorators, window behaviour and the Stack & Tile layout
/// engine, tied together by the `Desktop`.

pub mod types;
pub mod error;
pub mod config;
pub mod region;
pub mod clip;
pub mod canvas;
pub mod compositor;
pub mod decorator;
pub mod behaviour;
pub mod input;
pub mod stack_tile;
pub mod window;
pub mod hal;
pub mod protocol;
pub mod desktop;

pub use config::CompositorConfig;
pub use desktop::{Desktop, DesktopServices, FrameReport};
pub use error::{CompositorError, Result};
pub use types::{Point, Rect, WindowId};
pub use window::WindowSpec;

use hal::{DisplayBackend, SettingsStore};
use input::{CursorPoller, CursorSource, EventQueue, InputEvent, InputServer};
use protocol::ClientSink;
use std::sync::Arc;

/// A running compositor: the desktop plus its input thread and, when a
/// cursor source is configured, the cursor poller.
pub struct CompositorServer {
    desktop: Arc<Desktop>,
    input: InputServer,
    poller: Option<CursorPoller>,
}

impl CompositorServer {
    fn start(desktop: Desktop, cursor: Option<Box<dyn CursorSource>>) -> Result<Self> {
        log::info!("=== Starting RayOS Compositor ===");
        let desktop = Arc::new(desktop);
        let config = desktop.config().input.clone();

        let queue = Arc::new(EventQueue::new(config.backpressure_threshold, config.staleness_us()));
        let target = Arc::clone(&desktop);
        let input = InputServer::spawn(queue, move |event| {
            let outcome = target.dispatch(event);
            log::trace!("{:?} -> {:?}", event.kind, outcome);
        })?;
        log::info!("✓ Input server running");

        let poller = match cursor {
            Some(source) if config.cursor_poll_hz > 0 => {
                let poller = CursorPoller::spawn(source, Arc::clone(desktop.cursor()), config.cursor_poll_hz)?;
                log::info!("✓ Cursor poller at {} Hz", config.cursor_poll_hz);
                Some(poller)
            }
            Some(_) => {
                log::warn!("Cursor source given but cursor_poll_hz is 0; not polling");
                None
            }
            None => None,
        };

        log::info!("=== RayOS Compositor Ready ===");
        Ok(Self { desktop, input, poller })
    }

    pub fn desktop(&self) -> &Arc<Desktop> {
        &self.desktop
    }

    /// Queue an event for the input thread. Returns false for a mouse-moved
    /// event refused by a full queue, or once the server is shutting down.
    pub fn post_event(&self, event: InputEvent) -> bool {
        self.input.queue().push(event)
    }

    /// Events dispatched so far.
    pub fn dispatched(&self) -> u64 {
        self.input.dispatched()
    }

    pub fn render_frame(&self) -> Result<FrameReport> {
        self.desktop.render_frame()
    }

    /// Stop the input thread after it drains the queue.
    pub fn shutdown(&mut self) {
        log::info!("Shutting down RayOS Compositor...");
        if let Some(mut poller) = self.poller.take() {
            poller.stop();
        }
        self.input.shutdown();
        log::info!("Compositor shutdown complete");
    }
}

impl Drop for CompositorServer {
    fn drop(&mut self) {
        self.input.shutdown();
    }
}

/// Builder for `CompositorServer` with custom configuration and services
pub struct CompositorServerBuilder {
    config: CompositorConfig,
    sink: Option<Arc<dyn ClientSink>>,
    settings: Option<Arc<dyn SettingsStore>>,
    display: Option<Arc<dyn DisplayBackend>>,
    cursor: Option<Box<dyn CursorSource>>,
}

impl CompositorServerBuilder {
    pub fn new() -> Self {
        Self { config: CompositorConfig::default(), sink: None, settings: None, display: None, cursor: None }
    }

    pub fn with_config(mut self, config: CompositorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_screen(mut self, width: i32, height: i32) -> Self {
        self.config.desktop.screen_width = width;
        self.config.desktop.screen_height = height;
        self
    }

    pub fn with_workspaces(mut self, count: u32) -> Self {
        self.config.desktop.workspaces = count;
        self
    }

    pub fn with_decorator(mut self, name: &str) -> Self {
        self.config.desktop.decorator = name.to_string();
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ClientSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_display(mut self, display: Arc<dyn DisplayBackend>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn with_cursor_source(mut self, source: Box<dyn CursorSource>, hz: u32) -> Self {
        self.cursor = Some(source);
        self.config.input.cursor_poll_hz = hz;
        self
    }

    /// Build the desktop only, without starting any thread.
    pub fn build_desktop(self) -> Desktop {
        self.into_parts().0
    }

    pub fn build(self) -> Result<CompositorServer> {
        let (desktop, cursor) = self.into_parts();
        CompositorServer::start(desktop, cursor)
    }

    fn into_parts(self) -> (Desktop, Option<Box<dyn CursorSource>>) {
        let mut services = DesktopServices::headless(&self.config);
        if let Some(sink) = self.sink {
            services = services.with_sink(sink);
        }
        if let Some(settings) = self.settings {
            services = services.with_settings(settings);
        }
        if let Some(display) = self.display {
            services = services.with_display(display);
        }
        (Desktop::new(self.config, services), self.cursor)
    }
}

impl Default for CompositorServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Buttons;
    use crate::protocol::{ClientMessage, RecordingSink};
    use crate::window::WindowLook;
    use std::time::{Duration, Instant};

    #[test]
    fn test_builder_applies_overrides() {
        let desktop = CompositorServerBuilder::new()
            .with_screen(800, 600)
            .with_workspaces(2)
            .with_decorator("flat")
            .build_desktop();
        assert_eq!(desktop.read().screen, Rect::new(0, 0, 800, 600));
        assert_eq!(desktop.read().workspaces.count(), 2);
        assert_eq!(desktop.decorator_name(), "flat");
    }

    #[test]
    fn test_server_dispatches_posted_events() {
        let sink = Arc::new(RecordingSink::new());
        let mut server = CompositorServerBuilder::new().with_sink(sink.clone()).build().unwrap();
        let w = server
            .desktop()
            .create_window(WindowSpec::new("a", Rect::new(0, 0, 100, 100)).look(WindowLook::NoBorder))
            .unwrap();
        assert!(server.post_event(InputEvent::mouse_down(Point::new(10, 10), Buttons::PRIMARY, 1)));

        let deadline = Instant::now() + Duration::from_secs(2);
        while server.dispatched() < 1 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        server.shutdown();
        assert_eq!(server.dispatched(), 1);
        assert!(sink.for_window(w).iter().any(|m| matches!(m, ClientMessage::Input { .. })));
    }
}
