//! Compositor - window backing stores and the screen.
//!
//! Every window owns a backing surface covering its outer frame. Dirty parts
//! of a window are redrawn from its decorator and its committed display list;
//! the screen is then assembled by copying each window's surface through its
//! visible region, back to front. Presents are coalesced: any number of
//! `request_present` calls between two `flush_present` calls reach the
//! display as one update.

pub mod session;

pub use session::{UpdateSession, UpdateSessions};

use crate::canvas::{replay, Canvas, DrawBatch, PixelFormat, Surface};
use crate::config::RenderConfig;
use crate::decorator::Decorator;
use crate::error::{CompositorError, Result};
use crate::hal::{DisplayBackend, FontEngine, SurfaceAllocator, SurfaceHandle};
use crate::region::ClipRegion;
use crate::types::{Color, Point, Rect, WindowId};
use crate::window::ViewId;
use crossbeam::queue::SegQueue;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const CONTENT_FILL: Color = Color::WHITE;

// ============================================================================
// Window buffers
// ============================================================================

struct WindowBuffer {
    handle: SurfaceHandle,
    sessions: UpdateSessions,
    /// Outer frame the surface was laid out for.
    outer: Rect,
    /// Needs redrawing, in buffer coordinates.
    dirty: ClipRegion,
    /// Visible region at the last expose check, in screen coordinates.
    last_visible: ClipRegion,
}

impl WindowBuffer {
    fn local(&self, screen_rect: Rect) -> Rect {
        screen_rect.offset_by(-self.outer.left, -self.outer.top)
    }

    fn mark_all_dirty(&mut self) {
        self.dirty.set_to_rect(Rect::new(0, 0, self.outer.width(), self.outer.height()));
    }
}

/// What the compositor needs to draw one shown window.
pub struct RenderJob<'a> {
    pub window: WindowId,
    pub outer: Rect,
    pub content: Rect,
    /// Chrome drawn on top of the content background, if any.
    pub decorator: Option<&'a dyn Decorator>,
    /// Screen frames of the window's views.
    pub views: Vec<(ViewId, Rect)>,
    pub visible: Arc<ClipRegion>,
}

/// Outcome of a `render` pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RenderReport {
    pub rendered: Vec<WindowId>,
    /// Windows whose geometry could not be drawn; callers force-close them.
    pub corrupted: Vec<(WindowId, String)>,
}

/// Frame counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameMetrics {
    pub frames: u64,
    pub presents: u64,
    pub rects: u64,
    pub bytes: u64,
}

#[derive(Default)]
struct MetricCounters {
    frames: AtomicU64,
    presents: AtomicU64,
    rects: AtomicU64,
    bytes: AtomicU64,
}

pub struct Compositor {
    allocator: Arc<dyn SurfaceAllocator>,
    display: Arc<dyn DisplayBackend>,
    fonts: Arc<dyn FontEngine>,
    buffers: RwLock<HashMap<WindowId, Mutex<WindowBuffer>>>,
    screen: Mutex<Surface>,
    present_region: Mutex<ClipRegion>,
    background: Color,
    parallel: bool,
    metrics: MetricCounters,
}

impl Compositor {
    pub fn new(
        config: &RenderConfig,
        screen: Rect,
        allocator: Arc<dyn SurfaceAllocator>,
        display: Arc<dyn DisplayBackend>,
        fonts: Arc<dyn FontEngine>,
    ) -> Self {
        Self {
            allocator,
            display,
            fonts,
            buffers: RwLock::new(HashMap::new()),
            screen: Mutex::new(Surface::new(screen.width(), screen.height(), PixelFormat::Xrgb8888)),
            present_region: Mutex::new(ClipRegion::new()),
            background: Color(config.background),
            parallel: config.parallel,
            metrics: MetricCounters::default(),
        }
    }

    pub fn display(&self) -> &Arc<dyn DisplayBackend> {
        &self.display
    }

    // ========================================================================
    // Buffer lifecycle
    // ========================================================================

    fn allocate(&self, outer: Rect) -> Result<SurfaceHandle> {
        self.allocator
            .allocate_surface(outer.width().max(1), outer.height().max(1), PixelFormat::Argb8888)
    }

    /// Give `window` a backing surface for `outer`.
    pub fn attach(&self, window: WindowId, outer: Rect) -> Result<()> {
        let handle = self.allocate(outer)?;
        let mut buffer = WindowBuffer {
            handle,
            sessions: UpdateSessions::new(),
            outer,
            dirty: ClipRegion::new(),
            last_visible: ClipRegion::new(),
        };
        buffer.mark_all_dirty();
        if let Some(old) = self.buffers.write().insert(window, Mutex::new(buffer)) {
            self.allocator.release(old.into_inner().handle);
        }
        log::debug!("Attached {}x{} surface to {}", outer.width(), outer.height(), window);
        Ok(())
    }

    pub fn detach(&self, window: WindowId) {
        if let Some(buffer) = self.buffers.write().remove(&window) {
            self.allocator.release(buffer.into_inner().handle);
        }
    }

    pub fn is_attached(&self, window: WindowId) -> bool {
        self.buffers.read().contains_key(&window)
    }

    /// The window's outer frame changed. A new size means a new surface and
    /// a full redraw; a pure move keeps the pixels.
    pub fn relayout(&self, window: WindowId, outer: Rect) -> Result<()> {
        let buffers = self.buffers.read();
        let Some(slot) = buffers.get(&window) else {
            return Err(CompositorError::UnknownWindow(window));
        };
        let mut buffer = slot.lock();
        if buffer.outer.size() != outer.size() {
            let handle = self.allocate(outer)?;
            let old = std::mem::replace(&mut buffer.handle, handle);
            self.allocator.release(old);
            buffer.outer = outer;
            buffer.mark_all_dirty();
        } else {
            buffer.outer = outer;
        }
        Ok(())
    }

    // ========================================================================
    // Client drawing
    // ========================================================================

    /// Queue a batch. `area` is the screen rectangle it may draw on.
    pub fn submit(&self, window: WindowId, batch: DrawBatch, area: Rect) -> Result<()> {
        let buffers = self.buffers.read();
        let slot = buffers.get(&window).ok_or(CompositorError::UnknownWindow(window))?;
        let mut buffer = slot.lock();
        let local = buffer.local(area);
        buffer.sessions.submit(batch, local);
        Ok(())
    }

    /// Publish pending drawing. Returns false if nothing was pending.
    pub fn commit(&self, window: WindowId) -> Result<bool> {
        let buffers = self.buffers.read();
        let slot = buffers.get(&window).ok_or(CompositorError::UnknownWindow(window))?;
        let mut buffer = slot.lock();
        match buffer.sessions.commit() {
            Some(dirty) => {
                buffer.dirty.include_region(&dirty);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drop retained batches of removed views.
    pub fn forget_views(&self, window: WindowId, views: &[ViewId]) {
        if let Some(slot) = self.buffers.read().get(&window) {
            slot.lock()
                .sessions
                .retain_views(|b| b.view.map_or(true, |v| !views.contains(&v)));
        }
    }

    /// Mark a screen rectangle of `window` for redrawing.
    pub fn invalidate(&self, window: WindowId, area: Rect) {
        if let Some(slot) = self.buffers.read().get(&window) {
            let mut buffer = slot.lock();
            let local = buffer.local(area);
            buffer.dirty.include(local);
        }
    }

    pub fn invalidate_window(&self, window: WindowId) {
        if let Some(slot) = self.buffers.read().get(&window) {
            slot.lock().mark_all_dirty();
        }
    }

    /// Record the window's new visible region. Returns the newly exposed
    /// part in content coordinates, already marked dirty.
    pub fn expose(&self, window: WindowId, visible: &ClipRegion, content: Rect) -> Vec<Rect> {
        let buffers = self.buffers.read();
        let Some(slot) = buffers.get(&window) else {
            return Vec::new();
        };
        let mut buffer = slot.lock();
        let mut exposed = visible.clone();
        exposed.exclude_region(&buffer.last_visible);
        buffer.last_visible.set_to(visible);
        if exposed.is_empty() {
            return Vec::new();
        }
        for r in exposed.rects() {
            let local = buffer.local(*r);
            buffer.dirty.include(local);
        }
        exposed.intersect_rect(content);
        exposed
            .rects()
            .iter()
            .map(|r| r.offset_by(-content.left, -content.top))
            .collect()
    }

    pub fn committed_ops(&self, window: WindowId) -> usize {
        self.buffers
            .read()
            .get(&window)
            .map_or(0, |slot| slot.lock().sessions.current().op_count())
    }

    pub fn is_dirty(&self, window: WindowId) -> bool {
        self.buffers
            .read()
            .get(&window)
            .map_or(false, |slot| !slot.lock().dirty.is_empty())
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Redraw the dirty part of every job's window into its surface.
    pub fn render(&self, jobs: &[RenderJob<'_>]) -> RenderReport {
        let buffers = self.buffers.read();
        let rendered = SegQueue::new();
        let corrupted = SegQueue::new();
        let draw = |job: &RenderJob<'_>| {
            let Some(slot) = buffers.get(&job.window) else {
                return;
            };
            let mut buffer = slot.lock();
            if buffer.dirty.is_empty() {
                return;
            }
            match self.render_window(&mut buffer, job) {
                Ok(()) => rendered.push(job.window),
                Err(e) => {
                    log::error!("Render of {} failed: {}", job.window, e);
                    corrupted.push((job.window, e.to_string()));
                }
            }
        };
        if self.parallel {
            jobs.par_iter().for_each(draw);
        } else {
            jobs.iter().for_each(draw);
        }

        let mut report = RenderReport::default();
        while let Some(w) = rendered.pop() {
            report.rendered.push(w);
        }
        while let Some(c) = corrupted.pop() {
            report.corrupted.push(c);
        }
        report.rendered.sort();
        report.corrupted.sort_by_key(|c| c.0);
        report
    }

    fn render_window(&self, buffer: &mut WindowBuffer, job: &RenderJob<'_>) -> Result<()> {
        if !job.outer.is_valid() || !job.outer.contains_rect(&job.content) {
            return Err(CompositorError::corruption(
                Some(job.window),
                format!("content {:?} escapes outer frame {:?}", job.content, job.outer),
            ));
        }
        buffer.outer = job.outer;
        let dirty = std::mem::take(&mut buffer.dirty);
        let batches = buffer.sessions.current().batches.clone();
        let origin = Point::new(-job.outer.left, -job.outer.top);

        let mut canvas = Canvas::new(buffer.handle.surface_mut(), dirty, &*self.fonts);
        canvas.set_origin(origin);
        canvas.set_high_color(CONTENT_FILL);
        canvas.fill_rect(job.content);
        if let Some(decorator) = job.decorator {
            canvas.push_state();
            decorator.draw(&mut canvas);
            canvas.pop_state();
        }
        for batch in &batches {
            let frame = match batch.view {
                Some(view) => match job.views.iter().find(|(v, _)| *v == view) {
                    Some((_, frame)) => *frame,
                    None => continue,
                },
                None => job.content,
            };
            canvas.push_state();
            canvas.clip_to_rect(job.content);
            canvas.clip_to_rect(frame);
            canvas.set_origin(frame.origin());
            replay(&mut canvas, &batch.ops);
            canvas.pop_state();
        }
        let touched = canvas.finish();
        log::trace!("Rendered {} ({} rects touched)", job.window, touched.len());
        Ok(())
    }

    // ========================================================================
    // Screen
    // ========================================================================

    /// Assemble `damage` (screen coordinates) from the window surfaces,
    /// back to front, and queue it for presenting.
    pub fn composite(&self, jobs: &[RenderJob<'_>], damage: &ClipRegion) {
        if damage.is_empty() {
            return;
        }
        let buffers = self.buffers.read();
        let mut screen = self.screen.lock();
        let mut uncovered = damage.clone();
        for job in jobs {
            uncovered.exclude_region(&job.visible);
        }
        for r in uncovered.rects() {
            screen.fill_rect(*r, self.background);
        }
        for job in jobs {
            let Some(slot) = buffers.get(&job.window) else {
                continue;
            };
            let buffer = slot.lock();
            let mut through = damage.clone();
            through.intersect(&job.visible);
            for r in through.rects() {
                let src = buffer.local(*r);
                screen.blit_from(buffer.handle.surface(), src, r.origin());
            }
        }
        drop(screen);
        self.request_present(damage);
    }

    /// Merge `region` into the next present.
    pub fn request_present(&self, region: &ClipRegion) {
        self.present_region.lock().include_region(region);
    }

    /// Push everything requested since the last flush in one present.
    /// Returns the number of rectangles presented.
    pub fn flush_present(&self) -> usize {
        let region = std::mem::take(&mut *self.present_region.lock());
        self.metrics.frames.fetch_add(1, Ordering::Relaxed);
        if region.is_empty() {
            return 0;
        }
        let rects = region.rects().to_vec();
        let screen = self.screen.lock();
        self.display.present(&screen, &rects, None);
        let bytes: i64 = rects.iter().map(|r| r.area()).sum::<i64>() * 4;
        self.metrics.presents.fetch_add(1, Ordering::Relaxed);
        self.metrics.rects.fetch_add(rects.len() as u64, Ordering::Relaxed);
        self.metrics.bytes.fetch_add(bytes.max(0) as u64, Ordering::Relaxed);
        rects.len()
    }

    /// New screen size; the whole screen is redrawn on the next frame.
    pub fn resize_screen(&self, screen: Rect) {
        *self.screen.lock() = Surface::new(screen.width(), screen.height(), PixelFormat::Xrgb8888);
        self.display.resize(screen.width(), screen.height());
        let mut buffers = self.buffers.write();
        for slot in buffers.values_mut() {
            slot.get_mut().last_visible.clear();
        }
    }

    pub fn screen_pixel(&self, p: Point) -> Option<Color> {
        self.screen.lock().pixel(p.x, p.y)
    }

    pub fn metrics(&self) -> FrameMetrics {
        FrameMetrics {
            frames: self.metrics.frames.load(Ordering::Relaxed),
            presents: self.metrics.presents.load(Ordering::Relaxed),
            rects: self.metrics.rects.load(Ordering::Relaxed),
            bytes: self.metrics.bytes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::DrawOp;
    use crate::hal::{BlockFont, HeadlessDisplay, PooledSurfaceAllocator};

    const SCREEN: Rect = Rect::new(0, 0, 200, 100);
    const RED: Color = Color::rgb(255, 0, 0);

    fn compositor(display: Arc<HeadlessDisplay>) -> Compositor {
        let config = RenderConfig { background: Color::BLACK.0, parallel: false, ..RenderConfig::default() };
        Compositor::new(&config, SCREEN, Arc::new(PooledSurfaceAllocator::default()), display, Arc::new(BlockFont))
    }

    fn job(window: WindowId, frame: Rect, visible: ClipRegion) -> RenderJob<'static> {
        RenderJob { window, outer: frame, content: frame, decorator: None, views: Vec::new(), visible: Arc::new(visible) }
    }

    // --- Unit Tests ---

    #[test]
    fn test_pending_drawing_invisible_until_commit() {
        let display = Arc::new(HeadlessDisplay::new(200, 100));
        let comp = compositor(Arc::clone(&display));
        let w = WindowId(1);
        let frame = Rect::new(10, 10, 50, 50);
        comp.attach(w, frame).unwrap();
        comp.submit(w, DrawBatch::new(None).with(DrawOp::SetHighColor(RED)).with(DrawOp::FillRect(Rect::new(0, 0, 50, 50))), frame)
            .unwrap();

        let jobs = [job(w, frame, ClipRegion::from_rect(frame))];
        comp.render(&jobs);
        comp.composite(&jobs, &ClipRegion::from_rect(frame));
        assert_eq!(comp.screen_pixel(Point::new(20, 20)), Some(CONTENT_FILL));

        assert!(comp.commit(w).unwrap());
        let report = comp.render(&jobs);
        assert_eq!(report.rendered, vec![w]);
        comp.composite(&jobs, &ClipRegion::from_rect(frame));
        assert_eq!(comp.screen_pixel(Point::new(20, 20)), Some(RED));
    }

    #[test]
    fn test_presents_are_coalesced() {
        let display = Arc::new(HeadlessDisplay::new(200, 100));
        let comp = compositor(Arc::clone(&display));
        for i in 0..10 {
            comp.request_present(&ClipRegion::from_rect(Rect::new(i * 5, 0, 5, 5)));
        }
        assert_eq!(comp.flush_present(), 1);
        assert_eq!(display.present_count(), 1);
        assert_eq!(comp.flush_present(), 0);
        assert_eq!(display.present_count(), 1);
        assert_eq!(comp.metrics().presents, 1);
    }

    #[test]
    fn test_expose_reports_only_new_area() {
        let comp = compositor(Arc::new(HeadlessDisplay::new(200, 100)));
        let w = WindowId(1);
        let frame = Rect::new(0, 0, 100, 100);
        comp.attach(w, frame).unwrap();
        let mut half = ClipRegion::from_rect(frame);
        half.exclude(Rect::new(50, 0, 50, 100));
        comp.expose(w, &half, frame);
        let exposed = comp.expose(w, &ClipRegion::from_rect(frame), frame);
        assert_eq!(exposed, vec![Rect::new(50, 0, 50, 100)]);
        assert!(comp.expose(w, &ClipRegion::from_rect(frame), frame).is_empty());
    }

    #[test]
    fn test_uncovered_damage_gets_background() {
        let comp = compositor(Arc::new(HeadlessDisplay::new(200, 100)));
        comp.composite(&[], &ClipRegion::from_rect(SCREEN));
        assert_eq!(comp.screen_pixel(Point::new(150, 50)), Some(Color::BLACK));
    }

    #[test]
    fn test_broken_geometry_reported_as_corruption() {
        let comp = compositor(Arc::new(HeadlessDisplay::new(200, 100)));
        let w = WindowId(4);
        comp.attach(w, Rect::new(0, 0, 20, 20)).unwrap();
        let bad = RenderJob {
            window: w,
            outer: Rect::new(0, 0, 20, 20),
            content: Rect::new(10, 10, 40, 40),
            decorator: None,
            views: Vec::new(),
            visible: Arc::new(ClipRegion::new()),
        };
        let report = comp.render(&[bad]);
        assert_eq!(report.corrupted.len(), 1);
        assert_eq!(report.corrupted[0].0, w);
    }

    // --- Scenario Tests ---

    #[test]
    fn scenario_lower_window_shows_only_through_its_visible_region() {
        let comp = compositor(Arc::new(HeadlessDisplay::new(200, 100)));
        let (low, high) = (WindowId(1), WindowId(2));
        let low_frame = Rect::new(0, 0, 100, 100);
        let high_frame = Rect::new(50, 0, 100, 100);
        comp.attach(low, low_frame).unwrap();
        comp.attach(high, high_frame).unwrap();
        comp.submit(low, DrawBatch::new(None).with(DrawOp::SetHighColor(RED)).with(DrawOp::FillRect(Rect::new(0, 0, 100, 100))), low_frame)
            .unwrap();
        comp.commit(low).unwrap();

        let mut low_visible = ClipRegion::from_rect(low_frame);
        low_visible.exclude(high_frame);
        let jobs = [job(low, low_frame, low_visible), job(high, high_frame, ClipRegion::from_rect(high_frame))];
        comp.render(&jobs);
        comp.composite(&jobs, &ClipRegion::from_rect(SCREEN));
        assert_eq!(comp.screen_pixel(Point::new(25, 50)), Some(RED));
        assert_eq!(comp.screen_pixel(Point::new(75, 50)), Some(CONTENT_FILL));
        assert_eq!(comp.screen_pixel(Point::new(175, 50)), Some(Color::BLACK));
    }
}
