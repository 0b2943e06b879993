//! Clip Engine - visible regions of windows and views
//!
//! A window's visible region is its shape (content plus decorator footprint)
//! clipped to the screen, minus the shapes of every shown window above it.
//! A view's visible region is its screen frame clipped by its parent's
//! region, minus its later (overlapping) siblings.
//!
//! Results are cached per node and shared as `Arc<ClipRegion>`. Cached
//! regions come from the `RegionPool` and go back to it when invalidated.

use crate::error::{CompositorError, Result};
use crate::region::{ClipRegion, RegionPool, RegionPoolStats};
use crate::types::{Rect, WindowId};
use crate::window::{ViewId, ViewParent, ViewTree};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Geometry the clip engine reads. Implemented by the desktop state.
pub trait ClipScene {
    fn screen(&self) -> Rect;

    /// Every window, back to front.
    fn z_order(&self) -> &[WindowId];

    /// Whether the window is drawn at all (front of its stack, not minimized,
    /// on the current workspace).
    fn is_window_shown(&self, window: WindowId) -> bool;

    /// Content frame in screen coordinates.
    fn window_content(&self, window: WindowId) -> Option<Rect>;

    /// Content frame plus decorator footprint, in screen coordinates.
    fn window_shape(&self, window: WindowId) -> Option<ClipRegion>;

    fn views(&self) -> &ViewTree;
}

/// Node whose visible region is cached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClipNode {
    Window(WindowId),
    View(ViewId),
}

struct CacheEntry {
    region: Arc<ClipRegion>,
    window: WindowId,
    /// Unclipped bounds of the node, used for area invalidation.
    bounds: Rect,
}

/// Snapshot of engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClipStats {
    pub cached_nodes: usize,
    pub computations: u64,
    pub cache_hits: u64,
    pub pool: RegionPoolStats,
}

pub struct ClipEngine {
    pool: Arc<RegionPool>,
    cache: Mutex<HashMap<ClipNode, CacheEntry>>,
    computations: AtomicU64,
    cache_hits: AtomicU64,
}

impl ClipEngine {
    pub fn new(pool: Arc<RegionPool>) -> Self {
        Self {
            pool,
            cache: Mutex::new(HashMap::new()),
            computations: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
        }
    }

    pub fn pool(&self) -> &Arc<RegionPool> {
        &self.pool
    }

    // ========================================================================
    // Computation
    // ========================================================================

    /// Visible region of a window or view in screen coordinates.
    pub fn compute_visible_region(&self, scene: &dyn ClipScene, node: ClipNode) -> Result<Arc<ClipRegion>> {
        if let Some(entry) = self.cache.lock().get(&node) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(&entry.region));
        }

        let (region, window, bounds) = match node {
            ClipNode::Window(id) => self.compute_window(scene, id)?,
            ClipNode::View(id) => self.compute_view(scene, id)?,
        };
        if let Err(e) = region.validate() {
            let detail = match e {
                CompositorError::RegionCorruption { detail, .. } => detail,
                other => other.to_string(),
            };
            self.pool.release(region);
            return Err(CompositorError::corruption(Some(window), detail));
        }
        self.computations.fetch_add(1, Ordering::Relaxed);

        let region = Arc::new(region);
        self.cache.lock().insert(
            node,
            CacheEntry { region: Arc::clone(&region), window, bounds },
        );
        Ok(region)
    }

    /// Visible part of a window's content area.
    pub fn content_region(&self, scene: &dyn ClipScene, window: WindowId) -> Result<ClipRegion> {
        let visible = self.compute_visible_region(scene, ClipNode::Window(window))?;
        let content = scene.window_content(window).ok_or(CompositorError::UnknownWindow(window))?;
        let mut region = self.pool.acquire_copy(&visible);
        region.intersect_rect(content);
        Ok(region)
    }

    /// Where a view may draw: its visible region minus its shown children.
    pub fn drawing_region(&self, scene: &dyn ClipScene, view: ViewId) -> Result<ClipRegion> {
        let visible = self.compute_visible_region(scene, ClipNode::View(view))?;
        let mut region = self.pool.acquire_copy(&visible);
        let tree = scene.views();
        let v = tree.get(view).ok_or(CompositorError::UnknownView)?;
        let content = scene
            .window_content(v.window())
            .ok_or(CompositorError::UnknownWindow(v.window()))?;
        for child in v.children() {
            if tree.is_hidden(*child) {
                continue;
            }
            if let Some(frame) = tree.screen_frame(*child, content.origin()) {
                region.exclude(frame);
            }
        }
        Ok(region)
    }

    /// Hand a region obtained from this engine back to the pool.
    pub fn recycle(&self, region: ClipRegion) {
        self.pool.release(region);
    }

    fn compute_window(&self, scene: &dyn ClipScene, id: WindowId) -> Result<(ClipRegion, WindowId, Rect)> {
        let content = scene.window_content(id).ok_or(CompositorError::UnknownWindow(id))?;
        if !content.is_valid() {
            return Err(CompositorError::corruption(
                Some(id),
                format!("content frame {:?} has negative area", content),
            ));
        }
        let shape = scene.window_shape(id).ok_or(CompositorError::UnknownWindow(id))?;
        let bounds = shape.bounds();
        let mut region = self.pool.acquire();
        if !scene.is_window_shown(id) {
            return Ok((region, id, bounds));
        }

        region.set_to(&shape);
        region.intersect_rect(scene.screen());

        let order = scene.z_order();
        let above = match order.iter().position(|w| *w == id) {
            Some(pos) => &order[pos + 1..],
            None => &[][..],
        };
        for other in above {
            if region.is_empty() {
                break;
            }
            if !scene.is_window_shown(*other) {
                continue;
            }
            if let Some(over) = scene.window_shape(*other) {
                region.exclude_region(&over);
            }
        }
        Ok((region, id, bounds))
    }

    fn compute_view(&self, scene: &dyn ClipScene, id: ViewId) -> Result<(ClipRegion, WindowId, Rect)> {
        let tree = scene.views();
        let view = tree.get(id).ok_or(CompositorError::UnknownView)?;
        let window = view.window();
        let content = scene.window_content(window).ok_or(CompositorError::UnknownWindow(window))?;
        if !view.frame.is_valid() {
            return Err(CompositorError::corruption(
                Some(window),
                format!("view '{}' frame {:?} has negative area", view.name, view.frame),
            ));
        }
        let frame = tree.screen_frame(id, content.origin()).ok_or(CompositorError::UnknownView)?;

        let mut region = self.pool.acquire();
        if tree.is_hidden(id) {
            return Ok((region, window, frame));
        }

        match view.parent() {
            ViewParent::Window(_) => {
                let visible = self.compute_visible_region(scene, ClipNode::Window(window))?;
                region.set_to(&visible);
                region.intersect_rect(content);
            }
            ViewParent::View(parent) => {
                let visible = self.compute_visible_region(scene, ClipNode::View(parent))?;
                region.set_to(&visible);
            }
        }
        region.intersect_rect(frame);

        if let Some(shape) = &view.clip_shape {
            let mut mapped = self.pool.acquire_copy(shape);
            mapped.offset_by(frame.left, frame.top);
            region.intersect(&mapped);
            self.pool.release(mapped);
        }

        for sibling in tree.later_siblings(id) {
            if tree.is_hidden(*sibling) {
                continue;
            }
            if let Some(over) = tree.screen_frame(*sibling, content.origin()) {
                region.exclude(over);
            }
        }
        Ok((region, window, frame))
    }

    // ========================================================================
    // Invalidation
    // ========================================================================

    /// Drop the cached regions of a window and all its views.
    pub fn invalidate_window(&self, window: WindowId) {
        self.evict(|_, entry| entry.window == window);
    }

    /// Drop every cached window whose bounds touch `area`, plus its views.
    pub fn invalidate_area(&self, area: Rect) {
        if area.is_empty() {
            return;
        }
        let touched: Vec<WindowId> = self
            .cache
            .lock()
            .iter()
            .filter(|(node, entry)| matches!(node, ClipNode::Window(_)) && entry.bounds.intersects(&area))
            .map(|(_, entry)| entry.window)
            .collect();
        self.evict(|_, entry| touched.contains(&entry.window) || entry.bounds.intersects(&area));
    }

    /// Drop a view subtree and the earlier siblings it may overlap.
    pub fn invalidate_view(&self, tree: &ViewTree, view: ViewId) {
        let mut nodes: Vec<ViewId> = tree.subtree(view);
        if let Some(ViewParent::View(parent)) = tree.get(view).map(|v| v.parent()) {
            if let Some(p) = tree.get(parent) {
                for sibling in p.children() {
                    if *sibling == view {
                        break;
                    }
                    nodes.extend(tree.subtree(*sibling));
                }
            }
        }
        self.evict(|node, _| matches!(node, ClipNode::View(v) if nodes.contains(v)));
    }

    /// Drop the cached region of every view in `views`, even if they are
    /// no longer in the tree.
    pub fn forget_views(&self, views: &[ViewId]) {
        self.evict(|node, _| matches!(node, ClipNode::View(v) if views.contains(v)));
    }

    pub fn invalidate_all(&self) {
        self.evict(|_, _| true);
    }

    fn evict(&self, mut doomed: impl FnMut(&ClipNode, &CacheEntry) -> bool) {
        let removed: Vec<CacheEntry> = {
            let mut cache = self.cache.lock();
            let keys: Vec<ClipNode> = cache
                .iter()
                .filter(|(node, entry)| doomed(node, entry))
                .map(|(node, _)| *node)
                .collect();
            keys.iter().filter_map(|k| cache.remove(k)).collect()
        };
        for entry in removed {
            // Readers may still hold the region; it is freed when they drop it.
            if let Ok(region) = Arc::try_unwrap(entry.region) {
                self.pool.release(region);
            }
        }
    }

    pub fn is_cached(&self, node: ClipNode) -> bool {
        self.cache.lock().contains_key(&node)
    }

    pub fn stats(&self) -> ClipStats {
        ClipStats {
            cached_nodes: self.cache.lock().len(),
            computations: self.computations.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            pool: self.pool.stats(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Windows without decorators, back to front.
    pub(crate) struct TestScene {
        pub screen: Rect,
        pub windows: Vec<(WindowId, Rect, bool)>,
        pub order: Vec<WindowId>,
        pub tree: ViewTree,
    }

    impl TestScene {
        pub fn new(screen: Rect) -> Self {
            Self { screen, windows: Vec::new(), order: Vec::new(), tree: ViewTree::new() }
        }

        pub fn add(&mut self, id: u32, frame: Rect) -> (WindowId, ViewId) {
            let id = WindowId(id);
            self.windows.push((id, frame, true));
            self.order.push(id);
            let root = self.tree.create_root(id, Rect::new(0, 0, frame.width(), frame.height()));
            (id, root)
        }

        pub fn set_frame(&mut self, id: WindowId, frame: Rect) {
            if let Some(w) = self.windows.iter_mut().find(|w| w.0 == id) {
                w.1 = frame;
            }
        }

        pub fn set_shown(&mut self, id: WindowId, shown: bool) {
            if let Some(w) = self.windows.iter_mut().find(|w| w.0 == id) {
                w.2 = shown;
            }
        }
    }

    impl ClipScene for TestScene {
        fn screen(&self) -> Rect {
            self.screen
        }

        fn z_order(&self) -> &[WindowId] {
            &self.order
        }

        fn is_window_shown(&self, window: WindowId) -> bool {
            self.windows.iter().any(|w| w.0 == window && w.2)
        }

        fn window_content(&self, window: WindowId) -> Option<Rect> {
            self.windows.iter().find(|w| w.0 == window).map(|w| w.1)
        }

        fn window_shape(&self, window: WindowId) -> Option<ClipRegion> {
            self.window_content(window).map(ClipRegion::from_rect)
        }

        fn views(&self) -> &ViewTree {
            &self.tree
        }
    }

    fn engine() -> ClipEngine {
        ClipEngine::new(Arc::new(RegionPool::new(16)))
    }

    // --- Unit Tests ---

    #[test]
    fn test_overlapped_window_loses_covered_area() {
        let mut scene = TestScene::new(Rect::new(0, 0, 1024, 768));
        let (w1, _) = scene.add(1, Rect::new(0, 0, 200, 200));
        let (w2, _) = scene.add(2, Rect::new(100, 100, 200, 200));
        let clip = engine();

        let v1 = clip.compute_visible_region(&scene, ClipNode::Window(w1)).unwrap();
        let v2 = clip.compute_visible_region(&scene, ClipNode::Window(w2)).unwrap();

        let mut expected = ClipRegion::from_rect(Rect::new(0, 0, 200, 200));
        expected.exclude(Rect::new(100, 100, 100, 100));
        assert_eq!(*v1, expected);
        assert_eq!(*v2, ClipRegion::from_rect(Rect::new(100, 100, 200, 200)));
    }

    #[test]
    fn test_window_clipped_to_screen() {
        let mut scene = TestScene::new(Rect::new(0, 0, 100, 100));
        let (w, _) = scene.add(1, Rect::new(50, 50, 100, 100));
        let clip = engine();
        let v = clip.compute_visible_region(&scene, ClipNode::Window(w)).unwrap();
        assert_eq!(v.rects(), &[Rect::new(50, 50, 50, 50)]);
    }

    #[test]
    fn test_hidden_window_has_empty_region_and_does_not_occlude() {
        let mut scene = TestScene::new(Rect::new(0, 0, 500, 500));
        let (w1, _) = scene.add(1, Rect::new(0, 0, 100, 100));
        let (w2, _) = scene.add(2, Rect::new(0, 0, 100, 100));
        scene.set_shown(w2, false);
        let clip = engine();
        assert!(clip.compute_visible_region(&scene, ClipNode::Window(w2)).unwrap().is_empty());
        assert_eq!(clip.compute_visible_region(&scene, ClipNode::Window(w1)).unwrap().area(), 100 * 100);
    }

    #[test]
    fn test_view_regions_nest_and_exclude_later_siblings() {
        let mut scene = TestScene::new(Rect::new(0, 0, 500, 500));
        let (w, root) = scene.add(1, Rect::new(10, 10, 100, 100));
        let a = scene.tree.add_child(root, "a", Rect::new(0, 0, 60, 60)).unwrap();
        let b = scene.tree.add_child(root, "b", Rect::new(40, 40, 60, 60)).unwrap();
        let inner = scene.tree.add_child(a, "inner", Rect::new(40, 0, 30, 30)).unwrap();
        let clip = engine();

        let window = clip.compute_visible_region(&scene, ClipNode::Window(w)).unwrap();
        let va = clip.compute_visible_region(&scene, ClipNode::View(a)).unwrap();
        let vb = clip.compute_visible_region(&scene, ClipNode::View(b)).unwrap();
        let vi = clip.compute_visible_region(&scene, ClipNode::View(inner)).unwrap();

        let mut expected_a = ClipRegion::from_rect(Rect::new(10, 10, 60, 60));
        expected_a.exclude(Rect::new(50, 50, 60, 60));
        assert_eq!(*va, expected_a);
        assert_eq!(*vb, ClipRegion::from_rect(Rect::new(50, 50, 60, 60)));
        assert!(va.is_subset_of(&window));
        assert!(vi.is_subset_of(&va));
        assert_eq!(vi.area(), 20 * 30);
    }

    #[test]
    fn test_drawing_region_excludes_children() {
        let mut scene = TestScene::new(Rect::new(0, 0, 500, 500));
        let (_, root) = scene.add(1, Rect::new(0, 0, 100, 100));
        scene.tree.add_child(root, "child", Rect::new(0, 0, 50, 100)).unwrap();
        let clip = engine();
        let region = clip.drawing_region(&scene, root).unwrap();
        assert_eq!(region.rects(), &[Rect::new(50, 0, 50, 100)]);
    }

    #[test]
    fn test_cache_reused_until_invalidated() {
        let mut scene = TestScene::new(Rect::new(0, 0, 500, 500));
        let (w1, _) = scene.add(1, Rect::new(0, 0, 100, 100));
        let (w2, _) = scene.add(2, Rect::new(300, 300, 100, 100));
        let clip = engine();

        let first = clip.compute_visible_region(&scene, ClipNode::Window(w1)).unwrap();
        let again = clip.compute_visible_region(&scene, ClipNode::Window(w1)).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(clip.stats().cache_hits, 1);

        // Move w2 on top of w1.
        let old = Rect::new(300, 300, 100, 100);
        let new = Rect::new(50, 50, 100, 100);
        scene.set_frame(w2, new);
        clip.invalidate_area(old.union(&new));
        assert!(!clip.is_cached(ClipNode::Window(w1)));

        let moved = clip.compute_visible_region(&scene, ClipNode::Window(w1)).unwrap();
        assert_eq!(moved.area(), 100 * 100 - 50 * 50);
    }

    #[test]
    fn test_invalidate_area_misses_unrelated_windows() {
        let mut scene = TestScene::new(Rect::new(0, 0, 500, 500));
        let (w1, root) = scene.add(1, Rect::new(0, 0, 100, 100));
        let clip = engine();
        clip.compute_visible_region(&scene, ClipNode::View(root)).unwrap();
        clip.invalidate_area(Rect::new(200, 200, 10, 10));
        assert!(clip.is_cached(ClipNode::Window(w1)));
        clip.invalidate_window(w1);
        assert!(!clip.is_cached(ClipNode::View(root)));
    }

    #[test]
    fn test_invalidated_regions_return_to_pool() {
        let mut scene = TestScene::new(Rect::new(0, 0, 500, 500));
        let (w1, _) = scene.add(1, Rect::new(0, 0, 100, 100));
        let clip = engine();
        let held = clip.compute_visible_region(&scene, ClipNode::Window(w1)).unwrap();
        clip.invalidate_all();
        assert_eq!(clip.stats().pool.pooled, 0);
        drop(held);

        clip.compute_visible_region(&scene, ClipNode::Window(w1)).unwrap();
        clip.invalidate_all();
        assert_eq!(clip.stats().pool.pooled, 1);
    }

    #[test]
    fn test_negative_bounds_reported_as_corruption() {
        let mut scene = TestScene::new(Rect::new(0, 0, 500, 500));
        let (w1, _) = scene.add(1, Rect::new(0, 0, 100, 100));
        scene.set_frame(w1, Rect::from_edges(50, 50, 10, 10));
        let clip = engine();
        let err = clip.compute_visible_region(&scene, ClipNode::Window(w1)).unwrap_err();
        assert!(matches!(err, CompositorError::RegionCorruption { window: Some(w), .. } if w == w1));
    }

    // --- Scenario Tests ---

    #[test]
    fn scenario_visible_regions_stay_inside_screen_and_disjoint() {
        let mut scene = TestScene::new(Rect::new(0, 0, 300, 300));
        let frames = [
            Rect::new(-20, -20, 150, 150),
            Rect::new(100, 40, 180, 90),
            Rect::new(60, 60, 300, 300),
            Rect::new(10, 200, 50, 50),
        ];
        let ids: Vec<WindowId> = frames
            .iter()
            .enumerate()
            .map(|(i, f)| scene.add(i as u32 + 1, *f).0)
            .collect();
        let clip = engine();

        let screen = ClipRegion::from_rect(scene.screen);
        let regions: Vec<Arc<ClipRegion>> = ids
            .iter()
            .map(|w| clip.compute_visible_region(&scene, ClipNode::Window(*w)).unwrap())
            .collect();
        for (i, a) in regions.iter().enumerate() {
            assert!(a.is_subset_of(&screen));
            a.validate().unwrap();
            for b in &regions[i + 1..] {
                assert!(a.rects().iter().all(|r| !b.intersects(r)));
            }
        }
    }
}
