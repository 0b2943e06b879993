//! Desktop
//!
//! Owns every window, the z-order, window stacks, the view arena, the Stack &
//! Tile groups and the workspaces, and ties the clip engine, the compositor
//! and the input pipeline together.
//!
//! Locks are always taken in this order: input, then the geometry lock, then
//! the clip cache. Geometry reads (hit-testing, rendering) use the read side;
//! mutations take the write side within a bounded budget and are retried with
//! backoff on timeout.

pub mod lock;
pub mod state;
pub mod workspace;

pub use lock::{BackoffMetrics, GeometryLock, LockBackoff, MAX_LOCK_ATTEMPTS};
pub use state::DesktopState;
pub use workspace::{Workspace, WorkspaceManager, MAX_WORKSPACES};

use crate::behaviour::{BehaviourAction, BehaviourContext, DefaultWindowBehaviour, WindowBehaviour, MANAGE_MODIFIERS};
use crate::canvas::DrawBatch;
use crate::clip::{ClipEngine, ClipNode, ClipScene};
use crate::compositor::{Compositor, FrameMetrics, RenderJob};
use crate::config::CompositorConfig;
use crate::decorator::{
    transfer_state, Decorator, DecoratorContext, DecoratorRegistry, HitRegion, ResizeEdge, DEFAULT_DECORATOR,
};
use crate::error::{CompositorError, Result};
use crate::hal::{
    BlockFont, DisplayBackend, FontEngine, HeadlessDisplay, MemorySettings, PooledSurfaceAllocator, SettingsStore,
    SurfaceAllocator,
};
use crate::input::{
    CursorSlot, DispatchOutcome, EventRouter, HitArea, InputEvent, InputEventKind, Scene,
};
use crate::input::router::DropReason;
use crate::protocol::{ClientMessage, ClientSink, GeometryChange, NullSink};
use crate::region::{ClipRegion, RegionPool};
use crate::stack_tile::{GroupArchive, GroupId, LayoutChange, StackAndTile};
use crate::types::{Point, Rect, StackId, WindowId};
use crate::window::{SizeLimits, ViewId, ViewParent, Window, WindowSpec, WindowStack, MAX_EXTENT};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use state::{content_limits, outer_limits};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Settings key of the decorator skin name.
const DECORATOR_KEY: &str = "desktop/decorator";
/// Settings key of the Stack & Tile group archives.
const GROUPS_KEY: &str = "stack_tile/groups";

fn decorator_settings_key(title: &str) -> String {
    format!("decorator/{}", title)
}

// ============================================================================
// Services
// ============================================================================

/// Platform services the desktop draws on.
pub struct DesktopServices {
    pub allocator: Arc<dyn SurfaceAllocator>,
    pub display: Arc<dyn DisplayBackend>,
    pub fonts: Arc<dyn FontEngine>,
    pub settings: Arc<dyn SettingsStore>,
    pub sink: Arc<dyn ClientSink>,
    pub decorators: DecoratorRegistry,
}

impl DesktopServices {
    /// In-memory services: headless display, pooled surfaces, block font,
    /// memory settings, messages dropped.
    pub fn headless(config: &CompositorConfig) -> Self {
        let screen = config.desktop.screen();
        let fonts: Arc<dyn FontEngine> = Arc::new(BlockFont);
        Self {
            allocator: Arc::new(PooledSurfaceAllocator::new(config.render.surface_budget_bytes)),
            display: Arc::new(HeadlessDisplay::new(screen.width(), screen.height())),
            settings: Arc::new(MemorySettings::new()),
            sink: Arc::new(NullSink),
            decorators: DecoratorRegistry::with_builtin(DecoratorContext { fonts: Arc::clone(&fonts) }),
            fonts,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ClientSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_display(mut self, display: Arc<dyn DisplayBackend>) -> Self {
        self.display = display;
        self
    }
}

// ============================================================================
// Input state
// ============================================================================

/// Everything guarded by the input mutex.
struct InputState {
    router: EventRouter,
    behaviours: HashMap<WindowId, DefaultWindowBehaviour>,
    /// Window whose decorator is drawn focused.
    active: Option<WindowId>,
}

/// Outcome of one `render_frame`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrameReport {
    pub rendered: Vec<WindowId>,
    /// Rectangles handed to the display.
    pub presented: usize,
    /// Windows force-closed because their geometry was corrupt.
    pub closed: Vec<WindowId>,
    /// Windows asked to redraw newly exposed content.
    pub update_requests: Vec<WindowId>,
}

// ============================================================================
// Scene adapter
// ============================================================================

/// Read-only view of the desktop for the event router.
struct SceneView<'a> {
    state: &'a DesktopState,
    clip: &'a ClipEngine,
}

impl SceneView<'_> {
    fn visible_contains(&self, node: ClipNode, p: Point) -> bool {
        match self.clip.compute_visible_region(self.state, node) {
            Ok(region) => region.contains(p),
            Err(e) => {
                log::warn!("Hit test skipped: {}", e);
                false
            }
        }
    }
}

impl Scene for SceneView<'_> {
    fn window_at(&self, p: Point) -> Option<WindowId> {
        self.state
            .z_order
            .iter()
            .rev()
            .copied()
            .filter(|w| self.state.is_window_shown(*w))
            .find(|w| self.visible_contains(ClipNode::Window(*w), p))
    }

    fn decorator_hit(&self, window: WindowId, p: Point) -> HitRegion {
        let Some(w) = self.state.windows.get(&window) else {
            return HitRegion::None;
        };
        if w.frame.contains(p) {
            return HitRegion::Content;
        }
        self.state.decorator_of(window).map_or(HitRegion::None, |d| d.hit_test(p))
    }

    fn view_at(&self, window: WindowId, p: Point) -> Option<ViewId> {
        let tree = &self.state.views;
        let hit = |v: ViewId| !tree.is_hidden(v) && self.visible_contains(ClipNode::View(v), p);
        let root = self.state.windows.get(&window)?.root_view;
        if !hit(root) {
            return None;
        }
        let mut current = root;
        'descend: loop {
            let view = tree.get(current)?;
            for child in view.children().iter().rev() {
                if hit(*child) {
                    current = *child;
                    continue 'descend;
                }
            }
            return Some(current);
        }
    }

    fn view_chain(&self, view: ViewId) -> Vec<ViewId> {
        let mut chain = Vec::new();
        let mut cursor = Some(view);
        while let Some(v) = cursor {
            let Some(node) = self.state.views.get(v) else {
                break;
            };
            chain.push(v);
            cursor = match node.parent() {
                ViewParent::View(parent) => Some(parent),
                ViewParent::Window(_) => None,
            };
        }
        chain.reverse();
        chain
    }

    fn focus_view(&self, window: WindowId) -> Option<ViewId> {
        let w = self.state.windows.get(&window)?;
        w.focus_view.filter(|v| self.state.views.contains(*v)).or(Some(w.root_view))
    }

    fn window_exists(&self, window: WindowId) -> bool {
        self.state.windows.contains_key(&window)
    }

    fn is_activatable(&self, window: WindowId) -> bool {
        self.state.windows.get(&window).map_or(false, |w| w.is_activatable())
    }
}

// ============================================================================
// Desktop
// ============================================================================

pub struct Desktop {
    config: CompositorConfig,
    state: GeometryLock<DesktopState>,
    clip: ClipEngine,
    compositor: Compositor,
    input: Mutex<InputState>,
    decorators: DecoratorRegistry,
    decorator_name: RwLock<String>,
    settings: Arc<dyn SettingsStore>,
    sink: Arc<dyn ClientSink>,
    backoff: LockBackoff,
    cursor: Arc<CursorSlot>,
    /// Screen area to recomposite on the next frame.
    damage: Mutex<ClipRegion>,
}

impl Desktop {
    pub fn new(config: CompositorConfig, services: DesktopServices) -> Self {
        let screen = config.desktop.screen();
        let stack_tile = StackAndTile::new(config.stack_tile.clone(), screen);
        let workspaces = WorkspaceManager::new(config.desktop.workspaces);
        let cursor = Arc::new(CursorSlot::new());
        let router = EventRouter::new(
            config.input.double_click_us(),
            config.input.double_click_distance,
            Arc::clone(&cursor),
        );
        let compositor = Compositor::new(
            &config.render,
            screen,
            services.allocator,
            services.display,
            services.fonts,
        );
        log::info!(
            "Desktop {}x{} with {} workspaces, decorator '{}'",
            screen.width(),
            screen.height(),
            workspaces.count(),
            config.desktop.decorator
        );
        Self {
            state: GeometryLock::new(DesktopState::new(screen, stack_tile, workspaces), config.desktop.lock_budget()),
            clip: ClipEngine::new(Arc::new(RegionPool::new(config.desktop.region_pool_capacity))),
            compositor,
            input: Mutex::new(InputState { router, behaviours: HashMap::new(), active: None }),
            decorators: services.decorators,
            decorator_name: RwLock::new(config.desktop.decorator.clone()),
            settings: services.settings,
            sink: services.sink,
            backoff: LockBackoff::new(config.desktop.lock_attempts),
            cursor,
            damage: Mutex::new(ClipRegion::from_rect(screen)),
            config,
        }
    }

    /// Desktop with headless services.
    pub fn headless(config: CompositorConfig) -> Self {
        let services = DesktopServices::headless(&config);
        Self::new(config, services)
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Read access to the geometry.
    pub fn read(&self) -> RwLockReadGuard<'_, DesktopState> {
        self.state.read()
    }

    pub fn clip(&self) -> &ClipEngine {
        &self.clip
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn cursor(&self) -> &Arc<CursorSlot> {
        &self.cursor
    }

    pub fn backoff(&self) -> &LockBackoff {
        &self.backoff
    }

    pub fn decorator_name(&self) -> String {
        self.decorator_name.read().clone()
    }

    pub fn metrics(&self) -> FrameMetrics {
        self.compositor.metrics()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn window_count(&self) -> usize {
        self.state.read().windows.len()
    }

    pub fn frame(&self, window: WindowId) -> Result<Rect> {
        Ok(self.state.read().window(window)?.frame)
    }

    pub fn outer_frame(&self, window: WindowId) -> Result<Rect> {
        self.state.read().outer_frame(window).ok_or(CompositorError::UnknownWindow(window))
    }

    /// Limits currently in force.
    pub fn limits(&self, window: WindowId) -> Result<SizeLimits> {
        Ok(self.state.read().window(window)?.limits)
    }

    /// Windows sharing a stack with `window`, in tab order.
    pub fn stack_members(&self, window: WindowId) -> Result<Vec<WindowId>> {
        let state = self.state.read();
        state.window(window)?;
        Ok(state.stack_of(window).map(|s| s.windows().to_vec()).unwrap_or_default())
    }

    pub fn is_shown(&self, window: WindowId) -> bool {
        self.state.read().is_window_shown(window)
    }

    pub fn group_of(&self, window: WindowId) -> Option<GroupId> {
        self.state.read().stack_tile.group_of(window)
    }

    pub fn focus(&self) -> Option<WindowId> {
        self.input.lock().router.focus()
    }

    /// Shown windows back to front.
    pub fn shown_windows(&self) -> Vec<WindowId> {
        self.state.read().shown_windows()
    }

    pub fn visible_region(&self, window: WindowId) -> Result<ClipRegion> {
        let state = self.state.read();
        state.window(window)?;
        let region = self.clip.compute_visible_region(&*state, ClipNode::Window(window))?;
        Ok((*region).clone())
    }

    /// Screen pixels a view may draw into.
    pub fn view_region(&self, view: ViewId) -> Result<ClipRegion> {
        let state = self.state.read();
        state.views.get(view).ok_or(CompositorError::UnknownView)?;
        let region = self.clip.compute_visible_region(&*state, ClipNode::View(view))?;
        Ok((*region).clone())
    }

    // ========================================================================
    // Lock plumbing
    // ========================================================================

    fn mutate<T>(&self, mut op: impl FnMut(&mut DesktopState) -> Result<T>) -> Result<T> {
        self.backoff.run(|| {
            let mut state = self.state.write()?;
            op(&mut *state)
        })
    }

    fn mutate_with_input<T>(&self, mut op: impl FnMut(&mut InputState, &mut DesktopState) -> Result<T>) -> Result<T> {
        let mut input = self.input.lock();
        self.backoff.run(|| {
            let mut state = self.state.write()?;
            op(&mut *input, &mut *state)
        })
    }

    fn deliver(&self, window: WindowId, message: ClientMessage) {
        self.sink.deliver(window, message);
    }

    /// `area` changed on screen: cached regions touching it are stale and it
    /// must be recomposited.
    fn invalidate_area(&self, area: Rect) {
        self.clip.invalidate_area(area);
        self.damage.lock().include(area);
    }

    /// Redraw the chrome of `window`'s stack.
    fn redraw_chrome(&self, state: &DesktopState, window: WindowId) {
        let Some(stack) = state.stack_of(window) else {
            return;
        };
        if let (Some(front), Some(outer)) = (stack.front(), state.outer_frame(window)) {
            self.compositor.invalidate(front, outer);
            self.damage.lock().include(outer);
        }
    }

    // ========================================================================
    // Window lifecycle
    // ========================================================================

    fn new_decorator(&self, window: &Window) -> Box<dyn Decorator> {
        let mut decorator = self.decorators.create(&self.decorator_name.read());
        decorator.set_look(window.look, window.flags);
        decorator.add_tab(window.id, &window.title, 0);
        decorator.set_frame(window.frame);
        decorator
    }

    pub fn create_window(&self, spec: WindowSpec) -> Result<WindowId> {
        if !spec.frame.is_valid() || spec.frame.is_empty() {
            return Err(CompositorError::InvalidGeometry(format!("window frame {} is empty", spec.frame)));
        }
        if !spec.limits.is_satisfiable() {
            return Err(CompositorError::InvalidGeometry(format!(
                "size limits {:?} leave no valid size",
                spec.limits
            )));
        }
        let size = spec.limits.clamp(spec.frame.size());
        let frame = spec.frame.with_size(size.width.min(MAX_EXTENT), size.height.min(MAX_EXTENT));
        let id = WindowId::next();

        self.mutate(|state| {
            let stack_id = StackId::next();
            let root_view = state.views.create_root(id, Rect::new(0, 0, frame.width(), frame.height()));
            let window = Window {
                id,
                title: spec.title.clone(),
                frame,
                look: spec.look,
                feel: spec.feel,
                flags: spec.flags,
                limits: spec.limits,
                saved_limits: None,
                stack: stack_id,
                root_view,
                workspaces: spec.workspaces.unwrap_or_else(|| state.workspaces.active_mask()),
                minimized: false,
                focus_view: None,
                zoom_restore: None,
            };
            let decorator = self.new_decorator(&window);
            let outer = decorator.outer_frame();
            if let Err(e) = self.compositor.attach(id, outer) {
                state.views.remove(root_view);
                return Err(e);
            }
            state.stacks.insert(stack_id, WindowStack::new(stack_id, id, decorator));
            state.insert_in_z_order(id, window.feel);
            state.windows.insert(id, window);
            self.invalidate_area(outer);
            Ok(())
        })?;
        log::info!("Created window {} '{}' at {}", id, spec.title, frame);
        Ok(id)
    }

    pub fn close_window(&self, window: WindowId) -> Result<()> {
        self.mutate_with_input(|input, state| self.close_locked(input, state, window))
    }

    fn close_locked(&self, input: &mut InputState, state: &mut DesktopState, id: WindowId) -> Result<()> {
        let outer = state.outer_frame(id).ok_or(CompositorError::UnknownWindow(id))?;
        if let Some(mut behaviour) = input.behaviours.remove(&id) {
            behaviour.cancel();
        }
        input.router.window_removed(id);

        let change = match state.stack_tile.remove_window(id) {
            Ok(change) => change,
            Err(e) => {
                log::warn!("Dropping {} from its group failed: {}", id, e);
                LayoutChange::default()
            }
        };
        self.leave_stack(state, id);
        self.apply_layout(state, &change, id);

        let root = state.window(id)?.root_view;
        let removed = state.views.remove(root);
        self.clip.forget_views(&removed);
        self.clip.invalidate_window(id);
        state.z_order.retain(|w| *w != id);
        state.workspaces.window_removed(id);
        state.windows.remove(&id);
        self.compositor.detach(id);
        self.invalidate_area(outer);
        self.deliver(id, ClientMessage::Closed);
        log::info!("Closed window {}", id);

        if input.active == Some(id) {
            input.active = None;
            let next = input.router.focus_stack().most_recent(|w| {
                state.is_window_shown(w) && state.windows.get(&w).map_or(false, |x| x.is_activatable())
            });
            if let Some(next) = next {
                self.activate_locked(input, state, next)?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Stacks
    // ========================================================================

    /// Take `id` out of its window stack. The stack is dropped if empty,
    /// otherwise the new front window is redrawn.
    fn leave_stack(&self, state: &mut DesktopState, id: WindowId) {
        let Some(stack_id) = state.windows.get(&id).map(|w| w.stack) else {
            return;
        };
        let Some(stack) = state.stacks.get_mut(&stack_id) else {
            return;
        };
        let was_front = stack.is_front(id);
        if let Some(tab) = stack.decorator().tab_index(id) {
            stack.decorator_mut().remove_tab(tab);
        }
        stack.remove_window(id);
        if stack.is_empty() {
            state.stacks.remove(&stack_id);
            return;
        }
        let front_index = stack.front_index();
        stack.decorator_mut().set_front_tab(front_index);
        if let Some(front) = stack.front() {
            let pos = state.z_order.iter().position(|w| *w == id).filter(|_| was_front);
            if let Some(pos) = pos {
                // The new front takes the leaving window's place in z-order.
                state.z_order.retain(|w| *w != front);
                let pos = pos.min(state.z_order.len());
                state.z_order.insert(pos, front);
            }
            self.compositor.invalidate_window(front);
        }
    }

    /// Give `id` a window stack of its own.
    fn split_out(&self, state: &mut DesktopState, id: WindowId) {
        if state.stack_of(id).map_or(true, |s| s.len() <= 1) {
            return;
        }
        let outer = state.outer_frame(id);
        self.leave_stack(state, id);
        let Some(window) = state.windows.get(&id) else {
            return;
        };
        let decorator = self.new_decorator(window);
        let stack_id = StackId::next();
        let new_outer = decorator.outer_frame();
        state.stacks.insert(stack_id, WindowStack::new(stack_id, id, decorator));
        if let Some(w) = state.windows.get_mut(&id) {
            w.stack = stack_id;
        }
        state.raise(id);
        if let Err(e) = self.compositor.relayout(id, new_outer) {
            log::warn!("Relayout of {} failed: {}", id, e);
        }
        self.compositor.invalidate_window(id);
        if let Some(outer) = outer {
            self.invalidate_area(outer);
        }
        log::debug!("{} left its window stack", id);
    }

    /// Move `id` into window stack `stack_id` at tab `index`.
    fn join_stack(&self, state: &mut DesktopState, id: WindowId, stack_id: StackId, index: usize) {
        if state.windows.get(&id).map(|w| w.stack) == Some(stack_id) {
            return;
        }
        let old_outer = state.outer_frame(id);
        self.leave_stack(state, id);
        let title = state.windows.get(&id).map(|w| w.title.clone()).unwrap_or_default();
        let Some(stack) = state.stacks.get_mut(&stack_id) else {
            return;
        };
        let index = stack.add_window(id, index);
        stack.decorator_mut().add_tab(id, &title, index);
        let front_index = stack.front_index();
        stack.decorator_mut().set_front_tab(front_index);
        if let Some(w) = state.windows.get_mut(&id) {
            w.stack = stack_id;
        }
        if let Some(outer) = state.outer_frame(id) {
            if let Err(e) = self.compositor.relayout(id, outer) {
                log::warn!("Relayout of {} failed: {}", id, e);
            }
            self.redraw_chrome(state, id);
        }
        if let Some(outer) = old_outer {
            self.invalidate_area(outer);
        }
    }

    /// Make the window stack of `id` hold exactly the windows sharing its
    /// Stack & Tile area, in area order.
    fn reconcile_stack(&self, state: &mut DesktopState, id: WindowId) {
        if !state.windows.contains_key(&id) {
            return;
        }
        let mut desired = state.stack_tile.stack_of(id);
        if desired.is_empty() {
            desired.push(id);
        }
        let members: Vec<WindowId> = state.stack_of(id).map(|s| s.windows().to_vec()).unwrap_or_default();
        for m in members.iter().filter(|m| !desired.contains(m)) {
            self.split_out(state, *m);
        }
        let Some(stack_id) = state.windows.get(&id).map(|w| w.stack) else {
            return;
        };
        for (index, d) in desired.iter().enumerate() {
            if *d != id && state.windows.contains_key(d) {
                self.join_stack(state, *d, stack_id, index);
            }
        }
    }

    fn set_front_locked(&self, state: &mut DesktopState, id: WindowId) -> Result<bool> {
        let old_front = state.stack_of(id).and_then(|s| s.front());
        if old_front == Some(id) {
            return Ok(false);
        }
        let stack = state.stack_of_mut(id).ok_or(CompositorError::UnknownWindow(id))?;
        stack.set_front(id);
        let index = stack.front_index();
        stack.decorator_mut().set_front_tab(index);
        if let Some(old) = old_front {
            let a = state.z_order.iter().position(|w| *w == old);
            let b = state.z_order.iter().position(|w| *w == id);
            if let (Some(a), Some(b)) = (a, b) {
                state.z_order.swap(a, b);
            }
        }
        if let Some(outer) = state.outer_frame(id) {
            self.invalidate_area(outer);
        }
        self.compositor.invalidate_window(id);
        log::debug!("{} is now the front window of its stack", id);
        Ok(true)
    }

    /// Bring `window` to the front of its stack. The stack's frame does not
    /// change.
    pub fn set_front_window(&self, window: WindowId) -> Result<bool> {
        self.mutate(|state| self.set_front_locked(state, window))
    }

    // ========================================================================
    // Geometry
    // ========================================================================

    /// Apply a Stack & Tile result: released windows get their own limits
    /// back, window stacks are brought in line with the areas, group limits
    /// are installed, then frames move. `origin` is the window the operation
    /// was about.
    fn apply_layout(&self, state: &mut DesktopState, change: &LayoutChange, origin: WindowId) {
        for w in &change.released {
            if let Some(window) = state.windows.get_mut(w) {
                if let Some(own) = window.saved_limits.take() {
                    window.limits = own;
                    self.deliver(*w, ClientMessage::LimitsChanged(own));
                }
            }
        }
        let mut touched: Vec<WindowId> = vec![origin];
        touched.extend(change.released.iter().copied());
        touched.extend(change.frames.iter().map(|(w, _)| *w));
        touched.dedup();
        for w in touched {
            self.reconcile_stack(state, w);
        }

        for (w, outer) in &change.limits {
            let insets = state.insets_of(*w);
            if let Some(window) = state.windows.get_mut(w) {
                if window.saved_limits.is_none() {
                    window.saved_limits = Some(window.limits);
                }
                let limits = content_limits(*outer, insets);
                if window.limits != limits {
                    window.limits = limits;
                    self.deliver(*w, ClientMessage::LimitsChanged(limits));
                }
            }
        }
        for (w, outer) in &change.frames {
            let content = state.insets_of(*w).shrink(*outer);
            self.place_window(state, *w, content);
        }
    }

    /// Set the content frame of `id` without consulting Stack & Tile.
    fn place_window(&self, state: &mut DesktopState, id: WindowId, content: Rect) {
        let Some(old_outer) = state.outer_frame(id) else {
            return;
        };
        let Some(window) = state.windows.get_mut(&id) else {
            return;
        };
        if window.frame == content {
            return;
        }
        let old = window.frame;
        window.frame = content;
        let root = window.root_view;
        if let Some(view) = state.views.get_mut(root) {
            view.frame = Rect::new(0, 0, content.width(), content.height());
        }
        if let Some(stack) = state.stack_of_mut(id) {
            stack.decorator_mut().set_frame(content);
        }
        let Some(outer) = state.outer_frame(id) else {
            return;
        };
        if let Err(e) = self.compositor.relayout(id, outer) {
            log::warn!("Relayout of {} failed: {}", id, e);
        }
        self.clip.invalidate_window(id);
        self.invalidate_area(old_outer);
        self.invalidate_area(outer);
        log::trace!("{}: {} -> {}", id, old, content);
        self.deliver(id, ClientMessage::FrameChanged(content));
    }

    fn move_locked(&self, state: &mut DesktopState, id: WindowId, dx: i32, dy: i32) -> Result<()> {
        let frame = state.window(id)?.frame;
        if state.stack_tile.group_of(id).is_some() {
            let change = state.stack_tile.move_group(id, dx, dy);
            self.apply_layout(state, &change, id);
        } else {
            let mates: Vec<WindowId> = state.stack_of(id).map(|s| s.windows().to_vec()).unwrap_or_else(|| vec![id]);
            for w in mates {
                self.place_window(state, w, frame.offset_by(dx, dy));
            }
        }
        Ok(())
    }

    pub fn move_window_by(&self, window: WindowId, dx: i32, dy: i32) -> Result<()> {
        self.mutate(|state| self.move_locked(state, window, dx, dy))
    }

    /// Resize to content frame `requested`, honouring limits. Grouped windows
    /// go through Stack & Tile.
    fn resize_locked(&self, state: &mut DesktopState, id: WindowId, requested: Rect) -> Result<Rect> {
        let window = state.window(id)?;
        if !requested.is_valid() || requested.is_empty() {
            return Err(CompositorError::InvalidGeometry(format!("frame {} is empty", requested)));
        }
        let size = window.limits.clamp(requested.size());
        let frame = requested.with_size(size.width, size.height);
        if state.stack_tile.group_of(id).is_some() {
            let outer = state.insets_of(id).expand(frame);
            let change = state.stack_tile.resize_window(id, outer)?;
            self.apply_layout(state, &change, id);
        } else {
            let mates: Vec<WindowId> = state.stack_of(id).map(|s| s.windows().to_vec()).unwrap_or_else(|| vec![id]);
            for w in mates {
                self.place_window(state, w, frame);
            }
        }
        Ok(state.window(id)?.frame)
    }

    /// Resize the content to `width` x `height`, keeping the top-left corner.
    pub fn resize_window(&self, window: WindowId, width: i32, height: i32) -> Result<Rect> {
        self.mutate(|state| {
            let frame = state.window(window)?.frame;
            self.resize_locked(state, window, frame.with_size(width, height))
        })
    }

    /// A client asks for a new content frame.
    pub fn submit_geometry_change(&self, window: WindowId, requested: Rect) -> Result<GeometryChange> {
        self.mutate(|state| {
            let current = state.window(window)?;
            if !requested.is_valid() || requested.is_empty() {
                return Ok(GeometryChange::Rejected(format!("frame {} is empty", requested)));
            }
            if !current.limits.contains(requested.size()) {
                return Ok(GeometryChange::Rejected(format!(
                    "size {}x{} is outside the size limits",
                    requested.width(),
                    requested.height()
                )));
            }
            let frame = current.frame;
            if requested.size() != frame.size() {
                let sized = frame.with_size(requested.width(), requested.height());
                match self.resize_locked(state, window, sized) {
                    Ok(_) => {}
                    Err(CompositorError::GeometryInfeasible(reason)) => {
                        log::debug!("{}: geometry change rejected: {}", window, reason);
                        return Ok(GeometryChange::Rejected(reason));
                    }
                    Err(e) => return Err(e),
                }
            }
            let now = state.window(window)?.frame;
            let (dx, dy) = (requested.left - now.left, requested.top - now.top);
            if dx != 0 || dy != 0 {
                self.move_locked(state, window, dx, dy)?;
            }
            Ok(GeometryChange::Accepted(state.window(window)?.frame))
        })
    }

    /// A window's own size limits changed.
    pub fn set_size_limits(&self, window: WindowId, limits: SizeLimits) -> Result<()> {
        if !limits.is_satisfiable() {
            return Err(CompositorError::InvalidGeometry(format!("size limits {:?} leave no valid size", limits)));
        }
        self.mutate(|state| {
            let insets = state.insets_of(window);
            if state.stack_tile.group_of(window).is_some() {
                let change = state.stack_tile.set_window_limits(window, outer_limits(limits, insets))?;
                let w = state.window_mut(window)?;
                w.saved_limits = Some(limits);
                self.apply_layout(state, &change, window);
            } else {
                let w = state.window_mut(window)?;
                w.limits = limits;
                let frame = w.frame;
                let size = limits.clamp(frame.size());
                self.place_window(state, window, frame.with_size(size.width, size.height));
            }
            self.deliver(window, ClientMessage::LimitsChanged(limits));
            Ok(())
        })
    }

    fn zoom_locked(&self, state: &mut DesktopState, id: WindowId) -> Result<bool> {
        if state.stack_tile.group_of(id).is_some() {
            log::debug!("{} is grouped; zoom ignored", id);
            return Ok(false);
        }
        let insets = state.insets_of(id);
        let screen = state.screen;
        let window = state.window_mut(id)?;
        let target = match window.zoom_restore.take() {
            Some(restore) => restore,
            None => {
                window.zoom_restore = Some(window.frame);
                let content = insets.shrink(screen);
                let size = window.limits.clamp(content.size());
                content.with_size(size.width, size.height)
            }
        };
        let mates: Vec<WindowId> = state.stack_of(id).map(|s| s.windows().to_vec()).unwrap_or_else(|| vec![id]);
        for w in mates {
            self.place_window(state, w, target);
        }
        log::debug!("Zoomed {} to {}", id, target);
        Ok(true)
    }

    /// Toggle between the zoomed (screen filling) frame and the frame before.
    pub fn zoom_window(&self, window: WindowId) -> Result<bool> {
        self.mutate(|state| self.zoom_locked(state, window))
    }

    pub fn set_title(&self, window: WindowId, title: &str) -> Result<()> {
        self.mutate(|state| {
            state.window_mut(window)?.title = title.to_string();
            if let Some(stack) = state.stack_of_mut(window) {
                if let Some(tab) = stack.decorator().tab_index(window) {
                    stack.decorator_mut().set_tab_title(tab, title);
                }
            }
            self.redraw_chrome(state, window);
            Ok(())
        })
    }

    /// Change the screen bounds. Drags in progress are cancelled and groups
    /// are pushed back on screen.
    pub fn set_screen_frame(&self, screen: Rect) -> Result<()> {
        if !screen.is_valid() || screen.is_empty() {
            return Err(CompositorError::InvalidGeometry(format!("screen {} is empty", screen)));
        }
        self.mutate_with_input(|input, state| {
            let reverts: Vec<(WindowId, Vec<BehaviourAction>)> = input
                .behaviours
                .iter_mut()
                .filter(|(_, b)| b.is_active())
                .map(|(w, b)| (*w, b.cancel()))
                .collect();
            input.router.cancel_captures();
            for (w, actions) in reverts {
                self.apply_actions(input, state, w, actions);
            }

            state.screen = screen;
            let change = state.stack_tile.set_screen(screen);
            if let Some(w) = change.frames.first().map(|(w, _)| *w) {
                self.apply_layout(state, &change, w);
            }
            let loose: Vec<WindowId> = state
                .windows
                .keys()
                .copied()
                .filter(|w| state.stack_tile.group_of(*w).is_none())
                .collect();
            for w in loose {
                let Some(outer) = state.outer_frame(w) else {
                    continue;
                };
                if !outer.intersects(&screen) {
                    let dx = (screen.right - outer.right).min(0) + (screen.left - outer.left).max(0);
                    let dy = (screen.bottom - outer.bottom).min(0) + (screen.top - outer.top).max(0);
                    self.move_locked(state, w, dx, dy)?;
                }
            }
            self.compositor.resize_screen(screen);
            self.clip.invalidate_all();
            *self.damage.lock() = ClipRegion::from_rect(screen);
            log::info!("Screen is now {}", screen);
            Ok(())
        })
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// Add a view under `parent`, or under the window's root view.
    pub fn add_view(&self, window: WindowId, parent: Option<ViewId>, name: &str, frame: Rect) -> Result<ViewId> {
        self.mutate(|state| {
            let w = state.window(window)?;
            let content = w.frame;
            let parent = parent.unwrap_or(w.root_view);
            if state.views.get(parent).map(|v| v.window()) != Some(window) {
                return Err(CompositorError::UnknownView);
            }
            let view = state.views.add_child(parent, name, frame)?;
            self.clip.invalidate_view(&state.views, view);
            if let Some(screen_frame) = state.views.screen_frame(view, content.origin()) {
                self.compositor.invalidate(window, screen_frame);
                self.damage.lock().include(screen_frame);
            }
            Ok(view)
        })
    }

    pub fn remove_view(&self, view: ViewId) -> Result<()> {
        self.mutate_with_input(|input, state| {
            let node = state.views.get(view).ok_or(CompositorError::UnknownView)?;
            let ViewParent::View(_) = node.parent() else {
                return Err(CompositorError::InvalidGeometry("the root view cannot be removed".to_string()));
            };
            let window = node.window();
            let content = state.window(window)?.frame;
            let area = state.views.screen_frame(view, content.origin());
            self.clip.invalidate_view(&state.views, view);
            let removed = state.views.remove(view);
            self.clip.forget_views(&removed);
            self.compositor.forget_views(window, &removed);
            input.router.views_removed(&removed);
            if let Some(w) = state.windows.get_mut(&window) {
                if w.focus_view.map_or(false, |f| removed.contains(&f)) {
                    w.focus_view = None;
                }
            }
            if let Some(area) = area {
                self.compositor.invalidate(window, area);
                self.damage.lock().include(area);
            }
            Ok(())
        })
    }

    /// Move or resize a view; `frame` is in its parent's coordinates.
    pub fn set_view_frame(&self, view: ViewId, frame: Rect) -> Result<()> {
        if !frame.is_valid() {
            return Err(CompositorError::InvalidGeometry(format!("view frame {:?} has negative area", frame)));
        }
        self.mutate(|state| {
            let window = state.views.get(view).ok_or(CompositorError::UnknownView)?.window();
            let content = state.window(window)?.frame;
            let old = state.views.screen_frame(view, content.origin());
            self.clip.invalidate_view(&state.views, view);
            if let Some(v) = state.views.get_mut(view) {
                v.frame = frame;
            }
            self.clip.invalidate_view(&state.views, view);
            let new = state.views.screen_frame(view, content.origin());
            for area in [old, new].into_iter().flatten() {
                self.compositor.invalidate(window, area);
                self.damage.lock().include(area);
            }
            Ok(())
        })
    }

    /// Hide or show a view with its subtree. Hidden views draw nothing, get
    /// no pointer events and stop clipping the siblings below them.
    pub fn set_view_hidden(&self, view: ViewId, hidden: bool) -> Result<()> {
        self.mutate_with_input(|input, state| {
            let node = state.views.get(view).ok_or(CompositorError::UnknownView)?;
            if node.hidden == hidden {
                return Ok(());
            }
            let window = node.window();
            let content = state.window(window)?.frame;
            if let Some(v) = state.views.get_mut(view) {
                v.hidden = hidden;
            }
            self.clip.invalidate_view(&state.views, view);
            if hidden {
                let subtree = state.views.subtree(view);
                input.router.views_removed(&subtree);
                if let Some(w) = state.windows.get_mut(&window) {
                    if w.focus_view.map_or(false, |f| subtree.contains(&f)) {
                        w.focus_view = None;
                    }
                }
            }
            if let Some(area) = state.views.screen_frame(view, content.origin()) {
                self.compositor.invalidate(window, area);
                self.damage.lock().include(area);
            }
            log::debug!("View {:?} of {} {}", view, window, if hidden { "hidden" } else { "shown" });
            Ok(())
        })
    }

    pub fn set_focus_view(&self, window: WindowId, view: Option<ViewId>) -> Result<()> {
        self.mutate(|state| {
            if let Some(v) = view {
                if state.views.get(v).map(|x| x.window()) != Some(window) {
                    return Err(CompositorError::UnknownView);
                }
            }
            state.window_mut(window)?.focus_view = view;
            Ok(())
        })
    }

    // ========================================================================
    // Drawing
    // ========================================================================

    /// Queue a client draw batch; it shows after `commit_updates`.
    pub fn submit_draw_batch(&self, window: WindowId, batch: DrawBatch) -> Result<()> {
        let state = self.state.read();
        let content = state.window(window)?.frame;
        let area = match batch.view {
            Some(view) => {
                if state.views.get(view).map(|v| v.window()) != Some(window) {
                    return Err(CompositorError::UnknownView);
                }
                state.views.screen_frame(view, content.origin()).ok_or(CompositorError::UnknownView)?
            }
            None => content,
        };
        let area = area.intersection(&content).unwrap_or(Rect::EMPTY);
        self.compositor.submit(window, batch, area)
    }

    /// Publish everything submitted since the last commit.
    pub fn commit_updates(&self, window: WindowId) -> Result<bool> {
        let committed = self.compositor.commit(window)?;
        if committed {
            log::trace!("Committed drawing of {}", window);
        }
        Ok(committed)
    }

    /// Draw every dirty shown window, assemble the damaged screen area and
    /// present it. Windows whose geometry is found corrupt are force-closed.
    pub fn render_frame(&self) -> Result<FrameReport> {
        let mut report = FrameReport::default();
        let mut broken: Vec<(WindowId, String)> = Vec::new();
        {
            let state = self.state.read();
            let mut jobs = Vec::new();
            for id in state.shown_windows() {
                let visible = match self.clip.compute_visible_region(&*state, ClipNode::Window(id)) {
                    Ok(region) => region,
                    Err(e) => {
                        broken.push((id, e.to_string()));
                        continue;
                    }
                };
                let (Ok(window), Some(outer)) = (state.window(id), state.outer_frame(id)) else {
                    continue;
                };
                let content = window.frame;
                let exposed = self.compositor.expose(id, &visible, content);
                if !exposed.is_empty() {
                    self.deliver(id, ClientMessage::UpdateRequest { rects: exposed });
                    report.update_requests.push(id);
                }
                let views = state
                    .views
                    .subtree(window.root_view)
                    .into_iter()
                    .filter(|v| !state.views.is_hidden(*v))
                    .filter_map(|v| state.views.screen_frame(v, content.origin()).map(|f| (v, f)))
                    .collect();
                jobs.push(RenderJob {
                    window: id,
                    outer,
                    content,
                    decorator: state.decorator_of(id),
                    views,
                    visible,
                });
            }

            let rendered = self.compositor.render(&jobs);
            let mut damage = std::mem::take(&mut *self.damage.lock());
            for job in jobs.iter().filter(|j| rendered.rendered.contains(&j.window)) {
                damage.include_region(&job.visible);
            }
            damage.intersect_rect(state.screen);
            self.compositor.composite(&jobs, &damage);
            report.presented = self.compositor.flush_present();
            report.rendered = rendered.rendered;
            broken.extend(rendered.corrupted);
        }

        for (id, reason) in broken {
            log::error!("Force-closing {}: {}", id, reason);
            match self.close_window(id) {
                Ok(()) => report.closed.push(id),
                Err(e) => log::error!("Could not close {}: {}", id, e),
            }
        }
        Ok(report)
    }

    // ========================================================================
    // Activation, minimizing, workspaces
    // ========================================================================

    fn activate_locked(&self, input: &mut InputState, state: &mut DesktopState, id: WindowId) -> Result<()> {
        let active_workspace = state.workspaces.active();
        let window = state.window_mut(id)?;
        if window.minimized {
            window.minimized = false;
            self.deliver(id, ClientMessage::Minimized(false));
        }
        if !window.on_workspace(active_workspace) {
            let target = window.workspaces.trailing_zeros();
            state.workspaces.switch_to(target);
            self.clip.invalidate_all();
            self.damage.lock().include(state.screen);
        }
        if !state.is_window_shown(id) {
            self.set_front_locked(state, id)?;
        }

        let previous = input.active;
        if previous != Some(id) {
            if let Some(old) = previous.filter(|w| state.windows.contains_key(w)) {
                if let Some(stack) = state.stack_of_mut(old) {
                    stack.decorator_mut().set_focused(false);
                }
                self.redraw_chrome(state, old);
                self.deliver(old, ClientMessage::Activated(false));
            }
        }
        state.raise(id);
        if let Some(stack) = state.stack_of_mut(id) {
            stack.decorator_mut().set_focused(true);
        }
        if let Some(outer) = state.outer_frame(id) {
            self.invalidate_area(outer);
        }
        self.redraw_chrome(state, id);
        if input.router.focus() != Some(id) {
            input.router.set_focus(Some(id));
        }
        input.active = Some(id);
        state.workspaces.remember_focus(Some(id));
        if previous != Some(id) {
            self.deliver(id, ClientMessage::Activated(true));
            log::debug!("Activated {}", id);
        }
        Ok(())
    }

    /// Raise, un-minimize and focus `window`.
    pub fn activate_window(&self, window: WindowId) -> Result<()> {
        self.mutate_with_input(|input, state| self.activate_locked(input, state, window))
    }

    fn minimize_locked(&self, input: &mut InputState, state: &mut DesktopState, id: WindowId, minimize: bool) -> Result<()> {
        let outer = state.outer_frame(id).ok_or(CompositorError::UnknownWindow(id))?;
        let window = state.window_mut(id)?;
        if window.minimized == minimize {
            return Ok(());
        }
        window.minimized = minimize;
        self.invalidate_area(outer);
        self.deliver(id, ClientMessage::Minimized(minimize));
        log::debug!("{} {}", id, if minimize { "minimized" } else { "restored" });
        if minimize && input.active == Some(id) {
            input.active = None;
            input.router.set_focus(None);
            let next = input.router.focus_stack().most_recent(|w| {
                w != id && state.is_window_shown(w) && state.windows.get(&w).map_or(false, |x| x.is_activatable())
            });
            if let Some(next) = next {
                self.activate_locked(input, state, next)?;
            }
        }
        Ok(())
    }

    pub fn minimize_window(&self, window: WindowId, minimize: bool) -> Result<()> {
        self.mutate_with_input(|input, state| self.minimize_locked(input, state, window, minimize))
    }

    /// Switch workspaces. Returns false if already there or out of range.
    pub fn set_workspace(&self, index: u32) -> Result<bool> {
        self.mutate_with_input(|input, state| {
            state.workspaces.remember_focus(input.active);
            if !state.workspaces.switch_to(index) {
                return Ok(false);
            }
            self.clip.invalidate_all();
            self.damage.lock().include(state.screen);
            input.router.cancel_captures();
            let remembered = state
                .workspaces
                .active_workspace()
                .focused_window
                .filter(|w| state.is_window_shown(*w));
            match remembered {
                Some(w) => self.activate_locked(input, state, w)?,
                None => {
                    input.active = None;
                    input.router.set_focus(None);
                }
            }
            Ok(true)
        })
    }

    /// Set the workspaces `window` (and its stack mates) appear on.
    pub fn move_to_workspace(&self, window: WindowId, mask: u32) -> Result<()> {
        self.mutate(|state| {
            let mask = mask & state.workspaces.all_mask();
            if mask == 0 {
                return Err(CompositorError::InvalidGeometry("workspace mask selects no workspace".to_string()));
            }
            state.window(window)?;
            let mates: Vec<WindowId> = state.stack_of(window).map(|s| s.windows().to_vec()).unwrap_or_else(|| vec![window]);
            for w in mates {
                if let Some(x) = state.windows.get_mut(&w) {
                    x.workspaces = mask;
                    self.deliver(w, ClientMessage::WorkspacesChanged(mask));
                }
            }
            if let Some(outer) = state.outer_frame(window) {
                self.invalidate_area(outer);
            }
            Ok(())
        })
    }

    /// Focus the next window in focus history.
    pub fn focus_next(&self) -> Result<Option<WindowId>> {
        self.cycle_focus(true)
    }

    pub fn focus_previous(&self) -> Result<Option<WindowId>> {
        self.cycle_focus(false)
    }

    fn cycle_focus(&self, forward: bool) -> Result<Option<WindowId>> {
        self.mutate_with_input(|input, state| {
            let eligible = |w: WindowId| {
                state.is_window_shown(w) && state.windows.get(&w).map_or(false, |x| x.is_activatable())
            };
            let next = if forward {
                input.router.focus_stack_mut().rotate_forward(eligible)
            } else {
                input.router.focus_stack_mut().rotate_backward(eligible)
            };
            let next = next.or_else(|| {
                state
                    .shown_windows()
                    .into_iter()
                    .find(|w| Some(*w) != input.active && eligible(*w))
            });
            if let Some(w) = next {
                self.activate_locked(input, state, w)?;
            }
            Ok(next)
        })
    }

    // ========================================================================
    // Stack & Tile
    // ========================================================================

    fn check_groupable(state: &DesktopState, window: WindowId) -> Result<()> {
        let w = state.window(window)?;
        if w.flags.contains(crate::window::WindowFlags::NO_STACK_AND_TILE) {
            return Err(CompositorError::InvalidGeometry(format!("{} does not stack or tile", window)));
        }
        Ok(())
    }

    fn stack_locked(&self, state: &mut DesktopState, dragged: WindowId, target: WindowId, index: usize) -> Result<()> {
        Self::check_groupable(state, dragged)?;
        Self::check_groupable(state, target)?;
        let mut geometry = state.geometry_of(dragged)?;
        let target_geometry = state.geometry_of(target)?;
        // The dragged window takes over the target's chrome.
        let insets = state.insets_of(target);
        geometry.limits = outer_limits(state.window(dragged)?.own_limits(), insets);
        let change = state.stack_tile.stack_window(geometry, target_geometry, index)?;
        self.apply_layout(state, &change, target);
        self.reconcile_stack(state, dragged);
        state.raise(target);
        Ok(())
    }

    /// Stack `dragged` onto `target` at tab `index`. The target stays in front.
    pub fn stack_windows(&self, dragged: WindowId, target: WindowId, index: usize) -> Result<()> {
        self.mutate(|state| self.stack_locked(state, dragged, target, index))
    }

    fn tile_locked(&self, state: &mut DesktopState, window: WindowId, target: WindowId) -> Result<()> {
        Self::check_groupable(state, window)?;
        Self::check_groupable(state, target)?;
        let geometry = state.geometry_of(window)?;
        let target_geometry = state.geometry_of(target)?;
        let change = state.stack_tile.tile_window(geometry, target_geometry)?;
        self.apply_layout(state, &change, window);
        self.reconcile_stack(state, window);
        state.raise(target);
        state.raise(window);
        Ok(())
    }

    /// Tile `window` next to `target`'s group.
    pub fn tile_window(&self, window: WindowId, target: WindowId) -> Result<()> {
        self.mutate(|state| self.tile_locked(state, window, target))
    }

    /// Take `window` out of its group; it keeps its frame and gets its own
    /// limits back.
    pub fn remove_from_group(&self, window: WindowId) -> Result<()> {
        self.mutate(|state| {
            state.window(window)?;
            let change = state.stack_tile.remove_window(window)?;
            self.split_out(state, window);
            self.apply_layout(state, &change, window);
            Ok(())
        })
    }

    /// A window was dropped with the stack-and-tile modifier at `at`: stack
    /// it when `at` is over another window's tabs, tile it otherwise.
    fn drop_locked(&self, state: &mut DesktopState, window: WindowId, at: Point) -> Result<()> {
        let own_stack = state.window(window)?.stack;
        let target = state
            .shown_windows()
            .into_iter()
            .rev()
            .filter(|w| state.windows.get(w).map(|x| x.stack) != Some(own_stack))
            .find(|w| state.outer_frame(*w).map_or(false, |f| f.contains(at)));
        let Some(target) = target else {
            return Ok(());
        };
        let over_tabs = state
            .decorator_of(target)
            .map(|d| (d.tab_bar_rect().contains(at), d.drop_index(at)));
        match over_tabs {
            Some((true, index)) => self.stack_locked(state, window, target, index),
            _ => self.tile_locked(state, window, target),
        }
    }

    // ========================================================================
    // Decorators and settings
    // ========================================================================

    /// Swap every stack's decorator for the named skin, keeping tabs and
    /// settings. Unknown or failing skins fall back to the built-in one.
    /// Returns the skin now in use.
    pub fn set_decorator(&self, name: &str) -> Result<String> {
        let effective = match self.decorators.try_create(name) {
            Ok(_) => name.to_string(),
            Err(e) => {
                log::warn!("{}; using built-in decorator", e);
                DEFAULT_DECORATOR.to_string()
            }
        };
        *self.decorator_name.write() = effective.clone();
        self.mutate(|state| {
            let ids: Vec<StackId> = state.stacks.keys().copied().collect();
            for id in ids {
                let Some(stack) = state.stacks.get_mut(&id) else {
                    continue;
                };
                let mut fresh = self.decorators.create(&effective);
                transfer_state(stack.decorator(), fresh.as_mut())?;
                stack.replace_decorator(fresh);
                let members = stack.windows().to_vec();
                let Some(first) = members.first().copied() else {
                    continue;
                };
                if state.stack_tile.group_of(first).is_some() {
                    // Grouped windows keep their outer frame.
                    let insets = state.insets_of(first);
                    if let Some(area) = state.stack_tile.area_frame_of(first) {
                        for w in &members {
                            self.place_window(state, *w, insets.shrink(area));
                        }
                    }
                    let own = state.window(first)?.own_limits();
                    let change = state.stack_tile.set_window_limits(first, outer_limits(own, insets))?;
                    self.apply_layout(state, &change, first);
                }
                for w in members {
                    if let Some(outer) = state.outer_frame(w) {
                        if let Err(e) = self.compositor.relayout(w, outer) {
                            log::warn!("Relayout of {} failed: {}", w, e);
                        }
                    }
                    self.compositor.invalidate_window(w);
                }
            }
            self.clip.invalidate_all();
            self.damage.lock().include(state.screen);
            log::info!("Decorator is now '{}'", effective);
            Ok(effective.clone())
        })
    }

    /// Persist the decorator skin, per-window decorator settings and the
    /// Stack & Tile groups.
    pub fn save_settings(&self) -> Result<()> {
        let state = self.state.read();
        self.settings.store(DECORATOR_KEY, self.decorator_name.read().as_bytes())?;
        for stack in state.stacks.values() {
            let blob = stack.decorator().archive_settings()?;
            for w in stack.windows() {
                if let Some(window) = state.windows.get(w) {
                    self.settings.store(&decorator_settings_key(&window.title), &blob)?;
                }
            }
        }
        let archives = state
            .stack_tile
            .archive(|w| state.windows.get(&w).map(|x| x.title.clone()));
        self.settings.store(GROUPS_KEY, &GroupArchive::to_blob(&archives)?)?;
        log::info!("Saved settings ({} groups)", archives.len());
        Ok(())
    }

    /// Load what `save_settings` stored. Groups are rebuilt around the
    /// windows whose titles match; returns the number of groups restored.
    pub fn restore_settings(&self) -> Result<usize> {
        if let Some(name) = self.settings.load(DECORATOR_KEY)? {
            let name = String::from_utf8(name).map_err(|e| CompositorError::Settings(e.to_string()))?;
            if name != *self.decorator_name.read() {
                self.set_decorator(&name)?;
            }
        }
        let archives = match self.settings.load(GROUPS_KEY)? {
            Some(blob) => GroupArchive::from_blob(&blob)?,
            None => Vec::new(),
        };
        self.mutate(|state| {
            let mut titles: Vec<(WindowId, String)> = state.windows.values().map(|w| (w.id, w.title.clone())).collect();
            titles.sort_by_key(|(id, _)| *id);
            for (id, title) in &titles {
                if let Some(blob) = self.settings.load(&decorator_settings_key(title))? {
                    if let Some(stack) = state.stack_of_mut(*id) {
                        if let Err(e) = stack.decorator_mut().restore_settings(&blob) {
                            log::warn!("Ignoring decorator settings of '{}': {}", title, e);
                        }
                    }
                }
            }
            let mut restored = 0;
            for archive in &archives {
                // Same-titled windows are handed out oldest first, one per mention.
                let mut by_title: HashMap<String, VecDeque<_>> = HashMap::new();
                for (id, title) in &titles {
                    if let Ok(g) = state.geometry_of(*id) {
                        by_title.entry(title.clone()).or_default().push_back(g);
                    }
                }
                match state.stack_tile.restore(archive, |title| by_title.get_mut(title).and_then(|q| q.pop_front())) {
                    Ok(change) if !change.is_empty() => {
                        let first = change.frames.first().map(|(w, _)| *w);
                        if let Some(first) = first {
                            self.apply_layout(state, &change, first);
                            restored += 1;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("Skipping archived group: {}", e),
                }
            }
            self.clip.invalidate_all();
            self.damage.lock().include(state.screen);
            Ok(restored)
        })
    }

    // ========================================================================
    // Input
    // ========================================================================

    /// Route one input event: crossings and activation first, then either
    /// the window's behaviour (chrome, management gestures) or the client.
    pub fn dispatch(&self, event: InputEvent) -> DispatchOutcome {
        let mut input = self.input.lock();
        let route = {
            let state = self.state.read();
            let scene = SceneView { state: &state, clip: &self.clip };
            input.router.route(&scene, event)
        };

        for crossing in &route.crossings {
            match *crossing {
                crate::input::Crossing::Entered { window, view } => {
                    self.deliver(window, ClientMessage::Entered { view })
                }
                crate::input::Crossing::Exited { window, view } => {
                    self.deliver(window, ClientMessage::Exited { view })
                }
            }
        }

        // The gesture ends where it is; there was no release to finish it.
        for window in &route.interrupted {
            if let Some(behaviour) = input.behaviours.get_mut(window) {
                behaviour.cancel();
            }
        }

        if let Some(window) = route.activate {
            let result = self.backoff.run(|| {
                let mut state = self.state.write()?;
                self.activate_locked(&mut *input, &mut *state, window)
            });
            if let Err(e) = result {
                log::warn!("Activation of {} failed: {}", window, e);
            }
        }

        if let Some(reason) = route.dropped {
            log::trace!("Dropped {:?}: {:?}", route.event.kind, reason);
            return DispatchOutcome::Dropped(reason);
        }
        let Some(target) = route.target else {
            return DispatchOutcome::Dropped(DropReason::NoTarget);
        };
        let event = route.event;

        if event.is_pointer() && self.feeds_behaviour(&input, target.window, route.area, &event) {
            let actions = {
                let state = self.state.read();
                let Some(ctx_parts) = behaviour_inputs(&state, target.window, event.position) else {
                    return DispatchOutcome::Dropped(DropReason::TargetGone(target.window));
                };
                let others = state.other_frames(target.window);
                let ctx = ctx_parts.context(&others);
                let snapping = &self.config.snapping;
                input
                    .behaviours
                    .entry(target.window)
                    .or_insert_with(|| DefaultWindowBehaviour::new(snapping))
                    .handle(&ctx, &event)
            };
            if !actions.is_empty() {
                let result = self.backoff.run(|| {
                    let mut state = self.state.write()?;
                    self.apply_actions(&mut *input, &mut *state, target.window, actions.clone());
                    Ok(())
                });
                if let Err(e) = result {
                    log::warn!("Behaviour actions for {} dropped: {}", target.window, e);
                }
            }
            return DispatchOutcome::Delivered { window: target.window, view: None };
        }

        {
            let state = self.state.read();
            let deliver_to = |window: WindowId, view: Option<ViewId>| {
                let local = local_point(&state, window, view, event.position);
                self.deliver(window, ClientMessage::Input { view, event, local });
            };
            deliver_to(target.window, target.view);
            for listener in &route.listeners {
                deliver_to(listener.window, listener.view);
            }
        }
        DispatchOutcome::Delivered { window: target.window, view: target.view }
    }

    fn feeds_behaviour(&self, input: &InputState, window: WindowId, area: HitArea, event: &InputEvent) -> bool {
        if matches!(area, HitArea::Decorator(_)) {
            return true;
        }
        if input.behaviours.get(&window).map_or(false, |b| b.is_active()) {
            return true;
        }
        matches!(event.kind, InputEventKind::MouseDown { .. }) && event.modifiers.contains(MANAGE_MODIFIERS)
    }

    fn apply_actions(&self, input: &mut InputState, state: &mut DesktopState, window: WindowId, actions: Vec<BehaviourAction>) {
        for action in actions {
            if !state.windows.contains_key(&window) {
                return;
            }
            let result = match action {
                BehaviourAction::MoveBy { dx, dy } => self.move_locked(state, window, dx, dy),
                BehaviourAction::ResizeBy { edge, dx, dy } => self.resize_edge_locked(state, window, edge, dx, dy),
                BehaviourAction::SetFrame(frame) => self.set_frame_locked(state, window, frame),
                BehaviourAction::Activate => self.activate_locked(input, state, window),
                BehaviourAction::Close => self.close_locked(input, state, window),
                BehaviourAction::Zoom => self.zoom_locked(state, window).map(|_| ()),
                BehaviourAction::Minimize => self.minimize_locked(input, state, window, true),
                BehaviourAction::SetTabLocation(location) => {
                    if let Some(stack) = state.stack_of_mut(window) {
                        stack.decorator_mut().set_tab_location(location);
                    }
                    self.redraw_chrome(state, window);
                    Ok(())
                }
                BehaviourAction::SetFrontTab(index) => {
                    match state.stack_of(window).and_then(|s| s.windows().get(index).copied()) {
                        Some(w) => self.set_front_locked(state, w).map(|_| ()),
                        None => Ok(()),
                    }
                }
                BehaviourAction::DropForStackAndTile { at } => self.drop_locked(state, window, at),
            };
            if let Err(e) = result {
                log::warn!("{:?} on {} failed: {}", action, window, e);
            }
        }
    }

    fn resize_edge_locked(&self, state: &mut DesktopState, id: WindowId, edge: ResizeEdge, dx: i32, dy: i32) -> Result<()> {
        let outer = state.outer_frame(id).ok_or(CompositorError::UnknownWindow(id))?;
        let insets = state.insets_of(id);
        let requested = insets.shrink(edge.apply(outer, dx, dy));
        if requested.is_empty() {
            return Ok(());
        }
        let limits = state.window(id)?.limits;
        let size = limits.clamp(requested.size());
        let left = if edge.moves_left() { requested.right - size.width } else { requested.left };
        let top = if edge.moves_top() { requested.bottom - size.height } else { requested.top };
        self.resize_locked(state, id, Rect::new(left, top, size.width, size.height))?;
        Ok(())
    }

    fn set_frame_locked(&self, state: &mut DesktopState, id: WindowId, frame: Rect) -> Result<()> {
        let current = state.window(id)?.frame;
        if frame.size() != current.size() {
            self.resize_locked(state, id, current.with_size(frame.width(), frame.height()))?;
        }
        let now = state.window(id)?.frame;
        if now.origin() != frame.origin() {
            self.move_locked(state, id, frame.left - now.left, frame.top - now.top)?;
        }
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Position of `p` in the coordinates of `view` (or of the content area).
fn local_point(state: &DesktopState, window: WindowId, view: Option<ViewId>, p: Point) -> Point {
    let Some(content) = state.windows.get(&window).map(|w| w.frame) else {
        return p;
    };
    let origin = view
        .and_then(|v| state.views.screen_origin(v, content.origin()))
        .unwrap_or(content.origin());
    Point::new(p.x - origin.x, p.y - origin.y)
}

/// Everything but the neighbour frames a behaviour needs, copied out of the
/// state.
struct BehaviourInputs {
    window: WindowId,
    content: Rect,
    frame: Rect,
    flags: crate::window::WindowFlags,
    hit: HitRegion,
    tab_location: f32,
    screen: Rect,
}

impl BehaviourInputs {
    fn context<'a>(&self, others: &'a [Rect]) -> BehaviourContext<'a> {
        BehaviourContext {
            window: self.window,
            content: self.content,
            frame: self.frame,
            flags: self.flags,
            hit: self.hit,
            tab_location: self.tab_location,
            screen: self.screen,
            others,
        }
    }
}

fn behaviour_inputs(state: &DesktopState, id: WindowId, p: Point) -> Option<BehaviourInputs> {
    let window = state.windows.get(&id)?;
    let decorator = state.decorator_of(id);
    let hit = if window.frame.contains(p) {
        HitRegion::Content
    } else {
        decorator.map_or(HitRegion::None, |d| d.hit_test(p))
    };
    Some(BehaviourInputs {
        window: id,
        content: window.frame,
        frame: state.outer_frame(id)?,
        flags: window.flags,
        hit,
        tab_location: decorator.map_or(0.0, |d| d.tab_location()),
        screen: state.screen,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::DrawOp;
    use crate::input::Buttons;
    use crate::protocol::RecordingSink;
    use crate::types::Color;
    use crate::window::{WindowFlags, WindowLook};

    fn desktop() -> (Desktop, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let config = CompositorConfig::default();
        let services = DesktopServices::headless(&config).with_sink(sink.clone());
        (Desktop::new(config, services), sink)
    }

    fn plain(title: &str, frame: Rect) -> WindowSpec {
        WindowSpec::new(title, frame).look(WindowLook::NoBorder)
    }

    // --- Unit Tests ---

    #[test]
    fn test_create_and_close_window() {
        let (desktop, sink) = desktop();
        let w = desktop.create_window(plain("a", Rect::new(10, 10, 100, 80))).unwrap();
        assert_eq!(desktop.window_count(), 1);
        assert!(desktop.is_shown(w));
        assert!(desktop.compositor().is_attached(w));
        desktop.close_window(w).unwrap();
        assert_eq!(desktop.window_count(), 0);
        assert!(!desktop.compositor().is_attached(w));
        assert!(sink.for_window(w).contains(&ClientMessage::Closed));
    }

    #[test]
    fn test_create_rejects_empty_frame() {
        let (desktop, _) = desktop();
        let err = desktop.create_window(plain("a", Rect::new(0, 0, 0, 10))).unwrap_err();
        assert!(matches!(err, CompositorError::InvalidGeometry(_)));
    }

    #[test]
    fn test_titled_window_outer_frame_includes_chrome() {
        let (desktop, _) = desktop();
        let w = desktop.create_window(WindowSpec::new("t", Rect::new(100, 100, 200, 150))).unwrap();
        let outer = desktop.outer_frame(w).unwrap();
        assert!(outer.contains_rect(&Rect::new(100, 100, 200, 150)));
        assert!(outer.top < 100);
    }

    #[test]
    fn test_geometry_change_outside_limits_rejected() {
        let (desktop, _) = desktop();
        let spec = plain("a", Rect::new(0, 0, 200, 200)).limits(SizeLimits::new(100, 100, 300, 300));
        let w = desktop.create_window(spec).unwrap();
        let answer = desktop.submit_geometry_change(w, Rect::new(0, 0, 400, 200)).unwrap();
        assert!(!answer.is_accepted());
        assert_eq!(desktop.frame(w).unwrap(), Rect::new(0, 0, 200, 200));
        let answer = desktop.submit_geometry_change(w, Rect::new(50, 60, 250, 150)).unwrap();
        assert_eq!(answer, GeometryChange::Accepted(Rect::new(50, 60, 250, 150)));
    }

    #[test]
    fn test_resize_clamps_to_limits() {
        let (desktop, _) = desktop();
        let spec = plain("a", Rect::new(0, 0, 200, 200)).limits(SizeLimits::new(100, 100, 300, 300));
        let w = desktop.create_window(spec).unwrap();
        assert_eq!(desktop.resize_window(w, 50, 500).unwrap(), Rect::new(0, 0, 100, 300));
    }

    #[test]
    fn test_activation_raises_and_focuses() {
        let (desktop, sink) = desktop();
        let a = desktop.create_window(plain("a", Rect::new(0, 0, 100, 100))).unwrap();
        let b = desktop.create_window(plain("b", Rect::new(50, 50, 100, 100))).unwrap();
        assert_eq!(desktop.shown_windows(), vec![a, b]);
        desktop.activate_window(a).unwrap();
        assert_eq!(desktop.shown_windows(), vec![b, a]);
        assert_eq!(desktop.focus(), Some(a));
        assert!(sink.for_window(a).contains(&ClientMessage::Activated(true)));
    }

    #[test]
    fn test_minimized_window_is_hidden_and_loses_focus() {
        let (desktop, _) = desktop();
        let a = desktop.create_window(plain("a", Rect::new(0, 0, 100, 100))).unwrap();
        let b = desktop.create_window(plain("b", Rect::new(200, 0, 100, 100))).unwrap();
        desktop.activate_window(a).unwrap();
        desktop.activate_window(b).unwrap();
        desktop.minimize_window(b, true).unwrap();
        assert!(!desktop.is_shown(b));
        assert_eq!(desktop.focus(), Some(a));
        assert!(desktop.visible_region(b).unwrap().is_empty());
    }

    #[test]
    fn test_workspace_switch_hides_windows() {
        let (desktop, _) = desktop();
        let a = desktop.create_window(plain("a", Rect::new(0, 0, 100, 100))).unwrap();
        assert!(desktop.set_workspace(1).unwrap());
        assert!(!desktop.is_shown(a));
        let b = desktop.create_window(plain("b", Rect::new(0, 0, 100, 100))).unwrap();
        assert!(desktop.is_shown(b));
        desktop.move_to_workspace(a, 0b11).unwrap();
        assert!(desktop.is_shown(a));
    }

    #[test]
    fn test_zoom_toggles() {
        let (desktop, _) = desktop();
        let w = desktop.create_window(plain("a", Rect::new(10, 10, 100, 100))).unwrap();
        desktop.zoom_window(w).unwrap();
        assert_eq!(desktop.frame(w).unwrap(), Rect::new(0, 0, 1024, 768));
        desktop.zoom_window(w).unwrap();
        assert_eq!(desktop.frame(w).unwrap(), Rect::new(10, 10, 100, 100));
    }

    #[test]
    fn test_views_and_removal() {
        let (desktop, _) = desktop();
        let w = desktop.create_window(plain("a", Rect::new(0, 0, 200, 200))).unwrap();
        let v = desktop.add_view(w, None, "button", Rect::new(10, 10, 50, 20)).unwrap();
        desktop.set_view_frame(v, Rect::new(20, 20, 50, 20)).unwrap();
        let root = desktop.read().window(w).unwrap().root_view;
        assert!(desktop.remove_view(root).is_err());
        desktop.remove_view(v).unwrap();
        assert!(!desktop.read().views.contains(v));
    }

    #[test]
    fn test_hiding_view_uncovers_sibling() {
        let (desktop, _) = desktop();
        let w = desktop.create_window(plain("a", Rect::new(0, 0, 300, 300))).unwrap();
        let below = desktop.add_view(w, None, "below", Rect::new(10, 10, 100, 100)).unwrap();
        let above = desktop.add_view(w, None, "above", Rect::new(50, 50, 100, 100)).unwrap();
        assert_eq!(desktop.view_region(below).unwrap().area(), 100 * 100 - 60 * 60);
        let hit = desktop.dispatch(InputEvent::mouse_moved(Point::new(80, 80), Buttons::empty(), 1));
        assert_eq!(hit, DispatchOutcome::Delivered { window: w, view: Some(above) });

        desktop.set_view_hidden(above, true).unwrap();
        assert_eq!(desktop.view_region(below).unwrap().area(), 100 * 100);
        assert!(desktop.view_region(above).unwrap().is_empty());
        let hit = desktop.dispatch(InputEvent::mouse_moved(Point::new(80, 80), Buttons::empty(), 2));
        assert_eq!(hit, DispatchOutcome::Delivered { window: w, view: Some(below) });

        desktop.set_view_hidden(above, false).unwrap();
        assert_eq!(desktop.view_region(below).unwrap().area(), 100 * 100 - 60 * 60);
        assert!(desktop.set_view_hidden(below, true).is_ok());
    }

    #[test]
    fn test_render_draws_committed_batch() {
        let (desktop, _) = desktop();
        let w = desktop.create_window(plain("a", Rect::new(0, 0, 100, 100))).unwrap();
        desktop.render_frame().unwrap();
        let red = Color::rgb(255, 0, 0);
        let batch = DrawBatch::new(None)
            .with(DrawOp::SetHighColor(red))
            .with(DrawOp::FillRect(Rect::new(0, 0, 10, 10)));
        desktop.submit_draw_batch(w, batch).unwrap();
        desktop.render_frame().unwrap();
        assert_ne!(desktop.compositor().screen_pixel(Point::new(5, 5)), Some(red));
        assert!(desktop.commit_updates(w).unwrap());
        let report = desktop.render_frame().unwrap();
        assert!(report.rendered.contains(&w));
        assert_eq!(desktop.compositor().screen_pixel(Point::new(5, 5)), Some(red));
        assert_eq!(desktop.compositor().screen_pixel(Point::new(50, 50)), Some(Color::WHITE));
    }

    #[test]
    fn test_render_survives_huge_line_coordinates() {
        let (desktop, _) = desktop();
        let w = desktop.create_window(plain("a", Rect::new(0, 0, 100, 100))).unwrap();
        let red = Color::rgb(255, 0, 0);
        let batch = DrawBatch::new(None)
            .with(DrawOp::SetHighColor(red))
            .with(DrawOp::StrokeLine(Point::new(-2_000_000_000, 5), Point::new(2_000_000_000, 5)))
            .with(DrawOp::FillRect(Rect::new(i32::MAX - 5, 0, i32::MAX, 10)));
        desktop.submit_draw_batch(w, batch).unwrap();
        assert!(desktop.commit_updates(w).unwrap());
        let report = desktop.render_frame().unwrap();
        assert!(report.rendered.contains(&w));
        assert_eq!(desktop.compositor().screen_pixel(Point::new(50, 5)), Some(red));
        assert_eq!(desktop.compositor().screen_pixel(Point::new(50, 50)), Some(Color::WHITE));
    }

    #[test]
    fn test_set_decorator_keeps_tabs() {
        let (desktop, _) = desktop();
        let w = desktop.create_window(WindowSpec::new("t", Rect::new(100, 100, 200, 150))).unwrap();
        assert_eq!(desktop.set_decorator("flat").unwrap(), "flat");
        let state = desktop.read();
        let decorator = state.decorator_of(w).unwrap();
        assert_eq!(decorator.name(), "flat");
        assert_eq!(decorator.tab_index(w), Some(0));
        drop(state);
        assert_eq!(desktop.set_decorator("missing").unwrap(), DEFAULT_DECORATOR);
    }

    #[test]
    fn test_keyboard_goes_to_focus() {
        let (desktop, sink) = desktop();
        let a = desktop.create_window(plain("a", Rect::new(0, 0, 100, 100))).unwrap();
        assert_eq!(
            desktop.dispatch(InputEvent::key_down(30, Some('a'), 1)),
            DispatchOutcome::Dropped(DropReason::NoFocus)
        );
        desktop.activate_window(a).unwrap();
        sink.clear();
        let outcome = desktop.dispatch(InputEvent::key_down(30, Some('a'), 2));
        assert!(matches!(outcome, DispatchOutcome::Delivered { window, .. } if window == a));
        assert!(sink.for_window(a).iter().any(|m| matches!(m, ClientMessage::Input { .. })));
    }

    #[test]
    fn test_click_activates_and_delivers_local_position() {
        let (desktop, sink) = desktop();
        let _a = desktop.create_window(plain("a", Rect::new(0, 0, 100, 100))).unwrap();
        let b = desktop.create_window(plain("b", Rect::new(200, 100, 100, 100))).unwrap();
        let outcome = desktop.dispatch(InputEvent::mouse_down(Point::new(210, 120), Buttons::PRIMARY, 10));
        assert!(matches!(outcome, DispatchOutcome::Delivered { window, .. } if window == b));
        assert_eq!(desktop.focus(), Some(b));
        let local = sink.for_window(b).into_iter().find_map(|m| match m {
            ClientMessage::Input { local, .. } => Some(local),
            _ => None,
        });
        assert_eq!(local, Some(Point::new(10, 20)));
    }

    #[test]
    fn test_manage_modifiers_drag_moves_window() {
        let (desktop, _) = desktop();
        let w = desktop.create_window(plain("a", Rect::new(300, 300, 100, 100))).unwrap();
        let down = InputEvent::mouse_down(Point::new(350, 350), Buttons::PRIMARY, 10).with_modifiers(MANAGE_MODIFIERS);
        desktop.dispatch(down);
        desktop.dispatch(InputEvent::mouse_moved(Point::new(380, 360), Buttons::PRIMARY, 20));
        desktop.dispatch(InputEvent::mouse_up(Point::new(380, 360), Buttons::PRIMARY, 30));
        assert_eq!(desktop.frame(w).unwrap(), Rect::new(330, 310, 100, 100));
    }

    #[test]
    fn test_lost_button_up_ends_drag_and_capture() {
        let (desktop, _) = desktop();
        let w = desktop.create_window(plain("a", Rect::new(300, 300, 100, 100))).unwrap();
        let other = desktop.create_window(plain("b", Rect::new(600, 300, 100, 100))).unwrap();
        let down = InputEvent::mouse_down(Point::new(350, 350), Buttons::PRIMARY, 10).with_modifiers(MANAGE_MODIFIERS);
        desktop.dispatch(down);
        desktop.dispatch(InputEvent::mouse_moved(Point::new(380, 360), Buttons::PRIMARY, 20));

        // The up event never arrives.
        let outcome = desktop.dispatch(InputEvent::mouse_moved(Point::new(650, 350), Buttons::empty(), 30));
        assert!(matches!(outcome, DispatchOutcome::Delivered { window, .. } if window == other));
        assert_eq!(desktop.frame(w).unwrap(), Rect::new(330, 310, 100, 100));

        let outcome = desktop.dispatch(InputEvent::mouse_down(Point::new(650, 350), Buttons::PRIMARY, 1_000_000));
        assert!(matches!(outcome, DispatchOutcome::Delivered { window, .. } if window == other));
        assert_eq!(desktop.focus(), Some(other));
        assert_eq!(desktop.frame(w).unwrap(), Rect::new(330, 310, 100, 100));
    }

    #[test]
    fn test_not_stackable_window_rejected() {
        let (desktop, _) = desktop();
        let a = desktop
            .create_window(plain("a", Rect::new(0, 0, 100, 100)).flags(WindowFlags::NO_STACK_AND_TILE))
            .unwrap();
        let b = desktop.create_window(plain("b", Rect::new(200, 0, 100, 100))).unwrap();
        assert!(desktop.stack_windows(a, b, 1).is_err());
        assert_eq!(desktop.group_of(b), None);
    }

    #[test]
    fn test_settings_round_trip_restores_group() {
        let (desktop, _) = desktop();
        let a = desktop.create_window(plain("left", Rect::new(0, 0, 300, 300))).unwrap();
        let b = desktop.create_window(plain("right", Rect::new(400, 0, 150, 150))).unwrap();
        desktop.tile_window(b, a).unwrap();
        desktop.save_settings().unwrap();
        desktop.remove_from_group(b).unwrap();
        assert_eq!(desktop.group_of(a), None);
        assert_eq!(desktop.restore_settings().unwrap(), 1);
        assert!(desktop.group_of(a).is_some());
        assert_eq!(desktop.group_of(a), desktop.group_of(b));
    }

    #[test]
    fn test_restore_keeps_same_titled_windows_apart() {
        let (desktop, _) = desktop();
        let a = desktop.create_window(plain("twin", Rect::new(0, 0, 300, 300))).unwrap();
        let b = desktop.create_window(plain("twin", Rect::new(400, 0, 150, 150))).unwrap();
        desktop.tile_window(b, a).unwrap();
        desktop.save_settings().unwrap();
        desktop.remove_from_group(b).unwrap();

        assert_eq!(desktop.restore_settings().unwrap(), 1);
        let group = desktop.group_of(a);
        assert!(group.is_some());
        assert_eq!(desktop.group_of(b), group);
        assert_ne!(desktop.frame(a).unwrap(), desktop.frame(b).unwrap());
        let state = desktop.read();
        let sat = state.stack_tile.group(group.unwrap()).unwrap();
        let (area_a, area_b) = (sat.area_of(a), sat.area_of(b));
        assert!(area_a.is_some() && area_b.is_some());
        assert_ne!(area_a, area_b);
    }
}
