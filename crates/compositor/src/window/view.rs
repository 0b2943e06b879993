//! View hierarchy stored in an arena.
//!
//! Every view is owned by exactly one parent (a window's root slot or another
//! view). Children are kept in drawing order: later children are drawn on top
//! of earlier ones. Parents are referenced by key, never by pointer.

use crate::error::{CompositorError, Result};
use crate::region::ClipRegion;
use crate::types::{Point, Rect, WindowId};
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Arena key of a view.
    pub struct ViewId;
}

/// Owner of a view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViewParent {
    Window(WindowId),
    View(ViewId),
}

#[derive(Debug, Clone)]
pub struct View {
    pub name: String,
    /// Frame in the parent's coordinate system.
    pub frame: Rect,
    /// Scroll offset applied to children.
    pub scroll: Point,
    /// Optional clip shape in the view's own coordinates.
    pub clip_shape: Option<ClipRegion>,
    pub hidden: bool,
    parent: ViewParent,
    window: WindowId,
    children: Vec<ViewId>,
}

impl View {
    pub fn parent(&self) -> ViewParent {
        self.parent
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn children(&self) -> &[ViewId] {
        &self.children
    }
}

#[derive(Debug, Default)]
pub struct ViewTree {
    views: SlotMap<ViewId, View>,
}

impl ViewTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the root view of a window; `frame` is in content coordinates.
    pub fn create_root(&mut self, window: WindowId, frame: Rect) -> ViewId {
        self.views.insert(View {
            name: "root".to_string(),
            frame,
            scroll: Point::ORIGIN,
            clip_shape: None,
            hidden: false,
            parent: ViewParent::Window(window),
            window,
            children: Vec::new(),
        })
    }

    /// Append a child on top of its existing siblings.
    pub fn add_child(&mut self, parent: ViewId, name: impl Into<String>, frame: Rect) -> Result<ViewId> {
        if !frame.is_valid() {
            return Err(CompositorError::InvalidGeometry(format!(
                "view frame {:?} has negative area",
                frame
            )));
        }
        let window = self.views.get(parent).ok_or(CompositorError::UnknownView)?.window;
        let id = self.views.insert(View {
            name: name.into(),
            frame,
            scroll: Point::ORIGIN,
            clip_shape: None,
            hidden: false,
            parent: ViewParent::View(parent),
            window,
            children: Vec::new(),
        });
        if let Some(p) = self.views.get_mut(parent) {
            p.children.push(id);
        }
        Ok(id)
    }

    /// Remove a view and its descendants; returns every removed key.
    pub fn remove(&mut self, id: ViewId) -> Vec<ViewId> {
        let removed = self.subtree(id);
        if let Some(ViewParent::View(parent)) = self.views.get(id).map(|v| v.parent) {
            if let Some(p) = self.views.get_mut(parent) {
                p.children.retain(|c| *c != id);
            }
        }
        for v in &removed {
            self.views.remove(*v);
        }
        removed
    }

    pub fn get(&self, id: ViewId) -> Option<&View> {
        self.views.get(id)
    }

    pub fn get_mut(&mut self, id: ViewId) -> Option<&mut View> {
        self.views.get_mut(id)
    }

    pub fn contains(&self, id: ViewId) -> bool {
        self.views.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// The view and all descendants, parents before children.
    pub fn subtree(&self, id: ViewId) -> Vec<ViewId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(v) = stack.pop() {
            if let Some(view) = self.views.get(v) {
                out.push(v);
                stack.extend(view.children.iter().rev().copied());
            }
        }
        out
    }

    /// Siblings drawn after (on top of) `id`.
    pub fn later_siblings(&self, id: ViewId) -> &[ViewId] {
        let Some(ViewParent::View(parent)) = self.views.get(id).map(|v| v.parent) else {
            return &[];
        };
        match self.views.get(parent) {
            Some(p) => match p.children.iter().position(|c| *c == id) {
                Some(pos) => &p.children[pos + 1..],
                None => &[],
            },
            None => &[],
        }
    }

    /// Screen-space origin of the view's coordinate system.
    ///
    /// `content_origin` is the top-left of the owning window's content frame.
    pub fn screen_origin(&self, id: ViewId, content_origin: Point) -> Option<Point> {
        let view = self.views.get(id)?;
        match view.parent {
            ViewParent::Window(_) => Some(Point::new(
                content_origin.x + view.frame.left,
                content_origin.y + view.frame.top,
            )),
            ViewParent::View(parent) => {
                let p = self.views.get(parent)?;
                let origin = self.screen_origin(parent, content_origin)?;
                Some(Point::new(
                    origin.x - p.scroll.x + view.frame.left,
                    origin.y - p.scroll.y + view.frame.top,
                ))
            }
        }
    }

    /// Screen-space frame of the view.
    pub fn screen_frame(&self, id: ViewId, content_origin: Point) -> Option<Rect> {
        let view = self.views.get(id)?;
        let origin = self.screen_origin(id, content_origin)?;
        Some(Rect::new(origin.x, origin.y, view.frame.width(), view.frame.height()))
    }

    /// True if the view or any ancestor view is hidden.
    pub fn is_hidden(&self, id: ViewId) -> bool {
        let mut cursor = Some(id);
        while let Some(v) = cursor {
            match self.views.get(v) {
                Some(view) if view.hidden => return true,
                Some(view) => {
                    cursor = match view.parent {
                        ViewParent::View(p) => Some(p),
                        ViewParent::Window(_) => None,
                    }
                }
                None => return true,
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_remove_subtree() {
        let mut tree = ViewTree::new();
        let root = tree.create_root(WindowId(1), Rect::new(0, 0, 100, 100));
        let a = tree.add_child(root, "a", Rect::new(0, 0, 50, 50)).unwrap();
        let b = tree.add_child(a, "b", Rect::new(5, 5, 10, 10)).unwrap();
        let c = tree.add_child(root, "c", Rect::new(50, 0, 50, 50)).unwrap();

        assert_eq!(tree.subtree(root), vec![root, a, b, c]);
        assert_eq!(tree.later_siblings(a), &[c]);

        let removed = tree.remove(a);
        assert_eq!(removed, vec![a, b]);
        assert!(!tree.contains(b));
        assert_eq!(tree.get(root).unwrap().children(), &[c]);
    }

    #[test]
    fn test_screen_frame_accumulates_offsets_and_scroll() {
        let mut tree = ViewTree::new();
        let root = tree.create_root(WindowId(1), Rect::new(0, 0, 200, 200));
        let panel = tree.add_child(root, "panel", Rect::new(10, 20, 100, 100)).unwrap();
        let item = tree.add_child(panel, "item", Rect::new(5, 5, 20, 20)).unwrap();
        tree.get_mut(panel).unwrap().scroll = Point::new(0, 5);

        let frame = tree.screen_frame(item, Point::new(100, 100)).unwrap();
        assert_eq!(frame, Rect::new(115, 120, 20, 20));
    }

    #[test]
    fn test_hidden_propagates_to_descendants() {
        let mut tree = ViewTree::new();
        let root = tree.create_root(WindowId(1), Rect::new(0, 0, 100, 100));
        let a = tree.add_child(root, "a", Rect::new(0, 0, 50, 50)).unwrap();
        let b = tree.add_child(a, "b", Rect::new(0, 0, 10, 10)).unwrap();
        tree.get_mut(a).unwrap().hidden = true;
        assert!(tree.is_hidden(b));
        assert!(!tree.is_hidden(root));
    }

    #[test]
    fn test_invalid_child_frame_rejected() {
        let mut tree = ViewTree::new();
        let root = tree.create_root(WindowId(1), Rect::new(0, 0, 100, 100));
        assert!(tree.add_child(root, "bad", Rect::from_edges(10, 10, 0, 0)).is_err());
    }
}
