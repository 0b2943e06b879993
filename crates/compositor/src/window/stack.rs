//! Window stacks: tab groups sharing one decorator and one frame.

use crate::decorator::Decorator;
use crate::types::{StackId, WindowId};

/// Ordered list of windows sharing one frame; exactly one of them is in front.
pub struct WindowStack {
    pub id: StackId,
    windows: Vec<WindowId>,
    front: usize,
    decorator: Box<dyn Decorator>,
}

impl std::fmt::Debug for WindowStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowStack")
            .field("id", &self.id)
            .field("windows", &self.windows)
            .field("front", &self.front)
            .field("decorator", &self.decorator.name())
            .finish()
    }
}

impl WindowStack {
    /// A stack of one.
    pub fn new(id: StackId, window: WindowId, decorator: Box<dyn Decorator>) -> Self {
        Self { id, windows: vec![window], front: 0, decorator }
    }

    pub fn windows(&self) -> &[WindowId] {
        &self.windows
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn contains(&self, window: WindowId) -> bool {
        self.windows.contains(&window)
    }

    pub fn index_of(&self, window: WindowId) -> Option<usize> {
        self.windows.iter().position(|w| *w == window)
    }

    pub fn front(&self) -> Option<WindowId> {
        self.windows.get(self.front).copied()
    }

    pub fn front_index(&self) -> usize {
        self.front
    }

    pub fn is_front(&self, window: WindowId) -> bool {
        self.front() == Some(window)
    }

    /// Insert a window at `index` (clamped); the front window stays in front.
    pub fn add_window(&mut self, window: WindowId, index: usize) -> usize {
        let index = index.min(self.windows.len());
        let front = self.front();
        self.windows.insert(index, window);
        if let Some(f) = front {
            self.front = self.index_of(f).unwrap_or(0);
        }
        index
    }

    /// Remove a window; returns its former index.
    pub fn remove_window(&mut self, window: WindowId) -> Option<usize> {
        let index = self.index_of(window)?;
        let front = self.front();
        self.windows.remove(index);
        self.front = match front {
            Some(f) if f != window => self.index_of(f).unwrap_or(0),
            _ => index.min(self.windows.len().saturating_sub(1)),
        };
        Some(index)
    }

    /// Bring `window` to the front; false if it is not a member.
    pub fn set_front(&mut self, window: WindowId) -> bool {
        match self.index_of(window) {
            Some(i) => {
                self.front = i;
                true
            }
            None => false,
        }
    }

    pub fn move_window(&mut self, from: usize, to: usize) -> bool {
        if from >= self.windows.len() || to >= self.windows.len() {
            return false;
        }
        let front = self.front();
        let w = self.windows.remove(from);
        self.windows.insert(to, w);
        if let Some(f) = front {
            self.front = self.index_of(f).unwrap_or(0);
        }
        true
    }

    pub fn decorator(&self) -> &dyn Decorator {
        self.decorator.as_ref()
    }

    pub fn decorator_mut(&mut self) -> &mut dyn Decorator {
        self.decorator.as_mut()
    }

    /// Swap in a new decorator, handing back the old one.
    pub fn replace_decorator(&mut self, decorator: Box<dyn Decorator>) -> Box<dyn Decorator> {
        std::mem::replace(&mut self.decorator, decorator)
    }
}
