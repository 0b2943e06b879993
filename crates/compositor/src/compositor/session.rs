//! Double-buffered drawing sessions of one window.
//!
//! Clients draw into the pending session. A commit folds it into the current
//! session in one swap, so the compositor never renders a half-submitted
//! update. The current session is the retained display list: the latest batch
//! for each view, replayed whenever part of the window needs redrawing.

use crate::canvas::DrawBatch;
use crate::region::ClipRegion;
use crate::types::Rect;

#[derive(Debug, Default, Clone)]
pub struct UpdateSession {
    pub batches: Vec<DrawBatch>,
    /// Area touched, in buffer coordinates.
    pub dirty: ClipRegion,
}

impl UpdateSession {
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn op_count(&self) -> usize {
        self.batches.iter().map(|b| b.len()).sum()
    }
}

#[derive(Debug, Default)]
pub struct UpdateSessions {
    pending: UpdateSession,
    current: UpdateSession,
    commits: u64,
}

impl UpdateSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `batch`; `dirty` is the area it may draw on, in buffer
    /// coordinates.
    pub fn submit(&mut self, batch: DrawBatch, dirty: Rect) {
        self.pending.dirty.include(dirty);
        self.pending.batches.push(batch);
    }

    /// Publish the pending session. Returns the area to redraw, or `None`
    /// when nothing was pending.
    pub fn commit(&mut self) -> Option<ClipRegion> {
        if self.pending.is_empty() {
            return None;
        }
        let mut next = std::mem::take(&mut self.pending);
        let redrawn: Vec<_> = next.batches.iter().map(|b| b.view).collect();
        let mut batches: Vec<DrawBatch> = self
            .current
            .batches
            .drain(..)
            .filter(|b| !redrawn.contains(&b.view))
            .collect();
        batches.append(&mut next.batches);
        next.batches = batches;
        let dirty = next.dirty.clone();
        std::mem::swap(&mut self.current, &mut next);
        self.commits += 1;
        Some(dirty)
    }

    pub fn current(&self) -> &UpdateSession {
        &self.current
    }

    pub fn pending(&self) -> &UpdateSession {
        &self.pending
    }

    pub fn commits(&self) -> u64 {
        self.commits
    }

    /// Forget batches of views that no longer exist.
    pub fn retain_views(&mut self, keep: impl Fn(&DrawBatch) -> bool) {
        self.current.batches.retain(&keep);
        self.pending.batches.retain(&keep);
    }
}
