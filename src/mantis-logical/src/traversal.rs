//! Per-traversal visit bookkeeping.
//!
//! Visit status is never stored on the shared nodes themselves. Each pass
//! owns a [`VisitState`] and resets it before the next independent pass, so
//! overlapping traversals cannot corrupt each other.

use std::collections::HashMap;
use std::hash::Hash;

/// Status of one node during a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisitStatus {
    NotVisited,
    /// Entered but inputs not finished; seeing it again means a cycle.
    Visited,
    Done,
}

/// Visit status for every node touched by one traversal.
#[derive(Debug, Clone)]
pub struct VisitState<K> {
    status: HashMap<K, VisitStatus>,
    visits: usize,
}

impl<K: Copy + Eq + Hash> VisitState<K> {
    pub fn new() -> Self {
        Self {
            status: HashMap::new(),
            visits: 0,
        }
    }

    pub fn status(&self, id: K) -> VisitStatus {
        self.status
            .get(&id)
            .copied()
            .unwrap_or(VisitStatus::NotVisited)
    }

    /// Mark `id` as entered. Counts one visit.
    pub fn enter(&mut self, id: K) {
        self.visits += 1;
        self.status.insert(id, VisitStatus::Visited);
    }

    pub fn finish(&mut self, id: K) {
        self.status.insert(id, VisitStatus::Done);
    }

    pub fn is_done(&self, id: K) -> bool {
        self.status(id) == VisitStatus::Done
    }

    /// Number of `enter` calls since the last reset.
    pub fn visits(&self) -> usize {
        self.visits
    }

    /// Check if no node has been touched since the last reset.
    pub fn is_clean(&self) -> bool {
        self.status.is_empty()
    }

    /// Restore every node to [`VisitStatus::NotVisited`].
    pub fn reset(&mut self) {
        self.status.clear();
        self.visits = 0;
    }
}

impl<K: Copy + Eq + Hash> Default for VisitState<K> {
    fn default() -> Self {
        Self::new()
    }
}
