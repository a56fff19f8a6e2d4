// src/services/dedup.rs

//! In-run duplicate suppression.

use std::collections::HashSet;

/// Post identifiers already yielded by one traversal.
///
/// Nothing is persisted: a later run starts empty, so the same post can
/// appear in logs written by different runs.
#[derive(Debug, Default)]
pub struct Deduplicator {
    ids: HashSet<String>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `id` was already recorded; otherwise records it and returns `false`.
    pub fn seen(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return true;
        }
        self.ids.insert(id.to_string());
        false
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
