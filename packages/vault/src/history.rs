//! # Undo/Redo History
//!
//! Every state is an immutable snapshot that shares unchanged structure with
//! its predecessor, so history is simply a stack of `(before, after)` pairs.
//! Keeping a snapshot costs a handful of reference-count bumps, not a copy.
//!
//! ## Design
//!
//! - Recording a step clears the redo stack
//! - Undo hands back the `before` snapshot, redo the `after` snapshot
//! - Batches collapse several recorded steps into one undo level
//! - The oldest level is dropped once `max_levels` is exceeded (0 = unlimited)

use crate::model::{EntityKind, VaultState};
use std::sync::Arc;

/// One undoable step
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub before: VaultState,
    pub after: VaultState,
    pub description: Option<String>,
}

#[derive(Debug)]
struct PendingBatch {
    before: Option<VaultState>,
    after: Option<VaultState>,
    description: Option<String>,
}

/// Snapshot-based undo/redo stack
#[derive(Debug)]
pub struct History {
    /// Applied steps (most recent last)
    undo_stack: Vec<HistoryEntry>,

    /// Undone steps (most recent last)
    redo_stack: Vec<HistoryEntry>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,

    current_batch: Option<PendingBatch>,
}

impl History {
    /// History with the default of 100 levels
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_levels,
            current_batch: None,
        }
    }

    /// Record a transition. Transitions that changed nothing are ignored.
    pub fn record(&mut self, before: &VaultState, after: &VaultState, description: Option<String>) {
        if same_snapshot(before, after) {
            return;
        }

        if let Some(batch) = &mut self.current_batch {
            if batch.before.is_none() {
                batch.before = Some(before.clone());
            }
            batch.after = Some(after.clone());
            if batch.description.is_none() {
                batch.description = description;
            }
            return;
        }

        self.push_entry(HistoryEntry {
            before: before.clone(),
            after: after.clone(),
            description,
        });
    }

    /// Start grouping recorded steps into one undo level
    pub fn begin_batch(&mut self) {
        self.current_batch = Some(PendingBatch {
            before: None,
            after: None,
            description: None,
        });
    }

    /// Close the current batch; an empty batch leaves no undo level
    pub fn end_batch(&mut self) {
        if let Some(PendingBatch {
            before: Some(before),
            after: Some(after),
            description,
        }) = self.current_batch.take()
        {
            self.push_entry(HistoryEntry {
                before,
                after,
                description,
            });
        }
    }

    pub fn set_batch_description(&mut self, description: impl Into<String>) {
        if let Some(batch) = &mut self.current_batch {
            batch.description = Some(description.into());
        }
    }

    pub fn is_batching(&self) -> bool {
        self.current_batch.is_some()
    }

    fn push_entry(&mut self, entry: HistoryEntry) {
        self.undo_stack.push(entry);

        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
        }

        self.redo_stack.clear();
    }

    /// Step back; returns the state to make current
    pub fn undo(&mut self) -> Option<VaultState> {
        let entry = self.undo_stack.pop()?;
        let state = entry.before.clone();
        self.redo_stack.push(entry);
        Some(state)
    }

    /// Step forward again; returns the state to make current
    pub fn redo(&mut self) -> Option<VaultState> {
        let entry = self.redo_stack.pop()?;
        let state = entry.after.clone();
        self.undo_stack.push(entry);
        Some(state)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.current_batch = None;
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack
            .last()
            .and_then(|entry| entry.description.as_deref())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack
            .last()
            .and_then(|entry| entry.description.as_deref())
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether two states are the same snapshot: every index shared, same root
pub(crate) fn same_snapshot(a: &VaultState, b: &VaultState) -> bool {
    EntityKind::ALL
        .into_iter()
        .all(|kind| a.entities.shares_bucket_with(&b.entities, kind))
        && Arc::ptr_eq(&a.type_index, &b.type_index)
        && Arc::ptr_eq(&a.references, &b.references)
        && Arc::ptr_eq(&a.reverse_refs, &b.reverse_refs)
        && Arc::ptr_eq(&a.collection_members, &b.collection_members)
        && Arc::ptr_eq(&a.member_of_collections, &b.member_of_collections)
        && Arc::ptr_eq(&a.reference_labels, &b.reference_labels)
        && Arc::ptr_eq(&a.extensions, &b.extensions)
        && Arc::ptr_eq(&a.trashed_entities, &b.trashed_entities)
        && a.root_id == b.root_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Entity;
    use crate::mutations::add_entity;
    use crate::query::has_entity;

    fn step(state: &VaultState, id: &str) -> VaultState {
        add_entity(state, Entity::new(id, EntityKind::Manifest), None)
    }

    #[test]
    fn test_undo_redo() {
        let mut history = History::new();
        let s0 = VaultState::new();
        let s1 = step(&s0, "m1");
        history.record(&s0, &s1, Some("add m1".into()));
        let s2 = step(&s1, "m2");
        history.record(&s1, &s2, Some("add m2".into()));

        assert_eq!(history.undo_levels(), 2);
        assert_eq!(history.undo_description(), Some("add m2"));

        let back = history.undo().unwrap();
        assert!(has_entity(&back, "m1"));
        assert!(!has_entity(&back, "m2"));
        assert_eq!(history.redo_description(), Some("add m2"));

        let forward = history.redo().unwrap();
        assert!(has_entity(&forward, "m2"));
        assert!(!history.can_redo());
    }

    #[test]
    fn test_new_step_clears_redo() {
        let mut history = History::new();
        let s0 = VaultState::new();
        let s1 = step(&s0, "m1");
        history.record(&s0, &s1, None);
        history.undo();
        assert!(history.can_redo());

        let other = step(&s0, "m9");
        history.record(&s0, &other, None);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_noop_is_not_recorded() {
        let mut history = History::new();
        let s0 = step(&VaultState::new(), "m1");
        history.record(&s0, &s0.clone(), None);
        assert!(!history.can_undo());
    }

    #[test]
    fn test_batch_is_one_level() {
        let mut history = History::new();
        let s0 = VaultState::new();
        history.begin_batch();
        history.set_batch_description("import");
        let s1 = step(&s0, "m1");
        history.record(&s0, &s1, None);
        let s2 = step(&s1, "m2");
        history.record(&s1, &s2, None);
        history.end_batch();

        assert_eq!(history.undo_levels(), 1);
        assert_eq!(history.undo_description(), Some("import"));
        let back = history.undo().unwrap();
        assert!(back.entities.is_empty());
    }

    #[test]
    fn test_empty_batch_and_max_levels() {
        let mut history = History::with_max_levels(2);
        history.begin_batch();
        history.end_batch();
        assert!(!history.can_undo());

        let mut state = VaultState::new();
        for id in ["a", "b", "c"] {
            let next = step(&state, id);
            history.record(&state, &next, Some(id.into()));
            state = next;
        }
        assert_eq!(history.undo_levels(), 2);
        let oldest = {
            history.undo();
            history.undo().unwrap()
        };
        assert!(has_entity(&oldest, "a"));
        assert!(!history.can_undo());
    }
}
