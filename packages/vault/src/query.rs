//! # Query Layer
//!
//! Pure, read-only lookups over the flat indices. Every function is O(1) or
//! O(result size); none of them walk the whole store. Collection membership
//! has its own accessors in [`crate::collections`].

use crate::model::{Entity, EntityId, EntityKind, VaultState};
use std::collections::HashSet;
use tracing::debug;

/// Look up an entity by id.
///
/// The `type_index` is consulted first. If it disagrees with the buckets the
/// six buckets are checked directly; repairing the index is left to the
/// mutation layer.
pub fn get_entity<'a>(state: &'a VaultState, id: &str) -> Option<&'a Entity> {
    if let Some(kind) = state.type_index.get(id) {
        if let Some(entity) = state.entities.get(*kind, id) {
            return Some(entity.as_ref());
        }
        debug!(entity_id = %id, recorded = %kind, "type index points at the wrong bucket");
    }
    locate_entity(state, id).map(|(_, entity)| entity)
}

/// Probe every bucket for `id`, ignoring the type index
pub fn locate_entity<'a>(state: &'a VaultState, id: &str) -> Option<(EntityKind, &'a Entity)> {
    EntityKind::ALL.into_iter().find_map(|kind| {
        state
            .entities
            .get(kind, id)
            .map(|entity| (kind, entity.as_ref()))
    })
}

pub fn get_entity_type(state: &VaultState, id: &str) -> Option<EntityKind> {
    get_entity(state, id).map(|entity| entity.kind)
}

pub fn has_entity(state: &VaultState, id: &str) -> bool {
    get_entity(state, id).is_some()
}

pub fn get_parent_id<'a>(state: &'a VaultState, id: &str) -> Option<&'a str> {
    state.reverse_refs.get(id).map(String::as_str)
}

/// Ordered ids of the entities owned by `id`
pub fn get_child_ids<'a>(state: &'a VaultState, id: &str) -> &'a [EntityId] {
    state
        .references
        .get(id)
        .map(|children| children.as_slice())
        .unwrap_or(&[])
}

/// Path from the top-most ancestor down to the parent of `id`
pub fn get_ancestors(state: &VaultState, id: &str) -> Vec<EntityId> {
    let mut ancestors = Vec::new();
    let mut visited = HashSet::new();
    visited.insert(id.to_string());

    let mut current = id;
    while let Some(parent) = get_parent_id(state, current) {
        if !visited.insert(parent.to_string()) {
            debug!(entity_id = %id, at = %parent, "cycle in parent chain, stopping");
            break;
        }
        ancestors.push(parent.to_string());
        current = parent;
    }

    ancestors.reverse();
    ancestors
}

/// Pre-order ids of the ownership subtree below `id` (excluding `id`)
pub fn get_descendants(state: &VaultState, id: &str) -> Vec<EntityId> {
    let mut descendants = Vec::new();
    let mut visited = HashSet::new();
    visited.insert(id.to_string());

    let mut stack: Vec<&str> = get_child_ids(state, id).iter().rev().map(String::as_str).collect();
    while let Some(current) = stack.pop() {
        if !visited.insert(current.to_string()) {
            debug!(entity_id = %id, at = %current, "revisited id in ownership tree, skipping");
            continue;
        }
        descendants.push(current.to_string());
        stack.extend(get_child_ids(state, current).iter().rev().map(String::as_str));
    }

    descendants
}

/// Whether `ancestor` appears on the parent chain of `id`
pub fn is_descendant_of(state: &VaultState, id: &str, ancestor: &str) -> bool {
    get_ancestors(state, id).iter().any(|candidate| candidate == ancestor)
}

/// All active entities of one kind, ordered by id
pub fn get_entities_by_type(state: &VaultState, kind: EntityKind) -> Vec<&Entity> {
    let mut entities: Vec<&Entity> = state
        .entities
        .bucket(kind)
        .values()
        .map(|entity| entity.as_ref())
        .collect();
    entities.sort_by(|a, b| a.id.cmp(&b.id));
    entities
}

pub fn get_root_id(state: &VaultState) -> Option<&str> {
    state.root_id.as_deref()
}

pub fn entity_count(state: &VaultState) -> usize {
    state.entities.len()
}

pub fn count_by_type(state: &VaultState, kind: EntityKind) -> usize {
    state.entities.bucket(kind).len()
}

pub fn trash_count(state: &VaultState) -> usize {
    state.trashed_entities.len()
}
