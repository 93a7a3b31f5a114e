//! # Mutations
//!
//! Structural edits over the flat state. Every function takes the current
//! state by reference and returns a new one; the input is never modified and
//! stays valid for anyone still holding it.
//!
//! ## Semantics
//!
//! ### Unknown ids
//! - A mutation naming an entity that does not exist returns the input state
//!   unchanged. Nothing here panics or errors for a missing entity.
//!
//! ### Update
//! - Shallow merge onto the record found through `type_index`
//! - A stale index is repaired on the fly and reported as a diagnostic
//!
//! ### Remove
//! - Soft delete (default) hands over to [`crate::trash`]
//! - Permanent delete purges the entity and its ownership subtree from every
//!   index; only indices that actually change are copied
//!
//! ### Move / insert
//! - Fails (no-op) if the new parent cannot own the entity's kind
//! - Fails (no-op) if the move would create a cycle

use crate::collections::unlink_all;
use crate::diagnostic::{Diagnostic, DiagnosticKind, Outcome};
use crate::model::{attach_id, detach_id, Entity, EntityId, Properties, VaultState};
use crate::query::{
    get_ancestors, get_child_ids, get_descendants, get_entity_type, get_parent_id, has_entity,
    is_descendant_of, locate_entity,
};
use crate::trash::move_entity_to_trash;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Options for [`remove_entity`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Skip the trash and purge immediately
    pub permanent: bool,
}

impl RemoveOptions {
    pub fn permanent() -> Self {
        Self { permanent: true }
    }
}

/// Shallow-merge `patch` onto the entity's properties.
///
/// `id`, `type` and the kind's child slots cannot be patched; they are
/// skipped. When `type_index` disagrees with the buckets, the owning bucket
/// is found by probing all of them, the index is repaired and a
/// [`DiagnosticKind::StaleIndex`] diagnostic is returned.
pub fn update_entity(state: &VaultState, id: &str, patch: &Properties) -> Outcome {
    let mut next = state.clone();
    let mut diagnostics = Vec::new();

    let recorded = state.type_index.get(id).copied();
    let kind = match recorded {
        Some(kind) if state.entities.get(kind, id).is_some() => kind,
        _ => match locate_entity(state, id) {
            Some((actual, _)) => {
                warn!(entity_id = %id, recorded = ?recorded, actual = %actual, "repairing stale type index");
                Arc::make_mut(&mut next.type_index).insert(id.to_string(), actual);
                diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticKind::StaleIndex,
                        format!(
                            "type index recorded {} for '{id}' but the entity lives in {actual}",
                            recorded.map(|k| k.as_str()).unwrap_or("nothing")
                        ),
                    )
                    .for_entity(id)
                    .with_suggestion("an external writer modified the state without updating the index"),
                );
                actual
            }
            None => {
                debug!(entity_id = %id, "update_entity on unknown entity");
                return Outcome::with(state.clone(), Diagnostic::not_found(id, "update_entity"));
            }
        },
    };

    let Some(current) = state.entities.get(kind, id) else {
        return Outcome::with(state.clone(), Diagnostic::not_found(id, "update_entity"));
    };
    let mut updated = current.as_ref().clone();
    for (key, value) in patch {
        if key == "id" || key == "type" || kind.is_child_slot(key) {
            debug!(entity_id = %id, property = %key, "structural property cannot be patched");
            continue;
        }
        updated.properties.insert(key.clone(), value.clone());
    }
    next.entities
        .bucket_mut(kind)
        .insert(id.to_string(), Arc::new(updated));

    Outcome {
        state: next,
        diagnostics,
    }
}

/// Insert a new entity, optionally owned by `parent_id`.
///
/// A parentless entity becomes the root when the state has none.
pub fn add_entity(state: &VaultState, entity: Entity, parent_id: Option<&str>) -> VaultState {
    let id = entity.id.clone();
    if state.type_index.contains_key(&id) || locate_entity(state, &id).is_some() {
        warn!(entity_id = %id, "entity already exists");
        return state.clone();
    }
    if state.trashed_entities.contains_key(&id) {
        warn!(entity_id = %id, "id belongs to a trashed entity");
        return state.clone();
    }
    if let Some(parent) = parent_id {
        match get_entity_type(state, parent) {
            None => {
                debug!(entity_id = %id, parent = %parent, "parent does not exist");
                return state.clone();
            }
            Some(parent_kind) if !parent_kind.can_own(entity.kind) => {
                warn!(entity_id = %id, parent = %parent, kind = %entity.kind, "{parent_kind} cannot own {}", entity.kind);
                return state.clone();
            }
            Some(_) => {}
        }
    }

    let kind = entity.kind;
    let mut next = state.clone();
    next.entities.bucket_mut(kind).insert(id.clone(), Arc::new(entity));
    Arc::make_mut(&mut next.type_index).insert(id.clone(), kind);

    match parent_id {
        Some(parent) => {
            attach_id(Arc::make_mut(&mut next.references), parent, id.clone(), None);
            Arc::make_mut(&mut next.reverse_refs).insert(id, parent.to_string());
        }
        None if next.root_id.is_none() => next.root_id = Some(id),
        None => {}
    }

    next
}

/// Remove an entity: to the trash by default, or purged with
/// [`RemoveOptions::permanent`]
pub fn remove_entity(state: &VaultState, id: &str, options: RemoveOptions) -> VaultState {
    if !options.permanent {
        return move_entity_to_trash(state, id);
    }

    match excise_subtree(state, id) {
        Some(next) => {
            info!(entity_id = %id, "permanently removed entity and descendants");
            next
        }
        None => {
            debug!(entity_id = %id, "remove_entity on unknown entity");
            state.clone()
        }
    }
}

/// Purge `id` and its ownership subtree from every active index.
///
/// Shared by permanent deletion and the trash. Returns `None` if `id` is not
/// an active entity.
pub(crate) fn excise_subtree(state: &VaultState, id: &str) -> Option<VaultState> {
    get_entity_type(state, id)?;

    let descendants = get_descendants(state, id);
    let doomed: Vec<&str> = std::iter::once(id)
        .chain(descendants.iter().map(String::as_str))
        .collect();
    let removed: HashSet<&str> = doomed.iter().copied().collect();

    let mut next = state.clone();

    for doomed_id in &doomed {
        if let Some(kind) = get_entity_type(state, doomed_id) {
            next.entities.bucket_mut(kind).remove(*doomed_id);
        }
    }

    let type_index = Arc::make_mut(&mut next.type_index);
    for doomed_id in &doomed {
        type_index.remove(*doomed_id);
    }

    let parent = get_parent_id(state, id);
    if parent.is_some() || doomed.iter().any(|d| state.references.contains_key(*d)) {
        let references = Arc::make_mut(&mut next.references);
        if let Some(parent) = parent {
            detach_id(references, parent, id);
        }
        for doomed_id in &doomed {
            references.remove(*doomed_id);
        }
    }

    if doomed.iter().any(|d| state.reverse_refs.contains_key(*d)) {
        let reverse_refs = Arc::make_mut(&mut next.reverse_refs);
        for doomed_id in &doomed {
            reverse_refs.remove(*doomed_id);
        }
    }

    unlink_all(&mut next, &removed);

    if doomed.iter().any(|d| state.extensions.contains_key(*d)) {
        let extensions = Arc::make_mut(&mut next.extensions);
        for doomed_id in &doomed {
            extensions.remove(*doomed_id);
        }
    }

    if next.root_id.as_deref().is_some_and(|root| removed.contains(root)) {
        next.root_id = None;
    }

    Some(next)
}

/// Move `id` under `new_parent_id`, at `index` or appended
pub fn move_entity(state: &VaultState, id: &str, new_parent_id: &str, index: Option<usize>) -> VaultState {
    let Some(kind) = get_entity_type(state, id) else {
        debug!(entity_id = %id, "move_entity on unknown entity");
        return state.clone();
    };
    let Some(parent_kind) = get_entity_type(state, new_parent_id) else {
        debug!(entity_id = %id, parent = %new_parent_id, "move target does not exist");
        return state.clone();
    };
    if !parent_kind.can_own(kind) {
        warn!(entity_id = %id, parent = %new_parent_id, "{parent_kind} cannot own {kind}");
        return state.clone();
    }
    if id == new_parent_id || is_descendant_of(state, new_parent_id, id) {
        warn!(entity_id = %id, parent = %new_parent_id, "move would create a cycle");
        return state.clone();
    }

    let mut next = state.clone();
    let references = Arc::make_mut(&mut next.references);
    if let Some(old_parent) = get_parent_id(state, id) {
        detach_id(references, old_parent, id);
    }
    attach_id(references, new_parent_id, id.to_string(), index);
    Arc::make_mut(&mut next.reverse_refs).insert(id.to_string(), new_parent_id.to_string());
    reroot_after_attach(&mut next, id);

    next
}

/// Replace the ordered child list of `parent_id` wholesale.
///
/// The list is not validated; supplying a permutation of the current
/// children is the caller's responsibility.
pub fn reorder_children(state: &VaultState, parent_id: &str, new_order: Vec<EntityId>) -> VaultState {
    if !has_entity(state, parent_id) {
        debug!(parent = %parent_id, "reorder_children on unknown entity");
        return state.clone();
    }

    let mut next = state.clone();
    let references = Arc::make_mut(&mut next.references);
    if new_order.is_empty() {
        references.remove(parent_id);
    } else {
        references.insert(parent_id.to_string(), Arc::new(new_order));
    }
    next
}

/// Insert an existing parentless entity into `parent_id`'s child list
pub fn insert_child_at(state: &VaultState, parent_id: &str, child_id: &str, index: usize) -> VaultState {
    let (Some(parent_kind), Some(child_kind)) =
        (get_entity_type(state, parent_id), get_entity_type(state, child_id))
    else {
        debug!(parent = %parent_id, child = %child_id, "insert_child_at with unknown entity");
        return state.clone();
    };
    if !parent_kind.can_own(child_kind) {
        warn!(parent = %parent_id, child = %child_id, "{parent_kind} cannot own {child_kind}");
        return state.clone();
    }
    match get_parent_id(state, child_id) {
        Some(current) if current == parent_id => return state.clone(),
        Some(current) => {
            warn!(child = %child_id, current_parent = %current, "child is owned elsewhere, use move_entity");
            return state.clone();
        }
        None => {}
    }
    if child_id == parent_id || is_descendant_of(state, parent_id, child_id) {
        warn!(parent = %parent_id, child = %child_id, "insert would create a cycle");
        return state.clone();
    }

    let mut next = state.clone();
    attach_id(
        Arc::make_mut(&mut next.references),
        parent_id,
        child_id.to_string(),
        Some(index),
    );
    Arc::make_mut(&mut next.reverse_refs).insert(child_id.to_string(), parent_id.to_string());
    reroot_after_attach(&mut next, child_id);
    next
}

/// Drop `child_id` from `parent_id`'s child list; the child stays active,
/// parentless
pub fn remove_child(state: &VaultState, parent_id: &str, child_id: &str) -> VaultState {
    if !get_child_ids(state, parent_id).iter().any(|c| c == child_id) {
        debug!(parent = %parent_id, child = %child_id, "not a child, nothing to remove");
        return state.clone();
    }

    let mut next = state.clone();
    detach_id(Arc::make_mut(&mut next.references), parent_id, child_id);
    if get_parent_id(state, child_id) == Some(parent_id) {
        Arc::make_mut(&mut next.reverse_refs).remove(child_id);
    }
    next
}

/// A root that just gained a parent hands the root role to its new top-most
/// ancestor
fn reroot_after_attach(state: &mut VaultState, id: &str) {
    if state.root_id.as_deref() == Some(id) {
        state.root_id = get_ancestors(state, id).into_iter().next();
    }
}
