//! # Trash
//!
//! Soft deletion. An entity moves `Active → Trashed`, and from there either
//! back to `Active` ([`restore_entity_from_trash`]) or out of the store for
//! good ([`purge_from_trash`], [`empty_trash`]).
//!
//! Trashing takes a detached snapshot of the entity and its whole ownership
//! subtree, then excises the subtree from the active indices with the same
//! routine permanent deletion uses. Only the trashed root gets an entry in
//! `trashed_entities`; its descendants travel inside that entry and are not
//! restorable on their own.

use crate::collections::{
    get_collection_members, get_member_of_collections, get_reference_label, link, link_at, set_label,
    would_create_cycle,
};
use crate::copy::DeepCopy;
use crate::diagnostic::{Diagnostic, DiagnosticKind, Outcome};
use crate::errors::{VaultError, VaultResult};
use crate::extensions::get_extensions;
use crate::model::{attach_id, Entity, EntityId, EntityKind, ReferenceLabels, TrashedEntity, TrashedNode, VaultState};
use crate::mutations::excise_subtree;
use crate::query::{get_child_ids, get_descendants, get_entity, get_entity_type, get_parent_id, has_entity};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where to put a restored entity. Unset fields fall back to the position
/// recorded when it was trashed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreOptions {
    pub parent_id: Option<EntityId>,
    pub index: Option<usize>,
}

impl RestoreOptions {
    pub fn under(parent_id: impl Into<EntityId>) -> Self {
        Self {
            parent_id: Some(parent_id.into()),
            index: None,
        }
    }

    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

/// Result of emptying the trash: the batch never stops at the first failure
#[derive(Debug)]
pub struct EmptyTrashResult {
    pub state: VaultState,
    pub deleted_count: usize,
    pub errors: Vec<(EntityId, VaultError)>,
}

/// Soft-delete `id` and its ownership subtree
pub fn move_entity_to_trash(state: &VaultState, id: &str) -> VaultState {
    move_entity_to_trash_at(state, id, Utc::now())
}

pub(crate) fn move_entity_to_trash_at(state: &VaultState, id: &str, trashed_at: DateTime<Utc>) -> VaultState {
    let Some(entity) = get_entity(state, id) else {
        debug!(entity_id = %id, "move_entity_to_trash on unknown entity");
        return state.clone();
    };

    let parent = get_parent_id(state, id);
    let snapshot = TrashedEntity {
        entity: entity.deep_copy(),
        extensions: get_extensions(state, id).map(DeepCopy::deep_copy),
        original_parent_id: parent.map(str::to_string),
        original_index: parent.and_then(|p| get_child_ids(state, p).iter().position(|c| c == id)),
        trashed_at,
        member_of_collections: get_member_of_collections(state, id).to_vec(),
        membership_positions: membership_positions(state, id),
        collection_members: get_collection_members(state, id).to_vec(),
        member_labels: member_labels(state, id),
        listed_labels: listed_labels(state, id),
        child_ids: get_child_ids(state, id).to_vec(),
        was_root: state.root_id.as_deref() == Some(id),
        descendants: get_descendants(state, id)
            .iter()
            .filter_map(|descendant| snapshot_node(state, descendant))
            .collect(),
    };

    let Some(mut next) = excise_subtree(state, id) else {
        return state.clone();
    };
    info!(entity_id = %id, descendants = snapshot.descendants.len(), "moved entity to trash");
    Arc::make_mut(&mut next.trashed_entities).insert(id.to_string(), Arc::new(snapshot));
    next
}

fn snapshot_node(state: &VaultState, id: &str) -> Option<TrashedNode> {
    let entity = get_entity(state, id)?;
    Some(TrashedNode {
        entity: entity.deep_copy(),
        extensions: get_extensions(state, id).map(DeepCopy::deep_copy),
        child_ids: get_child_ids(state, id).to_vec(),
        member_of_collections: get_member_of_collections(state, id).to_vec(),
        membership_positions: membership_positions(state, id),
        collection_members: get_collection_members(state, id).to_vec(),
        member_labels: member_labels(state, id),
        listed_labels: listed_labels(state, id),
    })
}

fn membership_positions(state: &VaultState, id: &str) -> HashMap<EntityId, usize> {
    get_member_of_collections(state, id)
        .iter()
        .filter_map(|collection| {
            get_collection_members(state, collection)
                .iter()
                .position(|member| member == id)
                .map(|position| (collection.clone(), position))
        })
        .collect()
}

fn member_labels(state: &VaultState, id: &str) -> ReferenceLabels {
    state
        .reference_labels
        .get(id)
        .map(|labels| labels.as_ref().clone())
        .unwrap_or_default()
}

fn listed_labels(state: &VaultState, id: &str) -> ReferenceLabels {
    get_member_of_collections(state, id)
        .iter()
        .filter_map(|collection| {
            get_reference_label(state, collection, id).map(|label| (collection.clone(), label.cloned()))
        })
        .collect()
}

/// Bring a trashed subtree back into the active indices.
///
/// Without options the entity returns to its original parent at its original
/// position; if that parent is gone it comes back parentless. Collection
/// memberships are re-established where the collection still exists.
pub fn restore_entity_from_trash(state: &VaultState, id: &str, options: RestoreOptions) -> Outcome {
    let Some(trashed) = state.trashed_entities.get(id).cloned() else {
        warn!(entity_id = %id, "restore requested for an id that is not in the trash");
        return Outcome::with(
            state.clone(),
            Diagnostic::warning(DiagnosticKind::InvalidRestore, format!("'{id}' is not in the trash"))
                .for_entity(id),
        );
    };

    if let Some(active) = trashed.subtree_ids().find(|member| has_entity(state, member)) {
        warn!(entity_id = %id, conflict = %active, "restore would duplicate an active entity");
        return Outcome::with(
            state.clone(),
            Diagnostic::warning(
                DiagnosticKind::RestoreConflict,
                format!("cannot restore '{id}': '{active}' is active again"),
            )
            .for_entity(id)
            .with_suggestion("remove or rename the active entity first"),
        );
    }

    let mut diagnostics = Vec::new();
    let placement = match resolve_placement(state, &trashed, &options) {
        Ok(placement) => placement,
        Err(diagnostic) => return Outcome::with(state.clone(), diagnostic),
    };
    if placement.is_none() && trashed.original_parent_id.is_some() && options.parent_id.is_none() {
        debug!(entity_id = %id, "original parent is gone, restoring parentless");
        diagnostics.push(
            Diagnostic::info(
                DiagnosticKind::NotFound,
                format!("original parent of '{id}' no longer exists, restored without a parent"),
            )
            .for_entity(id),
        );
    }

    let mut next = state.clone();
    let root_node = TrashedNode {
        entity: trashed.entity.clone(),
        extensions: trashed.extensions.clone(),
        child_ids: trashed.child_ids.clone(),
        member_of_collections: trashed.member_of_collections.clone(),
        membership_positions: trashed.membership_positions.clone(),
        collection_members: trashed.collection_members.clone(),
        member_labels: trashed.member_labels.clone(),
        listed_labels: trashed.listed_labels.clone(),
    };
    let nodes: Vec<&TrashedNode> = std::iter::once(&root_node).chain(trashed.descendants.iter()).collect();

    for node in &nodes {
        reinsert_node(&mut next, node);
    }

    if let Some((parent, index)) = placement {
        attach_id(Arc::make_mut(&mut next.references), &parent, id.to_string(), index);
        Arc::make_mut(&mut next.reverse_refs).insert(id.to_string(), parent);
    }

    for node in &nodes {
        relink_members(&mut next, node);
    }
    rejoin_collections(&mut next, &nodes);
    for node in &nodes {
        restore_membership_order(&mut next, node);
        restore_reference_labels(&mut next, node);
    }

    if trashed.was_root && next.root_id.is_none() {
        next.root_id = Some(id.to_string());
    }

    Arc::make_mut(&mut next.trashed_entities).remove(id);
    info!(entity_id = %id, "restored entity from trash");

    Outcome { state: next, diagnostics }
}

type Placement = Option<(EntityId, Option<usize>)>;

fn resolve_placement(state: &VaultState, trashed: &TrashedEntity, options: &RestoreOptions) -> Result<Placement, Diagnostic> {
    let kind = trashed.entity.kind;

    if let Some(parent) = &options.parent_id {
        return match get_entity_type(state, parent) {
            Some(parent_kind) if parent_kind.can_own(kind) => Ok(Some((parent.clone(), options.index))),
            Some(parent_kind) => {
                warn!(entity_id = %trashed.entity.id, parent = %parent, "{parent_kind} cannot own {kind}");
                Err(rejected(&trashed.entity, format!("{parent_kind} '{parent}' cannot own a {kind}")))
            }
            None => {
                warn!(entity_id = %trashed.entity.id, parent = %parent, "restore target does not exist");
                Err(rejected(&trashed.entity, format!("restore target '{parent}' does not exist")))
            }
        };
    }

    let Some(parent) = &trashed.original_parent_id else {
        return Ok(None);
    };
    match get_entity_type(state, parent) {
        Some(parent_kind) if parent_kind.can_own(kind) => {
            Ok(Some((parent.clone(), options.index.or(trashed.original_index))))
        }
        _ => Ok(None),
    }
}

fn rejected(entity: &Entity, message: String) -> Diagnostic {
    Diagnostic::warning(DiagnosticKind::Rejected, message).for_entity(entity.id.clone())
}

fn reinsert_node(state: &mut VaultState, node: &TrashedNode) {
    let id = node.entity.id.clone();
    let kind: EntityKind = node.entity.kind;

    state
        .entities
        .bucket_mut(kind)
        .insert(id.clone(), Arc::new(node.entity.clone()));
    Arc::make_mut(&mut state.type_index).insert(id.clone(), kind);

    if !node.child_ids.is_empty() {
        Arc::make_mut(&mut state.references).insert(id.clone(), Arc::new(node.child_ids.clone()));
        let reverse_refs = Arc::make_mut(&mut state.reverse_refs);
        for child in &node.child_ids {
            reverse_refs.insert(child.clone(), id.clone());
        }
    }

    if let Some(extensions) = &node.extensions {
        Arc::make_mut(&mut state.extensions).insert(id, Arc::new(extensions.clone()));
    }
}

/// Rebuild a restored collection's own member list in its snapshot order
fn relink_members(state: &mut VaultState, node: &TrashedNode) {
    let id = node.entity.id.as_str();

    for member in &node.collection_members {
        if !has_entity(state, member) {
            debug!(entity_id = %id, member = %member, "member no longer exists, skipping membership");
            continue;
        }
        if get_collection_members(state, id).iter().any(|m| m == member) {
            continue;
        }
        if would_create_cycle(state, id, member) {
            warn!(entity_id = %id, member = %member, "membership would now form a cycle, skipping");
            continue;
        }
        link(state, id, member);
    }
}

/// Put restored nodes back into collections outside the restored subtree.
///
/// Inserts run in ascending recorded position so that several restored
/// members of one collection land back at their original indices.
fn rejoin_collections(state: &mut VaultState, nodes: &[&TrashedNode]) {
    let mut pending: Vec<(Option<usize>, &str, &str)> = nodes
        .iter()
        .flat_map(|node| {
            node.member_of_collections.iter().map(move |collection| {
                (
                    node.membership_positions.get(collection).copied(),
                    collection.as_str(),
                    node.entity.id.as_str(),
                )
            })
        })
        .collect();
    pending.sort_by_key(|(position, _, _)| position.unwrap_or(usize::MAX));

    for (position, collection, id) in pending {
        if get_entity_type(state, collection) != Some(EntityKind::Collection) {
            debug!(entity_id = %id, collection = %collection, "collection no longer exists, skipping membership");
            continue;
        }
        if get_collection_members(state, collection).iter().any(|m| m == id) {
            continue;
        }
        if would_create_cycle(state, collection, id) {
            warn!(entity_id = %id, collection = %collection, "membership would now form a cycle, skipping");
            continue;
        }
        link_at(state, collection, id, position);
    }
}

/// Put a restored node's own collection list back in snapshot order
fn restore_membership_order(state: &mut VaultState, node: &TrashedNode) {
    let id = node.entity.id.as_str();
    let current = get_member_of_collections(state, id);
    let mut ordered = current.to_vec();
    ordered.sort_by_key(|collection| {
        node.member_of_collections
            .iter()
            .position(|recorded| recorded == collection)
            .unwrap_or(usize::MAX)
    });
    if ordered.as_slice() != current {
        Arc::make_mut(&mut state.member_of_collections).insert(id.to_string(), Arc::new(ordered));
    }
}

/// Put back the reference labels of every membership that was re-established
fn restore_reference_labels(state: &mut VaultState, node: &TrashedNode) {
    let id = node.entity.id.as_str();

    for (member, label) in &node.member_labels {
        if get_collection_members(state, id).iter().any(|m| m == member) {
            set_label(state, id, member, label.clone());
        }
    }
    for (collection, label) in &node.listed_labels {
        if get_collection_members(state, collection).iter().any(|m| m == id) {
            set_label(state, collection, id, label.clone());
        }
    }
}

/// Permanently delete one trashed subtree
pub fn purge_from_trash(state: &VaultState, id: &str) -> VaultResult<VaultState> {
    let Some(trashed) = state.trashed_entities.get(id) else {
        return Err(VaultError::NotInTrash(id.to_string()));
    };
    if trashed.entity.id != id {
        return Err(VaultError::TrashConflict(format!(
            "trash entry '{id}' holds a snapshot of '{}'",
            trashed.entity.id
        )));
    }
    if let Some(active) = trashed.subtree_ids().find(|member| has_entity(state, member)) {
        return Err(VaultError::TrashConflict(format!(
            "'{active}' is both trashed and active"
        )));
    }

    let mut next = state.clone();
    Arc::make_mut(&mut next.trashed_entities).remove(id);
    debug!(entity_id = %id, "purged from trash");
    Ok(next)
}

/// Permanently delete everything in the trash
pub fn empty_trash(state: &VaultState) -> EmptyTrashResult {
    empty_trash_with(state, purge_from_trash)
}

/// Empty the trash using `purge` for each id, in id order.
///
/// A failing id is recorded and skipped; the rest are still processed.
pub fn empty_trash_with<F>(state: &VaultState, mut purge: F) -> EmptyTrashResult
where
    F: FnMut(&VaultState, &str) -> VaultResult<VaultState>,
{
    let mut ids: Vec<EntityId> = state.trashed_entities.keys().cloned().collect();
    ids.sort();

    let mut current = state.clone();
    let mut deleted_count = 0;
    let mut errors = Vec::new();
    for id in ids {
        match purge(&current, &id) {
            Ok(next) => {
                current = next;
                deleted_count += 1;
            }
            Err(error) => {
                warn!(entity_id = %id, %error, "failed to purge trashed entity");
                errors.push((id, error));
            }
        }
    }

    info!(deleted_count, failed = errors.len(), "emptied trash");
    EmptyTrashResult {
        state: current,
        deleted_count,
        errors,
    }
}

/// Trashed entries, oldest first
pub fn list_trash(state: &VaultState) -> Vec<&TrashedEntity> {
    let mut entries: Vec<&TrashedEntity> = state.trashed_entities.values().map(Arc::as_ref).collect();
    entries.sort_by(|a, b| a.trashed_at.cmp(&b.trashed_at).then_with(|| a.entity.id.cmp(&b.entity.id)));
    entries
}

pub fn is_trashed(state: &VaultState, id: &str) -> bool {
    state.trashed_entities.contains_key(id)
}

pub fn get_trashed<'a>(state: &'a VaultState, id: &str) -> Option<&'a TrashedEntity> {
    state.trashed_entities.get(id).map(Arc::as_ref)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::add_to_collection;
    use crate::normalize::normalize;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample() -> VaultState {
        let state = normalize(&json!({
            "id": "root",
            "type": "Collection",
            "items": [
                {"id": "m0", "type": "Manifest", "items": []},
                {
                    "id": "m1",
                    "type": "Manifest",
                    "x-archive:box": 7,
                    "items": [
                        {"id": "c1", "type": "Canvas", "items": [{"id": "p1", "type": "AnnotationPage", "items": []}]},
                        {"id": "c2", "type": "Canvas"}
                    ]
                },
                {"id": "shelf", "type": "Collection", "items": []}
            ]
        }))
        .unwrap();
        add_to_collection(&state, "shelf", "m1")
    }

    #[test]
    fn test_trash_excises_subtree() {
        let state = sample();
        let next = move_entity_to_trash(&state, "m1");

        for id in ["m1", "c1", "c2", "p1"] {
            assert!(!has_entity(&next, id));
            assert!(!next.type_index.contains_key(id));
            assert!(!next.references.contains_key(id));
            assert!(!next.reverse_refs.contains_key(id));
            assert!(!next.member_of_collections.contains_key(id));
        }
        assert_eq!(next.trashed_entities.len(), 1);
        assert_eq!(get_child_ids(&next, "root"), ["m0", "shelf"]);
        assert!(get_collection_members(&next, "shelf").is_empty());

        let trashed = get_trashed(&next, "m1").unwrap();
        assert_eq!(trashed.original_parent_id.as_deref(), Some("root"));
        assert_eq!(trashed.original_index, Some(1));
        assert_eq!(trashed.member_of_collections, ["root", "shelf"]);
        assert_eq!(trashed.child_ids, ["c1", "c2"]);
        assert_eq!(trashed.subtree_ids().collect::<Vec<_>>(), ["m1", "c1", "p1", "c2"]);
        assert!(trashed.extensions.is_some());
    }

    #[test]
    fn test_restore_round_trip() {
        let state = sample();
        let trashed = move_entity_to_trash(&state, "m1");
        let outcome = restore_entity_from_trash(&trashed, "m1", RestoreOptions::default());
        assert!(outcome.is_clean());
        let restored = outcome.state;

        assert_eq!(get_child_ids(&restored, "root"), ["m0", "m1", "shelf"]);
        assert_eq!(get_child_ids(&restored, "m1"), ["c1", "c2"]);
        assert_eq!(get_parent_id(&restored, "p1"), Some("c1"));
        assert_eq!(get_entity(&restored, "m1"), get_entity(&state, "m1"));
        assert_eq!(get_extensions(&restored, "m1"), get_extensions(&state, "m1"));
        assert_eq!(get_member_of_collections(&restored, "m1"), ["root", "shelf"]);
        assert!(restored.trashed_entities.is_empty());
    }

    #[test]
    fn test_restore_with_override() {
        let trashed = move_entity_to_trash(&sample(), "c2");
        let restored = restore_entity_from_trash(&trashed, "c2", RestoreOptions::under("m1").at(0)).state;
        assert_eq!(get_child_ids(&restored, "m1"), ["c2", "c1"]);

        let outcome = restore_entity_from_trash(&trashed, "c2", RestoreOptions::under("root"));
        assert!(outcome.has(DiagnosticKind::Rejected));
        assert_eq!(outcome.state, trashed);
    }

    #[test]
    fn test_restore_without_parent() {
        let state = move_entity_to_trash(&sample(), "c1");
        let state = crate::mutations::remove_entity(&state, "m1", crate::mutations::RemoveOptions::permanent());
        let outcome = restore_entity_from_trash(&state, "c1", RestoreOptions::default());

        assert!(has_entity(&outcome.state, "c1"));
        assert!(get_parent_id(&outcome.state, "c1").is_none());
        assert_eq!(get_child_ids(&outcome.state, "c1"), ["p1"]);
        assert!(outcome.has(DiagnosticKind::NotFound));
    }

    #[test]
    fn test_restore_unknown_and_conflict() {
        let state = sample();
        let outcome = restore_entity_from_trash(&state, "m1", RestoreOptions::default());
        assert!(outcome.has(DiagnosticKind::InvalidRestore));
        assert_eq!(outcome.state, state);

        let trashed = move_entity_to_trash(&state, "c2");
        let reused = crate::mutations::add_entity(&trashed, Entity::new("c2-new", EntityKind::Canvas), Some("m1"));
        // c2 itself is free, so this one is fine
        assert!(restore_entity_from_trash(&reused, "c2", RestoreOptions::default()).is_clean());

        let mut clashing = trashed.clone();
        clashing.entities.bucket_mut(EntityKind::Canvas).insert("c2".into(), Arc::new(Entity::new("c2", EntityKind::Canvas)));
        let outcome = restore_entity_from_trash(&clashing, "c2", RestoreOptions::default());
        assert!(outcome.has(DiagnosticKind::RestoreConflict));
    }

    #[test]
    fn test_restore_root() {
        let state = move_entity_to_trash(&sample(), "root");
        assert!(state.root_id.is_none());
        assert!(state.entities.is_empty());
        let restored = restore_entity_from_trash(&state, "root", RestoreOptions::default()).state;
        assert_eq!(restored.root_id.as_deref(), Some("root"));
        assert_eq!(get_collection_members(&restored, "shelf"), ["m1"]);
        assert_eq!(restored.entities.len(), sample().entities.len());
    }

    #[test]
    fn test_purge_and_empty() {
        let state = move_entity_to_trash(&move_entity_to_trash(&sample(), "m0"), "c2");
        assert!(matches!(purge_from_trash(&state, "m1"), Err(VaultError::NotInTrash(_))));

        let purged = purge_from_trash(&state, "m0").unwrap();
        assert!(!is_trashed(&purged, "m0"));
        assert!(is_trashed(&purged, "c2"));

        let result = empty_trash(&state);
        assert_eq!(result.deleted_count, 2);
        assert!(result.errors.is_empty());
        assert!(result.state.trashed_entities.is_empty());
    }

    #[test]
    fn test_empty_trash_collects_failures() {
        let state = move_entity_to_trash(&move_entity_to_trash(&sample(), "m0"), "c2");
        let result = empty_trash_with(&state, |current, id| {
            if id == "c2" {
                Err(VaultError::TrashConflict("simulated".into()))
            } else {
                purge_from_trash(current, id)
            }
        });

        assert_eq!(result.deleted_count, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].0, "c2");
        assert!(!is_trashed(&result.state, "m0"));
        assert!(is_trashed(&result.state, "c2"));
    }

    #[test]
    fn test_list_trash_oldest_first() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let state = move_entity_to_trash_at(&sample(), "c2", late);
        let state = move_entity_to_trash_at(&state, "m0", early);

        let ids: Vec<&str> = list_trash(&state).iter().map(|t| t.entity.id.as_str()).collect();
        assert_eq!(ids, ["m0", "c2"]);
    }
}
