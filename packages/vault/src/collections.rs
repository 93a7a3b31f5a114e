//! Collection membership
//!
//! A many-to-many reference graph between Collections and the Manifests or
//! Collections they list. It is kept separate from ownership: nothing here
//! reads or writes `references`/`reverse_refs`.

use crate::model::{attach_id, detach_id, EntityId, EntityKind, VaultState};
use crate::query::{get_entities_by_type, get_entity_type};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Members listed by a collection, in order
pub fn get_collection_members<'a>(state: &'a VaultState, collection_id: &str) -> &'a [EntityId] {
    state
        .collection_members
        .get(collection_id)
        .map(|members| members.as_slice())
        .unwrap_or(&[])
}

/// Collections that list `member_id`
pub fn get_member_of_collections<'a>(state: &'a VaultState, member_id: &str) -> &'a [EntityId] {
    state
        .member_of_collections
        .get(member_id)
        .map(|collections| collections.as_slice())
        .unwrap_or(&[])
}

/// Add a membership edge `collection_id → member_id`
pub fn add_to_collection(state: &VaultState, collection_id: &str, member_id: &str) -> VaultState {
    if get_entity_type(state, collection_id) != Some(EntityKind::Collection) {
        debug!(collection_id = %collection_id, "add_to_collection: not an active collection");
        return state.clone();
    }
    match get_entity_type(state, member_id) {
        Some(kind) if kind.is_collectable() => {}
        Some(kind) => {
            warn!(member_id = %member_id, kind = %kind, "only manifests and collections can be members");
            return state.clone();
        }
        None => {
            debug!(member_id = %member_id, "add_to_collection: member does not exist");
            return state.clone();
        }
    }
    if get_collection_members(state, collection_id).iter().any(|m| m == member_id) {
        return state.clone();
    }
    if would_create_cycle(state, collection_id, member_id) {
        warn!(collection_id = %collection_id, member_id = %member_id, "membership would create a cycle");
        return state.clone();
    }

    let mut next = state.clone();
    link(&mut next, collection_id, member_id);
    next
}

/// Remove a membership edge; ownership is untouched
pub fn remove_from_collection(state: &VaultState, collection_id: &str, member_id: &str) -> VaultState {
    if !get_collection_members(state, collection_id).iter().any(|m| m == member_id) {
        debug!(collection_id = %collection_id, member_id = %member_id, "not a member, nothing to remove");
        return state.clone();
    }

    let mut next = state.clone();
    detach_id(Arc::make_mut(&mut next.collection_members), collection_id, member_id);
    detach_id(Arc::make_mut(&mut next.member_of_collections), member_id, collection_id);
    forget_label(&mut next, collection_id, member_id);
    next
}

/// Label a collection's reference to `member_id` carried, when it differs
/// from the member's own. `Some(None)` is a reference without a label.
pub fn get_reference_label<'a>(
    state: &'a VaultState,
    collection_id: &str,
    member_id: &str,
) -> Option<Option<&'a Value>> {
    state
        .reference_labels
        .get(collection_id)
        .and_then(|labels| labels.get(member_id))
        .map(Option::as_ref)
}

/// Replace a collection's member order wholesale.
///
/// The caller supplies the full list; ids that are not already members are
/// ignored so that the relation stays symmetric.
pub fn reorder_collection_members(state: &VaultState, collection_id: &str, order: Vec<EntityId>) -> VaultState {
    let current = get_collection_members(state, collection_id);
    if current.is_empty() {
        return state.clone();
    }

    let known: HashSet<&str> = current.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    let mut reordered: Vec<EntityId> = order
        .into_iter()
        .filter(|id| known.contains(id.as_str()) && seen.insert(id.clone()))
        .collect();
    // members the caller left out keep their relative order at the end
    reordered.extend(current.iter().filter(|id| !seen.contains(*id)).cloned());

    let mut next = state.clone();
    Arc::make_mut(&mut next.collection_members).insert(collection_id.to_string(), Arc::new(reordered));
    next
}

/// True iff `id` is a Manifest that no collection lists
pub fn is_orphan_manifest(state: &VaultState, id: &str) -> bool {
    get_entity_type(state, id) == Some(EntityKind::Manifest)
        && get_member_of_collections(state, id).is_empty()
}

/// All manifests without any collection membership, ordered by id
pub fn get_orphan_manifests(state: &VaultState) -> Vec<EntityId> {
    get_entities_by_type(state, EntityKind::Manifest)
        .into_iter()
        .filter(|manifest| get_member_of_collections(state, &manifest.id).is_empty())
        .map(|manifest| manifest.id.clone())
        .collect()
}

/// Would listing `member_id` in `collection_id` close a membership loop?
pub fn would_create_cycle(state: &VaultState, collection_id: &str, member_id: &str) -> bool {
    if collection_id == member_id {
        return true;
    }

    let mut visited = HashSet::new();
    let mut stack = vec![member_id];
    while let Some(current) = stack.pop() {
        if current == collection_id {
            return true;
        }
        if !visited.insert(current) {
            continue;
        }
        stack.extend(get_collection_members(state, current).iter().map(String::as_str));
    }
    false
}

pub(crate) fn set_label(state: &mut VaultState, collection_id: &str, member_id: &str, label: Option<Value>) {
    let labels = Arc::make_mut(&mut state.reference_labels);
    Arc::make_mut(labels.entry(collection_id.to_string()).or_default()).insert(member_id.to_string(), label);
}

fn forget_label(state: &mut VaultState, collection_id: &str, member_id: &str) {
    let recorded = state
        .reference_labels
        .get(collection_id)
        .is_some_and(|labels| labels.contains_key(member_id));
    if !recorded {
        return;
    }
    let labels = Arc::make_mut(&mut state.reference_labels);
    if let Some(entry) = labels.get_mut(collection_id) {
        Arc::make_mut(entry).remove(member_id);
        if entry.is_empty() {
            labels.remove(collection_id);
        }
    }
}

pub(crate) fn link(state: &mut VaultState, collection_id: &str, member_id: &str) {
    link_at(state, collection_id, member_id, None);
}

/// Link with the member placed at `index` in the collection's list
pub(crate) fn link_at(state: &mut VaultState, collection_id: &str, member_id: &str, index: Option<usize>) {
    if get_collection_members(state, collection_id).iter().any(|m| m == member_id) {
        return;
    }
    attach_id(
        Arc::make_mut(&mut state.collection_members),
        collection_id,
        member_id.to_string(),
        index,
    );
    attach_id(
        Arc::make_mut(&mut state.member_of_collections),
        member_id,
        collection_id.to_string(),
        None,
    );
}

/// Drop every membership edge touching a removed id. Edges between two
/// removed ids vanish with their keys; edges to survivors are detached on
/// the survivor's side. Maps with nothing to remove stay shared.
pub(crate) fn unlink_all(state: &mut VaultState, removed: &HashSet<&str>) {
    let touches = removed.iter().any(|id| {
        state.collection_members.contains_key(*id) || state.member_of_collections.contains_key(*id)
    });
    if !touches {
        return;
    }

    let mut lists_of: Vec<(EntityId, EntityId)> = Vec::new();
    let mut members_of: Vec<(EntityId, EntityId)> = Vec::new();
    for id in removed {
        for collection in get_member_of_collections(state, id) {
            if !removed.contains(collection.as_str()) {
                lists_of.push((collection.clone(), id.to_string()));
            }
        }
        for member in get_collection_members(state, id) {
            if !removed.contains(member.as_str()) {
                members_of.push((member.clone(), id.to_string()));
            }
        }
    }

    let collection_members = Arc::make_mut(&mut state.collection_members);
    for (collection, member) in &lists_of {
        detach_id(collection_members, collection, member);
    }
    for id in removed {
        collection_members.remove(*id);
    }

    let member_of = Arc::make_mut(&mut state.member_of_collections);
    for (member, collection) in &members_of {
        detach_id(member_of, member, collection);
    }
    for id in removed {
        member_of.remove(*id);
    }

    for (collection, member) in &lists_of {
        forget_label(state, collection, member);
    }
    if removed.iter().any(|id| state.reference_labels.contains_key(*id)) {
        let labels = Arc::make_mut(&mut state.reference_labels);
        for id in removed {
            labels.remove(*id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use serde_json::json;

    fn sample() -> VaultState {
        normalize(&json!({
            "id": "root",
            "type": "Collection",
            "items": [
                {"id": "letters", "type": "Collection", "items": [{"id": "m1", "type": "Manifest", "items": []}]},
                {"id": "photos", "type": "Collection", "items": []},
                {"id": "m2", "type": "Manifest", "items": [{"id": "c2", "type": "Canvas"}]}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_membership_is_symmetric() {
        let state = sample();
        let next = add_to_collection(&state, "photos", "m1");

        assert_eq!(get_collection_members(&next, "photos"), ["m1"]);
        assert_eq!(get_member_of_collections(&next, "m1"), ["letters", "photos"]);
        // ownership untouched
        assert!(Arc::ptr_eq(&next.references, &state.references));
        assert!(Arc::ptr_eq(&next.reverse_refs, &state.reverse_refs));
        // original unchanged
        assert!(get_collection_members(&state, "photos").is_empty());

        let back = remove_from_collection(&next, "photos", "m1");
        assert!(get_collection_members(&back, "photos").is_empty());
        assert_eq!(get_member_of_collections(&back, "m1"), ["letters"]);
    }

    #[test]
    fn test_rejects_invalid_members() {
        let state = sample();
        let next = add_to_collection(&state, "photos", "c2");
        assert!(get_collection_members(&next, "photos").is_empty());

        let next = add_to_collection(&state, "m2", "m1");
        assert!(get_collection_members(&next, "m2").is_empty());

        let next = add_to_collection(&state, "photos", "ghost");
        assert!(get_collection_members(&next, "photos").is_empty());
    }

    #[test]
    fn test_rejects_membership_cycles() {
        let state = sample();
        assert!(would_create_cycle(&state, "letters", "root"));
        let next = add_to_collection(&state, "letters", "root");
        assert_eq!(get_collection_members(&next, "letters"), ["m1"]);
        assert!(!would_create_cycle(&state, "photos", "letters"));
    }

    #[test]
    fn test_orphans() {
        let state = sample();
        assert!(!is_orphan_manifest(&state, "m1"));
        assert!(!is_orphan_manifest(&state, "c2"));

        let detached = remove_from_collection(&state, "root", "m2");
        assert!(is_orphan_manifest(&detached, "m2"));
        assert_eq!(get_orphan_manifests(&detached), ["m2"]);
        assert!(get_orphan_manifests(&state).is_empty());
    }

    #[test]
    fn test_reorder_members() {
        let state = sample();
        let next = reorder_collection_members(
            &state,
            "root",
            vec!["m2".into(), "ghost".into(), "letters".into()],
        );
        assert_eq!(get_collection_members(&next, "root"), ["m2", "letters", "photos"]);
    }

    #[test]
    fn test_reference_labels_follow_membership() {
        let state = normalize(&json!({
            "id": "root",
            "type": "Collection",
            "items": [
                {"id": "m1", "type": "Manifest", "label": "Full title", "items": []},
                {"id": "short", "type": "Collection", "items": [{"id": "m1", "type": "Manifest", "label": "Short"}]}
            ]
        }))
        .unwrap();
        assert_eq!(get_reference_label(&state, "short", "m1"), Some(Some(&json!("Short"))));
        assert_eq!(get_reference_label(&state, "root", "m1"), None);

        let next = remove_from_collection(&state, "short", "m1");
        assert_eq!(get_reference_label(&next, "short", "m1"), None);
        assert!(next.reference_labels.is_empty());
        assert!(get_reference_label(&state, "short", "m1").is_some());

        let mut state = state;
        let removed: HashSet<&str> = ["m1"].into_iter().collect();
        unlink_all(&mut state, &removed);
        assert!(state.reference_labels.is_empty());
    }

    #[test]
    fn test_unlink_all_detaches_survivors() {
        let mut state = add_to_collection(&sample(), "photos", "m1");
        let removed: HashSet<&str> = ["letters", "m1"].into_iter().collect();
        unlink_all(&mut state, &removed);

        assert!(get_collection_members(&state, "photos").is_empty());
        assert_eq!(get_collection_members(&state, "root"), ["photos", "m2"]);
        assert!(get_member_of_collections(&state, "m1").is_empty());
        assert!(!state.collection_members.contains_key("letters"));
    }
}
