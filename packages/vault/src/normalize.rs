//! # Normalizer
//!
//! Walks a rooted document tree and produces the flat [`VaultState`].
//!
//! ## Rules
//!
//! - Children are recorded in document order; that order is the contract
//!   every other module relies on.
//! - Each embedded id may be walked once. Meeting it again means the
//!   document is cyclic (or embeds the same node twice) and is rejected.
//! - Properties outside the schema allowlist go to `extensions`.
//! - In a Collection's `items`, bare `{id, type, label}` references only
//!   record membership; embedded entries are owned *and* members. A
//!   reference label that differs from the member's own is kept per
//!   membership.
//! - Membership may not loop: a collection never reaches itself through
//!   the members it lists.

use crate::errors::{VaultError, VaultResult};
use crate::extensions::split_properties;
use crate::model::{EntityBuckets, Entity, EntityId, EntityKind, Properties, ReferenceLabels, VaultState};
use crate::schema::{PresentationSchema, PropertySchema};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Normalize a document using the default presentation schema
pub fn normalize(doc: &Value) -> VaultResult<VaultState> {
    normalize_with(doc, &PresentationSchema::default())
}

#[instrument(skip_all)]
pub fn normalize_with(doc: &Value, schema: &dyn PropertySchema) -> VaultResult<VaultState> {
    let mut normalizer = Normalizer::new(schema);
    let root_id = normalizer.walk(doc, None, "$")?;
    let state = normalizer.finish(root_id);
    debug!(
        entities = state.entities.len(),
        root = ?state.root_id,
        "normalized document"
    );
    Ok(state)
}

/// Keys a collection item may carry and still count as a reference
const REFERENCE_KEYS: &[&str] = &["id", "type", "label"];

struct Normalizer<'a> {
    schema: &'a dyn PropertySchema,
    visited: HashSet<EntityId>,
    placeholders: HashSet<EntityId>,
    entities: EntityBuckets,
    type_index: HashMap<EntityId, EntityKind>,
    references: HashMap<EntityId, Vec<EntityId>>,
    reverse_refs: HashMap<EntityId, EntityId>,
    collection_members: HashMap<EntityId, Vec<EntityId>>,
    member_of: HashMap<EntityId, Vec<EntityId>>,
    reference_labels: HashMap<EntityId, ReferenceLabels>,
    extensions: HashMap<EntityId, Properties>,
}

impl<'a> Normalizer<'a> {
    fn new(schema: &'a dyn PropertySchema) -> Self {
        Self {
            schema,
            visited: HashSet::new(),
            placeholders: HashSet::new(),
            entities: EntityBuckets::default(),
            type_index: HashMap::new(),
            references: HashMap::new(),
            reverse_refs: HashMap::new(),
            collection_members: HashMap::new(),
            member_of: HashMap::new(),
            reference_labels: HashMap::new(),
            extensions: HashMap::new(),
        }
    }

    fn walk(
        &mut self,
        node: &Value,
        parent: Option<(EntityKind, &str)>,
        path: &str,
    ) -> VaultResult<EntityId> {
        let object = node
            .as_object()
            .ok_or_else(|| VaultError::invalid(path, "expected an object"))?;
        let (id, kind) = identify(object, path)?;

        if let Some((parent_kind, slot)) = parent {
            if parent_kind.slot_for(kind) != Some(slot) {
                return Err(VaultError::invalid(
                    path,
                    format!("{kind} cannot appear in {parent_kind}.{slot}"),
                ));
            }
        }

        if !self.visited.insert(id.clone()) {
            return Err(VaultError::CycleDetected { id });
        }
        if self.placeholders.remove(&id) {
            self.drop_placeholder(&id);
        }

        let (mut properties, unknown) = split_properties(self.schema, kind, object);

        for &slot in kind.child_slots() {
            let Some(value) = object.get(slot) else {
                continue;
            };
            let slot_path = format!("{path}.{slot}");
            let entries = value
                .as_array()
                .ok_or_else(|| VaultError::invalid(&slot_path, "expected an array"))?;
            // Empty marker: records that the slot was present
            properties.insert(slot.to_string(), Value::Array(Vec::new()));

            for (index, entry) in entries.iter().enumerate() {
                let entry_path = format!("{slot_path}[{index}]");
                if kind == EntityKind::Collection && is_reference(entry) {
                    self.reference(&id, entry, &entry_path)?;
                    continue;
                }

                let child_id = self.walk(entry, Some((kind, slot)), &entry_path)?;
                self.references.entry(id.clone()).or_default().push(child_id.clone());
                self.reverse_refs.insert(child_id.clone(), id.clone());
                if kind == EntityKind::Collection {
                    self.link_member(&id, &child_id)?;
                }
            }
        }

        if !unknown.is_empty() {
            self.extensions.insert(id.clone(), unknown);
        }
        self.insert(Entity {
            id: id.clone(),
            kind,
            properties,
        });

        Ok(id)
    }

    /// Record a membership-only collection item
    fn reference(&mut self, collection_id: &str, entry: &Value, path: &str) -> VaultResult<()> {
        let object = entry
            .as_object()
            .ok_or_else(|| VaultError::invalid(path, "expected an object"))?;
        let (id, kind) = identify(object, path)?;

        if !self.type_index.contains_key(&id) && !self.visited.contains(&id) {
            let mut placeholder = Entity::new(id.clone(), kind);
            if let Some(label) = object.get("label") {
                placeholder.properties.insert("label".into(), label.clone());
            }
            self.placeholders.insert(id.clone());
            self.insert(placeholder);
        }

        if self.link_member(collection_id, &id)? {
            self.reference_labels
                .entry(collection_id.to_string())
                .or_default()
                .insert(id, object.get("label").cloned());
        }
        Ok(())
    }

    fn drop_placeholder(&mut self, id: &str) {
        if let Some(kind) = self.type_index.remove(id) {
            self.entities.bucket_mut(kind).remove(id);
        }
    }

    fn insert(&mut self, entity: Entity) {
        self.type_index.insert(entity.id.clone(), entity.kind);
        self.entities
            .bucket_mut(entity.kind)
            .insert(entity.id.clone(), Arc::new(entity));
    }

    /// Returns false when the edge already exists
    fn link_member(&mut self, collection_id: &str, member_id: &str) -> VaultResult<bool> {
        if self
            .collection_members
            .get(collection_id)
            .is_some_and(|members| members.iter().any(|existing| existing == member_id))
        {
            return Ok(false);
        }
        if self.reaches(member_id, collection_id) {
            return Err(VaultError::MembershipCycle {
                collection: collection_id.to_string(),
                member: member_id.to_string(),
            });
        }

        self.collection_members
            .entry(collection_id.to_string())
            .or_default()
            .push(member_id.to_string());
        self.member_of
            .entry(member_id.to_string())
            .or_default()
            .push(collection_id.to_string());
        Ok(true)
    }

    /// Is `target` reachable from `from` along membership edges recorded so far?
    fn reaches(&self, from: &str, target: &str) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(members) = self.collection_members.get(current) {
                stack.extend(members.iter().map(String::as_str));
            }
        }
        false
    }

    /// Keep only the reference labels that differ from the member's own
    fn differing_labels(&self) -> HashMap<EntityId, Arc<ReferenceLabels>> {
        self.reference_labels
            .iter()
            .filter_map(|(collection, labels)| {
                let kept: ReferenceLabels = labels
                    .iter()
                    .filter(|(member, label)| label.as_ref() != self.label_of(member))
                    .map(|(member, label)| (member.clone(), label.clone()))
                    .collect();
                (!kept.is_empty()).then(|| (collection.clone(), Arc::new(kept)))
            })
            .collect()
    }

    fn label_of(&self, id: &str) -> Option<&Value> {
        let kind = self.type_index.get(id)?;
        self.entities.bucket(*kind).get(id)?.label()
    }

    fn finish(self, root_id: EntityId) -> VaultState {
        let reference_labels = self.differing_labels();

        fn share(map: HashMap<EntityId, Vec<EntityId>>) -> Arc<HashMap<EntityId, Arc<Vec<EntityId>>>> {
            Arc::new(map.into_iter().map(|(key, list)| (key, Arc::new(list))).collect())
        }

        VaultState {
            entities: self.entities,
            type_index: Arc::new(self.type_index),
            references: share(self.references),
            reverse_refs: Arc::new(self.reverse_refs),
            collection_members: share(self.collection_members),
            member_of_collections: share(self.member_of),
            reference_labels: Arc::new(reference_labels),
            root_id: Some(root_id),
            extensions: Arc::new(
                self.extensions
                    .into_iter()
                    .map(|(id, bag)| (id, Arc::new(bag)))
                    .collect(),
            ),
            trashed_entities: Arc::default(),
        }
    }
}

fn identify(object: &Map<String, Value>, path: &str) -> VaultResult<(EntityId, EntityKind)> {
    let tag = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| VaultError::MissingType {
            path: path.to_string(),
        })?;
    let kind = EntityKind::from_type_tag(tag).ok_or_else(|| VaultError::UnknownType {
        path: path.to_string(),
        tag: tag.to_string(),
    })?;
    let id = object
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| VaultError::MissingId {
            path: path.to_string(),
        })?;
    Ok((id.to_string(), kind))
}

fn is_reference(entry: &Value) -> bool {
    let Some(object) = entry.as_object() else {
        return false;
    };
    let collectable = object
        .get("type")
        .and_then(Value::as_str)
        .and_then(EntityKind::from_type_tag)
        .map(EntityKind::is_collectable)
        .unwrap_or(false);
    collectable && object.keys().all(|key| REFERENCE_KEYS.contains(&key.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{get_child_ids, get_entity, get_parent_id};
    use serde_json::json;

    #[test]
    fn test_normalize_manifest_tree() {
        let state = normalize(&json!({
            "id": "m1",
            "type": "Manifest",
            "label": {"en": ["Diary"]},
            "items": [
                {"id": "c1", "type": "Canvas", "height": 100, "width": 80},
                {"id": "c2", "type": "Canvas"}
            ],
            "structures": [{"id": "r1", "type": "Range", "items": [{"id": "c1", "type": "Canvas"}]}]
        }))
        .unwrap();

        assert_eq!(state.root_id.as_deref(), Some("m1"));
        assert_eq!(get_child_ids(&state, "m1"), ["c1", "c2", "r1"]);
        assert_eq!(get_parent_id(&state, "r1"), Some("m1"));
        assert_eq!(state.type_index["c2"], EntityKind::Canvas);

        let canvas = get_entity(&state, "c1").unwrap();
        assert_eq!(canvas.property("height"), Some(&json!(100)));

        // Range items stay in the range payload
        let range = get_entity(&state, "r1").unwrap();
        assert_eq!(range.property("items").unwrap()[0]["id"], "c1");
    }

    #[test]
    fn test_empty_slot_is_recorded() {
        let state = normalize(&json!({"id": "m1", "type": "Manifest", "items": []})).unwrap();
        assert_eq!(get_entity(&state, "m1").unwrap().property("items"), Some(&json!([])));
        assert!(!state.references.contains_key("m1"));
    }

    #[test]
    fn test_unknown_properties_become_extensions() {
        let state = normalize(&json!({
            "id": "m1",
            "type": "Manifest",
            "x-archive:box": 12,
            "label": "Letters"
        }))
        .unwrap();
        assert_eq!(state.extensions["m1"]["x-archive:box"], 12);
        assert!(get_entity(&state, "m1").unwrap().property("x-archive:box").is_none());
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let err = normalize(&json!({
            "id": "m1",
            "type": "Manifest",
            "items": [{"id": "c1", "type": "Canvas"}, {"id": "c1", "type": "Canvas"}]
        }))
        .unwrap_err();
        assert!(matches!(err, VaultError::CycleDetected { id } if id == "c1"));
    }

    #[test]
    fn test_self_reference_is_rejected() {
        let err = normalize(&json!({
            "id": "col",
            "type": "Collection",
            "items": [{"id": "col", "type": "Collection"}]
        }))
        .unwrap_err();
        assert!(matches!(err, VaultError::MembershipCycle { collection, member } if collection == "col" && member == "col"));
    }

    #[test]
    fn test_longer_membership_cycle_is_rejected() {
        let err = normalize(&json!({
            "id": "root",
            "type": "Collection",
            "items": [{
                "id": "sub",
                "type": "Collection",
                "items": [{"id": "root", "type": "Collection"}]
            }]
        }))
        .unwrap_err();
        assert!(matches!(err, VaultError::MembershipCycle { collection, member } if collection == "root" && member == "sub"));

        let err = normalize(&json!({
            "id": "root",
            "type": "Collection",
            "items": [
                {"id": "a", "type": "Collection", "items": [{"id": "b", "type": "Collection"}]},
                {"id": "b", "type": "Collection", "items": [{"id": "a", "type": "Collection"}]}
            ]
        }))
        .unwrap_err();
        assert!(matches!(err, VaultError::MembershipCycle { .. }));
    }

    #[test]
    fn test_differing_reference_labels_are_kept() {
        let state = normalize(&json!({
            "id": "root",
            "type": "Collection",
            "items": [
                {"id": "m", "type": "Manifest", "label": "Full title", "items": []},
                {"id": "s", "type": "Collection", "items": [
                    {"id": "m", "type": "Manifest", "label": "Short"},
                    {"id": "remote", "type": "Manifest", "label": "Remote"}
                ]},
                {"id": "bare", "type": "Collection", "items": [{"id": "m", "type": "Manifest"}]}
            ]
        }))
        .unwrap();

        assert_eq!(state.reference_labels["s"]["m"], Some(json!("Short")));
        assert_eq!(state.reference_labels["bare"]["m"], None);
        // the placeholder took the reference's label, so nothing to keep
        assert!(!state.reference_labels["s"].contains_key("remote"));
        assert!(!state.reference_labels.contains_key("root"));
    }

    #[test]
    fn test_untyped_node_is_rejected() {
        let err = normalize(&json!({"id": "m1", "type": "Manifest", "items": [{"id": "c1"}]})).unwrap_err();
        assert!(matches!(err, VaultError::MissingType { path } if path == "$.items[0]"));

        let err = normalize(&json!({"id": "x", "type": "Painting"})).unwrap_err();
        assert!(matches!(err, VaultError::UnknownType { .. }));

        let err = normalize(&json!({"type": "Manifest"})).unwrap_err();
        assert!(matches!(err, VaultError::MissingId { .. }));
    }

    #[test]
    fn test_wrong_slot_is_rejected() {
        let err = normalize(&json!({
            "id": "col",
            "type": "Collection",
            "items": [{"id": "c1", "type": "Canvas", "height": 1}]
        }))
        .unwrap_err();
        assert!(matches!(err, VaultError::InvalidDocument { .. }));
    }

    #[test]
    fn test_collection_references_and_embedded_members() {
        let state = normalize(&json!({
            "id": "root",
            "type": "Collection",
            "items": [
                {"id": "m-ext", "type": "Manifest", "label": {"en": ["Elsewhere"]}},
                {"id": "m1", "type": "Manifest", "items": [{"id": "c1", "type": "Canvas"}]},
                {
                    "id": "sub",
                    "type": "Collection",
                    "items": [{"id": "m1", "type": "Manifest"}]
                }
            ]
        }))
        .unwrap();

        assert_eq!(get_child_ids(&state, "root"), ["m1", "sub"]);
        assert_eq!(state.collection_members["root"].as_slice(), ["m-ext", "m1", "sub"]);
        assert_eq!(state.collection_members["sub"].as_slice(), ["m1"]);
        assert_eq!(state.member_of_collections["m1"].as_slice(), ["root", "sub"]);

        // external reference becomes a parentless placeholder
        let placeholder = get_entity(&state, "m-ext").unwrap();
        assert_eq!(placeholder.kind, EntityKind::Manifest);
        assert!(get_parent_id(&state, "m-ext").is_none());
    }

    #[test]
    fn test_reference_before_definition_is_replaced() {
        let state = normalize(&json!({
            "id": "root",
            "type": "Collection",
            "items": [
                {"id": "a", "type": "Collection", "items": [{"id": "m1", "type": "Manifest"}]},
                {"id": "m1", "type": "Manifest", "summary": "full", "items": []}
            ]
        }))
        .unwrap();

        let manifest = get_entity(&state, "m1").unwrap();
        assert_eq!(manifest.property("summary"), Some(&json!("full")));
        assert_eq!(get_parent_id(&state, "m1"), Some("root"));
        assert_eq!(state.member_of_collections["m1"].as_slice(), ["a", "root"]);
    }
}
