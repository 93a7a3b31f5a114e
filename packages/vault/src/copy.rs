//! Structural copy
//!
//! `Clone` on a [`VaultState`] is shallow by construction: it bumps the
//! reference counts of the shared indices. When a caller needs a snapshot
//! that shares nothing with the live state (trash snapshots, handing a state
//! to a persistence layer), [`DeepCopy`] walks the concrete types and
//! allocates fresh storage for every level.

use crate::model::{
    Bucket, Entity, EntityBuckets, EntityKind, IdList, Properties, ReferenceLabels, TrashedEntity,
    TrashedNode, VaultState,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub trait DeepCopy {
    fn deep_copy(&self) -> Self;
}

impl DeepCopy for Value {
    fn deep_copy(&self) -> Self {
        match self {
            Value::Null => Value::Null,
            Value::Bool(b) => Value::Bool(*b),
            Value::Number(n) => Value::Number(n.clone()),
            Value::String(s) => Value::String(s.clone()),
            Value::Array(items) => Value::Array(items.iter().map(DeepCopy::deep_copy).collect()),
            Value::Object(map) => Value::Object(map.deep_copy()),
        }
    }
}

impl DeepCopy for Map<String, Value> {
    fn deep_copy(&self) -> Self {
        self.iter()
            .map(|(key, value)| (key.clone(), value.deep_copy()))
            .collect()
    }
}

impl DeepCopy for Entity {
    fn deep_copy(&self) -> Self {
        Entity {
            id: self.id.clone(),
            kind: self.kind,
            properties: self.properties.deep_copy(),
        }
    }
}

impl DeepCopy for TrashedNode {
    fn deep_copy(&self) -> Self {
        TrashedNode {
            entity: self.entity.deep_copy(),
            extensions: self.extensions.as_ref().map(DeepCopy::deep_copy),
            child_ids: self.child_ids.clone(),
            member_of_collections: self.member_of_collections.clone(),
            membership_positions: self.membership_positions.clone(),
            collection_members: self.collection_members.clone(),
            member_labels: copy_labels(&self.member_labels),
            listed_labels: copy_labels(&self.listed_labels),
        }
    }
}

impl DeepCopy for TrashedEntity {
    fn deep_copy(&self) -> Self {
        TrashedEntity {
            entity: self.entity.deep_copy(),
            extensions: self.extensions.as_ref().map(DeepCopy::deep_copy),
            original_parent_id: self.original_parent_id.clone(),
            original_index: self.original_index,
            trashed_at: self.trashed_at,
            member_of_collections: self.member_of_collections.clone(),
            membership_positions: self.membership_positions.clone(),
            collection_members: self.collection_members.clone(),
            member_labels: copy_labels(&self.member_labels),
            listed_labels: copy_labels(&self.listed_labels),
            child_ids: self.child_ids.clone(),
            was_root: self.was_root,
            descendants: self.descendants.iter().map(DeepCopy::deep_copy).collect(),
        }
    }
}

fn copy_labels(labels: &ReferenceLabels) -> ReferenceLabels {
    labels
        .iter()
        .map(|(id, label)| (id.clone(), label.as_ref().map(DeepCopy::deep_copy)))
        .collect()
}

fn copy_bucket(bucket: &Bucket) -> Arc<Bucket> {
    Arc::new(
        bucket
            .iter()
            .map(|(id, entity)| (id.clone(), Arc::new(entity.deep_copy())))
            .collect(),
    )
}

fn copy_lists(map: &HashMap<String, IdList>) -> Arc<HashMap<String, IdList>> {
    Arc::new(
        map.iter()
            .map(|(id, list)| (id.clone(), Arc::new(list.as_ref().clone())))
            .collect(),
    )
}

impl DeepCopy for EntityBuckets {
    fn deep_copy(&self) -> Self {
        EntityBuckets {
            collections: copy_bucket(self.bucket(EntityKind::Collection)),
            manifests: copy_bucket(self.bucket(EntityKind::Manifest)),
            canvases: copy_bucket(self.bucket(EntityKind::Canvas)),
            ranges: copy_bucket(self.bucket(EntityKind::Range)),
            annotation_pages: copy_bucket(self.bucket(EntityKind::AnnotationPage)),
            annotations: copy_bucket(self.bucket(EntityKind::Annotation)),
        }
    }
}

impl DeepCopy for VaultState {
    fn deep_copy(&self) -> Self {
        let extensions: HashMap<String, Arc<Properties>> = self
            .extensions
            .iter()
            .map(|(id, bag)| (id.clone(), Arc::new(bag.deep_copy())))
            .collect();
        let trashed: HashMap<String, Arc<TrashedEntity>> = self
            .trashed_entities
            .iter()
            .map(|(id, entry)| (id.clone(), Arc::new(entry.deep_copy())))
            .collect();

        VaultState {
            entities: self.entities.deep_copy(),
            type_index: Arc::new(self.type_index.as_ref().clone()),
            references: copy_lists(&self.references),
            reverse_refs: Arc::new(self.reverse_refs.as_ref().clone()),
            collection_members: copy_lists(&self.collection_members),
            member_of_collections: copy_lists(&self.member_of_collections),
            reference_labels: Arc::new(
                self.reference_labels
                    .iter()
                    .map(|(id, labels)| (id.clone(), Arc::new(copy_labels(labels))))
                    .collect(),
            ),
            root_id: self.root_id.clone(),
            extensions: Arc::new(extensions),
            trashed_entities: Arc::new(trashed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_deep_copy_is_equal() {
        let value = json!({"label": {"en": ["A", "B"]}, "n": 3, "flag": true, "none": null});
        assert_eq!(value.deep_copy(), value);
    }

    #[test]
    fn test_state_deep_copy_detaches_indices() {
        let mut state = VaultState::new();
        state
            .entities
            .bucket_mut(EntityKind::Manifest)
            .insert("m1".into(), Arc::new(Entity::new("m1", EntityKind::Manifest)));
        Arc::make_mut(&mut state.type_index).insert("m1".into(), EntityKind::Manifest);
        Arc::make_mut(&mut state.references)
            .insert("m1".into(), Arc::new(vec!["c1".to_string()]));

        let copy = state.deep_copy();
        assert_eq!(copy, state);
        assert!(!Arc::ptr_eq(&copy.type_index, &state.type_index));
        assert!(!Arc::ptr_eq(&copy.references["m1"], &state.references["m1"]));
        assert!(!copy.entities.shares_bucket_with(&state.entities, EntityKind::Manifest));
    }
}
