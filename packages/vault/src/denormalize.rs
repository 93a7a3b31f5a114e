//! # Denormalizer
//!
//! The inverse of [`crate::normalize`]: rebuilds a rooted document tree from
//! the flat state. Traversal is best-effort: a cyclic or dangling child is
//! skipped instead of recursing forever, and each skip is reported as a
//! [`DiagnosticKind::StructuralAmbiguity`] warning.

use crate::collections::{get_collection_members, get_reference_label};
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::errors::{VaultError, VaultResult};
use crate::extensions::{apply_extensions, get_extensions};
use crate::model::{EntityKind, VaultState};
use crate::query::{get_child_ids, get_entity, get_parent_id};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{instrument, warn};

/// Rebuild the document rooted at `state.root_id`
pub fn denormalize(state: &VaultState) -> VaultResult<Value> {
    denormalize_with_diagnostics(state).map(|(doc, _)| doc)
}

/// Rebuild the document rooted at `state.root_id`, along with a warning for
/// every node the traversal had to skip
pub fn denormalize_with_diagnostics(state: &VaultState) -> VaultResult<(Value, Vec<Diagnostic>)> {
    let root = state.root_id.as_deref().ok_or(VaultError::NoRoot)?;
    denormalize_entity_with_diagnostics(state, root)
}

/// Rebuild the subtree owned by `id`
pub fn denormalize_entity(state: &VaultState, id: &str) -> VaultResult<Value> {
    denormalize_entity_with_diagnostics(state, id).map(|(doc, _)| doc)
}

/// [`denormalize_entity`] plus the warnings for skipped nodes
#[instrument(skip(state))]
pub fn denormalize_entity_with_diagnostics(
    state: &VaultState,
    id: &str,
) -> VaultResult<(Value, Vec<Diagnostic>)> {
    let mut denormalizer = Denormalizer {
        state,
        visited: HashSet::new(),
        diagnostics: Vec::new(),
    };
    let doc = denormalizer
        .build(id)
        .ok_or_else(|| VaultError::EntityNotFound(id.to_string()))?;
    Ok((doc, denormalizer.diagnostics))
}

struct Denormalizer<'a> {
    state: &'a VaultState,
    visited: HashSet<&'a str>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Denormalizer<'a> {
    fn build(&mut self, id: &'a str) -> Option<Value> {
        if !self.visited.insert(id) {
            warn!(entity_id = %id, "entity reached twice while denormalizing, skipping");
            self.skipped(id, format!("'{id}' was reached twice and was left out"));
            return None;
        }
        let Some(entity) = get_entity(self.state, id) else {
            warn!(entity_id = %id, "dangling child reference, skipping");
            self.skipped(id, format!("'{id}' is referenced but does not exist"));
            return None;
        };

        let mut object = Map::new();
        object.insert("id".into(), Value::String(entity.id.clone()));
        object.insert("type".into(), Value::String(entity.kind.as_str().into()));
        for (key, value) in &entity.properties {
            object.insert(key.clone(), value.clone());
        }

        if entity.kind == EntityKind::Collection {
            let items = self.collection_items(id);
            if !items.is_empty() {
                object.insert("items".into(), Value::Array(items));
            }
        } else {
            for (slot, values) in self.owned_children(id, entity.kind) {
                if !values.is_empty() {
                    object.insert(slot.into(), Value::Array(values));
                }
            }
        }

        if let Some(extensions) = get_extensions(self.state, id) {
            apply_extensions(&mut object, extensions);
        }

        Some(Value::Object(object))
    }

    /// Children grouped by the slot they belong in, slots in declaration order
    fn owned_children(&mut self, id: &'a str, kind: EntityKind) -> Vec<(&'static str, Vec<Value>)> {
        let mut slots: Vec<(&'static str, Vec<Value>)> =
            kind.child_slots().iter().map(|slot| (*slot, Vec::new())).collect();

        for child_id in get_child_ids(self.state, id) {
            let Some(child) = get_entity(self.state, child_id) else {
                warn!(entity_id = %child_id, parent = %id, "dangling child reference, skipping");
                self.skipped(child_id, format!("child '{child_id}' of '{id}' does not exist"));
                continue;
            };
            let Some(slot) = kind.slot_for(child.kind) else {
                warn!(entity_id = %child_id, parent = %id, kind = %child.kind, "child kind has no slot in parent");
                self.skipped(child_id, format!("{kind} '{id}' has no slot for {} '{child_id}'", child.kind));
                continue;
            };
            if let Some(value) = self.build(child_id) {
                if let Some((_, values)) = slots.iter_mut().find(|(name, _)| *name == slot) {
                    values.push(value);
                }
            }
        }

        slots
    }

    /// Collection items follow membership order; owned members are embedded,
    /// the rest are emitted as references. Owned non-members come last.
    fn collection_items(&mut self, id: &'a str) -> Vec<Value> {
        let mut items = Vec::new();
        let mut emitted: HashSet<&str> = HashSet::new();

        for member_id in get_collection_members(self.state, id) {
            if get_parent_id(self.state, member_id) == Some(id) {
                emitted.insert(member_id.as_str());
                if let Some(value) = self.build(member_id) {
                    items.push(value);
                }
            } else if let Some(reference) = self.reference(id, member_id) {
                items.push(reference);
            }
        }

        for child_id in get_child_ids(self.state, id) {
            if !emitted.contains(child_id.as_str()) {
                if let Some(value) = self.build(child_id) {
                    items.push(value);
                }
            }
        }

        items
    }

    /// `{id, type, label}` stub; the label the reference was given wins over
    /// the member's own
    fn reference(&mut self, collection_id: &str, id: &str) -> Option<Value> {
        let Some(entity) = get_entity(self.state, id) else {
            warn!(entity_id = %id, "collection member does not exist, skipping");
            self.skipped(id, format!("member '{id}' of '{collection_id}' does not exist"));
            return None;
        };
        let mut object = Map::new();
        object.insert("id".into(), Value::String(entity.id.clone()));
        object.insert("type".into(), Value::String(entity.kind.as_str().into()));
        let label = match get_reference_label(self.state, collection_id, id) {
            Some(recorded) => recorded,
            None => entity.label(),
        };
        if let Some(label) = label {
            object.insert("label".into(), label.clone());
        }
        Some(Value::Object(object))
    }

    fn skipped(&mut self, id: &str, message: String) {
        self.diagnostics.push(
            Diagnostic::warning(DiagnosticKind::StructuralAmbiguity, message)
                .for_entity(id)
                .with_suggestion("run the integrity check on this state"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_round_trip_manifest() {
        let doc = json!({
            "id": "m1",
            "type": "Manifest",
            "label": {"en": ["Field notebook"]},
            "x-archive:shelf": "B-12",
            "items": [{
                "id": "c1",
                "type": "Canvas",
                "height": 1200,
                "width": 900,
                "items": [{
                    "id": "p1",
                    "type": "AnnotationPage",
                    "items": [{
                        "id": "a1",
                        "type": "Annotation",
                        "motivation": "painting",
                        "body": {"id": "img.jpg", "type": "Image"},
                        "target": "c1"
                    }]
                }],
                "annotations": [{"id": "notes", "type": "AnnotationPage", "items": []}]
            }],
            "structures": [{"id": "r1", "type": "Range", "items": [{"id": "c1", "type": "Canvas"}]}]
        });

        let state = normalize(&doc).unwrap();
        assert_eq!(denormalize(&state).unwrap(), doc);
    }

    #[test]
    fn test_no_root() {
        assert!(matches!(denormalize(&VaultState::new()), Err(VaultError::NoRoot)));
    }

    #[test]
    fn test_subtree() {
        let state = normalize(&json!({
            "id": "m1",
            "type": "Manifest",
            "items": [{"id": "c1", "type": "Canvas", "width": 5}]
        }))
        .unwrap();
        assert_eq!(
            denormalize_entity(&state, "c1").unwrap(),
            json!({"id": "c1", "type": "Canvas", "width": 5})
        );
        assert!(denormalize_entity(&state, "zzz").is_err());
    }

    #[test]
    fn test_cycle_is_skipped() {
        let mut state = normalize(&json!({
            "id": "m1",
            "type": "Manifest",
            "items": [{"id": "c1", "type": "Canvas"}]
        }))
        .unwrap();
        // c1 claims m1 as a child; m1 is not a valid Canvas child and is
        // already on the path, so it must not be embedded
        Arc::make_mut(&mut state.references).insert("c1".into(), Arc::new(vec!["m1".into()]));

        let (doc, diagnostics) = denormalize_with_diagnostics(&state).unwrap();
        assert_eq!(doc["items"][0], json!({"id": "c1", "type": "Canvas"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::StructuralAmbiguity);
        assert_eq!(diagnostics[0].entity_id.as_deref(), Some("m1"));
    }

    #[test]
    fn test_dangling_member_is_reported() {
        let mut state = normalize(&json!({
            "id": "root",
            "type": "Collection",
            "items": [{"id": "m1", "type": "Manifest", "items": []}]
        }))
        .unwrap();
        Arc::make_mut(&mut state.collection_members)
            .insert("root".into(), Arc::new(vec!["m1".into(), "gone".into()]));

        let (doc, diagnostics) = denormalize_with_diagnostics(&state).unwrap();
        assert_eq!(doc["items"].as_array().unwrap().len(), 1);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].entity_id.as_deref(), Some("gone"));

        let healthy = normalize(&json!({"id": "m1", "type": "Manifest"})).unwrap();
        let (_, diagnostics) = denormalize_with_diagnostics(&healthy).unwrap();
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_reference_keeps_its_own_label() {
        let doc = json!({
            "id": "root",
            "type": "Collection",
            "items": [
                {"id": "m", "type": "Manifest", "label": "Full title", "items": []},
                {"id": "s", "type": "Collection", "items": [{"id": "m", "type": "Manifest", "label": "Short"}]},
                {"id": "bare", "type": "Collection", "items": [{"id": "m", "type": "Manifest"}]}
            ]
        });
        let state = normalize(&doc).unwrap();
        assert_eq!(denormalize(&state).unwrap(), doc);
    }
}
