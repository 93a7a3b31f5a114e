//! # Extension Preservation
//!
//! Properties outside the per-kind allowlist are kept verbatim in
//! `VaultState::extensions` so that a parse → mutate → serialize cycle never
//! drops vendor data.

use crate::model::{EntityKind, Properties, VaultState};
use crate::schema::PropertySchema;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Split an object's properties into (known, unknown), skipping `id`, `type`
/// and the kind's child slots
pub fn split_properties(
    schema: &dyn PropertySchema,
    kind: EntityKind,
    object: &Map<String, Value>,
) -> (Properties, Properties) {
    let mut known = Map::new();
    let mut unknown = Map::new();

    for (key, value) in object {
        if key == "id" || key == "type" || kind.is_child_slot(key) {
            continue;
        }
        if schema.is_known(kind, key) {
            known.insert(key.clone(), value.clone());
        } else {
            unknown.insert(key.clone(), value.clone());
        }
    }

    (known, unknown)
}

/// Copy extension properties onto a denormalized object without clobbering
/// anything the model already wrote
pub fn apply_extensions(target: &mut Map<String, Value>, extensions: &Properties) {
    for (key, value) in extensions {
        if !target.contains_key(key) {
            target.insert(key.clone(), value.clone());
        }
    }
}

pub fn get_extensions<'a>(state: &'a VaultState, id: &str) -> Option<&'a Properties> {
    state.extensions.get(id).map(|bag| bag.as_ref())
}

/// Replace the extension bag of an entity. An empty bag removes the entry.
pub fn set_extensions(state: &VaultState, id: &str, extensions: Properties) -> VaultState {
    if !state.type_index.contains_key(id) {
        debug!(entity_id = %id, "set_extensions on unknown entity");
        return state.clone();
    }

    let mut next = state.clone();
    let bags = Arc::make_mut(&mut next.extensions);
    if extensions.is_empty() {
        bags.remove(id);
    } else {
        bags.insert(id.to_string(), Arc::new(extensions));
    }
    next
}

/// Shallow-merge vendor properties into an entity's extension bag
pub fn update_extensions(state: &VaultState, id: &str, patch: &Properties) -> VaultState {
    if patch.is_empty() {
        return state.clone();
    }

    let mut merged = get_extensions(state, id).cloned().unwrap_or_default();
    for (key, value) in patch {
        merged.insert(key.clone(), value.clone());
    }
    set_extensions(state, id, merged)
}
