//! # Archive Vault
//!
//! Normalized, immutable entity store for archive resource graphs
//! (Collections, Manifests, Canvases, Ranges, AnnotationPages, Annotations).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ normalize: document tree → flat state       │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ VaultState: id-indexed, Arc-shared indices  │
//! │  - query: O(1) lookups, ordered children    │
//! │  - mutations: update/add/move/remove        │
//! │  - collections: many-to-many membership     │
//! │  - trash: soft delete, restore, purge       │
//! │  - extensions: vendor property bags         │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ denormalize: flat state → document tree     │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **State is a value**: every operation returns a new state and never
//!    touches the one it was given
//! 2. **Structural sharing**: an edit copies only the indices it changes
//! 3. **Ownership is not membership**: `references` and collection
//!    membership are separate relations
//! 4. **Missing is not an error**: unknown ids make an operation a no-op;
//!    only malformed documents and IO fail
//!
//! ## Usage
//!
//! ```rust,ignore
//! use archive_vault::{normalize, denormalize, update_entity};
//!
//! let state = normalize(&doc)?;
//! let outcome = update_entity(&state, "canvas-1", &patch);
//! let doc = denormalize(&outcome.state)?;
//! ```
//!
//! For an owned handle with undo/redo and persistence, see [`Vault`].

mod collections;
mod config;
mod copy;
mod denormalize;
mod diagnostic;
mod errors;
mod extensions;
mod history;
mod integrity;
mod model;
mod mutations;
mod normalize;
mod query;
mod schema;
mod trash;
mod vault;

pub use collections::{
    add_to_collection, get_collection_members, get_member_of_collections, get_orphan_manifests,
    get_reference_label, is_orphan_manifest, remove_from_collection, reorder_collection_members,
    would_create_cycle,
};
pub use config::{VaultConfig, DEFAULT_CONFIG_NAME};
pub use copy::DeepCopy;
pub use denormalize::{
    denormalize, denormalize_entity, denormalize_entity_with_diagnostics, denormalize_with_diagnostics,
};
pub use diagnostic::{Diagnostic, DiagnosticKind, DiagnosticLevel, Outcome};
pub use errors::{VaultError, VaultResult};
pub use extensions::{
    apply_extensions, get_extensions, set_extensions, split_properties, update_extensions,
};
pub use history::{History, HistoryEntry};
pub use integrity::{check_integrity, is_consistent};
pub use model::{
    Bucket, Entity, EntityBuckets, EntityId, EntityKind, IdList, Properties, ReferenceLabels,
    TrashedEntity, TrashedNode, VaultState,
};
pub use mutations::{
    add_entity, insert_child_at, move_entity, remove_child, remove_entity, reorder_children,
    update_entity, RemoveOptions,
};
pub use normalize::{normalize, normalize_with};
pub use query::{
    count_by_type, entity_count, get_ancestors, get_child_ids, get_descendants, get_entities_by_type,
    get_entity, get_entity_type, get_parent_id, get_root_id, has_entity, is_descendant_of,
    locate_entity, trash_count,
};
pub use schema::{PresentationSchema, PropertySchema};
pub use trash::{
    empty_trash, empty_trash_with, get_trashed, is_trashed, list_trash, move_entity_to_trash,
    purge_from_trash, restore_entity_from_trash, EmptyTrashResult, RestoreOptions,
};
pub use vault::Vault;
