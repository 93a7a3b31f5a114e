//! # Vault Handle
//!
//! The owned entry point for an application. A [`Vault`] holds the current
//! state and swaps it for the next one on every command; there is no global
//! store. It also owns the property schema, the undo history and the
//! diagnostics collected from commands.
//!
//! ## Lifecycle
//!
//! ```text
//! Document ─normalize→ Vault ─commands→ Vault ─denormalize→ Document
//!                        ↕ open/save
//!                    state JSON file
//! ```

use crate::collections::{add_to_collection, remove_from_collection, reorder_collection_members};
use crate::config::VaultConfig;
use crate::denormalize::denormalize;
use crate::diagnostic::{Diagnostic, Outcome};
use crate::errors::{VaultError, VaultResult};
use crate::extensions::{split_properties, update_extensions};
use crate::history::{same_snapshot, History};
use crate::integrity::check_integrity;
use crate::model::{Entity, EntityId, Properties, VaultState};
use crate::mutations::{
    add_entity, insert_child_at, move_entity, remove_child, remove_entity, reorder_children,
    update_entity, RemoveOptions,
};
use crate::normalize::normalize_with;
use crate::query::get_entity_type;
use crate::schema::PresentationSchema;
use crate::trash::{empty_trash, move_entity_to_trash, restore_entity_from_trash, RestoreOptions};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Editable archive store
#[derive(Debug)]
pub struct Vault {
    /// Backing state file, if any
    pub path: Option<PathBuf>,

    /// Incremented on every command that changed the state
    pub version: u64,

    state: VaultState,
    schema: PresentationSchema,
    history: Option<History>,
    diagnostics: Vec<Diagnostic>,
    dirty: bool,
}

impl Vault {
    /// Empty vault with default configuration
    pub fn new() -> Self {
        Self::from_state(VaultState::new(), &VaultConfig::default())
    }

    pub fn from_state(state: VaultState, config: &VaultConfig) -> Self {
        Self {
            path: None,
            version: 0,
            state,
            schema: config.schema(),
            history: config
                .record_history
                .then(|| History::with_max_levels(config.history_depth)),
            diagnostics: Vec::new(),
            dirty: false,
        }
    }

    /// Normalize a document into a fresh vault
    pub fn from_document(doc: &Value, config: &VaultConfig) -> VaultResult<Self> {
        let schema = config.schema();
        let state = normalize_with(doc, &schema)?;
        Ok(Self::from_state(state, config))
    }

    /// Load a persisted state file. Integrity findings are kept as
    /// diagnostics, not errors.
    pub fn open(path: impl Into<PathBuf>, config: &VaultConfig) -> VaultResult<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)?;
        let state = VaultState::from_json(&content)?;

        let mut vault = Self::from_state(state, config);
        vault.diagnostics = check_integrity(&vault.state);
        info!(path = %path.display(), findings = vault.diagnostics.len(), "opened vault");
        vault.path = Some(path);
        Ok(vault)
    }

    /// Write the state back to its file
    pub fn save(&mut self) -> VaultResult<()> {
        let path = self.path.clone().ok_or(VaultError::NoBackingFile)?;
        self.save_as(path)
    }

    /// Write the state to `path` and make it the backing file
    pub fn save_as(&mut self, path: impl AsRef<Path>) -> VaultResult<()> {
        let path = path.as_ref();
        std::fs::write(path, self.state.to_json()?)?;
        debug!(path = %path.display(), version = self.version, "saved vault");
        self.path = Some(path.to_path_buf());
        self.dirty = false;
        Ok(())
    }

    pub fn state(&self) -> &VaultState {
        &self.state
    }

    /// The current state as a document
    pub fn document(&self) -> VaultResult<Value> {
        denormalize(&self.state)
    }

    pub fn schema(&self) -> &PresentationSchema {
        &self.schema
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Drain the diagnostics collected so far
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Run the integrity checker on the current state
    pub fn check(&self) -> Vec<Diagnostic> {
        check_integrity(&self.state)
    }

    /// Patch an entity. Properties the schema does not know go to its
    /// extension bag instead of the record.
    pub fn update(&mut self, id: &str, patch: &Properties) {
        let Some(kind) = get_entity_type(&self.state, id) else {
            self.diagnostics.push(Diagnostic::not_found(id, "update"));
            return;
        };
        let (known, unknown) = split_properties(&self.schema, kind, patch);
        let Outcome { state, diagnostics } = update_entity(&self.state, id, &known);
        let next = update_extensions(&state, id, &unknown);
        self.diagnostics.extend(diagnostics);
        self.commit(next, format!("update {id}"));
    }

    pub fn add(&mut self, entity: Entity, parent_id: Option<&str>) {
        let description = format!("add {}", entity.id);
        let next = add_entity(&self.state, entity, parent_id);
        self.commit(next, description);
    }

    pub fn remove(&mut self, id: &str, options: RemoveOptions) {
        let next = remove_entity(&self.state, id, options);
        self.commit(next, format!("remove {id}"));
    }

    pub fn move_entity(&mut self, id: &str, new_parent_id: &str, index: Option<usize>) {
        let next = move_entity(&self.state, id, new_parent_id, index);
        self.commit(next, format!("move {id}"));
    }

    pub fn reorder_children(&mut self, parent_id: &str, new_order: Vec<EntityId>) {
        let next = reorder_children(&self.state, parent_id, new_order);
        self.commit(next, format!("reorder {parent_id}"));
    }

    pub fn insert_child_at(&mut self, parent_id: &str, child_id: &str, index: usize) {
        let next = insert_child_at(&self.state, parent_id, child_id, index);
        self.commit(next, format!("insert {child_id}"));
    }

    pub fn remove_child(&mut self, parent_id: &str, child_id: &str) {
        let next = remove_child(&self.state, parent_id, child_id);
        self.commit(next, format!("detach {child_id}"));
    }

    pub fn add_to_collection(&mut self, collection_id: &str, member_id: &str) {
        let next = add_to_collection(&self.state, collection_id, member_id);
        self.commit(next, format!("add {member_id} to {collection_id}"));
    }

    pub fn remove_from_collection(&mut self, collection_id: &str, member_id: &str) {
        let next = remove_from_collection(&self.state, collection_id, member_id);
        self.commit(next, format!("remove {member_id} from {collection_id}"));
    }

    pub fn reorder_collection_members(&mut self, collection_id: &str, order: Vec<EntityId>) {
        let next = reorder_collection_members(&self.state, collection_id, order);
        self.commit(next, format!("reorder members of {collection_id}"));
    }

    pub fn trash(&mut self, id: &str) {
        let next = move_entity_to_trash(&self.state, id);
        self.commit(next, format!("trash {id}"));
    }

    pub fn restore(&mut self, id: &str, options: RestoreOptions) {
        let Outcome { state, diagnostics } = restore_entity_from_trash(&self.state, id, options);
        self.diagnostics.extend(diagnostics);
        self.commit(state, format!("restore {id}"));
    }

    /// Purge the trash; returns how many entries were deleted and the ones
    /// that failed
    pub fn empty_trash(&mut self) -> (usize, Vec<(EntityId, VaultError)>) {
        let result = empty_trash(&self.state);
        self.commit(result.state, "empty trash".to_string());
        (result.deleted_count, result.errors)
    }

    /// Group the following commands into one undo level
    pub fn begin_batch(&mut self, description: impl Into<String>) {
        if let Some(history) = &mut self.history {
            history.begin_batch();
            history.set_batch_description(description);
        }
    }

    pub fn end_batch(&mut self) {
        if let Some(history) = &mut self.history {
            history.end_batch();
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.as_ref().is_some_and(History::can_undo)
    }

    pub fn can_redo(&self) -> bool {
        self.history.as_ref().is_some_and(History::can_redo)
    }

    /// Returns false when there is nothing to undo
    pub fn undo(&mut self) -> bool {
        match self.history.as_mut().and_then(History::undo) {
            Some(previous) => {
                self.replace_state(previous);
                true
            }
            None => false,
        }
    }

    /// Returns false when there is nothing to redo
    pub fn redo(&mut self) -> bool {
        match self.history.as_mut().and_then(History::redo) {
            Some(next) => {
                self.replace_state(next);
                true
            }
            None => false,
        }
    }

    fn commit(&mut self, next: VaultState, description: String) {
        if same_snapshot(&self.state, &next) {
            return;
        }
        if let Some(history) = &mut self.history {
            history.record(&self.state, &next, Some(description));
        }
        self.replace_state(next);
    }

    fn replace_state(&mut self, next: VaultState) {
        self.state = next;
        self.version += 1;
        self.dirty = true;
    }
}

impl Default for Vault {
    fn default() -> Self {
        Self::new()
    }
}
