//! Error types for the vault

use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Invalid document at {path}: {message}")]
    InvalidDocument { path: String, message: String },

    #[error("Node at {path} has no type")]
    MissingType { path: String },

    #[error("Unknown entity type '{tag}' at {path}")]
    UnknownType { path: String, tag: String },

    #[error("Node at {path} has no id")]
    MissingId { path: String },

    #[error("Cyclic or duplicate structure: '{id}' was already visited")]
    CycleDetected { id: String },

    #[error("Collection '{collection}' cannot list '{member}': membership would form a cycle")]
    MembershipCycle { collection: String, member: String },

    #[error("State has no root entity")]
    NoRoot,

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Entity is not in the trash: {0}")]
    NotInTrash(String),

    #[error("Trashed entity '{0}' collides with an active entity")]
    TrashConflict(String),

    #[error("Vault has no backing file")]
    NoBackingFile,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    pub(crate) fn invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
        VaultError::InvalidDocument {
            path: path.into(),
            message: message.into(),
        }
    }
}
