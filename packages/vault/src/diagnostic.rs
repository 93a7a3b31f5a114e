use crate::model::VaultState;
use serde::{Deserialize, Serialize};

/// Severity level of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Info,
}

/// What kind of recoverable condition was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// Unknown id passed to a query or mutation
    NotFound,
    /// `type_index` disagreed with the owning bucket and was repaired
    StaleIndex,
    /// Restore requested for an id that is not in the trash
    InvalidRestore,
    /// Restore refused because part of the subtree is active again
    RestoreConflict,
    /// Request refused because it would break the ownership rules
    Rejected,
    /// Cycle or dangling reference skipped during a traversal
    StructuralAmbiguity,
    /// Invariant violation found by the integrity checker
    IndexMismatch,
}

/// A recoverable condition reported by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub level: DiagnosticLevel,

    pub kind: DiagnosticKind,

    /// Entity the condition was observed on
    pub entity_id: Option<String>,

    /// Human-readable message
    pub message: String,

    /// Optional hint for the calling layer
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn error(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Error, kind, message)
    }

    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Warning, kind, message)
    }

    pub fn info(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Info, kind, message)
    }

    fn new(level: DiagnosticLevel, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            level,
            kind,
            entity_id: None,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn for_entity(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn not_found(id: &str, operation: &str) -> Self {
        Self::info(
            DiagnosticKind::NotFound,
            format!("{operation}: entity '{id}' does not exist"),
        )
        .for_entity(id)
    }
}

/// A new state plus the diagnostics produced while computing it
#[derive(Debug, Clone)]
#[must_use]
pub struct Outcome {
    pub state: VaultState,
    pub diagnostics: Vec<Diagnostic>,
}

impl Outcome {
    pub fn with(state: VaultState, diagnostic: Diagnostic) -> Self {
        Self {
            state,
            diagnostics: vec![diagnostic],
        }
    }

    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn has(&self, kind: DiagnosticKind) -> bool {
        self.diagnostics.iter().any(|d| d.kind == kind)
    }

    pub fn into_state(self) -> VaultState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let diagnostic = Diagnostic::warning(DiagnosticKind::StaleIndex, "repaired")
            .for_entity("m1")
            .with_suggestion("check external writers");
        assert_eq!(diagnostic.level, DiagnosticLevel::Warning);
        assert_eq!(diagnostic.entity_id.as_deref(), Some("m1"));
        assert_eq!(diagnostic.suggestion.as_deref(), Some("check external writers"));
    }

    #[test]
    fn test_outcome_kinds() {
        let outcome = Outcome::with(VaultState::new(), Diagnostic::not_found("x", "update"));
        assert!(!outcome.is_clean());
        assert!(outcome.has(DiagnosticKind::NotFound));
        assert!(!outcome.has(DiagnosticKind::StaleIndex));
    }
}
