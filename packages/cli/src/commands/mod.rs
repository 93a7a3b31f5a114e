pub mod check;
pub mod convert;
pub mod inspect;
pub mod roundtrip;

pub use check::{check, CheckArgs};
pub use convert::{denormalize, normalize, DenormalizeArgs, NormalizeArgs};
pub use inspect::{inspect, InspectArgs};
pub use roundtrip::{roundtrip, RoundtripArgs};

use anyhow::{Context, Result};
use archive_vault::{normalize_with, VaultConfig, VaultState};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::debug;

/// What a JSON input file turned out to be
pub enum Input {
    Document(Value),
    State(VaultState),
}

/// A persisted state has the flat-index keys; anything else is a document
fn is_state(value: &Value) -> bool {
    value.get("entities").is_some() && value.get("typeIndex").is_some()
}

pub fn read_input(path: &Path) -> Result<Input> {
    let source = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value: Value =
        serde_json::from_str(&source).with_context(|| format!("parsing {}", path.display()))?;

    if is_state(&value) {
        debug!(path = %path.display(), "reading state file");
        let state: VaultState = serde_json::from_value(value)
            .with_context(|| format!("{} is not a valid state file", path.display()))?;
        Ok(Input::State(state))
    } else {
        debug!(path = %path.display(), "reading document");
        Ok(Input::Document(value))
    }
}

/// Load any input as a flat state, normalizing documents on the way
pub fn load_state(path: &Path, config: &VaultConfig) -> Result<VaultState> {
    match read_input(path)? {
        Input::State(state) => Ok(state),
        Input::Document(doc) => Ok(normalize_with(&doc, &config.schema())?),
    }
}

/// Write JSON to `output`, or stdout when absent
pub fn write_json(value: &impl serde::Serialize, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detects_state_files() {
        assert!(is_state(&json!({"entities": {}, "typeIndex": {}})));
        assert!(!is_state(&json!({"id": "m1", "type": "Manifest"})));
    }

    #[test]
    fn test_load_state_from_document_and_state() {
        let dir = tempfile::tempdir().unwrap();
        let doc_path = dir.path().join("doc.json");
        fs::write(
            &doc_path,
            r#"{"id": "m1", "type": "Manifest", "items": [{"id": "c1", "type": "Canvas"}]}"#,
        )
        .unwrap();

        let config = VaultConfig::default();
        let state = load_state(&doc_path, &config).unwrap();
        assert_eq!(state.root_id.as_deref(), Some("m1"));

        let state_path = dir.path().join("state.json");
        write_json(&state, Some(&state_path)).unwrap();
        assert_eq!(load_state(&state_path, &config).unwrap(), state);
    }
}
