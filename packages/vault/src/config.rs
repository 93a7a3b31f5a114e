use crate::errors::VaultResult;
use crate::model::EntityKind;
use crate::schema::PresentationSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_CONFIG_NAME: &str = "vault.config.json";

/// Vault configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultConfig {
    /// Undo levels kept by a vault handle (0 = unlimited)
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,

    /// Whether a vault handle records undo history at all
    #[serde(default = "default_record_history")]
    pub record_history: bool,

    /// Property names to treat as known, per entity type, on top of the
    /// built-in presentation vocabulary
    #[serde(default)]
    pub extra_known_properties: BTreeMap<EntityKind, Vec<String>>,
}

fn default_history_depth() -> usize {
    100
}

fn default_record_history() -> bool {
    true
}

impl VaultConfig {
    /// Load `vault.config.json` from a directory, or defaults if it is absent
    pub fn load(dir: impl AsRef<Path>) -> VaultResult<Self> {
        let config_path = dir.as_ref().join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: VaultConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(VaultConfig::default())
        }
    }

    /// The known-property schema with this config's extras applied
    pub fn schema(&self) -> PresentationSchema {
        let mut schema = PresentationSchema::new();
        for (kind, properties) in &self.extra_known_properties {
            for property in properties {
                schema.add_property(*kind, property.clone());
            }
        }
        schema
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            history_depth: default_history_depth(),
            record_history: default_record_history(),
            extra_known_properties: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PropertySchema;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "historyDepth": 25,
            "recordHistory": false,
            "extraKnownProperties": {
                "Canvas": ["x-archive:folio"]
            }
        }"#;

        let config: VaultConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.history_depth, 25);
        assert!(!config.record_history);
        assert_eq!(
            config.extra_known_properties[&EntityKind::Canvas],
            vec!["x-archive:folio"]
        );

        let schema = config.schema();
        assert!(schema.is_known(EntityKind::Canvas, "x-archive:folio"));
        assert!(!schema.is_known(EntityKind::Manifest, "x-archive:folio"));
    }

    #[test]
    fn test_default_config() {
        let config = VaultConfig::default();
        assert_eq!(config.history_depth, 100);
        assert!(config.record_history);
        assert!(config.extra_known_properties.is_empty());
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(VaultConfig::load(dir.path()).unwrap(), VaultConfig::default());

        std::fs::write(dir.path().join(DEFAULT_CONFIG_NAME), r#"{"historyDepth": 3}"#).unwrap();
        let config = VaultConfig::load(dir.path()).unwrap();
        assert_eq!(config.history_depth, 3);
        assert!(config.record_history);

        std::fs::write(dir.path().join(DEFAULT_CONFIG_NAME), "{ nope").unwrap();
        assert!(VaultConfig::load(dir.path()).is_err());
    }
}
