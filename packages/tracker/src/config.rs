use crate::errors::ConfigError;
use crate::resolver::{Resolver, DEFAULT_ID_ATTRIBUTE};
use crate::tracker::DEFAULT_MAX_UNDO;
use crate::undo_data::ActionRule;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_CONFIG_NAME: &str = "actionlog.config.json";

/// Tracker configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerConfig {
    /// Tracker name written into exported envelopes
    #[serde(default = "default_name")]
    pub name: String,

    /// Maximum undo levels (0 = unlimited)
    #[serde(default = "default_max_undo")]
    pub max_undo: usize,

    /// Attribute carrying stable node ids
    #[serde(default = "default_id_attribute")]
    pub id_attribute: String,

    /// Save rules by action name
    #[serde(default)]
    pub rules: HashMap<String, ActionRule>,
}

fn default_name() -> String {
    "default".to_string()
}

fn default_max_undo() -> usize {
    DEFAULT_MAX_UNDO
}

fn default_id_attribute() -> String {
    DEFAULT_ID_ATTRIBUTE.to_string()
}

impl TrackerConfig {
    /// Load config from a directory
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config_path = dir.as_ref().join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_json(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Fresh resolver using the configured id attribute
    pub fn resolver(&self) -> Resolver {
        Resolver::new(self.id_attribute.as_str())
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            max_undo: default_max_undo(),
            id_attribute: default_id_attribute(),
            rules: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::undo_data::OnFail;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "name": "books",
            "maxUndo": 20,
            "idAttribute": "uid",
            "rules": {
                "setProperty": { "set": "rpc:setAttr({@uid}, {$name}, {$value})", "onFail": "retry" },
                "remove": { "set": "rpc:remove({xpath})", "undo": "rpc:restore({xpath})" }
            }
        }"#;

        let config = TrackerConfig::from_json(json).unwrap();
        assert_eq!(config.name, "books");
        assert_eq!(config.max_undo, 20);
        assert_eq!(config.id_attribute, "uid");
        assert_eq!(config.rules["setProperty"].on_fail, OnFail::Retry);
        assert_eq!(
            config.rules["remove"].data_instruction(true),
            Some("rpc:restore({xpath})")
        );
        assert_eq!(config.rules["remove"].on_fail, OnFail::Block);
        assert_eq!(config.resolver().id_attribute(), "uid");
    }

    #[test]
    fn test_default_config() {
        let config = TrackerConfig::from_json("{}").unwrap();
        assert_eq!(config, TrackerConfig::default());
        assert_eq!(config.max_undo, 100);
        assert_eq!(config.id_attribute, "a_id");
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrackerConfig::load(dir.path()).unwrap();
        assert_eq!(config, TrackerConfig::default());
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_CONFIG_NAME), r#"{ "maxUndo": 0 }"#).unwrap();
        assert_eq!(TrackerConfig::load(dir.path()).unwrap().max_undo, 0);

        std::fs::write(dir.path().join(DEFAULT_CONFIG_NAME), "{ nope").unwrap();
        assert!(matches!(
            TrackerConfig::load(dir.path()),
            Err(ConfigError::Json(_))
        ));
    }
}
