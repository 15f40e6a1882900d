//! Engine configuration.
//!
//! Hosts point the engine at a database and may override the card-number
//! prefix. Loaded from a JSON file; every field is optional.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Database location; falls back to
    /// [`crate::db::default_database_path`] when unset.
    pub database_path: Option<PathBuf>,
    /// Card-number prefix, e.g. "JC" → `JC-20260301-001`.
    pub card_number_prefix: Option<String>,
}

/// Loads and validates a config file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    load_config_from_str(&raw)
}

/// Parses and validates config JSON.
pub fn load_config_from_str(raw: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(raw)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if let Some(ref prefix) = config.card_number_prefix {
        if prefix.is_empty() {
            return Err(ConfigError::Validation {
                message: "cardNumberPrefix must not be empty".into(),
            });
        }
        if !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::Validation {
                message: format!("cardNumberPrefix '{}' must be alphanumeric", prefix),
            });
        }
    }
    Ok(())
}

/// Returns the canonical config path: `~/.jobdeck/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".jobdeck").join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_valid() {
        let config = load_config_from_str("{}").unwrap();
        assert!(config.database_path.is_none());
        assert!(config.card_number_prefix.is_none());
    }

    #[test]
    fn test_full_config() {
        let config = load_config_from_str(
            r#"{"databasePath": "/var/lib/jobdeck/jobdeck.db", "cardNumberPrefix": "WS"}"#,
        )
        .unwrap();
        assert_eq!(
            config.database_path.as_deref(),
            Some(Path::new("/var/lib/jobdeck/jobdeck.db"))
        );
        assert_eq!(config.card_number_prefix.as_deref(), Some("WS"));
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        assert!(load_config_from_str(r#"{"cardNumberPrefix": ""}"#).is_err());
        assert!(load_config_from_str(r#"{"cardNumberPrefix": "A B"}"#).is_err());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(load_config_from_str(r#"{"unknown": 1}"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"cardNumberPrefix": "JD"}"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.card_number_prefix.as_deref(), Some("JD"));

        let err = load_config(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.is_some());
        assert!(path.unwrap().to_string_lossy().contains(".jobdeck"));
    }
}
