use std::path::Path;

use serde::{Deserialize, Serialize};

/// Session configuration, usually read from a `config.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Locators of the root domain used by `root_resolve`
    #[serde(default)]
    pub root: Vec<String>,
    /// Timeout handed through to backend fetches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_timeout_ms: Option<u64>,
    /// Allow master records to be stored without access control
    #[serde(default = "default_allow_unsafe_store")]
    pub allow_unsafe_store: bool,
}

fn default_allow_unsafe_store() -> bool {
    false
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: Vec::new(),
            fetch_timeout_ms: None,
            allow_unsafe_store: default_allow_unsafe_store(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

impl Config {
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = Config::from_toml("root = [\"mem:/hash/abc\"]").unwrap();
        assert_eq!(config.root, vec!["mem:/hash/abc".to_string()]);
        assert_eq!(config.fetch_timeout_ms, None);
        assert!(!config.allow_unsafe_store);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config {
            root: vec!["fs:/hash/00".to_string()],
            fetch_timeout_ms: Some(500),
            allow_unsafe_store: true,
        };
        let recovered = Config::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(recovered.fetch_timeout_ms, Some(500));
        assert!(recovered.allow_unsafe_store);
    }
}
