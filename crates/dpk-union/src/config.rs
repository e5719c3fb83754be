use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors loading a [`UnionConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Tunables for a [`UnionStore`](crate::UnionStore).
///
/// ```toml
/// max_chain_length = 1000
/// refresh_on_miss = true
/// min_refresh_interval_ms = 0
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UnionConfig {
    /// Most deltas a single chain may contain, snapshot included.
    pub max_chain_length: usize,
    /// Refresh the store list once when a lookup misses everywhere.
    pub refresh_on_miss: bool,
    /// Minimum time between two refreshes; 0 disables the limit.
    pub min_refresh_interval_ms: u64,
}

impl Default for UnionConfig {
    fn default() -> Self {
        Self {
            max_chain_length: 1000,
            refresh_on_miss: true,
            min_refresh_interval_ms: 0,
        }
    }
}

impl UnionConfig {
    /// Parse and validate a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_chain_length == 0 {
            return Err(ConfigError::Invalid(
                "max_chain_length must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
