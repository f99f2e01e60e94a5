//! Connection manager configuration.
//!
//! Loaded from a TOML file or built in code. Every field has a default, so
//! an empty file yields a working configuration.

use crate::error::ConfigError;
use crate::table::IndexingMode;
use serde::Deserialize;
use std::path::Path;

/// Classic `FD_SETSIZE`, the number of handles a `select()` set can hold.
pub const DEFAULT_CAPACITY: usize = 1024;


/// Connection manager configuration loaded from TOML.
///
/// ```toml
/// indexing = "sparse"
/// capacity = 4096
/// fast_write = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManagerConfig {
    /// Handle indexing strategy: "dense" or "sparse".
    #[serde(default)]
    pub indexing: IndexingMode,

    /// Maximum number of slots. In dense mode this is also the exclusive
    /// upper bound on handle values.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Send once right away when a connection turns writable during
    /// reconciliation, instead of leaving every send to the poll cycle.
    #[serde(default = "default_fast_write")]
    pub fast_write: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            indexing: IndexingMode::default(),
            capacity: default_capacity(),
            fast_write: default_fast_write(),
        }
    }
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_fast_write() -> bool {
    true
}

impl ManagerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Invalid("capacity must be non-zero".to_string()));
        }
        if self.indexing == IndexingMode::Sparse && self.capacity > usize::MAX / 4 {
            return Err(ConfigError::Invalid(format!(
                "capacity {} is too large for sparse indexing",
                self.capacity
            )));
        }
        Ok(())
    }
}
