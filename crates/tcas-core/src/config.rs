use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{TcasError, TcasResult};

/// Top-level configuration (loaded from tcas.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TcasConfig {
    pub decomposition: DecompositionConfig,
    pub logging: LoggingConfig,
}

/// Settings consumed by the decomposing blob access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompositionConfig {
    /// Size of the blocks large blobs are split into (default: 2 MiB).
    /// Must be a power of two larger than 1 KiB, so that every full block
    /// is a complete subtree of parent nodes in the BLAKE3 Merkle tree.
    pub block_size_bytes: i64,
    /// Upper bound on manifest objects (default: 2 MiB). Blobs whose
    /// manifest would be larger are rejected.
    pub maximum_manifest_size_bytes: i64,
    /// Maximum number of block digests per FindMissing() call issued while
    /// checking composed objects (default: 1000).
    pub find_missing_batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            block_size_bytes: 2 * 1024 * 1024,
            maximum_manifest_size_bytes: 2 * 1024 * 1024,
            find_missing_batch_size: 1000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl DecompositionConfig {
    /// Check the invariants the decomposing blob access relies on.
    pub fn validate(&self) -> TcasResult<()> {
        let b = self.block_size_bytes;
        // Blocks of a single chunk would be stored as 97 byte chunk nodes.
        if b <= 1024 || (b as u64).count_ones() != 1 {
            return Err(TcasError::Config(format!(
                "block_size_bytes must be a power of two greater than 1024, got {b}"
            )));
        }
        if self.maximum_manifest_size_bytes <= 0 {
            return Err(TcasError::Config(format!(
                "maximum_manifest_size_bytes must be positive, got {}",
                self.maximum_manifest_size_bytes
            )));
        }
        if self.find_missing_batch_size == 0 {
            return Err(TcasError::Config(
                "find_missing_batch_size must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl TcasConfig {
    /// Parse and validate a configuration document.
    pub fn from_toml_str(s: &str) -> TcasResult<Self> {
        let config: TcasConfig =
            toml::from_str(s).map_err(|e| TcasError::Config(format!("parsing config: {e}")))?;
        config.decomposition.validate()?;
        Ok(config)
    }

    /// Load the configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> TcasResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(TcasConfig::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| TcasError::Config(format!("{}: {e}", path.display())))
    }
}
