//! Construction-time configuration.
//!
//! Options can be built in code or loaded from TOML:
//!
//! ```toml
//! policy = "serialized"
//!
//! [backend]
//! kind = "lmdb"
//! path = "/var/cache/myapp"
//! map_size_mb = 64
//!
//! [key]
//! kind = "digest"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::key::KeyStrategy;

/// Environment variable naming a TOML options file.
pub const CONFIG_ENV_VAR: &str = "KACHE_CONFIG";

/// Default LMDB map size in MiB.
pub const DEFAULT_MAP_SIZE_MB: usize = 64;

fn default_map_size_mb() -> usize {
    DEFAULT_MAP_SIZE_MB
}

/// Which storage backend a cached computation uses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", deny_unknown_fields)]
pub enum BackendConfig {
    /// A map owned by the process, lost when the backend is dropped.
    #[default]
    InMemory,
    /// An LMDB environment opened and closed around every call.
    Lmdb {
        path: PathBuf,
        #[serde(default = "default_map_size_mb")]
        map_size_mb: usize,
    },
}

impl BackendConfig {
    pub fn lmdb(path: impl Into<PathBuf>) -> Self {
        Self::Lmdb {
            path: path.into(),
            map_size_mb: DEFAULT_MAP_SIZE_MB,
        }
    }
}

/// Serializable subset of [`KeyStrategy`]. Custom functions are code-only.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", deny_unknown_fields)]
pub enum KeyConfig {
    #[default]
    Canonical,
    Digest,
    Constant {
        #[serde(default)]
        value: String,
    },
}

impl KeyConfig {
    pub fn to_strategy(&self) -> KeyStrategy {
        match self {
            Self::Canonical => KeyStrategy::Canonical,
            Self::Digest => KeyStrategy::Digest,
            Self::Constant { value } => KeyStrategy::Constant(value.clone()),
        }
    }
}

/// Synchronization applied around one get-or-compute call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallPolicy {
    /// No locking. Concurrent misses on one key may each compute and write.
    #[default]
    Concurrent,
    /// One call at a time per cached computation, so a key is computed at
    /// most once within that handle. Re-entrant on the calling thread, so a
    /// computation may recurse through its own cache.
    Serialized,
}

/// All construction-time options of a cached computation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheOptions {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub key: KeyConfig,
    #[serde(default)]
    pub policy: CallPolicy,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_key(mut self, key: KeyConfig) -> Self {
        self.key = key;
        self
    }

    pub fn with_policy(mut self, policy: CallPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Load options from the file named by `KACHE_CONFIG`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV_VAR)
            .ok()
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingConfigPath)?;
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let options: CacheOptions = toml::from_str(contents)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let BackendConfig::Lmdb { path, map_size_mb } = &self.backend {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "backend.path",
                    reason: "must not be empty".to_string(),
                });
            }
            if *map_size_mb == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "backend.map_size_mb",
                    reason: "must be > 0".to_string(),
                });
            }
            if map_size_mb.checked_mul(1024 * 1024).is_none() {
                return Err(ConfigError::InvalidValue {
                    field: "backend.map_size_mb",
                    reason: format!("{map_size_mb} MiB does not fit in a byte count"),
                });
            }
        }
        Ok(())
    }
}
