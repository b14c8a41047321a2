//! Error types for kache operations

use thiserror::Error;

/// Boxed error returned by a wrapped computation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Argument binding errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BindError {
    #[error("Too many positional arguments: expected at most {expected}, got {got}")]
    TooManyPositional { expected: usize, got: usize },

    #[error("Unknown parameter: {name}")]
    UnknownParameter { name: String },

    #[error("Multiple values for argument: {name}")]
    DuplicateArgument { name: String },

    #[error("Missing required argument: {name}")]
    MissingArgument { name: String },

    #[error("Parameter declared more than once: {name}")]
    DuplicateDeclaration { name: String },

    #[error("Parameter {name} has the wrong type: {reason}")]
    InvalidType { name: String, reason: String },
}

/// Key derivation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("Computation name must not be empty")]
    EmptyName,

    #[error("Key function failed: {reason}")]
    HashFailed { reason: String },

    #[error("Parameter {name} could not be encoded: {reason}")]
    Unencodable { name: String, reason: String },
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Backend unavailable at {location}: {reason}")]
    BackendUnavailable { location: String, reason: String },

    #[error("Missing cache entry: {key}")]
    MissingEntry { key: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Value codec failed for {key}: {reason}")]
    Codec { key: String, reason: String },

    #[error("Backend close failed: {reason}")]
    CloseFailed { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (set KACHE_CONFIG)")]
    MissingConfigPath,

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Master error type for all kache errors.
#[derive(Debug, Error)]
pub enum KacheError {
    #[error("Bind error: {0}")]
    Bind(#[from] BindError),

    #[error("Key derivation error: {0}")]
    KeyDerivation(#[from] KeyError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Computation {computation} failed: {source}")]
    Computation {
        computation: String,
        #[source]
        source: BoxError,
    },
}

impl KacheError {
    /// Wrap a failure raised by the computation called `computation`.
    pub fn computation(computation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Computation {
            computation: computation.into(),
            source: source.into(),
        }
    }

    /// True if the persistent store could not be opened.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Storage(StorageError::BackendUnavailable { .. })
        )
    }

    /// True if the error came from the wrapped computation itself.
    pub fn is_computation(&self) -> bool {
        matches!(self, Self::Computation { .. })
    }
}

/// Result type alias for kache operations.
pub type KacheResult<T> = Result<T, KacheError>;

// =============================================================================
// TESTS
// =============================================================================
