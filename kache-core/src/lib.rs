//! Kache Core - Parameters, Keys, Errors
//!
//! Everything a cached computation needs before it touches storage: the
//! parameter model and signature binding, cache key derivation, the error
//! taxonomy, and construction-time configuration. The only I/O here is
//! reading configuration files in [`config`]; storage lives in
//! `kache-storage`.

pub mod config;
pub mod error;
pub mod key;
pub mod params;

pub use config::{
    BackendConfig, CacheOptions, CallPolicy, KeyConfig, CONFIG_ENV_VAR, DEFAULT_MAP_SIZE_MB,
};
pub use error::{
    BindError, BoxError, ConfigError, KacheError, KacheResult, KeyError, StorageError,
};
pub use key::{canonical_encoding, derive_key, CacheKey, KeyFn, KeyStrategy, KEY_SEPARATOR};
pub use params::{CallArgs, ParamValue, Parameter, ParameterSet, Signature};

/// Value stored in a backend. Results are converted to and from this form.
pub type StoredValue = serde_json::Value;
