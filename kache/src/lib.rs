//! Kache - Get-or-Compute Result Cache
//!
//! Wraps a computation so that calls with equal parameters are answered from
//! a storage backend instead of being recomputed.
//!
//! - A [`Signature`] resolves positional and keyword call arguments plus
//!   defaults into a complete [`ParameterSet`]
//! - A [`KeyStrategy`] turns that set into a [`CacheKey`], namespaced by
//!   computation name
//! - A [`StorageBackend`] (in-memory or LMDB) holds the results
//! - [`CachedComputation`] runs the protocol and counts hits and misses
//!
//! # Example
//!
//! ```ignore
//! use kache::{cache, CallArgs, Signature};
//!
//! let f = cache("f", Signature::new().param("a").param_with_default("b", 2))
//!     .build(|p| Ok(p.get_as::<i64>("a")? * p.get_as::<i64>("b")?))?;
//!
//! assert_eq!(f.call(&CallArgs::new().arg(1))?, 2); // computed
//! assert_eq!(f.call(&CallArgs::new().kwarg("a", 1))?, 2); // cached
//! assert_eq!(f.stats().cached, 1);
//! ```

pub mod cached;
mod scope;
pub mod stats;

pub use cached::{cache, CachedComputation, CachedComputationBuilder};
pub use stats::{CacheStats, CallInfo, CallOutcome};

// Re-export the building blocks callers need alongside the controller.
pub use kache_core::{
    derive_key, BackendConfig, BindError, BoxError, CacheKey, CacheOptions, CallArgs, CallPolicy,
    ConfigError, KacheError, KacheResult, KeyConfig, KeyError, KeyStrategy, ParamValue,
    ParameterSet, Signature, StorageError, StoredValue,
};
pub use kache_storage::{
    open_backend, BackendHandle, BackendKind, LmdbBackend, LmdbError, MemoryBackend,
    StorageBackend,
};
