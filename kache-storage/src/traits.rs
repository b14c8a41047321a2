//! Storage backend traits.
//!
//! A backend is opened once per call and yields a [`BackendHandle`] that the
//! controller uses for the contains / set / get sequence and then closes.
//! Ephemeral backends hand out handles that borrow their map and close as a
//! no-op. Persistent backends acquire the external store in `open` and
//! release it in `close`. Both look the same to the controller.

use std::fmt;

use kache_core::{CacheKey, KacheResult, StoredValue};

/// Broad category of a backend, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Process-local map that lives as long as the backend value.
    Ephemeral,
    /// External store acquired and released around each call.
    Persistent,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ephemeral => f.write_str("ephemeral"),
            Self::Persistent => f.write_str("persistent"),
        }
    }
}

/// Open view of a backend, valid until [`close`](BackendHandle::close).
///
/// # Contract
///
/// - `get` on a key for which `contains` is false returns
///   `StorageError::MissingEntry`; absence is never encoded as a value
/// - `set` silently overwrites an existing entry
/// - `close` is idempotent; operations after `close` may fail
pub trait BackendHandle {
    fn contains(&self, key: &CacheKey) -> KacheResult<bool>;

    fn get(&self, key: &CacheKey) -> KacheResult<StoredValue>;

    fn set(&mut self, key: &CacheKey, value: &StoredValue) -> KacheResult<()>;

    /// Release whatever `open` acquired.
    fn close(&mut self) -> KacheResult<()>;
}

/// Pluggable storage backend.
///
/// Implementations must be shareable across threads; one backend may serve
/// several cached computations at once, which is safe because every key is
/// prefixed by its computation name.
pub trait StorageBackend: Send + Sync {
    /// Acquire a handle for one call.
    ///
    /// Fails with `StorageError::BackendUnavailable` if the store cannot be
    /// opened.
    fn open(&self) -> KacheResult<Box<dyn BackendHandle + '_>>;

    fn kind(&self) -> BackendKind;

    /// Where the data lives, for logs. Ephemeral backends report `memory`.
    fn location(&self) -> String;
}
