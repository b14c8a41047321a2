//! LMDB-backed persistent cache storage.
//!
//! Uses the heed crate (Rust bindings for LMDB). Unlike a long-lived LMDB
//! cache, this backend opens the environment at the start of every call and
//! closes it before the call returns, so the on-disk state is consistent
//! between calls and other processes can open the same directory in the
//! meantime.
//!
//! # Layout
//!
//! A single unnamed database maps the UTF-8 cache key to the compact JSON
//! encoding of the stored value. Each `set` commits its own write
//! transaction.
//!
//! # In-process exclusion
//!
//! LMDB refuses to open one environment twice in the same process, so
//! handles for the same directory go through a per-path gate shared by every
//! `LmdbBackend` pointing there. The gate is re-entrant: a handle opened
//! while the same thread already holds one (a cached computation calling
//! another cached computation on the same store) reuses the open
//! environment, and the last handle to close releases it. Handles on other
//! threads wait until then.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use kache_core::{CacheKey, ConfigError, KacheError, KacheResult, StorageError, StoredValue};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use crate::traits::{BackendHandle, BackendKind, StorageBackend};

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment at {path}: {reason}")]
    EnvOpen { path: String, reason: String },

    /// The store directory could not be created or resolved.
    #[error("Cannot use {path} as an LMDB directory: {source}")]
    Location {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Map size in MiB does not fit in a byte count.
    #[error("LMDB map size of {map_size_mb} MiB is too large")]
    MapSizeOverflow { map_size_mb: usize },

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error for {key}: {reason}")]
    Serialization { key: String, reason: String },

    /// Deserialization error.
    #[error("Deserialization error for {key}: {reason}")]
    Deserialization { key: String, reason: String },

    /// Operation on a handle that was already closed.
    #[error("LMDB handle already closed")]
    Closed,
}

/// Convert LmdbError to KacheError.
impl From<LmdbError> for KacheError {
    fn from(e: LmdbError) -> Self {
        let storage = match e {
            LmdbError::EnvOpen { path, reason } => StorageError::BackendUnavailable {
                location: path,
                reason,
            },
            LmdbError::Location { path, source } => StorageError::BackendUnavailable {
                location: path,
                reason: source.to_string(),
            },
            LmdbError::MapSizeOverflow { map_size_mb } => {
                return KacheError::Config(ConfigError::InvalidValue {
                    field: "backend.map_size_mb",
                    reason: format!("{map_size_mb} MiB does not fit in a byte count"),
                })
            }
            LmdbError::Serialization { key, reason }
            | LmdbError::Deserialization { key, reason } => StorageError::Codec { key, reason },
            other => StorageError::TransactionFailed {
                reason: other.to_string(),
            },
        };
        KacheError::Storage(storage)
    }
}

/// The environment currently open on one directory.
#[derive(Default)]
struct SharedEnv {
    env: Option<(Env, Database<Str, Bytes>)>,
    handles: usize,
}

type PathGate = ReentrantMutex<RefCell<SharedEnv>>;

/// Per-path gates, shared by every backend in the process.
fn path_gate(path: &Path) -> Arc<PathGate> {
    static GATES: OnceLock<Mutex<HashMap<PathBuf, Arc<PathGate>>>> = OnceLock::new();
    let gates = GATES.get_or_init(|| Mutex::new(HashMap::new()));
    let mut gates = gates.lock().unwrap_or_else(PoisonError::into_inner);
    gates
        .entry(path.to_path_buf())
        .or_insert_with(|| Arc::new(ReentrantMutex::new(RefCell::default())))
        .clone()
}

/// Persistent LMDB backend.
///
/// # Example
///
/// ```ignore
/// use kache_storage::{LmdbBackend, StorageBackend};
///
/// let backend = LmdbBackend::new("/tmp/kache", 64)?;
/// let mut handle = backend.open()?;
/// handle.set(&key, &serde_json::json!(42))?;
/// handle.close()?;
/// ```
pub struct LmdbBackend {
    path: PathBuf,
    map_size_mb: usize,
    map_size: usize,
    gate: Arc<PathGate>,
}

impl fmt::Debug for LmdbBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LmdbBackend")
            .field("path", &self.path)
            .field("map_size_mb", &self.map_size_mb)
            .finish_non_exhaustive()
    }
}

impl LmdbBackend {
    /// Create a backend for the LMDB directory at `path`.
    ///
    /// The directory is created if missing. The environment itself is not
    /// opened until the first call.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `map_size_mb` - Maximum size of the database in megabytes
    pub fn new<P: AsRef<Path>>(path: P, map_size_mb: usize) -> Result<Self, LmdbError> {
        let map_size = map_size_mb
            .checked_mul(1024 * 1024)
            .ok_or(LmdbError::MapSizeOverflow { map_size_mb })?;

        let requested = path.as_ref();
        let location = |source: std::io::Error| LmdbError::Location {
            path: requested.display().to_string(),
            source,
        };
        std::fs::create_dir_all(requested).map_err(location)?;
        let path = std::fs::canonicalize(requested).map_err(location)?;

        let gate = path_gate(&path);
        Ok(Self {
            path,
            map_size_mb,
            map_size,
            gate,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn map_size_mb(&self) -> usize {
        self.map_size_mb
    }

    fn open_env(&self) -> Result<(Env, Database<Str, Bytes>), LmdbError> {
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(self.map_size)
                .max_dbs(1)
                .open(&self.path)
        }
        .map_err(|e| LmdbError::EnvOpen {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbError::Transaction(e.to_string()))?;

        let db: Database<Str, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbError::Transaction(e.to_string()))?;

        Ok((env, db))
    }
}

/// One use of the shared environment, held for a single call.
struct LmdbHandle<'a> {
    env: Option<Env>,
    db: Database<Str, Bytes>,
    location: &'a Path,
    gate: ReentrantMutexGuard<'a, RefCell<SharedEnv>>,
}

impl LmdbHandle<'_> {
    fn env(&self) -> Result<&Env, LmdbError> {
        self.env.as_ref().ok_or(LmdbError::Closed)
    }

    fn read_bytes(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, LmdbError> {
        let env = self.env()?;
        let rtxn = env
            .read_txn()
            .map_err(|e| LmdbError::Transaction(e.to_string()))?;
        let bytes = self
            .db
            .get(&rtxn, key.as_str())
            .map_err(|e| LmdbError::Transaction(e.to_string()))?;
        Ok(bytes.map(<[u8]>::to_vec))
    }
}

impl BackendHandle for LmdbHandle<'_> {
    fn contains(&self, key: &CacheKey) -> KacheResult<bool> {
        Ok(self.read_bytes(key)?.is_some())
    }

    fn get(&self, key: &CacheKey) -> KacheResult<StoredValue> {
        let bytes = self
            .read_bytes(key)?
            .ok_or_else(|| StorageError::MissingEntry {
                key: key.to_string(),
            })?;
        let value = serde_json::from_slice(&bytes).map_err(|e| LmdbError::Deserialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(value)
    }

    fn set(&mut self, key: &CacheKey, value: &StoredValue) -> KacheResult<()> {
        let bytes = serde_json::to_vec(value).map_err(|e| LmdbError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let env = self.env()?;
        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbError::Transaction(e.to_string()))?;

        self.db
            .put(&mut wtxn, key.as_str(), &bytes)
            .map_err(|e| LmdbError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbError::Transaction(e.to_string()))?;

        Ok(())
    }

    fn close(&mut self) -> KacheResult<()> {
        let Some(env) = self.env.take() else {
            return Ok(());
        };
        // Our clone must be gone before waiting on the last one.
        drop(env);

        let mut shared = self.gate.borrow_mut();
        shared.handles = shared.handles.saturating_sub(1);
        if shared.handles == 0 {
            if let Some((env, _)) = shared.env.take() {
                env.prepare_for_closing().wait();
                tracing::trace!(path = %self.location.display(), "Closed LMDB environment");
            }
        }
        Ok(())
    }
}

impl Drop for LmdbHandle<'_> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl StorageBackend for LmdbBackend {
    fn open(&self) -> KacheResult<Box<dyn BackendHandle + '_>> {
        let gate = self.gate.lock();
        let (env, db) = {
            let mut shared = gate.borrow_mut();
            let (env, db) = match &shared.env {
                Some((env, db)) => {
                    tracing::trace!(
                        path = %self.path.display(),
                        handles = shared.handles,
                        "Reusing open LMDB environment"
                    );
                    (env.clone(), *db)
                }
                None => {
                    let (env, db) = self.open_env()?;
                    tracing::trace!(path = %self.path.display(), "Opened LMDB environment");
                    shared.env = Some((env.clone(), db));
                    (env, db)
                }
            };
            shared.handles += 1;
            (env, db)
        };

        Ok(Box::new(LmdbHandle {
            env: Some(env),
            db,
            location: &self.path,
            gate,
        }))
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Persistent
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
