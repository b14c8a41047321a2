//! Backend selection from configuration.

use std::sync::Arc;

use kache_core::{BackendConfig, KacheResult};

use crate::lmdb_backend::LmdbBackend;
use crate::memory::MemoryBackend;
use crate::traits::StorageBackend;

/// Build the backend described by `config`.
///
/// An in-memory config yields a fresh, empty map. An LMDB config creates the
/// directory if needed but does not open the environment yet.
pub fn open_backend(config: &BackendConfig) -> KacheResult<Arc<dyn StorageBackend>> {
    match config {
        BackendConfig::InMemory => Ok(Arc::new(MemoryBackend::new())),
        BackendConfig::Lmdb { path, map_size_mb } => {
            let backend = LmdbBackend::new(path, *map_size_mb)?;
            Ok(Arc::new(backend))
        }
    }
}
