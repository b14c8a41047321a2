//! In-process ephemeral backend.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use kache_core::{CacheKey, KacheResult, StorageError, StoredValue};

use crate::traits::{BackendHandle, BackendKind, StorageBackend};

type EntryMap = HashMap<CacheKey, StoredValue>;

/// Map-backed cache storage.
///
/// Always open: `open` hands out a handle that borrows the shared map and
/// `close` does nothing. Clones share the same map, which is also how
/// callers inspect what a cached computation has stored.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<RwLock<EntryMap>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> KacheResult<RwLockReadGuard<'_, EntryMap>> {
        Ok(self
            .entries
            .read()
            .map_err(|_| StorageError::LockPoisoned)?)
    }

    fn write(&self) -> KacheResult<RwLockWriteGuard<'_, EntryMap>> {
        Ok(self
            .entries
            .write()
            .map_err(|_| StorageError::LockPoisoned)?)
    }

    /// Number of stored entries.
    pub fn len(&self) -> KacheResult<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> KacheResult<bool> {
        Ok(self.read()?.is_empty())
    }

    /// Stored value for `key`, if any.
    pub fn get_entry(&self, key: &CacheKey) -> KacheResult<Option<StoredValue>> {
        Ok(self.read()?.get(key).cloned())
    }

    /// Snapshot of every entry, sorted by key.
    pub fn entries(&self) -> KacheResult<Vec<(CacheKey, StoredValue)>> {
        let mut entries: Vec<_> = self
            .read()?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    /// Snapshot of every key, sorted.
    pub fn keys(&self) -> KacheResult<Vec<CacheKey>> {
        let mut keys: Vec<_> = self.read()?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

struct MemoryHandle<'a> {
    backend: &'a MemoryBackend,
}

impl BackendHandle for MemoryHandle<'_> {
    fn contains(&self, key: &CacheKey) -> KacheResult<bool> {
        Ok(self.backend.read()?.contains_key(key))
    }

    fn get(&self, key: &CacheKey) -> KacheResult<StoredValue> {
        self.backend.read()?.get(key).cloned().ok_or_else(|| {
            StorageError::MissingEntry {
                key: key.to_string(),
            }
            .into()
        })
    }

    fn set(&mut self, key: &CacheKey, value: &StoredValue) -> KacheResult<()> {
        self.backend.write()?.insert(key.clone(), value.clone());
        Ok(())
    }

    fn close(&mut self) -> KacheResult<()> {
        Ok(())
    }
}

impl StorageBackend for MemoryBackend {
    fn open(&self) -> KacheResult<Box<dyn BackendHandle + '_>> {
        Ok(Box::new(MemoryHandle { backend: self }))
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Ephemeral
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
