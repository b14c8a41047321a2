//! Scoped backend acquisition.
//!
//! [`OpenBackend`] owns a handle from [`StorageBackend::open`] and releases
//! it on every exit path: explicitly through [`OpenBackend::close`] on
//! success, or from `Drop` when a call bails out early with `?` or unwinds.

use kache_core::{CacheKey, KacheResult, StoredValue};
use kache_storage::{BackendHandle, StorageBackend};

pub(crate) struct OpenBackend<'a> {
    handle: Box<dyn BackendHandle + 'a>,
    location: String,
    closed: bool,
}

impl<'a> OpenBackend<'a> {
    pub(crate) fn open(backend: &'a dyn StorageBackend) -> KacheResult<Self> {
        let handle = backend.open()?;
        let location = backend.location();
        tracing::trace!(location = %location, kind = %backend.kind(), "Backend opened");
        Ok(Self {
            handle,
            location,
            closed: false,
        })
    }

    pub(crate) fn contains(&self, key: &CacheKey) -> KacheResult<bool> {
        self.handle.contains(key)
    }

    pub(crate) fn get(&self, key: &CacheKey) -> KacheResult<StoredValue> {
        self.handle.get(key)
    }

    pub(crate) fn set(&mut self, key: &CacheKey, value: &StoredValue) -> KacheResult<()> {
        self.handle.set(key, value)
    }

    /// Release the handle, surfacing any close failure.
    pub(crate) fn close(mut self) -> KacheResult<()> {
        self.closed = true;
        let result = self.handle.close();
        tracing::trace!(location = %self.location, "Backend closed");
        result
    }
}

impl Drop for OpenBackend<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        match self.handle.close() {
            Ok(()) => tracing::trace!(location = %self.location, "Backend closed on early exit"),
            Err(e) => tracing::warn!(
                location = %self.location,
                error = %e,
                "Failed to close backend on early exit"
            ),
        }
    }
}
