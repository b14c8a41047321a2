//! Kache Test Utilities
//!
//! Shared test infrastructure for the kache workspace:
//! - Fake backends that record every operation or refuse to open
//! - Proptest generators for parameter values and parameter sets

use std::sync::{Arc, Mutex};

pub use kache_core::{CacheKey, KacheResult, ParamValue, ParameterSet, StorageError, StoredValue};
use kache_storage::{BackendHandle, BackendKind, MemoryBackend, StorageBackend};

// ============================================================================
// RECORDING BACKEND
// ============================================================================

/// One operation observed by a [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    Open,
    Contains(CacheKey),
    Get(CacheKey),
    Set(CacheKey),
    Close,
}

/// Backend that behaves like a [`MemoryBackend`] and logs every call.
///
/// Reports itself as persistent so tests exercise the same open/close
/// bookkeeping a real store would need. Clones share both the log and the
/// stored entries.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    inner: MemoryBackend,
    events: Arc<Mutex<Vec<BackendEvent>>>,
    fail_close: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose handles fail to close (after recording the attempt).
    pub fn failing_close() -> Self {
        Self {
            fail_close: true,
            ..Self::default()
        }
    }

    /// The wrapped map, for inspecting stored entries.
    pub fn inner(&self) -> &MemoryBackend {
        &self.inner
    }

    pub fn events(&self) -> Vec<BackendEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn open_count(&self) -> usize {
        self.count(|e| matches!(e, BackendEvent::Open))
    }

    pub fn close_count(&self) -> usize {
        self.count(|e| matches!(e, BackendEvent::Close))
    }

    /// Handles opened but not yet closed.
    pub fn open_handles(&self) -> usize {
        self.open_count() - self.close_count()
    }

    pub fn clear_events(&self) {
        self.events.lock().unwrap().clear();
    }

    fn count(&self, pred: impl Fn(&BackendEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    fn record(&self, event: BackendEvent) {
        self.events.lock().unwrap().push(event);
    }
}

struct RecordingHandle<'a> {
    backend: &'a RecordingBackend,
    inner: Box<dyn BackendHandle + 'a>,
    closed: bool,
}

impl BackendHandle for RecordingHandle<'_> {
    fn contains(&self, key: &CacheKey) -> KacheResult<bool> {
        self.backend.record(BackendEvent::Contains(key.clone()));
        self.inner.contains(key)
    }

    fn get(&self, key: &CacheKey) -> KacheResult<StoredValue> {
        self.backend.record(BackendEvent::Get(key.clone()));
        self.inner.get(key)
    }

    fn set(&mut self, key: &CacheKey, value: &StoredValue) -> KacheResult<()> {
        self.backend.record(BackendEvent::Set(key.clone()));
        self.inner.set(key, value)
    }

    fn close(&mut self) -> KacheResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.backend.record(BackendEvent::Close);
        self.inner.close()?;
        if self.backend.fail_close {
            return Err(StorageError::CloseFailed {
                reason: "injected close failure".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl StorageBackend for RecordingBackend {
    fn open(&self) -> KacheResult<Box<dyn BackendHandle + '_>> {
        self.record(BackendEvent::Open);
        Ok(Box::new(RecordingHandle {
            backend: self,
            inner: self.inner.open()?,
            closed: false,
        }))
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Persistent
    }

    fn location(&self) -> String {
        "recording".to_string()
    }
}

// ============================================================================
// UNAVAILABLE BACKEND
// ============================================================================

/// Persistent backend whose store can never be opened.
#[derive(Debug, Clone)]
pub struct UnavailableBackend {
    location: String,
}

impl UnavailableBackend {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }
}

impl StorageBackend for UnavailableBackend {
    fn open(&self) -> KacheResult<Box<dyn BackendHandle + '_>> {
        Err(StorageError::BackendUnavailable {
            location: self.location.clone(),
            reason: "store is locked".to_string(),
        }
        .into())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Persistent
    }

    fn location(&self) -> String {
        self.location.clone()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    /// Arbitrary JSON parameter value, nested up to a few levels.
    pub fn arb_param_value() -> impl Strategy<Value = ParamValue> {
        let leaf = prop_oneof![
            Just(ParamValue::Null),
            any::<bool>().prop_map(ParamValue::from),
            any::<i64>().prop_map(ParamValue::from),
            "[a-zA-Z0-9 _'\"-]{0,12}".prop_map(ParamValue::from),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(ParamValue::from),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                    .prop_map(|m| ParamValue::Object(m.into_iter().collect())),
            ]
        })
    }

    /// Parameter entries with distinct names, in arbitrary order.
    pub fn arb_param_entries() -> impl Strategy<Value = Vec<(String, ParamValue)>> {
        prop::collection::btree_map("[a-z][a-z0-9_]{0,7}", arb_param_value(), 0..6)
            .prop_map(|m| m.into_iter().collect::<Vec<_>>())
            .prop_shuffle()
    }

    pub fn arb_parameter_set() -> impl Strategy<Value = ParameterSet> {
        arb_param_entries().prop_map(|entries| entries.into_iter().collect())
    }

    /// Computation names: non-empty identifiers.
    pub fn arb_computation_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,11}"
    }
}
