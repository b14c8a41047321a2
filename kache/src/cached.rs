//! The get-or-compute controller.
//!
//! Every call walks the same path regardless of backend:
//!
//! ```text
//! START -> KEY_DERIVED -> BACKEND_OPEN -> { HIT | MISS -> COMPUTED } -> BACKEND_CLOSED -> DONE
//! ```
//!
//! `BACKEND_OPEN` is only ever left through `BACKEND_CLOSED`; the scope guard
//! in [`crate::scope`] closes the handle even when the computation fails.
//!
//! # Concurrency
//!
//! Under [`CallPolicy::Concurrent`] nothing is locked around the
//! contains / compute / set sequence: two threads missing on the same key may
//! both compute and both write, and the later write wins. Use
//! [`CallPolicy::Serialized`] to compute each key at most once per
//! `CachedComputation`. The serializing lock is re-entrant, so a computation
//! may call itself (recursive memoization) on the same thread; a recursive
//! call made from another thread it waits on will deadlock. Neither policy
//! coordinates across processes.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use kache_core::{
    derive_key, BoxError, CacheKey, CacheOptions, CallArgs, CallPolicy, KacheError, KacheResult,
    KeyError, KeyStrategy, ParameterSet, Signature, StorageError,
};
use kache_storage::{open_backend, MemoryBackend, StorageBackend};
use parking_lot::ReentrantMutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::scope::OpenBackend;
use crate::stats::{CacheStats, CallInfo, CallOutcome, StatsCounters};

type Computation<R> = dyn Fn(&ParameterSet) -> Result<R, BoxError> + Send + Sync;

/// A computation wrapped with a result cache.
///
/// Owns the hit/miss counters and call diagnostics for that computation.
/// The backend is shared through an `Arc`, so several computations can store
/// into one backend; keys are namespaced by computation name.
///
/// # Example
///
/// ```ignore
/// use kache::{cache, CallArgs, Signature};
///
/// let f = cache("f", Signature::new().param("a").param_with_default("b", 2))
///     .build(|p| Ok(p.get_as::<i64>("a")? * p.get_as::<i64>("b")?))?;
///
/// assert_eq!(f.call(&CallArgs::new().arg(1))?, 2);
/// assert_eq!(f.stats().computed, 1);
/// ```
pub struct CachedComputation<R> {
    name: String,
    signature: Signature,
    key_strategy: KeyStrategy,
    policy: CallPolicy,
    backend: Arc<dyn StorageBackend>,
    computation: Box<Computation<R>>,
    stats: StatsCounters,
    info: RwLock<CallInfo>,
    serial: ReentrantMutex<()>,
}

impl<R> CachedComputation<R>
where
    R: Serialize + DeserializeOwned,
{
    /// Build backend, key strategy and policy from `options`.
    pub fn from_options<F>(
        name: impl Into<String>,
        signature: Signature,
        options: &CacheOptions,
        computation: F,
    ) -> KacheResult<Self>
    where
        F: Fn(&ParameterSet) -> Result<R, BoxError> + Send + Sync + 'static,
    {
        CachedComputationBuilder::new(name, signature)
            .options(options)?
            .build(computation)
    }

    /// Bind `args` against the signature, then get or compute.
    pub fn call(&self, args: &CallArgs) -> KacheResult<R> {
        let params = self.signature.bind(args)?;
        self.call_with_params(&params)
    }

    /// Get or compute for an already complete parameter set.
    pub fn call_with_params(&self, params: &ParameterSet) -> KacheResult<R> {
        let _serial = match self.policy {
            CallPolicy::Serialized => Some(self.serial.lock()),
            CallPolicy::Concurrent => None,
        };

        let key = derive_key(&self.name, params, &self.key_strategy)?;
        self.write_info(|info| {
            info.last_hash = Some(key.clone());
            info.last_outcome = None;
            info.last_call_at = Some(Utc::now());
        });

        let mut scope = OpenBackend::open(self.backend.as_ref())?;

        let outcome = if scope.contains(&key)? {
            CallOutcome::Hit
        } else {
            CallOutcome::Miss
        };
        self.stats.record(outcome);
        self.write_info(|info| info.last_outcome = Some(outcome));

        if outcome == CallOutcome::Miss {
            let result = (self.computation)(params)
                .map_err(|e| KacheError::computation(self.name.as_str(), e))?;
            let value = serde_json::to_value(&result).map_err(|e| StorageError::Codec {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
            scope.set(&key, &value)?;
        }

        // Callers see what the backend returns, not the value just computed.
        let stored = scope.get(&key).inspect_err(|e| {
            if matches!(e, KacheError::Storage(StorageError::MissingEntry { .. })) {
                tracing::error!(
                    computation = %self.name,
                    key = %key,
                    "Entry missing right after contains/set"
                );
            }
        })?;
        scope.close()?;

        tracing::debug!(
            computation = %self.name,
            key = %key,
            outcome = %outcome,
            "Cache call"
        );

        let result = serde_json::from_value(stored).map_err(|e| StorageError::Codec {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(result)
    }
}

impl<R> CachedComputation<R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn key_strategy(&self) -> &KeyStrategy {
        &self.key_strategy
    }

    pub fn policy(&self) -> CallPolicy {
        self.policy
    }

    /// The backend this computation stores into.
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Current hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Diagnostics about the most recent call.
    pub fn info(&self) -> CallInfo {
        self.info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Key derived by the most recent call.
    pub fn last_key(&self) -> Option<CacheKey> {
        self.info().last_hash
    }

    /// Key this computation would use for `params`.
    pub fn key_for(&self, params: &ParameterSet) -> KacheResult<CacheKey> {
        Ok(derive_key(&self.name, params, &self.key_strategy)?)
    }

    fn write_info(&self, update: impl FnOnce(&mut CallInfo)) {
        let mut info = self.info.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut info);
    }
}

impl<R> fmt::Debug for CachedComputation<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedComputation")
            .field("name", &self.name)
            .field("key_strategy", &self.key_strategy)
            .field("policy", &self.policy)
            .field("backend", &self.backend.location())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Start building a cached computation called `name`.
pub fn cache(name: impl Into<String>, signature: Signature) -> CachedComputationBuilder {
    CachedComputationBuilder::new(name, signature)
}

/// Builder for [`CachedComputation`].
pub struct CachedComputationBuilder {
    name: String,
    signature: Signature,
    backend: Option<Arc<dyn StorageBackend>>,
    key_strategy: KeyStrategy,
    policy: CallPolicy,
}

impl CachedComputationBuilder {
    pub fn new(name: impl Into<String>, signature: Signature) -> Self {
        Self {
            name: name.into(),
            signature,
            backend: None,
            key_strategy: KeyStrategy::default(),
            policy: CallPolicy::default(),
        }
    }

    /// Store into `backend`. Defaults to a fresh [`MemoryBackend`].
    pub fn backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.key_strategy = strategy;
        self
    }

    pub fn policy(mut self, policy: CallPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Apply configured backend, key strategy and policy.
    pub fn options(mut self, options: &CacheOptions) -> KacheResult<Self> {
        options.validate()?;
        self.backend = Some(open_backend(&options.backend)?);
        self.key_strategy = options.key.to_strategy();
        self.policy = options.policy;
        Ok(self)
    }

    /// Wrap a fallible computation.
    pub fn build<R, F>(self, computation: F) -> KacheResult<CachedComputation<R>>
    where
        R: Serialize + DeserializeOwned,
        F: Fn(&ParameterSet) -> Result<R, BoxError> + Send + Sync + 'static,
    {
        if self.name.is_empty() {
            return Err(KeyError::EmptyName.into());
        }
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(MemoryBackend::new()));

        Ok(CachedComputation {
            name: self.name,
            signature: self.signature,
            key_strategy: self.key_strategy,
            policy: self.policy,
            backend,
            computation: Box::new(computation),
            stats: StatsCounters::default(),
            info: RwLock::new(CallInfo::default()),
            serial: ReentrantMutex::new(()),
        })
    }

    /// Wrap a computation that cannot fail.
    pub fn build_infallible<R, F>(self, computation: F) -> KacheResult<CachedComputation<R>>
    where
        R: Serialize + DeserializeOwned,
        F: Fn(&ParameterSet) -> R + Send + Sync + 'static,
    {
        self.build(move |params| Ok(computation(params)))
    }
}
