//! Cache key derivation.
//!
//! A key is `<computation name>__<hash of parameters>`. The name prefix
//! namespaces keys, so several computations can share one backend without
//! colliding.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::KeyError;
use crate::params::ParameterSet;

/// Separator between the computation name and the parameter hash.
pub const KEY_SEPARATOR: &str = "__";

/// Stable string identifying one (computation, parameter set) pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an already-derived key, e.g. one read back from a store.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// The computation-name prefix, if the key has one.
    pub fn computation(&self) -> Option<&str> {
        self.0.split_once(KEY_SEPARATOR).map(|(name, _)| name)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// User-supplied key function.
pub type KeyFn = dyn Fn(&ParameterSet) -> Result<String, KeyError> + Send + Sync;

/// How the parameter half of a key is produced.
#[derive(Clone, Default)]
pub enum KeyStrategy {
    /// Name-sorted parameters, each name and value as compact JSON.
    #[default]
    Canonical,
    /// SHA-256 of the canonical encoding, hex encoded.
    Digest,
    /// Ignore parameters entirely. Every call shares one entry.
    Constant(String),
    /// Arbitrary function of the parameters.
    Custom(Arc<KeyFn>),
}

impl KeyStrategy {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&ParameterSet) -> Result<String, KeyError> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Single-entry mode: the first result is reused for every call.
    pub fn unconditional() -> Self {
        Self::Constant(String::new())
    }

    /// Hash `params` according to this strategy.
    pub fn hash(&self, params: &ParameterSet) -> Result<String, KeyError> {
        match self {
            Self::Canonical => canonical_encoding(params),
            Self::Digest => {
                let encoded = canonical_encoding(params)?;
                Ok(hex::encode(Sha256::digest(encoded.as_bytes())))
            }
            Self::Constant(value) => Ok(value.clone()),
            Self::Custom(f) => f(params),
        }
    }
}

impl fmt::Debug for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Canonical => f.write_str("Canonical"),
            Self::Digest => f.write_str("Digest"),
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Render parameters as `[("a", 1), ("b", 2)]`.
///
/// Values use serde_json's compact form; object keys inside values come out
/// sorted, so the encoding does not depend on insertion order anywhere.
pub fn canonical_encoding(params: &ParameterSet) -> Result<String, KeyError> {
    let mut out = String::from("[");
    for (index, (name, value)) in params.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        let name_json = serde_json::to_string(name).map_err(|e| KeyError::Unencodable {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        let value_json = serde_json::to_string(value).map_err(|e| KeyError::Unencodable {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        out.push('(');
        out.push_str(&name_json);
        out.push_str(", ");
        out.push_str(&value_json);
        out.push(')');
    }
    out.push(']');
    Ok(out)
}

/// Derive the cache key for one call of `computation`.
pub fn derive_key(
    computation: &str,
    params: &ParameterSet,
    strategy: &KeyStrategy,
) -> Result<CacheKey, KeyError> {
    if computation.is_empty() {
        return Err(KeyError::EmptyName);
    }
    let hash = strategy.hash(params)?;
    let mut key = String::with_capacity(computation.len() + KEY_SEPARATOR.len() + hash.len());
    key.push_str(computation);
    key.push_str(KEY_SEPARATOR);
    key.push_str(&hash);
    Ok(CacheKey(key))
}
