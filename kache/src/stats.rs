//! Hit/miss accounting and per-call diagnostics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use kache_core::CacheKey;
use serde::{Deserialize, Serialize};

/// Snapshot of a cached computation's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Calls answered from the backend.
    pub cached: u64,
    /// Calls that ran the computation.
    pub computed: u64,
}

impl CacheStats {
    pub fn total(&self) -> u64 {
        self.cached + self.computed
    }

    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.cached as f64 / total as f64
        }
    }
}

/// Live counters. Each call bumps exactly one of them.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    cached: AtomicU64,
    computed: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record(&self, outcome: CallOutcome) {
        match outcome {
            CallOutcome::Hit => self.cached.fetch_add(1, Ordering::Relaxed),
            CallOutcome::Miss => self.computed.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            cached: self.cached.load(Ordering::Relaxed),
            computed: self.computed.load(Ordering::Relaxed),
        }
    }
}

/// Whether a call found its key in the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallOutcome {
    Hit,
    Miss,
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hit => f.write_str("hit"),
            Self::Miss => f.write_str("miss"),
        }
    }
}

/// Diagnostics about the most recent call. Overwritten on every call and
/// never consulted by the cache itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallInfo {
    /// Key derived for the most recent call.
    pub last_hash: Option<CacheKey>,
    /// Hit or miss of the most recent call, once it reached the backend.
    pub last_outcome: Option<CallOutcome>,
    /// When the most recent call started.
    pub last_call_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            cached: 80,
            computed: 20,
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);
        assert_eq!(stats.total(), 100);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_counters_record_one_per_outcome() {
        let counters = StatsCounters::default();
        counters.record(CallOutcome::Miss);
        counters.record(CallOutcome::Hit);
        counters.record(CallOutcome::Hit);

        assert_eq!(
            counters.snapshot(),
            CacheStats {
                cached: 2,
                computed: 1
            }
        );
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(CallOutcome::Hit.to_string(), "hit");
        assert_eq!(CallOutcome::Miss.to_string(), "miss");
    }
}
