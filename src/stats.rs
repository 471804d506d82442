//! Cache Hit/Miss Statistics
//!
//! Handlers report one hit or one miss per retrieval exchange, tagged with
//! the (cluster, address) identity of the backend that answered. The sink
//! is process-wide and shared across all handlers, so implementations must
//! be thread-safe.
//!
//! Two implementations ship with the crate: [`CacheStats`] keeps in-process
//! counters with a snapshot accessor, and [`NoopStats`] discards everything
//! for callers that wire their own metrics pipeline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Receives one call per retrieval exchange, after the first response line
/// is classified.
pub trait StatsSink: Send + Sync {
    /// A retrieval returned at least one `VALUE` header.
    fn hit(&self, cluster: &str, addr: &str);

    /// A retrieval returned only `END`.
    fn miss(&self, cluster: &str, addr: &str);
}

/// Hit/miss counters for one (cluster, address) pair.
#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// In-process statistics keyed by (cluster, address).
///
/// The map is locked only to look up or insert a counter pair; the counts
/// themselves are atomics, so steady-state updates contend only on the
/// lock briefly.
#[derive(Debug, Default)]
pub struct CacheStats {
    counters: Mutex<HashMap<(String, String), Arc<Counters>>>,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, cluster: &str, addr: &str) -> Arc<Counters> {
        let mut map = self.counters.lock().unwrap();
        map.entry((cluster.to_string(), addr.to_string()))
            .or_default()
            .clone()
    }

    /// Returns (hits, misses) for one backend, or `None` if it has never
    /// reported.
    pub fn snapshot(&self, cluster: &str, addr: &str) -> Option<(u64, u64)> {
        let map = self.counters.lock().unwrap();
        map.get(&(cluster.to_string(), addr.to_string())).map(|c| {
            (
                c.hits.load(Ordering::Relaxed),
                c.misses.load(Ordering::Relaxed),
            )
        })
    }
}

impl StatsSink for CacheStats {
    fn hit(&self, cluster: &str, addr: &str) {
        self.entry(cluster, addr).hits.fetch_add(1, Ordering::Relaxed);
    }

    fn miss(&self, cluster: &str, addr: &str) {
        self.entry(cluster, addr)
            .misses
            .fetch_add(1, Ordering::Relaxed);
    }
}

/// A sink that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStats;

impl StatsSink for NoopStats {
    fn hit(&self, _cluster: &str, _addr: &str) {}

    fn miss(&self, _cluster: &str, _addr: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_accumulate_per_backend() {
        let stats = CacheStats::new();
        stats.hit("c1", "a1");
        stats.hit("c1", "a1");
        stats.miss("c1", "a1");
        stats.miss("c1", "a2");

        assert_eq!(stats.snapshot("c1", "a1"), Some((2, 1)));
        assert_eq!(stats.snapshot("c1", "a2"), Some((0, 1)));
        assert_eq!(stats.snapshot("c2", "a1"), None);
    }

    #[test]
    fn test_noop_sink() {
        let stats = NoopStats;
        stats.hit("c", "a");
        stats.miss("c", "a");
    }
}
