//! Adaptive decompression cache
//!
//! Memoizes decompressed asset bytes in front of an [`ArchiveSet`], bounded
//! by a memory budget. Hits return shared read-only buffers without any
//! decompression work; misses load through the set with a single-flight
//! guarantee per path, so concurrent requests for the same absent asset
//! collapse into one decompression.
//!
//! Bookkeeping (recency list, size accounting, budget) lives behind one
//! narrow mutex; decompression always runs outside it.

use crate::budget::{self, BudgetConfig};
use crate::error::Result;
use crate::set::ArchiveSet;
use lru::LruCache;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared, immutable decompressed asset bytes.
pub type AssetBytes = Arc<[u8]>;

/// Cache instrumentation counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Requests served from the cache, including joined in-flight loads
    /// that produced bytes. Absent paths never count.
    pub hits: u64,
    /// Requests that had to load through the archive set.
    pub misses: u64,
    /// Decompression operations actually performed.
    pub decompressions: u64,
    /// Entries evicted to stay within budget.
    pub evictions: u64,
    /// Oversized entries served without being cached.
    pub pass_throughs: u64,
}

impl CacheStats {
    /// Hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

enum Flight {
    /// Load finished; `None` means the path exists in no archive.
    Ready(Option<AssetBytes>),
    /// Load failed; waiters retry and surface their own error.
    Failed,
}

struct InflightLoad {
    done: Mutex<Option<Flight>>,
    cond: Condvar,
}

impl InflightLoad {
    fn new() -> Self {
        InflightLoad {
            done: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    fn finish(&self, flight: Flight) {
        *self.done.lock() = Some(flight);
        self.cond.notify_all();
    }
}

/// Resident entries plus size accounting, guarded by one mutex.
struct CacheState {
    entries: LruCache<String, AssetBytes>,
    usage: u64,
    budget: u64,
}

impl CacheState {
    /// Insert then evict down to budget. The incoming entry is the most
    /// recent, so eviction drains from the cold end first.
    fn insert(&mut self, path: &str, bytes: AssetBytes) -> u64 {
        let size = bytes.len() as u64;
        if let Some(replaced) = self.entries.push(path.to_string(), bytes) {
            self.usage -= replaced.1.len() as u64;
        }
        self.usage += size;

        let mut evicted = 0;
        while self.usage > self.budget {
            match self.entries.pop_lru() {
                Some((_, old)) => {
                    self.usage -= old.len() as u64;
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }

    fn evict_to_budget(&mut self) -> u64 {
        let mut evicted = 0;
        while self.usage > self.budget {
            match self.entries.pop_lru() {
                Some((_, old)) => {
                    self.usage -= old.len() as u64;
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }
}

/// Memory-budgeted cache of decompressed assets.
///
/// One instance per process is the expected usage, owned by the engine's
/// composition root and handed to subsystems that need asset access.
pub struct AssetCache {
    archives: Arc<ArchiveSet>,
    state: Mutex<CacheState>,
    inflight: Mutex<HashMap<String, Arc<InflightLoad>>>,
    budget_config: BudgetConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    decompressions: AtomicU64,
    evictions: AtomicU64,
    pass_throughs: AtomicU64,
}

impl AssetCache {
    /// Create a cache with a fixed byte budget.
    pub fn new(archives: Arc<ArchiveSet>, budget_bytes: u64) -> Self {
        AssetCache {
            archives,
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                usage: 0,
                budget: budget_bytes,
            }),
            inflight: Mutex::new(HashMap::new()),
            budget_config: BudgetConfig::default(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            decompressions: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            pass_throughs: AtomicU64::new(0),
        }
    }

    /// Create a cache whose budget is derived from system memory queries.
    pub fn with_adaptive_budget(archives: Arc<ArchiveSet>, config: BudgetConfig) -> Self {
        let budget_bytes = budget::compute(&config);
        let mut cache = Self::new(archives, budget_bytes);
        cache.budget_config = config;
        cache
    }

    /// Fetch an asset by logical path.
    ///
    /// `Ok(None)` means no archive in the set contains the path. Errors are
    /// corruption or missing-dictionary failures and are never retried
    /// internally; stale or partial bytes are never served.
    pub fn get(&self, path: &str) -> Result<Option<AssetBytes>> {
        loop {
            // Fast path: resident entry.
            {
                let mut state = self.state.lock();
                if let Some(bytes) = state.entries.get(path) {
                    let bytes = bytes.clone();
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(bytes));
                }
            }

            // Join an in-flight load for this path, or become its leader.
            let (load, leader) = {
                let mut inflight = self.inflight.lock();
                match inflight.get(path) {
                    Some(load) => (load.clone(), false),
                    None => {
                        let load = Arc::new(InflightLoad::new());
                        inflight.insert(path.to_string(), load.clone());
                        (load, true)
                    }
                }
            };

            if !leader {
                let mut done = load.done.lock();
                while done.is_none() {
                    load.cond.wait(&mut done);
                }
                match done.as_ref().unwrap() {
                    Flight::Ready(bytes) => {
                        // A joined load for an absent path is not a hit; only
                        // shared bytes count toward the hit rate.
                        if bytes.is_some() {
                            self.hits.fetch_add(1, Ordering::Relaxed);
                        }
                        return Ok(bytes.clone());
                    }
                    // The leader failed; loop around and try ourselves.
                    Flight::Failed => continue,
                }
            }

            return self.load(path, &load);
        }
    }

    /// Leader path: load through the archive set, publish the outcome.
    fn load(&self, path: &str, flight: &InflightLoad) -> Result<Option<AssetBytes>> {
        // A previous leader may have populated the cache between our first
        // check and taking leadership; the store happens before its flight
        // is retired, so this re-check closes the window.
        {
            let mut state = self.state.lock();
            if let Some(bytes) = state.entries.get(path) {
                let bytes = bytes.clone();
                drop(state);
                self.hits.fetch_add(1, Ordering::Relaxed);
                flight.finish(Flight::Ready(Some(bytes.clone())));
                self.inflight.lock().remove(path);
                return Ok(Some(bytes));
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);

        // Decompression runs outside every cache lock.
        let result = self.archives.read(path);

        let outcome = match result {
            Ok(Some(raw)) => {
                self.decompressions.fetch_add(1, Ordering::Relaxed);
                let bytes: AssetBytes = raw.into();
                self.store(path, bytes.clone());
                Ok(Some(bytes))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(bytes) => flight.finish(Flight::Ready(bytes.clone())),
            Err(_) => flight.finish(Flight::Failed),
        }
        self.inflight.lock().remove(path);

        outcome
    }

    /// Insert under budget; oversized entries are served but not cached.
    fn store(&self, path: &str, bytes: AssetBytes) {
        let size = bytes.len() as u64;
        let mut state = self.state.lock();
        if size > state.budget {
            self.pass_throughs.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let evicted = state.insert(path, bytes);
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
    }

    /// Drop a single entry, e.g. after swapping patch archives.
    pub fn invalidate(&self, path: &str) {
        let mut state = self.state.lock();
        if let Some(bytes) = state.entries.pop(path) {
            state.usage -= bytes.len() as u64;
        }
    }

    /// Drop every resident entry.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.usage = 0;
    }

    /// Replace the budget and evict down to it.
    pub fn set_budget(&self, budget_bytes: u64) {
        let mut state = self.state.lock();
        state.budget = budget_bytes;
        let evicted = state.evict_to_budget();
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
    }

    /// Re-query system memory and adopt the new budget.
    ///
    /// Intended for explicit lifecycle points such as level transitions;
    /// takes the same critical section as eviction bookkeeping.
    pub fn recompute_budget(&self) -> u64 {
        let budget_bytes = budget::compute(&self.budget_config);
        tracing::info!(budget = budget_bytes, "recomputed cache budget");
        self.set_budget(budget_bytes);
        budget_bytes
    }

    /// Current byte budget.
    pub fn budget(&self) -> u64 {
        self.state.lock().budget
    }

    /// Bytes currently resident.
    pub fn current_usage(&self) -> u64 {
        self.state.lock().usage
    }

    /// Number of resident entries.
    pub fn resident_entries(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// The archive set this cache loads from.
    pub fn archives(&self) -> &ArchiveSet {
        &self.archives
    }

    /// Snapshot of the instrumentation counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            decompressions: self.decompressions.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            pass_throughs: self.pass_throughs.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;
    use crate::writer::ArchiveWriter;
    use tempfile::TempDir;

    fn sample_set(dir: &TempDir, assets: &[(&str, Vec<u8>)]) -> Arc<ArchiveSet> {
        let mut writer = ArchiveWriter::new(64).unwrap();
        for (path, data) in assets {
            writer
                .add_asset(path, data.clone(), Codec::Lz4, None)
                .unwrap();
        }
        let path = dir.path().join("cache_test.arcv");
        writer.write_to(&path).unwrap();
        Arc::new(ArchiveSet::open(&[path]).unwrap())
    }

    #[test]
    fn test_hit_skips_decompression() {
        let dir = TempDir::new().unwrap();
        let set = sample_set(&dir, &[("a.bin", vec![1u8; 1000])]);
        let cache = AssetCache::new(set, 1 << 20);

        let first = cache.get("a.bin").unwrap().unwrap();
        let second = cache.get("a.bin").unwrap().unwrap();
        assert_eq!(first, second);

        let stats = cache.stats();
        assert_eq!(stats.decompressions, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_not_found_is_none() {
        let dir = TempDir::new().unwrap();
        let set = sample_set(&dir, &[("a.bin", vec![1u8; 10])]);
        let cache = AssetCache::new(set, 1 << 20);

        assert!(cache.get("missing.bin").unwrap().is_none());
    }

    #[test]
    fn test_budget_respected_after_each_get() {
        let dir = TempDir::new().unwrap();
        let assets: Vec<(String, Vec<u8>)> = (0..8)
            .map(|i| (format!("f{}.bin", i), vec![i as u8; 1000]))
            .collect();
        let refs: Vec<(&str, Vec<u8>)> =
            assets.iter().map(|(p, d)| (p.as_str(), d.clone())).collect();
        let set = sample_set(&dir, &refs);

        // Room for three 1000-byte entries.
        let cache = AssetCache::new(set, 3500);
        for (path, _) in &refs {
            cache.get(path).unwrap().unwrap();
            assert!(cache.current_usage() <= cache.budget());
        }
        assert!(cache.stats().evictions > 0);
    }

    #[test]
    fn test_oversized_entry_passes_through() {
        let dir = TempDir::new().unwrap();
        let set = sample_set(&dir, &[("big.bin", vec![9u8; 10_000])]);
        let cache = AssetCache::new(set, 100);

        let bytes = cache.get("big.bin").unwrap().unwrap();
        assert_eq!(bytes.len(), 10_000);
        assert_eq!(cache.current_usage(), 0);
        assert_eq!(cache.stats().pass_throughs, 1);

        // Still served on subsequent calls, each a fresh load.
        assert_eq!(cache.get("big.bin").unwrap().unwrap().len(), 10_000);
        assert_eq!(cache.stats().decompressions, 2);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let dir = TempDir::new().unwrap();
        let set = sample_set(&dir, &[("a.bin", vec![1u8; 500]), ("b.bin", vec![2u8; 500])]);
        let cache = AssetCache::new(set, 1 << 20);

        cache.get("a.bin").unwrap();
        cache.get("b.bin").unwrap();
        assert_eq!(cache.current_usage(), 1000);

        cache.invalidate("a.bin");
        assert_eq!(cache.current_usage(), 500);
        assert_eq!(cache.resident_entries(), 1);

        cache.clear();
        assert_eq!(cache.current_usage(), 0);
        assert_eq!(cache.resident_entries(), 0);
    }

    #[test]
    fn test_shrinking_budget_evicts() {
        let dir = TempDir::new().unwrap();
        let set = sample_set(&dir, &[("a.bin", vec![1u8; 600]), ("b.bin", vec![2u8; 600])]);
        let cache = AssetCache::new(set, 1 << 20);

        cache.get("a.bin").unwrap();
        cache.get("b.bin").unwrap();
        assert_eq!(cache.current_usage(), 1200);

        // Least recently used ("a.bin") goes first.
        cache.set_budget(700);
        assert_eq!(cache.current_usage(), 600);
        assert_eq!(cache.budget(), 700);

        cache.get("b.bin").unwrap();
        assert_eq!(cache.stats().decompressions, 2, "b.bin stayed resident");
    }

    #[test]
    fn test_lru_eviction_order() {
        let dir = TempDir::new().unwrap();
        let set = sample_set(
            &dir,
            &[
                ("a.bin", vec![1u8; 400]),
                ("b.bin", vec![2u8; 400]),
                ("c.bin", vec![3u8; 400]),
            ],
        );
        let cache = AssetCache::new(set, 900);

        cache.get("a.bin").unwrap();
        cache.get("b.bin").unwrap();
        // Touch "a.bin" so "b.bin" is the cold one.
        cache.get("a.bin").unwrap();

        cache.get("c.bin").unwrap();

        // "a.bin" should still be resident: fetching it again is a hit.
        let before = cache.stats().decompressions;
        cache.get("a.bin").unwrap();
        assert_eq!(cache.stats().decompressions, before);

        // "b.bin" was evicted: fetching it decompresses again.
        cache.get("b.bin").unwrap();
        assert_eq!(cache.stats().decompressions, before + 1);
    }
}
