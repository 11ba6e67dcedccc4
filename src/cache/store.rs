//! Cache Store Module
//!
//! The retrieval/invalidation engine combining the memory table and the
//! disk store behind a single process-wide lock.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cache::{DiskStore, MemoryEntry, MemoryTable, CacheStats, FILENAME_DELIMITER};
use crate::config::Config;
use crate::error::{CacheError, Result};

// == Shared State ==
/// Everything guarded by the cache lock.
#[derive(Debug, Default)]
struct State {
    /// Fast-path tier, lost on restart
    table: MemoryTable,
    /// Performance counters
    stats: CacheStats,
}

// == Disk-Mem Cache ==
/// A two-tier memoizing cache.
///
/// Results of expensive operations are keyed on an opaque string, held in an
/// in-memory table for the lifetime of this instance, and persisted as JSON
/// files that survive restarts. Staleness is only acted on when a retrieval
/// supplies an invalidation predicate or a purge is invoked explicitly.
///
/// One `tokio::sync::Mutex` guards the whole of every operation, across all
/// keys: correctness over throughput. At most one compute function runs at a
/// time process-wide, and a slow one blocks every other cache call until it
/// resolves. Dropping a call's future mid-compute releases the lock without
/// having written an entry.
///
/// Each instance owns its own table, stats and lock; independent instances
/// over different directories do not interfere.
#[derive(Debug)]
pub struct DiskMemCache {
    /// Durable tier
    disk: DiskStore,
    /// Memory tier and counters, behind the single cache-wide lock
    state: Mutex<State>,
}

impl DiskMemCache {
    // == Constructors ==
    /// Creates a cache using configuration from the environment
    /// (see [`Config::from_env`]), creating the directory if needed.
    pub fn new() -> Result<Self> {
        Self::with_config(Config::from_env())
    }

    /// Creates a cache from an explicit configuration, creating the
    /// directory if needed.
    pub fn with_config(config: Config) -> Result<Self> {
        let disk = DiskStore::new(config.cache_dir);
        disk.ensure_dir()?;

        Ok(Self {
            disk,
            state: Mutex::new(State::default()),
        })
    }

    /// Creates a cache over an explicit directory. Convenient for tests,
    /// where each cache gets its own scratch directory.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(Config::with_dir(dir.into()))
    }

    /// Returns the cache directory.
    pub fn dir(&self) -> &Path {
        self.disk.dir()
    }

    // == Get Or Compute ==
    /// Returns the cached value for `key`, computing and caching it on a miss.
    ///
    /// The cache is always trusted (no invalidation) and the result is always
    /// persisted. The compute function is invoked at most once per call, and
    /// only when both tiers miss.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.get_or_compute_inner(key, compute, None, None).await
    }

    /// Like [`DiskMemCache::get_or_compute`], with age-based invalidation.
    ///
    /// `invalidate_if` receives the elapsed age of a cached entry; returning
    /// true treats the entry as stale, purges it from both tiers, and falls
    /// through to a fresh computation.
    pub async fn get_or_compute_with<T, F, Fut, I>(
        &self,
        key: &str,
        compute: F,
        invalidate_if: I,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
        I: Fn(Duration) -> bool + Sync,
    {
        self.get_or_compute_inner(key, compute, Some(&invalidate_if), None)
            .await
    }

    /// Full form: age-based invalidation plus a cache-worthiness filter.
    ///
    /// `cache_if` receives the freshly computed value; returning false means
    /// the value is returned to the caller but persisted in neither tier.
    pub async fn get_or_compute_full<T, F, Fut, I, C>(
        &self,
        key: &str,
        compute: F,
        invalidate_if: I,
        cache_if: C,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
        I: Fn(Duration) -> bool + Sync,
        C: Fn(&T) -> bool + Sync,
    {
        self.get_or_compute_inner(key, compute, Some(&invalidate_if), Some(&cache_if))
            .await
    }

    /// The retrieval algorithm. Every step runs under the cache-wide lock;
    /// each tier short-circuits the rest on a non-stale hit.
    async fn get_or_compute_inner<T, F, Fut>(
        &self,
        key: &str,
        compute: F,
        invalidate_if: Option<&(dyn Fn(Duration) -> bool + Sync)>,
        cache_if: Option<&(dyn Fn(&T) -> bool + Sync)>,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        validate_key(key)?;

        // One clock reading per call: ages and the new file name all derive
        // from this instant.
        let now = Utc::now();

        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        // Step 1: memory tier
        let mut stale_in_memory = false;
        if let Some(entry) = state.table.get(key) {
            if invalidated(invalidate_if, entry.age(now)) {
                stale_in_memory = true;
            } else {
                let value = entry.downcast::<T>().ok_or_else(|| CacheError::TypeMismatch {
                    key: key.to_string(),
                })?;
                state.stats.record_memory_hit();
                debug!(key, tier = "memory", "cache hit");
                return Ok(value);
            }
        }
        if stale_in_memory {
            debug!(key, "memory entry stale, purging key");
            state.stats.record_invalidation();
            self.purge_entries_locked(&mut state.table, now, &|k, _| k == key)
                .await?;
        }

        // Step 2: disk tier
        if let Some(found) = self.disk.find(key).await? {
            if invalidated(invalidate_if, found.age(now)) {
                debug!(key, "disk entry stale, purging key");
                state.stats.record_invalidation();
                self.purge_entries_locked(&mut state.table, now, &|k, _| k == key)
                    .await?;
            } else {
                let value: T = self.disk.read(&found.path).await?;
                // Rehydration restarts the memory age at the call time; the
                // disk age keeps counting from the original write.
                state
                    .table
                    .insert_if_absent(key, MemoryEntry::new(now, value.clone()));
                state.stats.set_total_entries(state.table.len());
                state.stats.record_disk_hit();
                debug!(key, tier = "disk", "cache hit");
                return Ok(value);
            }
        }

        // Step 3: both tiers missed or were invalidated
        state.stats.record_miss();
        let value = compute().await.map_err(|source| CacheError::Compute {
            key: key.to_string(),
            source,
        })?;

        // Step 4: cache-worthiness filter
        if cache_if.is_some_and(|worth_caching| !worth_caching(&value)) {
            debug!(key, "fresh value filtered out, returning uncached");
            return Ok(value);
        }

        // Step 5: write back into both tiers
        state
            .table
            .insert_if_absent(key, MemoryEntry::new(now, value.clone()));
        state.stats.set_total_entries(state.table.len());
        self.disk.write(key, now, &value).await?;
        debug!(key, "computed and cached");

        Ok(value)
    }

    // == Purge ==
    /// Removes every entry whose `(key, age)` satisfies the predicate, from
    /// both tiers.
    ///
    /// The age is computed independently per tier (memory insertion time vs.
    /// the timestamp decoded from the file name), so the two sweeps may
    /// legitimately disagree when the tiers are out of sync.
    pub async fn purge<P>(&self, predicate: P) -> Result<()>
    where
        P: Fn(&str, Duration) -> bool + Sync,
    {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let now = Utc::now();

        let removed = self
            .purge_entries_locked(&mut state.table, now, &predicate)
            .await?;
        state.stats.set_total_entries(state.table.len());

        info!(removed, "purged entries matching predicate");
        Ok(())
    }

    /// Removes every entry for a key satisfying the predicate, regardless of
    /// age. The common "purge everything for this key" form.
    pub async fn purge_keys<P>(&self, predicate: P) -> Result<()>
    where
        P: Fn(&str) -> bool + Sync,
    {
        self.purge(move |key, _| predicate(key)).await
    }

    /// Clears the memory table and deletes every file in the cache
    /// directory. Unconditional, non-selective.
    pub async fn purge_all(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        state.table.clear();
        self.disk.clear().await?;
        state.stats.set_total_entries(0);

        info!("purged all cache entries");
        Ok(())
    }

    /// The shared purge sweep, run while already holding the lock: retain
    /// non-matching memory entries, then delete matching disk files. The two
    /// passes are independent best-effort; no attempt is made to keep the
    /// tiers synchronized beyond running both.
    async fn purge_entries_locked(
        &self,
        table: &mut MemoryTable,
        now: DateTime<Utc>,
        predicate: &(dyn Fn(&str, Duration) -> bool + Sync),
    ) -> Result<usize> {
        let mut removed = table.purge(now, |key, age| predicate(key, age));

        for entry in self.disk.scan().await? {
            if predicate(&entry.key, entry.age(now)) {
                self.disk.delete(&entry.path).await?;
                removed += 1;
            }
        }

        Ok(removed)
    }

    // == Stats ==
    /// Returns a snapshot of the current cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        let mut stats = state.stats.clone();
        stats.set_total_entries(state.table.len());
        stats
    }
}

// == Helpers ==
/// Applies the optional invalidation predicate to an entry's age.
fn invalidated(invalidate_if: Option<&(dyn Fn(Duration) -> bool + Sync)>, age: Duration) -> bool {
    invalidate_if.is_some_and(|stale| stale(age))
}

/// Rejects keys that would corrupt the filename encoding.
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains(FILENAME_DELIMITER) {
        return Err(CacheError::InvalidKey(key.to_string()));
    }
    Ok(())
}
