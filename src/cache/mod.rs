// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Two-tier content cache: bounded memory tier over a durable disk tier.
//!
//! Writes land in the memory tier synchronously and are persisted in the
//! background; reads check memory first and promote disk hits back into
//! memory. Storage failures never surface to callers: the worst case is a
//! cache miss, never a lost write while the memory tier is warm.

pub mod disk;
pub mod entry;
pub mod memory;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

use crate::config::SatchelConfig;
use disk::{DiskError, DiskTier};
use entry::{now_ms, CacheEntry, StoreOptions};
use memory::MemoryTier;

/// A scheduled persistent-tier mutation. Jobs are drained by a single
/// writer task in submission order, so a store followed by a remove of the
/// same key always lands on disk in that order.
enum DiskJob {
    Write { key: String, entry: CacheEntry },
    Delete { key: String },
    Wipe,
}

/// Tracks scheduled background disk writes so shutdown/tests can await them.
struct WriteTracker {
    active: AtomicUsize,
    idle: Notify,
}

impl WriteTracker {
    fn new() -> Self {
        Self {
            active: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    fn begin(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    fn end(&self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Two-tier content cache keyed by string, holding opaque byte payloads.
///
/// Construct one instance at startup and hand it out by reference; the
/// persistent directory is exclusive to that instance.
///
/// # Example
///
/// ```rust,no_run
/// # use satchel_sync::{SatchelConfig, TieredCache, StoreOptions};
/// # use std::time::Duration;
/// # async fn example() {
/// let config = SatchelConfig::default();
/// let cache = TieredCache::open(&config).await.expect("cache dir");
///
/// cache.store_with(
///     "doc-1",
///     b"contents".to_vec(),
///     StoreOptions::new().ttl(Duration::from_secs(3600)),
/// );
/// assert!(cache.retrieve("doc-1").await.is_some());
/// # }
/// ```
pub struct TieredCache {
    memory: MemoryTier,
    disk: Arc<DiskTier>,
    default_ttl: Option<std::time::Duration>,
    writes: Arc<WriteTracker>,
    jobs: mpsc::UnboundedSender<DiskJob>,
}

impl TieredCache {
    /// Open the cache, creating the persistent directory if needed.
    ///
    /// Spawns the writer task that applies persistent-tier mutations, so
    /// this must run inside a Tokio runtime. The synchronous mutators
    /// ([`store`](Self::store), [`remove`](Self::remove),
    /// [`remove_all`](Self::remove_all)) only enqueue work and are then
    /// safe to call from any thread.
    pub async fn open(config: &SatchelConfig) -> Result<Self, DiskError> {
        let disk = DiskTier::open(config.cache_dir.clone(), config.disk_max_bytes).await?;
        let disk = Arc::new(disk);
        let writes = Arc::new(WriteTracker::new());
        let (jobs, rx) = mpsc::unbounded_channel();
        tokio::spawn(drain_disk_jobs(rx, disk.clone(), writes.clone()));
        Ok(Self {
            memory: MemoryTier::new(config.memory_max_bytes),
            disk,
            default_ttl: config.default_ttl(),
            writes,
            jobs,
        })
    }

    fn enqueue(&self, job: DiskJob) {
        self.writes.begin();
        if self.jobs.send(job).is_err() {
            // Writer task gone; nothing will run this job
            warn!("persistent cache writer is not running, mutation dropped");
            self.writes.end();
        }
    }

    /// Store a payload under `key` with the configured default TTL.
    ///
    /// The memory tier is updated before this returns; the durable write is
    /// scheduled and its failure is logged, never propagated.
    pub fn store(&self, key: &str, payload: Vec<u8>) {
        self.store_with(key, payload, StoreOptions::new());
    }

    /// Store with an explicit TTL and/or metadata.
    pub fn store_with(&self, key: &str, payload: Vec<u8>, opts: StoreOptions) {
        crate::metrics::record_payload_bytes("store", payload.len());
        let ttl = opts.ttl.or(self.default_ttl);
        let entry = CacheEntry::new(payload, ttl).with_metadata(opts.metadata);

        self.memory.insert(key, entry.clone());
        self.enqueue(DiskJob::Write {
            key: key.to_string(),
            entry,
        });
        crate::metrics::record_cache_operation("memory", "store", "success");
    }

    /// Retrieve the payload for `key`, or `None` if absent or expired.
    ///
    /// Expired entries are evicted from both tiers on discovery; disk hits
    /// are promoted into the memory tier.
    pub async fn retrieve(&self, key: &str) -> Option<Vec<u8>> {
        self.retrieve_entry(key).await.map(|e| e.payload)
    }

    /// Like [`retrieve`](Self::retrieve) but returns the full entry
    /// (payload plus metadata and expiry).
    pub async fn retrieve_entry(&self, key: &str) -> Option<CacheEntry> {
        let now = now_ms();

        if let Some(entry) = self.memory.get(key) {
            if entry.is_expired(now) {
                debug!(key, "expired entry discovered in memory tier");
                crate::metrics::record_eviction("memory", "expired");
                self.memory.remove(key);
                self.schedule_disk_delete(key);
                crate::metrics::record_cache_operation("memory", "retrieve", "miss");
                return None;
            }
            crate::metrics::record_cache_operation("memory", "retrieve", "hit");
            return Some(entry);
        }

        // Read through to the persistent tier; I/O errors degrade to a miss.
        let entry = match self.disk.read(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                crate::metrics::record_cache_operation("disk", "retrieve", "miss");
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "persistent cache read failed");
                crate::metrics::record_cache_operation("disk", "retrieve", "error");
                return None;
            }
        };

        if entry.is_expired(now) {
            debug!(key, "expired entry discovered in disk tier");
            crate::metrics::record_eviction("disk", "expired");
            if let Err(e) = self.disk.delete(key).await {
                warn!(key, error = %e, "failed to delete expired record");
            }
            crate::metrics::record_cache_operation("disk", "retrieve", "miss");
            return None;
        }

        // Promote, subject to the memory tier's budget
        self.memory.insert(key, entry.clone());
        crate::metrics::record_cache_operation("disk", "retrieve", "hit");
        Some(entry)
    }

    /// Remove `key` from both tiers; idempotent.
    pub fn remove(&self, key: &str) {
        self.memory.remove(key);
        self.schedule_disk_delete(key);
        crate::metrics::record_cache_operation("memory", "remove", "success");
    }

    /// Clear the memory tier synchronously and schedule a wipe of the
    /// persistent storage area.
    pub fn remove_all(&self) {
        self.memory.clear();
        self.enqueue(DiskJob::Wipe);
    }

    /// Scan the persistent tier, deleting expired and corrupt records.
    pub async fn cleanup_expired(&self) {
        match self.disk.cleanup_expired().await {
            Ok(removed) => {
                crate::metrics::record_cache_operation("disk", "cleanup", "success");
                if removed > 0 {
                    debug!(removed, "cleanup removed dead records");
                }
            }
            Err(e) => {
                warn!(error = %e, "cleanup pass failed");
                crate::metrics::record_cache_operation("disk", "cleanup", "error");
            }
        }
    }

    /// Trim the persistent tier back under its byte budget,
    /// oldest-stored-first. No-op when already under budget.
    pub async fn trim_to_capacity(&self) {
        match self.disk.trim_to_capacity().await {
            Ok(_) => crate::metrics::record_cache_operation("disk", "trim", "success"),
            Err(e) => {
                warn!(error = %e, "trim pass failed");
                crate::metrics::record_cache_operation("disk", "trim", "error");
            }
        }
    }

    /// Await completion of all scheduled persistent writes (shutdown/tests).
    pub async fn flush(&self) {
        self.writes.wait_idle().await;
    }

    /// Entry count in the memory tier.
    #[must_use]
    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    /// Payload bytes held in the memory tier.
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        self.memory.bytes()
    }

    /// Total bytes held by the persistent tier, or `None` on I/O failure.
    pub async fn disk_bytes(&self) -> Option<u64> {
        match self.disk.total_bytes().await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(error = %e, "failed to size persistent tier");
                None
            }
        }
    }

    fn schedule_disk_delete(&self, key: &str) {
        self.enqueue(DiskJob::Delete {
            key: key.to_string(),
        });
    }
}

/// Applies queued persistent-tier mutations one at a time, in the order
/// callers submitted them. Exits when the cache is dropped.
async fn drain_disk_jobs(
    mut rx: mpsc::UnboundedReceiver<DiskJob>,
    disk: Arc<DiskTier>,
    writes: Arc<WriteTracker>,
) {
    while let Some(job) = rx.recv().await {
        match job {
            DiskJob::Write { key, entry } => {
                if let Err(e) = disk.write(&key, &entry).await {
                    warn!(key = %key, error = %e, "persistent cache write failed");
                    crate::metrics::record_cache_operation("disk", "store", "error");
                } else {
                    crate::metrics::record_cache_operation("disk", "store", "success");
                }
            }
            DiskJob::Delete { key } => {
                if let Err(e) = disk.delete(&key).await {
                    warn!(key = %key, error = %e, "persistent cache delete failed");
                }
            }
            DiskJob::Wipe => {
                if let Err(e) = disk.wipe().await {
                    warn!(error = %e, "persistent cache wipe failed");
                }
            }
        }
        writes.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn cache_in(dir: &std::path::Path) -> TieredCache {
        let config = SatchelConfig {
            cache_dir: dir.to_path_buf(),
            memory_max_bytes: 1024,
            disk_max_bytes: u64::MAX,
            default_ttl_secs: None,
            ..Default::default()
        };
        TieredCache::open(&config).await.unwrap()
    }

    #[tokio::test]
    async fn test_store_then_retrieve_same_caller() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path()).await;

        cache.store("k", b"value".to_vec());
        // Immediately visible regardless of the persistent write
        assert_eq!(cache.retrieve("k").await, Some(b"value".to_vec()));
    }

    #[tokio::test]
    async fn test_promotion_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = cache_in(dir.path()).await;
            cache.store("k", b"durable".to_vec());
            cache.flush().await;
        }

        // Fresh instance: memory tier empty, disk warm
        let cache = cache_in(dir.path()).await;
        assert_eq!(cache.memory_len(), 0);
        assert_eq!(cache.retrieve("k").await, Some(b"durable".to_vec()));
        // Promoted back into memory
        assert_eq!(cache.memory_len(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_evicted_on_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path()).await;

        cache.store_with(
            "doc-1",
            vec![0u8; 10],
            StoreOptions::new().ttl(Duration::from_millis(40)),
        );
        cache.flush().await;
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(cache.retrieve("doc-1").await.is_none());
        // No ghost on the second call either
        assert!(cache.retrieve("doc-1").await.is_none());
        cache.flush().await;
        assert_eq!(cache.disk_bytes().await, Some(0));
    }

    #[tokio::test]
    async fn test_remove_and_remove_all() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path()).await;

        cache.store("a", vec![1]);
        cache.store("b", vec![2]);
        cache.flush().await;

        cache.remove("a");
        cache.remove("a"); // idempotent
        cache.flush().await;
        assert!(cache.retrieve("a").await.is_none());
        assert!(cache.retrieve("b").await.is_some());

        cache.remove_all();
        cache.flush().await;
        assert_eq!(cache.memory_len(), 0);
        assert!(cache.retrieve("b").await.is_none());
    }

    #[tokio::test]
    async fn test_oversized_payload_still_served_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path()).await; // 1 KiB memory budget

        cache.store("big", vec![7u8; 4096]);
        cache.flush().await;
        assert_eq!(cache.memory_len(), 0);
        assert_eq!(cache.retrieve("big").await.map(|p| p.len()), Some(4096));
    }

    #[tokio::test]
    async fn test_store_from_plain_thread() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(cache_in(dir.path()).await);

        // Mutators must work from threads that carry no runtime context
        let worker = {
            let cache = cache.clone();
            std::thread::spawn(move || {
                cache.store("bg", b"from a plain thread".to_vec());
                cache.remove("bg");
                cache.store("bg", b"second write".to_vec());
            })
        };
        worker.join().unwrap();

        cache.flush().await;
        assert_eq!(cache.retrieve("bg").await, Some(b"second write".to_vec()));
    }

    #[tokio::test]
    async fn test_store_then_remove_leaves_no_disk_record() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = cache_in(dir.path()).await;
            cache.store("gone", vec![9u8; 64]);
            cache.remove("gone");
            cache.flush().await;
        }

        // The remove must land after the write it followed
        let cache = cache_in(dir.path()).await;
        assert!(cache.retrieve("gone").await.is_none());
        assert_eq!(cache.disk_bytes().await, Some(0));
    }

    #[tokio::test]
    async fn test_rapid_restore_persists_newest_payload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = cache_in(dir.path()).await;
            cache.store("doc", b"v1".to_vec());
            cache.store("doc", b"v2".to_vec());
            cache.store("doc", b"v3".to_vec());
            cache.flush().await;
        }

        let cache = cache_in(dir.path()).await;
        assert_eq!(cache.retrieve("doc").await, Some(b"v3".to_vec()));
    }

    #[tokio::test]
    async fn test_metadata_survives_persistence() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = cache_in(dir.path()).await;
            cache.store_with(
                "tagged",
                vec![1],
                StoreOptions::new().metadata("content-type", "image/png"),
            );
            cache.flush().await;
        }

        let cache = cache_in(dir.path()).await;
        let entry = cache.retrieve_entry("tagged").await.unwrap();
        assert_eq!(
            entry.metadata.unwrap().get("content-type").unwrap(),
            "image/png"
        );
    }
}
