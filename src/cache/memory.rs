// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Memory tier: a byte-budgeted, least-recently-used cache.
//!
//! Insertion cost is the payload byte length. On overflow the tier evicts
//! the least-recently-accessed entries until it is back under budget.
//! A payload larger than the whole budget is refused (the disk tier still
//! holds it).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use tracing::debug;

use super::entry::CacheEntry;

struct MemorySlot {
    entry: CacheEntry,
    last_access: Instant,
}

/// Fast bounded in-memory tier.
pub struct MemoryTier {
    slots: DashMap<String, MemorySlot>,
    size_bytes: AtomicUsize,
    max_bytes: usize,
}

impl MemoryTier {
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self {
            slots: DashMap::new(),
            size_bytes: AtomicUsize::new(0),
            max_bytes,
        }
    }

    /// Current entry count
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Current payload bytes held
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.size_bytes.load(Ordering::Relaxed)
    }

    /// Insert or refresh an entry, evicting LRU victims if the budget is
    /// exceeded. Returns false if the payload alone exceeds the budget and
    /// was not cached.
    pub fn insert(&self, key: &str, entry: CacheEntry) -> bool {
        let cost = entry.payload.len();
        if cost > self.max_bytes {
            debug!(key, cost, budget = self.max_bytes, "payload exceeds memory budget, disk only");
            return false;
        }

        let slot = MemorySlot {
            entry,
            last_access: Instant::now(),
        };
        if let Some(prev) = self.slots.insert(key.to_string(), slot) {
            self.size_bytes
                .fetch_sub(prev.entry.payload.len(), Ordering::Relaxed);
        }
        self.size_bytes.fetch_add(cost, Ordering::Relaxed);
        self.evict_to_budget();
        true
    }

    /// Look up an entry, refreshing its recency on hit.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut slot = self.slots.get_mut(key)?;
        slot.last_access = Instant::now();
        Some(slot.entry.clone())
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Remove an entry; idempotent.
    pub fn remove(&self, key: &str) {
        if let Some((_, prev)) = self.slots.remove(key) {
            self.size_bytes
                .fetch_sub(prev.entry.payload.len(), Ordering::Relaxed);
        }
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.slots.clear();
        self.size_bytes.store(0, Ordering::Relaxed);
    }

    fn evict_to_budget(&self) {
        while self.size_bytes.load(Ordering::Relaxed) > self.max_bytes {
            let victim = self
                .slots
                .iter()
                .min_by_key(|slot| slot.value().last_access)
                .map(|slot| slot.key().clone());
            match victim {
                Some(key) => {
                    debug!(key = %key, "evicting LRU entry from memory tier");
                    crate::metrics::record_eviction("memory", "lru");
                    self.remove(&key);
                }
                None => break,
            }
        }
    }
}
