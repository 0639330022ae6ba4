// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Satchel Sync
//!
//! Local cache and sync coordination for offline-first personal data apps.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Application (CRUD)                      │
//! │  • store()/retrieve() through the tiered cache              │
//! │  • mark_pending_change() + sync_if_needed()/force_sync()    │
//! └─────────────────────────────────────────────────────────────┘
//!          │                                     │
//!          ▼                                     ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │       TieredCache        │   │       SyncCoordinator        │
//! │  • Memory tier: DashMap, │   │  • Idle/Syncing/Offline/     │
//! │    byte-budget LRU       │   │    Error state machine       │
//! │  • Disk tier: hashed     │   │  • Freshness throttle,       │
//! │    filenames, TTL, trim  │   │    single-flight attempts    │
//! └──────────────────────────┘   │  • Conflict resolution       │
//!                                └──────────────────────────────┘
//!                                               │
//!                                               ▼
//!                                ┌──────────────────────────────┐
//!                                │     ConnectivityMonitor      │
//!                                │  • Edge-triggered available/ │
//!                                │    unavailable events        │
//!                                └──────────────────────────────┘
//! ```
//!
//! The cache is independent of sync and network state: reads hit the memory
//! tier first and fall through to a durable on-disk tier, while writes land
//! in memory synchronously and persist in the background. The coordinator
//! owns the sync state machine, counts pending local changes reported by the
//! host, and consults the connectivity monitor before every attempt.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use satchel_sync::{
//!     ConnectivityMonitor, NetworkStatus, RemoteError, RemoteStore,
//!     SatchelConfig, SyncCoordinator, TieredCache,
//! };
//!
//! struct Backend;
//!
//! #[async_trait::async_trait]
//! impl RemoteStore for Backend {
//!     async fn synchronize(&self) -> Result<(), RemoteError> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SatchelConfig {
//!         cache_dir: "/tmp/satchel".into(),
//!         ..Default::default()
//!     };
//!
//!     let cache = TieredCache::open(&config).await.expect("cache dir");
//!     cache.store("doc-1", b"hello".to_vec());
//!     assert_eq!(cache.retrieve("doc-1").await, Some(b"hello".to_vec()));
//!
//!     let (_net_tx, monitor) = ConnectivityMonitor::channel(NetworkStatus::wifi());
//!     let monitor = Arc::new(monitor);
//!     monitor.start();
//!
//!     let coordinator = SyncCoordinator::new(Arc::new(Backend), monitor, &config);
//!     coordinator.start();
//!     coordinator.mark_pending_change();
//!     coordinator.sync_if_needed();
//! }
//! ```

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod metrics;

pub use cache::disk::{DiskError, DiskTier};
pub use cache::entry::{CacheEntry, StoreOptions};
pub use cache::memory::MemoryTier;
pub use cache::TieredCache;
pub use config::SatchelConfig;
pub use connectivity::{ConnectivityEvent, ConnectivityMonitor, LinkClass, NetworkStatus};
pub use coordinator::conflict::{resolve_conflict, ConflictStrategy, Versioned};
pub use coordinator::types::{RemoteError, RemoteStore, SyncEvent, SyncState};
pub use coordinator::SyncCoordinator;
