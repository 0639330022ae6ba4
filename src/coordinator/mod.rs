// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync coordinator: decides *when* to reconcile local state with the
//! remote store.
//!
//! Owns the `Idle → Syncing → Idle/Error` state machine, the pending-change
//! counter, the persisted last-sync marker, and the single-flight guarantee.
//! Connectivity transitions from the [`ConnectivityMonitor`] drive the
//! `Offline` state; retry is caller-driven (`sync_if_needed`/`force_sync`
//! plus the became-available trigger), no internal backoff timer.
//!
//! # State machine
//!
//! ```text
//! Idle/Error ──trigger──▶ Syncing ──success──▶ Idle   (pending reset,
//!      ▲                     │                          marker persisted)
//!      │                     └──failure──▶ Error(reason)
//!      └──became-available── Offline ◀──became-unavailable── (any state)
//! ```

pub mod conflict;
pub mod types;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SatchelConfig;
use crate::connectivity::{ConnectivityEvent, ConnectivityMonitor};

use types::{RemoteStore, SyncEvent, SyncState};

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Persisted form of the last-successful-sync timestamp.
#[derive(Debug, Serialize, Deserialize)]
struct SyncMarker {
    last_sync_ms: i64,
}

struct CoordinatorInner {
    remote: Arc<dyn RemoteStore>,
    monitor: Arc<ConnectivityMonitor>,
    runtime: tokio::runtime::Handle,
    state: watch::Sender<SyncState>,
    events: broadcast::Sender<SyncEvent>,
    pending: AtomicU64,
    last_sync_ms: parking_lot::Mutex<Option<i64>>,
    marker_path: PathBuf,
    freshness: Duration,
    flight: Arc<Semaphore>,
}

/// Coordinates reconciliation between local state and the remote store.
///
/// Construct one instance at startup and pass it by reference to callers;
/// there is no global. The host reports local mutations through
/// [`mark_pending_change`](Self::mark_pending_change) and triggers
/// reconciliation at lifecycle points (foregrounding, pull-to-refresh)
/// through [`sync_if_needed`](Self::sync_if_needed) /
/// [`force_sync`](Self::force_sync).
pub struct SyncCoordinator {
    inner: Arc<CoordinatorInner>,
    listener: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl SyncCoordinator {
    /// Build a coordinator. Loads the persisted last-sync marker if one
    /// exists; a missing or unreadable marker just means "never synced".
    ///
    /// Captures the ambient Tokio runtime for attempt tasks, so this must
    /// be called inside one. The triggers ([`sync_if_needed`]
    /// (Self::sync_if_needed), [`force_sync`](Self::force_sync)) are then
    /// safe to call from any thread.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    #[must_use]
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        monitor: Arc<ConnectivityMonitor>,
        config: &SatchelConfig,
    ) -> Self {
        let marker_path = config.resolved_marker_path();
        let last_sync = load_marker(&marker_path);
        let (state, _) = watch::channel(SyncState::Idle);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(CoordinatorInner {
                remote,
                monitor,
                runtime: tokio::runtime::Handle::current(),
                state,
                events,
                pending: AtomicU64::new(0),
                last_sync_ms: parking_lot::Mutex::new(last_sync),
                marker_path,
                freshness: config.sync_freshness(),
                flight: Arc::new(Semaphore::new(1)),
            }),
            listener: parking_lot::Mutex::new(None),
        }
    }

    /// Start reacting to connectivity transitions; idempotent.
    pub fn start(&self) {
        let mut listener = self.listener.lock();
        if listener.is_some() {
            return;
        }
        let mut events = self.inner.monitor.subscribe();
        let inner = self.inner.clone();
        *listener = Some(self.inner.runtime.spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ConnectivityEvent::BecameUnavailable) => {
                        inner.enter_offline();
                    }
                    Ok(ConnectivityEvent::BecameAvailable) => {
                        let was_offline =
                            matches!(&*inner.state.borrow(), SyncState::Offline);
                        if was_offline {
                            info!("connectivity restored, leaving Offline");
                            inner.state.send_replace(SyncState::Idle);
                            inner.trigger(false);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "connectivity event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    /// Stop reacting to connectivity transitions; idempotent.
    pub fn stop(&self) {
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }
    }

    /// Throttled reconciliation trigger. No-op when connectivity is
    /// unsuitable (transitions to `Offline`), when the last successful sync
    /// is within the freshness window, or when an attempt is already in
    /// flight.
    pub fn sync_if_needed(&self) {
        self.inner.trigger(false);
    }

    /// Bypass the freshness throttle. Still requires connectivity and still
    /// single-flight.
    pub fn force_sync(&self) {
        self.inner.trigger(true);
    }

    /// Report one local mutation not yet reconciled.
    pub fn mark_pending_change(&self) {
        let n = self.inner.pending.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(pending = n, "local change marked pending");
    }

    /// Number of local mutations awaiting a successful sync.
    #[must_use]
    pub fn pending_changes(&self) -> u64 {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Epoch millis of the last successful reconciliation, if any.
    #[must_use]
    pub fn last_sync_ms(&self) -> Option<i64> {
        *self.inner.last_sync_ms.lock()
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> SyncState {
        self.inner.state.borrow().clone()
    }

    /// Watch state transitions.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    /// Subscribe to completion/failure notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Single human-readable status field for the UI.
    ///
    /// Priority: offline indicator, then pending-change count, then relative
    /// last-sync time, then the raw state description.
    #[must_use]
    pub fn status_line(&self) -> String {
        let state = self.state();
        if matches!(state, SyncState::Offline) {
            return "Offline".to_string();
        }
        let pending = self.pending_changes();
        if pending == 1 {
            return "1 change pending".to_string();
        }
        if pending > 1 {
            return format!("{pending} changes pending");
        }
        if let Some(ts) = self.last_sync_ms() {
            return format!(
                "Synced {}",
                relative_age(crate::cache::entry::now_ms().saturating_sub(ts))
            );
        }
        match state {
            SyncState::Syncing => "Syncing...".to_string(),
            SyncState::Error(reason) => format!("Sync failed: {reason}"),
            _ => "Waiting for first sync".to_string(),
        }
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

impl CoordinatorInner {
    fn enter_offline(&self) {
        self.state.send_if_modified(|s| {
            if matches!(s, SyncState::Offline) {
                false
            } else {
                debug!(from = %s, "entering Offline");
                *s = SyncState::Offline;
                true
            }
        });
    }

    /// Decide whether to attempt a sync and, if so, spawn the attempt.
    fn trigger(self: &Arc<Self>, force: bool) {
        if !self.monitor.is_suitable_for_sync() {
            debug!("connectivity unsuitable for sync");
            self.enter_offline();
            return;
        }

        if !force {
            if let Some(last) = *self.last_sync_ms.lock() {
                let age = crate::cache::entry::now_ms().saturating_sub(last);
                if age < self.freshness.as_millis() as i64 {
                    debug!(age_ms = age, "last sync is fresh, skipping");
                    return;
                }
            }
        }

        // Single-flight: the in-flight attempt is authoritative for this round
        let Ok(permit) = self.flight.clone().try_acquire_owned() else {
            debug!("sync already in flight");
            return;
        };

        self.state.send_replace(SyncState::Syncing);
        info!(pending = self.pending.load(Ordering::SeqCst), "sync attempt started");

        let inner = self.clone();
        self.runtime.spawn(async move {
            let started = Instant::now();
            let result = inner.remote.synchronize().await;
            crate::metrics::record_sync_duration(started.elapsed());

            match result {
                Ok(()) => {
                    inner.pending.store(0, Ordering::SeqCst);
                    let at_ms = crate::cache::entry::now_ms();
                    *inner.last_sync_ms.lock() = Some(at_ms);
                    inner.persist_marker(at_ms).await;

                    inner.state.send_if_modified(|s| {
                        if matches!(s, SyncState::Syncing) {
                            *s = SyncState::Idle;
                            true
                        } else {
                            false
                        }
                    });
                    info!(elapsed_ms = started.elapsed().as_millis() as u64, "sync completed");
                    crate::metrics::record_sync_attempt("success");
                    let _ = inner.events.send(SyncEvent::Completed { at_ms });
                }
                Err(e) => {
                    // If connectivity dropped mid-sync we are already
                    // Offline; leave it that way and emit no Failed event.
                    let entered_error = inner.state.send_if_modified(|s| {
                        if matches!(s, SyncState::Syncing) {
                            *s = SyncState::Error(e.to_string());
                            true
                        } else {
                            false
                        }
                    });
                    if entered_error {
                        warn!(reason = %e, "sync attempt failed");
                        crate::metrics::record_sync_attempt("failure");
                        let _ = inner.events.send(SyncEvent::Failed {
                            reason: e.to_string(),
                        });
                    } else {
                        debug!(reason = %e, "sync attempt failed while Offline, suppressing Error");
                        crate::metrics::record_sync_attempt("offline");
                    }
                }
            }
            drop(permit);
        });
    }

    async fn persist_marker(&self, at_ms: i64) {
        let marker = SyncMarker { last_sync_ms: at_ms };
        let bytes = match serde_json::to_vec(&marker) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to encode sync marker");
                return;
            }
        };
        if let Some(parent) = self.marker_path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        if let Err(e) = tokio::fs::write(&self.marker_path, bytes).await {
            warn!(path = %self.marker_path.display(), error = %e, "failed to persist sync marker");
        }
    }
}

fn load_marker(path: &PathBuf) -> Option<i64> {
    let bytes = std::fs::read(path).ok()?;
    match serde_json::from_slice::<SyncMarker>(&bytes) {
        Ok(marker) => Some(marker.last_sync_ms),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable sync marker");
            None
        }
    }
}

fn relative_age(age_ms: i64) -> String {
    let secs = age_ms / 1000;
    if secs < 60 {
        "just now".to_string()
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86_400 {
        format!("{}h ago", secs / 3600)
    } else {
        format!("{}d ago", secs / 86_400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_age_buckets() {
        assert_eq!(relative_age(5_000), "just now");
        assert_eq!(relative_age(90_000), "1m ago");
        assert_eq!(relative_age(7_200_000), "2h ago");
        assert_eq!(relative_age(200_000_000), "2d ago");
    }

    #[test]
    fn test_marker_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last_sync.json");
        std::fs::write(&path, br#"{"last_sync_ms": 1234}"#).unwrap();
        assert_eq!(load_marker(&path), Some(1234));
    }

    #[test]
    fn test_marker_missing_or_garbage_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert_eq!(load_marker(&missing), None);

        let garbage = dir.path().join("bad.json");
        std::fs::write(&garbage, b"not json").unwrap();
        assert_eq!(load_marker(&garbage), None);
    }
}
