// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Connectivity monitoring: level-to-edge transformation of raw network state.
//!
//! The platform reachability facility is modeled as a
//! `watch::Receiver<NetworkStatus>`; the host wires up whatever adapter it
//! has (or uses [`ConnectivityMonitor::channel`] directly). The monitor
//! de-duplicates repeated identical updates and emits edge-triggered
//! became-available / became-unavailable events.
//!
//! # Example
//!
//! ```
//! use satchel_sync::{ConnectivityMonitor, NetworkStatus};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (net_tx, monitor) = ConnectivityMonitor::channel(NetworkStatus::wifi());
//! monitor.start();
//!
//! assert!(monitor.current_status().connected);
//! assert!(monitor.is_suitable_for_sync());
//!
//! let _ = net_tx.send(NetworkStatus::offline());
//! # }
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Physical link classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkClass {
    Wifi,
    Cellular,
    Wired,
    Unknown,
}

/// A coherent snapshot of network state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub connected: bool,
    pub link: LinkClass,
    /// Metered/expensive link (e.g. cellular data, hotspot)
    pub expensive: bool,
    /// Bandwidth-constrained link (e.g. Low Data Mode)
    pub constrained: bool,
}

impl NetworkStatus {
    #[must_use]
    pub fn offline() -> Self {
        Self {
            connected: false,
            link: LinkClass::Unknown,
            expensive: false,
            constrained: false,
        }
    }

    #[must_use]
    pub fn wifi() -> Self {
        Self {
            connected: true,
            link: LinkClass::Wifi,
            expensive: false,
            constrained: false,
        }
    }

    #[must_use]
    pub fn cellular() -> Self {
        Self {
            connected: true,
            link: LinkClass::Cellular,
            expensive: true,
            constrained: false,
        }
    }

    /// Connected and not bandwidth-constrained.
    #[must_use]
    pub fn is_suitable_for_sync(&self) -> bool {
        self.connected && !self.constrained
    }

    /// Connected, not constrained, and not on a metered link.
    #[must_use]
    pub fn is_suitable_for_bulk_transfer(&self) -> bool {
        self.connected && !self.constrained && !self.expensive
    }
}

/// Edge-triggered connectivity transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// Transition from disconnected to connected
    BecameAvailable,
    /// Transition from connected to disconnected
    BecameUnavailable,
}

struct MonitorInner {
    status: watch::Sender<NetworkStatus>,
    events: broadcast::Sender<ConnectivityEvent>,
}

/// Observes a raw network-state source and exposes de-duplicated status
/// snapshots plus edge-triggered availability events.
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
    source: watch::Receiver<NetworkStatus>,
    runtime: tokio::runtime::Handle,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ConnectivityMonitor {
    /// Wrap an existing raw source.
    ///
    /// Captures the ambient Tokio runtime for the observer task;
    /// [`start`](Self::start) is then safe to call from any thread.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    #[must_use]
    pub fn new(source: watch::Receiver<NetworkStatus>) -> Self {
        let initial = *source.borrow();
        let (status, _) = watch::channel(initial);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(MonitorInner { status, events }),
            source,
            runtime: tokio::runtime::Handle::current(),
            task: parking_lot::Mutex::new(None),
        }
    }

    /// Create a monitor together with the sender feeding it. This is the
    /// in-tree source for tests and hosts without a platform adapter.
    #[must_use]
    pub fn channel(initial: NetworkStatus) -> (watch::Sender<NetworkStatus>, Self) {
        let (tx, rx) = watch::channel(initial);
        (tx, Self::new(rx))
    }

    /// Begin observing the source; idempotent.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        let mut source = self.source.clone();
        let inner = self.inner.clone();
        *task = Some(self.runtime.spawn(async move {
            while source.changed().await.is_ok() {
                let next = *source.borrow_and_update();
                let prev = *inner.status.borrow();
                if prev == next {
                    continue; // de-duplicate identical updates
                }
                inner.status.send_replace(next);
                if prev.connected != next.connected {
                    let event = if next.connected {
                        ConnectivityEvent::BecameAvailable
                    } else {
                        ConnectivityEvent::BecameUnavailable
                    };
                    info!(?event, link = ?next.link, "connectivity transition");
                    crate::metrics::record_connectivity_transition(match event {
                        ConnectivityEvent::BecameAvailable => "available",
                        ConnectivityEvent::BecameUnavailable => "unavailable",
                    });
                    let _ = inner.events.send(event);
                } else {
                    debug!(link = ?next.link, "link characteristics changed");
                }
            }
        }));
    }

    /// Stop observing; idempotent. The last observed status stays readable.
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }

    /// Current coherent snapshot.
    #[must_use]
    pub fn current_status(&self) -> NetworkStatus {
        *self.inner.status.borrow()
    }

    /// Watch de-duplicated status updates.
    #[must_use]
    pub fn status_receiver(&self) -> watch::Receiver<NetworkStatus> {
        self.inner.status.subscribe()
    }

    /// Subscribe to edge-triggered availability events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn is_suitable_for_sync(&self) -> bool {
        self.current_status().is_suitable_for_sync()
    }

    #[must_use]
    pub fn is_suitable_for_bulk_transfer(&self) -> bool {
        self.current_status().is_suitable_for_bulk_transfer()
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn recv_event(
        rx: &mut broadcast::Receiver<ConnectivityEvent>,
    ) -> Option<ConnectivityEvent> {
        timeout(Duration::from_secs(1), rx.recv()).await.ok()?.ok()
    }

    #[test]
    fn test_predicates() {
        assert!(NetworkStatus::wifi().is_suitable_for_sync());
        assert!(NetworkStatus::wifi().is_suitable_for_bulk_transfer());

        // Metered: sync yes, bulk no
        assert!(NetworkStatus::cellular().is_suitable_for_sync());
        assert!(!NetworkStatus::cellular().is_suitable_for_bulk_transfer());

        // Constrained: neither
        let constrained = NetworkStatus {
            constrained: true,
            ..NetworkStatus::wifi()
        };
        assert!(!constrained.is_suitable_for_sync());
        assert!(!constrained.is_suitable_for_bulk_transfer());

        assert!(!NetworkStatus::offline().is_suitable_for_sync());
    }

    #[tokio::test]
    async fn test_edge_events_on_transition() {
        let (tx, monitor) = ConnectivityMonitor::channel(NetworkStatus::wifi());
        monitor.start();
        let mut events = monitor.subscribe();

        tx.send(NetworkStatus::offline()).unwrap();
        assert_eq!(
            recv_event(&mut events).await,
            Some(ConnectivityEvent::BecameUnavailable)
        );
        assert!(!monitor.current_status().connected);

        tx.send(NetworkStatus::cellular()).unwrap();
        assert_eq!(
            recv_event(&mut events).await,
            Some(ConnectivityEvent::BecameAvailable)
        );
        assert_eq!(monitor.current_status().link, LinkClass::Cellular);
    }

    #[tokio::test]
    async fn test_duplicate_updates_produce_no_event() {
        let (tx, monitor) = ConnectivityMonitor::channel(NetworkStatus::wifi());
        monitor.start();
        let mut events = monitor.subscribe();

        // Same status again, then a link change without an availability edge
        tx.send(NetworkStatus::wifi()).unwrap();
        tx.send(NetworkStatus::cellular()).unwrap();
        tx.send(NetworkStatus::offline()).unwrap();

        // Only the offline edge comes through
        assert_eq!(
            recv_event(&mut events).await,
            Some(ConnectivityEvent::BecameUnavailable)
        );
        assert!(
            timeout(Duration::from_millis(100), events.recv())
                .await
                .is_err(),
            "no further events expected"
        );
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let (tx, monitor) = ConnectivityMonitor::channel(NetworkStatus::offline());
        monitor.start();
        monitor.start();
        monitor.stop();
        monitor.stop();

        // Stopped: updates no longer propagate
        tx.send(NetworkStatus::wifi()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!monitor.current_status().connected);
    }
}
