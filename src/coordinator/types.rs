//! Public types for the sync coordinator.

use async_trait::async_trait;
use thiserror::Error;

/// Sync state machine. One value at a time, owned by the coordinator and
/// only observed externally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing in flight, last attempt (if any) succeeded
    Idle,
    /// A sync attempt is in flight
    Syncing,
    /// Connectivity is unsuitable; not an error
    Offline,
    /// The last attempt failed; pending changes are preserved
    Error(String),
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Syncing => write!(f, "Syncing"),
            Self::Offline => write!(f, "Offline"),
            Self::Error(reason) => write!(f, "Error: {reason}"),
        }
    }
}

/// Notification emitted on sync completion; at-most-once per transition,
/// no replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A sync attempt completed successfully
    Completed {
        /// Epoch millis of the completion (also the new last-sync marker)
        at_ms: i64,
    },
    /// A sync attempt failed and the coordinator entered `Error`
    Failed { reason: String },
}

/// Failure reason reported by the reconciliation backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct RemoteError(pub String);

impl RemoteError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// The opaque reconciliation backend. One round-trip per call: either all
/// outstanding local work is reconciled or the attempt fails with a reason.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn synchronize(&self) -> Result<(), RemoteError>;
}
