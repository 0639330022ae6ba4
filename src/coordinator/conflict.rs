// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Conflict resolution between local and remote versions of a record.
//!
//! [`resolve_conflict`] is a pure function: it never touches coordinator
//! state and the candidates are never stored. The default strategy is
//! [`ConflictStrategy::UseRemote`]: in a single-owner, multi-device model
//! the server-confirmed value wins unless the caller says otherwise.
//!
//! # Example
//!
//! ```
//! use satchel_sync::{resolve_conflict, ConflictStrategy, Versioned};
//!
//! #[derive(Clone, PartialEq, Debug)]
//! struct Note { text: String, modified_ms: i64 }
//!
//! impl Versioned for Note {
//!     fn last_modified_ms(&self) -> i64 { self.modified_ms }
//! }
//!
//! let local = Note { text: "draft".into(), modified_ms: 200 };
//! let remote = Note { text: "saved".into(), modified_ms: 100 };
//!
//! let winner = resolve_conflict(local.clone(), remote.clone(), ConflictStrategy::MostRecent);
//! assert_eq!(winner, local);
//!
//! let winner = resolve_conflict(local, remote.clone(), ConflictStrategy::default());
//! assert_eq!(winner, remote); // default: remote wins
//! ```

/// A conflict candidate exposes its last-modified wall-clock time.
pub trait Versioned {
    fn last_modified_ms(&self) -> i64;
}

/// Policy for choosing between two divergent versions of the same record.
#[derive(Debug, Clone, Copy)]
pub enum ConflictStrategy<T> {
    /// Always keep the local version
    UseLocal,
    /// Always keep the remote version
    UseRemote,
    /// Keep whichever was modified later; ties favor local so the decision
    /// is deterministic
    MostRecent,
    /// Delegate to a type-specific merge function
    Merge(fn(&T, &T) -> T),
}

impl<T> Default for ConflictStrategy<T> {
    fn default() -> Self {
        Self::UseRemote
    }
}

/// Resolve a conflict between a local and a remote version.
pub fn resolve_conflict<T: Versioned>(local: T, remote: T, strategy: ConflictStrategy<T>) -> T {
    match strategy {
        ConflictStrategy::UseLocal => local,
        ConflictStrategy::UseRemote => remote,
        ConflictStrategy::MostRecent => {
            if remote.last_modified_ms() > local.last_modified_ms() {
                remote
            } else {
                local
            }
        }
        ConflictStrategy::Merge(merge) => merge(&local, &remote),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Record {
        body: &'static str,
        modified_ms: i64,
    }

    impl Versioned for Record {
        fn last_modified_ms(&self) -> i64 {
            self.modified_ms
        }
    }

    fn pair(local_ms: i64, remote_ms: i64) -> (Record, Record) {
        (
            Record { body: "local", modified_ms: local_ms },
            Record { body: "remote", modified_ms: remote_ms },
        )
    }

    #[test]
    fn test_use_local_and_use_remote_ignore_timestamps() {
        let (local, remote) = pair(1, 1000);
        assert_eq!(
            resolve_conflict(local.clone(), remote.clone(), ConflictStrategy::UseLocal).body,
            "local"
        );
        assert_eq!(
            resolve_conflict(local, remote, ConflictStrategy::UseRemote).body,
            "remote"
        );
    }

    #[test]
    fn test_most_recent_picks_strictly_later() {
        let (local, remote) = pair(100, 200);
        assert_eq!(
            resolve_conflict(local, remote, ConflictStrategy::MostRecent).body,
            "remote"
        );

        let (local, remote) = pair(300, 200);
        assert_eq!(
            resolve_conflict(local, remote, ConflictStrategy::MostRecent).body,
            "local"
        );
    }

    #[test]
    fn test_most_recent_tie_breaks_to_local() {
        let (local, remote) = pair(500, 500);
        assert_eq!(
            resolve_conflict(local, remote, ConflictStrategy::MostRecent).body,
            "local"
        );
    }

    #[test]
    fn test_default_strategy_is_use_remote() {
        let (local, remote) = pair(1000, 1);
        assert_eq!(
            resolve_conflict(local, remote, ConflictStrategy::default()).body,
            "remote"
        );
    }

    #[test]
    fn test_merge_delegates() {
        let (local, remote) = pair(10, 20);
        let merged = resolve_conflict(
            local,
            remote,
            ConflictStrategy::Merge(|l, r| Record {
                body: "merged",
                modified_ms: l.modified_ms.max(r.modified_ms),
            }),
        );
        assert_eq!(merged.body, "merged");
        assert_eq!(merged.modified_ms, 20);
    }
}
