//! Property tests for the record codec, memory-tier budget, and conflict
//! resolution.

use proptest::prelude::*;

use satchel_sync::cache::entry::{decode_record, CacheEntry};
use satchel_sync::{resolve_conflict, ConflictStrategy, MemoryTier, Versioned};

#[derive(Debug, Clone, PartialEq)]
struct Stamped {
    tag: &'static str,
    modified_ms: i64,
}

impl Versioned for Stamped {
    fn last_modified_ms(&self) -> i64 {
        self.modified_ms
    }
}

proptest! {
    /// Arbitrary bytes from disk must decode to an entry or a corruption
    /// error, never panic.
    #[test]
    fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = decode_record(&bytes);
    }

    /// The memory tier never exceeds its byte budget, whatever the insert
    /// sequence looks like.
    #[test]
    fn memory_tier_stays_under_budget(
        ops in proptest::collection::vec((0u8..8, 0usize..64), 1..64)
    ) {
        let budget = 128;
        let tier = MemoryTier::new(budget);
        for (key, size) in ops {
            tier.insert(&format!("k{key}"), CacheEntry::new(vec![0u8; size], None));
            prop_assert!(tier.bytes() <= budget);
        }
    }

    /// MostRecent always returns one of its two inputs, the strictly newer
    /// one when timestamps differ, and local on a tie.
    #[test]
    fn most_recent_is_deterministic(local_ms in any::<i64>(), remote_ms in any::<i64>()) {
        let local = Stamped { tag: "local", modified_ms: local_ms };
        let remote = Stamped { tag: "remote", modified_ms: remote_ms };
        let winner = resolve_conflict(local.clone(), remote.clone(), ConflictStrategy::MostRecent);

        prop_assert!(winner == local || winner == remote);
        if remote_ms > local_ms {
            prop_assert_eq!(winner.tag, "remote");
        } else {
            prop_assert_eq!(winner.tag, "local");
        }
    }
}
