//! # Ledger Key Locks
//!
//! In-process registry of one async mutex per ledger key.
//!
//! ## Lock Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Sale A touches (1,3) (1,7)         Bulk B touches (1,7) (1,3)          │
//! │                                                                         │
//! │  lock_all sorts both to: (1,3) → (1,7)                                 │
//! │                                                                         │
//! │  A: lock (1,3) ✓  lock (1,7) ✓   ... commit ... drop guards            │
//! │  B: lock (1,3) ⏳ (waits on A)    then (1,7)                             │
//! │                                                                         │
//! │  One global order ⇒ no cycle ⇒ no deadlock.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Locks are taken before a pooled connection is acquired and released after
//! commit, so a task never waits for a key while holding a connection.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;
use uplift_core::LedgerKey;

/// Registry size above which idle slots are dropped.
const PRUNE_THRESHOLD: usize = 4096;

type Slot = Arc<AsyncMutex<()>>;

/// One async mutex per ledger key, created on first use.
#[derive(Debug, Default)]
pub struct KeyLocks {
    slots: Mutex<HashMap<LedgerKey, Slot>>,
}

/// Held locks for a set of keys. Dropping it releases them all.
#[derive(Debug)]
pub struct KeyGuards {
    keys: Vec<LedgerKey>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl KeyGuards {
    /// Keys held, in acquisition order.
    pub fn keys(&self) -> &[LedgerKey] {
        &self.keys
    }
}

impl KeyLocks {
    pub fn new() -> Self {
        KeyLocks::default()
    }

    /// Locks every key, deduplicated, in ascending key order.
    ///
    /// Waits as long as needed; callers bound the wait with the unit-of-work
    /// timeout.
    pub async fn lock_all<I>(&self, keys: I) -> KeyGuards
    where
        I: IntoIterator<Item = LedgerKey>,
    {
        let ordered: BTreeSet<LedgerKey> = keys.into_iter().collect();
        let mut guards = Vec::with_capacity(ordered.len());

        for key in &ordered {
            let slot = self.slot(*key);
            guards.push(slot.lock_owned().await);
            trace!(client_id = key.client_id, product_id = key.product_id, "Key locked");
        }

        KeyGuards {
            keys: ordered.into_iter().collect(),
            _guards: guards,
        }
    }

    /// Number of keys with a registered mutex.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: LedgerKey) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);

        if slots.len() >= PRUNE_THRESHOLD {
            // Only the registry holds an idle slot
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        }

        Arc::clone(slots.entry(key).or_default())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_keys_are_sorted_and_deduplicated() {
        let locks = KeyLocks::new();
        let guards = locks
            .lock_all([
                LedgerKey::new(2, 1),
                LedgerKey::new(1, 9),
                LedgerKey::new(1, 3),
                LedgerKey::new(1, 9),
            ])
            .await;

        assert_eq!(
            guards.keys(),
            &[LedgerKey::new(1, 3), LedgerKey::new(1, 9), LedgerKey::new(2, 1)]
        );
        assert_eq!(locks.len(), 3);
    }

    #[tokio::test]
    async fn test_same_key_waits_for_release() {
        let locks = Arc::new(KeyLocks::new());
        let key = LedgerKey::new(1, 1);

        let held = locks.lock_all([key]).await;

        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.lock_all([key])).await;
        assert!(blocked.is_err());

        drop(held);
        let acquired = tokio::time::timeout(Duration::from_millis(500), locks.lock_all([key])).await;
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn test_disjoint_keys_do_not_block() {
        let locks = KeyLocks::new();
        let _a = locks.lock_all([LedgerKey::new(1, 1)]).await;

        let b = tokio::time::timeout(
            Duration::from_millis(500),
            locks.lock_all([LedgerKey::new(1, 2)]),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_idle_slots_are_pruned() {
        let locks = KeyLocks::new();
        let held = locks.lock_all([LedgerKey::new(0, 0)]).await;

        for product_id in 1..(PRUNE_THRESHOLD as i64) {
            drop(locks.lock_all([LedgerKey::new(1, product_id)]).await);
        }
        assert_eq!(locks.len(), PRUNE_THRESHOLD);

        // Next insertion prunes everything except the held key
        drop(locks.lock_all([LedgerKey::new(2, 0)]).await);
        assert_eq!(locks.len(), 2);

        drop(held);
    }
}
