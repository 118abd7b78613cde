//! Per-key single-flight locks for read-through fetches
//!
//! Concurrent misses on the same key queue behind one async lock. Whoever
//! holds it runs the producer; the rest re-check the cache once they get in.
//! Slots are dropped from the map as soon as nobody holds or waits on them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<()>>;

#[derive(Debug)]
struct SlotEntry {
    lock: Slot,
    /// Holders plus waiters, including waiters that are later cancelled
    users: usize,
}

/// Map of cache key to the lock guarding its in-progress fetch
#[derive(Debug, Default)]
pub struct InFlight {
    slots: Mutex<HashMap<String, SlotEntry>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`
    ///
    /// Dropping the returned future before it resolves gives up the place in
    /// the queue and releases the slot like a dropped guard.
    pub async fn lock(&self, key: &str) -> FlightGuard<'_> {
        let slot = {
            let mut slots = self.slots();
            let entry = slots.entry(key.to_string()).or_insert_with(|| SlotEntry {
                lock: Slot::default(),
                users: 0,
            });
            entry.users += 1;
            Arc::clone(&entry.lock)
        };

        let mut flight = FlightGuard {
            owner: self,
            key: key.to_string(),
            guard: None,
        };
        flight.guard = Some(slot.lock_owned().await);
        flight
    }

    /// Number of keys with a holder or waiter
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, SlotEntry>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive access to one key; released on drop
#[derive(Debug)]
pub struct FlightGuard<'a> {
    owner: &'a InFlight,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut slots = self.owner.slots();
        if let Some(entry) = slots.get_mut(&self.key) {
            entry.users -= 1;
            if entry.users == 0 {
                slots.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_slot_is_removed_after_release() {
        let in_flight = InFlight::new();
        {
            let _guard = in_flight.lock("top-coins").await;
            assert_eq!(in_flight.len(), 1);
        }
        assert!(in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let in_flight = Arc::new(InFlight::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let in_flight = Arc::clone(&in_flight);
                let active = Arc::clone(&active);
                let max_active = Arc::clone(&max_active);
                tokio::spawn(async move {
                    let _guard = in_flight.lock("portfolio-1").await;
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert!(in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let in_flight = InFlight::new();
        let _a = in_flight.lock("a").await;
        let b = tokio::time::timeout(Duration::from_secs(1), in_flight.lock("b")).await;
        assert!(b.is_ok(), "Lock on another key should not wait");
        assert_eq!(in_flight.len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_releases_slot() {
        let in_flight = InFlight::new();
        let holder = in_flight.lock("k").await;

        let mut waiter = Box::pin(in_flight.lock("k"));
        assert!(futures::poll!(&mut waiter).is_pending());

        drop(holder);
        assert_eq!(in_flight.len(), 1, "Waiter still queued");
        drop(waiter);

        assert!(in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_timed_out_waiter_leaves_holder_slot_intact() {
        let in_flight = InFlight::new();
        let holder = in_flight.lock("k").await;

        let waited = tokio::time::timeout(Duration::from_millis(10), in_flight.lock("k")).await;
        assert!(waited.is_err());
        assert_eq!(in_flight.len(), 1);

        drop(holder);
        assert!(in_flight.is_empty());
    }
}
