//! Cache context: accessors, read-through fetch and bulk operations
//!
//! A [`Cache`] owns a lazily opened [`StoreHandle`], the clock used for entry
//! timestamps and the per-key in-flight locks. It is cheap to clone; clones
//! share the same store.
//!
//! Storage failures never reach callers of the plain accessors: an unusable
//! store makes every read a miss and every write a no-op, and a corrupt
//! record is deleted and reported as a miss. The `try_*` variants expose
//! those errors for callers that care.

use futures::{Future, TryFutureExt};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::config::CacheConfig;
use super::entry::{self, CacheEntry};
use super::error::{CacheError, FetchError};
use super::inflight::InFlight;
use super::store::{EntryStore, StoreHandle};

#[derive(Debug)]
struct Inner {
    store: StoreHandle,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    in_flight: Option<InFlight>,
}

/// Read-through cache over a durable keyed store
#[derive(Debug, Clone)]
pub struct Cache {
    inner: Arc<Inner>,
}

impl Cache {
    /// Creates a cache from `config`; the store is opened on first use
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a cache with a custom clock
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let ttl = config.ttl;
        let in_flight = config.dedupe_in_flight.then(InFlight::new);
        Self {
            inner: Arc::new(Inner {
                store: StoreHandle::new(config),
                clock,
                ttl,
                in_flight,
            }),
        }
    }

    /// Creates a cache over an already opened store
    pub fn from_store(
        store: Arc<dyn EntryStore>,
        config: &CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: StoreHandle::from_store(store),
                clock,
                ttl: config.ttl,
                in_flight: config.dedupe_in_flight.then(InFlight::new),
            }),
        }
    }

    /// Validity window of entries
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// The underlying store handle
    pub fn store(&self) -> &StoreHandle {
        &self.inner.store
    }

    // ===================
    // Accessors
    // ===================

    /// Returns the cached value for `key` if present and not expired
    ///
    /// Expired and corrupt records are deleted on the way out. A record that
    /// belongs to another key, or whose payload does not decode as `T`, is a
    /// miss but stays in place.
    pub async fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let store = self.inner.store.acquire().await?;

        let Some(raw) = store.get(key).await? else {
            debug!(key, "Cache miss");
            return Ok(None);
        };

        let entry: CacheEntry<Value> = match entry::decode(key, &raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "Dropping corrupt cache record");
                store.delete(key).await?;
                return Ok(None);
            }
        };

        if entry.key != key {
            debug!(key, stored = %entry.key, "Record belongs to another key");
            return Ok(None);
        }

        if entry.is_expired_at(self.inner.clock.now_millis(), self.inner.ttl) {
            debug!(key, "Cache entry expired");
            store.delete(key).await?;
            return Ok(None);
        }

        match serde_json::from_value(entry.data) {
            Ok(data) => {
                debug!(key, "Cache hit");
                Ok(Some(data))
            }
            Err(e) => {
                warn!(key, error = %e, "Cached value has an unexpected type");
                Ok(None)
            }
        }
    }

    /// Stores `data` under `key` with the current time, replacing any prior entry
    pub async fn try_set<T: Serialize + ?Sized>(&self, key: &str, data: &T) -> Result<(), CacheError> {
        let record = entry::encode(key, &data, self.inner.clock.now_millis())?;
        let store = self.inner.store.acquire().await?;
        store.put(key, record).await?;
        debug!(key, "Cache write");
        Ok(())
    }

    /// Removes `key` if present
    pub async fn try_delete(&self, key: &str) -> Result<(), CacheError> {
        let store = self.inner.store.acquire().await?;
        store.delete(key).await
    }

    /// Removes every entry
    pub async fn try_clear(&self) -> Result<(), CacheError> {
        let store = self.inner.store.acquire().await?;
        store.clear().await?;
        info!("Cache cleared");
        Ok(())
    }

    /// Like [`try_get`](Self::try_get), treating any storage error as a miss
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_get(key).await {
            Ok(value) => value,
            Err(e) => {
                log_fail_open("get", key, &e);
                None
            }
        }
    }

    /// Like [`try_set`](Self::try_set), skipping the write on any storage error
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, data: &T) {
        if let Err(e) = self.try_set(key, data).await {
            log_fail_open("set", key, &e);
        }
    }

    /// Like [`try_delete`](Self::try_delete), ignoring storage errors
    pub async fn delete(&self, key: &str) {
        if let Err(e) = self.try_delete(key).await {
            log_fail_open("delete", key, &e);
        }
    }

    /// Like [`try_clear`](Self::try_clear), ignoring storage errors
    pub async fn clear(&self) {
        if let Err(e) = self.try_clear().await {
            log_fail_open("clear", "*", &e);
        }
    }

    // ===================
    // Read-through
    // ===================

    /// Returns the cached value for `key`, or runs `producer` and caches its result
    ///
    /// On a hit `producer` is dropped without being polled. A producer error is
    /// returned as-is and nothing is written. With in-flight de-duplication
    /// enabled, concurrent misses for the same key run one producer at a time
    /// and later callers pick up the value the first one stored.
    pub async fn fetch<T, E, F>(&self, key: &str, producer: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get::<T>(key).await {
            return Ok(cached);
        }

        let _flight = match &self.inner.in_flight {
            Some(in_flight) => {
                let guard = in_flight.lock(key).await;
                // Another caller may have filled the key while we waited
                if let Some(cached) = self.get::<T>(key).await {
                    return Ok(cached);
                }
                Some(guard)
            }
            None => None,
        };

        debug!(key, "Running producer");
        let value = producer.await?;
        self.set(key, &value).await;
        Ok(value)
    }

    /// [`fetch`](Self::fetch) with a deadline
    ///
    /// The deadline covers the whole call, including time spent waiting behind
    /// another in-flight fetch of the same key. A producer that misses it is
    /// dropped and nothing is cached.
    pub async fn fetch_with_timeout<T, E, F>(
        &self,
        key: &str,
        timeout: Duration,
        producer: F,
    ) -> Result<T, FetchError<E>>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = Result<T, E>>,
    {
        let bounded = self.fetch(key, producer.map_err(FetchError::Producer));
        match tokio::time::timeout(timeout, bounded).await {
            Ok(result) => result,
            Err(_) => {
                warn!(key, ?timeout, "Fetch timed out");
                Err(FetchError::TimedOut {
                    key: key.to_string(),
                    timeout,
                })
            }
        }
    }

    // ===================
    // Bulk operations
    // ===================

    /// Clears the cache, then runs every producer in order
    ///
    /// Stops at the first failing producer and returns its error. The cache is
    /// already cleared at that point and only holds what earlier producers
    /// wrote.
    pub async fn refresh_all<I, F, T, E>(&self, producers: I) -> Result<(), E>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T, E>>,
    {
        self.clear().await;
        let count = run_sequentially(producers).await?;
        info!(count, "Cache refreshed");
        Ok(())
    }

    /// Runs every producer in order without clearing first
    pub async fn preload_all<I, F, T, E>(&self, producers: I) -> Result<(), E>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T, E>>,
    {
        let count = run_sequentially(producers).await?;
        info!(count, "Cache preloaded");
        Ok(())
    }
}

async fn run_sequentially<I, F, T, E>(producers: I) -> Result<usize, E>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    let mut count = 0;
    for producer in producers {
        producer.await?;
        count += 1;
    }
    Ok(count)
}

fn log_fail_open(op: &str, key: &str, error: &CacheError) {
    match error {
        // Already reported once when the open failed
        CacheError::StorageUnavailable { .. } => debug!(op, key, "Cache disabled, skipping"),
        _ => warn!(op, key, error = %error, "Cache operation failed, continuing uncached"),
    }
}
