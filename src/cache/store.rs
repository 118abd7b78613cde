//! Store handle: lazily opened, shared entry store
//!
//! A [`StoreHandle`] opens its backend on first use and hands every later
//! caller the same `Arc`. Concurrent first callers wait on one in-flight
//! initialization instead of racing to create the schema. A failed open is
//! remembered for the life of the handle so the cache degrades to "no
//! caching" instead of retrying on every call.

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::config::{Backend, CacheConfig};
use super::disk::DiskStore;
use super::error::CacheError;
use super::memory::MemoryStore;

/// Raw key/record storage behind the cache
///
/// Records are opaque text (encoded [`CacheEntry`](super::CacheEntry)s);
/// expiry is the caller's concern.
#[async_trait]
pub trait EntryStore: Send + Sync + Debug {
    /// Returns the raw record for `key`, or `None` if absent
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores `record` under `key`, replacing any previous record
    async fn put(&self, key: &str, record: String) -> Result<(), CacheError>;

    /// Removes `key`; absent keys are not an error
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Removes every record
    async fn clear(&self) -> Result<(), CacheError>;

    /// Number of stored records, expired ones included
    async fn len(&self) -> Result<usize, CacheError>;

    /// Short identifier used in logs ("disk", "memory")
    fn backend_name(&self) -> &'static str;
}

/// Shared, lazily opened entry store
#[derive(Debug)]
pub struct StoreHandle {
    config: CacheConfig,
    cell: OnceCell<Result<Arc<dyn EntryStore>, String>>,
}

impl StoreHandle {
    /// Creates a handle that opens the backend described by `config` on first use
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            cell: OnceCell::new(),
        }
    }

    /// Creates an already-open handle around an existing store
    pub fn from_store(store: Arc<dyn EntryStore>) -> Self {
        Self {
            config: CacheConfig::in_memory(),
            cell: OnceCell::new_with(Some(Ok(store))),
        }
    }

    /// Returns the shared store, opening it on the first call
    pub async fn acquire(&self) -> Result<Arc<dyn EntryStore>, CacheError> {
        let opened = self
            .cell
            .get_or_init(|| async {
                open_store(&self.config).await.map_err(|e| {
                    warn!(error = %e, "Cache storage unavailable, caching disabled");
                    e.to_string()
                })
            })
            .await;

        match opened {
            Ok(store) => Ok(Arc::clone(store)),
            Err(reason) => Err(CacheError::StorageUnavailable {
                reason: reason.clone(),
            }),
        }
    }

    /// Whether an open has already been attempted (successfully or not)
    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}

async fn open_store(config: &CacheConfig) -> Result<Arc<dyn EntryStore>, CacheError> {
    match config.backend {
        Backend::Memory => {
            info!("Opened in-memory cache store");
            Ok(Arc::new(MemoryStore::new()))
        }
        Backend::Disk => {
            let db_path = config
                .db_path()
                .ok_or_else(|| CacheError::StorageUnavailable {
                    reason: "no cache directory could be determined".to_string(),
                })?;
            let store =
                DiskStore::open(&db_path, &config.store_name, config.schema_version).await?;
            info!(path = %db_path.display(), "Opened disk cache store");
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_acquire_returns_same_handle_every_time() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let handle = StoreHandle::new(CacheConfig::with_dir(temp_dir.path()));

        assert!(!handle.is_initialized());
        let first = handle.acquire().await.expect("Store should open");
        let second = handle.acquire().await.expect("Store should open");

        assert!(handle.is_initialized());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.backend_name(), "disk");
    }

    #[tokio::test]
    async fn test_concurrent_first_acquire_shares_one_open() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let handle = Arc::new(StoreHandle::new(CacheConfig::with_dir(temp_dir.path())));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let handle = Arc::clone(&handle);
                tokio::spawn(async move { handle.acquire().await })
            })
            .collect();

        let mut stores = Vec::new();
        for task in tasks {
            stores.push(task.await.unwrap().expect("Store should open"));
        }

        for store in &stores[1..] {
            assert!(Arc::ptr_eq(&stores[0], store));
        }
    }

    #[tokio::test]
    async fn test_unusable_directory_is_storage_unavailable() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        // A regular file where the cache directory should go
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let handle = StoreHandle::new(CacheConfig::with_dir(&blocker));

        let first = handle.acquire().await;
        assert!(matches!(first, Err(CacheError::StorageUnavailable { .. })));

        // The failure is remembered rather than retried
        let second = handle.acquire().await;
        assert!(matches!(second, Err(CacheError::StorageUnavailable { .. })));
        assert!(handle.is_initialized());
    }

    #[tokio::test]
    async fn test_missing_cache_dir_is_storage_unavailable() {
        let config = CacheConfig {
            cache_dir: None,
            ..CacheConfig::default()
        };
        let handle = StoreHandle::new(config);

        let err = handle.acquire().await.unwrap_err();
        assert!(err.to_string().contains("no cache directory"));
    }

    #[tokio::test]
    async fn test_from_store_is_already_initialized() {
        let store: Arc<dyn EntryStore> = Arc::new(MemoryStore::new());
        let handle = StoreHandle::from_store(Arc::clone(&store));

        assert!(handle.is_initialized());
        let acquired = handle.acquire().await.unwrap();
        assert!(Arc::ptr_eq(&store, &acquired));
    }
}
