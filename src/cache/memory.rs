//! In-memory entry store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::error::CacheError;
use super::store::EntryStore;

/// Entry store backed by a process-local map
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, String>> {
        // Every mutation is a single map call, so a poisoned map is still consistent
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EntryStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.records().get(key).cloned())
    }

    async fn put(&self, key: &str, record: String) -> Result<(), CacheError> {
        self.records().insert(key.to_string(), record);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.records().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.records().clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize, CacheError> {
        Ok(self.records().len())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
