//! Cache entry codec
//!
//! Wraps a value with the key it was stored under and a write timestamp, and
//! turns raw records back into values for expiry checks.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

use super::error::CacheError;

/// A single stored record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// Primary key of the record
    pub key: String,
    /// The cached payload
    pub data: T,
    /// Write time, milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl<T> CacheEntry<T> {
    pub fn new(key: impl Into<String>, data: T, timestamp: i64) -> Self {
        Self {
            key: key.into(),
            data,
            timestamp,
        }
    }

    /// An entry is valid while `now - timestamp <= ttl`
    pub fn is_valid_at(&self, now_millis: i64, ttl: Duration) -> bool {
        let ttl = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        now_millis.saturating_sub(self.timestamp) <= ttl
    }

    pub fn is_expired_at(&self, now_millis: i64, ttl: Duration) -> bool {
        !self.is_valid_at(now_millis, ttl)
    }
}

/// Encodes a value into the raw text stored by a backend
pub fn encode<T: Serialize>(key: &str, data: &T, timestamp: i64) -> Result<String, CacheError> {
    let entry = CacheEntry {
        key: key.to_string(),
        data,
        timestamp,
    };
    serde_json::to_string(&entry).map_err(|source| CacheError::Serialization {
        key: key.to_string(),
        source,
    })
}

/// Decodes raw text from a backend into an entry
pub fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<CacheEntry<T>, CacheError> {
    serde_json::from_str(raw).map_err(|source| CacheError::Deserialization {
        key: key.to_string(),
        source,
    })
}
