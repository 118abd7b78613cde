//! Error types for the cache layer
//!
//! None of these reach callers of the infallible `Cache` API: storage problems
//! degrade to "not cached". They are returned by the `try_*` accessors and
//! logged everywhere else.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the cache backends and codec
#[derive(Debug, Error)]
pub enum CacheError {
    /// The durable store could not be opened or created
    #[error("Cache storage unavailable: {reason}")]
    StorageUnavailable { reason: String },

    /// The on-disk schema was written by a newer version of the cache
    #[error("Cache schema version {found} is newer than supported version {expected}")]
    VersionTooNew { found: u32, expected: u32 },

    /// A single store operation failed
    #[error("Cache I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored record could not be parsed back into a value
    #[error("Corrupt cache record for key '{key}': {source}")]
    Deserialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be encoded for storage
    #[error("Failed to encode cache value for key '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Error returned by [`Cache::fetch_with_timeout`](super::Cache::fetch_with_timeout)
#[derive(Debug, Error)]
pub enum FetchError<E> {
    /// The producer itself failed
    #[error(transparent)]
    Producer(E),

    /// The producer did not finish before the deadline
    #[error("Fetching '{key}' timed out after {timeout:?}")]
    TimedOut { key: String, timeout: Duration },
}

impl<E> FetchError<E> {
    /// Returns the producer error, if that is what failed
    pub fn into_producer(self) -> Option<E> {
        match self {
            FetchError::Producer(e) => Some(e),
            FetchError::TimedOut { .. } => None,
        }
    }
}
