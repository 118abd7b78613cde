//! Configuration for the cache context

use directories::ProjectDirs;
use std::path::PathBuf;
use std::time::Duration;

/// Name of the on-disk database directory
pub const DEFAULT_DB_NAME: &str = "coinbrew-cache";

/// Name of the single object store inside the database
pub const DEFAULT_STORE_NAME: &str = "cache-store";

/// Schema version written to the database metadata
pub const DEFAULT_SCHEMA_VERSION: u32 = 1;

/// How long a durable entry stays valid (2 hours)
pub const CACHE_DURATION: Duration = Duration::from_secs(2 * 60 * 60);

/// Which backend a [`Cache`](super::Cache) stores its entries in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// JSON records on the local filesystem
    Disk,
    /// Process-local map, lost on exit
    Memory,
}

/// Settings for the durable cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Parent directory of the database; `None` if no home directory exists
    pub cache_dir: Option<PathBuf>,
    /// Database directory name
    pub db_name: String,
    /// Object store directory name
    pub store_name: String,
    /// Schema version; bumping it runs the upgrade step on next open
    pub schema_version: u32,
    /// Validity window for entries
    pub ttl: Duration,
    /// Serialize concurrent fetches of the same key
    pub dedupe_in_flight: bool,
    /// Storage backend
    pub backend: Backend,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            db_name: DEFAULT_DB_NAME.to_string(),
            store_name: DEFAULT_STORE_NAME.to_string(),
            schema_version: DEFAULT_SCHEMA_VERSION,
            ttl: CACHE_DURATION,
            dedupe_in_flight: true,
            backend: Backend::Disk,
        }
    }
}

impl CacheConfig {
    /// A disk-backed config rooted at `dir`
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: Some(dir.into()),
            ..Default::default()
        }
    }

    /// An in-memory config; nothing touches the filesystem
    pub fn in_memory() -> Self {
        Self {
            cache_dir: None,
            backend: Backend::Memory,
            ..Default::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_dedupe(mut self, enabled: bool) -> Self {
        self.dedupe_in_flight = enabled;
        self
    }

    pub fn with_schema_version(mut self, version: u32) -> Self {
        self.schema_version = version;
        self
    }

    /// Full path of the database directory, if one can be determined
    pub fn db_path(&self) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|dir| dir.join(&self.db_name))
    }
}

/// XDG-compliant cache directory (`~/.cache/coinbrew/` on Linux)
fn default_cache_dir() -> Option<PathBuf> {
    let project_dirs = ProjectDirs::from("", "", "coinbrew")?;
    Some(project_dirs.cache_dir().to_path_buf())
}
