//! Client-side read-through cache
//!
//! Two storage paths with disjoint namespaces:
//!
//! - [`Cache`]: durable keyed store of timestamped JSON records, opened once
//!   and shared, with a fixed validity window, read-through fetch and bulk
//!   refresh/preload. Storage failures degrade to "not cached".
//! - [`AmbientCache`]: a lighter cookie-style jar where the store itself
//!   expires values after a max-age.
//!
//! A given logical value should live in exactly one of them.

mod ambient;
mod clock;
mod config;
mod disk;
mod entry;
mod error;
mod inflight;
mod manager;
mod memory;
mod store;

pub use ambient::{find_cookie, AmbientCache, AmbientJar};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    Backend, CacheConfig, CACHE_DURATION, DEFAULT_DB_NAME, DEFAULT_SCHEMA_VERSION,
    DEFAULT_STORE_NAME,
};
pub use disk::{file_stem_for_key, DiskStore};
pub use entry::CacheEntry;
pub use error::{CacheError, FetchError};
pub use manager::Cache;
pub use memory::MemoryStore;
pub use store::{EntryStore, StoreHandle};
