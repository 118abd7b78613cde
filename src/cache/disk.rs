//! Durable entry store on the local filesystem
//!
//! Layout:
//!
//! ```text
//! <db_path>/meta.json            {"version": 1}
//! <db_path>/<store_name>/<key>.json
//! ```
//!
//! Each record is written to a temporary file and renamed into place, so a
//! reader sees either the old record or the new one, never a partial write.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{debug, info, warn};

use super::error::CacheError;
use super::store::EntryStore;

const META_FILE: &str = "meta.json";
const RECORD_EXT: &str = "json";

/// Longest escaped stem used verbatim; leaves room for the extension and
/// the temp-file decoration within a 255-byte file name
const MAX_STEM_LEN: usize = 200;

/// Leading part of an over-long stem kept in front of its digest
const HASHED_PREFIX_LEN: usize = 120;

/// Distinguishes temp files of concurrent writers
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct DbMeta {
    version: u32,
}

/// Entry store keeping one JSON file per key
#[derive(Debug, Clone)]
pub struct DiskStore {
    store_dir: PathBuf,
}

impl DiskStore {
    /// Opens (creating if needed) the database at `db_path`
    ///
    /// Runs the upgrade step when the stored schema version is missing or
    /// older than `version`. A newer stored version is refused.
    pub async fn open(db_path: &Path, store_name: &str, version: u32) -> Result<Self, CacheError> {
        fs::create_dir_all(db_path)
            .await
            .map_err(|e| CacheError::io(db_path, e))?;

        let meta_path = db_path.join(META_FILE);
        let store_dir = db_path.join(store_name);

        match read_meta(&meta_path).await? {
            Some(found) if found > version => {
                return Err(CacheError::VersionTooNew {
                    found,
                    expected: version,
                });
            }
            Some(found) if found == version => {
                debug!(version, "Cache schema is current");
            }
            stored => {
                info!(from = ?stored, to = version, "Upgrading cache schema");
                fs::create_dir_all(&store_dir)
                    .await
                    .map_err(|e| CacheError::io(&store_dir, e))?;
                let meta = serde_json::to_string(&DbMeta { version }).map_err(|source| {
                    CacheError::Serialization {
                        key: META_FILE.to_string(),
                        source,
                    }
                })?;
                write_atomic(&meta_path, meta.as_bytes()).await?;
            }
        }

        // The object store may have been removed out from under a current schema
        fs::create_dir_all(&store_dir)
            .await
            .map_err(|e| CacheError::io(&store_dir, e))?;

        Ok(Self { store_dir })
    }

    /// Directory holding the record files
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.store_dir
            .join(format!("{}.{}", file_stem_for_key(key), RECORD_EXT))
    }
}

#[async_trait]
impl EntryStore for DiskStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let path = self.record_path(key);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    async fn put(&self, key: &str, record: String) -> Result<(), CacheError> {
        write_atomic(&self.record_path(key), record.as_bytes()).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let path = self.record_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut entries = fs::read_dir(&self.store_dir)
            .await
            .map_err(|e| CacheError::io(&self.store_dir, e))?;

        let mut removed = 0usize;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&self.store_dir, e))?
        {
            let path = entry.path();
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to remove cache record");
                    return Err(CacheError::io(path, e));
                }
            }
        }

        debug!(removed, "Cleared disk cache store");
        Ok(())
    }

    async fn len(&self) -> Result<usize, CacheError> {
        let mut entries = fs::read_dir(&self.store_dir)
            .await
            .map_err(|e| CacheError::io(&self.store_dir, e))?;

        let mut count = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&self.store_dir, e))?
        {
            if entry.path().extension().is_some_and(|ext| ext == RECORD_EXT) {
                count += 1;
            }
        }
        Ok(count)
    }

    fn backend_name(&self) -> &'static str {
        "disk"
    }
}

/// Escapes a cache key into a safe file stem
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte becomes
/// `%XX`. Stems longer than 200 bytes are cut down to a prefix plus
/// `~` and the SHA-256 of the key. Escaping never emits `~`, so the two forms
/// cannot collide, and distinct keys map to distinct stems.
pub fn file_stem_for_key(key: &str) -> String {
    let mut stem = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("%{:02X}", byte));
        }
    }

    if stem.len() <= MAX_STEM_LEN {
        return stem;
    }

    // The escaped stem is pure ASCII, so any byte offset is a char boundary
    stem.truncate(HASHED_PREFIX_LEN);
    stem.push('~');
    stem.push_str(&hex::encode(Sha256::digest(key.as_bytes())));
    stem
}

async fn read_meta(path: &Path) -> Result<Option<u32>, CacheError> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::io(path, e)),
    };

    match serde_json::from_str::<DbMeta>(&content) {
        Ok(meta) => Ok(Some(meta.version)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable cache metadata, rebuilding schema");
            Ok(None)
        }
    }
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CacheError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let nonce = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_path = path.with_file_name(format!(
        ".{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        nonce
    ));

    fs::write(&tmp_path, contents)
        .await
        .map_err(|e| CacheError::io(&tmp_path, e))?;

    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(CacheError::io(path, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_test_store() -> (DiskStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = DiskStore::open(&temp_dir.path().join("db"), "cache-store", 1)
            .await
            .expect("Store should open");
        (store, temp_dir)
    }

    #[test]
    fn test_file_stem_escapes_unsafe_bytes() {
        assert_eq!(file_stem_for_key("portfolio-42"), "portfolio-42");
        assert_eq!(file_stem_for_key("user_profile"), "user_profile");
        assert_eq!(file_stem_for_key("a/b"), "a%2Fb");
        assert_eq!(file_stem_for_key("../etc"), "%2E%2E%2Fetc");
        assert_eq!(file_stem_for_key("a%2Fb"), "a%252Fb");
    }

    #[test]
    fn test_long_key_stem_is_bounded_and_distinct() {
        let base = format!("https://api.example.com/coins?ids={}", "abc,".repeat(60));
        let other = format!("{}x", base);

        let stem = file_stem_for_key(&base);
        assert!(stem.len() <= MAX_STEM_LEN, "Stem too long: {}", stem.len());
        assert!(stem.starts_with("https%3A%2F%2Fapi"));
        assert!(stem.contains('~'));
        assert_eq!(stem, file_stem_for_key(&base));
        assert_ne!(stem, file_stem_for_key(&other));
    }

    #[tokio::test]
    async fn test_put_get_with_long_key() {
        let (store, _temp_dir) = open_test_store().await;
        let key = "q=".repeat(150);
        assert_eq!(key.len(), 300);

        store.put(&key, "42".to_string()).await.unwrap();

        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("42"));
        assert_eq!(store.len().await.unwrap(), 1);
        store.delete(&key).await.unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_creates_schema() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("nested").join("db");

        let store = DiskStore::open(&db_path, "cache-store", 1).await.unwrap();

        assert!(store.store_dir().is_dir());
        let meta = std::fs::read_to_string(db_path.join(META_FILE)).unwrap();
        assert!(meta.contains("\"version\":1"));
    }

    #[tokio::test]
    async fn test_reopen_keeps_records() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("db");

        let store = DiskStore::open(&db_path, "cache-store", 1).await.unwrap();
        store.put("top-coins", "[]".to_string()).await.unwrap();

        let reopened = DiskStore::open(&db_path, "cache-store", 1).await.unwrap();
        assert_eq!(reopened.get("top-coins").await.unwrap().as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_upgrade_keeps_records_and_bumps_version() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("db");

        let store = DiskStore::open(&db_path, "cache-store", 1).await.unwrap();
        store.put("k", "v".to_string()).await.unwrap();

        let upgraded = DiskStore::open(&db_path, "cache-store", 2).await.unwrap();
        assert_eq!(upgraded.get("k").await.unwrap().as_deref(), Some("v"));

        let meta = std::fs::read_to_string(db_path.join(META_FILE)).unwrap();
        assert!(meta.contains("\"version\":2"));
    }

    #[tokio::test]
    async fn test_newer_schema_is_refused() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("db");
        DiskStore::open(&db_path, "cache-store", 5).await.unwrap();

        let result = DiskStore::open(&db_path, "cache-store", 1).await;
        assert!(matches!(
            result,
            Err(CacheError::VersionTooNew {
                found: 5,
                expected: 1
            })
        ));
    }

    #[tokio::test]
    async fn test_corrupt_meta_is_rebuilt() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("db");
        std::fs::create_dir_all(&db_path).unwrap();
        std::fs::write(db_path.join(META_FILE), "garbage").unwrap();

        let store = DiskStore::open(&db_path, "cache-store", 1).await.unwrap();
        assert!(store.store_dir().is_dir());
    }

    #[tokio::test]
    async fn test_put_get_delete_roundtrip() {
        let (store, _temp_dir) = open_test_store().await;

        assert!(store.get("price").await.unwrap().is_none());

        store.put("price", "42".to_string()).await.unwrap();
        assert_eq!(store.get("price").await.unwrap().as_deref(), Some("42"));

        store.put("price", "43".to_string()).await.unwrap();
        assert_eq!(store.get("price").await.unwrap().as_deref(), Some("43"));

        store.delete("price").await.unwrap();
        assert!(store.get("price").await.unwrap().is_none());
        store.delete("price").await.unwrap();
    }

    #[tokio::test]
    async fn test_put_leaves_no_temp_files() {
        let (store, _temp_dir) = open_test_store().await;
        store.put("a/b", "1".to_string()).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(store.store_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a%2Fb.json".to_string()]);
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let (store, _temp_dir) = open_test_store().await;
        for key in ["a", "b", "c"] {
            store.put(key, "1".to_string()).await.unwrap();
        }
        assert_eq!(store.len().await.unwrap(), 3);

        store.clear().await.unwrap();

        assert_eq!(store.len().await.unwrap(), 0);
        assert!(store.get("a").await.unwrap().is_none());
    }
}
