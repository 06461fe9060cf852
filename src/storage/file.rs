//! A file-backed [`StorageBackend`]: the reference "non-in-memory"
//! implementation spec.md §2 describes for C5 ("Pluggable (in-memory,
//! serialized/remote)"), and the one real consumer of the C6 entry
//! serializer (spec.md: "Used only by non-in-memory backends").
//!
//! Grounded on the teacher's `http-cache-manager-cacache` crate (disk-
//! backed, keyed storage behind the same `CacheManager` trait as
//! `MokaManager`), adapted to this crate's own CAS trait and bit-stable
//! [`crate::serializer`] format rather than `cacache`'s content-addressed
//! scheme.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::warn;

use crate::entry::CacheEntry;
use crate::error::{CacheError, Result};
use crate::serializer;

use super::{StorageBackend, UpdateFn, MIN_CAS_RETRIES};

/// Stores each entry as a standalone file under `root`, named by a hex
/// encoding of its storage key (arbitrary cache keys are not valid path
/// segments on every platform — `:`, `?`, `{`, `}` all appear in ours).
#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
    tokens: Mutex<HashMap<String, u64>>,
}

impl FileBackend {
    /// Opens (creating if necessary) a file-backed store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| CacheError::StorageUnavailable { key: String::new(), reason: e.to_string() })?;
        Ok(FileBackend { root, tokens: Mutex::new(HashMap::new()) })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut hex = String::with_capacity(key.len() * 2);
        for byte in key.as_bytes() {
            hex.push_str(&format!("{byte:02x}"));
        }
        self.root.join(format!("{hex}.hce"))
    }

    fn read(&self, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => match serializer::deserialize(key, &bytes) {
                Ok(entry) => Ok(Some(entry)),
                Err(e) => {
                    warn!("corrupt entry at {}: {e}, treating as miss", path.display());
                    Ok(None)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(CacheError::StorageUnavailable { key: key.to_string(), reason: e.to_string() })
            }
        }
    }

    fn write(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let bytes = serializer::serialize(key, entry);
        write_atomically(&self.path_for(key), &bytes)
            .map_err(|e| CacheError::StorageUnavailable { key: key.to_string(), reason: e.to_string() })
    }

    fn remove_file(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::StorageUnavailable { key: key.to_string(), reason: e.to_string() }),
        }
    }

    fn lock_tokens(&self) -> std::sync::MutexGuard<'_, HashMap<String, u64>> {
        self.tokens.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Writes `bytes` to `path` via a temp-file-then-rename so a reader never
/// observes a half-written entry.
fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("hce.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Option<Arc<CacheEntry>>> {
        Ok(self.read(key)?.map(Arc::new))
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> Result<()> {
        self.write(key, &entry)?;
        let mut tokens = self.lock_tokens();
        let next = tokens.get(key).map(|t| t + 1).unwrap_or(0);
        tokens.insert(key.to_string(), next);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.remove_file(key)?;
        self.lock_tokens().remove(key);
        Ok(())
    }

    async fn update(&self, key: &str, mut f: UpdateFn) -> Result<Option<Arc<CacheEntry>>> {
        for attempt in 0..MIN_CAS_RETRIES {
            let observed_token = self.lock_tokens().get(key).copied();
            let current = self.read(key)?;
            let proposed = f(current.as_ref());
            let Some(new_entry) = proposed else {
                return Ok(current.map(Arc::new));
            };
            let mut tokens = self.lock_tokens();
            if tokens.get(key).copied() != observed_token {
                warn!("CAS conflict on {key:?}, retrying (attempt {attempt})");
                continue;
            }
            let next = observed_token.map(|t| t + 1).unwrap_or(0);
            tokens.insert(key.to_string(), next);
            drop(tokens);
            self.write(key, &new_entry)?;
            return Ok(Some(Arc::new(new_entry)));
        }
        Err(CacheError::UpdateConflict { key: key.to_string(), attempts: MIN_CAS_RETRIES })
    }

    async fn bulk_get(&self, keys: &[String]) -> Result<HashMap<String, Arc<CacheEntry>>> {
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = self.read(key)? {
                out.insert(key.clone(), Arc::new(entry));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ResourceEntry;
    use crate::headers::HeaderList;
    use crate::resource::Resource;
    use std::time::SystemTime;

    fn entry(body: &str) -> CacheEntry {
        let now = SystemTime::now();
        CacheEntry::Resource(ResourceEntry::new(
            now,
            now,
            200,
            HeaderList::new(),
            Some("GET".into()),
            "http://example.com/".into(),
            Some(Resource::from_bytes(body.as_bytes().to_vec())),
        ))
    }

    #[tokio::test]
    async fn put_then_get_roundtrips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend.put("k", entry("a")).await.unwrap();
        let got = backend.get("k").await.unwrap().unwrap();
        assert_eq!(got.as_resource().unwrap().resource.as_ref().unwrap().bytes().unwrap(), "a");
    }

    #[tokio::test]
    async fn missing_key_is_a_clean_miss() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        assert!(backend.get("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_deletes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend.put("k", entry("a")).await.unwrap();
        backend.remove("k").await.unwrap();
        assert!(backend.get("k").await.unwrap().is_none());
        assert!(!backend.path_for("k").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_treated_as_a_miss_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        fs::write(backend.path_for("k"), b"not a valid entry").unwrap();
        assert!(backend.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_on_missing_key_creates_it() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        let result = backend
            .update("k", Box::new(|current| {
                assert!(current.is_none());
                Some(entry("created"))
            }))
            .await
            .unwrap();
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn bulk_get_omits_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend.put("k1", entry("a")).await.unwrap();
        let result = backend.bulk_get(&["k1".to_string(), "k2".to_string()]).await.unwrap();
        assert_eq!(result.len(), 1);
        assert!(result.contains_key("k1"));
    }
}
