//! An in-memory [`StorageBackend`], suitable as the default backend and
//! as the reference implementation against which serializing backends are
//! tested. Grounded on the teacher's `MokaManager` shape
//! (`http-cache/src/managers/moka.rs`): a map behind a single lock,
//! entries reference-counted so readers that already captured one keep it
//! alive past an eviction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::warn;

use crate::entry::CacheEntry;
use crate::error::{CacheError, Result};

use super::{StorageBackend, UpdateFn, MIN_CAS_RETRIES};

#[derive(Debug)]
struct Slot {
    token: u64,
    entry: Arc<CacheEntry>,
}

/// A process-local, thread-safe cache store backed by a `HashMap` behind a
/// mutex. Every slot carries a monotonically increasing token used for
/// compare-and-swap.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    slots: Mutex<HashMap<String, Slot>>,
}

impl InMemoryBackend {
    /// An empty backend.
    pub fn new() -> Self {
        InMemoryBackend { slots: Mutex::new(HashMap::new()) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Arc<CacheEntry>>> {
        Ok(self.lock().get(key).map(|slot| slot.entry.clone()))
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> Result<()> {
        let mut slots = self.lock();
        let token = slots.get(key).map(|s| s.token + 1).unwrap_or(0);
        slots.insert(key.to_string(), Slot { token, entry: Arc::new(entry) });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }

    async fn update(&self, key: &str, mut f: UpdateFn) -> Result<Option<Arc<CacheEntry>>> {
        for attempt in 0..MIN_CAS_RETRIES {
            let (observed_token, current) = {
                let slots = self.lock();
                match slots.get(key) {
                    Some(slot) => (Some(slot.token), Some(slot.entry.clone())),
                    None => (None, None),
                }
            };
            let proposed = f(current.as_deref());
            let Some(new_entry) = proposed else {
                return Ok(current);
            };
            let mut slots = self.lock();
            let still_matches = match (&observed_token, slots.get(key).map(|s| s.token)) {
                (None, None) => true,
                (Some(a), Some(b)) => *a == b,
                _ => false,
            };
            if still_matches {
                let next_token = observed_token.map(|t| t + 1).unwrap_or(0);
                let stored = Arc::new(new_entry);
                slots.insert(key.to_string(), Slot { token: next_token, entry: stored.clone() });
                return Ok(Some(stored));
            }
            warn!("CAS conflict on {key:?}, retrying (attempt {attempt})");
        }
        Err(CacheError::UpdateConflict { key: key.to_string(), attempts: MIN_CAS_RETRIES })
    }

    async fn bulk_get(&self, keys: &[String]) -> Result<HashMap<String, Arc<CacheEntry>>> {
        let slots = self.lock();
        Ok(keys
            .iter()
            .filter_map(|k| slots.get(k).map(|slot| (k.clone(), slot.entry.clone())))
            .collect())
    }
}
