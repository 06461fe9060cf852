//! C5: the storage backend protocol — a key/bytes-or-entry map with
//! CAS-guarded updates, pluggable over in-memory and serializing
//! implementations. Grounded on the teacher's `CacheManager` async trait
//! (`http-cache/src/lib.rs`), generalized with an `update` CAS operation
//! and `bulk_get` per spec.md §4.6.

pub mod file;
pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::entry::CacheEntry;
use crate::error::Result;

/// Minimum number of CAS retry attempts a conforming backend must offer
/// before raising [`crate::error::CacheError::UpdateConflict`]
/// (spec.md §4.6).
pub const MIN_CAS_RETRIES: u32 = 3;

/// A mutation function passed to [`StorageBackend::update`]. Receives the
/// entry currently stored at the key (`None` if absent) and returns the
/// entry that should replace it, or `None` to leave the key untouched and
/// make the update a no-op. Must be side-effect-free and deterministic
/// with respect to its input (spec.md §9 "CAS retry"), since a backend
/// may invoke it more than once across retries.
pub type UpdateFn = Box<dyn FnMut(Option<&CacheEntry>) -> Option<CacheEntry> + Send>;

/// Pluggable key -> entry storage with compare-and-swap updates.
///
/// Implementations may hold entries in memory or serialize them to an
/// external store (file, remote cache); the trait makes no promise about
/// persistence across process restarts.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Reads the entry at `key`, or `Ok(None)` on a clean miss. Backend
    /// I/O failures surface as `Err`; the executor treats them as misses.
    async fn get(&self, key: &str) -> Result<Option<Arc<CacheEntry>>>;

    /// Unconditionally writes `entry` at `key`, replacing any prior value.
    async fn put(&self, key: &str, entry: CacheEntry) -> Result<()>;

    /// Removes `key`, if present. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Reads the current entry, invokes `f` with it, and attempts to
    /// write the result back conditioned on no other writer having
    /// changed the key in between. Retries up to [`MIN_CAS_RETRIES`]
    /// times on conflict before raising
    /// [`crate::error::CacheError::UpdateConflict`]. Returns the entry now
    /// stored at the key (the new value, or the prior value if `f`
    /// returned `None`).
    async fn update(&self, key: &str, f: UpdateFn) -> Result<Option<Arc<CacheEntry>>>;

    /// Best-effort batch read: keys with no stored entry are simply
    /// absent from the result map.
    async fn bulk_get(&self, keys: &[String]) -> Result<HashMap<String, Arc<CacheEntry>>>;
}
