//! C3: `Resource`, the storage-agnostic representation body (spec.md §3.1).
//!
//! Grounded on the teacher's `StreamingBody` (`body.rs`): a small enum over
//! backing representations behind one read API, generalized here to drop
//! the `http_body::Body` trait machinery (the core doesn't move bytes over
//! a wire itself) in favor of a synchronous length/bytes/release surface a
//! storage backend can implement against.

use bytes::Bytes;
use std::sync::Arc;

/// An opaque, storage-agnostic body for a cached representation.
///
/// `Resource` never exposes where its bytes live: a backend may hold them
/// in memory, memory-mapped, or read lazily from disk. Cloning a
/// `Resource` is always cheap (an `Arc` bump), matching the teacher's
/// `Bytes`-backed `Buffered` variant.
#[derive(Debug, Clone)]
pub struct Resource {
    inner: Inner,
}

#[derive(Debug, Clone)]
enum Inner {
    Bytes(Bytes),
    Released,
}

impl Resource {
    /// Wraps an in-memory byte buffer.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Resource { inner: Inner::Bytes(bytes.into()) }
    }

    /// A zero-length body.
    pub fn empty() -> Self {
        Resource { inner: Inner::Bytes(Bytes::new()) }
    }

    /// The body's length in bytes, or `None` if it has been released.
    pub fn len(&self) -> Option<usize> {
        match &self.inner {
            Inner::Bytes(b) => Some(b.len()),
            Inner::Released => None,
        }
    }

    /// Whether the body is resident and zero-length. A released body is
    /// not considered empty.
    pub fn is_empty(&self) -> bool {
        self.len().unwrap_or(0) == 0
    }

    /// Borrows the body's bytes, if still resident.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.inner {
            Inner::Bytes(b) => Some(b),
            Inner::Released => None,
        }
    }

    /// An owned, cheaply-cloned handle to the body's bytes.
    pub fn bytes(&self) -> Option<Bytes> {
        self.as_bytes().cloned()
    }

    /// Drops the underlying bytes explicitly. A storage backend calls this
    /// when an entry is evicted so that any shared `Arc` to the payload
    /// stops pinning it in memory once all other clones are also
    /// released.
    pub fn release(&mut self) {
        self.inner = Inner::Released;
    }

    /// Whether [`release`](Self::release) has already been called.
    pub fn is_released(&self) -> bool {
        matches!(self.inner, Inner::Released)
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        match (&self.inner, &other.inner) {
            (Inner::Bytes(a), Inner::Bytes(b)) => a == b,
            (Inner::Released, Inner::Released) => true,
            _ => false,
        }
    }
}

impl Eq for Resource {}

/// A reference-counted handle shared between an entry and any in-flight
/// reader, so a concurrent eviction can release storage without
/// invalidating a reader that already started streaming it.
pub type SharedResource = Arc<Resource>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_and_bytes_roundtrip() {
        let r = Resource::from_bytes(Bytes::from_static(b"hello"));
        assert_eq!(r.len(), Some(5));
        assert_eq!(r.bytes().unwrap(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn release_drops_bytes() {
        let mut r = Resource::from_bytes(Bytes::from_static(b"hello"));
        r.release();
        assert!(r.is_released());
        assert_eq!(r.len(), None);
    }

    #[test]
    fn clone_is_independent_of_release() {
        let r = Resource::from_bytes(Bytes::from_static(b"hello"));
        let mut clone = r.clone();
        clone.release();
        assert!(clone.is_released());
        assert!(!r.is_released());
    }
}
