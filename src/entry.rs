//! C4: the cache entry model (spec.md §3.1) — immutable records of either
//! a resource (a stored representation) or a variant root (a placeholder
//! enumerating known variants of a negotiated resource).

use std::collections::BTreeMap;
use std::time::SystemTime;

use crate::headers::HeaderList;
use crate::resource::Resource;

/// Attributes shared by both entry kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryCommon {
    /// When the request that produced this entry left the cache.
    pub request_instant: SystemTime,
    /// When the response was received by the cache. Always `>= request_instant`.
    pub response_instant: SystemTime,
    /// The response's HTTP status code.
    pub status_code: u16,
    /// Hop-by-hop and Connection-listed headers already stripped.
    pub headers: HeaderList,
    /// The request method that produced this entry, if known (absent for
    /// legacy entries written before this field existed).
    pub request_method: Option<String>,
    /// The effective request URI used to build this entry.
    pub request_uri: String,
}

/// An immutable cache entry: either a stored representation or a
/// placeholder enumerating that resource's known variants.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    /// A stored representation for a specific negotiated variant.
    Resource(ResourceEntry),
    /// A placeholder enumerating a resource's known variants.
    VariantRoot(VariantRoot),
}

/// A stored representation for a specific negotiated variant (or the only
/// representation, if the resource has no `Vary`).
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceEntry {
    /// Attributes shared with [`VariantRoot`].
    pub common: EntryCommon,
    /// Absent for bodyless statuses (e.g. 204) or a 304-refreshed entry
    /// that never had a body cached.
    pub resource: Option<Resource>,
}

/// A placeholder at a resource's root key enumerating its variants.
/// Carries no body of its own.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantRoot {
    /// Attributes shared with [`ResourceEntry`].
    pub common: EntryCommon,
    /// Variant key -> storage key. Never empty.
    pub variants: BTreeMap<String, String>,
}

impl CacheEntry {
    /// The attributes shared by both entry kinds, regardless of variant.
    pub fn common(&self) -> &EntryCommon {
        match self {
            CacheEntry::Resource(r) => &r.common,
            CacheEntry::VariantRoot(v) => &v.common,
        }
    }

    /// Whether this entry is a variant root rather than a stored resource.
    pub fn is_variant_root(&self) -> bool {
        matches!(self, CacheEntry::VariantRoot(_))
    }

    /// Borrows the entry as a [`ResourceEntry`], if it is one.
    pub fn as_resource(&self) -> Option<&ResourceEntry> {
        match self {
            CacheEntry::Resource(r) => Some(r),
            CacheEntry::VariantRoot(_) => None,
        }
    }

    /// Borrows the entry as a [`VariantRoot`], if it is one.
    pub fn as_variant_root(&self) -> Option<&VariantRoot> {
        match self {
            CacheEntry::VariantRoot(v) => Some(v),
            CacheEntry::Resource(_) => None,
        }
    }
}

impl ResourceEntry {
    /// Builds a resource entry, stripping hop-by-hop headers and enforcing
    /// the ordering invariant on the two instants.
    ///
    /// Panics if `response_instant < request_instant`: callers are
    /// expected to have already validated these against wall-clock reality
    /// before constructing an entry.
    pub fn new(
        request_instant: SystemTime,
        response_instant: SystemTime,
        status_code: u16,
        mut headers: HeaderList,
        request_method: Option<String>,
        request_uri: String,
        resource: Option<Resource>,
    ) -> Self {
        assert!(
            response_instant >= request_instant,
            "response_instant must not precede request_instant"
        );
        headers.strip_hop_by_hop();
        ResourceEntry {
            common: EntryCommon {
                request_instant,
                response_instant,
                status_code,
                headers,
                request_method,
                request_uri,
            },
            resource,
        }
    }
}

impl VariantRoot {
    /// Builds a variant root. Panics if `variants` is empty: a variant
    /// root enumerating zero variants is never a valid state to persist
    /// (spec.md §3.1 "Invariants": "Must be non-empty").
    pub fn new(
        request_instant: SystemTime,
        response_instant: SystemTime,
        status_code: u16,
        mut headers: HeaderList,
        request_method: Option<String>,
        request_uri: String,
        variants: BTreeMap<String, String>,
    ) -> Self {
        assert!(!variants.is_empty(), "variant root must enumerate at least one variant");
        headers.strip_hop_by_hop();
        VariantRoot {
            common: EntryCommon {
                request_instant,
                response_instant,
                status_code,
                headers,
                request_method,
                request_uri,
            },
            variants,
        }
    }

    /// Returns a copy of this root with `variant_key` mapped to
    /// `storage_key`, growing the enumerated variant set. Used when a new
    /// variant is negotiated for an existing root (spec.md §3.1
    /// "Lifecycle").
    pub fn with_variant(&self, variant_key: String, storage_key: String) -> Self {
        let mut variants = self.variants.clone();
        variants.insert(variant_key, storage_key);
        VariantRoot { common: self.common.clone(), variants }
    }
}
