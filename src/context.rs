//! The context code stamped onto every response the executor returns
//! (spec.md §4.5, §6).

use std::fmt;

/// How a response returned by [`crate::executor::execute`] was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextCode {
    /// Served directly from a fresh (or stale-but-usable) cache entry.
    CacheHit,
    /// No usable entry was found; the request was forwarded unchanged.
    CacheMiss,
    /// A conditional forward revalidated (or replaced) a stored entry.
    Validated,
    /// Synthesized by the cache module itself (e.g. a 504 on
    /// `only-if-cached`, or a short-circuit for a malformed request).
    CacheModuleResponse,
}

impl fmt::Display for ContextCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContextCode::CacheHit => "CACHE_HIT",
            ContextCode::CacheMiss => "CACHE_MISS",
            ContextCode::Validated => "VALIDATED",
            ContextCode::CacheModuleResponse => "CACHE_MODULE_RESPONSE",
        };
        f.write_str(s)
    }
}
