//! Configuration recognized by the caching core (spec.md §6).
//!
//! Grounded on the teacher-adjacent `Config` builder in
//! `CosmicHorrorDev-http-cache-policy/src/config.rs`: a `const fn default()`
//! plus chainable setters, rather than a `Default`-derived struct, so the
//! common no-argument construction stays `const`.

/// Tunables governing storability, freshness heuristics, and the
/// executor's worker dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// Whether this cache serves multiple end users. Governs the
    /// `private`/`Authorization`/`s-maxage`/`proxy-revalidate` rules
    /// (spec.md §4.1, §4.2).
    pub shared_cache: bool,
    /// Responses larger than this are not stored.
    pub max_object_size_bytes: u64,
    /// Hint passed through to the storage backend; the core does not
    /// enforce it itself.
    pub max_entries: u64,
    /// If `false`, heuristic freshness lifetime (spec.md §4.1 step 4) is
    /// never applied; an entry with no explicit freshness is always
    /// treated as having zero freshness lifetime.
    pub heuristic_caching_enabled: bool,
    /// Fraction of `Date - Last-Modified` used as heuristic freshness
    /// lifetime.
    pub heuristic_coefficient: f32,
    /// Heuristic freshness lifetime, in seconds, used when
    /// `Last-Modified` is absent but the status is heuristically
    /// cacheable.
    pub heuristic_default_lifetime_secs: u64,
    /// Whether 303 See Other responses may be cached. RFC 9111 permits
    /// but does not require it.
    pub allow_303_caching: bool,
    /// If non-zero, the executor may dispatch stale-while-revalidate and
    /// other asynchronous revalidation work to a pool of this many
    /// workers instead of performing it inline.
    pub asynchronous_workers: u32,
}

impl Config {
    /// The documented defaults: a shared cache, an 8 KiB object size cap,
    /// heuristic caching enabled with a 0.1 coefficient, and no
    /// asynchronous worker pool.
    pub const fn default() -> Self {
        Config {
            shared_cache: true,
            max_object_size_bytes: 8 * 1024,
            max_entries: 0,
            heuristic_caching_enabled: true,
            heuristic_coefficient: 0.1,
            heuristic_default_lifetime_secs: 0,
            allow_303_caching: false,
            asynchronous_workers: 0,
        }
    }

    /// Sets whether this cache serves multiple end users.
    pub const fn shared_cache(mut self, shared_cache: bool) -> Self {
        self.shared_cache = shared_cache;
        self
    }

    /// Sets the maximum storable response body size, in bytes.
    pub const fn max_object_size_bytes(mut self, bytes: u64) -> Self {
        self.max_object_size_bytes = bytes;
        self
    }

    /// Sets the entry-count hint passed through to the storage backend.
    pub const fn max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Enables or disables heuristic freshness lifetime computation.
    pub const fn heuristic_caching_enabled(mut self, enabled: bool) -> Self {
        self.heuristic_caching_enabled = enabled;
        self
    }

    /// Sets the fraction of `Date - Last-Modified` used as heuristic
    /// freshness lifetime.
    pub const fn heuristic_coefficient(mut self, coefficient: f32) -> Self {
        self.heuristic_coefficient = coefficient;
        self
    }

    /// Sets the heuristic freshness lifetime used when `Last-Modified` is
    /// absent but the status is heuristically cacheable.
    pub const fn heuristic_default_lifetime_secs(mut self, secs: u64) -> Self {
        self.heuristic_default_lifetime_secs = secs;
        self
    }

    /// Sets whether 303 See Other responses may be cached.
    pub const fn allow_303_caching(mut self, allow: bool) -> Self {
        self.allow_303_caching = allow;
        self
    }

    /// Sets the size of the asynchronous revalidation worker pool; `0`
    /// performs all revalidation inline.
    pub const fn asynchronous_workers(mut self, workers: u32) -> Self {
        self.asynchronous_workers = workers;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::default()
    }
}
