//! C1: HTTP-date parsing, Cache-Control directive parsing, and ETag parsing.

use std::collections::HashMap;
use std::time::SystemTime;

/// Parses an HTTP-date, trying IMF-fixdate (RFC 5322), RFC 850, and ANSI C
/// `asctime` in that order, as required by spec.md §4.1 ("Tie-breaks and
/// edge cases"). Returns `None` for any value that doesn't parse under any
/// of the three formats.
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    httpdate::parse_http_date(value.trim()).ok()
}

/// Formats an instant as IMF-fixdate, the only format the core emits
/// (spec.md §6 "Wire formats": "emit only IMF-fixdate when writing").
pub fn format_http_date(when: SystemTime) -> String {
    httpdate::fmt_http_date(when)
}

/// A parsed `Cache-Control` directive list: directive name (lowercased) to
/// an optional value. Directives with no `=value` map to `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl(HashMap<String, Option<String>>);

impl CacheControl {
    /// Parses one or more `Cache-Control` header values (a header may be
    /// repeated; all occurrences are folded into one directive list, as
    /// `HeaderMap::get_all` would be folded upstream of this call).
    pub fn parse<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut map = HashMap::new();
        for value in values {
            for part in value.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                let mut kv = part.splitn(2, '=');
                let name = kv.next().unwrap_or("").trim().to_ascii_lowercase();
                if name.is_empty() {
                    continue;
                }
                let raw_value = kv.next().map(str::trim);
                let unquoted = raw_value.map(|v| v.trim_matches('"').to_string());
                map.insert(name, unquoted);
            }
        }
        CacheControl(map)
    }

    /// Whether a directive (with or without a value) is present.
    pub fn has(&self, directive: &str) -> bool {
        self.0.contains_key(directive)
    }

    /// The value of a directive, if it carries one.
    pub fn value(&self, directive: &str) -> Option<&str> {
        self.0.get(directive).and_then(|v| v.as_deref())
    }

    /// The value of a directive parsed as seconds (`max-age`, `s-maxage`,
    /// `min-fresh`, `max-stale`, `stale-while-revalidate`, ...).
    pub fn seconds(&self, directive: &str) -> Option<u64> {
        self.value(directive).and_then(|v| v.parse().ok())
    }

    /// `max-stale` is special: it may be present with no value, meaning
    /// "any staleness is acceptable". This distinguishes that from an
    /// absent directive.
    pub fn max_stale(&self) -> Option<Option<u64>> {
        self.0.get("max-stale").map(|v| v.as_deref().and_then(|s| s.parse().ok()))
    }

    /// Whether `no-store` is present.
    pub fn no_store(&self) -> bool {
        self.has("no-store")
    }

    /// Whether `no-cache` is present.
    pub fn no_cache(&self) -> bool {
        self.has("no-cache")
    }

    /// Whether `must-revalidate` is present.
    pub fn must_revalidate(&self) -> bool {
        self.has("must-revalidate")
    }

    /// Whether `proxy-revalidate` is present.
    pub fn proxy_revalidate(&self) -> bool {
        self.has("proxy-revalidate")
    }

    /// Whether `public` is present.
    pub fn public(&self) -> bool {
        self.has("public")
    }

    /// Whether `private` is present.
    pub fn private(&self) -> bool {
        self.has("private")
    }

    /// The `max-age` directive's value in seconds, if present and valid.
    pub fn max_age(&self) -> Option<u64> {
        self.seconds("max-age")
    }

    /// The `s-maxage` directive's value in seconds, if present and valid.
    pub fn s_maxage(&self) -> Option<u64> {
        self.seconds("s-maxage")
    }

    /// The `min-fresh` directive's value in seconds, if present and valid.
    pub fn min_fresh(&self) -> Option<u64> {
        self.seconds("min-fresh")
    }
}

/// An HTTP validator extracted from an `ETag` header: its opaque tag text
/// (including the surrounding quotes) and whether it's a weak validator
/// (`W/"..."`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ETag {
    /// Whether this is a weak validator (`W/"..."`).
    pub weak: bool,
    /// The opaque tag text, including the surrounding quotes.
    pub tag: String,
}

impl ETag {
    /// Parses a single `ETag` header value.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Some(rest) = value.strip_prefix("W/") {
            Some(ETag { weak: true, tag: rest.trim().to_string() })
        } else if value.starts_with('"') {
            Some(ETag { weak: false, tag: value.to_string() })
        } else {
            None
        }
    }

    /// Renders the validator back to wire form, e.g. `W/"abc"` or `"abc"`.
    pub fn to_wire(&self) -> String {
        if self.weak {
            format!("W/{}", self.tag)
        } else {
            self.tag.clone()
        }
    }

    /// Strong comparison per RFC 9110 §8.8.3.2: equal only if neither is
    /// weak and the opaque tags match.
    pub fn strong_matches(&self, other: &ETag) -> bool {
        !self.weak && !other.weak && self.tag == other.tag
    }

    /// Weak comparison: opaque tags match regardless of weak/strong.
    pub fn weak_matches(&self, other: &ETag) -> bool {
        self.tag == other.tag
    }
}
