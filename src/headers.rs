//! An ordered header multimap with case-insensitive lookup and
//! case-preserving emission (spec.md §9 "Headers").
//!
//! Deliberately not a `HashMap`: the spec requires that multiple
//! occurrences of the same header name are preserved in order, and that
//! the overall sequence of distinct header names is not silently
//! reordered the way a hash-keyed collection would.

use std::fmt;

/// Header names whose semantics are scoped to a single transport
/// connection and which must never be persisted in a cache entry
/// (spec.md §3.1 "Invariants").
pub const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// An ordered sequence of `(name, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList(Vec<(String, String)>);

impl HeaderList {
    /// An empty header list.
    pub fn new() -> Self {
        HeaderList(Vec::new())
    }

    /// Appends a header occurrence, preserving any existing occurrences of
    /// the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Removes every occurrence of `name`, then appends a single fresh
    /// occurrence.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.append(name, value);
    }

    /// Removes every occurrence of `name` (case-insensitive). Returns the
    /// number of occurrences removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.0.len();
        self.0.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        before - self.0.len()
    }

    /// The first occurrence's value, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    /// All occurrences' values, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0.iter().filter(move |(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    /// Whether any occurrence of `name` is present (case-insensitive).
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Iterates over every `(name, value)` pair in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// The number of header occurrences (not distinct names).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this list holds no occurrences at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The canonical multi-header value: all occurrences joined with
    /// `","`, trimming inner whitespace from each comma-separated token,
    /// per spec.md §3.2's variant-key value rule.
    pub fn canonical_value(&self, name: &str) -> Option<String> {
        let mut tokens = Vec::new();
        let mut found = false;
        for value in self.get_all(name) {
            found = true;
            for token in value.split(',') {
                let token = token.trim();
                if !token.is_empty() {
                    tokens.push(token.to_string());
                }
            }
        }
        if found {
            Some(tokens.join(","))
        } else {
            None
        }
    }

    /// Removes hop-by-hop headers and any header named in the `Connection`
    /// header's value (spec.md §3.1, §4.2). `Connection` itself is always
    /// stripped as part of `HOP_BY_HOP`.
    pub fn strip_hop_by_hop(&mut self) {
        let connection_listed: Vec<String> = self
            .get_all("connection")
            .flat_map(|v| v.split(','))
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        self.0.retain(|(n, _)| {
            let lower = n.to_ascii_lowercase();
            !HOP_BY_HOP.contains(&lower.as_str()) && !connection_listed.contains(&lower)
        });
    }

    /// Builds a header list directly from already-ordered pairs, with no
    /// normalization beyond what the caller already applied.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        HeaderList(pairs)
    }

    /// Borrows the underlying `(name, value)` pairs in insertion order.
    pub fn as_pairs(&self) -> &[(String, String)] {
        &self.0
    }
}

impl fmt::Display for HeaderList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (n, v) in &self.0 {
            writeln!(f, "{n}: {v}")?;
        }
        Ok(())
    }
}

impl FromIterator<(String, String)> for HeaderList {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        HeaderList(iter.into_iter().collect())
    }
}
