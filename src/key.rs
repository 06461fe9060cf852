//! C2: cache key generation (spec.md §3.2).
//!
//! Two keys are derived: a *root key*, canonical per-URI, and a *variant
//! key*, derived from the Vary-selecting request headers. The two
//! concatenate (`variant_key || root_key`) to form a *storage key* for a
//! negotiated representation (spec.md §3.2 "Storage key").

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use url::Url;

use crate::headers::HeaderList;

/// Characters the final key string must percent-encode: anything outside
/// the unreserved set, mirroring the "percent-encoded for reserved
/// characters in the final key string" rule for variant keys.
const KEY_RESERVED: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'%')
    .add(b'{')
    .add(b'}')
    .add(b'=')
    .add(b'&')
    .add(b'<')
    .add(b'>')
    .add(b'`');

/// Builds the canonical root key for an effective request URI.
///
/// - scheme and host are lowercased
/// - the port is always written explicitly, substituting the scheme's
///   default (80/443) when the URI omits it
/// - the path has `.`/`..` segments resolved and is percent-unreserved
///   decoded
/// - the fragment is stripped; the query, if present, is left intact
pub fn root_key(uri: &Url) -> String {
    let scheme = uri.scheme().to_ascii_lowercase();
    let host = uri.host_str().unwrap_or("").to_ascii_lowercase();
    let port = uri.port().unwrap_or_else(|| default_port(&scheme));
    let path = normalize_path(uri.path());
    let mut key = format!("{scheme}://{host}:{port}{path}");
    if let Some(query) = uri.query() {
        key.push('?');
        key.push_str(query);
    }
    key
}

fn default_port(scheme: &str) -> u16 {
    match scheme {
        "https" => 443,
        _ => 80,
    }
}

/// Resolves `.`/`..` segments and percent-decodes unreserved characters in
/// a URI path.
fn normalize_path(path: &str) -> String {
    let decoded = percent_decode_unreserved(path);
    let absolute = decoded.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    let mut normalized = String::new();
    if absolute {
        normalized.push('/');
    }
    normalized.push_str(&segments.join("/"));
    if normalized.is_empty() {
        normalized.push('/');
    }
    normalized
}

/// Decodes `%XX` sequences that represent an unreserved character
/// (`ALPHA / DIGIT / "-" / "." / "_" / "~"`), leaving every other
/// percent-escape untouched.
fn percent_decode_unreserved(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3]) {
                if let Ok(value) = u8::from_str_radix(hex, 16) {
                    if is_unreserved(value) {
                        out.push(value as char);
                        i += 3;
                        continue;
                    }
                }
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

/// Headers whose value is a case-insensitive token (or token list) for the
/// purposes of variant-key canonicalization; their values are lowercased.
/// Header names outside this set keep their original casing, since they
/// may carry case-sensitive content (e.g. `Cookie`).
const TOKEN_LIST_HEADERS: &[&str] =
    &["accept-encoding", "accept-language", "accept", "accept-charset"];

/// Builds the variant key for the selecting headers named by `vary_names`
/// (already lowercased, the caller sorts them), pulled from `request`.
pub fn variant_key(vary_names: &[String], request: &HeaderList) -> String {
    let mut names: Vec<String> = vary_names.to_vec();
    names.sort();
    names.dedup();
    let mut parts = Vec::with_capacity(names.len());
    for name in &names {
        let mut value = request.canonical_value(name).unwrap_or_default();
        if TOKEN_LIST_HEADERS.contains(&name.as_str()) {
            value = value.to_ascii_lowercase();
        }
        let encoded: String = utf8_percent_encode(&value, KEY_RESERVED).collect();
        parts.push(format!("{name}={encoded}"));
    }
    format!("{{{}}}", parts.join("&"))
}

/// Storage key for a negotiated variant: variant key concatenated with
/// root key (spec.md §3.2 "Storage key").
pub fn storage_key(variant_key: &str, root_key: &str) -> String {
    format!("{variant_key}{root_key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn root_key_lowercases_scheme_and_host() {
        let a = root_key(&url("HTTP://Example.COM/Path"));
        let b = root_key(&url("http://example.com/Path"));
        assert_eq!(a, b);
    }

    #[test]
    fn root_key_elaborates_default_port() {
        let with_port = root_key(&url("http://example.com:80/x"));
        let without_port = root_key(&url("http://example.com/x"));
        assert_eq!(with_port, without_port);
        assert!(with_port.contains(":80"));
    }

    #[test]
    fn root_key_resolves_dot_segments() {
        let a = root_key(&url("http://example.com/a/b/../c"));
        let b = root_key(&url("http://example.com/a/c"));
        assert_eq!(a, b);
    }

    #[test]
    fn root_key_strips_fragment_keeps_query() {
        let a = root_key(&url("http://example.com/x?y=1#frag"));
        let b = root_key(&url("http://example.com/x?y=1"));
        assert_eq!(a, b);
        assert!(a.contains("?y=1"));
    }

    #[test]
    fn variant_key_is_order_and_case_insensitive() {
        let mut h1 = HeaderList::new();
        h1.append("Accept-Encoding", "GZIP");
        h1.append("Accept-Language", "en");
        let mut h2 = HeaderList::new();
        h2.append("accept-language", "en");
        h2.append("accept-encoding", "gzip");
        let names = vec!["accept-language".to_string(), "accept-encoding".to_string()];
        assert_eq!(variant_key(&names, &h1), variant_key(&names, &h2));
    }
}
