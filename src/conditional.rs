//! C8: the conditional request builder (spec.md §4.3) — turns a client
//! request plus a chosen stored entry into a validator-bearing forward.

use crate::date::CacheControl;
use crate::entry::EntryCommon;
use crate::headers::HeaderList;

/// Names of precondition headers stripped when building an unconditional
/// revalidation (spec.md §4.3 "Unconditional revalidation").
const PRECONDITION_HEADERS: &[&str] =
    &["if-match", "if-none-match", "if-modified-since", "if-unmodified-since", "if-range"];

/// Builds the conditional forward for a single chosen entry.
///
/// `request_headers` is the client's original request header set; the
/// result is a copy with validators added and, when the stored response's
/// Cache-Control requires it, `Cache-Control: max-age=0` forced so
/// intermediaries revalidate end-to-end (spec.md §4.3 rule 4).
pub fn build_conditional_request(
    request_headers: &HeaderList,
    entry: &EntryCommon,
    response_cc: &CacheControl,
    shared_cache: bool,
) -> HeaderList {
    let mut out = request_headers.clone();
    if let Some(etag) = entry.headers.get("etag") {
        out.set("If-None-Match", etag.to_string());
    }
    if let Some(last_modified) = entry.headers.get("last-modified") {
        out.set("If-Modified-Since", last_modified.to_string());
    }
    if response_cc.must_revalidate() || (shared_cache && response_cc.proxy_revalidate()) {
        out.set("Cache-Control", "max-age=0");
    }
    out
}

/// Builds a conditional forward across several variant candidates of the
/// same root, setting `If-None-Match` to the comma-separated list of all
/// candidates' ETags (spec.md §4.3 rule 5).
pub fn build_conditional_request_multi_variant(
    request_headers: &HeaderList,
    candidates: &[&EntryCommon],
    response_cc: &CacheControl,
    shared_cache: bool,
) -> HeaderList {
    let mut out = request_headers.clone();
    let etags: Vec<&str> = candidates.iter().filter_map(|c| c.headers.get("etag")).collect();
    if !etags.is_empty() {
        out.set("If-None-Match", etags.join(", "));
    }
    for candidate in candidates {
        if let Some(last_modified) = candidate.headers.get("last-modified") {
            out.set("If-Modified-Since", last_modified.to_string());
            break;
        }
    }
    if response_cc.must_revalidate() || (shared_cache && response_cc.proxy_revalidate()) {
        out.set("Cache-Control", "max-age=0");
    }
    out
}

/// Builds an unconditional revalidation request: strips all precondition
/// headers and forces `Cache-Control: no-cache`. Used when a prior 304
/// came back with a `Date` older than the cached entry's (spec.md §4.3).
pub fn build_unconditional_revalidation(request_headers: &HeaderList) -> HeaderList {
    let mut out = request_headers.clone();
    for name in PRECONDITION_HEADERS {
        out.remove(name);
    }
    out.set("Cache-Control", "no-cache");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn entry_with(etag: Option<&str>, last_modified: Option<&str>) -> EntryCommon {
        let mut headers = HeaderList::new();
        if let Some(e) = etag {
            headers.set("ETag", e.to_string());
        }
        if let Some(lm) = last_modified {
            headers.set("Last-Modified", lm.to_string());
        }
        let now = SystemTime::now();
        EntryCommon {
            request_instant: now,
            response_instant: now,
            status_code: 200,
            headers,
            request_method: Some("GET".into()),
            request_uri: "http://example.com/".into(),
        }
    }

    #[test]
    fn adds_both_validators_when_present() {
        let entry = entry_with(Some("\"e1\""), Some("Tue, 01 Jan 2020 00:00:00 GMT"));
        let req = HeaderList::new();
        let cc = CacheControl::parse([]);
        let built = build_conditional_request(&req, &entry, &cc, true);
        assert_eq!(built.get("if-none-match"), Some("\"e1\""));
        assert_eq!(built.get("if-modified-since"), Some("Tue, 01 Jan 2020 00:00:00 GMT"));
    }

    #[test]
    fn must_revalidate_forces_max_age_zero() {
        let entry = entry_with(Some("\"e1\""), None);
        let req = HeaderList::new();
        let cc = CacheControl::parse(["must-revalidate"]);
        let built = build_conditional_request(&req, &entry, &cc, true);
        assert_eq!(built.get("cache-control"), Some("max-age=0"));
    }

    #[test]
    fn multi_variant_joins_etags() {
        let a = entry_with(Some("\"a\""), None);
        let b = entry_with(Some("\"b\""), None);
        let req = HeaderList::new();
        let cc = CacheControl::parse([]);
        let built = build_conditional_request_multi_variant(&req, &[&a, &b], &cc, true);
        assert_eq!(built.get("if-none-match"), Some("\"a\", \"b\""));
    }

    #[test]
    fn unconditional_revalidation_strips_preconditions() {
        let mut req = HeaderList::new();
        req.append("If-None-Match", "\"e1\"");
        req.append("If-Modified-Since", "x");
        req.append("Accept", "text/html");
        let built = build_unconditional_revalidation(&req);
        assert!(!built.contains("if-none-match"));
        assert!(!built.contains("if-modified-since"));
        assert!(built.contains("accept"));
        assert_eq!(built.get("cache-control"), Some("no-cache"));
    }
}
