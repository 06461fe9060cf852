//! C9: the cacheability filter and 304-merge algorithm (spec.md §4.2).

use crate::config::Config;
use crate::date::{parse_http_date, CacheControl};
use crate::entry::{EntryCommon, ResourceEntry};
use crate::headers::HeaderList;

/// Statuses storable by default, absent an explicit
/// `Cache-Control: max-age|s-maxage|public` override (spec.md §4.2 rule
/// 2). 206 is listed by RFC 9110 but deferred here (rule 8, spec.md §9
/// Open question).
const STATUS_CACHEABLE_BY_DEFAULT: &[u16] = &[200, 203, 204, 300, 301, 404, 405, 410, 414, 501];

/// Methods whose response semantics forbid caching outright, independent
/// of any Cache-Control directive (spec.md §4.2 rule 8).
const UNCACHEABLE_METHODS: &[&str] = &["TRACE", "CONNECT", "OPTIONS", "PUT", "DELETE"];

/// Everything [`is_storable`] needs about the exchange that isn't already
/// on the response's own headers.
#[derive(Debug, Clone, Copy)]
pub struct StorabilityContext<'a> {
    /// The request method, e.g. `"GET"`.
    pub request_method: &'a str,
    /// The request's parsed `Cache-Control`.
    pub request_cc: &'a CacheControl,
    /// Whether the request carried an `Authorization` header.
    pub request_has_authorization: bool,
    /// The response status code.
    pub status: u16,
    /// The response's parsed `Cache-Control`.
    pub response_cc: &'a CacheControl,
    /// Whether the response's `Vary` header lists `*`.
    pub vary_is_star: bool,
    /// The response body length, if known.
    pub body_len: Option<u64>,
}

/// Decides whether an origin response is storable (spec.md §4.2).
pub fn is_storable(ctx: &StorabilityContext, config: &Config) -> bool {
    let method = ctx.request_method.to_ascii_uppercase();
    if method != "GET" && method != "HEAD" {
        if !(method == "POST" && has_explicit_freshness(ctx.response_cc)) {
            return false;
        }
    }
    if UNCACHEABLE_METHODS.contains(&method.as_str()) {
        return false;
    }
    if ctx.status == 206 {
        return false;
    }
    let explicit_override = ctx.response_cc.max_age().is_some()
        || ctx.response_cc.s_maxage().is_some()
        || ctx.response_cc.public();
    if ctx.status == 303 && !config.allow_303_caching && !explicit_override {
        return false;
    }
    if !STATUS_CACHEABLE_BY_DEFAULT.contains(&ctx.status) && !explicit_override {
        return false;
    }
    if ctx.response_cc.no_store() {
        return false;
    }
    if ctx.request_cc.no_store() {
        return false;
    }
    if config.shared_cache {
        let publicly_exposed =
            ctx.response_cc.public() || ctx.response_cc.s_maxage().is_some() || ctx.response_cc.must_revalidate();
        if (ctx.response_cc.private() || ctx.request_has_authorization) && !publicly_exposed {
            return false;
        }
    }
    if ctx.vary_is_star {
        return false;
    }
    if let Some(len) = ctx.body_len {
        if len > config.max_object_size_bytes {
            return false;
        }
    }
    true
}

fn has_explicit_freshness(cc: &CacheControl) -> bool {
    cc.max_age().is_some() || cc.s_maxage().is_some() || cc.public()
}

/// Strips hop-by-hop and Connection-listed headers from a response before
/// storage. `Transfer-Encoding` is removed as part of the hop-by-hop set;
/// `Content-Length` is left untouched.
pub fn prepare_headers_for_storage(headers: &mut HeaderList) {
    headers.strip_hop_by_hop();
}

/// Whether an HTTP/1.0 response with no `Expires` and a query-bearing URL
/// must be refused storage outright (spec.md §4.5, last bullet).
pub fn http10_query_without_expires_blocks_storage(
    is_http10: bool,
    has_expires: bool,
    request_uri_has_query: bool,
) -> bool {
    is_http10 && !has_expires && request_uri_has_query
}

/// Outcome of attempting to merge a `304 Not Modified` into a stored
/// entry.
#[derive(Debug)]
pub enum MergeOutcome {
    /// `V.Date` was older than `E.Date`: the revalidation is treated as
    /// failed; the caller should continue serving `E` unchanged.
    ValidationStale,
    /// The merged entry to write back via CAS.
    Merged(ResourceEntry),
}

/// `Content-Encoding` from the validating response must never replace the
/// stored entry's own (spec.md §4.2 "304 merging").
const PRESERVE_FROM_STORED: &str = "content-encoding";

/// Merges a `304 Not Modified` validating response into the stored entry
/// `stored`, per spec.md §4.2.
pub fn merge_304(stored: &ResourceEntry, validating: &EntryCommon) -> MergeOutcome {
    let stored_date = stored.common.headers.get("date").and_then(parse_http_date);
    let validating_date = validating.headers.get("date").and_then(parse_http_date);
    if let (Some(v), Some(e)) = (validating_date, stored_date) {
        if v < e {
            return MergeOutcome::ValidationStale;
        }
    }

    let mut headers = stored.common.headers.clone();
    let mut by_name: std::collections::BTreeMap<String, Vec<String>> = std::collections::BTreeMap::new();
    for (name, value) in validating.headers.iter() {
        let lower = name.to_ascii_lowercase();
        if crate::headers::HOP_BY_HOP.contains(&lower.as_str()) || lower == PRESERVE_FROM_STORED {
            continue;
        }
        by_name.entry(lower).or_default().push(value.to_string());
    }
    for (lower_name, values) in by_name {
        headers.remove(&lower_name);
        let original_case = validating
            .headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(&lower_name))
            .map(|(n, _)| n.to_string())
            .unwrap_or(lower_name);
        for value in values {
            headers.append(original_case.clone(), value);
        }
    }

    let merged = ResourceEntry {
        common: EntryCommon {
            request_instant: validating.request_instant,
            response_instant: validating.response_instant,
            status_code: stored.common.status_code,
            headers,
            request_method: stored.common.request_method.clone(),
            request_uri: stored.common.request_uri.clone(),
        },
        resource: stored.resource.clone(),
    };
    MergeOutcome::Merged(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;
    use std::time::SystemTime;

    fn ctx<'a>(
        method: &'a str,
        status: u16,
        response_cc: &'a CacheControl,
        request_cc: &'a CacheControl,
    ) -> StorabilityContext<'a> {
        StorabilityContext {
            request_method: method,
            request_cc,
            request_has_authorization: false,
            status,
            response_cc,
            vary_is_star: false,
            body_len: Some(1),
        }
    }

    #[test]
    fn get_200_with_max_age_is_storable() {
        let cc = CacheControl::parse(["max-age=60"]);
        let rcc = CacheControl::parse([]);
        assert!(is_storable(&ctx("GET", 200, &cc, &rcc), &Config::default()));
    }

    #[test]
    fn no_store_on_response_blocks_storage() {
        let cc = CacheControl::parse(["no-store"]);
        let rcc = CacheControl::parse([]);
        assert!(!is_storable(&ctx("GET", 200, &cc, &rcc), &Config::default()));
    }

    #[test]
    fn put_is_never_storable() {
        let cc = CacheControl::parse(["max-age=60"]);
        let rcc = CacheControl::parse([]);
        assert!(!is_storable(&ctx("PUT", 200, &cc, &rcc), &Config::default()));
    }

    #[test]
    fn oversized_body_is_not_storable() {
        let cc = CacheControl::parse(["max-age=60"]);
        let rcc = CacheControl::parse([]);
        let mut c = ctx("GET", 200, &cc, &rcc);
        c.body_len = Some(1_000_000);
        assert!(!is_storable(&c, &Config::default().max_object_size_bytes(10)));
    }

    #[test]
    fn private_response_in_shared_cache_without_override_is_not_storable() {
        let cc = CacheControl::parse(["private", "max-age=60"]);
        let rcc = CacheControl::parse([]);
        assert!(!is_storable(&ctx("GET", 200, &cc, &rcc), &Config::default()));
    }

    fn common(status: u16, headers: HeaderList, when: SystemTime) -> EntryCommon {
        EntryCommon {
            request_instant: when,
            response_instant: when,
            status_code: status,
            headers,
            request_method: Some("GET".into()),
            request_uri: "http://example.com/".into(),
        }
    }

    #[test]
    fn merge_304_preserves_body_and_content_encoding() {
        let now = SystemTime::now();
        let mut stored_headers = HeaderList::new();
        stored_headers.set("Date", crate::date::format_http_date(now));
        stored_headers.set("Content-Encoding", "gzip");
        stored_headers.set("ETag", "\"e1\"");
        let stored = ResourceEntry {
            common: common(200, stored_headers, now),
            resource: Some(Resource::from_bytes(b"body".to_vec())),
        };

        let later = now + std::time::Duration::from_secs(10);
        let mut validating_headers = HeaderList::new();
        validating_headers.set("Date", crate::date::format_http_date(later));
        validating_headers.set("Content-Encoding", "identity");
        validating_headers.set("ETag", "\"e1\"");
        let validating = common(304, validating_headers, later);

        match merge_304(&stored, &validating) {
            MergeOutcome::Merged(merged) => {
                assert_eq!(merged.common.headers.get("content-encoding"), Some("gzip"));
                assert_eq!(merged.resource, stored.resource);
                assert_eq!(merged.common.status_code, 200);
            }
            MergeOutcome::ValidationStale => panic!("expected merge"),
        }
    }

    #[test]
    fn merge_304_with_older_date_is_validation_stale() {
        let now = SystemTime::now();
        let mut stored_headers = HeaderList::new();
        stored_headers.set("Date", crate::date::format_http_date(now));
        let stored = ResourceEntry { common: common(200, stored_headers, now), resource: None };

        let earlier = now - std::time::Duration::from_secs(10);
        let mut validating_headers = HeaderList::new();
        validating_headers.set("Date", crate::date::format_http_date(earlier));
        let validating = common(304, validating_headers, earlier);

        assert!(matches!(merge_304(&stored, &validating), MergeOutcome::ValidationStale));
    }
}
