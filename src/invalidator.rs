//! C10: the invalidator (spec.md §4.4) — evicts entries on unsafe
//! requests and on successful responses that name other resources via
//! `Content-Location`/`Location`.

use url::Url;

use crate::date::parse_http_date;
use crate::entry::{CacheEntry, EntryCommon};
use crate::error::Result;
use crate::freshness::entry_date;
use crate::headers::HeaderList;
use crate::key::root_key;
use crate::storage::StorageBackend;

fn is_safe_method(method: &str) -> bool {
    matches!(method.to_ascii_uppercase().as_str(), "GET" | "HEAD")
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme() && a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}

/// Evicts the root entry at `key`, plus every variant it enumerates, if
/// `key` currently names a variant root.
async fn evict_root_and_variants(storage: &dyn StorageBackend, key: &str) -> Result<()> {
    if let Some(entry) = storage.get(key).await? {
        if let CacheEntry::VariantRoot(root) = entry.as_ref() {
            for storage_key in root.variants.values() {
                storage.remove(storage_key).await?;
            }
        }
    }
    storage.remove(key).await?;
    Ok(())
}

/// Pre-forward eviction for unsafe request methods (spec.md §4.4 "On the
/// request, before forwarding").
pub async fn invalidate_before_forward(
    storage: &dyn StorageBackend,
    method: &str,
    request_uri: &Url,
    request_headers: &HeaderList,
) -> Result<()> {
    if !is_safe_method(method) {
        evict_root_and_variants(storage, &root_key(request_uri)).await?;
    }
    for header in ["content-location", "location"] {
        for value in request_headers.get_all(header) {
            if let Ok(resolved) = request_uri.join(value) {
                if same_origin(request_uri, &resolved) {
                    evict_root_and_variants(storage, &root_key(&resolved)).await?;
                }
            }
        }
    }
    Ok(())
}

/// Whether a cross-referenced entry `f` should be evicted given the
/// invalidating response's headers (spec.md §4.4 "On the response").
///
/// An entry with no parseable `Date` is always evicted. Otherwise
/// eviction triggers when the response has no usable `Date` (it is
/// missing, malformed, or at least as new as `f`'s), or when the response
/// carries an `ETag` that differs from `f`'s — except that a response
/// sharing `f`'s strong `ETag` and carrying a strictly newer `Date`
/// preserves the entry rather than evicting it (spec.md §4.4, last
/// bullet).
fn should_evict_referenced(f: &EntryCommon, response_headers: &HeaderList) -> bool {
    let Some(f_date) = entry_date(f) else {
        return true;
    };
    let response_date = response_headers.get("date").and_then(parse_http_date);
    let date_triggers = !matches!(response_date, Some(rd) if rd < f_date);
    let response_etag = response_headers.get("etag");
    let f_etag = f.headers.get("etag");
    let etag_differs = match (response_etag, f_etag) {
        (Some(r), Some(fe)) => r != fe,
        (Some(_), None) => true,
        (None, _) => false,
    };
    if !date_triggers && !etag_differs {
        return false;
    }
    if let (Some(r), Some(fe)) = (response_etag, f_etag) {
        if r == fe {
            if let Some(rd) = response_date {
                if rd > f_date {
                    return false;
                }
            }
        }
    }
    true
}

/// Post-response eviction for a successful response to an unsafe request
/// (spec.md §4.4 "On the response, after receiving").
pub async fn invalidate_after_response(
    storage: &dyn StorageBackend,
    method: &str,
    status: u16,
    request_uri: &Url,
    response_headers: &HeaderList,
) -> Result<()> {
    if is_safe_method(method) || !(200..400).contains(&status) {
        return Ok(());
    }
    evict_root_and_variants(storage, &root_key(request_uri)).await?;

    for header in ["content-location", "location"] {
        let Some(value) = response_headers.get(header) else { continue };
        let Ok(resolved) = request_uri.join(value) else { continue };
        if !same_origin(request_uri, &resolved) {
            continue;
        }
        let key = root_key(&resolved);
        if let Some(entry) = storage.get(&key).await? {
            if should_evict_referenced(entry.common(), response_headers) {
                evict_root_and_variants(storage, &key).await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ResourceEntry;
    use crate::storage::memory::InMemoryBackend;
    use std::time::SystemTime;

    fn entry_at(uri: &str, date: SystemTime, etag: Option<&str>) -> CacheEntry {
        let mut headers = HeaderList::new();
        headers.set("Date", crate::date::format_http_date(date));
        if let Some(e) = etag {
            headers.set("ETag", e.to_string());
        }
        CacheEntry::Resource(ResourceEntry::new(
            date,
            date,
            200,
            headers,
            Some("GET".into()),
            uri.to_string(),
            None,
        ))
    }

    #[tokio::test]
    async fn unsafe_method_evicts_own_root() {
        let storage = InMemoryBackend::new();
        let uri = Url::parse("http://example.com/r").unwrap();
        let key = root_key(&uri);
        storage.put(&key, entry_at("http://example.com/r", SystemTime::now(), None)).await.unwrap();

        invalidate_before_forward(&storage, "PUT", &uri, &HeaderList::new()).await.unwrap();
        assert!(storage.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_does_not_evict() {
        let storage = InMemoryBackend::new();
        let uri = Url::parse("http://example.com/r").unwrap();
        let key = root_key(&uri);
        storage.put(&key, entry_at("http://example.com/r", SystemTime::now(), None)).await.unwrap();

        invalidate_before_forward(&storage, "GET", &uri, &HeaderList::new()).await.unwrap();
        assert!(storage.get(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn content_location_cross_invalidation_evicts_older_entry() {
        let storage = InMemoryBackend::new();
        let old_date = SystemTime::now() - std::time::Duration::from_secs(100);
        let b_key = root_key(&Url::parse("http://example.com/b").unwrap());
        storage.put(&b_key, entry_at("http://example.com/b", old_date, Some("\"old\""))).await.unwrap();

        let a_uri = Url::parse("http://example.com/a").unwrap();
        let mut response_headers = HeaderList::new();
        response_headers.set("Content-Location", "http://example.com/b");
        response_headers.set("Date", crate::date::format_http_date(SystemTime::now()));
        response_headers.set("ETag", "\"new\"");

        invalidate_after_response(&storage, "PUT", 200, &a_uri, &response_headers).await.unwrap();
        assert!(storage.get(&b_key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn matching_strong_etag_and_newer_date_preserves_entry() {
        let storage = InMemoryBackend::new();
        let old_date = SystemTime::now() - std::time::Duration::from_secs(100);
        let b_key = root_key(&Url::parse("http://example.com/b").unwrap());
        storage.put(&b_key, entry_at("http://example.com/b", old_date, Some("\"same\""))).await.unwrap();

        let a_uri = Url::parse("http://example.com/a").unwrap();
        let mut response_headers = HeaderList::new();
        response_headers.set("Content-Location", "http://example.com/b");
        response_headers.set("Date", crate::date::format_http_date(SystemTime::now()));
        response_headers.set("ETag", "\"same\"");

        invalidate_after_response(&storage, "PUT", 200, &a_uri, &response_headers).await.unwrap();
        assert!(storage.get(&b_key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn foreign_origin_is_never_evicted() {
        let storage = InMemoryBackend::new();
        let foreign_key = root_key(&Url::parse("http://other.example/b").unwrap());
        storage
            .put(&foreign_key, entry_at("http://other.example/b", SystemTime::now(), None))
            .await
            .unwrap();

        let a_uri = Url::parse("http://example.com/a").unwrap();
        let mut response_headers = HeaderList::new();
        response_headers.set("Content-Location", "http://other.example/b");

        invalidate_after_response(&storage, "PUT", 200, &a_uri, &response_headers).await.unwrap();
        assert!(storage.get(&foreign_key).await.unwrap().is_some());
    }
}
