//! End-to-end scenarios from spec.md §8, exercising
//! [`CachingExecutor::execute`] against an in-memory [`InMemoryBackend`]
//! and a closure-based `forward`. Grounded on the teacher's
//! `http-cache-tests` crate (`http-cache-tests/src/lib.rs`), which drives
//! the same kind of request/response fixtures through a real client;
//! here the "client" is the bare executor, so the forward closure plays
//! the origin server's role directly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use httpcache_core::config::Config;
use httpcache_core::context::ContextCode;
use httpcache_core::date::format_http_date;
use httpcache_core::error::Result;
use httpcache_core::executor::CachingExecutor;
use httpcache_core::headers::HeaderList;
use httpcache_core::http_version::HttpVersion;
use httpcache_core::message::{CacheRequest, CacheResponse};
use httpcache_core::resource::Resource;
use httpcache_core::storage::memory::InMemoryBackend;
use url::Url;

fn get(uri: &str) -> CacheRequest {
    CacheRequest::new("GET", Url::parse(uri).unwrap(), HeaderList::new(), HttpVersion::Http11)
}

fn method(m: &str, uri: &str) -> CacheRequest {
    CacheRequest::new(m, Url::parse(uri).unwrap(), HeaderList::new(), HttpVersion::Http11)
}

fn response(status: u16, headers: HeaderList, body: &str) -> CacheResponse {
    CacheResponse::new(
        status,
        headers,
        Some(Resource::from_bytes(body.as_bytes().to_vec())),
        HttpVersion::Http11,
        ContextCode::CacheMiss,
    )
}

fn headers_with_date(extra: &[(&str, &str)], when: SystemTime) -> HeaderList {
    let mut h = HeaderList::new();
    h.set("Date", format_http_date(when));
    for (k, v) in extra {
        h.append(*k, *v);
    }
    h
}

#[tokio::test]
async fn fresh_hit_forwards_exactly_once() -> Result<()> {
    let storage = InMemoryBackend::new();
    let config = Config::default();
    let executor = CachingExecutor::new(&storage, config);
    let calls = Arc::new(AtomicUsize::new(0));

    let t0 = SystemTime::now();
    let origin_response = {
        let calls = calls.clone();
        move |_req: CacheRequest| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let headers = headers_with_date(&[("Cache-Control", "max-age=3600"), ("ETag", "\"e1\"")], t0);
                Ok(response(200, headers, "X"))
            }
        }
    };

    let first = executor.execute(get("http://example.com/"), origin_response.clone()).await?;
    assert_eq!(first.status, 200);
    assert_eq!(first.context, ContextCode::CacheMiss);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(1)).await;
    let second = executor.execute(get("http://example.com/"), origin_response).await?;
    assert_eq!(second.status, 200);
    assert_eq!(second.context, ContextCode::CacheHit);
    assert_eq!(second.body.unwrap().bytes().unwrap(), "X");
    assert!(second.headers.contains("age"));
    assert_eq!(calls.load(Ordering::SeqCst), 1, "second GET must be served from cache, not forwarded");

    Ok(())
}

#[tokio::test]
async fn revalidation_success_returns_updated_date_with_cached_body() -> Result<()> {
    let storage = InMemoryBackend::new();
    let executor = CachingExecutor::new(&storage, Config::default());

    let t0 = SystemTime::now() - Duration::from_secs(10);
    let headers = headers_with_date(&[("Cache-Control", "max-age=5"), ("ETag", "\"e1\"")], t0);
    let root_key = httpcache_core::key::root_key(&Url::parse("http://example.com/").unwrap());
    storage
        .put(
            &root_key,
            httpcache_core::entry::CacheEntry::Resource(httpcache_core::entry::ResourceEntry::new(
                t0,
                t0,
                200,
                headers,
                Some("GET".into()),
                "http://example.com/".into(),
                Some(Resource::from_bytes(b"cached body".to_vec())),
            )),
        )
        .await?;

    let t1 = SystemTime::now();
    let forward = move |req: CacheRequest| async move {
        assert_eq!(req.headers.get("if-none-match"), Some("\"e1\""));
        let headers = headers_with_date(&[], t1);
        Ok(CacheResponse::new(304, headers, None, HttpVersion::Http11, ContextCode::CacheMiss))
    };

    let got = executor.execute(get("http://example.com/"), forward).await?;
    assert_eq!(got.status, 200);
    assert_eq!(got.context, ContextCode::Validated);
    assert_eq!(got.body.unwrap().bytes().unwrap(), "cached body");
    assert_eq!(got.headers.get("date"), Some(format_http_date(t1).as_str()));

    Ok(())
}

#[tokio::test]
async fn revalidation_body_replacement_stores_new_entry() -> Result<()> {
    let storage = InMemoryBackend::new();
    let executor = CachingExecutor::new(&storage, Config::default());

    let t0 = SystemTime::now() - Duration::from_secs(10);
    let headers = headers_with_date(&[("Cache-Control", "max-age=5"), ("ETag", "\"e1\"")], t0);
    let root_key = httpcache_core::key::root_key(&Url::parse("http://example.com/").unwrap());
    storage
        .put(
            &root_key,
            httpcache_core::entry::CacheEntry::Resource(httpcache_core::entry::ResourceEntry::new(
                t0,
                t0,
                200,
                headers,
                Some("GET".into()),
                "http://example.com/".into(),
                Some(Resource::from_bytes(b"old body".to_vec())),
            )),
        )
        .await?;

    let t1 = SystemTime::now();
    let forward = move |_req: CacheRequest| async move {
        let headers = headers_with_date(&[("Cache-Control", "max-age=60"), ("ETag", "\"e2\"")], t1);
        Ok(response(200, headers, "new body"))
    };

    let got = executor.execute(get("http://example.com/"), forward).await?;
    assert_eq!(got.context, ContextCode::Validated);
    assert_eq!(got.body.clone().unwrap().bytes().unwrap(), "new body");

    let stored = storage.get(&root_key).await?.unwrap();
    let stored_resource = stored.as_resource().unwrap();
    assert_eq!(stored_resource.resource.clone().unwrap().bytes().unwrap(), "new body");
    assert_eq!(stored_resource.common.headers.get("etag"), Some("\"e2\""));

    Ok(())
}

#[tokio::test]
async fn variant_negotiation_serves_distinct_encodings_and_misses_a_third() -> Result<()> {
    let storage = InMemoryBackend::new();
    let executor = CachingExecutor::new(&storage, Config::default());
    let t0 = SystemTime::now();

    let request_with = |encoding: &str| {
        let mut headers = HeaderList::new();
        headers.append("Accept-Encoding", encoding);
        CacheRequest::new("GET", Url::parse("http://h/r").unwrap(), headers, HttpVersion::Http11)
    };

    for (encoding, body) in [("gzip", "G"), ("identity", "I")] {
        let headers =
            headers_with_date(&[("Cache-Control", "max-age=3600"), ("Vary", "Accept-Encoding")], t0);
        let body = body.to_string();
        let forward = move |_req: CacheRequest| {
            let headers = headers.clone();
            let body = body.clone();
            async move { Ok(response(200, headers, &body)) }
        };
        executor.execute(request_with(encoding), forward).await?;
    }

    let gzip_hit = executor
        .execute(request_with("gzip"), |_req: CacheRequest| async {
            panic!("must be served from cache")
        })
        .await?;
    assert_eq!(gzip_hit.context, ContextCode::CacheHit);
    assert_eq!(gzip_hit.body.unwrap().bytes().unwrap(), "G");

    let identity_hit = executor
        .execute(request_with("identity"), |_req: CacheRequest| async {
            panic!("must be served from cache")
        })
        .await?;
    assert_eq!(identity_hit.context, ContextCode::CacheHit);
    assert_eq!(identity_hit.body.unwrap().bytes().unwrap(), "I");

    let calls = Arc::new(AtomicUsize::new(0));
    let deflate_miss = {
        let calls = calls.clone();
        executor
            .execute(request_with("deflate"), move |_req: CacheRequest| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let headers = headers_with_date(
                        &[("Cache-Control", "max-age=3600"), ("Vary", "Accept-Encoding")],
                        t0,
                    );
                    Ok(response(200, headers, "D"))
                }
            })
            .await?
    };
    assert_eq!(deflate_miss.context, ContextCode::CacheMiss);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn unsafe_method_invalidates_variants_and_root() -> Result<()> {
    let storage = InMemoryBackend::new();
    let executor = CachingExecutor::new(&storage, Config::default());
    let t0 = SystemTime::now();

    let request_with = |method_name: &str, encoding: &str| {
        let mut headers = HeaderList::new();
        headers.append("Accept-Encoding", encoding);
        CacheRequest::new(method_name, Url::parse("http://h/r").unwrap(), headers, HttpVersion::Http11)
    };

    for encoding in ["gzip", "identity"] {
        let headers =
            headers_with_date(&[("Cache-Control", "max-age=3600"), ("Vary", "Accept-Encoding")], t0);
        let forward = move |_req: CacheRequest| {
            let headers = headers.clone();
            async move { Ok(response(200, headers, "body")) }
        };
        executor.execute(request_with("GET", encoding), forward).await?;
    }

    let put_forward = |_req: CacheRequest| async { Ok(response(200, HeaderList::new(), "")) };
    let put_result = executor.execute(method("PUT", "http://h/r"), put_forward).await?;
    assert_eq!(put_result.status, 200);

    let calls = Arc::new(AtomicUsize::new(0));
    for encoding in ["gzip", "identity"] {
        let calls = calls.clone();
        let got = executor
            .execute(request_with("GET", encoding), move |_req: CacheRequest| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(response(200, HeaderList::new(), "refetched"))
                }
            })
            .await?;
        assert_eq!(got.context, ContextCode::CacheMiss, "{encoding} must be a miss after invalidation");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    Ok(())
}

#[tokio::test]
async fn content_location_cross_invalidation_respects_etag_and_date() -> Result<()> {
    let storage = InMemoryBackend::new();
    let executor = CachingExecutor::new(&storage, Config::default());

    let old_date = SystemTime::now() - Duration::from_secs(100);
    let b_key = httpcache_core::key::root_key(&Url::parse("http://h/b").unwrap());
    storage
        .put(
            &b_key,
            httpcache_core::entry::CacheEntry::Resource(httpcache_core::entry::ResourceEntry::new(
                old_date,
                old_date,
                200,
                headers_with_date(&[("ETag", "\"old\"")], old_date),
                Some("GET".into()),
                "http://h/b".into(),
                Some(Resource::from_bytes(b"old-b".to_vec())),
            )),
        )
        .await?;

    let new_date = SystemTime::now();
    let forward = move |_req: CacheRequest| async move {
        let mut headers = headers_with_date(&[("ETag", "\"new\"")], new_date);
        headers.set("Content-Location", "http://h/b");
        Ok(response(200, headers, ""))
    };
    executor.execute(method("PUT", "http://h/a"), forward).await?;

    assert!(storage.get(&b_key).await?.is_none(), "differing ETag + newer Date must evict /b");
    Ok(())
}

#[tokio::test]
async fn only_if_cached_miss_returns_504() -> Result<()> {
    let storage = InMemoryBackend::new();
    let executor = CachingExecutor::new(&storage, Config::default());

    let mut headers = HeaderList::new();
    headers.set("Cache-Control", "only-if-cached");
    let request = CacheRequest::new("GET", Url::parse("http://h/missing").unwrap(), headers, HttpVersion::Http11);

    let got = executor
        .execute(request, |_req: CacheRequest| async { panic!("must not forward") })
        .await?;
    assert_eq!(got.status, 504);
    assert_eq!(got.context, ContextCode::CacheModuleResponse);
    Ok(())
}

#[tokio::test]
async fn vary_star_is_never_stored() -> Result<()> {
    let storage = InMemoryBackend::new();
    let executor = CachingExecutor::new(&storage, Config::default());
    let t0 = SystemTime::now();

    let forward = move |_req: CacheRequest| async move {
        let headers = headers_with_date(&[("Cache-Control", "max-age=3600"), ("Vary", "*")], t0);
        Ok(response(200, headers, "body"))
    };
    executor.execute(get("http://h/star"), forward).await?;

    let root_key = httpcache_core::key::root_key(&Url::parse("http://h/star").unwrap());
    assert!(storage.get(&root_key).await?.is_none());
    Ok(())
}
