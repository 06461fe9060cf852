//! C11: the Caching Executor (spec.md §4.5) — the top-level state machine
//! that orchestrates every other component around a single client request.
//!
//! Grounded on the teacher's `Cache::run`/`conditional_fetch`
//! (`http-cache/src/lib.rs`): ADMIT/LOOKUP/CLASSIFY/BUILD_COND/FORWARD,
//! generalized to this core's own entry model (with variants), a CAS-based
//! storage trait instead of the teacher's `CacheManager`, and the explicit
//! `ContextCode`/`Verdict` vocabulary spec.md names.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::SystemTime;

use log::{debug, warn};

use crate::cacheability::{self, MergeOutcome, StorabilityContext};
use crate::conditional;
use crate::config::Config;
use crate::context::ContextCode;
use crate::date::CacheControl;
use crate::entry::{CacheEntry, EntryCommon, ResourceEntry, VariantRoot};
use crate::error::{CacheError, Result};
use crate::freshness::{self, Verdict};
use crate::headers::HeaderList;
use crate::http_version::HttpVersion;
use crate::key;
use crate::message::{CacheRequest, CacheResponse};
use crate::storage::StorageBackend;
use crate::warning;

/// The pseudonym this cache stamps onto `Via` and `Warning` headers. A
/// fixed value is adequate here: the core has no network identity of its
/// own (spec.md §1 — transport is out of scope), and embedders that care
/// can rewrite the header after the fact.
const AGENT: &str = "localhost";

/// Orchestrates C2-C10 around every request passed to [`execute`]. Holds
/// no state of its own beyond a storage handle and configuration, per
/// spec.md §9 ("pass the storage handle and configuration through the
/// request scope rather than relying on process-wide singletons").
#[derive(Clone, Copy)]
pub struct CachingExecutor<'s> {
    storage: &'s dyn StorageBackend,
    config: Config,
}

impl std::fmt::Debug for CachingExecutor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingExecutor").field("config", &self.config).finish_non_exhaustive()
    }
}

impl<'s> CachingExecutor<'s> {
    /// Builds an executor over `storage` with the given `config`.
    pub fn new(storage: &'s dyn StorageBackend, config: Config) -> Self {
        CachingExecutor { storage, config }
    }

    /// Executes a single request: `execute(request, forward) -> response`
    /// (spec.md §6 "Inbound operation").
    pub async fn execute<F, Fut>(&self, request: CacheRequest, forward: F) -> Result<CacheResponse>
    where
        F: Fn(CacheRequest) -> Fut,
        Fut: Future<Output = Result<CacheResponse>>,
    {
        debug!("admit {} {}", request.method, request.uri);

        // ADMIT
        if request.is_fatal_asterisk_options() {
            return Ok(CacheResponse::options_asterisk_reply(request.version));
        }
        if request.is_range_request() {
            let mut response = self.forward_with_via(request, &forward).await?;
            response.context = ContextCode::CacheMiss;
            return Ok(response);
        }

        let mut request_cc = CacheControl::parse(request.headers.get_all("cache-control"));
        if !request.headers.contains("cache-control") {
            if let Some(pragma) = request.headers.get("pragma") {
                if pragma.to_ascii_lowercase().contains("no-cache") {
                    request_cc = CacheControl::parse(["no-cache"]);
                }
            }
        }
        let only_if_cached = request_cc.has("only-if-cached");

        if !request.is_safe() {
            return self.handle_unsafe(request, &forward).await;
        }

        // LOOKUP
        let root = key::root_key(&request.uri);
        let root_entry = match self.storage.get(&root).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!("storage unavailable on lookup of {root:?}: {e}");
                None
            }
        };

        let Some(root_entry) = root_entry else {
            return self.on_miss(request, only_if_cached, &forward).await;
        };

        let candidate = match self.select_candidate(&root, root_entry.as_ref(), &request).await {
            Ok(Some(candidate)) => candidate,
            Ok(None) => return self.on_miss(request, only_if_cached, &forward).await,
            Err(e) => {
                warn!("storage unavailable selecting variant: {e}");
                return self.on_miss(request, only_if_cached, &forward).await;
            }
        };

        // CLASSIFY
        let response_cc = CacheControl::parse(candidate.entry.common.headers.get_all("cache-control"));
        let now = SystemTime::now();
        let verdict = freshness::classify(now, &candidate.entry.common, &response_cc, &request_cc, &self.config);
        debug!("classify {} -> {verdict:?}", request.uri);

        match verdict {
            Verdict::Unusable => {
                if only_if_cached {
                    return Ok(CacheResponse::gateway_timeout(request.version));
                }
                self.on_miss(request, only_if_cached, &forward).await
            }
            Verdict::Fresh => Ok(self.respond_from_entry(&candidate.entry, now, request.version, None)),
            Verdict::StaleUsable => {
                Ok(self.respond_from_entry(&candidate.entry, now, request.version, Some(warning::STALE)))
            }
            Verdict::MustRevalidate => {
                if only_if_cached {
                    return Ok(CacheResponse::gateway_timeout(request.version));
                }
                self.revalidate(request, candidate, response_cc, &forward).await
            }
        }
    }

    /// Resolves the root entry at `root` to a single candidate resource
    /// entry: the entry itself if it carries no variants, or the variant
    /// selected by the request's selecting headers (spec.md §3.1, §4.1
    /// "Selection among variants").
    async fn select_candidate(
        &self,
        root: &str,
        root_entry: &CacheEntry,
        request: &CacheRequest,
    ) -> Result<Option<Candidate>> {
        match root_entry {
            CacheEntry::Resource(r) => {
                Ok(Some(Candidate { key: root.to_string(), entry: r.clone(), siblings: Vec::new() }))
            }
            CacheEntry::VariantRoot(vr) => {
                let vary_names = vary_names_from_variant_map(vr);
                let variant_key = key::variant_key(&vary_names, &request.headers);
                let Some(storage_key) = vr.variants.get(&variant_key) else {
                    return Ok(None);
                };
                match self.storage.get(storage_key).await? {
                    Some(found) => match found.as_ref() {
                        CacheEntry::Resource(r) => {
                            let siblings = self.sibling_variant_commons(vr, storage_key).await;
                            Ok(Some(Candidate { key: storage_key.clone(), entry: r.clone(), siblings }))
                        }
                        CacheEntry::VariantRoot(_) => Ok(None),
                    },
                    None => Ok(None),
                }
            }
        }
    }

    /// Fetches the `EntryCommon` of every other variant enumerated by `vr`
    /// besides `selected_key`, for use when revalidating across multiple
    /// variants of the same root (spec.md §4.3 rule 5). Storage errors are
    /// swallowed: a sibling that can't be read is simply left out of the
    /// joined validator list, the candidate's own revalidation still
    /// proceeds.
    async fn sibling_variant_commons(&self, vr: &VariantRoot, selected_key: &str) -> Vec<EntryCommon> {
        let other_keys: Vec<String> =
            vr.variants.values().filter(|k| k.as_str() != selected_key).cloned().collect();
        if other_keys.is_empty() {
            return Vec::new();
        }
        match self.storage.bulk_get(&other_keys).await {
            Ok(found) => found
                .values()
                .filter_map(|entry| entry.as_resource().map(|r| r.common.clone()))
                .collect(),
            Err(e) => {
                warn!("storage unavailable fetching sibling variants of {selected_key:?}: {e}");
                Vec::new()
            }
        }
    }

    /// Handles any non-GET/HEAD method: invalidates affected entries before
    /// forwarding, forwards unconditionally (unsafe requests are never
    /// served from, nor themselves written into, the cache — spec.md §4.2
    /// rule 1/8), then invalidates again based on the response (spec.md
    /// §4.4).
    async fn handle_unsafe<F, Fut>(&self, request: CacheRequest, forward: &F) -> Result<CacheResponse>
    where
        F: Fn(CacheRequest) -> Fut,
        Fut: Future<Output = Result<CacheResponse>>,
    {
        if let Err(e) =
            crate::invalidator::invalidate_before_forward(self.storage, &request.method, &request.uri, &request.headers)
                .await
        {
            warn!("invalidate_before_forward failed: {e}");
        }
        let method = request.method.clone();
        let uri = request.uri.clone();
        let mut response = self.forward_with_via(request, forward).await?;
        if let Err(e) =
            crate::invalidator::invalidate_after_response(self.storage, &method, response.status, &uri, &response.headers)
                .await
        {
            warn!("invalidate_after_response failed: {e}");
        }
        response.context = ContextCode::CacheMiss;
        Ok(response)
    }

    async fn on_miss<F, Fut>(&self, request: CacheRequest, only_if_cached: bool, forward: &F) -> Result<CacheResponse>
    where
        F: Fn(CacheRequest) -> Fut,
        Fut: Future<Output = Result<CacheResponse>>,
    {
        if only_if_cached {
            return Ok(CacheResponse::gateway_timeout(request.version));
        }
        let request_instant = SystemTime::now();
        let mut response = self.forward_with_via(request.clone(), forward).await?;
        let response_instant = SystemTime::now();
        if let Err(e) = self.store_response(&request, &response, request_instant, response_instant).await {
            warn!("failed to store response for {}: {e}", request.uri);
        }
        response.context = ContextCode::CacheMiss;
        Ok(response)
    }

    async fn revalidate<F, Fut>(
        &self,
        request: CacheRequest,
        candidate: Candidate,
        response_cc: CacheControl,
        forward: &F,
    ) -> Result<CacheResponse>
    where
        F: Fn(CacheRequest) -> Fut,
        Fut: Future<Output = Result<CacheResponse>>,
    {
        let conditional_headers = if candidate.siblings.is_empty() {
            conditional::build_conditional_request(
                &request.headers,
                &candidate.entry.common,
                &response_cc,
                self.config.shared_cache,
            )
        } else {
            let mut variant_commons: Vec<&EntryCommon> = vec![&candidate.entry.common];
            variant_commons.extend(candidate.siblings.iter());
            conditional::build_conditional_request_multi_variant(
                &request.headers,
                &variant_commons,
                &response_cc,
                self.config.shared_cache,
            )
        };
        let cond_request = CacheRequest::new(
            request.method.clone(),
            request.uri.clone(),
            conditional_headers,
            request.version,
        );
        let request_instant = SystemTime::now();
        match self.forward_with_via(cond_request, forward).await {
            Ok(response) => {
                self.handle_revalidation_response(request, candidate, response, request_instant, forward).await
            }
            Err(_) => {
                let requires_validation =
                    response_cc.must_revalidate() || (self.config.shared_cache && response_cc.proxy_revalidate());
                if requires_validation {
                    let err = CacheError::ValidatorRequired;
                    warn!("{err}");
                    Ok(CacheResponse::gateway_timeout(request.version))
                } else {
                    let now = SystemTime::now();
                    Ok(self.respond_from_entry(
                        &candidate.entry,
                        now,
                        request.version,
                        Some(warning::REVALIDATION_FAILED),
                    ))
                }
            }
        }
    }

    async fn handle_revalidation_response<F, Fut>(
        &self,
        request: CacheRequest,
        candidate: Candidate,
        response: CacheResponse,
        request_instant: SystemTime,
        forward: &F,
    ) -> Result<CacheResponse>
    where
        F: Fn(CacheRequest) -> Fut,
        Fut: Future<Output = Result<CacheResponse>>,
    {
        let response_instant = SystemTime::now();
        if response.status != 304 {
            return self.store_fresh_and_respond(&request, response, request_instant, response_instant).await;
        }

        let validating_common = EntryCommon {
            request_instant,
            response_instant,
            status_code: 304,
            headers: response.headers.clone(),
            request_method: Some(request.method.clone()),
            request_uri: request.uri.to_string(),
        };

        match cacheability::merge_304(&candidate.entry, &validating_common) {
            MergeOutcome::Merged(_) => {
                let validating_for_cas = validating_common.clone();
                let storage_key = candidate.key.clone();
                let updated = self
                    .storage
                    .update(
                        &storage_key,
                        Box::new(move |current| match current {
                            Some(CacheEntry::Resource(cur)) => match cacheability::merge_304(cur, &validating_for_cas) {
                                MergeOutcome::Merged(merged) => Some(CacheEntry::Resource(merged)),
                                MergeOutcome::ValidationStale => None,
                            },
                            _ => None,
                        }),
                    )
                    .await;
                let merged_entry = match updated {
                    Ok(Some(stored)) => match stored.as_resource() {
                        Some(r) => r.clone(),
                        None => candidate.entry.clone(),
                    },
                    Ok(None) => candidate.entry.clone(),
                    Err(e) => {
                        warn!("failed to persist 304 merge for {storage_key:?}: {e}");
                        candidate.entry.clone()
                    }
                };
                let mut response = self.respond_from_entry(&merged_entry, SystemTime::now(), request.version, None);
                response.context = ContextCode::Validated;
                Ok(response)
            }
            MergeOutcome::ValidationStale => {
                let unconditional_headers = conditional::build_unconditional_revalidation(&request.headers);
                let uncond_request = CacheRequest::new(
                    request.method.clone(),
                    request.uri.clone(),
                    unconditional_headers,
                    request.version,
                );
                let retry_instant = SystemTime::now();
                let retried = self.forward_with_via(uncond_request, forward).await?;
                let retried_instant = SystemTime::now();
                self.store_fresh_and_respond(&request, retried, retry_instant, retried_instant).await
            }
        }
    }

    async fn store_fresh_and_respond(
        &self,
        request: &CacheRequest,
        mut response: CacheResponse,
        request_instant: SystemTime,
        response_instant: SystemTime,
    ) -> Result<CacheResponse> {
        if let Err(e) = self.store_response(request, &response, request_instant, response_instant).await {
            warn!("failed to store revalidated response for {}: {e}", request.uri);
        }
        response.headers.strip_hop_by_hop();
        response.context = ContextCode::Validated;
        Ok(response)
    }

    /// Builds a response served directly from a stored entry: recomputes
    /// `Age` (spec.md §4.1) and, for `STALE_USABLE`/failed-revalidation
    /// paths, appends the appropriate `Warning`.
    fn respond_from_entry(
        &self,
        entry: &ResourceEntry,
        now: SystemTime,
        version: HttpVersion,
        extra_warning: Option<(u16, &str)>,
    ) -> CacheResponse {
        let age = freshness::compute_age(now, &entry.common);
        let mut headers = entry.common.headers.clone();
        headers.set("Age", age.current_age.as_secs().to_string());
        if let Some(code) = extra_warning {
            warning::append(&mut headers, AGENT, code, now);
        }
        CacheResponse::new(entry.common.status_code, headers, entry.resource.clone(), version, ContextCode::CacheHit)
    }

    /// Forwards `request` downstream, stamping a `Via` element naming its
    /// protocol version first (spec.md §4.5 "On forward...").
    async fn forward_with_via<F, Fut>(&self, mut request: CacheRequest, forward: &F) -> Result<CacheResponse>
    where
        F: Fn(CacheRequest) -> Fut,
        Fut: Future<Output = Result<CacheResponse>>,
    {
        let via_value = format!("{} {} (cache)", request.version.via_token(), AGENT);
        request.headers.append("Via", via_value);
        debug!("forward {} {}", request.method, request.uri);
        forward(request).await
    }

    /// Decides storability (C9) and, if storable, writes the entry (and,
    /// for a `Vary`-bearing response, its variant root) via the storage
    /// backend (spec.md §4.2, §3.1, §3.2).
    async fn store_response(
        &self,
        request: &CacheRequest,
        response: &CacheResponse,
        request_instant: SystemTime,
        response_instant: SystemTime,
    ) -> Result<()> {
        let vary_names = vary_names_from_response(&response.headers);
        let vary_is_star = response
            .headers
            .get_all("vary")
            .flat_map(|v| v.split(','))
            .any(|t| t.trim() == "*");
        let response_cc = CacheControl::parse(response.headers.get_all("cache-control"));
        let request_cc = CacheControl::parse(request.headers.get_all("cache-control"));
        let ctx = StorabilityContext {
            request_method: &request.method,
            request_cc: &request_cc,
            request_has_authorization: request.headers.contains("authorization"),
            status: response.status,
            response_cc: &response_cc,
            vary_is_star,
            body_len: response.body.as_ref().and_then(|b| b.len()).map(|l| l as u64),
        };
        if !cacheability::is_storable(&ctx, &self.config) {
            return Ok(());
        }
        if cacheability::http10_query_without_expires_blocks_storage(
            request.version.is_http10(),
            response.headers.contains("expires"),
            request.uri.query().is_some(),
        ) {
            return Ok(());
        }

        let mut headers = response.headers.clone();
        cacheability::prepare_headers_for_storage(&mut headers);

        let root = key::root_key(&request.uri);
        let method = Some(request.method.clone());
        let uri_string = request.uri.to_string();
        let status = response.status;

        if vary_names.is_empty() {
            let entry = ResourceEntry::new(
                request_instant,
                response_instant,
                status,
                headers,
                method,
                uri_string,
                response.body.clone(),
            );
            self.storage.put(&root, CacheEntry::Resource(entry)).await?;
            return Ok(());
        }

        let variant_key = key::variant_key(&vary_names, &request.headers);
        let storage_key = key::storage_key(&variant_key, &root);
        let entry = ResourceEntry::new(
            request_instant,
            response_instant,
            status,
            headers,
            method.clone(),
            uri_string.clone(),
            response.body.clone(),
        );
        self.storage.put(&storage_key, CacheEntry::Resource(entry)).await?;

        let variant_key_for_update = variant_key.clone();
        let storage_key_for_update = storage_key.clone();
        self.storage
            .update(
                &root,
                Box::new(move |current| match current {
                    Some(CacheEntry::VariantRoot(vr)) => Some(CacheEntry::VariantRoot(
                        vr.with_variant(variant_key_for_update.clone(), storage_key_for_update.clone()),
                    )),
                    _ => {
                        let mut variants = BTreeMap::new();
                        variants.insert(variant_key_for_update.clone(), storage_key_for_update.clone());
                        Some(CacheEntry::VariantRoot(VariantRoot::new(
                            request_instant,
                            response_instant,
                            status,
                            HeaderList::new(),
                            method.clone(),
                            uri_string.clone(),
                            variants,
                        )))
                    }
                }),
            )
            .await?;
        Ok(())
    }
}

/// A resolved lookup: which storage key it lives at (the root key for a
/// `Vary`-less resource, or the variant's own storage key), plus the
/// entry itself.
struct Candidate {
    key: String,
    entry: ResourceEntry,
    /// The other variants enumerated by the same root, if any, fetched so
    /// revalidation can join all of them into one conditional request
    /// (spec.md §4.3 rule 5).
    siblings: Vec<EntryCommon>,
}

fn vary_names_from_variant_map(vr: &VariantRoot) -> Vec<String> {
    let Some(example_key) = vr.variants.keys().next() else {
        return Vec::new();
    };
    let inner = example_key.trim_start_matches('{').trim_end_matches('}');
    inner
        .split('&')
        .filter_map(|part| part.split('=').next())
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn vary_names_from_response(headers: &HeaderList) -> Vec<String> {
    let mut names: Vec<String> = headers
        .get_all("vary")
        .flat_map(|v| v.split(','))
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    names.sort();
    names.dedup();
    names
}
