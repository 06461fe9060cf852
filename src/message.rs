//! The request/response shapes the Caching Executor (C11) operates on.
//!
//! These are the core's own message types, deliberately narrower than a
//! full `http::Request`/`http::Response`: body bytes are the caller's
//! concern (spec.md §1 "Explicitly out of scope" — "Body storage bytes"),
//! so a [`CacheResponse`] carries an optional [`Resource`] rather than a
//! stream, and a [`CacheRequest`] carries no body at all (the core never
//! inspects request bodies).

use crate::context::ContextCode;
use crate::headers::HeaderList;
use crate::http_version::HttpVersion;
use crate::resource::Resource;

/// An incoming (or outgoing, when forwarded) request as the executor sees
/// it: method, effective request URI, headers, and protocol version.
#[derive(Debug, Clone)]
pub struct CacheRequest {
    /// The request method, e.g. `"GET"`.
    pub method: String,
    /// The effective request URI (after any prior redirect resolution).
    pub uri: url::Url,
    /// Request headers, including any caching directives
    /// (`Cache-Control`, `Pragma`, conditional validators).
    pub headers: HeaderList,
    /// The request's protocol version.
    pub version: HttpVersion,
}

impl CacheRequest {
    /// Builds a request from its parts.
    pub fn new(method: impl Into<String>, uri: url::Url, headers: HeaderList, version: HttpVersion) -> Self {
        CacheRequest { method: method.into(), uri, headers, version }
    }

    /// Whether the method is `GET` or `HEAD` (case-insensitive).
    pub fn is_safe(&self) -> bool {
        matches!(self.method.to_ascii_uppercase().as_str(), "GET" | "HEAD")
    }

    /// `true` for the `OPTIONS * HTTP/1.1` asterisk-form request with
    /// `Max-Forwards: 0` — the one case spec.md §4.5 names as a fatal,
    /// module-generated request (spec.md §7 `ProtocolNoncompliant`).
    pub fn is_fatal_asterisk_options(&self) -> bool {
        self.method.eq_ignore_ascii_case("OPTIONS")
            && self.uri.path() == "*"
            && self
                .headers
                .get("max-forwards")
                .map(|v| v.trim() == "0")
                .unwrap_or(false)
    }

    /// A request carrying `Range` or `If-Range` must never be served from
    /// (or populate) the cache; it is passed through untouched (spec.md §1
    /// "Explicitly out of scope").
    pub fn is_range_request(&self) -> bool {
        self.headers.contains("range") || self.headers.contains("if-range")
    }
}

/// A response as returned to the caller, or forwarded to/received from the
/// origin.
#[derive(Debug, Clone)]
pub struct CacheResponse {
    /// The response status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderList,
    /// The response body, if any (absent for bodyless statuses).
    pub body: Option<Resource>,
    /// The response's protocol version (normally the request's own).
    pub version: HttpVersion,
    /// How this response was produced (spec.md §4.5, §6). `Default`-less:
    /// every constructor site must choose one explicitly.
    pub context: ContextCode,
}

impl CacheResponse {
    /// Builds a response from its parts.
    pub fn new(status: u16, headers: HeaderList, body: Option<Resource>, version: HttpVersion, context: ContextCode) -> Self {
        CacheResponse { status, headers, body, version, context }
    }

    /// Builds the module-generated `504 Gateway Timeout` used for
    /// `only-if-cached` misses and for forward failures against an entry
    /// that requires validation (spec.md §4.5, §7 `ValidatorRequired`).
    pub fn gateway_timeout(version: HttpVersion) -> Self {
        let mut headers = HeaderList::new();
        headers.set("Content-Length", "0");
        CacheResponse {
            status: 504,
            headers,
            body: None,
            version,
            context: ContextCode::CacheModuleResponse,
        }
    }

    /// A bare `200 OK` used to short-circuit `OPTIONS * Max-Forwards: 0`
    /// (spec.md §4.5 "ADMIT ... fatal request ... CACHE_MODULE_RESPONSE").
    pub fn options_asterisk_reply(version: HttpVersion) -> Self {
        let mut headers = HeaderList::new();
        headers.set("Content-Length", "0");
        CacheResponse {
            status: 200,
            headers,
            body: None,
            version,
            context: ContextCode::CacheModuleResponse,
        }
    }
}
