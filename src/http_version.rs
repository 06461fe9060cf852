//! The protocol version named on `CacheRequest`/`CacheResponse`, needed so
//! the executor can stamp a `Via` header element (spec.md §4.5) and so the
//! storability filter can single out HTTP/1.0 (spec.md §4.5 last bullet).
//!
//! Grounded on the teacher's `HttpVersion` (`http-cache-types/src/lib.rs`):
//! a small `non_exhaustive` enum with `http::Version` conversions, trimmed
//! to the conversions this core actually needs (no `http_types` client
//! conversion — that lives in a client adapter, out of scope per spec.md §1).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// An HTTP protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum HttpVersion {
    /// HTTP/0.9.
    #[serde(rename = "HTTP/0.9")]
    Http09,
    /// HTTP/1.0.
    #[serde(rename = "HTTP/1.0")]
    Http10,
    /// HTTP/1.1.
    #[serde(rename = "HTTP/1.1")]
    Http11,
    /// HTTP/2.
    #[serde(rename = "HTTP/2.0")]
    H2,
    /// HTTP/3.
    #[serde(rename = "HTTP/3.0")]
    H3,
}

impl HttpVersion {
    /// The token used in a `Via` header element, e.g. `1.1` (spec.md §4.5
    /// "set a `Via` header whose first element is the request's protocol").
    pub fn via_token(self) -> &'static str {
        match self {
            HttpVersion::Http09 => "0.9",
            HttpVersion::Http10 => "1.0",
            HttpVersion::Http11 => "1.1",
            HttpVersion::H2 => "2.0",
            HttpVersion::H3 => "3.0",
        }
    }

    /// Whether this is HTTP/1.0, relevant to the storability rule in
    /// spec.md §4.5's last bullet.
    pub fn is_http10(self) -> bool {
        matches!(self, HttpVersion::Http10)
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.via_token())
    }
}

impl TryFrom<http::Version> for HttpVersion {
    type Error = CacheError;

    fn try_from(value: http::Version) -> Result<Self, Self::Error> {
        Ok(match value {
            http::Version::HTTP_09 => HttpVersion::Http09,
            http::Version::HTTP_10 => HttpVersion::Http10,
            http::Version::HTTP_11 => HttpVersion::Http11,
            http::Version::HTTP_2 => HttpVersion::H2,
            http::Version::HTTP_3 => HttpVersion::H3,
            other => {
                return Err(CacheError::ProtocolNoncompliant(format!(
                    "unsupported HTTP version: {other:?}"
                )))
            }
        })
    }
}

impl From<HttpVersion> for http::Version {
    fn from(value: HttpVersion) -> Self {
        match value {
            HttpVersion::Http09 => http::Version::HTTP_09,
            HttpVersion::Http10 => http::Version::HTTP_10,
            HttpVersion::Http11 => http::Version::HTTP_11,
            HttpVersion::H2 => http::Version::HTTP_2,
            HttpVersion::H3 => http::Version::HTTP_3,
        }
    }
}
