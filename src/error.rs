//! Error kinds produced or observed by the caching core (spec §7).

use thiserror::Error;

/// A `Result` typedef to use with the [`CacheError`] type.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors produced or observed by the caching core.
///
/// Storage and serialization errors are recoverable: the executor
/// degrades to miss-on-read / drop-on-write rather than propagating
/// them to the caller. Protocol and forward errors propagate, or are
/// turned into a synthesized response by the executor.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The storage backend failed to service a read or write.
    #[error("storage backend unavailable for key {key:?}: {reason}")]
    StorageUnavailable {
        /// The key that was being read or written.
        key: String,
        /// Backend-supplied failure reason.
        reason: String,
    },
    /// A stored entry failed to deserialize.
    #[error("corrupt serialized entry for key {key:?}: {reason}")]
    EntrySerialization {
        /// The key whose payload failed to parse.
        key: String,
        /// Parser-supplied failure reason.
        reason: String,
    },
    /// A compare-and-swap update exceeded its retry bound.
    #[error("update conflict on key {key:?} after {attempts} attempts")]
    UpdateConflict {
        /// The key being updated.
        key: String,
        /// Number of CAS attempts made before giving up.
        attempts: u32,
    },
    /// A body stream read or write failed.
    #[error("resource I/O failed: {0}")]
    ResourceIo(String),
    /// The incoming request was malformed in a way the core must
    /// short-circuit (e.g. `OPTIONS *` with `Max-Forwards: 0`).
    #[error("request is not protocol-compliant: {0}")]
    ProtocolNoncompliant(String),
    /// The downstream forward call timed out.
    #[error("forward timed out")]
    ForwardTimeout,
    /// The downstream forward call failed with an I/O error.
    #[error("forward failed: {0}")]
    ForwardIo(String),
    /// Revalidation could not be performed and the entry requires it.
    #[error("validator required but revalidation could not be performed")]
    ValidatorRequired,
    /// A header value could not be parsed as UTF-8 text.
    #[error(transparent)]
    HeaderToStr(#[from] http::header::ToStrError),
    /// A header value was rejected by `http`.
    #[error(transparent)]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
    /// A header name was rejected by `http`.
    #[error(transparent)]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),
    /// The request/response URI could not be built.
    #[error(transparent)]
    Http(#[from] http::Error),
    /// The request or response URI failed to parse as a URL.
    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),
}
