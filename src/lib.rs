//! An RFC 7234 / RFC 9111 compliant HTTP caching policy engine.
//!
//! This crate is the core of an HTTP cache that sits between a client and
//! an origin server: it decides whether a stored response can satisfy an
//! outgoing request, revalidates stale entries with conditional requests,
//! negotiates among `Vary`-selected variants, and invalidates stored
//! entries when the client mutates server state. The transport itself —
//! sockets, TLS, connection pooling — is not this crate's concern: the
//! caller supplies a `forward` closure and a [`storage::StorageBackend`].
//!
//! ## Example
//!
//! ```ignore
//! use httpcache_core::config::Config;
//! use httpcache_core::executor::CachingExecutor;
//! use httpcache_core::storage::memory::InMemoryBackend;
//!
//! # async fn run(request: httpcache_core::message::CacheRequest) -> httpcache_core::error::Result<()> {
//! let storage = InMemoryBackend::new();
//! let executor = CachingExecutor::new(&storage, Config::default());
//! let response = executor.execute(request, |req| async move {
//!     // caller-supplied transport: forward `req` to the origin and
//!     // build a `CacheResponse` from whatever comes back.
//!     unimplemented!()
//! }).await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]
#![deny(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations,
    nonstandard_style,
    unused_qualifications,
    unused_import_braces,
    unused_extern_crates,
    trivial_casts,
    trivial_numeric_casts
)]

pub mod cacheability;
pub mod conditional;
pub mod config;
pub mod context;
pub mod date;
pub mod entry;
pub mod error;
pub mod executor;
pub mod freshness;
pub mod headers;
pub mod http_version;
pub mod invalidator;
pub mod key;
pub mod message;
pub mod resource;
pub mod serializer;
pub mod storage;
pub mod warning;

pub use config::Config;
pub use context::ContextCode;
pub use error::{CacheError, Result};
pub use executor::CachingExecutor;
pub use message::{CacheRequest, CacheResponse};
