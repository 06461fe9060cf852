//! `Warning` header construction (spec.md §4.1 "STALE_USABLE", §4.5, §6
//! "Wire formats" — codes `110` and `111` only).
//!
//! Grounded on the teacher's `HttpResponse::add_warning`
//! (`http-cache-types/src/lib.rs`), which builds a `warn-code warn-agent
//! "warn-text"` value per RFC 7234 §5.5.

use std::time::SystemTime;

use crate::date::format_http_date;
use crate::headers::HeaderList;

/// "Response is Stale" — appended when a request's `max-stale` permits
/// serving an entry the freshness calculator found stale (spec.md §4.1
/// verdict `STALE_USABLE`).
pub const STALE: (u16, &str) = (110, "Response is Stale");

/// "Revalidation Failed" — appended when a conditional forward fails with
/// an I/O error and the entry does not require validation (spec.md §4.5,
/// §7 `ForwardTimeout`/`ForwardIO` handling).
pub const REVALIDATION_FAILED: (u16, &str) = (111, "Revalidation Failed");

/// Appends a `Warning` header in `warn-code warn-agent "warn-text"
/// "warn-date"` form. `agent` is the cache's own pseudonym (the teacher
/// uses the response URL's host; this core has no fixed identity, so
/// callers pass one, e.g. `"localhost"`).
pub fn append(headers: &mut HeaderList, agent: &str, (code, text): (u16, &str), now: SystemTime) {
    headers.append(
        "Warning",
        format!("{code} {agent} \"{text}\" \"{}\"", format_http_date(now)),
    );
}
