//! C7: suitability and freshness (spec.md §4.1) — age computation,
//! freshness-lifetime selection, and the FRESH / STALE_USABLE /
//! MUST_REVALIDATE / UNUSABLE verdict.
//!
//! Grounded on `CosmicHorrorDev-http-cache-policy/src/lib.rs`'s `age`,
//! `max_age`, `time_to_live`, and `is_stale` methods on `CachePolicy`,
//! adapted to the entry model in [`crate::entry`] and to the verdict
//! enumeration spec.md §4.1 names explicitly.

use std::time::{Duration, SystemTime};

use crate::config::Config;
use crate::date::{parse_http_date, CacheControl};
use crate::entry::EntryCommon;

/// Statuses for which a heuristic freshness lifetime may be computed when
/// no explicit freshness information is present (spec.md §4.1 step 4).
const HEURISTICALLY_CACHEABLE: &[u16] = &[200, 203, 204, 206, 300, 301, 404, 405, 410, 414, 501];

/// The four outcomes the calculator can reach for a (request, entry) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The entry may be served as-is; no revalidation needed.
    Fresh,
    /// Stale but usable under the request's `max-stale`; the emitted
    /// response must carry `Warning: 110`.
    StaleUsable,
    /// The entry must be revalidated with the origin before serving.
    MustRevalidate,
    /// No entry may be served (e.g. the request carries `no-store`).
    Unusable,
}

/// The four age quantities of RFC 9111 §4.2.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Age {
    /// `max(0, response_instant - date_value)`.
    pub apparent_age: Duration,
    /// `age_value + response_delay`.
    pub corrected_age: Duration,
    /// `max(apparent_age, corrected_age)`.
    pub corrected_initial_age: Duration,
    /// `corrected_initial_age + resident_time`: the age used for
    /// freshness decisions and the `Age` header emitted on a hit.
    pub current_age: Duration,
}

fn sub0(a: SystemTime, b: SystemTime) -> Duration {
    a.duration_since(b).unwrap_or(Duration::ZERO)
}

/// The entry's `Date` header, parsed, or `None` if missing/malformed.
pub fn entry_date(common: &EntryCommon) -> Option<SystemTime> {
    common.headers.get("date").and_then(parse_http_date)
}

/// The entry's `Age` header value in whole seconds, or `0` if
/// missing/malformed (spec.md §4.1 "Tie-breaks and edge cases").
fn age_header_seconds(common: &EntryCommon) -> u64 {
    common.headers.get("age").and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

/// Computes the four age quantities for `common` as observed at `now`.
pub fn compute_age(now: SystemTime, common: &EntryCommon) -> Age {
    let date_value = entry_date(common).unwrap_or(common.response_instant);
    let apparent_age = sub0(common.response_instant, date_value);
    let response_delay = sub0(common.response_instant, common.request_instant);
    let corrected_age = Duration::from_secs(age_header_seconds(common)) + response_delay;
    let corrected_initial_age = apparent_age.max(corrected_age);
    let resident_time = sub0(now, common.response_instant);
    let current_age = corrected_initial_age + resident_time;
    Age { apparent_age, corrected_age, corrected_initial_age, current_age }
}

/// Whether `common`'s `Date` is missing, unparseable, or in the future
/// relative to `response_instant` — each treated as stale regardless of
/// any computed freshness lifetime (spec.md §4.1 "Tie-breaks and edge
/// cases").
fn has_untrustworthy_date(common: &EntryCommon) -> bool {
    match entry_date(common) {
        None => true,
        Some(date) => date > common.response_instant,
    }
}

/// Computes freshness lifetime and whether it was derived heuristically,
/// per the priority chain in spec.md §4.1.
pub fn freshness_lifetime(
    common: &EntryCommon,
    response_cc: &CacheControl,
    config: &Config,
) -> (Duration, bool) {
    if config.shared_cache {
        if let Some(s_maxage) = response_cc.s_maxage() {
            return (Duration::from_secs(s_maxage), false);
        }
    }
    if let Some(max_age) = response_cc.max_age() {
        return (Duration::from_secs(max_age), false);
    }
    let date_value = entry_date(common).unwrap_or(common.response_instant);
    if let Some(expires) = common.headers.get("expires").and_then(parse_http_date) {
        if expires <= date_value {
            return (Duration::ZERO, false);
        }
        return (sub0(expires, date_value), false);
    }
    if config.heuristic_caching_enabled && HEURISTICALLY_CACHEABLE.contains(&common.status_code) {
        if let Some(last_modified) = common.headers.get("last-modified").and_then(parse_http_date) {
            let span = sub0(date_value, last_modified);
            let lifetime = span.mul_f64(config.heuristic_coefficient as f64);
            return (lifetime, true);
        }
        return (Duration::from_secs(config.heuristic_default_lifetime_secs), true);
    }
    (Duration::ZERO, false)
}

/// Reaches a verdict for `common` given the request's parsed
/// Cache-Control, the entry's own Cache-Control, and the current
/// configuration.
pub fn classify(
    now: SystemTime,
    common: &EntryCommon,
    response_cc: &CacheControl,
    request_cc: &CacheControl,
    config: &Config,
) -> Verdict {
    if request_cc.no_store() {
        return Verdict::Unusable;
    }
    let age = compute_age(now, common);
    let (lifetime, is_heuristic) = freshness_lifetime(common, response_cc, config);

    let mut stale = has_untrustworthy_date(common) || age.current_age >= lifetime;
    if let Some(max_age) = request_cc.max_age() {
        if age.current_age > Duration::from_secs(max_age) {
            stale = true;
        }
    }
    if let Some(min_fresh) = request_cc.min_fresh() {
        let remaining = lifetime.saturating_sub(age.current_age);
        if remaining < Duration::from_secs(min_fresh) {
            stale = true;
        }
    }

    if request_cc.no_cache() {
        return Verdict::MustRevalidate;
    }
    if !stale {
        return Verdict::Fresh;
    }
    if response_cc.must_revalidate()
        || (config.shared_cache && response_cc.proxy_revalidate())
        || (lifetime.is_zero() && !is_heuristic)
    {
        return Verdict::MustRevalidate;
    }
    if let Some(max_stale) = request_cc.max_stale() {
        let overage = age.current_age.saturating_sub(lifetime);
        let within_bound = match max_stale {
            None => true,
            Some(bound) => overage <= Duration::from_secs(bound),
        };
        if within_bound {
            return Verdict::StaleUsable;
        }
    }
    Verdict::MustRevalidate
}

/// Among variant candidates matching the request's selecting headers,
/// picks the one with the most recent `Date`. Ties are broken by storage
/// key byte order (spec.md §4.1 "Selection among variants" and §9 "Open
/// question": this is the documented deterministic secondary ordering).
pub fn select_variant<'a>(candidates: &[(&'a str, &'a EntryCommon)]) -> Option<&'a str> {
    candidates
        .iter()
        .max_by(|(key_a, a), (key_b, b)| {
            let date_a = entry_date(a);
            let date_b = entry_date(b);
            date_a.cmp(&date_b).then_with(|| key_a.cmp(key_b))
        })
        .map(|(key, _)| *key)
}
