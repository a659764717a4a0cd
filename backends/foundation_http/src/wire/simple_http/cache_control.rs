//! Freshness and validation rules for stored responses.
//!
//! WHY: A response cache only decides what it holds. Whether a stored
//! response may answer a request, needs a conditional request to the
//! origin first, or must be ignored depends on the caching headers of both
//! messages.
//!
//! WHAT: `RequestCacheControl` and `ResponseCacheControl` read those headers;
//! `ResponseCacheControl::choose_source` picks a `ResponseSource` and
//! `ResponseCacheControl::validate` judges the origin's answer to a
//! conditional request.
//!
//! HOW: Ages follow RFC 2616 section 13.2.3. The exchange stamps the local
//! send and receive times into response heads it offers to a cache, under
//! [`SENT_MILLIS`] and [`RECEIVED_MILLIS`].

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::{parse_status_line, HttpHeaders};

/// Local time the request was sent, in milliseconds since the epoch.
pub const SENT_MILLIS: &str = "X-Request-Sent-Millis";

/// Local time the response head arrived, in milliseconds since the epoch.
pub const RECEIVED_MILLIS: &str = "X-Response-Received-Millis";

/// Status codes a stored response may answer with. Partial content is
/// never served from storage.
pub const SERVABLE_STATUS_CODES: [u16; 5] = [200, 203, 300, 301, 410];

/// Where the response for a request comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseSource {
    /// The stored response is fresh enough to return as is.
    Cache,
    /// Ask the origin whether the stored response is still valid, sending
    /// these extra request headers.
    Conditional(Vec<(&'static str, String)>),
    Network,
}

/// Calls `handle` with every directive of a `Cache-Control` value and its
/// parameter, quotes removed.
pub fn parse_cache_control(value: &str, mut handle: impl FnMut(&str, Option<&str>)) {
    let mut rest = value;
    while !rest.is_empty() {
        let end = rest.find(|c: char| c == '=' || c == ',').unwrap_or(rest.len());
        let directive = rest[..end].trim();

        if !rest[end..].starts_with('=') {
            if !directive.is_empty() {
                handle(directive, None);
            }
            rest = rest.get(end + 1..).unwrap_or_default();
            continue;
        }

        rest = rest[end + 1..].trim_start_matches([' ', '\t']);
        let parameter = if let Some(quoted) = rest.strip_prefix('"') {
            let close = quoted.find('"').unwrap_or(quoted.len());
            rest = quoted.get(close + 1..).unwrap_or_default();
            &quoted[..close]
        } else {
            let close = rest.find(',').unwrap_or(rest.len());
            let parameter = rest[..close].trim();
            rest = &rest[close..];
            parameter
        };
        rest = match rest.find(',') {
            Some(comma) => &rest[comma + 1..],
            None => "",
        };

        if !directive.is_empty() {
            handle(directive, Some(parameter));
        }
    }
}

/// Delta-seconds: negative values count as zero, unparseable ones as absent.
fn parse_seconds(value: Option<&str>) -> Option<Duration> {
    let seconds = value?.trim().parse::<i64>().ok()?;
    let seconds = seconds.clamp(0, i64::from(i32::MAX));
    u64::try_from(seconds).ok().map(Duration::from_secs)
}

fn parse_millis(value: &str) -> Option<SystemTime> {
    let millis = value.trim().parse::<u64>().ok()?;
    UNIX_EPOCH.checked_add(Duration::from_millis(millis))
}

/// `time` as milliseconds since the epoch, the format of [`SENT_MILLIS`]
/// and [`RECEIVED_MILLIS`].
#[must_use]
pub fn epoch_millis(time: SystemTime) -> String {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .to_string()
}

fn parse_date(value: &str) -> Option<SystemTime> {
    httpdate::parse_http_date(value.trim()).ok()
}

fn elapsed(later: SystemTime, earlier: SystemTime) -> Duration {
    later.duration_since(earlier).unwrap_or_default()
}

/// Caching directives of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestCacheControl {
    /// Do not answer from storage without asking the origin.
    pub no_cache: bool,
    pub no_store: bool,
    pub max_age: Option<Duration>,
    pub max_stale: Option<Duration>,
    pub min_fresh: Option<Duration>,
    /// Do not use the network at all.
    pub only_if_cached: bool,
    /// The caller already made the request conditional.
    pub has_conditions: bool,
}

impl RequestCacheControl {
    #[must_use]
    pub fn from_headers(headers: &HttpHeaders) -> Self {
        let mut control = Self::default();
        for (name, value) in headers.fields() {
            if name.eq_ignore_ascii_case("Cache-Control") {
                parse_cache_control(value, |directive, parameter| {
                    match directive.to_ascii_lowercase().as_str() {
                        "no-cache" => control.no_cache = true,
                        "no-store" => control.no_store = true,
                        "max-age" => control.max_age = parse_seconds(parameter),
                        "max-stale" => control.max_stale = parse_seconds(parameter),
                        "min-fresh" => control.min_fresh = parse_seconds(parameter),
                        "only-if-cached" => control.only_if_cached = true,
                        _ => {}
                    }
                });
            } else if name.eq_ignore_ascii_case("Pragma")
                && value.trim().eq_ignore_ascii_case("no-cache")
            {
                control.no_cache = true;
            } else if name.eq_ignore_ascii_case("If-None-Match")
                || name.eq_ignore_ascii_case("If-Modified-Since")
            {
                control.has_conditions = true;
            }
        }
        control
    }
}

/// Caching facts of a stored or received response head.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseCacheControl {
    pub code: Option<u16>,
    pub served_date: Option<SystemTime>,
    pub last_modified: Option<SystemTime>,
    pub expires: Option<SystemTime>,
    pub etag: Option<String>,
    /// The response may be stored but must be revalidated before use.
    pub no_cache: bool,
    pub no_store: bool,
    pub max_age: Option<Duration>,
    pub age: Option<Duration>,
    pub sent_at: Option<SystemTime>,
    pub received_at: Option<SystemTime>,
}

impl ResponseCacheControl {
    #[must_use]
    pub fn from_headers(headers: &HttpHeaders) -> Self {
        let mut control = Self {
            code: headers
                .status_line()
                .and_then(|line| parse_status_line(line).ok().flatten())
                .map(|status| status.code),
            ..Self::default()
        };

        for (name, value) in headers.fields() {
            match name.to_ascii_lowercase().as_str() {
                "cache-control" => parse_cache_control(value, |directive, parameter| {
                    match directive.to_ascii_lowercase().as_str() {
                        "no-cache" => control.no_cache = true,
                        "no-store" => control.no_store = true,
                        "max-age" => control.max_age = parse_seconds(parameter),
                        _ => {}
                    }
                }),
                "pragma" if value.trim().eq_ignore_ascii_case("no-cache") => {
                    control.no_cache = true;
                }
                "date" => control.served_date = parse_date(value),
                "expires" => control.expires = parse_date(value),
                "last-modified" => control.last_modified = parse_date(value),
                "etag" => control.etag = Some(value.to_string()),
                "age" => control.age = parse_seconds(Some(value)),
                _ if name.eq_ignore_ascii_case(SENT_MILLIS) => {
                    control.sent_at = parse_millis(value);
                }
                _ if name.eq_ignore_ascii_case(RECEIVED_MILLIS) => {
                    control.received_at = parse_millis(value);
                }
                _ => {}
            }
        }
        control
    }

    /// Current age of the response. Missing receive times fall back to the
    /// served date, then to `now`.
    #[must_use]
    pub fn age_at(&self, now: SystemTime) -> Duration {
        let received = self.received_at.or(self.served_date).unwrap_or(now);
        let sent = self.sent_at.unwrap_or(received);

        let apparent_age = self
            .served_date
            .map_or(Duration::ZERO, |served| elapsed(received, served));
        let received_age = self.age.map_or(apparent_age, |age| apparent_age.max(age));
        received_age
            .saturating_add(elapsed(received, sent))
            .saturating_add(elapsed(now, received))
    }

    /// How long the response stays fresh, counted from its served date.
    #[must_use]
    pub fn freshness_lifetime(&self, now: SystemTime) -> Duration {
        if let Some(max_age) = self.max_age {
            return max_age;
        }
        match self.expires {
            Some(expires) => {
                let served = self.served_date.or(self.received_at).unwrap_or(now);
                elapsed(expires, served)
            }
            None => Duration::ZERO,
        }
    }

    /// Picks where the response to `request` should come from, given that
    /// this response is stored.
    #[must_use]
    pub fn choose_source(&self, now: SystemTime, request: &RequestCacheControl) -> ResponseSource {
        let servable = self
            .code
            .is_some_and(|code| SERVABLE_STATUS_CODES.contains(&code));
        if self.no_store || request.no_cache || request.has_conditions || !servable {
            return ResponseSource::Network;
        }

        let age = self.age_at(now);
        let mut fresh = self.freshness_lifetime(now);
        if let Some(max_age) = request.max_age {
            fresh = fresh.min(max_age);
        }
        let min_fresh = request.min_fresh.unwrap_or_default();
        let max_stale = request.max_stale.unwrap_or_default();

        if !self.no_cache && age.saturating_add(min_fresh) < fresh.saturating_add(max_stale) {
            return ResponseSource::Cache;
        }

        let mut conditions = Vec::new();
        if let Some(date) = self.last_modified.or(self.served_date) {
            conditions.push(("If-Modified-Since", httpdate::fmt_http_date(date)));
        }
        if let Some(etag) = &self.etag {
            conditions.push(("If-None-Match", etag.clone()));
        }

        if conditions.is_empty() {
            ResponseSource::Network
        } else {
            ResponseSource::Conditional(conditions)
        }
    }

    /// True when the stored response should be used after the origin
    /// answered a conditional request with `code` and `network`.
    #[must_use]
    pub fn validate(&self, code: u16, network: &HttpHeaders) -> bool {
        if code == 304 {
            return true;
        }
        let Some(stored) = self.last_modified else {
            return false;
        };
        ResponseCacheControl::from_headers(network)
            .last_modified
            .is_some_and(|modified| modified < stored)
    }
}

/// True unless either message forbids storing the response.
#[must_use]
pub fn may_store(request: &HttpHeaders, response: &HttpHeaders) -> bool {
    !RequestCacheControl::from_headers(request).no_store
        && !ResponseCacheControl::from_headers(response).no_store
}
