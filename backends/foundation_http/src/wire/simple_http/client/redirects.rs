use url::Url;

use crate::wire::simple_http::client::HttpClientError;

/// Status codes answered by following `Location`.
pub const REDIRECT_CODES: [u16; 7] = [300, 301, 302, 303, 305, 307, 308];

/// `305 Use Proxy`: repeat the request through the proxy named in `Location`.
pub const USE_PROXY: u16 = 305;

#[must_use]
pub fn is_redirect(code: u16) -> bool {
    REDIRECT_CODES.contains(&code)
}

/// Resolve a `Location` header value against the URL that produced it.
///
/// Absolute URLs are taken as-is; absolute paths, queries and relative
/// paths resolve against `base`.
///
/// # Errors
///
/// Returns `Err(HttpClientError::InvalidUrl(_))` when the location cannot be
/// resolved to a valid URL.
#[must_use = "inspect the Result to handle potential errors when resolving the Location"]
pub fn resolve_location(base: &Url, location: &str) -> Result<Url, HttpClientError> {
    base.join(location.trim()).map_err(|e| {
        HttpClientError::InvalidUrl(format!("failed to resolve location {location:?}: {e}"))
    })
}

/// True when `next` reaches a different host or port than `previous`.
#[must_use]
pub fn authority_changed(previous: &Url, next: &Url) -> bool {
    previous.host_str() != next.host_str()
        || previous.port_or_known_default() != next.port_or_known_default()
}
