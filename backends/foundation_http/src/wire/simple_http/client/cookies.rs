use url::Url;

use crate::wire::simple_http::{FieldMap, HttpHeaders};

/// Request header names a cookie store may contribute.
pub const COOKIE_HEADERS: [&str; 2] = ["Cookie", "Cookie2"];

/// Pluggable cookie storage.
pub trait CookieStore: Send + Sync {
    /// Headers to add to a request for `uri`. Only `Cookie` and `Cookie2`
    /// fields are used.
    fn get(&self, uri: &Url, request_headers: &FieldMap) -> HttpHeaders;

    /// Records cookies set by a response from `uri`.
    fn put(&self, uri: &Url, response_headers: &FieldMap);
}

/// Adds the cookie fields of `extra` to `headers`, joining repeated values
/// with `"; "`.
pub fn merge_cookie_headers(headers: &mut HttpHeaders, extra: &HttpHeaders) {
    let extra = extra.field_map();
    for name in COOKIE_HEADERS {
        if let Some(values) = extra.get(name) {
            if !values.is_empty() {
                headers.add(name, values.join("; "));
            }
        }
    }
}
