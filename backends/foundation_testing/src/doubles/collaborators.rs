use std::sync::{Mutex, PoisonError};

use foundation_http::wire::simple_http::client::{
    AuthRequest, AuthTarget, Authenticator, CookieStore, Credentials,
};
use foundation_http::wire::simple_http::{FieldMap, HttpHeaders};
use url::Url;

/// Answers every challenge for one realm (or any realm) with fixed
/// credentials, recording what it was asked.
pub struct StaticAuthenticator {
    credentials: Credentials,
    realm: Option<String>,
    asked: Mutex<Vec<(AuthTarget, String, String)>>,
}

impl StaticAuthenticator {
    #[must_use]
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            credentials: Credentials::new(username, password),
            realm: None,
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Only answers challenges for `realm`.
    #[must_use]
    pub fn for_realm(mut self, realm: &str) -> Self {
        self.realm = Some(realm.to_string());
        self
    }

    /// `(target, scheme, realm)` of every challenge seen.
    #[must_use]
    pub fn asked(&self) -> Vec<(AuthTarget, String, String)> {
        self.asked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Authenticator for StaticAuthenticator {
    fn credentials(&self, request: &AuthRequest<'_>) -> Option<Credentials> {
        self.asked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((request.target, request.scheme.to_string(), request.realm.to_string()));

        match &self.realm {
            Some(realm) if realm != request.realm => None,
            _ => Some(self.credentials.clone()),
        }
    }
}

/// Keeps `name=value` pairs from `Set-Cookie` and sends them all back,
/// ignoring domains, paths and expiry.
#[derive(Default)]
pub struct MemoryCookieStore {
    cookies: Mutex<Vec<(String, String)>>,
}

impl MemoryCookieStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored cookies as `name=value`, in insertion order.
    #[must_use]
    pub fn cookies(&self) -> Vec<String> {
        self.cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect()
    }
}

impl CookieStore for MemoryCookieStore {
    fn get(&self, _uri: &Url, _request_headers: &FieldMap) -> HttpHeaders {
        let mut headers = HttpHeaders::new();
        for cookie in self.cookies() {
            headers.add("Cookie", cookie);
        }
        headers
    }

    fn put(&self, _uri: &Url, response_headers: &FieldMap) {
        let Some(values) = response_headers.get("Set-Cookie") else {
            return;
        };

        let mut cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        for value in values {
            let pair = value.split(';').next().unwrap_or_default();
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let (name, value) = (name.trim().to_string(), value.trim().to_string());
            match cookies.iter_mut().find(|(existing, _)| *existing == name) {
                Some(slot) => slot.1 = value,
                None => cookies.push((name, value)),
            }
        }
    }
}
