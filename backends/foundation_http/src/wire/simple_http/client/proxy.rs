use url::Url;

use crate::wire::simple_http::client::{HttpClientError, ProxyAddress};

/// A route to an origin server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proxy {
    Direct,
    Http(ProxyAddress),
}

impl Proxy {
    #[must_use]
    pub fn address(&self) -> Option<&ProxyAddress> {
        match self {
            Self::Direct => None,
            Self::Http(address) => Some(address),
        }
    }
}

/// Chooses proxies for a URI.
pub trait ProxySelector: Send + Sync {
    /// Candidates in preference order. An empty list means direct.
    fn select(&self, uri: &Url) -> Vec<Proxy>;

    /// Told when connecting through `proxy` failed.
    fn connect_failed(&self, uri: &Url, proxy: &Proxy, error: &HttpClientError);
}

/// Always connects directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProxySelector;

impl ProxySelector for NoProxySelector {
    fn select(&self, _uri: &Url) -> Vec<Proxy> {
        vec![Proxy::Direct]
    }

    fn connect_failed(&self, _uri: &Url, _proxy: &Proxy, _error: &HttpClientError) {}
}

/// Sends everything through one proxy.
#[derive(Debug, Clone)]
pub struct FixedProxySelector(pub ProxyAddress);

impl ProxySelector for FixedProxySelector {
    fn select(&self, _uri: &Url) -> Vec<Proxy> {
        vec![Proxy::Http(self.0.clone())]
    }

    fn connect_failed(&self, uri: &Url, proxy: &Proxy, error: &HttpClientError) {
        tracing::warn!("Connecting to {uri} through {proxy:?} failed: {error}");
    }
}

/// Reads the proxy named by a `305 Use Proxy` `Location` value.
///
/// Accepts `host`, `host:port`, `//host:port` and `scheme://host:port`,
/// with an optional trailing path. The port defaults to 80.
///
/// # Errors
/// `InvalidProxy` when no host is present or the port is not a number.
pub fn parse_use_proxy_location(location: &str) -> Result<ProxyAddress, HttpClientError> {
    let mut rest = location.trim();
    if let Some(index) = rest.find("//") {
        rest = &rest[index + 2..];
    } else if let Some((scheme, tail)) = rest.split_once(':') {
        let is_scheme = !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphabetic());
        if is_scheme && !tail.starts_with(|c: char| c.is_ascii_digit()) {
            rest = tail;
        }
    }

    let authority = rest.split('/').next().unwrap_or_default();
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| HttpClientError::InvalidProxy(location.to_string()))?;
            (host, port)
        }
        None => (authority, 80),
    };

    if host.is_empty() {
        return Err(HttpClientError::InvalidProxy(location.to_string()));
    }
    Ok(ProxyAddress::new(host, port))
}
