use crate::wire::simple_http::client::errors::DnsError;
use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{Arc, Mutex};

/// Trait for DNS resolution.
///
/// The transport only needs "host and port in, addresses out"; how names
/// are resolved is left to the implementation.
pub trait DnsResolver: Send + Sync + Clone {
    /// Resolves a hostname and port to socket addresses.
    ///
    /// # Errors
    ///
    /// Returns `DnsError` if resolution fails.
    fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, DnsError>;
}

/// Resolves every host to one fixed address.
///
/// Useful for testing scenarios where a specific IP address is required.
#[derive(Debug, Clone)]
pub struct StaticSocketAddr(SocketAddr);

impl Default for StaticSocketAddr {
    /// Points at localhost port 80.
    fn default() -> Self {
        Self(SocketAddr::from(([127, 0, 0, 1], 80)))
    }
}

impl StaticSocketAddr {
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl DnsResolver for StaticSocketAddr {
    fn resolve(&self, _host: &str, _port: u16) -> Result<Vec<SocketAddr>, DnsError> {
        Ok(vec![self.0])
    }
}

/// System DNS resolver using `std::net::ToSocketAddrs`.
#[derive(Debug, Clone, Default)]
pub struct SystemDnsResolver;

impl SystemDnsResolver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl DnsResolver for SystemDnsResolver {
    fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, DnsError> {
        if host.is_empty() {
            return Err(DnsError::InvalidHost(host.to_string()));
        }

        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(DnsError::from)?
            .collect();

        if addrs.is_empty() {
            return Err(DnsError::NoAddressesFound(host.to_string()));
        }

        Ok(addrs)
    }
}

/// Resolver answering from a fixed table, for tests.
#[derive(Debug, Clone, Default)]
pub struct MockDnsResolver {
    responses: Arc<Mutex<HashMap<String, Result<Vec<SocketAddr>, DnsError>>>>,
}

impl MockDnsResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures a successful response for a hostname.
    #[must_use]
    pub fn with_response(self, host: &str, addrs: Vec<SocketAddr>) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(host.to_string(), Ok(addrs));
        }
        self
    }

    /// Configures an error response for a hostname.
    #[must_use]
    pub fn with_error(self, host: &str, error: DnsError) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(host.to_string(), Err(error));
        }
        self
    }
}

impl DnsResolver for MockDnsResolver {
    fn resolve(&self, host: &str, _port: u16) -> Result<Vec<SocketAddr>, DnsError> {
        let responses = self
            .responses
            .lock()
            .map_err(|_| DnsError::ResolutionFailed("lock poisoned".to_string()))?;

        responses
            .get(host)
            .cloned()
            .unwrap_or_else(|| Err(DnsError::NoAddressesFound(host.to_string())))
    }
}
