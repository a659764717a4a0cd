//! Collaborator contracts for moving bytes to a server.
//!
//! WHY: The exchange only needs "give me a duplex stream to this target" and
//! "take it back"; sockets, TLS and pooling policy live behind these traits.
//!
//! WHAT: `TargetConfig` names where a connection goes (origin plus optional
//! proxy), `Connection` is one duplex stream to it, `Connector` opens new
//! connections and `Transport` leases and recycles them.

use std::io::{self, Read, Write};
use std::time::Duration;

use url::Url;

use crate::wire::simple_http::client::HttpClientError;

/// A proxy hop, host and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyAddress {
    pub host: String,
    pub port: u16,
}

impl ProxyAddress {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl core::fmt::Display for ProxyAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Destination of a connection. Connections are only reused between
/// requests whose targets compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub proxy: Option<ProxyAddress>,
}

impl TargetConfig {
    /// Builds the target for `url`, reached directly or through `proxy`.
    ///
    /// # Errors
    /// `InvalidUrl` when the URL has no host or no known port.
    pub fn from_url(url: &Url, proxy: Option<ProxyAddress>) -> Result<Self, HttpClientError> {
        let host = url
            .host_str()
            .ok_or_else(|| HttpClientError::InvalidUrl(format!("missing host in {url}")))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| HttpClientError::InvalidUrl(format!("missing port in {url}")))?;

        Ok(Self {
            scheme: url.scheme().to_string(),
            host: host.to_string(),
            port,
            proxy,
        })
    }

    #[must_use]
    pub fn uses_proxy(&self) -> bool {
        self.proxy.is_some()
    }

    /// Host the socket actually connects to.
    #[must_use]
    pub fn connect_host(&self) -> &str {
        self.proxy
            .as_ref()
            .map_or(self.host.as_str(), |proxy| proxy.host.as_str())
    }

    /// Port the socket actually connects to.
    #[must_use]
    pub fn connect_port(&self) -> u16 {
        self.proxy.as_ref().map_or(self.port, |proxy| proxy.port)
    }
}

impl core::fmt::Display for TargetConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)?;
        if let Some(proxy) = &self.proxy {
            write!(f, " via {proxy}")?;
        }
        Ok(())
    }
}

/// One duplex byte stream to a target, carrying one exchange at a time.
pub trait Connection: Read + Write + Send {
    fn target(&self) -> &TargetConfig;

    /// Applies a read timeout to the underlying socket.
    ///
    /// # Errors
    /// Returns the socket error, if any.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Shuts the socket down. The connection must not be used afterwards.
    fn close_socket_and_streams(&mut self);
}

/// Opens fresh connections.
pub trait Connector: Send + Sync {
    /// # Errors
    /// Any failure to reach `target` within `connect_timeout`.
    fn connect(
        &self,
        target: &TargetConfig,
        connect_timeout: Option<Duration>,
    ) -> Result<Box<dyn Connection>, HttpClientError>;
}

/// Leases connections to exchanges and takes reusable ones back.
///
/// Implementations shared between threads must make `acquire` and `recycle`
/// atomic with respect to each other.
pub trait Transport: Send + Sync {
    /// # Errors
    /// Any failure to produce a connection for `target`.
    fn acquire(
        &self,
        target: &TargetConfig,
        connect_timeout: Option<Duration>,
    ) -> Result<Box<dyn Connection>, HttpClientError>;

    /// Takes back a connection whose last exchange ended cleanly.
    fn recycle(&self, connection: Box<dyn Connection>);
}
