//! Plain TCP connections for the HTTP client.
//!
//! WHY: The exchange talks to `Connection`s; this module provides the
//! default implementation on top of `std::net::TcpStream`.
//!
//! WHAT: `TcpConnector` resolves the connect host (origin or proxy) through a
//! pluggable `DnsResolver` and tries each resolved address in turn.
//! `TcpConnection` buffers reads so line-oriented parsing stays cheap.

use crate::wire::simple_http::client::{
    Connection, Connector, DnsResolver, HttpClientError, SystemDnsResolver, TargetConfig,
};
use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

/// A TCP connection to a target.
#[derive(Debug)]
pub struct TcpConnection {
    target: TargetConfig,
    reader: BufReader<TcpStream>,
    closed: bool,
}

impl TcpConnection {
    /// Wraps an already connected stream.
    #[must_use]
    pub fn from_stream(target: TargetConfig, stream: TcpStream) -> Self {
        Self {
            target,
            reader: BufReader::new(stream),
            closed: false,
        }
    }

    pub fn stream(&self) -> &TcpStream {
        self.reader.get_ref()
    }
}

impl Read for TcpConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Write for TcpConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.reader.get_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.reader.get_mut().flush()
    }
}

impl Connection for TcpConnection {
    fn target(&self) -> &TargetConfig {
        &self.target
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.reader.get_ref().set_read_timeout(timeout)
    }

    fn close_socket_and_streams(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.reader.get_ref().shutdown(Shutdown::Both) {
            tracing::debug!("Shutdown of connection to {} failed: {err}", self.target);
        }
    }
}

/// Opens plain TCP connections.
///
/// # Type Parameters
///
/// * `R` - DNS resolver type implementing `DnsResolver` trait. Defaults to `SystemDnsResolver`.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector<R: DnsResolver = SystemDnsResolver> {
    resolver: R,
}

impl<R: DnsResolver> TcpConnector<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    /// Opens a connection to `target`.
    ///
    /// # Errors
    ///
    /// Returns errors for:
    /// - targets whose scheme is not `http` when no proxy is in use
    /// - DNS resolution failures
    /// - TCP connection failures
    /// - Connection timeout
    pub fn open(
        &self,
        target: &TargetConfig,
        timeout: Option<Duration>,
    ) -> Result<TcpConnection, HttpClientError> {
        if !target.uses_proxy() && target.scheme != "http" {
            return Err(HttpClientError::InvalidScheme(target.scheme.clone()));
        }

        let host = target.connect_host();
        let port = target.connect_port();
        let addrs = self.resolver.resolve(host, port)?;

        if addrs.is_empty() {
            return Err(HttpClientError::ConnectionFailed(format!(
                "No addresses resolved for {host}"
            )));
        }

        let mut last_error = None;
        for addr in addrs {
            let attempt = match timeout {
                Some(duration) => TcpStream::connect_timeout(&addr, duration),
                None => TcpStream::connect(addr),
            };

            match attempt {
                Ok(stream) => {
                    tracing::debug!("Connected to {addr} for {target}");
                    return Ok(TcpConnection::from_stream(target.clone(), stream));
                }
                Err(err) => {
                    tracing::debug!("Connecting to {addr} failed: {err}");
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err)
                if matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) =>
            {
                Err(HttpClientError::ConnectionTimeout(format!(
                    "Connection to {host}:{port} timed out"
                )))
            }
            Some(err) => Err(HttpClientError::ConnectionFailed(err.to_string())),
            None => Err(HttpClientError::ConnectionFailed(format!(
                "Failed to connect to {host}:{port}"
            ))),
        }
    }
}

impl<R: DnsResolver> Connector for TcpConnector<R> {
    fn connect(
        &self,
        target: &TargetConfig,
        connect_timeout: Option<Duration>,
    ) -> Result<Box<dyn Connection>, HttpClientError> {
        Ok(Box::new(self.open(target, connect_timeout)?))
    }
}
