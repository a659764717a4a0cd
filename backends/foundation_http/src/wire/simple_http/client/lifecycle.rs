//! Ownership of one leased connection for the length of one exchange.
//!
//! WHY: Deciding whether a connection can carry another request needs facts
//! from both directions: was the request body finished, did either side ask
//! for `Connection: close`, did the response body end cleanly.
//!
//! WHAT: `ConnectionLifecycle` holds the leased connection and the transport
//! it came from. It is the byte source for response bodies; `release` applies
//! the reuse rule and drops every handle to the connection.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use crate::wire::simple_http::client::{Connection, TargetConfig, Transport};
use crate::wire::simple_http::BodySource;

/// Why a connection was released the way it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseDecision {
    Recycle,
    Close,
}

/// Applies the reuse rule: close when forced, when a request body was left
/// unfinished, or when either side asked for `Connection: close`.
#[must_use]
pub fn release_decision(
    force_close: bool,
    request_body_abandoned: bool,
    keep_alive: bool,
) -> ReleaseDecision {
    if force_close || request_body_abandoned || !keep_alive {
        ReleaseDecision::Close
    } else {
        ReleaseDecision::Recycle
    }
}

pub struct ConnectionLifecycle {
    connection: Option<Box<dyn Connection>>,
    transport: Arc<dyn Transport>,
    target: TargetConfig,
    request_body_abandoned: bool,
    keep_alive: bool,
    released: Option<ReleaseDecision>,
}

impl ConnectionLifecycle {
    pub fn new(connection: Box<dyn Connection>, transport: Arc<dyn Transport>) -> Self {
        let target = connection.target().clone();
        Self {
            connection: Some(connection),
            transport,
            target,
            request_body_abandoned: false,
            keep_alive: true,
            released: None,
        }
    }

    #[must_use]
    pub fn target(&self) -> &TargetConfig {
        &self.target
    }

    /// # Errors
    /// Socket errors, or `NotConnected` after release.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.connection_mut()?.set_read_timeout(timeout)
    }

    /// Records whether the request body was left open when the response
    /// was requested.
    pub fn set_request_body_abandoned(&mut self, abandoned: bool) {
        self.request_body_abandoned = abandoned;
    }

    /// Forbids reuse after this exchange, for `Connection: close` and similar.
    pub fn disable_keep_alive(&mut self) {
        self.keep_alive = false;
    }

    /// How the connection was released, once it has been.
    #[must_use]
    pub fn release_outcome(&self) -> Option<ReleaseDecision> {
        self.released
    }

    fn connection_mut(&mut self) -> io::Result<&mut Box<dyn Connection>> {
        self.connection.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "connection already released")
        })
    }
}

impl Read for ConnectionLifecycle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.connection_mut()?.read(buf)
    }
}

impl Write for ConnectionLifecycle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.connection_mut()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.connection_mut()?.flush()
    }
}

impl BodySource for ConnectionLifecycle {
    fn release(&mut self, force_close: bool) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };

        let decision = release_decision(force_close, self.request_body_abandoned, self.keep_alive);
        tracing::debug!("Releasing connection to {}: {decision:?}", self.target);
        match decision {
            ReleaseDecision::Recycle => self.transport.recycle(connection),
            ReleaseDecision::Close => connection.close_socket_and_streams(),
        }
        self.released = Some(decision);
    }
}

impl Drop for ConnectionLifecycle {
    fn drop(&mut self) {
        self.release(true);
    }
}

impl core::fmt::Debug for ConnectionLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLifecycle")
            .field("target", &self.target)
            .field("request_body_abandoned", &self.request_body_abandoned)
            .field("keep_alive", &self.keep_alive)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}
