use crate::wire::simple_http::HttpReaderError;
use derive_more::From;
use std::io;

/// DNS resolution errors.
///
/// These errors occur during DNS hostname resolution.
#[derive(From, Debug, Clone)]
pub enum DnsError {
    /// DNS resolution failed for the given hostname.
    #[from(ignore)]
    ResolutionFailed(String),

    /// Invalid hostname provided.
    #[from(ignore)]
    InvalidHost(String),

    /// No addresses found for the given hostname.
    #[from(ignore)]
    NoAddressesFound(String),

    /// I/O error during DNS resolution, kept as text so the error stays `Clone`.
    #[from(ignore)]
    IoError(String),
}

impl From<io::Error> for DnsError {
    fn from(err: io::Error) -> Self {
        DnsError::IoError(err.to_string())
    }
}

impl std::error::Error for DnsError {}

impl core::fmt::Display for DnsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResolutionFailed(host) => {
                write!(f, "DNS resolution failed for host: {host}")
            }
            Self::InvalidHost(host) => {
                write!(f, "Invalid hostname: {host}")
            }
            Self::NoAddressesFound(host) => {
                write!(f, "No addresses found for host: {host}")
            }
            Self::IoError(err) => {
                write!(f, "I/O error during DNS resolution: {err}")
            }
        }
    }
}

/// HTTP client errors.
///
/// These errors can occur while driving an exchange: connecting, sending
/// the request, reading the response head, or following auth challenges
/// and redirects.
#[derive(From, Debug)]
pub enum HttpClientError {
    /// More redirects than the configured bound were received.
    #[from(ignore)]
    TooManyRedirects(u32),

    /// A 401/407 response arrived without the matching challenge header.
    #[from(ignore)]
    MissingChallenge(u16),

    /// A 407 response arrived on a direct connection.
    ProxyAuthWithoutProxy,

    /// A follow-up request was needed but the request body was already streamed.
    #[from(ignore)]
    CannotRetryStreamedBody(u16),

    /// The success body accessor was used on a 4xx/5xx response.
    #[from(ignore)]
    NotFound(String),

    /// The caller broke the request/response protocol (for example writing
    /// after the response was read).
    #[from(ignore)]
    Protocol(String),

    /// The exchange was asked to do something its current state does not allow.
    #[from(ignore)]
    InvalidState(String),

    /// DNS resolution error.
    #[from]
    DnsError(DnsError),

    /// Response head could not be read.
    #[from(ignore)]
    ReaderError(HttpReaderError),

    /// Connection failed.
    #[from(ignore)]
    ConnectionFailed(String),

    /// Connection timeout exceeded.
    #[from(ignore)]
    ConnectionTimeout(String),

    /// Invalid URL scheme (only HTTP is spoken by the built-in transport).
    #[from(ignore)]
    InvalidScheme(String),

    /// Invalid URL provided.
    #[from(ignore)]
    InvalidUrl(String),

    /// A proxy location could not be parsed.
    #[from(ignore)]
    InvalidProxy(String),

    /// I/O error during connection or communication.
    #[from]
    IoError(io::Error),
}

impl std::error::Error for HttpClientError {}

impl From<HttpReaderError> for HttpClientError {
    fn from(err: HttpReaderError) -> Self {
        match err {
            HttpReaderError::LineReadFailed(io_err) => HttpClientError::IoError(io_err),
            other => HttpClientError::ReaderError(other),
        }
    }
}

impl From<url::ParseError> for HttpClientError {
    fn from(err: url::ParseError) -> Self {
        HttpClientError::InvalidUrl(err.to_string())
    }
}

impl core::fmt::Display for HttpClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooManyRedirects(count) => write!(f, "Too many redirects: {count}"),
            Self::MissingChallenge(code) => {
                write!(f, "Received authentication challenge {code} without a challenge header")
            }
            Self::ProxyAuthWithoutProxy => {
                write!(f, "Received 407 proxy authentication request while not using a proxy")
            }
            Self::CannotRetryStreamedBody(code) => write!(
                f,
                "Cannot retry streamed request body after response {code}"
            ),
            Self::NotFound(url) => write!(f, "Not found: {url}"),
            Self::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            Self::InvalidState(msg) => write!(f, "Invalid state: {msg}"),
            Self::ReaderError(error) => write!(f, "Failed to read http from reader: {error}"),
            Self::DnsError(err) => write!(f, "DNS error: {err}"),
            Self::ConnectionFailed(msg) => write!(f, "Connection failed: {msg}"),
            Self::ConnectionTimeout(msg) => write!(f, "Connection timeout: {msg}"),
            Self::InvalidScheme(scheme) => write!(
                f,
                "Invalid URL scheme: {scheme} (only HTTP is supported)"
            ),
            Self::InvalidUrl(url) => write!(f, "Invalid URL: {url}"),
            Self::InvalidProxy(location) => write!(f, "Invalid proxy location: {location}"),
            Self::IoError(err) => write!(f, "I/O error: {err}"),
        }
    }
}
