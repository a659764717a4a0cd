//! Client configuration.
//!
//! WHY: Every exchange created by a client needs the same defaults: timeouts,
//! redirect and auth bounds, default headers, chunk sizing and pooling. They
//! are fixed when the client is built and never mutated afterwards.
//!
//! WHAT: `ClientConfig` and `PoolConfig`, deserializable from TOML with every
//! field optional. Durations are written in milliseconds.

use derive_more::From;
use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds};
use std::path::PathBuf;
use std::time::Duration;

use crate::wire::simple_http::HttpHeaders;

#[derive(Debug, From)]
pub enum ConfigError {
    #[from(ignore)]
    IOError(std::io::Error),

    #[from(ignore)]
    DeserializationFailed(toml::de::Error),

    InvalidPath(PathBuf),
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::DeserializationFailed(value)
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

impl std::error::Error for ConfigError {}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

pub const DEFAULT_USER_AGENT: &str = concat!("foundation_http/", env!("CARGO_PKG_VERSION"));

/// Connection pool settings.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Whether released connections are kept for reuse
    pub enabled: bool,
    /// Idle connections kept per target
    pub max_per_host: usize,
    /// Idle connections older than this are closed
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub max_idle_time: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_per_host: 5,
            max_idle_time: Duration::from_secs(300),
        }
    }
}

/// Configuration for HTTP client.
///
/// WHY: Replaces process-wide mutable defaults with one immutable value shared
/// by every exchange of a client.
///
/// WHAT: Holds timeouts, redirect/auth bounds, default headers, request body
/// framing knobs and connection pool settings.
///
/// HOW: Created via `Default`, explicit construction, or TOML through
/// [`ClientConfig::from_toml_str`] / [`ClientConfig::from_path`].
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Connection timeout, passed to the transport
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>", no_default)]
    pub connect_timeout: Option<Duration>,
    /// Read timeout applied to every leased connection
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>", no_default)]
    pub read_timeout: Option<Duration>,
    /// Whether exchanges follow redirects by default
    pub follow_redirects: bool,
    /// Redirects followed before failing; one more is an error
    pub max_redirects: u32,
    /// Credential retries before a challenge response is returned as final
    pub max_auth_attempts: u32,
    /// Whether exchanges consult and populate the response cache by default
    pub use_caches: bool,
    /// Sent as `User-Agent` unless a request sets its own
    pub user_agent: String,
    /// Copied into every new request's header table
    pub default_headers: HttpHeaders,
    /// Target on-wire size of request body chunks
    pub chunk_length: usize,
    /// Bodies of unknown length switch to chunked streaming past this many bytes
    pub request_buffer_threshold: Option<usize>,
    pub pool: PoolConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(30)),
            read_timeout: Some(Duration::from_secs(30)),
            follow_redirects: true,
            max_redirects: 4,
            max_auth_attempts: 8,
            use_caches: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            default_headers: HttpHeaders::new(),
            chunk_length: 1024,
            request_buffer_threshold: None,
            pool: PoolConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parses a TOML document; missing fields keep their defaults.
    ///
    /// # Errors
    /// `DeserializationFailed` on malformed TOML or mistyped fields.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    /// `InvalidPath` when `target` is not a file, `IOError` when it cannot be
    /// read, `DeserializationFailed` when it does not parse.
    pub fn from_path<V: Into<PathBuf>>(target: V) -> ConfigResult<Self> {
        let target_path = target.into();
        if !target_path.is_file() {
            return Err(ConfigError::InvalidPath(target_path));
        }
        let config_content = std::fs::read_to_string(&target_path)?;
        Self::from_toml_str(&config_content)
    }
}
