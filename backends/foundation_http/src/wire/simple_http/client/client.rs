//! User-facing HTTP client.
//!
//! WHY: Exchanges need a transport, a proxy selector and the optional
//! cache, cookie and credential collaborators. Users should configure those
//! once and open exchanges from a single handle.
//!
//! WHAT: `ClientContext` bundles the immutable configuration and the
//! collaborators; `SimpleHttpClient` builds it and opens `HttpExchange`s.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::wire::simple_http::client::{
    Authenticator, ClientConfig, CookieStore, DnsResolver, HttpClientError, HttpExchange,
    NoProxySelector, PooledTransport, ProxySelector, SystemDnsResolver, TcpConnector, Transport,
};
use crate::wire::simple_http::{HttpHeaders, ResponseCache};

/// Everything an exchange shares with its siblings.
pub struct ClientContext {
    pub config: ClientConfig,
    pub transport: Arc<dyn Transport>,
    pub proxy_selector: Arc<dyn ProxySelector>,
    pub cache: Option<Arc<dyn ResponseCache>>,
    pub cookies: Option<Arc<dyn CookieStore>>,
    pub authenticator: Option<Arc<dyn Authenticator>>,
}

impl core::fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("config", &self.config)
            .field("cache", &self.cache.is_some())
            .field("cookies", &self.cookies.is_some())
            .field("authenticator", &self.authenticator.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder over a [`ClientContext`].
///
/// # Examples
///
/// ```ignore
/// let client = SimpleHttpClient::new()
///     .connect_timeout(Duration::from_secs(10))
///     .max_redirects(3);
/// let mut exchange = client.open("http://example.com/")?;
/// let code = exchange.response_code()?;
/// ```
pub struct SimpleHttpClient {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    proxy_selector: Arc<dyn ProxySelector>,
    cache: Option<Arc<dyn ResponseCache>>,
    cookies: Option<Arc<dyn CookieStore>>,
    authenticator: Option<Arc<dyn Authenticator>>,
    context: Option<Arc<ClientContext>>,
}

impl Default for SimpleHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SimpleHttpClient {
    /// Client with default configuration, connecting over TCP through the
    /// system resolver with a connection pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            transport: None,
            proxy_selector: Arc::new(NoProxySelector),
            cache: None,
            cookies: None,
            authenticator: None,
            context: None,
        }
    }

    /// Client whose pooled TCP transport resolves hosts with `resolver`.
    #[must_use]
    pub fn with_resolver<R: DnsResolver + 'static>(resolver: R) -> Self {
        let client = Self::new();
        let transport = PooledTransport::new(TcpConnector::new(resolver), &client.config.pool);
        client.transport(Arc::new(transport))
    }

    /// Replaces the configuration. Call before `transport`/`with_resolver`
    /// to have pool settings apply to the built-in transport.
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self.context = None;
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self.context = None;
        self
    }

    #[must_use]
    pub fn proxy_selector(mut self, selector: Arc<dyn ProxySelector>) -> Self {
        self.proxy_selector = selector;
        self.context = None;
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self.context = None;
        self
    }

    #[must_use]
    pub fn cookies(mut self, cookies: Arc<dyn CookieStore>) -> Self {
        self.cookies = Some(cookies);
        self.context = None;
        self
    }

    #[must_use]
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self.context = None;
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self.context = None;
        self
    }

    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = Some(timeout);
        self.context = None;
        self
    }

    #[must_use]
    pub fn max_redirects(mut self, max: u32) -> Self {
        self.config.max_redirects = max;
        self.context = None;
        self
    }

    #[must_use]
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self.context = None;
        self
    }

    /// Adds a header copied into every request.
    #[must_use]
    pub fn default_header(mut self, name: &str, value: &str) -> Self {
        self.config.default_headers.add(name, value);
        self.context = None;
        self
    }

    #[must_use]
    pub fn default_headers(mut self, headers: HttpHeaders) -> Self {
        self.config.default_headers = headers;
        self.context = None;
        self
    }

    #[must_use]
    pub fn client_config(&self) -> &ClientConfig {
        &self.config
    }

    /// Shared context handed to every exchange, built on first use.
    pub fn context(&mut self) -> Arc<ClientContext> {
        if let Some(context) = &self.context {
            return Arc::clone(context);
        }

        let transport = self.transport.clone().unwrap_or_else(|| {
            let connector = TcpConnector::new(SystemDnsResolver::new());
            let transport: Arc<dyn Transport> =
                Arc::new(PooledTransport::new(connector, &self.config.pool));
            transport
        });
        self.transport = Some(Arc::clone(&transport));

        let context = Arc::new(ClientContext {
            config: self.config.clone(),
            transport,
            proxy_selector: Arc::clone(&self.proxy_selector),
            cache: self.cache.clone(),
            cookies: self.cookies.clone(),
            authenticator: self.authenticator.clone(),
        });
        self.context = Some(Arc::clone(&context));
        context
    }

    /// Opens an unconnected GET exchange for `url`.
    ///
    /// # Errors
    /// `InvalidUrl` when `url` does not parse or has no host.
    pub fn open(&mut self, url: &str) -> Result<HttpExchange, HttpClientError> {
        let url = Url::parse(url)?;
        self.open_url(url)
    }

    /// # Errors
    /// `InvalidUrl` when `url` has no host.
    pub fn open_url(&mut self, url: Url) -> Result<HttpExchange, HttpClientError> {
        HttpExchange::new(self.context(), url)
    }
}

impl core::fmt::Debug for SimpleHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleHttpClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
