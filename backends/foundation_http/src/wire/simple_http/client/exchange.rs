//! Request orchestrator.
//!
//! WHY: A single logical request may need several round trips (100-continue,
//! credential retries, redirects, a proxy switch) and each of them has to
//! leave the connection either reusable or closed.
//!
//! WHAT: `HttpExchange` owns the request head, the request body strategy,
//! the leased connection and, once read, the response head and body.
//!
//! HOW: The exchange moves through `ExchangeState` via `transition`; the
//! follow-up decision after every response head is `decide_follow_up`. All
//! I/O happens on the calling thread.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::SystemTime;

use url::{Position, Url};

use crate::wire::simple_http::client::{
    decide_follow_up, merge_cookie_headers, ClientContext, ConnectionLifecycle, ExchangeBody,
    ExchangeEvent, ExchangeState, FollowUp, FollowUpContext, HeadOutcome, HttpClientError, Proxy,
    ProxyAddress, RawBody, TargetConfig,
};
use crate::wire::simple_http::{
    epoch_millis, has_response_body, is_cacheable_status, may_store, parse_status_line,
    read_headers, read_line, select_framing, BodyFraming, BodySource, BodyWriter, CacheContext,
    CacheInterposer, CachedResponse, DetachedSource, FieldMap, HttpHeaders, HttpReaderError,
    Proto, RequestBody, RequestCacheControl, RequestSink, ResponseBody, ResponseCacheControl,
    ResponseSource, SimpleMethod, StatusLine, RECEIVED_MILLIS, SENT_MILLIS,
};

/// Answer to a request that may only be served from the cache but cannot be.
const GATEWAY_TIMEOUT: &str = "HTTP/1.1 504 Gateway Timeout";

/// Streaming mode chosen by the caller before the body is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamingMode {
    Default,
    FixedLength(u64),
    Chunked(usize),
}

/// Framing header announced in the request head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeadFraming {
    NoBody,
    ContentLength(u64),
    Chunked,
}

/// Connection-bound sink for request bodies.
///
/// Holds back the request head of a buffered body until buffering gives
/// way to chunked streaming.
pub struct WireSink<'a> {
    lifecycle: &'a mut ConnectionLifecycle,
    head: Option<Vec<u8>>,
    head_sent: &'a mut bool,
}

impl WireSink<'_> {
    fn send_head(&mut self) -> io::Result<()> {
        if let Some(head) = self.head.take() {
            if !*self.head_sent {
                tracing::debug!("Request body outgrew its buffer, sending chunked head");
                self.lifecycle.write_all(&head)?;
                *self.head_sent = true;
            }
        }
        Ok(())
    }
}

impl Write for WireSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send_head()?;
        self.lifecycle.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lifecycle.flush()
    }
}

impl RequestSink for WireSink<'_> {
    fn start_streaming(&mut self) -> io::Result<()> {
        self.send_head()
    }
}

/// A stored response waiting for the origin to confirm it.
struct Revalidation {
    policy: ResponseCacheControl,
    status: StatusLine,
    headers: HttpHeaders,
    body: Box<dyn Read + Send>,
}

/// One logical HTTP request and its response.
///
/// Not shareable between threads while in use: the request body must be
/// written completely before the response is read.
pub struct HttpExchange {
    context: Arc<ClientContext>,
    url: Url,
    method: SimpleMethod,
    proto: Proto,
    request_headers: HttpHeaders,
    follow_redirects: bool,
    use_caches: bool,
    streaming: StreamingMode,
    state: ExchangeState,
    proxy_override: Option<ProxyAddress>,
    target: Option<TargetConfig>,
    request_body: Option<RequestBody>,
    head_sent: bool,
    status: Option<StatusLine>,
    response_headers: Option<HttpHeaders>,
    response_body: Option<ExchangeBody>,
    lifecycle: Option<ConnectionLifecycle>,
    revalidation: Option<Revalidation>,
    sent_at: Option<SystemTime>,
    redirects: u32,
    auth_attempts: u32,
}

impl HttpExchange {
    /// Creates an unconnected GET exchange for `url`.
    ///
    /// # Errors
    /// `InvalidUrl` when `url` has no host.
    pub fn new(context: Arc<ClientContext>, url: Url) -> Result<Self, HttpClientError> {
        if url.host_str().is_none() {
            return Err(HttpClientError::InvalidUrl(format!("missing host in {url}")));
        }

        Ok(Self {
            request_headers: context.config.default_headers.clone(),
            follow_redirects: context.config.follow_redirects,
            use_caches: context.config.use_caches,
            context,
            url,
            method: SimpleMethod::GET,
            proto: Proto::HTTP11,
            streaming: StreamingMode::Default,
            state: ExchangeState::Unconnected,
            proxy_override: None,
            target: None,
            request_body: None,
            head_sent: false,
            status: None,
            response_headers: None,
            response_body: None,
            lifecycle: None,
            revalidation: None,
            sent_at: None,
            redirects: 0,
            auth_attempts: 0,
        })
    }

    /// Current URL; changes as redirects are followed.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn method(&self) -> &SimpleMethod {
        &self.method
    }

    #[must_use]
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    #[must_use]
    pub fn proto(&self) -> Proto {
        self.proto
    }

    /// True when the last connection went through a proxy.
    #[must_use]
    pub fn using_proxy(&self) -> bool {
        self.target.as_ref().is_some_and(TargetConfig::uses_proxy)
    }

    /// Redirects followed so far.
    #[must_use]
    pub fn redirect_count(&self) -> u32 {
        self.redirects
    }

    fn ensure_unconnected(&self, what: &str) -> Result<(), HttpClientError> {
        if self.state == ExchangeState::Unconnected && self.request_body.is_none() {
            Ok(())
        } else {
            Err(HttpClientError::InvalidState(format!(
                "cannot {what} once connected"
            )))
        }
    }

    /// # Errors
    /// `Protocol` for `CONNECT`, `InvalidState` once connected.
    pub fn set_method(&mut self, method: SimpleMethod) -> Result<(), HttpClientError> {
        self.ensure_unconnected("change the method")?;
        if method == SimpleMethod::CONNECT {
            return Err(HttpClientError::Protocol(
                "CONNECT is not a request method callers may use".into(),
            ));
        }
        self.method = method;
        Ok(())
    }

    /// Replaces every request header named `name`.
    ///
    /// # Errors
    /// `InvalidState` once connected.
    pub fn set_request_property(
        &mut self,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), HttpClientError> {
        self.ensure_unconnected("set request headers")?;
        self.request_headers.set(name, value);
        Ok(())
    }

    /// Adds a request header, keeping existing ones of the same name.
    ///
    /// # Errors
    /// `InvalidState` once connected.
    pub fn add_request_property(
        &mut self,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), HttpClientError> {
        self.ensure_unconnected("add request headers")?;
        self.request_headers.add(name, value);
        Ok(())
    }

    /// Asks the server to send the body only if it changed after `time`.
    ///
    /// # Errors
    /// `InvalidState` once connected.
    pub fn set_if_modified_since(&mut self, time: SystemTime) -> Result<(), HttpClientError> {
        self.ensure_unconnected("set If-Modified-Since")?;
        self.request_headers
            .set("If-Modified-Since", httpdate::fmt_http_date(time));
        Ok(())
    }

    #[must_use]
    pub fn request_property(&self, name: &str) -> Option<&str> {
        self.request_headers.get(name)
    }

    #[must_use]
    pub fn request_properties(&self) -> FieldMap {
        self.request_headers.field_map()
    }

    pub fn set_follow_redirects(&mut self, follow: bool) {
        self.follow_redirects = follow;
    }

    pub fn set_use_caches(&mut self, use_caches: bool) {
        self.use_caches = use_caches;
    }

    /// Streams the body with a `Content-Length` of exactly `length` bytes.
    ///
    /// # Errors
    /// `InvalidState` once connected or when a streaming mode is already set.
    pub fn set_fixed_length_streaming_mode(&mut self, length: u64) -> Result<(), HttpClientError> {
        self.ensure_unconnected("set a streaming mode")?;
        if self.streaming != StreamingMode::Default {
            return Err(HttpClientError::InvalidState(
                "streaming mode already set".into(),
            ));
        }
        self.streaming = StreamingMode::FixedLength(length);
        Ok(())
    }

    /// Streams the body as chunks of about `chunk_length` bytes on the wire.
    /// A `chunk_length` of zero uses the configured default.
    ///
    /// # Errors
    /// `InvalidState` once connected or when a streaming mode is already set.
    pub fn set_chunked_streaming_mode(&mut self, chunk_length: usize) -> Result<(), HttpClientError> {
        self.ensure_unconnected("set a streaming mode")?;
        if self.streaming != StreamingMode::Default {
            return Err(HttpClientError::InvalidState(
                "streaming mode already set".into(),
            ));
        }
        let chunk_length = if chunk_length == 0 {
            self.context.config.chunk_length
        } else {
            chunk_length
        };
        self.streaming = StreamingMode::Chunked(chunk_length);
        Ok(())
    }

    fn advance(&mut self, event: ExchangeEvent) -> Result<(), HttpClientError> {
        match self.state.transition(event) {
            Some(next) => {
                tracing::debug!("Exchange {:?} --{event:?}--> {next:?}", self.state);
                self.state = next;
                Ok(())
            }
            None => Err(HttpClientError::InvalidState(format!(
                "{event:?} is not valid while {:?}",
                self.state
            ))),
        }
    }

    /// Serves the request from the cache or leases a connection for it.
    /// Does nothing once connected.
    ///
    /// # Errors
    /// Connection failures from every proxy candidate; the last one is returned.
    pub fn connect(&mut self) -> Result<(), HttpClientError> {
        if self.state != ExchangeState::Unconnected {
            return Ok(());
        }
        self.advance(ExchangeEvent::Connect)?;

        if self.request_body.is_none() && self.serve_from_cache()? {
            return Ok(());
        }
        self.open_connection()
    }

    fn caching(&self) -> bool {
        self.use_caches && self.context.cache.is_some()
    }

    fn cache_candidate(&self) -> Option<(StatusLine, CachedResponse)> {
        if !self.use_caches {
            return None;
        }
        let cache = self.context.cache.as_ref()?;
        let cached = cache.get(&self.url, &self.method, &self.request_headers.field_map())?;
        match cached
            .headers
            .status_line()
            .and_then(|line| parse_status_line(line).ok().flatten())
        {
            Some(status) => Some((status, cached)),
            None => {
                tracing::warn!("Ignoring cached response for {} without a status line", self.url);
                None
            }
        }
    }

    /// Answers from the cache when a stored response is fresh. A stale one
    /// with validators makes the request conditional and waits for the
    /// origin's verdict.
    fn serve_from_cache(&mut self) -> Result<bool, HttpClientError> {
        let request = RequestCacheControl::from_headers(&self.request_headers);

        if let Some((status, cached)) = self.cache_candidate() {
            let policy = ResponseCacheControl::from_headers(&cached.headers);
            match policy.choose_source(SystemTime::now(), &request) {
                ResponseSource::Cache => {
                    tracing::debug!("Serving {} {} from cache", self.method, self.url);
                    self.install_response(status, cached.headers, cached.body);
                    self.advance(ExchangeEvent::CacheHit)?;
                    return Ok(true);
                }
                ResponseSource::Conditional(conditions) if !request.only_if_cached => {
                    tracing::debug!("Revalidating cached response for {}", self.url);
                    for (name, value) in conditions {
                        self.request_headers.add(name, value);
                    }
                    self.revalidation = Some(Revalidation {
                        policy,
                        status,
                        headers: cached.headers,
                        body: cached.body,
                    });
                }
                ResponseSource::Conditional(_) | ResponseSource::Network => {}
            }
        }

        if !request.only_if_cached {
            return Ok(false);
        }
        tracing::debug!("No usable cached response for {}, network not allowed", self.url);
        let mut headers = HttpHeaders::new();
        headers.set_status_line(GATEWAY_TIMEOUT);
        let status = parse_status_line(GATEWAY_TIMEOUT)?
            .ok_or_else(|| HttpClientError::Protocol("bad synthesized status".into()))?;
        self.install_response(status, headers, Box::new(io::empty()));
        self.advance(ExchangeEvent::CacheHit)?;
        Ok(true)
    }

    /// Makes a response that did not come off the connection the final one.
    fn install_response(
        &mut self,
        status: StatusLine,
        headers: HttpHeaders,
        body: Box<dyn Read + Send>,
    ) {
        let framing = if has_response_body(&self.method, status.code) {
            BodyFraming::UntilEof
        } else {
            BodyFraming::Empty
        };
        let source: Box<dyn BodySource + Send> = Box::new(DetachedSource(body));
        let body = ResponseBody::new(source, framing, CacheInterposer::passthrough());

        self.status = Some(status);
        self.response_headers = Some(headers);
        let body = self.decode_body(body, framing);
        self.response_body = Some(body);
    }

    /// True when the caller left `Accept-Encoding` alone, so gzip is
    /// requested and undone on their behalf.
    fn transparent_gzip(&self) -> bool {
        self.request_headers.get("Accept-Encoding").is_none()
    }

    /// Wraps a gzip-encoded body in a decoder when the exchange asked for
    /// gzip itself. `Content-Encoding` is then removed from the response.
    fn decode_body(&mut self, body: RawBody, framing: BodyFraming) -> ExchangeBody {
        let gzipped = framing != BodyFraming::Empty
            && self.transparent_gzip()
            && self
                .response_headers
                .as_ref()
                .and_then(|headers| headers.get("Content-Encoding"))
                .is_some_and(|value| value.trim().eq_ignore_ascii_case("gzip"));
        if !gzipped {
            return ExchangeBody::identity(body);
        }

        tracing::debug!("Decoding gzip response body for {}", self.url);
        if let Some(headers) = self.response_headers.as_mut() {
            headers.remove_all("Content-Encoding");
        }
        ExchangeBody::gzip(body)
    }

    fn open_connection(&mut self) -> Result<(), HttpClientError> {
        let context = Arc::clone(&self.context);
        let mut candidates = match &self.proxy_override {
            Some(address) => vec![Proxy::Http(address.clone())],
            None => context.proxy_selector.select(&self.url),
        };
        if candidates.is_empty() {
            candidates.push(Proxy::Direct);
        }

        let mut last_error = None;
        for proxy in candidates {
            let target = TargetConfig::from_url(&self.url, proxy.address().cloned())?;
            match context
                .transport
                .acquire(&target, context.config.connect_timeout)
            {
                Ok(connection) => {
                    let mut lifecycle =
                        ConnectionLifecycle::new(connection, Arc::clone(&context.transport));
                    lifecycle.set_read_timeout(context.config.read_timeout)?;

                    tracing::debug!("Connected to {target}");
                    self.lifecycle = Some(lifecycle);
                    self.target = Some(target);
                    self.head_sent = false;
                    return self.advance(ExchangeEvent::Connected);
                }
                Err(err) => {
                    tracing::debug!("Connecting to {target} failed: {err}");
                    context.proxy_selector.connect_failed(&self.url, &proxy, &err);
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            HttpClientError::ConnectionFailed(format!("no route to {}", self.url))
        }))
    }

    fn new_request_body(&self) -> RequestBody {
        let config = &self.context.config;
        match self.streaming {
            StreamingMode::FixedLength(length) => RequestBody::fixed_length(length),
            StreamingMode::Chunked(chunk_length) if self.proto.is_http11() => {
                RequestBody::chunked(chunk_length)
            }
            StreamingMode::Chunked(_) | StreamingMode::Default => {
                let declared = self
                    .request_headers
                    .get("Content-Length")
                    .and_then(|value| value.trim().parse::<usize>().ok());
                match declared {
                    Some(limit) => RequestBody::retryable(Some(limit)),
                    None if self.proto.is_http11() => {
                        RequestBody::buffered(config.request_buffer_threshold, config.chunk_length)
                    }
                    None => RequestBody::buffered(None, config.chunk_length),
                }
            }
        }
    }

    /// Opens the request body for writing, connecting first if needed.
    ///
    /// A GET exchange becomes a POST. Fixed-length and chunked bodies put the
    /// request head on the wire immediately; buffered bodies send it when the
    /// response is requested, or when they switch to chunked streaming.
    ///
    /// # Errors
    /// `Protocol` after the response was read or for methods that carry no
    /// body; connection failures from [`HttpExchange::connect`].
    pub fn output_stream(&mut self) -> Result<BodyWriter<'_, WireSink<'_>>, HttpClientError> {
        if self.state.request_committed() || self.response_headers.is_some() {
            return Err(HttpClientError::Protocol(
                "cannot write the request body after reading the response".into(),
            ));
        }

        if self.request_body.is_none() {
            if self.method == SimpleMethod::GET {
                self.method = SimpleMethod::POST;
            }
            if !self.method.permits_request_body() {
                return Err(HttpClientError::Protocol(format!(
                    "{} does not support writing a request body",
                    self.method
                )));
            }
            self.request_body = Some(self.new_request_body());
        }
        self.connect()?;

        let cached = self
            .request_body
            .as_ref()
            .is_some_and(RequestBody::is_cached);
        let deferred_head = if self.head_sent {
            None
        } else if cached {
            Some(self.render_head(HeadFraming::Chunked))
        } else {
            let head = self.render_head(self.head_framing());
            self.lifecycle_mut()?.write_all(&head)?;
            self.head_sent = true;
            None
        };

        let Self {
            request_body,
            lifecycle,
            head_sent,
            ..
        } = self;
        let (Some(body), Some(lifecycle)) = (request_body.as_mut(), lifecycle.as_mut()) else {
            return Err(HttpClientError::InvalidState(
                "request body has no connection".into(),
            ));
        };

        Ok(BodyWriter::new(
            body,
            WireSink {
                lifecycle,
                head: deferred_head,
                head_sent,
            },
        ))
    }

    fn lifecycle_mut(&mut self) -> Result<&mut ConnectionLifecycle, HttpClientError> {
        self.lifecycle
            .as_mut()
            .ok_or_else(|| HttpClientError::InvalidState("no connection leased".into()))
    }

    fn head_framing(&self) -> HeadFraming {
        match &self.request_body {
            None => HeadFraming::NoBody,
            Some(body) if body.is_chunked() => HeadFraming::Chunked,
            Some(body) => body
                .size()
                .map_or(HeadFraming::Chunked, HeadFraming::ContentLength),
        }
    }

    fn request_target(&self) -> String {
        if self.using_proxy() {
            self.url[..Position::AfterQuery].to_string()
        } else {
            let target = &self.url[Position::BeforePath..Position::AfterQuery];
            if target.is_empty() {
                "/".to_string()
            } else {
                target.to_string()
            }
        }
    }

    fn host_header(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    /// Request line plus headers, with defaults filled in where the caller
    /// set nothing.
    fn render_head(&self, framing: HeadFraming) -> Vec<u8> {
        let mut headers = self.request_headers.clone();
        headers.add_if_absent("User-Agent", self.context.config.user_agent.as_str());
        headers.add_if_absent("Host", self.host_header());
        if self.proto.is_http11() {
            headers.add_if_absent("Connection", "Keep-Alive");
        }
        if self.using_proxy() {
            headers.add_if_absent("Proxy-Connection", "Keep-Alive");
        }
        if self.transparent_gzip() {
            headers.add("Accept-Encoding", "gzip");
        }

        if framing != HeadFraming::NoBody {
            headers.add_if_absent("Content-Type", "application/x-www-form-urlencoded");
        }
        match framing {
            HeadFraming::NoBody => {}
            HeadFraming::ContentLength(length) => {
                headers.add_if_absent("Content-Length", length.to_string());
            }
            HeadFraming::Chunked => headers.add_if_absent("Transfer-Encoding", "chunked"),
        }

        if let Some(cookies) = &self.context.cookies {
            let extra = cookies.get(&self.url, &headers.field_map());
            merge_cookie_headers(&mut headers, &extra);
        }

        let request_line = format!("{} {} {}", self.method, self.request_target(), self.proto);
        tracing::debug!("Sending request: {request_line}");

        let mut head = Vec::with_capacity(256);
        head.extend_from_slice(request_line.as_bytes());
        head.extend_from_slice(b"\r\n");
        for (name, value) in headers.fields().filter(|(name, _)| !name.is_empty()) {
            head.extend_from_slice(name.as_bytes());
            head.extend_from_slice(b": ");
            head.extend_from_slice(value.as_bytes());
            head.extend_from_slice(b"\r\n");
        }
        head.extend_from_slice(b"\r\n");
        head
    }

    fn send_request(&mut self) -> Result<(), HttpClientError> {
        if let Some(body) = self.request_body.as_mut() {
            if body.is_cached() {
                body.close_to(&mut Vec::<u8>::new())?;
            }
        }

        let abandoned = self
            .request_body
            .as_ref()
            .is_some_and(|body| !body.is_closed());
        if abandoned {
            tracing::warn!("Request body for {} was not closed before reading the response", self.url);
        }

        let head = if self.head_sent {
            None
        } else {
            Some(self.render_head(self.head_framing()))
        };
        let close_requested = self
            .request_headers
            .get("Connection")
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("close"));

        let Some(lifecycle) = self.lifecycle.as_mut() else {
            return Err(HttpClientError::InvalidState("no connection leased".into()));
        };
        if let Some(head) = head {
            lifecycle.write_all(&head)?;
        }
        if let Some(body) = self.request_body.as_ref().filter(|body| body.is_cached()) {
            body.write_to_socket(lifecycle)?;
        }
        lifecycle.flush()?;
        lifecycle.set_request_body_abandoned(abandoned);
        if close_requested {
            lifecycle.disable_keep_alive();
        }

        self.head_sent = true;
        self.sent_at = Some(SystemTime::now());
        self.advance(ExchangeEvent::RequestSent)
    }

    /// Reads status lines and headers until a non-100 response arrives.
    fn read_response_head(&mut self) -> Result<u16, HttpClientError> {
        loop {
            let line = read_line(self.lifecycle_mut()?)?
                .ok_or(HttpReaderError::EndOfStreamBeforeStatusLine)?;
            self.advance(ExchangeEvent::StatusLineRead)?;

            let status = parse_status_line(&line)?;
            let mut headers = HttpHeaders::new();
            headers.set_status_line(line);
            let Some(lifecycle) = self.lifecycle.as_mut() else {
                return Err(HttpClientError::InvalidState("no connection leased".into()));
            };
            read_headers(lifecycle, &mut headers)?;

            let code = status.as_ref().map_or(0, |status| status.code);
            if code == 100 {
                tracing::debug!("Skipping 100 Continue");
                self.advance(ExchangeEvent::HeadersRead(HeadOutcome::Continue))?;
                continue;
            }

            let proto = status.as_ref().map_or(self.proto, |status| status.proto);
            let connection = headers.get("Connection").map(str::trim);
            let close_requested = connection.is_some_and(|value| value.eq_ignore_ascii_case("close"));
            let keep_alive_offered =
                connection.is_some_and(|value| value.eq_ignore_ascii_case("keep-alive"));
            if close_requested || (!proto.is_http11() && !keep_alive_offered) {
                lifecycle.disable_keep_alive();
            }
            if !proto.is_http11() && self.proto.is_http11() {
                tracing::debug!("Server speaks {proto}, downgrading exchange");
                self.proto = Proto::HTTP10;
            }

            if let Some(cookies) = &self.context.cookies {
                cookies.put(&self.url, &headers.field_map());
            }
            if self.caching() {
                let received_at = SystemTime::now();
                headers.add(SENT_MILLIS, epoch_millis(self.sent_at.unwrap_or(received_at)));
                headers.add(RECEIVED_MILLIS, epoch_millis(received_at));
            }

            self.status = status;
            self.response_headers = Some(headers);
            return Ok(code);
        }
    }

    fn follow_up(&self, code: u16) -> Result<FollowUp, HttpClientError> {
        let config = &self.context.config;
        let empty = HttpHeaders::new();
        let context = FollowUpContext {
            code,
            headers: self.response_headers.as_ref().unwrap_or(&empty),
            url: &self.url,
            proxy: self.target.as_ref().and_then(|target| target.proxy.as_ref()),
            follow_redirects: self.follow_redirects,
            has_request_body: self.request_body.is_some(),
            redirects: self.redirects,
            max_redirects: config.max_redirects,
            auth_attempts: self.auth_attempts,
            max_auth_attempts: config.max_auth_attempts,
        };
        decide_follow_up(&context, self.context.authenticator.as_deref())
    }

    fn apply_follow_up(&mut self, follow_up: FollowUp) {
        match follow_up {
            FollowUp::Final => {}
            FollowUp::Authorize { header, value, .. } => {
                tracing::debug!("Retrying {} with {header}", self.url);
                self.request_headers.set(header, value);
                self.auth_attempts += 1;
            }
            FollowUp::Redirect { url, drop_host } => {
                tracing::debug!("Redirecting {} to {url}", self.url);
                self.revalidation = None;
                if drop_host {
                    self.request_headers.remove_all("Host");
                }
                self.url = url;
                self.redirects += 1;
            }
            FollowUp::UseProxy(address) => {
                tracing::debug!("Retrying {} through proxy {address}", self.url);
                self.proxy_override = Some(address);
                self.redirects += 1;
            }
        }
    }

    /// Drops an intermediate response so its connection can be reused.
    /// EOF-delimited bodies are not drained; their connection is closed.
    fn discard_response(&mut self, code: u16) -> Result<(), HttpClientError> {
        let headers = self.response_headers.take().unwrap_or_default();
        self.status = None;
        let Some(mut lifecycle) = self.lifecycle.take() else {
            return Ok(());
        };

        match select_framing(&self.method, code, &headers) {
            BodyFraming::UntilEof => lifecycle.release(true),
            framing => {
                let mut body = ResponseBody::new(lifecycle, framing, CacheInterposer::passthrough());
                io::copy(&mut body, &mut io::sink())?;
            }
        }
        Ok(())
    }

    fn cache_interposer(&self, code: u16, headers: &HttpHeaders) -> CacheInterposer {
        if !(self.use_caches && is_cacheable_status(code))
            || !may_store(&self.request_headers, headers)
        {
            return CacheInterposer::passthrough();
        }
        let Some(cache) = &self.context.cache else {
            return CacheInterposer::passthrough();
        };

        let request_headers = self.request_headers.field_map();
        let context = CacheContext {
            method: &self.method,
            request_headers: &request_headers,
            response_headers: headers,
            code,
        };
        match cache.put(&self.url, &context) {
            Some(entry) => {
                tracing::debug!("Caching response for {}", self.url);
                CacheInterposer::new(entry)
            }
            None => CacheInterposer::passthrough(),
        }
    }

    fn open_response_body(&mut self, code: u16) -> Result<(), HttpClientError> {
        let Some(headers) = self.response_headers.as_ref() else {
            return Err(HttpClientError::InvalidState("no response head".into()));
        };
        let framing = select_framing(&self.method, code, headers);
        let cache = self.cache_interposer(code, headers);

        let Some(lifecycle) = self.lifecycle.take() else {
            return Err(HttpClientError::InvalidState("no connection leased".into()));
        };
        let source: Box<dyn BodySource + Send> = Box::new(lifecycle);
        let body = ResponseBody::new(source, framing, cache);
        let body = self.decode_body(body, framing);
        self.response_body = Some(body);
        Ok(())
    }

    /// Hands the final response to the caller, or the stored one when the
    /// origin confirmed it.
    fn finish_response(&mut self, code: u16) -> Result<(), HttpClientError> {
        let Some(revalidation) = self.revalidation.take() else {
            return self.open_response_body(code);
        };
        let confirmed = self
            .response_headers
            .as_ref()
            .is_some_and(|headers| revalidation.policy.validate(code, headers));
        if !confirmed {
            return self.open_response_body(code);
        }

        tracing::debug!("Origin confirmed cached response for {}", self.url);
        self.discard_response(code)?;
        self.install_response(revalidation.status, revalidation.headers, revalidation.body);
        Ok(())
    }

    /// Drives the exchange until a final response head is available.
    fn retrieve_response(&mut self) -> Result<(), HttpClientError> {
        if self.state == ExchangeState::BodyReady {
            return Ok(());
        }
        self.connect()?;
        match self.state {
            ExchangeState::BodyReady => return Ok(()),
            ExchangeState::Sending => {}
            other => {
                return Err(HttpClientError::InvalidState(format!(
                    "cannot read a response while {other:?}"
                )))
            }
        }

        loop {
            self.send_request()?;
            let code = self.read_response_head()?;
            let follow_up = self.follow_up(code)?;
            self.advance(ExchangeEvent::HeadersRead(follow_up.outcome()))?;

            if follow_up == FollowUp::Final {
                return self.finish_response(code);
            }

            if self
                .request_body
                .as_ref()
                .is_some_and(|body| !body.is_retryable())
            {
                return Err(HttpClientError::CannotRetryStreamedBody(code));
            }

            self.apply_follow_up(follow_up);
            self.discard_response(code)?;
            self.advance(ExchangeEvent::Retry)?;
            self.open_connection()?;
        }
    }

    /// Status code of the final response, `None` when the status line was
    /// not recognizable.
    ///
    /// # Errors
    /// Anything that stopped the exchange from producing a response head.
    pub fn response_code(&mut self) -> Result<Option<u16>, HttpClientError> {
        self.retrieve_response()?;
        Ok(self.status.as_ref().map(|status| status.code))
    }

    /// # Errors
    /// See [`HttpExchange::response_code`].
    pub fn response_message(&mut self) -> Result<Option<&str>, HttpClientError> {
        self.retrieve_response()?;
        Ok(self
            .status
            .as_ref()
            .and_then(|status| status.message.as_deref()))
    }

    /// Final response head, status line included.
    ///
    /// # Errors
    /// See [`HttpExchange::response_code`].
    pub fn response_headers(&mut self) -> Result<&HttpHeaders, HttpClientError> {
        self.retrieve_response()?;
        self.response_headers
            .as_ref()
            .ok_or_else(|| HttpClientError::InvalidState("no response head".into()))
    }

    /// Last response header named `name`.
    ///
    /// # Errors
    /// See [`HttpExchange::response_code`].
    pub fn header_field(&mut self, name: &str) -> Result<Option<&str>, HttpClientError> {
        Ok(self.response_headers()?.get(name))
    }

    /// Header value by position; position 0 is the status line.
    ///
    /// # Errors
    /// See [`HttpExchange::response_code`].
    pub fn header_field_at(&mut self, index: usize) -> Result<Option<&str>, HttpClientError> {
        Ok(self.response_headers()?.value_at(index))
    }

    /// Header name by position; the status line has an empty name.
    ///
    /// # Errors
    /// See [`HttpExchange::response_code`].
    pub fn header_field_key_at(&mut self, index: usize) -> Result<Option<&str>, HttpClientError> {
        Ok(self.response_headers()?.key_at(index))
    }

    /// # Errors
    /// See [`HttpExchange::response_code`].
    pub fn header_fields(&mut self) -> Result<FieldMap, HttpClientError> {
        Ok(self.response_headers()?.field_map())
    }

    /// Declared `Content-Length` of the final response.
    ///
    /// # Errors
    /// See [`HttpExchange::response_code`].
    pub fn content_length(&mut self) -> Result<Option<u64>, HttpClientError> {
        Ok(self
            .header_field("Content-Length")?
            .and_then(|value| value.trim().parse().ok()))
    }

    fn response_body_mut(&mut self) -> Result<&mut ExchangeBody, HttpClientError> {
        self.response_body
            .as_mut()
            .ok_or_else(|| HttpClientError::InvalidState("response body already taken".into()))
    }

    /// Body of a successful response.
    ///
    /// # Errors
    /// `NotFound` for status 400 and above (use
    /// [`HttpExchange::error_stream`]), plus anything from
    /// [`HttpExchange::response_code`].
    pub fn input_stream(&mut self) -> Result<&mut ExchangeBody, HttpClientError> {
        if self.response_code()?.is_some_and(|code| code >= 400) {
            return Err(HttpClientError::NotFound(self.url.to_string()));
        }
        self.response_body_mut()
    }

    /// Takes the response body out of the exchange, for callers that want
    /// to keep reading after dropping it.
    ///
    /// # Errors
    /// Same as [`HttpExchange::input_stream`].
    pub fn into_body(mut self) -> Result<ExchangeBody, HttpClientError> {
        self.input_stream()?;
        self.response_body
            .take()
            .ok_or_else(|| HttpClientError::InvalidState("response body already taken".into()))
    }

    /// Body of a 4xx/5xx response. `None` before the response was read, for
    /// HEAD requests, and for statuses below 400.
    pub fn error_stream(&mut self) -> Option<&mut ExchangeBody> {
        if self.state != ExchangeState::BodyReady || self.method == SimpleMethod::HEAD {
            return None;
        }
        match self.status.as_ref() {
            Some(status) if status.code >= 400 => self.response_body.as_mut(),
            _ => None,
        }
    }

    /// Abandons the exchange. An unfinished response body is closed, which
    /// closes its connection; a connection with no body yet is closed too.
    pub fn disconnect(&mut self) {
        if let Some(mut body) = self.response_body.take() {
            body.close();
        }
        if let Some(mut lifecycle) = self.lifecycle.take() {
            lifecycle.release(true);
        }
        if self.state != ExchangeState::Unconnected {
            self.state = ExchangeState::Unconnected;
            tracing::debug!("Exchange for {} disconnected", self.url);
        }
    }
}

impl core::fmt::Debug for HttpExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpExchange")
            .field("url", &self.url.as_str())
            .field("method", &self.method)
            .field("state", &self.state)
            .field("redirects", &self.redirects)
            .field("auth_attempts", &self.auth_attempts)
            .finish_non_exhaustive()
    }
}
