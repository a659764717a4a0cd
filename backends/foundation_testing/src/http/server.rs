//! Test HTTP server implementation.
//!
//! WHY: Provides real HTTP server for integration tests without external dependencies.
//!
//! WHAT: `TestHttpServer` that listens on localhost, accepts requests, and sends
//! responses, keeping connections open between requests unless told otherwise.
//!
//! HOW: Uses stdlib's `TcpListener` and a thread per connection. Request heads are
//! read with `foundation_http::wire::simple_http::{read_line, read_headers}` and
//! request bodies through a `ResponseBody` over the socket.

use std::io::{BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use foundation_http::wire::simple_http::{
    read_headers, read_line, BodyFraming, CacheInterposer, DetachedSource, HttpHeaders,
    ResponseBody, SimpleMethod,
};

type ResponseHandler = Arc<dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync>;

/// Simple HTTP request representation for testing.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method (GET, POST, etc.)
    pub method: SimpleMethod,
    /// Request target as sent (e.g., "/test?x=1")
    pub path: String,
    /// Version token (e.g., "HTTP/1.1")
    pub proto: String,
    /// Request headers
    pub headers: HttpHeaders,
    /// Decoded request body
    pub body: Vec<u8>,
}

/// Simple HTTP response representation for testing.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code (e.g., 200)
    pub status: u16,
    /// Status text (e.g., "OK")
    pub status_text: String,
    /// Response headers
    pub headers: Vec<(String, String)>,
    /// Response body, written as-is
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create 200 OK response with body.
    #[must_use]
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        let body_bytes = body.into();
        Self {
            status: 200,
            status_text: "OK".to_string(),
            headers: vec![
                ("Content-Type".to_string(), "text/plain".to_string()),
                ("Content-Length".to_string(), body_bytes.len().to_string()),
            ],
            body: body_bytes,
        }
    }

    /// Create 302 redirect response.
    #[must_use]
    pub fn redirect(location: &str) -> Self {
        Self {
            status: 302,
            status_text: "Found".to_string(),
            headers: vec![
                ("Location".to_string(), location.to_string()),
                ("Content-Length".to_string(), "0".to_string()),
            ],
            body: Vec::new(),
        }
    }

    /// Create custom status response.
    #[must_use]
    pub fn status(code: u16, text: &str) -> Self {
        Self {
            status: code,
            status_text: text.to_string(),
            headers: vec![("Content-Length".to_string(), "0".to_string())],
            body: Vec::new(),
        }
    }

    /// Create 200 OK response framed as chunks of the given parts.
    #[must_use]
    pub fn chunked(parts: &[&str]) -> Self {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("{:x}\r\n{part}\r\n", part.len()).as_bytes());
        }
        body.extend_from_slice(b"0\r\n\r\n");
        Self {
            status: 200,
            status_text: "OK".to_string(),
            headers: vec![("Transfer-Encoding".to_string(), "chunked".to_string())],
            body,
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn closes_connection(&self) -> bool {
        self.headers
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case("Connection") && v.eq_ignore_ascii_case("close"))
    }

    /// Render response to HTTP/1.1 format.
    fn render(&self) -> Vec<u8> {
        let mut response = format!("HTTP/1.1 {} {}\r\n", self.status, self.status_text);

        for (key, value) in &self.headers {
            response.push_str(&format!("{key}: {value}\r\n"));
        }

        response.push_str("\r\n");

        let mut bytes = response.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

/// Test HTTP server for integration testing.
///
/// # Purpose (WHY)
///
/// Provides a real HTTP server for testing the client's TCP transport and
/// connection reuse without external dependencies.
///
/// # What it does
///
/// Starts a local HTTP server on a random port, accepts incoming requests, and responds
/// with configurable responses. Runs in background thread to not block test execution.
/// Every request is recorded, and accepted connections are counted.
///
/// # Examples
///
/// ```rust
/// use foundation_testing::http::TestHttpServer;
///
/// let server = TestHttpServer::start();
/// assert!(server.url("/test").starts_with("http://127.0.0.1:"));
/// ```
pub struct TestHttpServer {
    addr: String,
    _handle: Option<thread::JoinHandle<()>>,
    running: Arc<AtomicBool>,
    connections: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl TestHttpServer {
    /// Start a new test HTTP server on random port, answering 200 OK.
    ///
    /// # Panics
    /// When no local port can be bound.
    #[must_use]
    pub fn start() -> Self {
        Self::with_response(|_req| HttpResponse::ok(b"OK"))
    }

    /// Start server with custom response handler.
    ///
    /// # Panics
    /// When no local port can be bound.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use foundation_testing::http::{TestHttpServer, HttpResponse};
    ///
    /// let server = TestHttpServer::with_response(|req| {
    ///     if req.path == "/redirect" {
    ///         HttpResponse::redirect("/target")
    ///     } else {
    ///         HttpResponse::ok(b"Success")
    ///     }
    /// });
    /// ```
    #[must_use]
    pub fn with_response<F>(handler: F) -> Self
    where
        F: Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static,
    {
        let listener =
            TcpListener::bind("127.0.0.1:0").expect("Failed to bind test HTTP server to localhost");
        let addr = format!(
            "http://{}",
            listener.local_addr().expect("bound listener has an address")
        );

        let running = Arc::new(AtomicBool::new(true));
        let connections = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: ResponseHandler = Arc::new(handler);

        let running_clone = Arc::clone(&running);
        let connections_clone = Arc::clone(&connections);
        let requests_clone = Arc::clone(&requests);

        let handle = thread::spawn(move || {
            // Set non-blocking so we can check running flag
            listener
                .set_nonblocking(true)
                .expect("Failed to set non-blocking");

            while running_clone.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((stream, sock_addr)) => {
                        tracing::info!("Got a client connection: {sock_addr:?}");
                        connections_clone.fetch_add(1, Ordering::SeqCst);
                        let handler = Arc::clone(&handler);
                        let requests = Arc::clone(&requests_clone);
                        // Handle each connection in separate thread
                        thread::spawn(move || {
                            if let Err(e) = Self::handle_connection(stream, &handler, &requests) {
                                tracing::info!("TestHttpServer connection error: {e}");
                            }
                        });
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        // No connection available, sleep briefly and check again
                        thread::sleep(std::time::Duration::from_millis(10));
                    }
                    Err(e) => {
                        tracing::info!("TestHttpServer accept error: {e}");
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            _handle: Some(handle),
            running,
            connections,
            requests,
        }
    }

    /// Get full URL for a path on this test server.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Get base URL of this test server.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.addr
    }

    /// Connections accepted so far.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Requests received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn read_request<R: Read>(reader: &mut R) -> std::io::Result<Option<HttpRequest>> {
        let Some(line) = read_line(reader)? else {
            return Ok(None);
        };
        let mut parts = line.split(' ');
        let method = SimpleMethod::from(parts.next().unwrap_or_default());
        let path = parts.next().unwrap_or_default().to_string();
        let proto = parts.next().unwrap_or_default().to_string();

        let mut headers = HttpHeaders::new();
        read_headers(reader, &mut headers)?;

        let framing = if headers
            .get("Transfer-Encoding")
            .is_some_and(|value| value.eq_ignore_ascii_case("chunked"))
        {
            BodyFraming::Chunked
        } else {
            headers
                .get("Content-Length")
                .and_then(|value| value.trim().parse().ok())
                .map_or(BodyFraming::Empty, BodyFraming::FixedLength)
        };

        let mut body = Vec::new();
        ResponseBody::new(
            DetachedSource(&mut *reader),
            framing,
            CacheInterposer::passthrough(),
        )
        .read_to_end(&mut body)?;

        Ok(Some(HttpRequest {
            method,
            path,
            proto,
            headers,
            body,
        }))
    }

    /// Serves requests on one connection until the client hangs up or a
    /// response asks to close.
    fn handle_connection(
        stream: TcpStream,
        handler: &ResponseHandler,
        requests: &Mutex<Vec<HttpRequest>>,
    ) -> std::io::Result<()> {
        // Accepted sockets may inherit the listener's non-blocking flag
        stream.set_nonblocking(false)?;
        let mut writer = stream.try_clone()?;
        let mut reader = BufReader::new(stream);

        while let Some(request) = Self::read_request(&mut reader)? {
            tracing::info!(
                "Received new http request: method: {:?}, path: {:?}, proto: {:?}",
                request.method,
                request.path,
                request.proto,
            );

            let response = handler(&request);
            let client_closes = request
                .headers
                .get("Connection")
                .is_some_and(|value| value.eq_ignore_ascii_case("close"));
            requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request);

            writer.write_all(&response.render())?;
            writer.flush()?;

            if client_closes || response.closes_connection() {
                break;
            }
        }
        Ok(())
    }
}

impl Drop for TestHttpServer {
    fn drop(&mut self) {
        // Signal server thread to stop
        self.running.store(false, Ordering::Relaxed);
        // Thread will exit on next loop iteration
    }
}
