//! HTTP test server utilities.
//!
//! WHY: Provides real HTTP test server built on stdlib TCP, so the client's
//! TCP transport and connection pool can be exercised end to end.
//!
//! WHAT: `TestHttpServer` for integration testing HTTP clients.
//!
//! HOW: Uses stdlib's `TcpListener` with hand-written HTTP/1.1 responses;
//! requests are parsed with `foundation_http`'s own line and header readers.

mod server;

pub use server::{HttpRequest, HttpResponse, TestHttpServer};
