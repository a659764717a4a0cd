//! When a connection goes back to the pool and when it is closed.

use std::io::{Read, Write};
use std::sync::Arc;

use foundation_http::wire::simple_http::client::HttpClientError;
use foundation_http::wire::simple_http::{Proto, SimpleMethod};
use foundation_testing::doubles::ScriptedTransport;

use super::client_over;

const EMPTY_OK: &str = "HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n";

/// WHY: Unsent body bytes would corrupt the next request on the socket
/// WHAT: A chunked body left open makes the connection close on release
#[test]
fn test_abandoned_chunked_body_closes_connection() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(EMPTY_OK));
    let mut client = client_over(&transport);
    let mut exchange = client.open("http://example.test/stream").unwrap();
    exchange.set_chunked_streaming_mode(0).unwrap();
    {
        let mut out = exchange.output_stream().unwrap();
        out.write_all(b"partial").unwrap();
    }

    assert_eq!(exchange.response_code().unwrap(), Some(200));
    let log = transport.log();
    assert_eq!(log.recycled, 0);
    assert_eq!(log.closed, 1);
    assert!(transport
        .written(0)
        .contains("\r\nTransfer-Encoding: chunked\r\n"));
}

#[test]
fn test_closed_chunked_body_is_terminated() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(EMPTY_OK));
    let mut client = client_over(&transport);
    let mut exchange = client.open("http://example.test/stream").unwrap();
    exchange.set_chunked_streaming_mode(64).unwrap();
    {
        let mut out = exchange.output_stream().unwrap();
        out.write_all(b"hello").unwrap();
        out.close().unwrap();
    }

    assert_eq!(exchange.response_code().unwrap(), Some(200));
    let written = transport.written(0);
    assert!(written.contains("hello"));
    assert!(written.ends_with("0\r\n\r\n"));
    assert_eq!(transport.log().recycled, 1);
}

#[test]
fn test_streaming_mode_is_set_once() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut client = client_over(&transport);
    let mut exchange = client.open("http://example.test/").unwrap();

    exchange.set_fixed_length_streaming_mode(4).unwrap();
    assert!(matches!(
        exchange.set_chunked_streaming_mode(16),
        Err(HttpClientError::InvalidState(_))
    ));
}

#[test]
fn test_fixed_length_mismatch_fails_on_close() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(EMPTY_OK));
    let mut client = client_over(&transport);
    let mut exchange = client.open("http://example.test/upload").unwrap();
    exchange.set_fixed_length_streaming_mode(4).unwrap();

    let mut out = exchange.output_stream().unwrap();
    out.write_all(b"ab").unwrap();
    assert!(out.close().is_err());
}

/// WHY: The caller may ask for the connection to end with the exchange
/// WHAT: A request `Connection: close` header prevents pooling
#[test]
fn test_request_connection_close_is_honoured() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(
        "HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok",
    ));
    let mut client = client_over(&transport);
    let mut exchange = client.open("http://example.test/").unwrap();
    exchange.set_request_property("Connection", "close").unwrap();

    let mut body = String::new();
    exchange.input_stream().unwrap().read_to_string(&mut body).unwrap();

    assert!(transport.written(0).contains("\r\nConnection: close\r\n"));
    assert!(!transport.written(0).contains("Keep-Alive"));
    let log = transport.log();
    assert_eq!(log.recycled, 0);
    assert_eq!(log.closed, 1);
}

#[test]
fn test_response_connection_close_is_honoured() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(
        "HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 2\r\n\r\nok",
    ));
    let mut client = client_over(&transport);
    let mut exchange = client.open("http://example.test/").unwrap();

    let mut body = String::new();
    exchange.input_stream().unwrap().read_to_string(&mut body).unwrap();
    assert_eq!(transport.log().closed, 1);
}

/// WHY: HTTP/1.0 servers only keep connections open when they say so
/// WHAT: An explicit keep-alive response is pooled, and the exchange downgrades
#[test]
fn test_http10_keep_alive_is_pooled() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(
        "HTTP/1.0 200 OK\r\nConnection: keep-alive\r\nContent-Length: 2\r\n\r\nok",
    ));
    let mut client = client_over(&transport);
    let mut exchange = client.open("http://example.test/").unwrap();

    let mut body = String::new();
    exchange.input_stream().unwrap().read_to_string(&mut body).unwrap();

    assert_eq!(exchange.proto(), Proto::HTTP10);
    assert_eq!(transport.log().recycled, 1);
}

#[test]
fn test_head_response_has_no_body() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(
        "HTTP/1.1 200 OK\r\nContent-Length: 1234\r\n\r\n",
    ));
    let mut client = client_over(&transport);
    let mut exchange = client.open("http://example.test/").unwrap();
    exchange.set_method(SimpleMethod::HEAD).unwrap();

    assert_eq!(exchange.content_length().unwrap(), Some(1234));
    let mut body = Vec::new();
    exchange.input_stream().unwrap().read_to_end(&mut body).unwrap();
    assert!(body.is_empty());
    assert!(transport.written(0).starts_with("HEAD / HTTP/1.1\r\n"));
    assert_eq!(transport.log().recycled, 1);
}

#[test]
fn test_read_timeout_applies_to_leased_connection() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(EMPTY_OK));
    let mut client =
        client_over(&transport).read_timeout(std::time::Duration::from_millis(250));
    let mut exchange = client.open("http://example.test/").unwrap();

    assert_eq!(exchange.response_code().unwrap(), Some(200));
    assert_eq!(
        transport.log().read_timeouts,
        vec![Some(std::time::Duration::from_millis(250))]
    );
}
