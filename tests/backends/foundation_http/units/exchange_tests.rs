//! Exchange behaviour over a scripted transport: framing, reuse and the
//! accessors for the final response.

use std::io::Read;
use std::sync::Arc;

use foundation_http::wire::simple_http::client::{ExchangeState, HttpClientError};
use foundation_testing::doubles::ScriptedTransport;

use super::client_over;

/// WHY: A fully read Content-Length body leaves the connection reusable
/// WHAT: Two exchanges share one scripted connection
#[test]
fn test_hello_world_reuses_connection() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(
        "HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello\
HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nworld",
    ));
    let mut client = client_over(&transport);

    let mut first = client.open("http://example.test/hello").unwrap();
    let mut body = String::new();
    first.input_stream().unwrap().read_to_string(&mut body).unwrap();
    assert_eq!(body, "hello");
    assert_eq!(transport.idle_count(), 1);

    let mut second = client.open("http://example.test/world").unwrap();
    let mut body = String::new();
    second.input_stream().unwrap().read_to_string(&mut body).unwrap();
    assert_eq!(body, "world");

    let log = transport.log();
    assert_eq!(log.opened, 1);
    assert_eq!(log.reused, 1);
    assert_eq!(log.recycled, 2);
    assert_eq!(log.closed, 0);

    let written = transport.written(0);
    assert!(written.starts_with("GET /hello HTTP/1.1\r\n"));
    assert!(written.contains("GET /world HTTP/1.1\r\n"));
}

#[test]
fn test_chunked_response_is_decoded() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(
        "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n",
    ));
    let mut client = client_over(&transport);

    let mut exchange = client.open("http://example.test/wiki").unwrap();
    let mut body = String::new();
    exchange.input_stream().unwrap().read_to_string(&mut body).unwrap();

    assert_eq!(body, "Wikipedia");
    assert_eq!(transport.log().recycled, 1);
}

/// WHY: Without a length the body ends at EOF, which leaves nothing to reuse
/// WHAT: The connection is closed rather than recycled
#[test]
fn test_eof_delimited_body_closes_connection() {
    let transport = Arc::new(
        ScriptedTransport::new().with_connection("HTTP/1.1 200 OK\r\n\r\nread until the end"),
    );
    let mut client = client_over(&transport);

    let mut exchange = client.open("http://example.test/").unwrap();
    let mut body = String::new();
    exchange.input_stream().unwrap().read_to_string(&mut body).unwrap();

    assert_eq!(body, "read until the end");
    let log = transport.log();
    assert_eq!(log.recycled, 0);
    assert_eq!(log.closed, 1);
}

#[test]
fn test_head_accessors() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(
        "HTTP/1.1 201 Created\r\nContent-Length: 2\r\nX-Id: 7\r\nX-Id: 8\r\n\r\nok",
    ));
    let mut client = client_over(&transport);
    let mut exchange = client.open("http://example.test/items").unwrap();

    assert_eq!(exchange.response_code().unwrap(), Some(201));
    assert_eq!(exchange.response_message().unwrap(), Some("Created"));
    assert_eq!(exchange.content_length().unwrap(), Some(2));
    assert_eq!(exchange.header_field("x-id").unwrap(), Some("8"));
    assert_eq!(
        exchange.header_field_at(0).unwrap(),
        Some("HTTP/1.1 201 Created")
    );
    assert_eq!(exchange.header_field_key_at(0).unwrap(), Some(""));
    assert_eq!(exchange.header_field_key_at(2).unwrap(), Some("X-Id"));

    let fields = exchange.header_fields().unwrap();
    assert_eq!(
        fields.get("X-Id"),
        Some(&vec!["7".to_string(), "8".to_string()])
    );
    assert_eq!(exchange.state(), ExchangeState::BodyReady);
}

/// WHY: Error responses must not be mistaken for content
/// WHAT: `input_stream` refuses 404, `error_stream` serves its body
#[test]
fn test_not_found_body_goes_to_error_stream() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(
        "HTTP/1.1 404 Not Found\r\nContent-Length: 7\r\n\r\nmissing",
    ));
    let mut client = client_over(&transport);
    let mut exchange = client.open("http://example.test/gone").unwrap();

    assert!(matches!(
        exchange.input_stream(),
        Err(HttpClientError::NotFound(_))
    ));

    let mut body = String::new();
    exchange
        .error_stream()
        .expect("error body")
        .read_to_string(&mut body)
        .unwrap();
    assert_eq!(body, "missing");
}

/// WHY: Closing a body before its end leaves unread bytes on the socket
/// WHAT: The connection is closed instead of being pooled
#[test]
fn test_early_close_discards_connection() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(
        "HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n0123456789",
    ));
    let mut client = client_over(&transport);
    let mut exchange = client.open("http://example.test/").unwrap();

    let body = exchange.input_stream().unwrap();
    let mut prefix = [0u8; 3];
    body.read_exact(&mut prefix).unwrap();
    assert_eq!(&prefix, b"012");
    body.close();

    let log = transport.log();
    assert_eq!(log.recycled, 0);
    assert_eq!(log.closed, 1);
}

#[test]
fn test_disconnect_before_reading_closes_connection() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(
        "HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok",
    ));
    let mut client = client_over(&transport);
    let mut exchange = client.open("http://example.test/").unwrap();

    exchange.connect().unwrap();
    assert_eq!(exchange.state(), ExchangeState::Sending);
    exchange.disconnect();

    assert_eq!(exchange.state(), ExchangeState::Unconnected);
    assert_eq!(transport.log().closed, 1);
}

#[test]
fn test_connect_failure_is_reported() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut client = client_over(&transport);
    let mut exchange = client.open("http://example.test/").unwrap();

    assert!(matches!(
        exchange.response_code(),
        Err(HttpClientError::ConnectionFailed(_))
    ));
}

/// WHY: The body can outlive the exchange handle
/// WHAT: `into_body` keeps reading after the exchange is gone
#[test]
fn test_into_body_outlives_exchange() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(
        "HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\ndata",
    ));
    let mut client = client_over(&transport);
    let exchange = client.open("http://example.test/").unwrap();

    let mut body = exchange.into_body().unwrap();
    let mut text = String::new();
    body.read_to_string(&mut text).unwrap();
    assert_eq!(text, "data");
    assert_eq!(transport.log().recycled, 1);
}
