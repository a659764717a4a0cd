//! Redirect following: bounds, host changes and the cases that stop a chain.

use std::io::{Read, Write};
use std::sync::Arc;

use foundation_http::wire::simple_http::client::HttpClientError;
use foundation_testing::doubles::ScriptedTransport;

use super::client_over;

const FOUND_NEXT: &str = "HTTP/1.1 302 Found\r\nLocation: /next\r\nContent-Length: 0\r\n\r\n";

#[test]
fn test_follows_relative_redirect_on_same_connection() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(format!(
        "{FOUND_NEXT}HTTP/1.1 200 OK\r\nContent-Length: 7\r\n\r\narrived"
    )));
    let mut client = client_over(&transport);
    let mut exchange = client.open("http://example.test/start").unwrap();

    assert_eq!(exchange.response_code().unwrap(), Some(200));
    assert_eq!(exchange.url().as_str(), "http://example.test/next");
    assert_eq!(exchange.redirect_count(), 1);

    let mut body = String::new();
    exchange.input_stream().unwrap().read_to_string(&mut body).unwrap();
    assert_eq!(body, "arrived");

    let log = transport.log();
    assert_eq!(log.opened, 1);
    assert_eq!(log.reused, 1);
    let written = transport.written(0);
    assert!(written.starts_with("GET /start HTTP/1.1\r\n"));
    assert!(written.contains("GET /next HTTP/1.1\r\n"));
}

/// WHY: Endless redirect loops must terminate
/// WHAT: Four redirects are followed, the fifth fails with its attempt number
#[test]
fn test_too_many_redirects() {
    let transport =
        Arc::new(ScriptedTransport::new().with_connection(FOUND_NEXT.repeat(6)));
    let mut client = client_over(&transport);
    let mut exchange = client.open("http://example.test/loop").unwrap();

    match exchange.response_code() {
        Err(HttpClientError::TooManyRedirects(attempt)) => assert_eq!(attempt, 5),
        other => panic!("expected TooManyRedirects, got {other:?}"),
    }
    assert_eq!(exchange.redirect_count(), 4);
}

#[test]
fn test_redirects_can_be_disabled() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(FOUND_NEXT));
    let mut client = client_over(&transport).follow_redirects(false);
    let mut exchange = client.open("http://example.test/start").unwrap();

    assert_eq!(exchange.response_code().unwrap(), Some(302));
    assert_eq!(exchange.header_field("Location").unwrap(), Some("/next"));
    assert_eq!(exchange.redirect_count(), 0);
}

#[test]
fn test_per_exchange_redirect_switch() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(FOUND_NEXT));
    let mut client = client_over(&transport);
    let mut exchange = client.open("http://example.test/start").unwrap();
    exchange.set_follow_redirects(false);

    assert_eq!(exchange.response_code().unwrap(), Some(302));
}

/// WHY: A Host header set for one server must not leak to another
/// WHAT: Redirecting to a new authority opens a new connection with its own Host
#[test]
fn test_cross_host_redirect_replaces_host_header() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_connection(
                "HTTP/1.1 301 Moved Permanently\r\nLocation: http://other.test:8080/landing\r\nContent-Length: 0\r\n\r\n",
            )
            .with_connection("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n"),
    );
    let mut client = client_over(&transport);
    let mut exchange = client.open("http://example.test/").unwrap();
    exchange
        .set_request_property("Host", "example.test")
        .unwrap();

    assert_eq!(exchange.response_code().unwrap(), Some(200));

    let log = transport.log();
    assert_eq!(log.opened, 2);
    assert_eq!(log.targets[1].host, "other.test");
    assert_eq!(log.targets[1].port, 8080);
    assert!(transport.written(1).contains("\r\nHost: other.test:8080\r\n"));
}

#[test]
fn test_scheme_change_is_not_followed() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(
        "HTTP/1.1 302 Found\r\nLocation: https://example.test/secure\r\nContent-Length: 0\r\n\r\n",
    ));
    let mut client = client_over(&transport);
    let mut exchange = client.open("http://example.test/").unwrap();

    assert_eq!(exchange.response_code().unwrap(), Some(302));
    assert_eq!(exchange.url().as_str(), "http://example.test/");
}

#[test]
fn test_redirect_without_location_is_final() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(
        "HTTP/1.1 307 Temporary Redirect\r\nContent-Length: 0\r\n\r\n",
    ));
    let mut client = client_over(&transport);
    let mut exchange = client.open("http://example.test/").unwrap();

    assert_eq!(exchange.response_code().unwrap(), Some(307));
}

/// WHY: Requests with a body are never replayed against a redirect target
/// WHAT: A POST receiving 302 returns the 302
#[test]
fn test_request_with_body_is_not_redirected() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(FOUND_NEXT));
    let mut client = client_over(&transport);
    let mut exchange = client.open("http://example.test/form").unwrap();
    {
        let mut out = exchange.output_stream().unwrap();
        out.write_all(b"q=1").unwrap();
        out.close().unwrap();
    }

    assert_eq!(exchange.response_code().unwrap(), Some(302));
    assert_eq!(transport.log().opened, 1);
}
