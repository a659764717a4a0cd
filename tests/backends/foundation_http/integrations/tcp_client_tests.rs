//! Integration tests for the HTTP client over real TCP sockets.
//!
//! Each test spins up a local `TestHttpServer` and drives the default
//! client (system resolver, pooled TCP transport) against it.

use std::io::{Read, Write};

use foundation_http::wire::simple_http::client::{HttpClientError, SimpleHttpClient};
use foundation_http::wire::simple_http::SimpleMethod;
use foundation_testing::http::{HttpResponse, TestHttpServer};
use ntest::timeout;
use serial_test::serial;
use tracing_test::traced_test;

fn get(client: &mut SimpleHttpClient, url: &str) -> (Option<u16>, String) {
    let mut exchange = client.open(url).expect("valid url");
    let code = exchange.response_code().expect("response head");
    let mut body = String::new();
    if let Ok(stream) = exchange.input_stream() {
        stream.read_to_string(&mut body).expect("read body");
    }
    (code, body)
}

#[test]
#[serial]
#[traced_test]
#[timeout(10000)]
fn pooled_connection_serves_consecutive_requests() {
    let server = TestHttpServer::with_response(|req| HttpResponse::ok(req.path.clone()));
    let mut client = SimpleHttpClient::new();

    assert_eq!(
        get(&mut client, &server.url("/first")),
        (Some(200), "/first".to_string())
    );
    assert_eq!(
        get(&mut client, &server.url("/second")),
        (Some(200), "/second".to_string())
    );

    assert_eq!(server.connection_count(), 1);
    assert_eq!(server.requests().len(), 2);
}

#[test]
#[serial]
#[traced_test]
#[timeout(10000)]
fn redirect_is_followed_over_the_wire() {
    let server = TestHttpServer::with_response(|req| match req.path.as_str() {
        "/start" => HttpResponse::redirect("/target"),
        "/target" => HttpResponse::ok(b"landed"),
        _ => HttpResponse::status(404, "Not Found"),
    });
    let mut client = SimpleHttpClient::new();

    assert_eq!(
        get(&mut client, &server.url("/start")),
        (Some(200), "landed".to_string())
    );
    let paths: Vec<String> = server.requests().into_iter().map(|req| req.path).collect();
    assert_eq!(paths, vec!["/start", "/target"]);
}

#[test]
#[serial]
#[traced_test]
#[timeout(10000)]
fn redirect_loop_is_cut_off() {
    let server = TestHttpServer::with_response(|_req| HttpResponse::redirect("/again"));
    let mut client = SimpleHttpClient::new().max_redirects(2);
    let mut exchange = client.open(&server.url("/again")).unwrap();

    assert!(matches!(
        exchange.response_code(),
        Err(HttpClientError::TooManyRedirects(3))
    ));
    assert_eq!(server.requests().len(), 3);
}

#[test]
#[serial]
#[traced_test]
#[timeout(10000)]
fn posted_body_reaches_server() {
    let server = TestHttpServer::with_response(|req| HttpResponse::ok(req.body.clone()));
    let mut client = SimpleHttpClient::new();
    let mut exchange = client.open(&server.url("/echo")).unwrap();
    {
        let mut out = exchange.output_stream().unwrap();
        out.write_all(b"greeting=hello").unwrap();
        out.close().unwrap();
    }

    let mut body = String::new();
    exchange
        .input_stream()
        .unwrap()
        .read_to_string(&mut body)
        .unwrap();
    assert_eq!(body, "greeting=hello");

    let request = &server.requests()[0];
    assert_eq!(request.method, SimpleMethod::POST);
    assert_eq!(request.headers.get("Content-Length"), Some("14"));
}

#[test]
#[serial]
#[traced_test]
#[timeout(10000)]
fn chunked_upload_and_download() {
    let server = TestHttpServer::with_response(|req| {
        let text = String::from_utf8_lossy(&req.body).into_owned();
        HttpResponse::chunked(&[text.as_str(), "!"])
    });
    let mut client = SimpleHttpClient::new();
    let mut exchange = client.open(&server.url("/chunks")).unwrap();
    exchange.set_chunked_streaming_mode(16).unwrap();
    {
        let mut out = exchange.output_stream().unwrap();
        out.write_all(b"a body longer than one chunk").unwrap();
        out.close().unwrap();
    }

    let mut body = String::new();
    exchange
        .input_stream()
        .unwrap()
        .read_to_string(&mut body)
        .unwrap();
    assert_eq!(body, "a body longer than one chunk!");
    assert_eq!(
        server.requests()[0].headers.get("Transfer-Encoding"),
        Some("chunked")
    );
}

#[test]
#[serial]
#[traced_test]
#[timeout(10000)]
fn server_close_forces_new_connection() {
    let server = TestHttpServer::with_response(|_req| {
        HttpResponse::ok(b"bye").with_header("Connection", "close")
    });
    let mut client = SimpleHttpClient::new();

    assert_eq!(get(&mut client, &server.url("/")).1, "bye");
    assert_eq!(get(&mut client, &server.url("/")).1, "bye");
    assert_eq!(server.connection_count(), 2);
}

#[test]
#[serial]
#[traced_test]
#[timeout(10000)]
fn error_status_body_is_readable() {
    let server = TestHttpServer::with_response(|_req| {
        let mut response = HttpResponse::status(503, "Service Unavailable");
        response.body = b"later".to_vec();
        response.headers = vec![("Content-Length".to_string(), "5".to_string())];
        response
    });
    let mut client = SimpleHttpClient::new();
    let mut exchange = client.open(&server.url("/busy")).unwrap();

    assert_eq!(exchange.response_code().unwrap(), Some(503));
    assert!(matches!(
        exchange.input_stream(),
        Err(HttpClientError::NotFound(_))
    ));
    let mut body = String::new();
    exchange
        .error_stream()
        .unwrap()
        .read_to_string(&mut body)
        .unwrap();
    assert_eq!(body, "later");
}
