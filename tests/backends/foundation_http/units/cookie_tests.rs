//! Cookie store hand-off on every request and response head.

use std::io::Read;
use std::sync::Arc;

use foundation_testing::doubles::{MemoryCookieStore, ScriptedTransport};

use super::client_over;

/// WHY: Cookies set by one response must ride along on later requests
/// WHAT: Set-Cookie from the first exchange becomes a Cookie header on the second
#[test]
fn test_cookies_round_trip_through_store() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(
        "HTTP/1.1 200 OK\r\nSet-Cookie: session=abc; Path=/\r\nContent-Length: 0\r\n\r\n\
HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n",
    ));
    let cookies = Arc::new(MemoryCookieStore::new());
    let mut client = client_over(&transport).cookies(cookies.clone());

    let mut login = client.open("http://example.test/login").unwrap();
    assert_eq!(login.response_code().unwrap(), Some(200));
    assert_eq!(cookies.cookies(), vec!["session=abc"]);

    let mut next = client.open("http://example.test/account").unwrap();
    assert_eq!(next.response_code().unwrap(), Some(200));

    let written = transport.written(0);
    let second = written.find("GET /account").unwrap();
    assert!(!written[..second].contains("Cookie:"));
    assert!(written[second..].contains("\r\nCookie: session=abc\r\n"));
}

/// WHY: Cookies set by the caller and by the store must both reach the server
/// WHAT: The store's Cookie field is added after the caller's
#[test]
fn test_store_cookies_are_added_to_caller_cookies() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(
        "HTTP/1.1 200 OK\r\nSet-Cookie: theme=dark\r\nContent-Length: 0\r\n\r\n\
HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok",
    ));
    let cookies = Arc::new(MemoryCookieStore::new());
    let mut client = client_over(&transport).cookies(cookies.clone());

    let mut first = client.open("http://example.test/").unwrap();
    assert_eq!(first.response_code().unwrap(), Some(200));

    let mut second = client.open("http://example.test/prefs").unwrap();
    second.set_request_property("Cookie", "lang=en").unwrap();
    let mut body = String::new();
    second.input_stream().unwrap().read_to_string(&mut body).unwrap();

    let written = transport.written(0);
    let request = &written[written.find("GET /prefs").unwrap()..];
    let caller = request.find("\r\nCookie: lang=en\r\n").unwrap();
    let stored = request.find("\r\nCookie: theme=dark\r\n").unwrap();
    assert!(caller < stored);
}
