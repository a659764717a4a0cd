//! Authentication challenges answered through an `Authenticator`.

use std::io::Write;
use std::sync::Arc;

use foundation_http::wire::simple_http::client::{
    AuthTarget, FixedProxySelector, HttpClientError, ProxyAddress, SimpleHttpClient,
};
use foundation_testing::doubles::{ScriptedTransport, StaticAuthenticator};

use super::client_over;

const CHALLENGE: &str = "HTTP/1.1 401 Unauthorized\r\nWWW-Authenticate: Basic realm=\"protected area\"\r\nContent-Length: 0\r\n\r\n";
const OK: &str = "HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";
const ALADDIN: &str = "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==";

fn authenticating_client(
    transport: &Arc<ScriptedTransport>,
    authenticator: &Arc<StaticAuthenticator>,
) -> SimpleHttpClient {
    client_over(transport).authenticator(authenticator.clone())
}

/// WHY: A challenged request is retried with credentials on the same connection
/// WHAT: The second request carries an Authorization header for the realm
#[test]
fn test_server_challenge_is_answered() {
    let transport =
        Arc::new(ScriptedTransport::new().with_connection(format!("{CHALLENGE}{OK}")));
    let authenticator = Arc::new(StaticAuthenticator::new("Aladdin", "open sesame"));
    let mut client = authenticating_client(&transport, &authenticator);
    let mut exchange = client.open("http://example.test/private").unwrap();

    assert_eq!(exchange.response_code().unwrap(), Some(200));

    assert_eq!(
        authenticator.asked(),
        vec![(
            AuthTarget::Server,
            "Basic".to_string(),
            "protected area".to_string()
        )]
    );
    let log = transport.log();
    assert_eq!(log.opened, 1);
    assert_eq!(log.reused, 1);

    let written = transport.written(0);
    let retry = written.rfind("GET /private").unwrap();
    assert!(!written[..retry].contains("Authorization"));
    assert!(written[retry..].contains(&format!("\r\nAuthorization: {ALADDIN}\r\n")));
}

#[test]
fn test_challenge_without_authenticator_is_final() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(CHALLENGE));
    let mut client = client_over(&transport);
    let mut exchange = client.open("http://example.test/private").unwrap();

    assert_eq!(exchange.response_code().unwrap(), Some(401));
    assert!(exchange.error_stream().is_some());
}

#[test]
fn test_unanswered_realm_is_final() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(CHALLENGE));
    let authenticator =
        Arc::new(StaticAuthenticator::new("Aladdin", "open sesame").for_realm("elsewhere"));
    let mut client = authenticating_client(&transport, &authenticator);
    let mut exchange = client.open("http://example.test/private").unwrap();

    assert_eq!(exchange.response_code().unwrap(), Some(401));
    assert_eq!(authenticator.asked().len(), 1);
}

#[test]
fn test_missing_challenge_header() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(
        "HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\n\r\n",
    ));
    let authenticator = Arc::new(StaticAuthenticator::new("u", "p"));
    let mut client = authenticating_client(&transport, &authenticator);
    let mut exchange = client.open("http://example.test/").unwrap();

    assert!(matches!(
        exchange.response_code(),
        Err(HttpClientError::MissingChallenge(401))
    ));
}

#[test]
fn test_proxy_challenge_without_proxy() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(
        "HTTP/1.1 407 Proxy Authentication Required\r\nProxy-Authenticate: Basic realm=\"p\"\r\nContent-Length: 0\r\n\r\n",
    ));
    let mut client = client_over(&transport);
    let mut exchange = client.open("http://example.test/").unwrap();

    assert!(matches!(
        exchange.response_code(),
        Err(HttpClientError::ProxyAuthWithoutProxy)
    ));
}

#[test]
fn test_proxy_challenge_is_answered() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(format!(
        "HTTP/1.1 407 Proxy Authentication Required\r\nProxy-Authenticate: Basic realm=\"gateway\"\r\nContent-Length: 0\r\n\r\n{OK}"
    )));
    let authenticator = Arc::new(StaticAuthenticator::new("Aladdin", "open sesame"));
    let mut client = authenticating_client(&transport, &authenticator).proxy_selector(Arc::new(
        FixedProxySelector(ProxyAddress::new("proxy.test", 3128)),
    ));
    let mut exchange = client.open("http://example.test/a").unwrap();

    assert_eq!(exchange.response_code().unwrap(), Some(200));
    assert_eq!(authenticator.asked()[0].0, AuthTarget::Proxy);
    assert!(transport
        .written(0)
        .contains(&format!("\r\nProxy-Authorization: {ALADDIN}\r\n")));
}

/// WHY: Credentials that keep failing must not loop forever
/// WHAT: After the configured attempts the challenge is returned as final
#[test]
fn test_auth_attempts_are_bounded() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(CHALLENGE.repeat(3)));
    let authenticator = Arc::new(StaticAuthenticator::new("u", "wrong"));
    let mut config = client_over(&transport).client_config().clone();
    config.max_auth_attempts = 2;
    let mut client = authenticating_client(&transport, &authenticator).config(config);
    let mut exchange = client.open("http://example.test/").unwrap();

    assert_eq!(exchange.response_code().unwrap(), Some(401));
    assert_eq!(authenticator.asked().len(), 2);
}

/// WHY: A streamed body cannot be sent a second time
/// WHAT: A challenge after a fixed-length upload fails instead of retrying
#[test]
fn test_streamed_body_cannot_be_retried() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(CHALLENGE));
    let authenticator = Arc::new(StaticAuthenticator::new("u", "p"));
    let mut client = authenticating_client(&transport, &authenticator);
    let mut exchange = client.open("http://example.test/upload").unwrap();
    exchange.set_fixed_length_streaming_mode(3).unwrap();
    {
        let mut out = exchange.output_stream().unwrap();
        out.write_all(b"abc").unwrap();
        out.close().unwrap();
    }

    assert!(matches!(
        exchange.response_code(),
        Err(HttpClientError::CannotRetryStreamedBody(401))
    ));
}

/// WHY: A buffered body is kept so it can be replayed
/// WHAT: The retried request resends the same body bytes
#[test]
fn test_buffered_body_is_replayed() {
    let transport =
        Arc::new(ScriptedTransport::new().with_connection(format!("{CHALLENGE}{OK}")));
    let authenticator = Arc::new(StaticAuthenticator::new("u", "p"));
    let mut client = authenticating_client(&transport, &authenticator);
    let mut exchange = client.open("http://example.test/form").unwrap();
    {
        let mut out = exchange.output_stream().unwrap();
        out.write_all(b"name=value").unwrap();
        out.close().unwrap();
    }

    assert_eq!(exchange.response_code().unwrap(), Some(200));
    let written = transport.written(0);
    assert_eq!(written.matches("POST /form HTTP/1.1").count(), 2);
    assert_eq!(written.matches("\r\n\r\nname=value").count(), 2);
}
