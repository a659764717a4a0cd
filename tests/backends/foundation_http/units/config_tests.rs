//! TOML configuration applied through the client builder.

use std::sync::Arc;
use std::time::Duration;

use foundation_http::wire::simple_http::client::{ClientConfig, HttpClientError};
use foundation_testing::doubles::ScriptedTransport;

use super::client_over;

const CONFIG: &str = r#"
read_timeout = 1500
max_redirects = 1
user_agent = "config-test/1.0"

[pool]
max_per_host = 2
"#;

#[test]
fn test_toml_config_drives_exchanges() {
    let config = ClientConfig::from_toml_str(CONFIG).unwrap();
    assert_eq!(config.read_timeout, Some(Duration::from_millis(1500)));
    assert_eq!(config.pool.max_per_host, 2);
    assert_eq!(config.max_auth_attempts, 8);

    let transport = Arc::new(ScriptedTransport::new().with_connection(
        "HTTP/1.1 302 Found\r\nLocation: /b\r\nContent-Length: 0\r\n\r\n\
HTTP/1.1 302 Found\r\nLocation: /c\r\nContent-Length: 0\r\n\r\n",
    ));
    let mut client = client_over(&transport).config(config);
    let mut exchange = client.open("http://example.test/a").unwrap();

    assert!(matches!(
        exchange.response_code(),
        Err(HttpClientError::TooManyRedirects(2))
    ));
    assert!(transport
        .written(0)
        .contains("\r\nUser-Agent: config-test/1.0\r\n"));
    assert_eq!(
        transport.log().read_timeouts.first(),
        Some(&Some(Duration::from_millis(1500)))
    );
}

#[test]
fn test_missing_config_file_is_reported() {
    assert!(ClientConfig::from_path("/definitely/not/here.toml").is_err());
}
