//! Response cache population and lookup.

use std::io::{Read, Write};
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;

use foundation_http::wire::simple_http::client::{ExchangeState, SimpleHttpClient};
use foundation_http::wire::simple_http::HttpHeaders;
use foundation_testing::doubles::{CacheStats, MemoryResponseCache, ScriptedTransport};

use super::client_over;

const HELLO: &str =
    "HTTP/1.1 200 OK\r\nCache-Control: max-age=60\r\nContent-Length: 5\r\n\r\nhello";

fn caching_client(
    transport: &Arc<ScriptedTransport>,
    cache: &MemoryResponseCache,
) -> SimpleHttpClient {
    client_over(transport).cache(Arc::new(cache.clone()))
}

fn read_body(client: &mut SimpleHttpClient, url: &str) -> String {
    let mut exchange = client.open(url).unwrap();
    let mut body = String::new();
    exchange.input_stream().unwrap().read_to_string(&mut body).unwrap();
    body
}

/// WHY: A response read to the end is complete and may be stored
/// WHAT: The entry commits, and the next GET is answered without a connection
#[test]
fn test_full_read_commits_and_serves_next_request() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(HELLO));
    let cache = MemoryResponseCache::new();
    let mut client = caching_client(&transport, &cache);

    assert_eq!(read_body(&mut client, "http://example.test/doc"), "hello");
    assert_eq!(
        cache.stored_body("http://example.test/doc"),
        Some(b"hello".to_vec())
    );

    let mut exchange = client.open("http://example.test/doc").unwrap();
    assert_eq!(exchange.response_code().unwrap(), Some(200));
    assert_eq!(exchange.state(), ExchangeState::BodyReady);
    let mut body = String::new();
    exchange.input_stream().unwrap().read_to_string(&mut body).unwrap();
    assert_eq!(body, "hello");

    assert_eq!(transport.log().opened, 1);
    assert_eq!(
        cache.stats(),
        CacheStats {
            hits: 1,
            misses: 1,
            commits: 1,
            aborts: 0
        }
    );
}

/// WHY: A partial body must never be stored
/// WHAT: Closing early aborts the entry
#[test]
fn test_early_close_aborts_entry() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(HELLO));
    let cache = MemoryResponseCache::new();
    let mut client = caching_client(&transport, &cache);
    let mut exchange = client.open("http://example.test/doc").unwrap();

    let body = exchange.input_stream().unwrap();
    let mut first = [0u8; 2];
    body.read_exact(&mut first).unwrap();
    body.close();

    let stats = cache.stats();
    assert_eq!(stats.commits, 0);
    assert_eq!(stats.aborts, 1);
    assert!(cache.stored_body("http://example.test/doc").is_none());
}

#[test]
fn test_prepopulated_entry_is_served() {
    let transport = Arc::new(ScriptedTransport::new());
    let cache = MemoryResponseCache::new();
    let mut headers = HttpHeaders::new();
    headers.set_status_line("HTTP/1.1 203 Non-Authoritative Information");
    headers.add("Content-Type", "text/plain");
    headers.add("Cache-Control", "max-age=600");
    cache.insert("http://example.test/stored", headers, "from cache");
    let mut client = caching_client(&transport, &cache);

    let mut exchange = client.open("http://example.test/stored").unwrap();
    assert_eq!(exchange.response_code().unwrap(), Some(203));
    assert_eq!(
        exchange.header_field("content-type").unwrap(),
        Some("text/plain")
    );
    let mut body = String::new();
    exchange.input_stream().unwrap().read_to_string(&mut body).unwrap();
    assert_eq!(body, "from cache");
    assert_eq!(transport.log().opened, 0);
}

#[test]
fn test_use_caches_off_skips_cache() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(HELLO));
    let cache = MemoryResponseCache::new();
    let mut headers = HttpHeaders::new();
    headers.set_status_line("HTTP/1.1 200 OK");
    cache.insert("http://example.test/doc", headers, "stale");
    let mut client = caching_client(&transport, &cache);

    let mut exchange = client.open("http://example.test/doc").unwrap();
    exchange.set_use_caches(false);
    let mut body = String::new();
    exchange.input_stream().unwrap().read_to_string(&mut body).unwrap();

    assert_eq!(body, "hello");
    assert_eq!(cache.stats(), CacheStats::default());
}

/// WHY: Only allow-listed statuses are worth storing
/// WHAT: A 404 is read without offering it to the cache
#[test]
fn test_uncacheable_status_is_not_stored() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(
        "HTTP/1.1 404 Not Found\r\nContent-Length: 4\r\n\r\ngone",
    ));
    let cache = MemoryResponseCache::new();
    let mut client = caching_client(&transport, &cache);
    let mut exchange = client.open("http://example.test/missing").unwrap();

    assert_eq!(exchange.response_code().unwrap(), Some(404));
    let mut body = String::new();
    exchange
        .error_stream()
        .unwrap()
        .read_to_string(&mut body)
        .unwrap();

    assert_eq!(body, "gone");
    assert_eq!(cache.stats().commits, 0);
    assert!(cache.stored_body("http://example.test/missing").is_none());
}

fn stale_entry(cache: &MemoryResponseCache, uri: &str) {
    let mut headers = HttpHeaders::new();
    headers.set_status_line("HTTP/1.1 200 OK");
    headers.add("Cache-Control", "max-age=0");
    headers.add("ETag", "\"v1\"");
    headers.add("Last-Modified", "Sun, 06 Nov 1994 08:49:37 GMT");
    cache.insert(uri, headers, "cached copy");
}

/// WHY: A stale entry with validators is cheaper to confirm than to refetch
/// WHAT: A conditional GET goes out, and a 304 serves the stored body
#[test]
fn test_stale_entry_revalidated_by_not_modified() {
    let transport = Arc::new(
        ScriptedTransport::new().with_connection("HTTP/1.1 304 Not Modified\r\n\r\n"),
    );
    let cache = MemoryResponseCache::new();
    stale_entry(&cache, "http://example.test/doc");
    let mut client = caching_client(&transport, &cache);

    let mut exchange = client.open("http://example.test/doc").unwrap();
    assert_eq!(exchange.response_code().unwrap(), Some(200));
    let mut body = String::new();
    exchange.input_stream().unwrap().read_to_string(&mut body).unwrap();
    assert_eq!(body, "cached copy");

    let request = transport.written(0);
    assert!(request.contains("\r\nIf-None-Match: \"v1\"\r\n"));
    assert!(request.contains("\r\nIf-Modified-Since: Sun, 06 Nov 1994 08:49:37 GMT\r\n"));
    assert_eq!(transport.log().opened, 1);
    assert_eq!(cache.stats().commits, 0);
}

#[test]
fn test_stale_entry_replaced_when_changed() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(
        "HTTP/1.1 200 OK\r\nETag: \"v2\"\r\nContent-Length: 9\r\n\r\nnew value",
    ));
    let cache = MemoryResponseCache::new();
    stale_entry(&cache, "http://example.test/doc");
    let mut client = caching_client(&transport, &cache);

    assert_eq!(read_body(&mut client, "http://example.test/doc"), "new value");
    assert_eq!(
        cache.stored_body("http://example.test/doc"),
        Some(b"new value".to_vec())
    );
}

/// WHY: `no-store` forbids keeping any copy of the response
/// WHAT: Nothing is offered to the cache, so the next GET hits the network
#[test]
fn test_no_store_response_is_not_stored() {
    let response = "HTTP/1.1 200 OK\r\nCache-Control: no-store\r\nContent-Length: 5\r\n\r\nhello";
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_connection(response)
            .with_connection(response),
    );
    let cache = MemoryResponseCache::new();
    let mut client = caching_client(&transport, &cache);

    assert_eq!(read_body(&mut client, "http://example.test/secret"), "hello");
    assert!(cache.stored_body("http://example.test/secret").is_none());

    let mut exchange = client.open("http://example.test/secret").unwrap();
    assert_eq!(exchange.response_code().unwrap(), Some(200));

    let log = transport.log();
    assert_eq!(log.opened + log.reused, 2);
    assert_eq!(cache.stats().commits, 0);
    assert_eq!(cache.stats().misses, 2);
}

#[test]
fn test_only_if_cached_without_entry_is_gateway_timeout() {
    let transport = Arc::new(ScriptedTransport::new().with_connection(HELLO));
    let cache = MemoryResponseCache::new();
    let mut client = caching_client(&transport, &cache);

    let mut exchange = client.open("http://example.test/doc").unwrap();
    exchange
        .set_request_property("Cache-Control", "only-if-cached")
        .unwrap();

    assert_eq!(exchange.response_code().unwrap(), Some(504));
    assert_eq!(transport.log().opened, 0);
}

/// WHY: Entries must hold what the origin sent so they can be replayed as is
/// WHAT: The cache keeps gzip bytes while both reads see plain text
#[test]
fn test_gzip_body_is_stored_compressed() {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(b"zipped text").unwrap();
    let compressed = encoder.finish().unwrap();
    let mut response = format!(
        "HTTP/1.1 200 OK\r\nCache-Control: max-age=60\r\nContent-Encoding: gzip\r\nContent-Length: {}\r\n\r\n",
        compressed.len()
    )
    .into_bytes();
    response.extend_from_slice(&compressed);

    let transport = Arc::new(ScriptedTransport::new().with_connection(response));
    let cache = MemoryResponseCache::new();
    let mut client = caching_client(&transport, &cache);

    assert_eq!(read_body(&mut client, "http://example.test/zip"), "zipped text");
    assert!(transport.written(0).contains("\r\nAccept-Encoding: gzip\r\n"));
    assert_eq!(cache.stored_body("http://example.test/zip"), Some(compressed));

    let mut exchange = client.open("http://example.test/zip").unwrap();
    assert_eq!(exchange.header_field("Content-Encoding").unwrap(), None);
    let mut body = String::new();
    exchange.input_stream().unwrap().read_to_string(&mut body).unwrap();
    assert_eq!(body, "zipped text");
    assert_eq!(transport.log().opened, 1);
}
