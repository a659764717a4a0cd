// Consolidated test module for `tests/backends/foundation_http/units`.
//
// If you add new unit test files into this directory, add a corresponding
// `mod` entry here so the test runner picks them up.

#![allow(dead_code)]
#![allow(unused_imports)]

mod auth_tests;
mod cache_tests;
mod config_tests;
mod cookie_tests;
mod exchange_tests;
mod lifecycle_tests;
mod redirect_tests;

use std::sync::Arc;

use foundation_http::wire::simple_http::client::{SimpleHttpClient, Transport};
use foundation_testing::doubles::ScriptedTransport;

/// Client whose exchanges all go through `transport`.
fn client_over(transport: &Arc<ScriptedTransport>) -> SimpleHttpClient {
    let shared: Arc<dyn Transport> = transport.clone();
    SimpleHttpClient::new().transport(shared)
}
