//! Cross-crate tests for `foundation_http`, driven through the doubles and
//! the local server from `foundation_testing`.
