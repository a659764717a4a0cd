//! Reusable test infrastructure for the `foundation_http` client.
//!
//! This crate provides:
//! - **Scripted transport**: in-memory connections replaying canned response
//!   bytes while recording writes, recycles and closes
//! - **Collaborators**: in-memory response cache, cookie store and a static
//!   authenticator
//! - **Test server**: a local TCP server answering with hand-written responses
//!
//! # Examples
//!
//! ```rust
//! use foundation_testing::doubles::ScriptedTransport;
//!
//! let transport = ScriptedTransport::new()
//!     .with_connection("HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");
//! assert_eq!(transport.log().opened, 0);
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Common for testing crates

pub mod doubles;
pub mod http;
