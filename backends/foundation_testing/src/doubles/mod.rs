//! In-memory stand-ins for the client's collaborators.
//!
//! WHY: Exchange behaviour (connection reuse, cache commits, auth retries)
//! is easiest to observe without sockets.
//!
//! WHAT: `ScriptedTransport`, `MemoryResponseCache`, `StaticAuthenticator`
//! and `MemoryCookieStore`.

mod cache;
mod collaborators;
mod transport;

pub use cache::{CacheStats, MemoryResponseCache};
pub use collaborators::{MemoryCookieStore, StaticAuthenticator};
pub use transport::{ScriptedTransport, TransportLog};
