// HTTP/1.x client module
//
// Request orchestration over pluggable transport, proxy, cache, cookie and
// credential collaborators.

mod auth;
mod body;
mod client;
mod config;
mod connection;
mod cookies;
mod dns;
mod errors;
mod exchange;
mod lifecycle;
mod pool;
mod proxy;
mod redirects;
mod state;
mod transport;

pub use auth::*;
pub use body::*;
pub use client::*;
pub use config::*;
pub use connection::*;
pub use cookies::*;
pub use dns::*;
pub use errors::*;
pub use exchange::*;
pub use lifecycle::*;
pub use pool::*;
pub use proxy::*;
pub use redirects::*;
pub use state::*;
pub use transport::*;
