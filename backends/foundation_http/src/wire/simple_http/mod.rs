pub mod client;

mod cache;
mod cache_control;
mod errors;
mod headers;
mod incoming;
mod lines;
mod method;
mod outgoing;

pub use cache::*;
pub use cache_control::*;
pub use errors::*;
pub use headers::*;
pub use incoming::*;
pub use lines::*;
pub use method::*;
pub use outgoing::*;
