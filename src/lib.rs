//! Dynamic HTTP reverse proxy.
//!
//! Each request is checked against the shutdown flag, resolved to a target
//! through the routing table, has its forwarding headers rewritten, and is
//! forwarded to the target while its latency is recorded.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod upstream;

pub use config::schema::ProxyConfig;
pub use http::{Dispatcher, HttpServer};
pub use lifecycle::Shutdown;
