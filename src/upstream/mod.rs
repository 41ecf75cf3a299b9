//! Upstream forwarding.
//!
//! # Data Flow
//! ```text
//! Enriched request + target base URL
//!     → rewrite.rs (URI rewrite, hop-by-hop stripping)
//!     → transport.rs (hyper client round trip)
//!     → streamed response back to the dispatcher
//! ```

pub mod rewrite;
pub mod transport;

pub use transport::{ForwardTransport, HyperTransport};
