//! Network layer subsystem.
//!
//! Plain listeners are bound directly with Tokio; `tls.rs` prepares the
//! rustls configuration for the optional HTTPS listener.

pub mod tls;
