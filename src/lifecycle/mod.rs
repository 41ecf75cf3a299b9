//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Metrics → Routing table + rules → Dispatcher → Listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → draining flag set (new requests get 503)
//!     → shutdown_wait_secs → stop listener → drain connections → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownFlag};
