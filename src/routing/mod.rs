//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path, trace token)
//!     → router.rs (route lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: matched Target or None
//!
//! Route Compilation (startup and reload):
//!     RouteConfig[]
//!     → Parse target URLs
//!     → Compile matchers
//!     → Sort by priority
//!     → Publish atomically
//! ```

pub mod matcher;
pub mod router;
pub mod target;

pub use router::{RouteResolver, RoutingTable};
pub use target::Target;
