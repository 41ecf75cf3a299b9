//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, ClientConn recording)
//!     → dispatcher.rs (shutdown check, route lookup)
//!     → headers.rs (Forwarded / X-Forwarded-For rewrite)
//!     → upstream transport
//!     → response.rs (errors raised before the backend is reached)
//! ```

pub mod dispatcher;
pub mod headers;
pub mod request;
pub mod response;
pub mod server;

pub use dispatcher::Dispatcher;
pub use headers::{enrich, ForwardRules, HeaderError};
pub use request::{ClientConn, TlsInfo};
pub use response::DispatchError;
pub use server::HttpServer;
