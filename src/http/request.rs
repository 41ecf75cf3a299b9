//! Per-request connection metadata.
//!
//! # Responsibilities
//! - Carry the peer address and TLS state from the listener to the dispatcher
//! - Extract the trace token used for route lookup diagnostics
//! - Split `host:port` peer addresses

use axum::body::Body;
use axum::http::Request;

/// Header carrying the route-lookup trace token.
pub const TRACE_HEADER: &str = "trace";

/// Marker for requests received over an encrypted connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TlsInfo;

/// Connection facts recorded by the listener, stored in request extensions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConn {
    /// Peer address in `host:port` form.
    pub remote_addr: String,
    /// Present iff the connection is encrypted.
    pub tls: Option<TlsInfo>,
}

impl ClientConn {
    pub fn plain(remote_addr: impl Into<String>) -> Self {
        Self {
            remote_addr: remote_addr.into(),
            tls: None,
        }
    }

    pub fn secure(remote_addr: impl Into<String>) -> Self {
        Self {
            remote_addr: remote_addr.into(),
            tls: Some(TlsInfo),
        }
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }
}

/// The request's trace token, if it sent a non-empty `trace` header.
pub fn trace_token(req: &Request<Body>) -> Option<String> {
    req.headers()
        .get(TRACE_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Split `host:port` or `[host]:port` into its parts.
///
/// The port may be empty; the brackets of an IPv6 literal are removed.
/// Returns `None` for a missing port, unbalanced brackets, or a bare IPv6
/// address with unbracketed colons.
pub fn split_host_port(addr: &str) -> Option<(&str, &str)> {
    let colon = addr.rfind(':')?;

    let (host, host_start, host_end) = if addr.starts_with('[') {
        let close = addr.find(']')?;
        if close + 1 != colon {
            return None;
        }
        (&addr[1..close], 1, close + 1)
    } else {
        let host = &addr[..colon];
        if host.contains(':') {
            return None;
        }
        (host, 0, 0)
    };

    if addr[host_start..].contains('[') || addr[host_end..].contains(']') {
        return None;
    }

    Some((host, &addr[colon + 1..]))
}
