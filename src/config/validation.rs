//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate header names/values used for forwarding rewrites
//! - Validate route targets and names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - `listener.bind_address` must be a literal `ip:port`; hostnames are not
//!   resolved, so the plain and TLS listeners bind the same parsed address
//! - Route targets must use `http`: the upstream client has no TLS connector,
//!   so `https` targets are refused here instead of failing per request
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue};
use url::Url;

use crate::config::schema::{ForwardingConfig, ProxyConfig, RouteConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid bind address {0:?}")]
    BindAddress(String),

    #[error("invalid header name {value:?} for {field}")]
    HeaderName { field: &'static str, value: String },

    #[error("invalid header value {value:?} for {field}")]
    HeaderValue { field: &'static str, value: String },

    #[error("route {route:?}: invalid target {target:?}: {reason}")]
    Target {
        route: String,
        target: String,
        reason: String,
    },

    #[error("duplicate route name {0:?}")]
    DuplicateRoute(String),

    #[error("timeouts.request_secs must be greater than zero")]
    ZeroRequestTimeout,
}

/// Validate a parsed configuration, collecting every error found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    errors.extend(validate_forwarding(&config.proxy));

    let mut names = HashSet::new();
    for route in &config.routes {
        if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }
        if let Err(e) = parse_target(route) {
            errors.push(e);
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check the `[proxy]` section on its own.
pub fn validate_forwarding(cfg: &ForwardingConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for (field, value) in [
        ("proxy.client_ip_header", &cfg.client_ip_header),
        ("proxy.tls_header", &cfg.tls_header),
    ] {
        if !value.is_empty() && HeaderName::from_bytes(value.as_bytes()).is_err() {
            errors.push(ValidationError::HeaderName {
                field,
                value: value.clone(),
            });
        }
    }

    for (field, value) in [
        ("proxy.local_ip", &cfg.local_ip),
        ("proxy.tls_header_value", &cfg.tls_header_value),
    ] {
        if HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::HeaderValue {
                field,
                value: value.clone(),
            });
        }
    }

    errors
}

/// Parse a route's target into an absolute http base URL.
pub fn parse_target(route: &RouteConfig) -> Result<Url, ValidationError> {
    let invalid = |reason: String| ValidationError::Target {
        route: route.name.clone(),
        target: route.target.clone(),
        reason,
    };

    let url = Url::parse(&route.target).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "http" {
        return Err(invalid(format!(
            "unsupported scheme {} (only http targets are forwarded)",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}
