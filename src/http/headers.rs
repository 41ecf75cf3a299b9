//! Forwarding header rewrites.
//!
//! Every hop records the client and itself without erasing what earlier
//! proxies wrote:
//!
//! | header               | rule                                               |
//! |----------------------|----------------------------------------------------|
//! | client IP header     | replaced with the peer host                        |
//! | `X-Forwarded-For`    | extended with `, <local_ip>`; never created        |
//! | `Forwarded`          | existing value (or `for=<ip>; proto=<p>`) + `; by=<local_ip>` |
//! | TLS header           | replaced with the configured value on TLS only     |
//!
//! Writes are staged and applied at the end, so a failed rewrite leaves the
//! header map exactly as it was.

use axum::body::Body;
use axum::http::header::{HeaderMap, HeaderName, HeaderValue, FORWARDED};
use axum::http::Request;

use crate::config::validation::{validate_forwarding, ValidationError};
use crate::config::ForwardingConfig;
use crate::http::request::{split_host_port, ClientConn};

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Errors from [`enrich`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    /// The peer address is not `host:port`.
    #[error("cannot parse {0}")]
    AddressParse(String),

    /// A rewritten value contains bytes not allowed in a header.
    #[error("invalid value for header {0}")]
    InvalidValue(HeaderName),
}

/// Typed form of [`ForwardingConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardRules {
    client_ip_header: Option<HeaderName>,
    local_ip: Option<String>,
    tls_header: Option<(HeaderName, HeaderValue)>,
}

impl TryFrom<&ForwardingConfig> for ForwardRules {
    type Error = Vec<ValidationError>;

    fn try_from(cfg: &ForwardingConfig) -> Result<Self, Self::Error> {
        let errors = validate_forwarding(cfg);
        if !errors.is_empty() {
            return Err(errors);
        }

        // Validated above.
        let name = |s: &str| HeaderName::from_bytes(s.as_bytes()).ok();
        let non_empty = |s: &String| (!s.is_empty()).then(|| s.clone());

        let tls_header = name(&cfg.tls_header).zip(HeaderValue::from_str(&cfg.tls_header_value).ok());

        Ok(Self {
            client_ip_header: non_empty(&cfg.client_ip_header).and_then(|s| name(&s)),
            local_ip: non_empty(&cfg.local_ip),
            tls_header,
        })
    }
}

/// Staged header writes; later entries win.
#[derive(Default)]
struct Staged(Vec<(HeaderName, HeaderValue)>);

impl Staged {
    fn set(&mut self, name: HeaderName, value: HeaderValue) {
        self.0.push((name, value));
    }

    /// Current value of `name` as the request would see it after the
    /// writes staged so far. Repeated field lines are joined with `, `.
    /// Empty values count as absent.
    fn current(&self, headers: &HeaderMap, name: &HeaderName) -> Option<Vec<u8>> {
        let value = match self.0.iter().rev().find(|(n, _)| n == name) {
            Some((_, v)) => v.as_bytes().to_vec(),
            None => {
                let mut joined = Vec::new();
                for v in headers.get_all(name) {
                    if !joined.is_empty() {
                        joined.extend_from_slice(b", ");
                    }
                    joined.extend_from_slice(v.as_bytes());
                }
                joined
            }
        };
        (!value.is_empty()).then_some(value)
    }

    fn apply(self, headers: &mut HeaderMap) {
        for (name, value) in self.0 {
            headers.insert(name, value);
        }
    }
}

fn header_value(name: &HeaderName, bytes: &[u8]) -> Result<HeaderValue, HeaderError> {
    HeaderValue::from_bytes(bytes).map_err(|_| HeaderError::InvalidValue(name.clone()))
}

/// Rewrite the forwarding headers of `req` for the next hop.
///
/// The peer address is read from the [`ClientConn`] extension; a request
/// without one is treated as having an empty address.
pub fn enrich(req: &mut Request<Body>, rules: &ForwardRules) -> Result<(), HeaderError> {
    let conn = req.extensions().get::<ClientConn>().cloned().unwrap_or_default();

    let (remote_ip, _) = split_host_port(&conn.remote_addr)
        .ok_or_else(|| HeaderError::AddressParse(conn.remote_addr.clone()))?;

    let headers = req.headers();
    let mut staged = Staged::default();

    if let Some(name) = &rules.client_ip_header {
        staged.set(name.clone(), header_value(name, remote_ip.as_bytes())?);
    }

    if let Some(local_ip) = &rules.local_ip {
        if let Some(mut xff) = staged.current(headers, &X_FORWARDED_FOR) {
            xff.extend_from_slice(b", ");
            xff.extend_from_slice(local_ip.as_bytes());
            staged.set(X_FORWARDED_FOR, header_value(&X_FORWARDED_FOR, &xff)?);
        }
    }

    let mut fwd = match staged.current(headers, &FORWARDED) {
        Some(existing) => existing,
        None => {
            let proto = if conn.is_tls() { "https" } else { "http" };
            format!("for={}; proto={}", remote_ip, proto).into_bytes()
        }
    };
    if let Some(local_ip) = &rules.local_ip {
        fwd.extend_from_slice(b"; by=");
        fwd.extend_from_slice(local_ip.as_bytes());
    }
    staged.set(FORWARDED, header_value(&FORWARDED, &fwd)?);

    if let (Some((name, value)), true) = (&rules.tls_header, conn.is_tls()) {
        staged.set(name.clone(), value.clone());
    }

    staged.apply(req.headers_mut());
    Ok(())
}
