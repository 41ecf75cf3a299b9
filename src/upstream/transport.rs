//! Forwarding transport.
//!
//! # Responsibilities
//! - Send the rewritten request to the target and stream the response back
//! - Map connection-level failures to 502
//!
//! # Design Decisions
//! - No retries and no reinterpretation of backend statuses
//! - Outbound HTTP/1 header names are written in title case
//!   (`X-Forwarded-For`, `Forwarded`) for downstream consumers that
//!   expect conventional casing
//! - The inbound `Host` header is preserved

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response, Version};
use axum::response::IntoResponse;
use futures_util::future::BoxFuture;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use url::Url;

use crate::config::TimeoutConfig;
use crate::http::response::DispatchError;
use crate::upstream::rewrite::{remove_hop_by_hop, rewrite_uri};

/// Performs the request/response cycle against a target base URL.
///
/// Failures are reported through the returned response; the future is
/// cancelled by dropping it.
pub trait ForwardTransport: Send + Sync {
    fn forward(&self, base: &Url, req: Request<Body>) -> BoxFuture<'static, Response<Body>>;
}

/// Transport over a pooled hyper client.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Body>,
}

impl HyperTransport {
    pub fn new(timeouts: &TimeoutConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));

        let client = Client::builder(TokioExecutor::new())
            .http1_title_case_headers(true)
            .build(connector);

        Self { client }
    }
}

impl ForwardTransport for HyperTransport {
    fn forward(&self, base: &Url, req: Request<Body>) -> BoxFuture<'static, Response<Body>> {
        let client = self.client.clone();
        let base = base.clone();

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();

            let uri = match rewrite_uri(&base, &parts.uri) {
                Ok(uri) => uri,
                Err(e) => {
                    tracing::error!(target_url = %base, error = %e, "Cannot build upstream URI");
                    return DispatchError::Upstream(e.to_string()).into_response();
                }
            };

            // HTTP/2 clients send the host as :authority only.
            if !parts.headers.contains_key(header::HOST) {
                if let Some(authority) = parts.uri.authority() {
                    if let Ok(host) = HeaderValue::from_str(authority.as_str()) {
                        parts.headers.insert(header::HOST, host);
                    }
                }
            }

            remove_hop_by_hop(&mut parts.headers);
            parts.uri = uri;
            parts.version = Version::HTTP_11;

            match client.request(Request::from_parts(parts, body)).await {
                Ok(response) => {
                    let (mut parts, body) = response.into_parts();
                    remove_hop_by_hop(&mut parts.headers);
                    Response::from_parts(parts, Body::new(body))
                }
                Err(e) => {
                    tracing::error!(target_url = %base, error = %e, "Upstream error");
                    DispatchError::Upstream(e.to_string()).into_response()
                }
            }
        })
    }
}
