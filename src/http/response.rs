//! Error responses produced by the proxy itself.
//!
//! # Design Decisions
//! - Every early exit maps to exactly one status code
//! - Backend responses, including 5xx, pass through untouched; only
//!   transport failures are turned into 502 here

use axum::body::Body;
use axum::http::{Response, StatusCode, Uri};
use axum::response::IntoResponse;

use crate::http::headers::HeaderError;

/// Reasons a request is answered without a backend response.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("shutting down")]
    ShuttingDown,

    #[error("no route for {0}")]
    NoRoute(Uri),

    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error("upstream request failed: {0}")]
    Upstream(String),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::NoRoute(_) => StatusCode::NOT_FOUND,
            DispatchError::Header(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DispatchError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response<Body> {
        let status = self.status();
        match self {
            DispatchError::NoRoute(_) => status.into_response(),
            DispatchError::Upstream(_) => (status, "Upstream request failed").into_response(),
            other => (status, other.to_string()).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn maps_errors_to_responses() {
        let response = DispatchError::ShuttingDown.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_text(response).await, "shutting down");

        let response = DispatchError::NoRoute(Uri::from_static("/missing")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "");

        let response =
            DispatchError::from(HeaderError::AddressParse("1.2.3.4".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "cannot parse 1.2.3.4");

        let response = DispatchError::Upstream("connection refused".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_text(response).await, "Upstream request failed");
    }
}
