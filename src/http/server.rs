//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the dispatch handler
//! - Record peer address and TLS state for each request
//! - Wire up middleware (tracing, request timeout)
//! - Serve plain or TLS listeners with graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::Response,
    middleware::{self, Next},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ProxyConfig;
use crate::http::dispatcher::Dispatcher;
use crate::http::request::ClientConn;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// HTTP front end of the proxy.
pub struct HttpServer {
    state: AppState,
    request_timeout: Duration,
}

impl HttpServer {
    /// Create a new HTTP server serving through `dispatcher`.
    pub fn new(config: &ProxyConfig, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            state: AppState { dispatcher },
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
        }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// `secure` marks every request as received over TLS.
    #[allow(deprecated)]
    fn build_router(&self, secure: bool) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(self.state.clone())
            .layer(middleware::from_fn_with_state(secure, record_client_conn))
            .layer(TimeoutLayer::new(self.request_timeout))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server on a plain TCP listener until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .build_router(false)
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server on a TLS listener until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let stopper = handle.clone();
        let grace = self.request_timeout;
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            stopper.graceful_shutdown(Some(grace));
        });

        let app = self
            .build_router(true)
            .into_make_service_with_connect_info::<SocketAddr>();

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app)
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

/// Copy the peer address from `ConnectInfo` into a [`ClientConn`].
async fn record_client_conn(
    State(secure): State<bool>,
    mut request: Request,
    next: Next,
) -> Response<Body> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string());

    if let Some(peer) = peer {
        let conn = if secure {
            ClientConn::secure(peer)
        } else {
            ClientConn::plain(peer)
        };
        request.extensions_mut().insert(conn);
    }

    next.run(request).await
}

async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response<Body> {
    state.dispatcher.handle(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use arc_swap::ArcSwap;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    use crate::config::RouteConfig;
    use crate::http::headers::ForwardRules;
    use crate::lifecycle::Shutdown;
    use crate::observability::PrometheusRecorder;
    use crate::routing::RoutingTable;
    use crate::upstream::HyperTransport;

    fn server(routes: &[RouteConfig], shutdown: &Shutdown) -> HttpServer {
        let config = ProxyConfig::default();
        let dispatcher = Dispatcher::new(
            Arc::new(RoutingTable::from_config(routes).unwrap()),
            Arc::new(HyperTransport::new(&config.timeouts)),
            Arc::new(PrometheusRecorder::new()),
            Arc::new(ArcSwap::from_pointee(ForwardRules::default())),
            shutdown.flag(),
        );
        HttpServer::new(&config, Arc::new(dispatcher))
    }

    #[tokio::test]
    async fn unmatched_request_is_not_found() {
        let shutdown = Shutdown::new();
        let router = server(&[], &shutdown).build_router(false);

        let mut request = Request::builder().uri("/nowhere").body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_connect_info_is_internal_error() {
        let shutdown = Shutdown::new();
        let routes = [RouteConfig {
            name: "web".into(),
            host: None,
            path_prefix: None,
            target: "http://127.0.0.1:1".into(),
            priority: 0,
        }];
        let router = server(&routes, &shutdown).build_router(false);

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn middleware_marks_tls_requests() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();

        let router = Router::new()
            .fallback(move |request: Request| {
                let counter = counter.clone();
                async move {
                    if request.extensions().get::<ClientConn>()
                        == Some(&ClientConn::secure("10.1.1.1:443"))
                    {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                    StatusCode::OK
                }
            })
            .layer(middleware::from_fn_with_state(true, record_client_conn));

        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 1, 1, 1], 443))));

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
