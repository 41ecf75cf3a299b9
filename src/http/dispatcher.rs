//! Per-request dispatch.
//!
//! ```text
//! shutdown check → route lookup → header rewrite → forward → latency metrics
//! ```
//!
//! Each step may end the request early; metrics are only recorded once the
//! transport has produced a response.

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;

use crate::http::headers::{enrich, ForwardRules};
use crate::http::request::trace_token;
use crate::http::response::DispatchError;
use crate::lifecycle::shutdown::ShutdownFlag;
use crate::observability::MetricsRecorder;
use crate::routing::RouteResolver;
use crate::upstream::ForwardTransport;

/// Entry point for every proxied request.
pub struct Dispatcher {
    resolver: Arc<dyn RouteResolver>,
    transport: Arc<dyn ForwardTransport>,
    metrics: Arc<dyn MetricsRecorder>,
    rules: Arc<ArcSwap<ForwardRules>>,
    shutdown: ShutdownFlag,
}

impl Dispatcher {
    pub fn new(
        resolver: Arc<dyn RouteResolver>,
        transport: Arc<dyn ForwardTransport>,
        metrics: Arc<dyn MetricsRecorder>,
        rules: Arc<ArcSwap<ForwardRules>>,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            resolver,
            transport,
            metrics,
            rules,
            shutdown,
        }
    }

    /// Serve one request.
    pub async fn handle(&self, mut req: Request<Body>) -> Response<Body> {
        if self.shutdown.is_set() {
            return DispatchError::ShuttingDown.into_response();
        }

        let trace = trace_token(&req);
        let target = match self.resolver.lookup(&req, trace.as_deref()) {
            Some(target) => target,
            None => {
                tracing::warn!(url = %req.uri(), "No route for request");
                return DispatchError::NoRoute(req.uri().clone()).into_response();
            }
        };

        // One snapshot per request; a reload mid-request is not observed.
        let rules = self.rules.load_full();
        if let Err(e) = enrich(&mut req, &rules) {
            tracing::error!(error = %e, "Cannot rewrite forwarding headers");
            return DispatchError::from(e).into_response();
        }

        tracing::debug!(
            method = %req.method(),
            url = %req.uri(),
            route = %target.name(),
            "Forwarding request"
        );

        let start = Instant::now();
        let response = self.transport.forward(target.url(), req).await;
        let elapsed = start.elapsed();

        self.metrics.record_target(&target, elapsed);
        self.metrics.record_global(elapsed);

        tracing::debug!(
            route = %target.name(),
            status = response.status().as_u16(),
            elapsed = ?elapsed,
            "Request completed"
        );

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use axum::http::{HeaderMap, StatusCode};
    use futures_util::future::BoxFuture;
    use url::Url;

    use crate::config::ForwardingConfig;
    use crate::http::request::ClientConn;
    use crate::lifecycle::Shutdown;
    use crate::routing::Target;

    #[derive(Default)]
    struct FakeResolver {
        target: Option<Arc<Target>>,
        calls: AtomicUsize,
        traces: Mutex<Vec<Option<String>>>,
    }

    impl RouteResolver for FakeResolver {
        fn lookup(&self, _req: &Request<Body>, trace: Option<&str>) -> Option<Arc<Target>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.traces.lock().unwrap().push(trace.map(str::to_owned));
            self.target.clone()
        }
    }

    struct FakeTransport {
        status: StatusCode,
        calls: AtomicUsize,
        seen: Mutex<Option<(Url, HeaderMap)>>,
    }

    impl FakeTransport {
        fn new(status: StatusCode) -> Self {
            Self {
                status,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(None),
            }
        }
    }

    impl ForwardTransport for FakeTransport {
        fn forward(&self, base: &Url, req: Request<Body>) -> BoxFuture<'static, Response<Body>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen.lock().unwrap() = Some((base.clone(), req.headers().clone()));
            let status = self.status;
            Box::pin(async move { status.into_response() })
        }
    }

    /// Transport whose round trip never completes.
    #[derive(Default)]
    struct StalledTransport {
        calls: AtomicUsize,
    }

    impl ForwardTransport for StalledTransport {
        fn forward(&self, _base: &Url, _req: Request<Body>) -> BoxFuture<'static, Response<Body>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(std::future::pending())
        }
    }

    #[derive(Default)]
    struct CountingRecorder {
        target: Mutex<Vec<String>>,
        global: AtomicUsize,
    }

    impl MetricsRecorder for CountingRecorder {
        fn record_target(&self, target: &Target, _elapsed: Duration) {
            self.target.lock().unwrap().push(target.name().to_string());
        }

        fn record_global(&self, _elapsed: Duration) {
            self.global.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        shutdown: Shutdown,
        resolver: Arc<FakeResolver>,
        transport: Arc<FakeTransport>,
        metrics: Arc<CountingRecorder>,
        dispatcher: Dispatcher,
    }

    fn harness(target: Option<&str>, status: StatusCode, local_ip: &str) -> Harness {
        let shutdown = Shutdown::new();
        let resolver = Arc::new(FakeResolver {
            target: target.map(|url| Arc::new(Target::new("web", Url::parse(url).unwrap()))),
            ..Default::default()
        });
        let transport = Arc::new(FakeTransport::new(status));
        let metrics = Arc::new(CountingRecorder::default());
        let rules = ForwardRules::try_from(&ForwardingConfig {
            local_ip: local_ip.into(),
            ..Default::default()
        })
        .unwrap();

        let dispatcher = Dispatcher::new(
            resolver.clone(),
            transport.clone(),
            metrics.clone(),
            Arc::new(ArcSwap::from_pointee(rules)),
            shutdown.flag(),
        );

        Harness {
            shutdown,
            resolver,
            transport,
            metrics,
            dispatcher,
        }
    }

    fn request(remote_addr: &str) -> Request<Body> {
        let mut req = Request::builder()
            .uri("/api/users")
            .header("trace", "t-1")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut().insert(ClientConn::plain(remote_addr));
        req
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn rejects_while_shutting_down() {
        let h = harness(Some("http://10.0.0.1:3000"), StatusCode::OK, "");
        h.shutdown.begin_draining();

        let response = h.dispatcher.handle(request("1.2.3.4:5555")).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_text(response).await, "shutting down");
        assert_eq!(h.resolver.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 0);
        assert!(h.metrics.target.lock().unwrap().is_empty());
        assert_eq!(h.metrics.global.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unmatched_request_is_not_found() {
        let h = harness(None, StatusCode::OK, "");

        let response = h.dispatcher.handle(request("1.2.3.4:5555")).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(h.resolver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 0);
        assert!(h.metrics.target.lock().unwrap().is_empty());
        assert_eq!(h.metrics.global.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bad_peer_address_is_internal_error() {
        let h = harness(Some("http://10.0.0.1:3000"), StatusCode::OK, "");

        let response = h.dispatcher.handle(request("1.2.3.4")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "cannot parse 1.2.3.4");
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.metrics.global.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn forwards_enriched_request_and_records_latency() {
        let h = harness(Some("http://10.0.0.1:3000/base"), StatusCode::OK, "5.6.7.8");

        let response = h.dispatcher.handle(request("1.2.3.4:5555")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            h.resolver.traces.lock().unwrap().as_slice(),
            &[Some("t-1".to_string())]
        );

        let (url, headers) = h.transport.seen.lock().unwrap().take().unwrap();
        assert_eq!(url.as_str(), "http://10.0.0.1:3000/base");
        assert_eq!(headers["forwarded"], "for=1.2.3.4; proto=http; by=5.6.7.8");

        assert_eq!(h.metrics.target.lock().unwrap().as_slice(), &["web".to_string()]);
        assert_eq!(h.metrics.global.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn backend_errors_pass_through_and_are_measured() {
        let h = harness(Some("http://10.0.0.1:3000"), StatusCode::BAD_GATEWAY, "");

        let response = h.dispatcher.handle(request("1.2.3.4:5555")).await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.metrics.target.lock().unwrap().len(), 1);
        assert_eq!(h.metrics.global.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn uses_latest_rules_snapshot() {
        let h = harness(Some("http://10.0.0.1:3000"), StatusCode::OK, "");
        h.dispatcher.rules.store(Arc::new(
            ForwardRules::try_from(&ForwardingConfig {
                client_ip_header: "X-Client-Ip".into(),
                ..Default::default()
            })
            .unwrap(),
        ));

        h.dispatcher.handle(request("1.2.3.4:5555")).await;

        let (_, headers) = h.transport.seen.lock().unwrap().take().unwrap();
        assert_eq!(headers["x-client-ip"], "1.2.3.4");
    }

    #[tokio::test]
    async fn dropped_request_records_no_latency() {
        let shutdown = Shutdown::new();
        let transport = Arc::new(StalledTransport::default());
        let metrics = Arc::new(CountingRecorder::default());
        let dispatcher = Dispatcher::new(
            Arc::new(FakeResolver {
                target: Some(Arc::new(Target::new(
                    "web",
                    Url::parse("http://10.0.0.1:3000").unwrap(),
                ))),
                ..Default::default()
            }),
            transport.clone(),
            metrics.clone(),
            Arc::new(ArcSwap::from_pointee(ForwardRules::default())),
            shutdown.flag(),
        );

        let result = tokio::time::timeout(
            Duration::from_millis(20),
            dispatcher.handle(request("1.2.3.4:5555")),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert!(metrics.target.lock().unwrap().is_empty());
        assert_eq!(metrics.global.load(Ordering::SeqCst), 0);
    }
}
