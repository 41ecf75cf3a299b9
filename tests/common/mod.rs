//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use dynamic_proxy::config::ProxyConfig;
use dynamic_proxy::http::{Dispatcher, ForwardRules, HttpServer};
use dynamic_proxy::lifecycle::Shutdown;
use dynamic_proxy::observability::PrometheusRecorder;
use dynamic_proxy::routing::RoutingTable;
use dynamic_proxy::upstream::HyperTransport;

/// Start a backend that answers every request with its raw request head.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    head.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.write_all(&head).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Start the proxy on an ephemeral port.
pub async fn start_proxy(config: ProxyConfig) -> (SocketAddr, Arc<Shutdown>) {
    let shutdown = Arc::new(Shutdown::new());
    let dispatcher = Dispatcher::new(
        Arc::new(RoutingTable::from_config(&config.routes).unwrap()),
        Arc::new(HyperTransport::new(&config.timeouts)),
        Arc::new(PrometheusRecorder::new()),
        Arc::new(ArcSwap::from_pointee(
            ForwardRules::try_from(&config.proxy).unwrap(),
        )),
        shutdown.flag(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(&config, Arc::new(dispatcher));
    let stop = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, stop).await;
    });

    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}
