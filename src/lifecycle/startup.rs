//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Start background tasks (config reload, signal handling)
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Metrics exporter is installed before any instrument is created
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::net::TcpListener;

use crate::config::watcher::ConfigWatcher;
use crate::config::{ConfigError, ProxyConfig};
use crate::http::{Dispatcher, ForwardRules, HttpServer};
use crate::lifecycle::{signals, Shutdown};
use crate::net::tls::load_tls_config;
use crate::observability::metrics::init_metrics;
use crate::observability::PrometheusRecorder;
use crate::routing::RoutingTable;
use crate::upstream::HyperTransport;

/// Errors that abort startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config watcher: {0}")]
    Watch(#[from] notify::Error),
}

/// Run the proxy until a termination signal has drained it.
///
/// `config_path` enables hot reload of routes and forwarding rules.
pub async fn run(config: ProxyConfig, config_path: Option<PathBuf>) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let table = Arc::new(
        RoutingTable::from_config(&config.routes)
            .map_err(|e| ConfigError::Validation(vec![e]))?,
    );
    let rules = Arc::new(ArcSwap::from_pointee(
        ForwardRules::try_from(&config.proxy).map_err(ConfigError::Validation)?,
    ));
    let shutdown = Arc::new(Shutdown::new());

    let dispatcher = Arc::new(Dispatcher::new(
        table.clone(),
        Arc::new(HyperTransport::new(&config.timeouts)),
        Arc::new(PrometheusRecorder::new()),
        rules.clone(),
        shutdown.flag(),
    ));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = table.len(),
        tls = config.listener.tls.is_some(),
        "Configuration loaded"
    );

    // Dropping the watcher stops notifications, so it lives until run returns.
    let _watcher = match config_path {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(&path);
            let watcher = watcher.run()?;

            let table = table.clone();
            let rules = rules.clone();
            let bind_address = config.listener.bind_address.clone();
            let mut stop = shutdown.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        Some(update) = updates.recv() => {
                            apply_update(&update, &table, &rules, &bind_address);
                        }
                        _ = stop.recv() => break,
                    }
                }
            });
            Some(watcher)
        }
        None => None,
    };

    let wait = Duration::from_secs(config.lifecycle.shutdown_wait_secs);
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        signal_shutdown.begin_draining();
        if !wait.is_zero() {
            tracing::info!(wait = ?wait, "Waiting before stopping listeners");
            tokio::time::sleep(wait).await;
        }
        tracing::info!(
            subscribers = signal_shutdown.receiver_count(),
            "Stopping listeners"
        );
        signal_shutdown.trigger();
    });

    // Literal ip:port; validation rejects hostnames.
    let addr: SocketAddr = config.listener.bind_address.parse().map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid bind address {}", config.listener.bind_address),
        )
    })?;

    let server = HttpServer::new(&config, dispatcher);
    match &config.listener.tls {
        Some(tls) => {
            let tls = load_tls_config(tls).await?;
            server.run_tls(addr, tls, shutdown.subscribe()).await?;
        }
        None => {
            let listener = TcpListener::bind(addr).await?;
            server.run(listener, shutdown.subscribe()).await?;
        }
    }

    Ok(())
}

/// Publish a reloaded configuration. Listener and timeout changes need a
/// restart and are only logged.
fn apply_update(
    update: &ProxyConfig,
    table: &RoutingTable,
    rules: &ArcSwap<ForwardRules>,
    bind_address: &str,
) {
    if let Err(e) = table.update(&update.routes) {
        tracing::error!(error = %e, "Rejected reloaded routes");
        return;
    }

    match ForwardRules::try_from(&update.proxy) {
        Ok(new_rules) => {
            rules.store(Arc::new(new_rules));
            tracing::info!("Forwarding rules updated");
        }
        Err(errors) => {
            for e in errors {
                tracing::error!(error = %e, "Rejected reloaded forwarding rules");
            }
        }
    }

    if update.listener.bind_address != bind_address {
        tracing::warn!(
            bind_address = %update.listener.bind_address,
            "Listener changes require a restart"
        );
    }
}
