//! Shutdown coordination for the proxy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// Coordinator for graceful shutdown.
///
/// Shutdown happens in two steps. [`Shutdown::begin_draining`] raises the
/// draining flag so the dispatcher rejects new requests, then
/// [`Shutdown::trigger`] notifies every subscriber (listeners, watchers)
/// to stop.
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
    draining: Arc<AtomicBool>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            draining: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Read-only handle on the draining flag.
    pub fn flag(&self) -> ShutdownFlag {
        ShutdownFlag {
            draining: Arc::clone(&self.draining),
        }
    }

    /// Enter drain mode. Idempotent.
    pub fn begin_draining(&self) {
        if !self.draining.swap(true, Ordering::SeqCst) {
            tracing::info!("Draining: new requests will be rejected");
        }
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide "shutting down" indicator as seen by request handlers.
#[derive(Debug, Clone)]
pub struct ShutdownFlag {
    draining: Arc<AtomicBool>,
}

impl ShutdownFlag {
    pub fn is_set(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }
}
