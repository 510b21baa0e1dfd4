use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::events::EventBus;
use crate::signaling::SignalingRelay;

/// Application-wide state shared across handlers
pub struct AppState {
    /// Effective configuration (file + CLI overrides)
    pub config: AppConfig,
    /// Room signaling coordinator
    pub relay: Arc<SignalingRelay>,
    /// Event bus for room lifecycle notifications
    pub events: Arc<EventBus>,
    /// Shutdown signal sender
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        relay: Arc<SignalingRelay>,
        events: Arc<EventBus>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            relay,
            events,
            shutdown_tx,
        })
    }

    /// Subscribe to shutdown signal
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }
}
