use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Web server settings
    pub web: WebConfig,
    /// Media server (Kurento) settings
    pub media: MediaServerConfig,
    /// Signaling channel settings
    pub signaling: SignalingConfig,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebConfig {
    /// HTTP port
    pub http_port: u16,
    /// Bind address
    pub bind_address: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            http_port: 5000,
            bind_address: "0.0.0.0".to_string(),
        }
    }
}

/// Media server connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MediaServerConfig {
    /// Kurento JSON-RPC WebSocket URL
    pub url: String,
    /// Upper bound for a single media server call (seconds)
    pub negotiation_timeout_secs: u64,
    /// Extra connection attempts after the first one fails
    pub connect_retries: u32,
    /// Delay before the first retry, doubled on every attempt (milliseconds)
    pub retry_backoff_ms: u64,
    /// Keep-alive ping interval on the control channel (seconds, 0 = off)
    pub ping_interval_secs: u64,
}

impl Default for MediaServerConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8888/kurento".to_string(),
            negotiation_timeout_secs: 15,
            connect_retries: 3,
            retry_backoff_ms: 500,
            ping_interval_secs: 60,
        }
    }
}

impl MediaServerConfig {
    pub fn negotiation_timeout(&self) -> Duration {
        Duration::from_secs(self.negotiation_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Signaling WebSocket configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SignalingConfig {
    /// Server-initiated ping interval (seconds)
    pub heartbeat_secs: u64,
    /// Outbound queue depth per connection before messages are dropped
    pub outbound_queue: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: 30,
            outbound_queue: 64,
        }
    }
}
