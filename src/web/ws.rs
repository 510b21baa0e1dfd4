//! Room event stream at `/api/ws`
//!
//! Monitoring clients subscribe to topics (`room.opened`, `room.*`, `*`) and
//! receive matching [`RoomEvent`]s as JSON. The first subscription is answered
//! with a `room.snapshot` of every active room.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::events::RoomEvent;
use crate::state::AppState;

/// Request sent by a monitoring client
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
enum MonitorRequest {
    Subscribe { topics: Vec<String> },
    Unsubscribe { topics: Vec<String> },
    Ping,
}

/// Topic filter of one monitoring connection
#[derive(Debug, Default)]
struct Subscription {
    topics: Vec<String>,
    snapshot_sent: bool,
}

impl Subscription {
    /// Apply a client request; returns true when a snapshot is now due
    fn apply(&mut self, request: MonitorRequest) -> bool {
        match request {
            MonitorRequest::Subscribe { topics } => {
                info!("Event client subscribed to {:?}", topics);
                self.topics = topics;
            }
            MonitorRequest::Unsubscribe { topics } => {
                self.topics.retain(|t| !topics.contains(t));
            }
            MonitorRequest::Ping => debug!("Event client ping"),
        }

        if !self.snapshot_sent && !self.topics.is_empty() {
            self.snapshot_sent = true;
            return true;
        }
        false
    }

    fn wants(&self, event: &RoomEvent) -> bool {
        self.topics.iter().any(|topic| event.matches_topic(topic))
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.events.subscribe();
    let mut shutdown = state.shutdown_signal();
    let mut subscription = Subscription::default();
    let mut heartbeat = tokio::time::interval(Duration::from_secs(
        state.config.signaling.heartbeat_secs.max(1),
    ));

    info!("Event client connected");

    loop {
        let outgoing = tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<MonitorRequest>(&text) {
                        Ok(request) => subscription.apply(request).then(|| RoomEvent::Snapshot {
                            rooms: state.relay.rooms(),
                        }),
                        Err(e) => {
                            warn!("Ignoring malformed event client request: {}", e);
                            None
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!("Event client receive error: {}", e);
                    break;
                }
                _ => None,
            },
            event = events.recv() => match event {
                Ok(event) if subscription.wants(&event) => Some(event),
                Ok(_) => None,
                Err(RecvError::Lagged(n)) => {
                    warn!("Event client lagged by {} events", n);
                    Some(RoomEvent::Error {
                        message: format!("Lagged by {} events", n),
                    })
                }
                Err(RecvError::Closed) => break,
            },
            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    break;
                }
                None
            }
            _ = shutdown.recv() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        };

        let Some(event) = outgoing else { continue };
        match serde_json::to_string(&event) {
            Ok(json) => {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!("Failed to serialize {}: {}", event.event_name(), e),
        }
    }

    info!("Event client disconnected");
}
