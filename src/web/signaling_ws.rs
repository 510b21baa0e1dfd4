//! Signaling WebSocket endpoint at `/api/signaling`
//!
//! Each connection gets a random id and an outbound queue ([`Peer`]). A
//! writer task drains the queue and sends heartbeat pings; inbound frames are
//! handled in order on the connection task. When the socket closes, the
//! relay removes whatever the connection left in its rooms.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::signaling::{ClientMessage, Peer, ServerMessage};
use crate::state::AppState;
use crate::utils::LogThrottler;

/// WebSocket upgrade handler
pub async fn signaling_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_signaling_socket(socket, state))
}

async fn handle_signaling_socket(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (peer, mut outbound) = Peer::channel(conn_id.clone(), state.config.signaling.outbound_queue);
    let (mut sender, mut receiver) = socket.split();
    let mut shutdown = state.shutdown_signal();
    // Log throttler for per-connection errors (5 second interval)
    let log_throttler = LogThrottler::default();

    info!("Signaling connection {} established", conn_id);

    let heartbeat = Duration::from_secs(state.config.signaling.heartbeat_secs.max(1));
    let writer = tokio::spawn(async move {
        let mut heartbeat_interval = tokio::time::interval(heartbeat);
        heartbeat_interval.tick().await;

        loop {
            tokio::select! {
                msg = outbound.recv() => {
                    let Some(msg) = msg else { break };
                    let json = match msg.to_json() {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("Failed to serialize signaling message: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat_interval.tick() => {
                    if sender.send(Message::Ping(vec![])).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sender.close().await;
    });

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(&state, &peer, &text, &log_throttler).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let err = AppError::InvalidMessage(format!(
                            "binary frames are not supported ({} bytes)",
                            data.len()
                        ));
                        peer.send(ServerMessage::error(&err));
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Signaling connection {} closed by client", conn_id);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("Signaling connection {} error: {}", conn_id, e);
                        break;
                    }
                    _ => {}
                }
            }
            _ = shutdown.recv() => {
                debug!("Closing signaling connection {} for shutdown", conn_id);
                break;
            }
        }
    }

    state.relay.disconnect(&conn_id).await;
    writer.abort();
    info!("Signaling connection {} ended", conn_id);
}

/// Parse and dispatch one text frame, reporting failures to the sender
async fn handle_text(state: &AppState, peer: &Peer, text: &str, log_throttler: &LogThrottler) {
    let result = match ClientMessage::parse(text) {
        Ok(message) => {
            debug!(
                "Signaling message from {} for room {}: {:?}",
                peer.id(),
                message.room(),
                message_kind(&message)
            );
            state.relay.handle(peer, message).await
        }
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        if log_throttler.should_log(error_kind(&e)) {
            warn!("Signaling request from {} failed: {}", peer.id(), e);
        }
        peer.send(ServerMessage::error(&e));
    }
}

fn message_kind(message: &ClientMessage) -> &'static str {
    match message {
        ClientMessage::Streamer { .. } => "streamer",
        ClientMessage::Viewer { .. } => "viewer",
        ClientMessage::Stop { .. } => "stop",
        ClientMessage::OnIceCandidate { .. } => "onIceCandidate",
    }
}

fn error_kind(err: &AppError) -> &'static str {
    match err {
        AppError::InvalidMessage(_) => "invalid_message",
        AppError::RoomNotFound(_) => "room_not_found",
        AppError::MediaNegotiationFailed(_) => "negotiation_failed",
        AppError::GatewayUnavailable(_) => "gateway_unavailable",
        _ => "internal",
    }
}
