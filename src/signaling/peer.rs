use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use super::messages::ServerMessage;
use super::ConnectionId;

/// Outbound handle to one signaling connection
///
/// Cloned into room entries and candidate forwarders; the WebSocket task owns
/// the receiving half and writes whatever arrives to the socket.
#[derive(Clone, Debug)]
pub struct Peer {
    conn_id: ConnectionId,
    tx: mpsc::Sender<ServerMessage>,
}

impl Peer {
    pub fn new(conn_id: impl Into<ConnectionId>, tx: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            conn_id: conn_id.into(),
            tx,
        }
    }

    /// Create a peer together with its receiving half
    pub fn channel(
        conn_id: impl Into<ConnectionId>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(conn_id, tx), rx)
    }

    pub fn id(&self) -> &str {
        &self.conn_id
    }

    /// Queue a message without waiting
    ///
    /// Returns false when the connection is gone or its queue is full.
    pub fn send(&self, msg: ServerMessage) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(msg)) => {
                warn!(
                    "Outbound queue full for connection {}, dropping {:?}",
                    self.conn_id, msg
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
