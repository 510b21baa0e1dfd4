//! Candidate buffer
//!
//! Holds ICE candidates that arrive before the media endpoint they belong to
//! exists. Queues are per room and strictly FIFO; every entry remembers the
//! connection that sent it so a joining peer only picks up its own
//! candidates.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

use super::messages::IceCandidate;
use super::ConnectionId;

/// Buffered candidate with its origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCandidate {
    pub conn_id: ConnectionId,
    pub candidate: IceCandidate,
}

#[derive(Default)]
pub struct CandidateBuffer {
    queues: Mutex<HashMap<String, VecDeque<PendingCandidate>>>,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a candidate to the room's queue, creating it on first use
    pub fn enqueue(&self, room: &str, conn_id: &str, candidate: IceCandidate) {
        self.queues
            .lock()
            .entry(room.to_string())
            .or_default()
            .push_back(PendingCandidate {
                conn_id: conn_id.to_string(),
                candidate,
            });
    }

    /// Remove and return everything queued for the room, in arrival order
    pub fn drain(&self, room: &str) -> Vec<PendingCandidate> {
        self.queues
            .lock()
            .remove(room)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Remove and return the candidates one connection queued for the room
    ///
    /// Entries from other connections stay queued in arrival order.
    pub fn drain_from(&self, room: &str, conn_id: &str) -> Vec<IceCandidate> {
        let mut queues = self.queues.lock();
        let Some(queue) = queues.get_mut(room) else {
            return Vec::new();
        };

        let mut taken = Vec::new();
        queue.retain(|pending| {
            if pending.conn_id == conn_id {
                taken.push(pending.candidate.clone());
                false
            } else {
                true
            }
        });

        if queue.is_empty() {
            queues.remove(room);
        }
        taken
    }

    /// Drop every candidate a connection left behind, in all rooms
    pub fn discard_from(&self, conn_id: &str) {
        let mut queues = self.queues.lock();
        queues.retain(|_, queue| {
            queue.retain(|pending| pending.conn_id != conn_id);
            !queue.is_empty()
        });
    }

    pub fn clear(&self, room: &str) {
        self.queues.lock().remove(room);
    }

    /// Number of candidates queued for the room
    pub fn len(&self, room: &str) -> usize {
        self.queues.lock().get(room).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, room: &str) -> bool {
        self.len(room) == 0
    }
}
