//! Session registry
//!
//! In-memory map from room id to room state. The registry is the only owner
//! of [`Room`] and [`Viewer`] entries; media handles inside them belong to the
//! media server and are only referenced here.
//!
//! All operations are synchronous and never panic on a missing room: mutating
//! calls report whether they changed anything.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::AbortHandle;

use super::peer::Peer;
use super::ConnectionId;
use crate::gateway::{MediaEndpoint, MediaPipeline};

/// Streamer side of a room
pub struct Streamer {
    pub conn_id: ConnectionId,
    pub endpoint: Arc<dyn MediaEndpoint>,
    forwarder: Option<AbortHandle>,
}

/// Viewer entry
pub struct Viewer {
    pub conn_id: ConnectionId,
    pub endpoint: Arc<dyn MediaEndpoint>,
    pub peer: Peer,
    forwarder: Option<AbortHandle>,
}

impl Viewer {
    pub fn new(peer: Peer, endpoint: Arc<dyn MediaEndpoint>) -> Self {
        Self {
            conn_id: peer.id().to_string(),
            endpoint,
            peer,
            forwarder: None,
        }
    }

    /// Attach the task relaying this viewer's discovered candidates
    pub fn with_forwarder(mut self, forwarder: AbortHandle) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    pub fn abort_forwarder(&self) {
        if let Some(ref handle) = self.forwarder {
            handle.abort();
        }
    }
}

/// Room state
pub struct Room {
    id: String,
    created_at: DateTime<Utc>,
    pipeline: Option<Arc<dyn MediaPipeline>>,
    streamer: Option<Streamer>,
    viewers: Vec<Viewer>,
}

impl Room {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            created_at: Utc::now(),
            pipeline: None,
            streamer: None,
            viewers: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pipeline(&self) -> Option<&Arc<dyn MediaPipeline>> {
        self.pipeline.as_ref()
    }

    pub fn streamer_id(&self) -> Option<&str> {
        self.streamer.as_ref().map(|s| s.conn_id.as_str())
    }

    pub fn viewers(&self) -> &[Viewer] {
        &self.viewers
    }

    /// Stop every candidate forwarder owned by the room
    pub fn abort_forwarders(&self) {
        if let Some(handle) = self.streamer.as_ref().and_then(|s| s.forwarder.as_ref()) {
            handle.abort();
        }
        for viewer in &self.viewers {
            viewer.abort_forwarder();
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id.clone(),
            streamer: self.streamer_id().map(str::to_string),
            viewers: self.viewers.iter().map(|v| v.conn_id.clone()).collect(),
            pipeline: self.pipeline.as_ref().map(|p| p.id().to_string()),
            created_at: self.created_at,
        }
    }

    /// Move all fields out, leaving an empty room with the same id
    fn take(&mut self) -> Room {
        Room {
            id: self.id.clone(),
            created_at: self.created_at,
            pipeline: self.pipeline.take(),
            streamer: self.streamer.take(),
            viewers: std::mem::take(&mut self.viewers),
        }
    }
}

/// Point-in-time view of a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: String,
    pub streamer: Option<String>,
    pub viewers: Vec<String>,
    pub pipeline: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Part a connection plays in a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Streamer,
    Viewer,
}

#[derive(Default)]
pub struct SessionRegistry {
    rooms: Mutex<HashMap<String, Room>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty room; false if it already exists
    pub fn create_room(&self, id: &str) -> bool {
        let mut rooms = self.rooms.lock();
        if rooms.contains_key(id) {
            return false;
        }
        rooms.insert(id.to_string(), Room::new(id));
        true
    }

    pub fn get_room(&self, id: &str) -> Option<RoomInfo> {
        self.rooms.lock().get(id).map(Room::info)
    }

    pub fn remove_room(&self, id: &str) -> Option<Room> {
        self.rooms.lock().remove(id)
    }

    /// Empty the room in place and hand back its previous contents
    pub fn clear(&self, id: &str) -> Option<Room> {
        self.rooms.lock().get_mut(id).map(Room::take)
    }

    pub fn set_pipeline(&self, id: &str, pipeline: Arc<dyn MediaPipeline>) -> bool {
        match self.rooms.lock().get_mut(id) {
            Some(room) => {
                room.pipeline = Some(pipeline);
                true
            }
            None => false,
        }
    }

    /// Register the room's streamer, replacing any previous one
    pub fn set_streamer(
        &self,
        id: &str,
        conn_id: &str,
        endpoint: Arc<dyn MediaEndpoint>,
        forwarder: Option<AbortHandle>,
    ) -> bool {
        let mut rooms = self.rooms.lock();
        let Some(room) = rooms.get_mut(id) else {
            return false;
        };

        let previous = room.streamer.replace(Streamer {
            conn_id: conn_id.to_string(),
            endpoint,
            forwarder,
        });
        if let Some(handle) = previous.and_then(|s| s.forwarder) {
            handle.abort();
        }
        true
    }

    /// Append a viewer, returning the new viewer count
    ///
    /// The viewer is handed back when the room does not exist.
    pub fn add_viewer(&self, id: &str, viewer: Viewer) -> Result<usize, Viewer> {
        let mut rooms = self.rooms.lock();
        match rooms.get_mut(id) {
            Some(room) => {
                room.viewers.push(viewer);
                Ok(room.viewers.len())
            }
            None => Err(viewer),
        }
    }

    pub fn remove_viewer(&self, id: &str, conn_id: &str) -> Option<Viewer> {
        let mut rooms = self.rooms.lock();
        let room = rooms.get_mut(id)?;
        let index = room.viewers.iter().position(|v| v.conn_id == conn_id)?;
        Some(room.viewers.remove(index))
    }

    pub fn viewer_count(&self, id: &str) -> usize {
        self.rooms.lock().get(id).map_or(0, |r| r.viewers.len())
    }

    pub fn pipeline(&self, id: &str) -> Option<Arc<dyn MediaPipeline>> {
        self.rooms.lock().get(id)?.pipeline.clone()
    }

    pub fn streamer_endpoint(&self, id: &str) -> Option<Arc<dyn MediaEndpoint>> {
        Some(self.rooms.lock().get(id)?.streamer.as_ref()?.endpoint.clone())
    }

    /// Endpoint owned by `conn_id` in the room, streamer first
    pub fn endpoint_for(&self, id: &str, conn_id: &str) -> Option<Arc<dyn MediaEndpoint>> {
        let rooms = self.rooms.lock();
        let room = rooms.get(id)?;

        if let Some(streamer) = room.streamer.as_ref().filter(|s| s.conn_id == conn_id) {
            return Some(streamer.endpoint.clone());
        }
        room.viewers
            .iter()
            .find(|v| v.conn_id == conn_id)
            .map(|v| v.endpoint.clone())
    }

    /// Every room the connection takes part in
    pub fn roles_of(&self, conn_id: &str) -> Vec<(String, Role)> {
        let rooms = self.rooms.lock();
        let mut roles = Vec::new();
        for room in rooms.values() {
            if room.streamer_id() == Some(conn_id) {
                roles.push((room.id.clone(), Role::Streamer));
            } else if room.viewers.iter().any(|v| v.conn_id == conn_id) {
                roles.push((room.id.clone(), Role::Viewer));
            }
        }
        roles
    }

    pub fn room_ids(&self) -> Vec<String> {
        self.rooms.lock().keys().cloned().collect()
    }

    pub fn list(&self) -> Vec<RoomInfo> {
        let mut rooms: Vec<_> = self.rooms.lock().values().map(Room::info).collect();
        rooms.sort_by(|a, b| a.id.cmp(&b.id));
        rooms
    }

    pub fn len(&self) -> usize {
        self.rooms.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.lock().is_empty()
    }
}
