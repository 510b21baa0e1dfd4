//! Signaling relay
//!
//! Coordinates the session registry, the candidate buffer and the media
//! gateway. Each room moves through:
//!
//! ```text
//! Empty --streamer--> Streaming --viewer--> Streaming+Viewers
//!   ^                     |                        |
//!   +--------stop---------+------------------------+
//! ```
//!
//! Every handler for a room runs under that room's lock, so concurrent
//! connections racing on one room id are applied one at a time in arrival
//! order. Media server calls are bounded by the negotiation timeout.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::buffer::CandidateBuffer;
use super::messages::{ClientMessage, IceCandidate, ServerMessage};
use super::peer::Peer;
use super::registry::{Role, Room, RoomInfo, SessionRegistry, Viewer};
use crate::error::{AppError, Result};
use crate::events::{EventBus, RoomEvent};
use crate::gateway::{CandidateStream, MediaEndpoint, MediaGateway, MediaPipeline};

/// Per-room async locks
///
/// Entries are dropped again once nobody holds or waits for them.
#[derive(Default)]
struct RoomLocks {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

struct RoomGuard {
    room: String,
    lock: Arc<tokio::sync::Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl RoomLocks {
    async fn lock(&self, room: &str) -> RoomGuard {
        let lock = self
            .locks
            .lock()
            .entry(room.to_string())
            .or_default()
            .clone();
        let guard = lock.clone().lock_owned().await;
        RoomGuard {
            room: room.to_string(),
            lock,
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

impl Drop for RoomGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock();
        // Map entry plus our own handle: nobody else is waiting
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.room);
        }
    }
}

/// Signaling coordinator
pub struct SignalingRelay {
    gateway: Arc<dyn MediaGateway>,
    registry: SessionRegistry,
    candidates: CandidateBuffer,
    locks: RoomLocks,
    events: Arc<EventBus>,
    timeout: Duration,
}

impl SignalingRelay {
    pub fn new(gateway: Arc<dyn MediaGateway>, events: Arc<EventBus>, timeout: Duration) -> Self {
        Self {
            gateway,
            registry: SessionRegistry::new(),
            candidates: CandidateBuffer::new(),
            locks: RoomLocks::default(),
            events,
            timeout,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn candidates(&self) -> &CandidateBuffer {
        &self.candidates
    }

    pub fn rooms(&self) -> Vec<RoomInfo> {
        self.registry.list()
    }

    /// Dispatch one inbound message from `peer`
    ///
    /// Responses and forwarded candidates are delivered through the peer's
    /// outbound queue; the caller reports a returned error to the peer.
    pub async fn handle(&self, peer: &Peer, message: ClientMessage) -> Result<()> {
        match message {
            ClientMessage::Streamer { room, sdp_offer } => {
                self.streamer(&room, peer, &sdp_offer).await
            }
            ClientMessage::Viewer { room, sdp_offer } => self.viewer(&room, peer, &sdp_offer).await,
            ClientMessage::Stop { room } => {
                self.stop(&room).await;
                Ok(())
            }
            ClientMessage::OnIceCandidate { room, candidate } => {
                self.on_ice_candidate(&room, peer.id(), candidate).await
            }
        }
    }

    /// Open the room's stream, replacing any previous streaming session
    pub async fn streamer(&self, room: &str, peer: &Peer, offer: &str) -> Result<()> {
        let _guard = self.locks.lock(room).await;

        // Candidates the streamer trickled before its endpoint existed;
        // anything else still queued belongs to a stale session.
        let pending = self.candidates.drain_from(room, peer.id());
        self.candidates.clear(room);

        let client = self.call("connect", self.gateway.connect()).await?;
        let pipeline = self.call("create pipeline", client.create_pipeline()).await?;

        let negotiated = self.negotiate_streamer(&pipeline, offer, pending).await;
        let (endpoint, answer, candidates) = match negotiated {
            Ok(parts) => parts,
            Err(e) => {
                release_pipeline(pipeline.as_ref()).await;
                return Err(self.negotiation_failed(room, peer.id(), e));
            }
        };

        if !self.registry.create_room(room) {
            if let Some(previous) = self.registry.clear(room) {
                info!("Replacing streaming session in room {}", room);
                self.teardown(previous, "replaced").await;
            }
        }
        self.registry.set_pipeline(room, pipeline);

        peer.send(ServerMessage::StreamerResponse { sdp_answer: answer });
        let forwarder = spawn_forwarder(room, peer.clone(), candidates);
        self.registry
            .set_streamer(room, peer.id(), endpoint, Some(forwarder));

        info!("Room {} streaming from {}", room, peer.id());
        self.events.publish(RoomEvent::RoomOpened {
            room: room.to_string(),
            streamer: peer.id().to_string(),
            opened_at: chrono::Utc::now(),
        });
        Ok(())
    }

    async fn negotiate_streamer(
        &self,
        pipeline: &Arc<dyn MediaPipeline>,
        offer: &str,
        pending: Vec<IceCandidate>,
    ) -> Result<(Arc<dyn MediaEndpoint>, String, CandidateStream)> {
        let endpoint = self.call("create endpoint", pipeline.create_endpoint()).await?;
        self.apply_candidates(endpoint.as_ref(), pending).await?;

        let candidates = self
            .call("subscribe", endpoint.on_candidate_discovered())
            .await?;
        let answer = self.call("process offer", endpoint.process_offer(offer)).await?;
        self.call("gather candidates", endpoint.gather_candidates())
            .await?;

        Ok((endpoint, answer, candidates))
    }

    /// Join the room as a viewer downstream of the streamer's endpoint
    pub async fn viewer(&self, room: &str, peer: &Peer, offer: &str) -> Result<()> {
        let _guard = self.locks.lock(room).await;

        let (Some(pipeline), Some(source)) = (
            self.registry.pipeline(room),
            self.registry.streamer_endpoint(room),
        ) else {
            return Err(AppError::RoomNotFound(room.to_string()));
        };

        let pending = self.candidates.drain_from(room, peer.id());
        let endpoint = self.call("create endpoint", pipeline.create_endpoint()).await?;

        let negotiated = self
            .negotiate_viewer(source.as_ref(), endpoint.as_ref(), offer, pending)
            .await;
        let (answer, candidates) = match negotiated {
            Ok(parts) => parts,
            Err(e) => {
                if let Err(release_err) = endpoint.release().await {
                    warn!("Failed to release viewer endpoint: {}", release_err);
                }
                return Err(self.negotiation_failed(room, peer.id(), e));
            }
        };

        // A connection re-negotiating replaces its previous viewer entry
        if let Some(previous) = self.registry.remove_viewer(room, peer.id()) {
            release_viewer(&previous).await;
        }

        peer.send(ServerMessage::ViewerResponse { sdp_answer: answer });
        let forwarder = spawn_forwarder(room, peer.clone(), candidates);
        let viewer = Viewer::new(peer.clone(), endpoint).with_forwarder(forwarder);

        match self.registry.add_viewer(room, viewer) {
            Ok(count) => {
                info!("Viewer {} joined room {} ({} watching)", peer.id(), room, count);
                self.events.publish(RoomEvent::ViewerJoined {
                    room: room.to_string(),
                    viewer: peer.id().to_string(),
                    viewers: count,
                });
                Ok(())
            }
            Err(viewer) => {
                // Unreachable while the room lock is held
                release_viewer(&viewer).await;
                Err(AppError::RoomNotFound(room.to_string()))
            }
        }
    }

    async fn negotiate_viewer(
        &self,
        source: &dyn MediaEndpoint,
        endpoint: &dyn MediaEndpoint,
        offer: &str,
        pending: Vec<IceCandidate>,
    ) -> Result<(String, CandidateStream)> {
        self.apply_candidates(endpoint, pending).await?;

        let candidates = self
            .call("subscribe", endpoint.on_candidate_discovered())
            .await?;
        let answer = self.call("process offer", endpoint.process_offer(offer)).await?;
        self.call("connect endpoints", source.connect_to(endpoint))
            .await?;
        self.call("gather candidates", endpoint.gather_candidates())
            .await?;

        Ok((answer, candidates))
    }

    /// Route a client candidate to its endpoint, or buffer it until one exists
    pub async fn on_ice_candidate(
        &self,
        room: &str,
        conn_id: &str,
        candidate: IceCandidate,
    ) -> Result<()> {
        let _guard = self.locks.lock(room).await;

        match self.registry.endpoint_for(room, conn_id) {
            Some(endpoint) => {
                self.call("add candidate", endpoint.add_ice_candidate(&candidate))
                    .await
            }
            None => {
                debug!("Buffering candidate from {} for room {}", conn_id, room);
                self.candidates.enqueue(room, conn_id, candidate);
                Ok(())
            }
        }
    }

    /// Tear the room down; a no-op for rooms that do not exist
    pub async fn stop(&self, room: &str) {
        let _guard = self.locks.lock(room).await;
        self.stop_locked(room, "stopped").await;
    }

    async fn stop_locked(&self, room: &str, reason: &str) {
        self.candidates.clear(room);
        match self.registry.remove_room(room) {
            Some(state) => self.teardown(state, reason).await,
            None => debug!("Stop for unknown room {}", room),
        }
    }

    /// Clean up everything a closed connection left behind
    pub async fn disconnect(&self, conn_id: &str) {
        for (room, role) in self.registry.roles_of(conn_id) {
            let _guard = self.locks.lock(&room).await;
            match role {
                Role::Streamer => {
                    // Re-check under the lock, the room may have been replaced
                    if self.registry.get_room(&room).and_then(|r| r.streamer).as_deref()
                        == Some(conn_id)
                    {
                        info!("Streamer {} disconnected, stopping room {}", conn_id, room);
                        self.stop_locked(&room, "streamer_disconnected").await;
                    }
                }
                Role::Viewer => {
                    if let Some(viewer) = self.registry.remove_viewer(&room, conn_id) {
                        release_viewer(&viewer).await;
                        let remaining = self.registry.viewer_count(&room);
                        info!("Viewer {} left room {} ({} watching)", conn_id, room, remaining);
                        self.events.publish(RoomEvent::ViewerLeft {
                            room: room.clone(),
                            viewer: conn_id.to_string(),
                            viewers: remaining,
                        });
                    }
                }
            }
        }
        self.candidates.discard_from(conn_id);
    }

    /// Stop every room (process shutdown)
    pub async fn shutdown(&self) {
        for room in self.registry.room_ids() {
            let _guard = self.locks.lock(&room).await;
            self.stop_locked(&room, "shutdown").await;
        }
    }

    async fn teardown(&self, room: Room, reason: &str) {
        room.abort_forwarders();

        for viewer in room.viewers() {
            viewer.peer.send(ServerMessage::StopCommunication);
        }

        if let Some(pipeline) = room.pipeline() {
            release_pipeline(pipeline.as_ref()).await;
        }

        info!(
            "Room {} closed ({}), {} viewer(s) notified",
            room.id(),
            reason,
            room.viewers().len()
        );
        self.events.publish(RoomEvent::RoomClosed {
            room: room.id().to_string(),
            reason: reason.to_string(),
        });
    }

    async fn apply_candidates(
        &self,
        endpoint: &dyn MediaEndpoint,
        candidates: Vec<IceCandidate>,
    ) -> Result<()> {
        if !candidates.is_empty() {
            debug!(
                "Applying {} buffered candidate(s) to {}",
                candidates.len(),
                endpoint.id()
            );
        }
        for candidate in candidates {
            self.call("add candidate", endpoint.add_ice_candidate(&candidate))
                .await?;
        }
        Ok(())
    }

    /// Run a media server call under the negotiation timeout
    async fn call<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::MediaNegotiationFailed(format!(
                "{} timed out after {:?}",
                what, self.timeout
            ))),
        }
    }

    fn negotiation_failed(&self, room: &str, conn_id: &str, err: AppError) -> AppError {
        warn!("Negotiation for {} in room {} failed: {}", conn_id, room, err);
        self.events.publish(RoomEvent::NegotiationFailed {
            room: room.to_string(),
            connection: conn_id.to_string(),
            message: err.to_string(),
        });
        err
    }
}

/// Relay candidates discovered by the media server to the peer
fn spawn_forwarder(room: &str, peer: Peer, mut candidates: CandidateStream) -> AbortHandle {
    let room = room.to_string();
    tokio::spawn(async move {
        while let Some(candidate) = candidates.recv().await {
            let sent = peer.send(ServerMessage::IceCandidate {
                room: room.clone(),
                candidate,
            });
            if !sent && peer.is_closed() {
                break;
            }
        }
        debug!("Candidate forwarding for {} in room {} ended", peer.id(), room);
    })
    .abort_handle()
}

async fn release_pipeline(pipeline: &dyn MediaPipeline) {
    if let Err(e) = pipeline.release().await {
        warn!("Failed to release pipeline {}: {}", pipeline.id(), e);
    }
}

async fn release_viewer(viewer: &Viewer) {
    viewer.abort_forwarder();
    if let Err(e) = viewer.endpoint.release().await {
        warn!(
            "Failed to release endpoint of viewer {}: {}",
            viewer.conn_id, e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fake::FakeGateway;
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc;

    fn relay() -> (Arc<SignalingRelay>, Arc<FakeGateway>) {
        let gateway = Arc::new(FakeGateway::new());
        let relay = SignalingRelay::new(
            gateway.clone(),
            Arc::new(EventBus::new()),
            Duration::from_millis(200),
        );
        (Arc::new(relay), gateway)
    }

    fn peer(id: &str) -> (Peer, mpsc::Receiver<ServerMessage>) {
        Peer::channel(id, 16)
    }

    fn candidate(n: u32) -> IceCandidate {
        IceCandidate::new(format!("candidate:{}", n))
    }

    #[tokio::test]
    async fn test_streamer_viewer_stop_scenario() {
        let (relay, gateway) = relay();
        let (streamer, mut streamer_rx) = peer("s1");
        let (viewer, mut viewer_rx) = peer("v1");

        relay.streamer("r1", &streamer, "O1").await.unwrap();
        assert_eq!(
            streamer_rx.recv().await.unwrap(),
            ServerMessage::StreamerResponse {
                sdp_answer: "A1".to_string()
            }
        );

        relay.viewer("r1", &viewer, "O2").await.unwrap();
        assert_eq!(
            viewer_rx.recv().await.unwrap(),
            ServerMessage::ViewerResponse {
                sdp_answer: "A2".to_string()
            }
        );

        // Viewer endpoint sits downstream of the streamer endpoint
        let endpoints = gateway.endpoints();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(*endpoints[0].sinks.lock(), vec![endpoints[1].id().to_string()]);
        assert!(endpoints.iter().all(|e| e.gathering.load(Ordering::SeqCst)));

        relay.stop("r1").await;
        assert_eq!(viewer_rx.recv().await.unwrap(), ServerMessage::StopCommunication);
        assert!(gateway.pipelines()[0].is_released());
        assert!(relay.registry().get_room("r1").is_none());

        let (late, _late_rx) = peer("v2");
        let err = relay.viewer("r1", &late, "O3").await.unwrap_err();
        assert!(matches!(err, AppError::RoomNotFound(_)));
    }

    #[tokio::test]
    async fn test_viewer_without_streamer_creates_nothing() {
        let (relay, gateway) = relay();
        let (viewer, _rx) = peer("v1");

        let err = relay.viewer("r1", &viewer, "O1").await.unwrap_err();
        assert!(matches!(err, AppError::RoomNotFound(ref r) if r == "r1"));
        assert!(gateway.endpoints().is_empty());
        assert!(gateway.pipelines().is_empty());
    }

    #[tokio::test]
    async fn test_early_candidates_applied_in_order() {
        let (relay, gateway) = relay();
        let (streamer, _rx) = peer("s1");

        for n in 1..=3 {
            relay.on_ice_candidate("r1", "s1", candidate(n)).await.unwrap();
        }
        assert_eq!(relay.candidates().len("r1"), 3);

        relay.streamer("r1", &streamer, "O1").await.unwrap();

        let endpoint = &gateway.endpoints()[0];
        assert_eq!(endpoint.applied(), vec![candidate(1), candidate(2), candidate(3)]);
        assert!(relay.candidates().is_empty("r1"));

        // Later candidates go straight to the endpoint
        relay.on_ice_candidate("r1", "s1", candidate(4)).await.unwrap();
        assert_eq!(endpoint.applied().len(), 4);
        assert!(relay.candidates().is_empty("r1"));
    }

    #[tokio::test]
    async fn test_viewer_candidates_buffered_until_join() {
        let (relay, gateway) = relay();
        let (streamer, _srx) = peer("s1");
        let (viewer, _vrx) = peer("v1");

        relay.streamer("r1", &streamer, "O1").await.unwrap();
        relay.on_ice_candidate("r1", "v1", candidate(7)).await.unwrap();
        assert_eq!(relay.candidates().len("r1"), 1);
        assert!(gateway.endpoints()[0].applied().is_empty());

        relay.viewer("r1", &viewer, "O2").await.unwrap();
        assert_eq!(gateway.endpoints()[1].applied(), vec![candidate(7)]);
        assert!(relay.candidates().is_empty("r1"));

        // Once joined, candidates go straight to the viewer's own endpoint,
        // including the empty end-of-candidates marker
        let end_of_candidates = IceCandidate::new("").with_mid("0", 0);
        relay.on_ice_candidate("r1", "v1", candidate(8)).await.unwrap();
        relay
            .on_ice_candidate("r1", "v1", end_of_candidates.clone())
            .await
            .unwrap();
        assert_eq!(
            gateway.endpoints()[1].applied(),
            vec![candidate(7), candidate(8), end_of_candidates]
        );
        assert!(gateway.endpoints()[0].applied().is_empty());
        assert!(relay.candidates().is_empty("r1"));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (relay, _gateway) = relay();
        let (streamer, _rx) = peer("s1");

        relay.streamer("r1", &streamer, "O1").await.unwrap();
        relay.stop("r1").await;
        assert!(relay.registry().get_room("r1").is_none());
        relay.stop("r1").await;
        assert!(relay.registry().get_room("r1").is_none());

        relay.handle(&streamer, ClientMessage::Stop { room: "r1".to_string() })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_discovered_candidates_forwarded_after_answer() {
        let (relay, gateway) = relay();
        let (streamer, mut rx) = peer("s1");

        relay.streamer("r1", &streamer, "O1").await.unwrap();
        assert!(gateway.endpoints()[0].discover(candidate(42)));

        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerMessage::StreamerResponse { .. }
        ));
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerMessage::IceCandidate {
                room: "r1".to_string(),
                candidate: candidate(42)
            }
        );
    }

    #[tokio::test]
    async fn test_gateway_failure_leaves_room_untouched() {
        let (relay, gateway) = relay();
        let (streamer, _rx) = peer("s1");

        gateway.state().fail_offer.store(true, Ordering::SeqCst);
        let err = relay.streamer("r1", &streamer, "O1").await.unwrap_err();
        assert!(matches!(err, AppError::MediaNegotiationFailed(_)));
        assert!(relay.registry().get_room("r1").is_none());
        assert!(gateway.pipelines()[0].is_released());

        gateway.state().fail_offer.store(false, Ordering::SeqCst);
        gateway.state().unavailable.store(true, Ordering::SeqCst);
        let err = relay.streamer("r1", &streamer, "O1").await.unwrap_err();
        assert!(matches!(err, AppError::GatewayUnavailable(_)));
        assert!(relay.registry().is_empty());
    }

    #[tokio::test]
    async fn test_failed_viewer_keeps_existing_room() {
        let (relay, gateway) = relay();
        let (streamer, _srx) = peer("s1");
        let (viewer, _vrx) = peer("v1");

        relay.streamer("r1", &streamer, "O1").await.unwrap();
        gateway.state().fail_offer.store(true, Ordering::SeqCst);

        let err = relay.viewer("r1", &viewer, "O2").await.unwrap_err();
        assert!(matches!(err, AppError::MediaNegotiationFailed(_)));
        assert!(gateway.endpoints()[1].is_released());

        let info = relay.registry().get_room("r1").unwrap();
        assert_eq!(info.streamer.as_deref(), Some("s1"));
        assert!(info.viewers.is_empty());
    }

    #[tokio::test]
    async fn test_hung_negotiation_times_out() {
        let (relay, gateway) = relay();
        let (streamer, _rx) = peer("s1");

        gateway.state().hang_offer.store(true, Ordering::SeqCst);
        let err = relay.streamer("r1", &streamer, "O1").await.unwrap_err();
        assert!(matches!(err, AppError::MediaNegotiationFailed(ref m) if m.contains("timed out")));
        assert!(relay.registry().get_room("r1").is_none());
    }

    #[tokio::test]
    async fn test_second_streamer_replaces_session() {
        let (relay, gateway) = relay();
        let (first, _frx) = peer("s1");
        let (second, _srx) = peer("s2");
        let (viewer, mut vrx) = peer("v1");

        relay.streamer("r1", &first, "O1").await.unwrap();
        relay.viewer("r1", &viewer, "O2").await.unwrap();
        relay.streamer("r1", &second, "O3").await.unwrap();

        assert!(matches!(vrx.recv().await.unwrap(), ServerMessage::ViewerResponse { .. }));
        assert_eq!(vrx.recv().await.unwrap(), ServerMessage::StopCommunication);

        let pipelines = gateway.pipelines();
        assert!(pipelines[0].is_released());
        assert!(!pipelines[1].is_released());

        let info = relay.registry().get_room("r1").unwrap();
        assert_eq!(info.streamer.as_deref(), Some("s2"));
        assert!(info.viewers.is_empty());
        assert_eq!(info.pipeline.as_deref(), Some(pipelines[1].id()));
    }

    #[tokio::test]
    async fn test_viewer_disconnect_cleans_up() {
        let (relay, gateway) = relay();
        let (streamer, _srx) = peer("s1");
        let (viewer, _vrx) = peer("v1");

        relay.streamer("r1", &streamer, "O1").await.unwrap();
        relay.viewer("r1", &viewer, "O2").await.unwrap();
        assert_eq!(relay.registry().viewer_count("r1"), 1);

        relay.disconnect("v1").await;
        assert_eq!(relay.registry().viewer_count("r1"), 0);
        assert!(gateway.endpoints()[1].is_released());
        assert!(relay.registry().get_room("r1").is_some());
    }

    #[tokio::test]
    async fn test_streamer_disconnect_stops_room() {
        let (relay, _gateway) = relay();
        let (streamer, _srx) = peer("s1");
        let (viewer, mut vrx) = peer("v1");

        relay.streamer("r1", &streamer, "O1").await.unwrap();
        relay.viewer("r1", &viewer, "O2").await.unwrap();
        relay.on_ice_candidate("r2", "s1", candidate(1)).await.unwrap();

        relay.disconnect("s1").await;
        assert!(relay.registry().get_room("r1").is_none());
        assert!(relay.candidates().is_empty("r2"));

        assert!(matches!(vrx.recv().await.unwrap(), ServerMessage::ViewerResponse { .. }));
        assert_eq!(vrx.recv().await.unwrap(), ServerMessage::StopCommunication);
    }

    #[tokio::test]
    async fn test_concurrent_viewers_all_registered() {
        let (relay, _gateway) = relay();
        let (streamer, _srx) = peer("s1");
        relay.streamer("r1", &streamer, "O1").await.unwrap();

        let mut tasks = Vec::new();
        let mut receivers = Vec::new();
        for n in 0..8 {
            let (viewer, rx) = peer(&format!("v{}", n));
            receivers.push(rx);
            let relay = relay.clone();
            tasks.push(tokio::spawn(async move {
                relay.viewer("r1", &viewer, "O").await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(relay.registry().viewer_count("r1"), 8);
        assert_eq!(relay.locks.len(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_all_rooms() {
        let (relay, gateway) = relay();
        let (a, _arx) = peer("a");
        let (b, _brx) = peer("b");

        relay.streamer("r1", &a, "O1").await.unwrap();
        relay.streamer("r2", &b, "O2").await.unwrap();
        relay.shutdown().await;

        assert!(relay.registry().is_empty());
        assert!(gateway.pipelines().iter().all(|p| p.is_released()));
    }
}
