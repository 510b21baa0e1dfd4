//! Kurento Media Server gateway
//!
//! Speaks the Kurento JSON-RPC 2.0 protocol over a WebSocket control channel:
//!
//! ```text
//! -> {"jsonrpc":"2.0","id":1,"method":"create","params":{"type":"MediaPipeline",...}}
//! <- {"jsonrpc":"2.0","id":1,"result":{"value":"<pipeline id>","sessionId":"..."}}
//! <- {"jsonrpc":"2.0","method":"onEvent","params":{"value":{"type":"IceCandidateFound",...}}}
//! ```
//!
//! One background task reads the socket and resolves pending requests or
//! routes `onEvent` notifications to the endpoint that subscribed; a second
//! task owns the write half.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use super::{CandidateStream, MediaClient, MediaEndpoint, MediaGateway, MediaPipeline};
use crate::config::MediaServerConfig;
use crate::error::{AppError, Result};
use crate::signaling::IceCandidate;

const ICE_CANDIDATE_FOUND: &str = "IceCandidateFound";

type PendingMap = HashMap<u64, oneshot::Sender<Result<Value>>>;

/// Gateway that lazily connects to Kurento and reconnects after a drop
pub struct KurentoGateway {
    config: MediaServerConfig,
    client: tokio::sync::Mutex<Option<Arc<KurentoClient>>>,
}

impl KurentoGateway {
    pub fn new(config: MediaServerConfig) -> Self {
        Self {
            config,
            client: tokio::sync::Mutex::new(None),
        }
    }

    /// Connect with bounded retries and exponential backoff
    async fn connect_with_retry(&self) -> Result<Arc<KurentoClient>> {
        let mut delay = self.config.retry_backoff();
        let mut attempt = 0;

        loop {
            match KurentoClient::connect(&self.config.url, self.ping_interval()).await {
                Ok(client) => return Ok(Arc::new(client)),
                Err(e) if attempt < self.config.connect_retries => {
                    attempt += 1;
                    warn!(
                        "Media server connection failed ({}), retry {}/{} in {:?}",
                        e, attempt, self.config.connect_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn ping_interval(&self) -> Option<Duration> {
        match self.config.ping_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[async_trait]
impl MediaGateway for KurentoGateway {
    async fn connect(&self) -> Result<Arc<dyn MediaClient>> {
        let mut slot = self.client.lock().await;

        if let Some(client) = slot.as_ref() {
            if client.is_connected() {
                return Ok(client.clone());
            }
            info!("Media server connection lost, reconnecting");
        }

        let client = self.connect_with_retry().await?;
        *slot = Some(client.clone());
        Ok(client)
    }
}

struct ClientInner {
    outbound: mpsc::UnboundedSender<Message>,
    pending: Mutex<PendingMap>,
    /// Object id -> candidate channel of the endpoint that subscribed
    listeners: Mutex<HashMap<String, mpsc::UnboundedSender<IceCandidate>>>,
    session_id: Mutex<Option<String>>,
    next_id: AtomicU64,
    connected: AtomicBool,
}

impl ClientInner {
    /// Fail everything in flight and close all candidate streams
    fn shutdown(&self, reason: &str) {
        self.connected.store(false, Ordering::SeqCst);
        let pending: Vec<_> = self.pending.lock().drain().collect();
        for (_, tx) in pending {
            let _ = tx.send(Err(AppError::GatewayUnavailable(reason.to_string())));
        }
        self.listeners.lock().clear();
    }

    fn handle_frame(&self, text: &str) {
        let frame: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                warn!("Invalid frame from media server: {}", e);
                return;
            }
        };

        if let Some(id) = frame.get("id").and_then(Value::as_u64) {
            if frame.get("result").is_some() || frame.get("error").is_some() {
                self.resolve(id, frame);
                return;
            }
        }

        match frame.get("method").and_then(Value::as_str) {
            Some("onEvent") => self.dispatch_event(&frame["params"]["value"]),
            Some(other) => debug!("Ignoring media server request: {}", other),
            None => trace!("Ignoring unmatched media server frame"),
        }
    }

    fn resolve(&self, id: u64, mut frame: Value) {
        let Some(tx) = self.pending.lock().remove(&id) else {
            trace!("Response for unknown request {}", id);
            return;
        };

        let outcome = if let Some(error) = frame.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown media server error");
            Err(AppError::MediaNegotiationFailed(message.to_string()))
        } else {
            let result = frame["result"].take();
            if let Some(session) = result.get("sessionId").and_then(Value::as_str) {
                let mut session_id = self.session_id.lock();
                if session_id.as_deref() != Some(session) {
                    debug!("Media server session: {}", session);
                    *session_id = Some(session.to_string());
                }
            }
            Ok(result)
        };

        let _ = tx.send(outcome);
    }

    fn dispatch_event(&self, event: &Value) {
        if event.get("type").and_then(Value::as_str) != Some(ICE_CANDIDATE_FOUND) {
            trace!("Ignoring media server event: {}", event["type"]);
            return;
        }

        let object = event
            .get("object")
            .or_else(|| event["data"].get("source"))
            .and_then(Value::as_str);
        let Some(object) = object else {
            warn!("IceCandidateFound event without source object");
            return;
        };

        let candidate: IceCandidate = match serde_json::from_value(event["data"]["candidate"].clone()) {
            Ok(c) => c,
            Err(e) => {
                warn!("Malformed candidate from media server: {}", e);
                return;
            }
        };

        let mut listeners = self.listeners.lock();
        if let Some(tx) = listeners.get(object) {
            if tx.send(candidate).is_err() {
                listeners.remove(object);
            }
        }
    }
}

/// Connected Kurento control channel
#[derive(Clone)]
pub struct KurentoClient {
    inner: Arc<ClientInner>,
}

/// Removes the pending slot if the caller stops waiting (e.g. on timeout)
struct PendingGuard<'a> {
    pending: &'a Mutex<PendingMap>,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

impl KurentoClient {
    /// Open the control WebSocket and start the reader/writer tasks
    pub async fn connect(url: &str, ping_interval: Option<Duration>) -> Result<Self> {
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("{}: {}", url, e)))?;
        info!("Connected to media server at {}", url);

        let (mut sink, mut stream) = ws.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        let inner = Arc::new(ClientInner {
            outbound,
            pending: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
            session_id: Mutex::new(None),
            next_id: AtomicU64::new(1),
            connected: AtomicBool::new(true),
        });

        // Writer
        let writer_inner = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    warn!("Media server write failed: {}", e);
                    if let Some(inner) = writer_inner.upgrade() {
                        inner.shutdown("media server write failed");
                    }
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Reader
        let reader_inner = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let Some(inner) = reader_inner.upgrade() else {
                    return;
                };
                match msg {
                    Ok(Message::Text(text)) => inner.handle_frame(&text),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Media server read failed: {}", e);
                        break;
                    }
                }
            }
            if let Some(inner) = reader_inner.upgrade() {
                warn!("Media server connection closed");
                inner.shutdown("media server connection closed");
            }
        });

        if let Some(interval) = ping_interval {
            spawn_keepalive(Arc::downgrade(&inner), interval);
        }

        Ok(Self { inner })
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Send a request and wait for its result object
    async fn request(&self, method: &str, mut params: Value) -> Result<Value> {
        if !self.is_connected() {
            return Err(AppError::GatewayUnavailable(
                "media server connection closed".to_string(),
            ));
        }

        if let Some(session) = self.inner.session_id.lock().clone() {
            params["sessionId"] = Value::String(session);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.inner.pending,
            id,
        };
        if !self.is_connected() {
            return Err(AppError::GatewayUnavailable(
                "media server connection closed".to_string(),
            ));
        }

        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!("-> {}", frame);

        self.inner
            .outbound
            .send(Message::Text(frame.to_string()))
            .map_err(|_| AppError::GatewayUnavailable("media server writer stopped".to_string()))?;

        rx.await.map_err(|_| {
            AppError::GatewayUnavailable("media server connection closed".to_string())
        })?
    }

    async fn create(&self, kind: &str, constructor_params: Value) -> Result<String> {
        let result = self
            .request(
                "create",
                json!({
                    "type": kind,
                    "constructorParams": constructor_params,
                    "properties": {},
                }),
            )
            .await?;
        object_value(&result, "create")
    }

    async fn invoke(&self, object: &str, operation: &str, params: Value) -> Result<Value> {
        let result = self
            .request(
                "invoke",
                json!({
                    "object": object,
                    "operation": operation,
                    "operationParams": params,
                }),
            )
            .await?;
        Ok(result.get("value").cloned().unwrap_or(Value::Null))
    }

    async fn release_object(&self, object: &str) -> Result<()> {
        self.inner.listeners.lock().remove(object);
        self.request("release", json!({ "object": object })).await?;
        Ok(())
    }
}

fn spawn_keepalive(inner: Weak<ClientInner>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            let client = KurentoClient { inner };
            if !client.is_connected() {
                break;
            }
            let interval_ms = interval.as_millis() as u64;
            if let Err(e) = client
                .request("ping", json!({ "interval": interval_ms }))
                .await
            {
                warn!("Media server ping failed: {}", e);
            }
        }
    });
}

fn object_value(result: &Value, method: &str) -> Result<String> {
    result
        .get("value")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::MediaNegotiationFailed(format!("{} returned no object id", method))
        })
}

#[async_trait]
impl MediaClient for KurentoClient {
    async fn create_pipeline(&self) -> Result<Arc<dyn MediaPipeline>> {
        let id = self.create("MediaPipeline", json!({})).await?;
        debug!("Created media pipeline {}", id);
        Ok(Arc::new(KurentoPipeline {
            id,
            client: self.clone(),
            endpoints: Arc::new(Mutex::new(Vec::new())),
        }))
    }
}

pub struct KurentoPipeline {
    id: String,
    client: KurentoClient,
    /// Ids of live endpoints created in this pipeline
    endpoints: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl MediaPipeline for KurentoPipeline {
    fn id(&self) -> &str {
        &self.id
    }

    async fn create_endpoint(&self) -> Result<Arc<dyn MediaEndpoint>> {
        let id = self
            .client
            .create("WebRtcEndpoint", json!({ "mediaPipeline": self.id }))
            .await?;
        debug!("Created WebRTC endpoint {} in {}", id, self.id);
        self.endpoints.lock().push(id.clone());
        Ok(Arc::new(KurentoEndpoint {
            id,
            client: self.client.clone(),
            siblings: self.endpoints.clone(),
        }))
    }

    async fn release(&self) -> Result<()> {
        debug!("Releasing media pipeline {}", self.id);
        // Releasing the pipeline drops its endpoints on the server side
        let endpoints = std::mem::take(&mut *self.endpoints.lock());
        {
            let mut listeners = self.client.inner.listeners.lock();
            for id in &endpoints {
                listeners.remove(id);
            }
        }
        self.client.release_object(&self.id).await
    }
}

pub struct KurentoEndpoint {
    id: String,
    client: KurentoClient,
    siblings: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl MediaEndpoint for KurentoEndpoint {
    fn id(&self) -> &str {
        &self.id
    }

    async fn process_offer(&self, offer: &str) -> Result<String> {
        let answer = self
            .client
            .invoke(&self.id, "processOffer", json!({ "offer": offer }))
            .await?;
        answer.as_str().map(str::to_string).ok_or_else(|| {
            AppError::MediaNegotiationFailed("processOffer returned no SDP answer".to_string())
        })
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        let mut complex = json!({
            "__module__": "kurento",
            "__type__": "IceCandidate",
            "candidate": candidate.candidate,
        });
        if let Some(ref mid) = candidate.sdp_mid {
            complex["sdpMid"] = json!(mid);
        }
        if let Some(index) = candidate.sdp_mline_index {
            complex["sdpMLineIndex"] = json!(index);
        }

        self.client
            .invoke(&self.id, "addIceCandidate", json!({ "candidate": complex }))
            .await?;
        Ok(())
    }

    async fn on_candidate_discovered(&self) -> Result<CandidateStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        // Register before subscribing so no early event is lost
        self.client
            .inner
            .listeners
            .lock()
            .insert(self.id.clone(), tx);

        let subscribed = self
            .client
            .request(
                "subscribe",
                json!({ "type": ICE_CANDIDATE_FOUND, "object": self.id }),
            )
            .await;
        if let Err(e) = subscribed {
            self.client.inner.listeners.lock().remove(&self.id);
            return Err(e);
        }
        Ok(rx)
    }

    async fn connect_to(&self, sink: &dyn MediaEndpoint) -> Result<()> {
        self.client
            .invoke(&self.id, "connect", json!({ "sink": sink.id() }))
            .await?;
        Ok(())
    }

    async fn gather_candidates(&self) -> Result<()> {
        self.client
            .invoke(&self.id, "gatherCandidates", json!({}))
            .await?;
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        self.siblings.lock().retain(|id| id != &self.id);
        self.client.release_object(&self.id).await
    }
}
