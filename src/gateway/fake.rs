//! In-memory media gateway for tests
//!
//! Answers every offer by swapping `O` for `A` (`"O1"` -> `"A1"`) and keeps a
//! record of every pipeline and endpoint it hands out.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{CandidateStream, MediaClient, MediaEndpoint, MediaGateway, MediaPipeline};
use crate::error::{AppError, Result};
use crate::signaling::IceCandidate;

#[derive(Default)]
pub struct FakeGateway {
    state: Arc<FakeState>,
}

#[derive(Default)]
pub struct FakeState {
    next_id: AtomicUsize,
    pub pipelines: Mutex<Vec<Arc<FakePipeline>>>,
    pub endpoints: Mutex<Vec<Arc<FakeEndpoint>>>,
    pub unavailable: AtomicBool,
    pub fail_offer: AtomicBool,
    pub hang_offer: AtomicBool,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &Arc<FakeState> {
        &self.state
    }

    pub fn pipelines(&self) -> Vec<Arc<FakePipeline>> {
        self.state.pipelines.lock().clone()
    }

    pub fn endpoints(&self) -> Vec<Arc<FakeEndpoint>> {
        self.state.endpoints.lock().clone()
    }
}

impl FakeState {
    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

struct FakeClient {
    state: Arc<FakeState>,
}

#[async_trait]
impl MediaGateway for FakeGateway {
    async fn connect(&self) -> Result<Arc<dyn MediaClient>> {
        if self.state.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::GatewayUnavailable("fake gateway offline".to_string()));
        }
        Ok(Arc::new(FakeClient {
            state: self.state.clone(),
        }))
    }
}

#[async_trait]
impl MediaClient for FakeClient {
    async fn create_pipeline(&self) -> Result<Arc<dyn MediaPipeline>> {
        let pipeline = Arc::new(FakePipeline {
            id: self.state.next_id("pipeline"),
            state: self.state.clone(),
            released: AtomicBool::new(false),
        });
        self.state.pipelines.lock().push(pipeline.clone());
        Ok(pipeline)
    }
}

pub struct FakePipeline {
    id: String,
    state: Arc<FakeState>,
    released: AtomicBool,
}

impl FakePipeline {
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaPipeline for FakePipeline {
    fn id(&self) -> &str {
        &self.id
    }

    async fn create_endpoint(&self) -> Result<Arc<dyn MediaEndpoint>> {
        let endpoint = Arc::new(FakeEndpoint {
            id: self.state.next_id("endpoint"),
            pipeline_id: self.id.clone(),
            state: self.state.clone(),
            candidates: Mutex::new(Vec::new()),
            sinks: Mutex::new(Vec::new()),
            discovered: Mutex::new(None),
            gathering: AtomicBool::new(false),
            released: AtomicBool::new(false),
        });
        self.state.endpoints.lock().push(endpoint.clone());
        Ok(endpoint)
    }

    async fn release(&self) -> Result<()> {
        self.released.store(true, Ordering::SeqCst);
        for endpoint in self.state.endpoints.lock().iter() {
            if endpoint.pipeline_id == self.id {
                endpoint.released.store(true, Ordering::SeqCst);
                endpoint.discovered.lock().take();
            }
        }
        Ok(())
    }
}

pub struct FakeEndpoint {
    id: String,
    pub pipeline_id: String,
    state: Arc<FakeState>,
    /// Candidates applied through `add_ice_candidate`, in order
    pub candidates: Mutex<Vec<IceCandidate>>,
    /// Ids of endpoints this one was connected to
    pub sinks: Mutex<Vec<String>>,
    discovered: Mutex<Option<mpsc::UnboundedSender<IceCandidate>>>,
    pub gathering: AtomicBool,
    pub released: AtomicBool,
}

impl FakeEndpoint {
    pub fn applied(&self) -> Vec<IceCandidate> {
        self.candidates.lock().clone()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Simulate the media server discovering a local candidate
    pub fn discover(&self, candidate: IceCandidate) -> bool {
        match self.discovered.lock().as_ref() {
            Some(tx) => tx.send(candidate).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl MediaEndpoint for FakeEndpoint {
    fn id(&self) -> &str {
        &self.id
    }

    async fn process_offer(&self, offer: &str) -> Result<String> {
        if self.state.hang_offer.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.state.fail_offer.load(Ordering::SeqCst) {
            return Err(AppError::MediaNegotiationFailed("offer rejected".to_string()));
        }
        Ok(offer.replace('O', "A"))
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        self.candidates.lock().push(candidate.clone());
        Ok(())
    }

    async fn on_candidate_discovered(&self) -> Result<CandidateStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.discovered.lock() = Some(tx);
        Ok(rx)
    }

    async fn connect_to(&self, sink: &dyn MediaEndpoint) -> Result<()> {
        self.sinks.lock().push(sink.id().to_string());
        Ok(())
    }

    async fn gather_candidates(&self) -> Result<()> {
        self.gathering.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        self.released.store(true, Ordering::SeqCst);
        self.discovered.lock().take();
        Ok(())
    }
}
