//! Media server gateway
//!
//! The relay never touches media itself. Pipelines and WebRTC endpoints live
//! on an external media server and are driven through these traits:
//!
//! ```text
//! MediaGateway::connect()
//!        |
//!        v
//! MediaClient::create_pipeline()       one pipeline per room
//!        |
//!        v
//! MediaPipeline::create_endpoint()     streamer endpoint
//!        |                                   |
//!        |               connect_to()        v
//!        +-----------------------------> viewer endpoints
//! ```
//!
//! Candidates discovered by the server are delivered through a channel
//! returned by [`MediaEndpoint::on_candidate_discovered`].

pub mod kurento;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::signaling::IceCandidate;

pub use kurento::KurentoGateway;

/// Stream of candidates gathered by the media server for one endpoint
///
/// Closes when the endpoint is released or the control connection drops.
pub type CandidateStream = mpsc::UnboundedReceiver<IceCandidate>;

/// Entry point to a media server
#[async_trait]
pub trait MediaGateway: Send + Sync {
    /// Return a live client, establishing the control connection if needed
    async fn connect(&self) -> Result<Arc<dyn MediaClient>>;
}

/// Connected media server client
#[async_trait]
pub trait MediaClient: Send + Sync {
    async fn create_pipeline(&self) -> Result<Arc<dyn MediaPipeline>>;
}

/// Media processing graph for one room
#[async_trait]
pub trait MediaPipeline: Send + Sync {
    fn id(&self) -> &str;

    async fn create_endpoint(&self) -> Result<Arc<dyn MediaEndpoint>>;

    /// Release the pipeline and every endpoint inside it
    async fn release(&self) -> Result<()>;
}

/// Pipeline node terminating one WebRTC peer connection
#[async_trait]
pub trait MediaEndpoint: Send + Sync {
    fn id(&self) -> &str;

    /// Negotiate the remote offer, returning the SDP answer
    async fn process_offer(&self, offer: &str) -> Result<String>;

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()>;

    async fn on_candidate_discovered(&self) -> Result<CandidateStream>;

    /// Route this endpoint's media into `sink`
    async fn connect_to(&self, sink: &dyn MediaEndpoint) -> Result<()>;

    async fn gather_candidates(&self) -> Result<()>;

    async fn release(&self) -> Result<()>;
}
