//! Room signaling core
//!
//! ```text
//! WebSocket connection
//!        |  ClientMessage
//!        v
//! SignalingRelay ---- per-room lock ----+
//!        |                              |
//!        +-- SessionRegistry            +-- MediaGateway (Kurento)
//!        +-- CandidateBuffer
//!        |
//!        v  ServerMessage
//! Peer outbound queue
//! ```

pub mod buffer;
pub mod messages;
pub mod peer;
pub mod registry;
pub mod relay;

/// Identifier of one signaling connection
pub type ConnectionId = String;

pub use buffer::{CandidateBuffer, PendingCandidate};
pub use messages::{ClientMessage, IceCandidate, ServerMessage};
pub use peer::Peer;
pub use registry::{Role, RoomInfo, SessionRegistry, Viewer};
pub use relay::SignalingRelay;
