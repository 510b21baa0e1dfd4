//! room-relay - WebRTC signaling relay for one-to-many rooms
//!
//! Streamers and viewers exchange SDP and ICE candidates with the relay over
//! a WebSocket; media flows through a Kurento media server that the relay
//! drives over JSON-RPC.

pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod signaling;
pub mod state;
pub mod utils;
pub mod web;

pub use error::{AppError, Result};
