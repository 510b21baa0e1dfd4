//! Signaling wire messages
//!
//! Every frame on the signaling WebSocket is a JSON object tagged by `id`:
//!
//! ```json
//! { "id": "streamer", "room": "r1", "sdpOffer": "v=0..." }
//! { "id": "streamerResponse", "sdpAnswer": "v=0..." }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// ICE candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate string
    pub candidate: String,
    /// SDP mid (media ID)
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    /// SDP mline index
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
        }
    }

    pub fn with_mid(mut self, mid: impl Into<String>, index: u16) -> Self {
        self.sdp_mid = Some(mid.into());
        self.sdp_mline_index = Some(index);
        self
    }
}

/// Client-to-server message
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "id", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Open (or replace) the stream of a room
    #[serde(rename_all = "camelCase")]
    Streamer { room: String, sdp_offer: String },

    /// Join a room as a viewer
    #[serde(rename_all = "camelCase")]
    Viewer { room: String, sdp_offer: String },

    /// Tear the room down
    Stop { room: String },

    /// Trickle ICE candidate from the client
    OnIceCandidate { room: String, candidate: IceCandidate },
}

impl ClientMessage {
    /// Parse and validate a text frame
    pub fn parse(text: &str) -> Result<Self> {
        let message: ClientMessage = serde_json::from_str(text)
            .map_err(|e| AppError::InvalidMessage(e.to_string()))?;
        message.validate()?;
        Ok(message)
    }

    /// Room the message addresses
    pub fn room(&self) -> &str {
        match self {
            ClientMessage::Streamer { room, .. }
            | ClientMessage::Viewer { room, .. }
            | ClientMessage::Stop { room }
            | ClientMessage::OnIceCandidate { room, .. } => room,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.room().trim().is_empty() {
            return Err(AppError::InvalidMessage("room must not be empty".to_string()));
        }
        match self {
            ClientMessage::Streamer { sdp_offer, .. } | ClientMessage::Viewer { sdp_offer, .. }
                if sdp_offer.trim().is_empty() =>
            {
                Err(AppError::InvalidMessage(
                    "sdpOffer must not be empty".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Server-to-client message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "id", rename_all = "camelCase")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    StreamerResponse { sdp_answer: String },

    #[serde(rename_all = "camelCase")]
    ViewerResponse { sdp_answer: String },

    /// Candidate discovered by the media server for this connection's endpoint
    IceCandidate { room: String, candidate: IceCandidate },

    /// The room this viewer watched was stopped
    StopCommunication,

    Error { message: String },
}

impl ServerMessage {
    pub fn error(err: &AppError) -> Self {
        ServerMessage::Error {
            message: err.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
