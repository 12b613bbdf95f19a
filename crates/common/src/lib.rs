// ================
// common/src/lib.rs
// ================
//! Common types and structures
//! used for communication between live-class browser clients and the
//! signaling server. This module defines the WebSocket protocol messages
//! and supporting types.

use serde::{Deserialize, Serialize};

/// Opaque identifier assigned to a WebSocket connection at connect time.
pub type ConnectionId = String;

/// Caller-supplied identifier naming a meeting room.
pub type MeetingId = String;

/// Messages sent from client to server
///
/// The `event` tag and camelCase payload fields match what the browser
/// clients put on the wire.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Join a meeting, creating it if it does not exist yet
    /// # Fields
    /// * `meeting_id` - ID of the meeting to join
    /// * `is_host` - whether the caller wants to be the meeting host
    JoinMeeting {
        meeting_id: MeetingId,
        #[serde(default)]
        is_host: bool,
    },
    /// Voluntarily leave a meeting
    LeaveMeeting { meeting_id: MeetingId },
    /// Relay a WebRTC session-description offer to the rest of the meeting
    /// # Fields
    /// * `offer` - opaque session description, passed through unmodified
    /// * `meeting_id` - meeting the negotiation belongs to
    /// * `user_id` - target connection, carried through for the recipient
    Offer {
        offer: serde_json::Value,
        meeting_id: MeetingId,
        user_id: ConnectionId,
    },
    /// Relay a WebRTC session-description answer
    Answer {
        answer: serde_json::Value,
        meeting_id: MeetingId,
        user_id: ConnectionId,
    },
    /// Relay a WebRTC ICE candidate
    IceCandidate {
        candidate: serde_json::Value,
        meeting_id: MeetingId,
        user_id: ConnectionId,
    },
}

/// Messages sent from server to client
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// A new participant joined the meeting
    UserConnected { connection_id: ConnectionId },
    /// A participant left or dropped out of the meeting
    UserDisconnected { connection_id: ConnectionId },
    /// Targeted notice: the receiving connection is now the meeting host
    PromotedToHost,
    /// Relayed offer, with the sending connection's identifier attached
    Offer {
        offer: serde_json::Value,
        meeting_id: MeetingId,
        user_id: ConnectionId,
        sender_id: ConnectionId,
    },
    /// Relayed answer
    Answer {
        answer: serde_json::Value,
        meeting_id: MeetingId,
        user_id: ConnectionId,
        sender_id: ConnectionId,
    },
    /// Relayed ICE candidate
    IceCandidate {
        candidate: serde_json::Value,
        meeting_id: MeetingId,
        user_id: ConnectionId,
        sender_id: ConnectionId,
    },
    /// Error response, delivered only to the offending connection
    Error { message: String },
}
