// ==================
// crates/backend-lib/src/websocket.rs
// ==================
//! WebSocket Handler Module
//!
//! This module implements the per-connection signaling handler for the
//! live-class server. It provides functionality for:
//! - Connection registration in the shared peer table
//! - Dispatch of the inbound signaling events (join, leave, offer, answer,
//!   ICE candidate)
//! - Host assignment and reassignment through the meeting registry
//! - Fan-out of notifications to the other participants of a meeting
//!
//! The `SignalingHandler` is instantiated per-connection and owns that
//! connection's identity. It interacts with the shared application state to
//! coordinate between multiple clients.
//!
//! # Failure semantics
//! A failed precondition (missing meeting id or target user id) aborts the
//! single operation and surfaces as an `error` event to the calling
//! connection only; the registry and all other meetings are untouched.
//! Outbound sends are fire-and-forget: a peer whose channel is gone is
//! skipped, never retried.

use std::sync::Arc;

use liveclass_common::{ClientMessage, ConnectionId, ServerMessage};
use metrics::counter;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::AppError;
use crate::metrics as keys;
use crate::registry::Departure;
use crate::AppState;

/// Signaling handler for a single client connection
pub struct SignalingHandler {
    state: Arc<AppState>,
    connection_id: ConnectionId,
}

impl SignalingHandler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            connection_id: Uuid::new_v4().to_string(),
        }
    }

    /// The identifier assigned to this connection at connect time.
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Register this connection's outbound channel so other handlers can
    /// address it.
    pub fn register(&self, tx: mpsc::UnboundedSender<ServerMessage>) {
        self.state.peers.insert(self.connection_id.clone(), tx);
    }

    /// # Handle an incoming client message
    /// This is the main entry point for processing inbound signaling events.
    /// Registry mutations run synchronously to completion before the next
    /// event from this connection is processed, and outbound notifications
    /// are non-blocking enqueues onto the recipients' channels.
    ///
    /// # Message types
    /// - `JoinMeeting`: enter a meeting (lazily created), optionally claiming
    ///   the host role; existing participants are told via `user-connected`
    /// - `LeaveMeeting`: voluntary departure, with host handoff and meeting
    ///   cleanup when applicable
    /// - `Offer` / `Answer` / `IceCandidate`: relay the opaque negotiation
    ///   payload to every other participant of the meeting
    ///
    /// # Errors
    /// Returns `AppError` when a required field is missing or empty; the
    /// caller is expected to deliver it to this connection as an `error`
    /// event. No error here affects any other connection or meeting.
    pub fn handle_message(&self, msg: ClientMessage) -> Result<(), AppError> {
        match msg {
            ClientMessage::JoinMeeting {
                meeting_id,
                is_host,
            } => self.handle_join(&meeting_id, is_host),
            ClientMessage::LeaveMeeting { meeting_id } => self.handle_leave(&meeting_id),
            ClientMessage::Offer {
                offer,
                meeting_id,
                user_id,
            } => {
                self.ensure_relay_target(&meeting_id, &user_id)?;
                let relayed = ServerMessage::Offer {
                    offer,
                    meeting_id: meeting_id.clone(),
                    user_id,
                    sender_id: self.connection_id.clone(),
                };
                self.relay_to_meeting(&meeting_id, relayed);
                Ok(())
            },
            ClientMessage::Answer {
                answer,
                meeting_id,
                user_id,
            } => {
                self.ensure_relay_target(&meeting_id, &user_id)?;
                let relayed = ServerMessage::Answer {
                    answer,
                    meeting_id: meeting_id.clone(),
                    user_id,
                    sender_id: self.connection_id.clone(),
                };
                self.relay_to_meeting(&meeting_id, relayed);
                Ok(())
            },
            ClientMessage::IceCandidate {
                candidate,
                meeting_id,
                user_id,
            } => {
                self.ensure_relay_target(&meeting_id, &user_id)?;
                let relayed = ServerMessage::IceCandidate {
                    candidate,
                    meeting_id: meeting_id.clone(),
                    user_id,
                    sender_id: self.connection_id.clone(),
                };
                self.relay_to_meeting(&meeting_id, relayed);
                Ok(())
            },
        }
    }

    /// Clean up after a transport-level disconnect.
    ///
    /// The client supplies no meeting id on an abrupt drop, so every meeting
    /// is scanned and each membership of this connection is unwound with the
    /// same departure sequence as a voluntary leave.
    pub fn handle_disconnect(&self) {
        self.state.peers.remove(&self.connection_id);

        for (meeting_id, departure) in self.state.registry.depart_all(&self.connection_id) {
            tracing::info!(
                connection_id = %self.connection_id,
                meeting_id = %meeting_id,
                "participant dropped"
            );
            self.fan_out_departure(&meeting_id, &departure);
        }
    }

    fn handle_join(&self, meeting_id: &str, wants_host: bool) -> Result<(), AppError> {
        if meeting_id.is_empty() {
            return Err(AppError::MissingMeetingId);
        }

        let outcome = self
            .state
            .registry
            .join(meeting_id, &self.connection_id, wants_host);

        counter!(keys::MEETING_JOINED).increment(1);
        tracing::info!(
            connection_id = %self.connection_id,
            meeting_id = %meeting_id,
            host = outcome.became_host,
            "participant joined"
        );

        let notice = ServerMessage::UserConnected {
            connection_id: self.connection_id.clone(),
        };
        self.broadcast(&outcome.peers, &notice);

        Ok(())
    }

    fn handle_leave(&self, meeting_id: &str) -> Result<(), AppError> {
        if meeting_id.is_empty() {
            return Err(AppError::MissingMeetingId);
        }

        // A leave for a meeting that is already gone is a no-op.
        if let Some(departure) = self.state.registry.depart(meeting_id, &self.connection_id) {
            tracing::info!(
                connection_id = %self.connection_id,
                meeting_id = %meeting_id,
                "participant left"
            );
            self.fan_out_departure(meeting_id, &departure);
        }

        Ok(())
    }

    /// Notify a meeting about a departure: the promoted participant first,
    /// then `user-disconnected` to everyone still in the room.
    fn fan_out_departure(&self, meeting_id: &str, departure: &Departure) {
        if let Some(promoted) = &departure.promoted {
            counter!(keys::HOST_PROMOTED).increment(1);
            tracing::info!(
                meeting_id = %meeting_id,
                connection_id = %promoted,
                "host reassigned"
            );
            self.send_to(promoted, ServerMessage::PromotedToHost);
        }

        let notice = ServerMessage::UserDisconnected {
            connection_id: self.connection_id.clone(),
        };
        self.broadcast(&departure.remaining, &notice);

        if departure.closed {
            counter!(keys::MEETING_CLOSED).increment(1);
            tracing::info!(meeting_id = %meeting_id, "meeting closed");
        }
    }

    /// Preconditions shared by the three relay events. The payload itself is
    /// never validated; it is the browser's negotiation structure and passes
    /// through opaquely.
    fn ensure_relay_target(&self, meeting_id: &str, user_id: &str) -> Result<(), AppError> {
        if meeting_id.is_empty() {
            return Err(AppError::MissingMeetingId);
        }
        if user_id.is_empty() {
            return Err(AppError::MissingTargetUser);
        }
        Ok(())
    }

    /// Forward a negotiation payload to every participant of the meeting
    /// except the sender. The sender is not required to be a participant
    /// itself; an unknown meeting simply has no recipients.
    fn relay_to_meeting(&self, meeting_id: &str, msg: ServerMessage) {
        let recipients = self.state.registry.recipients(meeting_id, &self.connection_id);

        counter!(keys::SIGNAL_RELAYED).increment(1);
        tracing::debug!(
            meeting_id = %meeting_id,
            sender_id = %self.connection_id,
            recipients = recipients.len(),
            "relaying signal"
        );

        self.broadcast(&recipients, &msg);
    }

    /// Enqueue `msg` to each target's outbound channel. Fire-and-forget: a
    /// target whose channel is closed or missing is skipped.
    fn broadcast(&self, targets: &[ConnectionId], msg: &ServerMessage) {
        for target in targets {
            self.send_to(target, msg.clone());
        }
    }

    fn send_to(&self, target: &ConnectionId, msg: ServerMessage) {
        if let Some(tx) = self.state.peers.get(target) {
            let _ = tx.send(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use serde_json::json;
    use tokio::sync::mpsc::error::TryRecvError;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn setup() -> Arc<AppState> {
        Arc::new(AppState::new(Settings::default()))
    }

    /// Helper to attach a handler with a live outbound channel, the way the
    /// router does on upgrade.
    fn attach(state: &Arc<AppState>) -> (SignalingHandler, UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = SignalingHandler::new(state.clone());
        handler.register(tx);
        (handler, rx)
    }

    #[test]
    fn test_join_assigns_host_and_registers_participant() {
        let state = setup();
        let (a, _rx_a) = attach(&state);

        a.handle_message(ClientMessage::JoinMeeting {
            meeting_id: "ABC123".to_string(),
            is_host: true,
        })
        .unwrap();

        assert_eq!(
            state.registry.host_of("ABC123").as_deref(),
            Some(a.connection_id())
        );
        assert_eq!(state.registry.len(), 1);
    }

    #[test]
    fn test_join_notifies_existing_participants_only() {
        let state = setup();
        let (a, mut rx_a) = attach(&state);
        let (b, mut rx_b) = attach(&state);

        a.handle_message(ClientMessage::JoinMeeting {
            meeting_id: "ABC123".to_string(),
            is_host: true,
        })
        .unwrap();
        b.handle_message(ClientMessage::JoinMeeting {
            meeting_id: "ABC123".to_string(),
            is_host: false,
        })
        .unwrap();

        // A hears about B; B hears nothing about its own join.
        match rx_a.try_recv().unwrap() {
            ServerMessage::UserConnected { connection_id } => {
                assert_eq!(connection_id, b.connection_id());
            },
            other => panic!("Expected UserConnected, got {other:?}"),
        }
        assert!(matches!(rx_b.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_second_host_claim_is_silently_ignored() {
        let state = setup();
        let (a, _rx_a) = attach(&state);
        let (b, mut rx_b) = attach(&state);

        a.handle_message(ClientMessage::JoinMeeting {
            meeting_id: "ABC123".to_string(),
            is_host: true,
        })
        .unwrap();
        b.handle_message(ClientMessage::JoinMeeting {
            meeting_id: "ABC123".to_string(),
            is_host: true,
        })
        .unwrap();

        assert_eq!(
            state.registry.host_of("ABC123").as_deref(),
            Some(a.connection_id())
        );
        // No rejection event either; the claim just does not take effect.
        assert!(matches!(rx_b.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_join_with_empty_meeting_id_is_rejected() {
        let state = setup();
        let (a, _rx_a) = attach(&state);

        let err = a
            .handle_message(ClientMessage::JoinMeeting {
                meeting_id: String::new(),
                is_host: true,
            })
            .unwrap_err();

        assert_eq!(err.to_string(), "Meeting ID is required");
        assert!(state.registry.is_empty());
    }

    #[test]
    fn test_offer_is_relayed_verbatim_to_room_except_sender() {
        let state = setup();
        let (a, mut rx_a) = attach(&state);
        let (b, mut rx_b) = attach(&state);
        let (c, mut rx_c) = attach(&state);

        for (handler, host) in [(&a, true), (&b, false)] {
            handler
                .handle_message(ClientMessage::JoinMeeting {
                    meeting_id: "ABC123".to_string(),
                    is_host: host,
                })
                .unwrap();
        }
        // C sits in a different meeting and must never see the offer.
        c.handle_message(ClientMessage::JoinMeeting {
            meeting_id: "OTHER".to_string(),
            is_host: true,
        })
        .unwrap();

        let sdp = json!({"type": "offer", "sdp": "v=0\r\no=- 46117 2 IN IP4 127.0.0.1"});
        a.handle_message(ClientMessage::Offer {
            offer: sdp.clone(),
            meeting_id: "ABC123".to_string(),
            user_id: b.connection_id().to_string(),
        })
        .unwrap();

        // Drain B's join notice from A's queue first.
        let _ = rx_a.try_recv();

        match rx_b.try_recv().unwrap() {
            ServerMessage::Offer {
                offer,
                meeting_id,
                user_id,
                sender_id,
            } => {
                assert_eq!(offer, sdp);
                assert_eq!(meeting_id, "ABC123");
                assert_eq!(user_id, b.connection_id());
                assert_eq!(sender_id, a.connection_id());
            },
            other => panic!("Expected Offer, got {other:?}"),
        }

        assert!(matches!(rx_a.try_recv(), Err(TryRecvError::Empty)));
        assert!(matches!(rx_c.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_relay_requires_meeting_and_target() {
        let state = setup();
        let (a, _rx_a) = attach(&state);

        let err = a
            .handle_message(ClientMessage::Answer {
                answer: json!({}),
                meeting_id: String::new(),
                user_id: "someone".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, AppError::MissingMeetingId));

        let err = a
            .handle_message(ClientMessage::IceCandidate {
                candidate: json!({}),
                meeting_id: "ABC123".to_string(),
                user_id: String::new(),
            })
            .unwrap_err();
        assert!(matches!(err, AppError::MissingTargetUser));
    }

    #[test]
    fn test_relay_from_non_participant_is_forwarded() {
        let state = setup();
        let (a, mut rx_a) = attach(&state);
        let (outsider, _rx_o) = attach(&state);

        a.handle_message(ClientMessage::JoinMeeting {
            meeting_id: "ABC123".to_string(),
            is_host: true,
        })
        .unwrap();

        // Permissive pass-through: no membership check on the sender.
        outsider
            .handle_message(ClientMessage::IceCandidate {
                candidate: json!({"candidate": "candidate:0"}),
                meeting_id: "ABC123".to_string(),
                user_id: a.connection_id().to_string(),
            })
            .unwrap();

        match rx_a.try_recv().unwrap() {
            ServerMessage::IceCandidate { sender_id, .. } => {
                assert_eq!(sender_id, outsider.connection_id());
            },
            other => panic!("Expected IceCandidate, got {other:?}"),
        }
    }

    #[test]
    fn test_host_leave_promotes_and_notifies() {
        let state = setup();
        let (a, _rx_a) = attach(&state);
        let (b, mut rx_b) = attach(&state);

        a.handle_message(ClientMessage::JoinMeeting {
            meeting_id: "ABC123".to_string(),
            is_host: true,
        })
        .unwrap();
        b.handle_message(ClientMessage::JoinMeeting {
            meeting_id: "ABC123".to_string(),
            is_host: false,
        })
        .unwrap();

        a.handle_message(ClientMessage::LeaveMeeting {
            meeting_id: "ABC123".to_string(),
        })
        .unwrap();

        // Exactly one promotion, then the departure notice.
        assert!(matches!(
            rx_b.try_recv().unwrap(),
            ServerMessage::PromotedToHost
        ));
        match rx_b.try_recv().unwrap() {
            ServerMessage::UserDisconnected { connection_id } => {
                assert_eq!(connection_id, a.connection_id());
            },
            other => panic!("Expected UserDisconnected, got {other:?}"),
        }
        assert!(matches!(rx_b.try_recv(), Err(TryRecvError::Empty)));

        assert_eq!(
            state.registry.host_of("ABC123").as_deref(),
            Some(b.connection_id())
        );
    }

    #[test]
    fn test_leave_with_empty_meeting_id_is_rejected() {
        let state = setup();
        let (a, _rx_a) = attach(&state);

        let err = a
            .handle_message(ClientMessage::LeaveMeeting {
                meeting_id: String::new(),
            })
            .unwrap_err();
        assert!(matches!(err, AppError::MissingMeetingId));
    }

    #[test]
    fn test_leave_of_unknown_meeting_is_noop() {
        let state = setup();
        let (a, _rx_a) = attach(&state);

        a.handle_message(ClientMessage::LeaveMeeting {
            meeting_id: "NEVER-EXISTED".to_string(),
        })
        .unwrap();
        assert!(state.registry.is_empty());
    }

    #[test]
    fn test_last_leave_deletes_meeting() {
        let state = setup();
        let (a, _rx_a) = attach(&state);

        a.handle_message(ClientMessage::JoinMeeting {
            meeting_id: "ABC123".to_string(),
            is_host: true,
        })
        .unwrap();
        a.handle_message(ClientMessage::LeaveMeeting {
            meeting_id: "ABC123".to_string(),
        })
        .unwrap();

        assert!(state.registry.is_empty());
    }

    #[test]
    fn test_disconnect_unwinds_every_membership() {
        let state = setup();
        let (a, _rx_a) = attach(&state);
        let (b, mut rx_b) = attach(&state);
        let (c, mut rx_c) = attach(&state);

        a.handle_message(ClientMessage::JoinMeeting {
            meeting_id: "MATH101".to_string(),
            is_host: true,
        })
        .unwrap();
        b.handle_message(ClientMessage::JoinMeeting {
            meeting_id: "MATH101".to_string(),
            is_host: false,
        })
        .unwrap();
        a.handle_message(ClientMessage::JoinMeeting {
            meeting_id: "BIO202".to_string(),
            is_host: true,
        })
        .unwrap();
        c.handle_message(ClientMessage::JoinMeeting {
            meeting_id: "BIO202".to_string(),
            is_host: false,
        })
        .unwrap();

        a.handle_disconnect();

        // Both rooms saw a promotion and a departure notice.
        for rx in [&mut rx_b, &mut rx_c] {
            assert!(matches!(
                rx.try_recv().unwrap(),
                ServerMessage::PromotedToHost
            ));
            match rx.try_recv().unwrap() {
                ServerMessage::UserDisconnected { connection_id } => {
                    assert_eq!(connection_id, a.connection_id());
                },
                other => panic!("Expected UserDisconnected, got {other:?}"),
            }
        }

        assert_eq!(
            state.registry.host_of("MATH101").as_deref(),
            Some(b.connection_id())
        );
        assert_eq!(
            state.registry.host_of("BIO202").as_deref(),
            Some(c.connection_id())
        );
        // The dropped connection no longer has an addressable channel.
        assert!(!state.peers.contains_key(a.connection_id()));
    }

    #[test]
    fn test_disconnect_of_last_participant_closes_meeting() {
        let state = setup();
        let (a, _rx_a) = attach(&state);

        a.handle_message(ClientMessage::JoinMeeting {
            meeting_id: "ABC123".to_string(),
            is_host: true,
        })
        .unwrap();
        a.handle_disconnect();

        assert!(state.registry.is_empty());
    }
}
