// ============================
// backend-lib/src/registry.rs
// ============================
//! In-memory meeting registry.
//!
//! The registry is the single shared mutable resource of the relay. It owns
//! the mapping from meeting id to live meeting state and enforces the
//! membership/host invariants:
//!
//! - a meeting exists iff it has at least one participant;
//! - whenever a host is set, it is one of the participants;
//! - participant uniqueness comes from set semantics.
//!
//! Every operation is a short synchronous mutation under a single map entry.
//! Operations return plain outcome structs describing who must be notified;
//! the caller performs the actual sends, which keeps the
//! "room except sender" fan-out an explicit, testable step.

use std::collections::HashSet;
use std::time::Instant;

use dashmap::DashMap;
use liveclass_common::{ConnectionId, MeetingId};

/// Live state of one meeting.
pub struct Meeting {
    /// Connection currently designated host, if any joiner asked for the role
    pub host: Option<ConnectionId>,
    /// Connections currently joined
    pub participants: HashSet<ConnectionId>,
    /// When the first participant joined; informational only
    pub created_at: Instant,
}

impl Meeting {
    fn new() -> Self {
        Self {
            host: None,
            participants: HashSet::new(),
            created_at: Instant::now(),
        }
    }
}

/// Result of a `join`: whether the caller became host, and which existing
/// participants must be told about the newcomer.
pub struct JoinOutcome {
    pub became_host: bool,
    pub peers: Vec<ConnectionId>,
}

/// Result of removing a connection from a meeting.
pub struct Departure {
    /// Participant promoted to host because the departing connection held it
    pub promoted: Option<ConnectionId>,
    /// Participants still in the meeting, to receive `user-disconnected`
    pub remaining: Vec<ConnectionId>,
    /// True when the meeting emptied out and was deleted
    pub closed: bool,
}

/// Registry of all active meetings.
pub struct MeetingRegistry {
    meetings: DashMap<MeetingId, Meeting>,
}

impl MeetingRegistry {
    pub fn new() -> Self {
        Self {
            meetings: DashMap::new(),
        }
    }

    /// Add `conn` to `meeting_id`, creating the meeting on first join.
    ///
    /// The host role is granted only when `wants_host` is set and the
    /// meeting has no host yet; a later host request is silently ignored
    /// and the existing host keeps the role.
    pub fn join(&self, meeting_id: &str, conn: &ConnectionId, wants_host: bool) -> JoinOutcome {
        let mut meeting = self
            .meetings
            .entry(meeting_id.to_string())
            .or_insert_with(Meeting::new);

        let peers: Vec<ConnectionId> = meeting
            .participants
            .iter()
            .filter(|id| *id != conn)
            .cloned()
            .collect();

        meeting.participants.insert(conn.clone());

        let mut became_host = false;
        if wants_host && meeting.host.is_none() {
            meeting.host = Some(conn.clone());
            became_host = true;
        }

        JoinOutcome { became_host, peers }
    }

    /// Remove `conn` from `meeting_id`.
    ///
    /// Returns `None` when no such meeting exists (a departure racing a
    /// last-participant cleanup is a no-op, not an error). When the departing
    /// connection held the host role and participants remain, one of them is
    /// promoted. The meeting is deleted the moment it empties.
    pub fn depart(&self, meeting_id: &str, conn: &ConnectionId) -> Option<Departure> {
        let departure = {
            let mut meeting = self.meetings.get_mut(meeting_id)?;
            meeting.participants.remove(conn);

            let mut promoted = None;
            if meeting.host.as_ref() == Some(conn) {
                meeting.host = meeting.participants.iter().next().cloned();
                promoted = meeting.host.clone();
            }

            Departure {
                promoted,
                remaining: meeting.participants.iter().cloned().collect(),
                closed: meeting.participants.is_empty(),
            }
        };

        if departure.closed {
            // Guarded removal: another connection may have re-joined between
            // releasing the entry above and getting here.
            self.meetings
                .remove_if(meeting_id, |_, meeting| meeting.participants.is_empty());
        }

        Some(departure)
    }

    /// Remove `conn` from every meeting it participates in.
    ///
    /// Used for abrupt transport-level disconnects, where the client supplies
    /// no meeting id. A connection can hold more than one membership; all of
    /// them are cleaned up.
    pub fn depart_all(&self, conn: &ConnectionId) -> Vec<(MeetingId, Departure)> {
        let affected: Vec<MeetingId> = self
            .meetings
            .iter()
            .filter(|entry| entry.value().participants.contains(conn))
            .map(|entry| entry.key().clone())
            .collect();

        affected
            .into_iter()
            .filter_map(|meeting_id| {
                self.depart(&meeting_id, conn)
                    .map(|departure| (meeting_id, departure))
            })
            .collect()
    }

    /// Every participant of `meeting_id` except `sender`.
    ///
    /// An unknown meeting yields an empty list, so a relay into it reaches
    /// nobody instead of failing.
    pub fn recipients(&self, meeting_id: &str, sender: &ConnectionId) -> Vec<ConnectionId> {
        self.meetings
            .get(meeting_id)
            .map(|meeting| {
                meeting
                    .participants
                    .iter()
                    .filter(|id| *id != sender)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of active meetings.
    pub fn len(&self) -> usize {
        self.meetings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meetings.is_empty()
    }

    /// Current host of a meeting, if the meeting exists and has one.
    pub fn host_of(&self, meeting_id: &str) -> Option<ConnectionId> {
        self.meetings
            .get(meeting_id)
            .and_then(|meeting| meeting.host.clone())
    }

    /// Current participant set of a meeting.
    pub fn participants_of(&self, meeting_id: &str) -> Option<HashSet<ConnectionId>> {
        self.meetings
            .get(meeting_id)
            .map(|meeting| meeting.participants.clone())
    }
}

impl Default for MeetingRegistry {
    fn default() -> Self {
        Self::new()
    }
}
