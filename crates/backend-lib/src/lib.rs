// ============================
// backend-lib/src/lib.rs
// ============================
//! Core functionality for the live-class signaling server.

pub mod config;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod websocket;
pub mod ws_router;

use std::sync::Arc;

use dashmap::DashMap;
use liveclass_common::{ConnectionId, ServerMessage};
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::registry::MeetingRegistry;

/// Application state shared across all handlers
pub struct AppState {
    /// Meeting registry, the only shared mutable resource
    pub registry: MeetingRegistry,
    /// Outbound channel of every live connection, keyed by connection id
    pub peers: DashMap<ConnectionId, mpsc::UnboundedSender<ServerMessage>>,
    /// Settings manager
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Create a new application state
    pub fn new(settings: Settings) -> Self {
        Self {
            registry: MeetingRegistry::new(),
            peers: DashMap::new(),
            settings: Arc::new(settings),
        }
    }
}
