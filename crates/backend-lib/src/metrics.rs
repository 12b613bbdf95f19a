// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_DISCONNECTION: &str = "ws.disconnection";
pub const WS_ACTIVE: &str = "ws.active";
pub const MEETING_JOINED: &str = "meeting.joined";
pub const MEETING_CLOSED: &str = "meeting.closed";
pub const HOST_PROMOTED: &str = "meeting.host_promoted";
pub const SIGNAL_RELAYED: &str = "signal.relayed";
