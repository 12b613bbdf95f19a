// crates/backend-lib/src/error.rs

//! Central error type for the signaling relay.
//!
//! Every failure here is operation-local: it is reported to the offending
//! connection as an `error` event and never tears down the process or any
//! other meeting's state.
use thiserror::Error;

/// Application error types
///
/// The `Display` string of each variant is the message delivered to the
/// client in the `error` event.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Meeting ID is required")]
    MissingMeetingId,

    #[error("Target user ID is required")]
    MissingTargetUser,

    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}
