use crate::events::TrackId;
use thiserror::Error;

/// Failures reported by a media runtime when executing an operation.
///
/// These never reach the turn state machine; `MediaGate` logs them and moves on.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Playback rejected: {0}")]
    Playback(String),
    #[error("Track {id} unavailable: {reason}")]
    Track { id: TrackId, reason: String },
    #[error("Media runtime detached")]
    Detached,
}
