//! A `MediaBackend` whose tracks live in the browser on the other end of the socket.

use duplex_core::{MediaBackend, MediaError, MediaHandle, TrackId};
use serde::Serialize;
use tokio::sync::mpsc;

/// One concrete operation on the client's media elements.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MediaOp {
    SetTrackEnabled { track_id: TrackId, enabled: bool },
    AttachOutput { track: MediaHandle },
    Play,
    Pause,
}

/// Forwards every operation to the connection's writer.
///
/// The client applies operations asynchronously, so the only failure this
/// backend can observe is the connection going away.
pub struct RemoteMediaBackend {
    tx: mpsc::UnboundedSender<MediaOp>,
}

impl RemoteMediaBackend {
    pub fn new(tx: mpsc::UnboundedSender<MediaOp>) -> Self {
        Self { tx }
    }

    fn forward(&self, op: MediaOp) -> Result<(), MediaError> {
        self.tx.send(op).map_err(|_| MediaError::Detached)
    }
}

impl MediaBackend for RemoteMediaBackend {
    fn set_track_enabled(&mut self, id: &TrackId, enabled: bool) -> Result<(), MediaError> {
        self.forward(MediaOp::SetTrackEnabled {
            track_id: id.clone(),
            enabled,
        })
    }

    fn attach_output(&mut self, handle: &MediaHandle) -> Result<(), MediaError> {
        self.forward(MediaOp::AttachOutput {
            track: handle.clone(),
        })
    }

    fn play(&mut self) -> Result<(), MediaError> {
        self.forward(MediaOp::Play)
    }

    fn pause(&mut self) -> Result<(), MediaError> {
        self.forward(MediaOp::Pause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ops_are_forwarded_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut backend = RemoteMediaBackend::new(tx);
        backend.pause().unwrap();
        backend.set_track_enabled(&TrackId::new("a"), false).unwrap();

        assert_eq!(rx.try_recv().unwrap(), MediaOp::Pause);
        let op = rx.try_recv().unwrap();
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({ "action": "set_track_enabled", "track_id": "a", "enabled": false })
        );
    }

    #[test]
    fn test_closed_connection_reports_detached() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut backend = RemoteMediaBackend::new(tx);
        assert!(matches!(backend.play(), Err(MediaError::Detached)));
    }
}
