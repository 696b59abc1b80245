//! Media Gate
//!
//! The only component allowed to touch media tracks. It turns the
//! controller's high-level commands into concrete operations on a
//! [`MediaBackend`], remembering what it already did so that repeating a
//! command is free. Backend failures are logged and dropped: a rejected
//! `play()` must not stop the next interrupt from going through.

use crate::{
    error::MediaError,
    events::{MediaHandle, TrackId, TrackKind, TrackOrigin},
    turn::MediaCommand,
};
use tracing::{debug, info, warn};

/// The concrete media runtime (browser, native audio stack, a remote client...).
#[cfg_attr(test, mockall::automock)]
pub trait MediaBackend: Send {
    /// Enables or disables a track. For the local microphone this is its
    /// transmit flag.
    fn set_track_enabled(&mut self, id: &TrackId, enabled: bool) -> Result<(), MediaError>;
    /// Routes a remote track into the agent's output element.
    fn attach_output(&mut self, handle: &MediaHandle) -> Result<(), MediaError>;
    fn play(&mut self) -> Result<(), MediaError>;
    fn pause(&mut self) -> Result<(), MediaError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    /// No remote track has been attached yet.
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone)]
struct BoundTrack {
    handle: MediaHandle,
    enabled: bool,
}

/// Owns every media-side effect of a session: the microphone's transmit flag,
/// the agent's output tracks (one per kind) and playback.
pub struct MediaGate<B> {
    backend: B,
    mic: Option<BoundTrack>,
    mic_transmit: bool,
    remote: Vec<BoundTrack>,
    playback: Playback,
    interrupted: bool,
}

impl<B: MediaBackend> MediaGate<B> {
    /// Creates a gate with nothing bound. `mic_transmit` is applied to the
    /// microphone as soon as it arrives.
    pub fn new(backend: B, mic_transmit: bool) -> Self {
        Self {
            backend,
            mic: None,
            mic_transmit,
            remote: Vec::new(),
            playback: Playback::Stopped,
            interrupted: false,
        }
    }

    /// Runs one command. Repeating a command that is already in effect issues
    /// no backend call.
    pub fn execute(&mut self, command: MediaCommand) {
        match command {
            MediaCommand::SetMicTransmit(enabled) => self.set_mic_transmit(enabled),
            MediaCommand::Interrupt => self.interrupt(),
            MediaCommand::Resume => self.resume(),
            MediaCommand::BindTrack(handle) => self.bind_track(handle),
        }
    }

    pub fn playback(&self) -> Playback {
        self.playback
    }

    pub fn mic_transmit(&self) -> bool {
        self.mic_transmit
    }

    pub fn microphone(&self) -> Option<&MediaHandle> {
        self.mic.as_ref().map(|t| &t.handle)
    }

    /// Whether a bound remote track is currently enabled.
    pub fn is_remote_enabled(&self, id: &TrackId) -> Option<bool> {
        self.remote
            .iter()
            .find(|t| &t.handle.id == id)
            .map(|t| t.enabled)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Forgets every bound track. Used when the session is torn down.
    pub fn release(&mut self, mic_transmit: bool) {
        self.mic = None;
        self.remote.clear();
        self.playback = Playback::Stopped;
        self.interrupted = false;
        self.mic_transmit = mic_transmit;
    }

    fn set_mic_transmit(&mut self, enabled: bool) {
        self.mic_transmit = enabled;
        let Some(mic) = self.mic.as_mut() else {
            debug!(enabled, "No microphone bound yet, transmit state kept for bind");
            return;
        };
        if mic.enabled == enabled {
            return;
        }
        match self.backend.set_track_enabled(&mic.handle.id, enabled) {
            Ok(()) => {
                mic.enabled = enabled;
                info!(track = %mic.handle.id, enabled, "Microphone transmit updated");
            }
            Err(e) => warn!(track = %mic.handle.id, error = %e, "Failed to update microphone"),
        }
    }

    fn interrupt(&mut self) {
        self.interrupted = true;
        if self.playback == Playback::Playing {
            match self.backend.pause() {
                Ok(()) => self.playback = Playback::Paused,
                Err(e) => warn!(error = %e, "Failed to pause agent playback"),
            }
        }
        for track in self
            .remote
            .iter_mut()
            .filter(|t| t.handle.kind == TrackKind::Audio && t.enabled)
        {
            match self.backend.set_track_enabled(&track.handle.id, false) {
                Ok(()) => track.enabled = false,
                Err(e) => warn!(track = %track.handle.id, error = %e, "Failed to disable agent audio"),
            }
        }
    }

    fn resume(&mut self) {
        self.interrupted = false;
        for track in self.remote.iter_mut().filter(|t| !t.enabled) {
            match self.backend.set_track_enabled(&track.handle.id, true) {
                Ok(()) => track.enabled = true,
                Err(e) => warn!(track = %track.handle.id, error = %e, "Failed to re-enable agent track"),
            }
        }
        if self.playback == Playback::Paused {
            match self.backend.play() {
                Ok(()) => self.playback = Playback::Playing,
                Err(e) => warn!(error = %e, "Failed to resume agent playback"),
            }
        }
    }

    fn bind_track(&mut self, handle: MediaHandle) {
        match handle.origin {
            TrackOrigin::Local if handle.kind == TrackKind::Audio => self.bind_microphone(handle),
            TrackOrigin::Local => debug!(track = %handle.id, "Ignoring local video track"),
            TrackOrigin::Remote => self.bind_remote(handle),
        }
    }

    fn bind_microphone(&mut self, handle: MediaHandle) {
        if self.mic.as_ref().is_some_and(|m| m.handle.id == handle.id) {
            debug!(track = %handle.id, "Microphone already bound");
            return;
        }
        info!(track = %handle.id, transmit = self.mic_transmit, "Binding microphone");
        // The runtime hands the track over enabled; apply the gate straight away.
        let enabled = match self.backend.set_track_enabled(&handle.id, self.mic_transmit) {
            Ok(()) => self.mic_transmit,
            Err(e) => {
                warn!(track = %handle.id, error = %e, "Failed to apply microphone gate");
                true
            }
        };
        self.mic = Some(BoundTrack { handle, enabled });
    }

    fn bind_remote(&mut self, handle: MediaHandle) {
        if self.remote.iter().any(|t| t.handle.id == handle.id) {
            debug!(track = %handle.id, "Remote track already bound");
            return;
        }
        info!(track = %handle.id, kind = ?handle.kind, "Binding agent output track");
        if let Err(e) = self.backend.attach_output(&handle) {
            warn!(track = %handle.id, error = %e, "Failed to attach agent output");
            return;
        }
        // One output track per kind; a new id supersedes the previous one.
        let before = self.remote.len();
        self.remote.retain(|t| t.handle.kind != handle.kind);
        if self.remote.len() != before {
            info!(track = %handle.id, kind = ?handle.kind, "Replaced previous agent output track");
        }
        let mut enabled = true;
        if self.interrupted && handle.kind == TrackKind::Audio {
            match self.backend.set_track_enabled(&handle.id, false) {
                Ok(()) => enabled = false,
                Err(e) => warn!(track = %handle.id, error = %e, "Failed to keep interrupted audio disabled"),
            }
        }
        self.remote.push(BoundTrack { handle, enabled });

        if self.playback != Playback::Playing && !self.interrupted {
            match self.backend.play() {
                Ok(()) => self.playback = Playback::Playing,
                Err(e) => warn!(error = %e, "Agent playback rejected"),
            }
        } else if self.playback == Playback::Stopped {
            self.playback = Playback::Paused;
        }
    }
}
