//! Session Event Model
//!
//! Typed versions of everything the transport collaborator can tell the core:
//! lifecycle changes, speech activity, pipeline progress and track arrivals.
//! The JSON shape follows the RTVI message vocabulary (`type` + `data`), so a
//! browser client can forward what it receives without re-mapping.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Opaque identifier of a media track, as assigned by the media runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Which side of the call produced a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackOrigin {
    Local,
    Remote,
}

/// Reference to a concrete track owned by the media runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaHandle {
    pub id: TrackId,
    pub kind: TrackKind,
    pub origin: TrackOrigin,
}

impl MediaHandle {
    pub fn new(id: impl Into<String>, kind: TrackKind, origin: TrackOrigin) -> Self {
        Self {
            id: TrackId::new(id),
            kind,
            origin,
        }
    }

    /// The local audio track, i.e. the user's microphone.
    pub fn is_microphone(&self) -> bool {
        self.kind == TrackKind::Audio && self.origin == TrackOrigin::Local
    }
}

/// Ordinary session events, delivered in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum SessionEvent {
    Connected,
    Disconnected,
    BotReady,
    TrackStarted(MediaHandle),
    UserStartedSpeaking,
    UserStoppedSpeaking,
    #[serde(rename = "user-transcription")]
    UserTranscript {
        #[serde(default)]
        text: String,
        #[serde(rename = "final")]
        is_final: bool,
    },
    BotLlmStarted,
    BotLlmText {
        #[serde(default)]
        text: String,
    },
    BotLlmStopped,
    BotStartedSpeaking,
    BotStoppedSpeaking,
}

impl SessionEvent {
    /// Short name used in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Connected => "connected",
            SessionEvent::Disconnected => "disconnected",
            SessionEvent::BotReady => "bot-ready",
            SessionEvent::TrackStarted(_) => "track-started",
            SessionEvent::UserStartedSpeaking => "user-started-speaking",
            SessionEvent::UserStoppedSpeaking => "user-stopped-speaking",
            SessionEvent::UserTranscript { .. } => "user-transcription",
            SessionEvent::BotLlmStarted => "bot-llm-started",
            SessionEvent::BotLlmText { .. } => "bot-llm-text",
            SessionEvent::BotLlmStopped => "bot-llm-stopped",
            SessionEvent::BotStartedSpeaking => "bot-started-speaking",
            SessionEvent::BotStoppedSpeaking => "bot-stopped-speaking",
        }
    }
}

/// Signals carried by the urgent out-of-band channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrgentSignal {
    Interrupt,
}

impl UrgentSignal {
    /// Interprets a raw urgent payload. Anything that is not a recognised
    /// signal yields `None`; the urgent channel also carries traffic the core
    /// does not care about.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        match payload.get("type").and_then(Value::as_str) {
            Some("interrupt") => Some(UrgentSignal::Interrupt),
            _ => None,
        }
    }
}
