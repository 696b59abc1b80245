//! Turn-taking core of a full-duplex voice agent.
//!
//! Consumes session events, decides who holds the floor, enforces barge-in,
//! gates the microphone during the agent's greeting and measures how long
//! each pipeline stage takes.

pub mod clock;
pub mod error;
pub mod events;
pub mod latency;
pub mod media;
pub mod session;
pub mod turn;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::MediaError;
pub use events::{MediaHandle, SessionEvent, TrackId, TrackKind, TrackOrigin, UrgentSignal};
pub use latency::{LatencyKind, LatencySample, LatencyTracker, MetricUpdate, TurnTimestamps};
pub use media::{MediaBackend, MediaGate, Playback};
pub use session::{Session, SessionConfig};
pub use turn::{MediaCommand, TurnController, TurnOutcome, TurnPhase, TurnState};
