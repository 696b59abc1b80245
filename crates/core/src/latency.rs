//! Pipeline Latency Instrumentation
//!
//! Records when each stage boundary of a conversational turn was crossed and
//! turns pairs of boundaries into four latencies:
//!
//! - `STT`: user stopped speaking → final transcript
//! - `LLM`: generation started → first generated token
//! - `TTS`: first token → agent audio starts
//! - `TOTAL`: user stopped speaking → agent audio starts
//!
//! A boundary that arrives before its predecessor is not an error; the
//! dependent latency is simply not measured for that turn.

use crate::clock::Clock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{fmt, sync::Arc};
use tracing::{debug, info, warn};

/// Pipeline stage a latency is measured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyKind {
    Stt,
    Llm,
    Tts,
    Total,
}

impl LatencyKind {
    pub const ALL: [LatencyKind; 4] = [
        LatencyKind::Stt,
        LatencyKind::Llm,
        LatencyKind::Tts,
        LatencyKind::Total,
    ];

    fn index(self) -> usize {
        match self {
            LatencyKind::Stt => 0,
            LatencyKind::Llm => 1,
            LatencyKind::Tts => 2,
            LatencyKind::Total => 3,
        }
    }
}

impl fmt::Display for LatencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatencyKind::Stt => write!(f, "stt"),
            LatencyKind::Llm => write!(f, "llm"),
            LatencyKind::Tts => write!(f, "tts"),
            LatencyKind::Total => write!(f, "total"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatencySample {
    pub kind: LatencyKind,
    pub value_ms: u64,
    pub turn_index: u64,
}

/// Emitted for every measured latency, for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricUpdate {
    pub kind: LatencyKind,
    pub value_ms: u64,
    pub average_ms: u64,
}

/// Stage boundaries of the current turn. Each is written at most once per
/// turn except the user-side marks, which track the latest call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TurnTimestamps {
    pub user_start_speaking: Option<DateTime<Utc>>,
    pub user_stop_speaking: Option<DateTime<Utc>>,
    pub recognition_complete: Option<DateTime<Utc>>,
    pub generation_start: Option<DateTime<Utc>>,
    pub generation_first_token: Option<DateTime<Utc>>,
    pub agent_start_speaking: Option<DateTime<Utc>>,
}

/// Per-session latency bookkeeping: timestamps of the turn in progress plus
/// the append-only sample history used for averages.
pub struct LatencyTracker {
    clock: Arc<dyn Clock>,
    turn: TurnTimestamps,
    turn_index: u64,
    history: [Vec<LatencySample>; 4],
}

impl fmt::Debug for LatencyTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatencyTracker")
            .field("turn", &self.turn)
            .field("turn_index", &self.turn_index)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

impl LatencyTracker {
    /// Creates an empty tracker reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            turn: TurnTimestamps::default(),
            turn_index: 0,
            history: Default::default(),
        }
    }

    pub fn timestamps(&self) -> &TurnTimestamps {
        &self.turn
    }

    pub fn turn_index(&self) -> u64 {
        self.turn_index
    }

    pub fn mark_user_start(&mut self) {
        self.turn.user_start_speaking = Some(self.clock.now());
    }

    pub fn mark_user_stop(&mut self) {
        self.turn.user_stop_speaking = Some(self.clock.now());
    }

    /// Measures STT once per user stop. A later final transcript for the same
    /// stop is a duplicate; a new stop re-arms the measurement.
    pub fn mark_recognition_complete(&mut self) -> Option<MetricUpdate> {
        let now = self.clock.now();
        let stop = self.turn.user_stop_speaking;
        let already_measured = match (stop, self.turn.recognition_complete) {
            (Some(stop), Some(done)) => done >= stop,
            _ => false,
        };
        if already_measured {
            debug!("Final transcript already measured for this user stop");
            return None;
        }
        self.turn.recognition_complete = Some(now);
        match stop {
            Some(stop) => Some(self.record(LatencyKind::Stt, stop, now)),
            None => {
                debug!("Final transcript before user stop, STT latency not measurable");
                None
            }
        }
    }

    pub fn mark_generation_start(&mut self) {
        self.turn.generation_start = Some(self.clock.now());
    }

    /// Only the first token of a turn counts.
    pub fn mark_generation_first_token(&mut self) -> Option<MetricUpdate> {
        if self.turn.generation_first_token.is_some() {
            return None;
        }
        let now = self.clock.now();
        self.turn.generation_first_token = Some(now);
        self.turn
            .generation_start
            .map(|start| self.record(LatencyKind::Llm, start, now))
    }

    /// Measures TTS and TOTAL, at most once per turn.
    pub fn mark_agent_start(&mut self) -> Vec<MetricUpdate> {
        if self.turn.agent_start_speaking.is_some() {
            debug!("Agent start already recorded for this turn");
            return Vec::new();
        }
        let now = self.clock.now();
        self.turn.agent_start_speaking = Some(now);

        let mut updates = Vec::with_capacity(2);
        if let Some(first_token) = self.turn.generation_first_token {
            updates.push(self.record(LatencyKind::Tts, first_token, now));
        }
        if let Some(stop) = self.turn.user_stop_speaking {
            updates.push(self.record(LatencyKind::Total, stop, now));
        }
        updates
    }

    /// Starts the next turn. Sample history is kept.
    pub fn reset(&mut self) {
        self.turn = TurnTimestamps::default();
        self.turn_index += 1;
    }

    /// Drops timestamps and the whole sample history.
    pub fn clear(&mut self) {
        self.turn = TurnTimestamps::default();
        self.turn_index = 0;
        self.history = Default::default();
    }

    pub fn samples(&self, kind: LatencyKind) -> &[LatencySample] {
        &self.history[kind.index()]
    }

    pub fn history(&self) -> impl Iterator<Item = &LatencySample> {
        self.history.iter().flatten()
    }

    /// Mean of all samples of `kind`, rounded to the nearest millisecond; 0 when empty.
    pub fn average(&self, kind: LatencyKind) -> u64 {
        let samples = self.samples(kind);
        if samples.is_empty() {
            return 0;
        }
        let sum: u64 = samples.iter().map(|s| s.value_ms).sum();
        let count = samples.len() as u64;
        (sum + count / 2) / count
    }

    fn record(&mut self, kind: LatencyKind, from: DateTime<Utc>, to: DateTime<Utc>) -> MetricUpdate {
        let elapsed = (to - from).num_milliseconds();
        let value_ms = if elapsed < 0 {
            warn!(%kind, elapsed, "Stage boundaries out of order, clamping latency to 0");
            0
        } else {
            elapsed as u64
        };
        self.history[kind.index()].push(LatencySample {
            kind,
            value_ms,
            turn_index: self.turn_index,
        });
        let average_ms = self.average(kind);
        info!(%kind, value_ms, average_ms, turn = self.turn_index, "Latency measured");
        MetricUpdate {
            kind,
            value_ms,
            average_ms,
        }
    }
}
