//! Session Context and Dispatch Loop
//!
//! One [`Session`] exists per connection. It owns the turn controller, the
//! latency tracker and the media gate, and processes one event to completion
//! before looking at the next. Urgent signals bypass the ordinary queue.

use crate::{
    clock::{Clock, SystemClock},
    events::{SessionEvent, UrgentSignal},
    latency::{LatencyTracker, MetricUpdate},
    media::{MediaBackend, MediaGate},
    turn::{MediaCommand, TurnController, TurnOutcome, TurnState},
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

const PREVIEW_CHARS: usize = 100;

/// Per-session behaviour switches.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Keep the microphone muted until the agent's first utterance has
    /// finished (half-duplex greeting).
    pub gate_mic_until_first_utterance: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            gate_mic_until_first_utterance: true,
        }
    }
}

/// Everything one connection needs: the turn controller, the latency tracker
/// and the media gate, plus optional outlets for metrics and turn state.
pub struct Session<B> {
    config: SessionConfig,
    turn: TurnController,
    latency: LatencyTracker,
    media: MediaGate<B>,
    clock: Arc<dyn Clock>,
    metrics_tx: Option<mpsc::UnboundedSender<MetricUpdate>>,
    state_tx: Option<watch::Sender<TurnState>>,
}

impl<B: MediaBackend> Session<B> {
    /// Creates a session on the system clock.
    pub fn new(config: SessionConfig, backend: B) -> Self {
        Self::with_clock(config, backend, Arc::new(SystemClock))
    }

    pub fn with_clock(config: SessionConfig, backend: B, clock: Arc<dyn Clock>) -> Self {
        let gate_mic = config.gate_mic_until_first_utterance;
        Self {
            turn: TurnController::new(gate_mic),
            latency: LatencyTracker::new(clock.clone()),
            media: MediaGate::new(backend, !gate_mic),
            config,
            clock,
            metrics_tx: None,
            state_tx: None,
        }
    }

    /// Sends a [`MetricUpdate`] for every measured latency.
    pub fn with_metrics(mut self, tx: mpsc::UnboundedSender<MetricUpdate>) -> Self {
        self.metrics_tx = Some(tx);
        self
    }

    /// Publishes the turn state after every processed event.
    pub fn with_state_watch(mut self, tx: watch::Sender<TurnState>) -> Self {
        tx.send_replace(self.turn.snapshot());
        self.state_tx = Some(tx);
        self
    }

    pub fn turn_state(&self) -> TurnState {
        self.turn.snapshot()
    }

    pub fn latency(&self) -> &LatencyTracker {
        &self.latency
    }

    pub fn media(&self) -> &MediaGate<B> {
        &self.media
    }

    /// Processes one ordinary event to completion.
    pub fn handle_event(&mut self, event: SessionEvent) {
        debug!(event = event.name(), "Session event");
        match event {
            SessionEvent::Connected => {
                info!("Transport connected, starting a fresh session");
                self.reset();
            }
            SessionEvent::Disconnected => {
                info!("Transport disconnected, discarding session state");
                self.reset();
            }
            SessionEvent::BotReady => info!("Bot ready"),
            SessionEvent::TrackStarted(handle) => {
                self.media.execute(MediaCommand::BindTrack(handle));
            }
            SessionEvent::UserStartedSpeaking => {
                let outcome = self.turn.user_started_speaking();
                self.latency.mark_user_start();
                self.apply(outcome);
            }
            SessionEvent::UserStoppedSpeaking => {
                let outcome = self.turn.user_stopped_speaking();
                self.latency.mark_user_stop();
                self.apply(outcome);
            }
            SessionEvent::UserTranscript { text, is_final } => {
                if is_final {
                    info!(text = %preview(&text), "User transcript");
                    if let Some(update) = self.latency.mark_recognition_complete() {
                        self.emit(update);
                    }
                } else {
                    debug!(text = %preview(&text), "Interim transcript");
                }
            }
            SessionEvent::BotLlmStarted => {
                info!("LLM response start");
                self.latency.mark_generation_start();
            }
            SessionEvent::BotLlmText { text } => {
                debug!(text = %preview(&text), "Assistant chunk");
                if let Some(update) = self.latency.mark_generation_first_token() {
                    self.emit(update);
                }
            }
            SessionEvent::BotLlmStopped => debug!("LLM response end"),
            SessionEvent::BotStartedSpeaking => {
                let outcome = self.turn.agent_started_speaking();
                for update in self.latency.mark_agent_start() {
                    self.emit(update);
                }
                self.apply(outcome);
            }
            SessionEvent::BotStoppedSpeaking => {
                let outcome = self.turn.agent_stopped_speaking();
                self.apply(outcome);
            }
        }
        self.publish_state();
    }

    pub fn handle_urgent(&mut self, signal: UrgentSignal) {
        match signal {
            UrgentSignal::Interrupt => {
                let outcome = self.turn.urgent_interrupt();
                self.apply(outcome);
            }
        }
        self.publish_state();
    }

    /// Runs the dispatch loop until both channels are closed, then hands the
    /// session back. Urgent signals always win over queued ordinary events.
    pub async fn run(
        mut self,
        mut urgent_rx: mpsc::Receiver<UrgentSignal>,
        mut events_rx: mpsc::Receiver<SessionEvent>,
    ) -> Self {
        loop {
            tokio::select! {
                biased;
                Some(signal) = urgent_rx.recv() => self.handle_urgent(signal),
                Some(event) = events_rx.recv() => self.handle_event(event),
                else => break,
            }
        }
        info!("Session event channels closed, dispatch loop finished");
        self
    }

    fn apply(&mut self, outcome: TurnOutcome) {
        if outcome.utterance_closed {
            self.latency.reset();
        }
        for command in outcome.commands {
            self.media.execute(command);
        }
    }

    fn emit(&self, update: MetricUpdate) {
        if let Some(tx) = &self.metrics_tx {
            if tx.send(update).is_err() {
                warn!("Failed to publish metric update: receiver dropped.");
            }
        }
    }

    fn publish_state(&self) {
        if let Some(tx) = &self.state_tx {
            tx.send_replace(self.turn.snapshot());
        }
    }

    fn reset(&mut self) {
        let gate_mic = self.config.gate_mic_until_first_utterance;
        self.turn = TurnController::new(gate_mic);
        self.latency = LatencyTracker::new(self.clock.clone());
        self.media.release(!gate_mic);
    }
}

/// Shortens text for log lines.
fn preview(text: &str) -> String {
    let flat = text.replace('\n', " ");
    match flat.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}…", &flat[..cut]),
        None => flat,
    }
}
