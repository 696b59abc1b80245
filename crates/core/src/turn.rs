//! Turn-Taking State Machine
//!
//! Decides whose audio is live and when the agent's output must be cut off or
//! brought back. Interruption arrives two ways, a local barge-in (the user
//! starts talking over the agent) and a server-pushed urgent signal; both end
//! in the same `Interrupt` command so the media side has one entry point.

use crate::events::MediaHandle;
use serde::Serialize;
use tracing::{debug, info};

/// Commands the controller (and the session, for track arrivals) hands to `MediaGate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaCommand {
    /// Enable or mute the local microphone.
    SetMicTransmit(bool),
    /// Pause and silence the agent's output.
    Interrupt,
    /// Undo a previous `Interrupt`.
    Resume,
    /// Wire a newly arrived track into the gate.
    BindTrack(MediaHandle),
}

/// Who holds the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Idle,
    UserTurn,
    AgentTurn,
    AgentTurnInterrupted,
}

/// Flat view of the turn state, for observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TurnState {
    pub phase: TurnPhase,
    pub user_speaking: bool,
    pub agent_speaking: bool,
    pub interrupted: bool,
    /// The agent started an utterance and has not reported its end yet.
    pub agent_utterance_open: bool,
    pub first_agent_utterance_done: bool,
    pub mic_transmit_enabled: bool,
}

/// Result of feeding one event to the controller.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub commands: Vec<MediaCommand>,
    /// The agent's current utterance ended; the turn's timestamps are stale.
    pub utterance_closed: bool,
}

impl TurnOutcome {
    fn none() -> Self {
        Self::default()
    }
}

/// Turn-taking state for one session.
///
/// Every handler is synchronous and returns the media commands to run; the
/// controller itself never touches a track.
#[derive(Debug)]
pub struct TurnController {
    phase: TurnPhase,
    /// An `Interrupt` went out and no `Resume` has followed it.
    playback_suppressed: bool,
    /// Set by the agent's start, cleared only by its stop. Survives barge-in
    /// and urgent interrupts.
    agent_utterance_open: bool,
    first_agent_utterance_done: bool,
    mic_transmit_enabled: bool,
    gate_mic: bool,
}

impl TurnController {
    /// Creates a controller in `Idle`. With `gate_mic` the microphone stays
    /// muted until the agent's first utterance has finished.
    pub fn new(gate_mic: bool) -> Self {
        Self {
            phase: TurnPhase::Idle,
            playback_suppressed: false,
            agent_utterance_open: false,
            first_agent_utterance_done: false,
            mic_transmit_enabled: !gate_mic,
            gate_mic,
        }
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn snapshot(&self) -> TurnState {
        TurnState {
            phase: self.phase,
            user_speaking: self.phase == TurnPhase::UserTurn,
            agent_speaking: self.phase == TurnPhase::AgentTurn,
            interrupted: self.playback_suppressed,
            agent_utterance_open: self.agent_utterance_open,
            first_agent_utterance_done: self.first_agent_utterance_done,
            mic_transmit_enabled: self.mic_transmit_enabled,
        }
    }

    /// Local voice activity. Over a speaking agent this is a barge-in.
    pub fn user_started_speaking(&mut self) -> TurnOutcome {
        let mut outcome = TurnOutcome::none();
        match self.phase {
            TurnPhase::AgentTurn => {
                info!("User barged in over the agent");
                outcome.commands.push(self.interrupt());
            }
            TurnPhase::UserTurn => debug!("Duplicate user-started-speaking"),
            TurnPhase::Idle | TurnPhase::AgentTurnInterrupted => {}
        }
        self.phase = TurnPhase::UserTurn;
        outcome
    }

    pub fn user_stopped_speaking(&mut self) -> TurnOutcome {
        match self.phase {
            TurnPhase::UserTurn => self.phase = TurnPhase::Idle,
            other => debug!(phase = ?other, "user-stopped-speaking outside a user turn, ignored"),
        }
        TurnOutcome::none()
    }

    pub fn agent_started_speaking(&mut self) -> TurnOutcome {
        let mut outcome = TurnOutcome::none();
        match self.phase {
            TurnPhase::AgentTurn => {
                debug!("Duplicate bot-started-speaking");
                return outcome;
            }
            TurnPhase::UserTurn => {
                debug!("Agent started while the user held the floor; treating the user turn as over");
            }
            TurnPhase::Idle | TurnPhase::AgentTurnInterrupted => {}
        }
        if self.playback_suppressed {
            info!("Agent started a new utterance after an interruption, resuming playback");
            self.playback_suppressed = false;
            outcome.commands.push(MediaCommand::Resume);
        }
        self.phase = TurnPhase::AgentTurn;
        self.agent_utterance_open = true;
        outcome
    }

    /// Closes the agent's utterance. The stop of a cut-off utterance may
    /// arrive late, after the user has taken or even finished their turn; it
    /// still closes the utterance without touching the user's phase.
    pub fn agent_stopped_speaking(&mut self) -> TurnOutcome {
        let mut outcome = TurnOutcome::none();
        match self.phase {
            TurnPhase::AgentTurn | TurnPhase::AgentTurnInterrupted => {
                self.phase = TurnPhase::Idle;
            }
            TurnPhase::UserTurn | TurnPhase::Idle if self.agent_utterance_open => {
                debug!(phase = ?self.phase, "Late bot-stopped-speaking closes the cut-off utterance");
            }
            other => {
                debug!(phase = ?other, "bot-stopped-speaking with no open utterance, ignored");
                return outcome;
            }
        }
        self.agent_utterance_open = false;
        outcome.utterance_closed = true;

        if !self.first_agent_utterance_done {
            self.first_agent_utterance_done = true;
            if self.gate_mic {
                info!("First agent utterance finished, opening the microphone");
                self.mic_transmit_enabled = true;
                outcome.commands.push(MediaCommand::SetMicTransmit(true));
            }
        }
        outcome
    }

    /// Urgent out-of-band interrupt. Always issues `Interrupt`, even when
    /// nothing is playing; the gate treats the repeat as a no-op.
    pub fn urgent_interrupt(&mut self) -> TurnOutcome {
        info!(phase = ?self.phase, "Urgent interrupt received");
        let mut outcome = TurnOutcome::none();
        outcome.commands.push(self.interrupt());
        self.phase = TurnPhase::AgentTurnInterrupted;
        outcome
    }

    fn interrupt(&mut self) -> MediaCommand {
        self.playback_suppressed = true;
        MediaCommand::Interrupt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(outcomes: &[TurnOutcome], cmd: &MediaCommand) -> usize {
        outcomes
            .iter()
            .flat_map(|o| o.commands.iter())
            .filter(|c| *c == cmd)
            .count()
    }

    #[test]
    fn test_barge_in_interrupts_once_and_does_not_resume() {
        let mut turn = TurnController::new(true);
        let outcomes = vec![
            turn.agent_started_speaking(),
            turn.user_started_speaking(),
            turn.agent_stopped_speaking(),
            turn.user_stopped_speaking(),
        ];
        assert_eq!(count(&outcomes, &MediaCommand::Interrupt), 1);
        assert_eq!(count(&outcomes, &MediaCommand::Resume), 0);
        assert!(turn.snapshot().interrupted);

        let next = turn.agent_started_speaking();
        assert_eq!(next.commands, vec![MediaCommand::Resume]);
        assert!(!turn.snapshot().interrupted);
    }

    #[test]
    fn test_interrupt_never_leaves_both_parties_speaking() {
        let mut turn = TurnController::new(false);
        turn.agent_started_speaking();
        turn.user_started_speaking();
        let state = turn.snapshot();
        assert!(state.user_speaking);
        assert!(!state.agent_speaking);

        turn.agent_started_speaking();
        turn.urgent_interrupt();
        let state = turn.snapshot();
        assert!(!state.agent_speaking);
        assert!(!state.user_speaking);
        assert_eq!(state.phase, TurnPhase::AgentTurnInterrupted);
    }

    #[test]
    fn test_mic_gate_fires_exactly_once() {
        let mut turn = TurnController::new(true);
        assert!(!turn.snapshot().mic_transmit_enabled);

        let mut outcomes = Vec::new();
        for _ in 0..3 {
            outcomes.push(turn.agent_started_speaking());
            outcomes.push(turn.agent_stopped_speaking());
        }
        assert_eq!(count(&outcomes, &MediaCommand::SetMicTransmit(true)), 1);
        assert!(turn.snapshot().first_agent_utterance_done);
        assert!(turn.snapshot().mic_transmit_enabled);
    }

    #[test]
    fn test_mic_gate_disabled_issues_nothing() {
        let mut turn = TurnController::new(false);
        assert!(turn.snapshot().mic_transmit_enabled);
        turn.agent_started_speaking();
        let outcome = turn.agent_stopped_speaking();
        assert!(outcome.commands.is_empty());
        assert!(outcome.utterance_closed);
        assert!(turn.snapshot().first_agent_utterance_done);
    }

    #[test]
    fn test_urgent_interrupt_when_silent_still_issues_interrupt() {
        let mut turn = TurnController::new(true);
        let outcome = turn.urgent_interrupt();
        assert_eq!(outcome.commands, vec![MediaCommand::Interrupt]);
        let outcome = turn.urgent_interrupt();
        assert_eq!(outcome.commands, vec![MediaCommand::Interrupt]);
    }

    #[test]
    fn test_stray_events_are_clamped() {
        let mut turn = TurnController::new(true);
        let outcome = turn.agent_stopped_speaking();
        assert_eq!(outcome, TurnOutcome::default());
        assert!(!turn.snapshot().first_agent_utterance_done);

        turn.user_stopped_speaking();
        assert_eq!(turn.phase(), TurnPhase::Idle);

        turn.agent_started_speaking();
        assert!(turn.agent_started_speaking().commands.is_empty());
        assert_eq!(turn.phase(), TurnPhase::AgentTurn);
    }

    #[test]
    fn test_interrupted_greeting_still_opens_mic() {
        let mut turn = TurnController::new(true);
        turn.agent_started_speaking();
        turn.user_started_speaking();
        let outcome = turn.agent_stopped_speaking();
        assert!(outcome.utterance_closed);
        assert_eq!(outcome.commands, vec![MediaCommand::SetMicTransmit(true)]);
        assert_eq!(turn.phase(), TurnPhase::UserTurn);
        assert!(!turn.snapshot().agent_utterance_open);
    }

    #[test]
    fn test_urgent_then_user_start_keeps_utterance_open() {
        let mut turn = TurnController::new(true);
        turn.agent_started_speaking();
        turn.urgent_interrupt();
        turn.user_started_speaking();
        assert!(turn.snapshot().agent_utterance_open);

        let outcome = turn.agent_stopped_speaking();
        assert!(outcome.utterance_closed);
        assert_eq!(outcome.commands, vec![MediaCommand::SetMicTransmit(true)]);
        assert_eq!(turn.phase(), TurnPhase::UserTurn);
    }

    #[test]
    fn test_late_agent_stop_after_user_turn_closes_utterance() {
        let mut turn = TurnController::new(false);
        turn.agent_started_speaking();
        turn.user_started_speaking();
        turn.user_stopped_speaking();
        assert_eq!(turn.phase(), TurnPhase::Idle);

        let outcome = turn.agent_stopped_speaking();
        assert!(outcome.utterance_closed);
        assert_eq!(turn.phase(), TurnPhase::Idle);

        // A second stop for the same utterance is stray.
        assert_eq!(turn.agent_stopped_speaking(), TurnOutcome::default());
    }

    #[test]
    fn test_phase_serializes_as_plain_string() {
        let state = TurnController::new(true).snapshot();
        let value = serde_json::to_value(state).unwrap();
        assert_eq!(value["phase"], "idle");
    }
}
