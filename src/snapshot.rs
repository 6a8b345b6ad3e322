//! Snapshot serializer
//!
//! A snapshot is a complete, read-only readout of a session that test
//! harnesses assert on and presentation layers render from. Building one
//! never changes the engine, so two snapshots taken without an engine call
//! in between are equal.

use itertools::Itertools;
use serde::Serialize;
use serde_with::skip_serializing_none;

use crate::{
    clock::whole_millis,
    engine::{FinishReason, Phase, SessionState},
    exercise::config::SessionConfig,
    ledger::{Outcome, OutcomeKind},
};

/// What a snapshot tells about the round in play
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundSummary {
    /// Identifier of the round
    pub id: String,
    /// Effective budget of the round
    pub time_budget_ms: u64,
    /// Selectable options in configuration order
    pub option_ids: Vec<String>,
    /// Expected answer, only present when the rules expose it
    pub correct_option_id: Option<String>,
}

/// Serializable readout of a session
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Phase of the round state machine
    pub phase: Phase,
    /// Position of the current round
    pub round_index: usize,
    /// Number of rounds in the session
    pub total_rounds: usize,
    /// Rounds resolved by an answer
    pub answered_rounds: usize,
    /// Current score
    pub score: i64,
    /// Rounds resolved as correct
    pub correct_count: usize,
    /// Rounds resolved with a wrong answer
    pub wrong_count: usize,
    /// Consecutive correct rounds up to the latest one
    pub streak: usize,
    /// Rounds resolved in any way
    pub reviewed_count: usize,
    /// Share of rounds resolved, in whole percent
    pub progress_percent: u64,
    /// Countdown of the current round
    pub remaining_ms: u64,
    /// Virtual time charged to rounds
    pub elapsed_virtual_ms: u64,
    /// Time requested by scripted replay, surplus included
    pub simulated_ms: u64,
    /// Whether the current round is armed
    pub armed: bool,
    /// Whether a second clock source was refused
    pub clock_desync: bool,
    /// Whether the wall-clock driver is registered
    pub timer_running: bool,
    /// Most recent outcome, for feedback display
    pub last_outcome: Option<Outcome>,
    /// The round in play, absent before start and after finishing
    pub current_round: Option<RoundSummary>,
    /// Best stored score for this exercise
    pub highscore: Option<i64>,
    /// Whether the finished session set a new best score
    pub new_highscore: bool,
    /// Why the session finished
    pub finish_reason: Option<FinishReason>,
    /// Mean time used on answered rounds
    pub average_reaction_ms: Option<u64>,
}

/// Share of `reviewed` in `total`, rounded to whole percent
fn progress_percent(reviewed: usize, total: usize) -> u64 {
    if total == 0 {
        return 0;
    }

    (reviewed as f64 / total as f64 * 100.).round() as u64
}

impl Snapshot {
    /// Reads a snapshot out of a session
    ///
    /// # Arguments
    ///
    /// * `state` - The mutable root of the session
    /// * `config` - The configuration the session was created from
    pub fn capture(state: &SessionState, config: &SessionConfig) -> Self {
        let ledger = state.ledger();
        let clock = state.clock();

        let current_round = matches!(state.phase(), Phase::Active | Phase::Resolved)
            .then(|| config.rounds().get(state.current_index()))
            .flatten()
            .map(|round| RoundSummary {
                id: round.id().to_owned(),
                time_budget_ms: whole_millis(state.budget()),
                option_ids: round
                    .option_ids()
                    .into_iter()
                    .map(str::to_owned)
                    .collect_vec(),
                correct_option_id: config
                    .rules()
                    .expose_answer_key
                    .then(|| round.correct_option_id().to_owned()),
            });

        Self {
            phase: state.phase(),
            round_index: state.current_index(),
            total_rounds: config.len(),
            answered_rounds: ledger.answered_count(),
            score: ledger.score(),
            correct_count: ledger.correct_count(),
            wrong_count: ledger.count(OutcomeKind::Wrong),
            streak: ledger.streak(),
            reviewed_count: ledger.reviewed_count(),
            progress_percent: progress_percent(ledger.reviewed_count(), config.len()),
            remaining_ms: whole_millis(state.remaining()),
            elapsed_virtual_ms: whole_millis(clock.elapsed()),
            simulated_ms: whole_millis(clock.simulated()),
            armed: state.is_armed(),
            clock_desync: clock.desync_detected(),
            timer_running: clock.is_wall_clock_running(),
            last_outcome: state.last_outcome().cloned(),
            current_round,
            highscore: state.highscore(),
            new_highscore: state.is_new_highscore(),
            finish_reason: state.finish_reason(),
            average_reaction_ms: ledger.average_reaction().map(whole_millis),
        }
    }

    /// Converts the snapshot to a JSON string
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}
