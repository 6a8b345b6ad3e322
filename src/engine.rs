//! Round state machine and session engine
//!
//! This module contains the engine that owns a session: it moves rounds
//! through their phases, charges virtual time, classifies answers, commits
//! outcomes to the ledger and drives the wall-clock alarm. Every operation
//! returns synchronously and leaves the state untouched when it is refused.

use std::time::Duration;

use derive_where::derive_where;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    AlarmMessage,
    clock::{AppliedDelta, ClockSource, VirtualClock, accept_delta_ms, next_sub_tick},
    constants::clock::FRAME_MS,
    exercise::{
        config::{ConfigurationError, SessionConfig},
        round::RoundSpec,
    },
    ledger::{Ledger, Outcome, OutcomeKind},
    session::{HighscoreStore, MemoryHighscores, Presenter},
    snapshot::Snapshot,
};

/// Phase of the round state machine
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No round started yet
    #[default]
    #[display("idle")]
    Idle,
    /// Countdown running, awaiting input
    #[display("active")]
    Active,
    /// Outcome classified, awaiting advance
    #[display("resolved")]
    Resolved,
    /// All rounds consumed or the session ran out of time
    #[display("finished")]
    Finished,
}

/// Why a session reached [`Phase::Finished`]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The last round was left through `advance`
    #[display("completed")]
    Completed,
    /// The session-wide time limit was reached
    #[display("time up")]
    TimeUp,
}

/// Engine operations that depend on the current phase
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Arming the current round
    #[display("arm")]
    Arm,
    /// Submitting an answer
    #[display("submit")]
    Submit,
    /// Charging a raw time delta
    #[display("tick")]
    Tick,
    /// Leaving a resolved round
    #[display("advance")]
    Advance,
    /// Registering the wall-clock driver
    #[display("resume")]
    Resume,
}

/// Reasons a user action or time source was absorbed without effect
#[derive(Error, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The operation is not permitted in the current phase
    #[error("{operation} is not allowed while {phase}")]
    InvalidTransition {
        /// The refused operation
        operation: Operation,
        /// The phase it was attempted in
        phase: Phase,
    },
    /// The round has to be armed before it accepts an answer
    #[error("the round must be armed before answering")]
    NotArmed,
    /// The answer is not among the options of the current round
    #[error("{0} is not an option of the current round")]
    UnknownOption(String),
    /// Another time source currently drives the session
    #[error("another clock source is driving the session")]
    ClockDesync,
}

/// The mutable root of a session
#[serde_with::serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Position of the current round in play order
    current_index: usize,
    /// Effective budget of the current round
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    budget: Duration,
    /// Countdown of the current round
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    remaining: Duration,
    /// Phase of the state machine
    phase: Phase,
    /// Whether the current round has been armed
    armed: bool,
    /// Most recent outcome
    last_outcome: Option<Outcome>,
    /// Score and counters
    ledger: Ledger,
    /// Virtual time accounting and driver registration
    clock: VirtualClock,
    /// Set once the session is finished
    finish_reason: Option<FinishReason>,
    /// Best stored score for the exercise
    highscore: Option<i64>,
    /// Whether this session set the best score
    new_highscore: bool,
}

impl SessionState {
    fn fresh(highscore: Option<i64>) -> Self {
        Self {
            highscore,
            ..Self::default()
        }
    }

    fn change_phase(&mut self, before: Phase, after: Phase) -> bool {
        if self.phase == before {
            self.phase = after;

            true
        } else {
            false
        }
    }

    /// Position of the current round
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Effective budget of the current round
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Countdown of the current round
    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    /// Phase of the state machine
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the current round has been armed
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Most recent outcome
    pub fn last_outcome(&self) -> Option<&Outcome> {
        self.last_outcome.as_ref()
    }

    /// Score and counters
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Virtual time accounting
    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    /// Why the session finished, if it has
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    /// Best stored score for the exercise
    pub fn highscore(&self) -> Option<i64> {
        self.highscore
    }

    /// Whether this session set the best score
    pub fn is_new_highscore(&self) -> bool {
        self.new_highscore
    }
}

/// A single exercise session
///
/// The engine exclusively owns its [`SessionState`]. Presentation layers read
/// it through [`Engine::snapshot`] and change it only through the operations
/// below.
#[derive_where(Debug)]
pub struct Engine<H = MemoryHighscores> {
    /// Loaded configuration
    config: SessionConfig,
    /// Mutable session state
    state: SessionState,
    /// Identifies the live wall-clock alarm chain
    generation: u64,
    /// When the last accepted wall-clock alarm fired
    last_fired: Option<web_time::Instant>,
    /// Where best scores are kept
    #[derive_where(skip)]
    store: H,
}

impl Engine {
    /// Creates an engine with an in-memory highscore store
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the configuration violates a limit.
    pub fn new(config: SessionConfig) -> Result<Self, ConfigurationError> {
        Self::with_store(config, MemoryHighscores::default())
    }

    /// Creates an engine from a JSON configuration document
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the document cannot be parsed or
    /// violates a limit.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        Self::new(SessionConfig::from_json(json)?)
    }
}

impl<H: HighscoreStore> Engine<H> {
    /// Creates an engine that keeps best scores in `store`
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the configuration violates a limit.
    pub fn with_store(config: SessionConfig, store: H) -> Result<Self, ConfigurationError> {
        let config = config.checked()?;
        let state = SessionState::fresh(store.load(&config.storage().highscore_key));

        Ok(Self {
            config,
            state,
            generation: 0,
            last_fired: None,
            store,
        })
    }

    /// The loaded configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The current session state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The highscore store
    pub fn store(&self) -> &H {
        &self.store
    }

    fn current_round(&self) -> Option<&RoundSpec> {
        self.config.rounds().get(self.state.current_index)
    }

    fn reject(&self, operation: Operation) -> Rejection {
        log::debug!("{operation} ignored while {}", self.state.phase);

        Rejection::InvalidTransition {
            operation,
            phase: self.state.phase,
        }
    }

    fn refuse_scripted(&self) -> Rejection {
        log::warn!("scripted time refused while the wall clock drives the session");

        Rejection::ClockDesync
    }

    /// Starts the first round
    ///
    /// Calling it outside [`Phase::Idle`] has no effect.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::NoRounds`] if there is nothing to play.
    pub fn start(&mut self) -> Result<(), ConfigurationError> {
        if self.config.is_empty() {
            log::info!("cannot start a session without rounds");
            return Err(ConfigurationError::NoRounds);
        }

        if self.state.phase != Phase::Idle {
            log::debug!("start ignored while {}", self.state.phase);
            return Ok(());
        }

        log::info!("starting session with {} rounds", self.config.len());
        self.enter_round(0);

        Ok(())
    }

    fn enter_round(&mut self, index: usize) {
        let budget = self
            .config
            .round_budget(index)
            .unwrap_or_else(|| self.config.timing().default_round());

        self.state.current_index = index;
        self.state.budget = budget;
        self.state.remaining = budget;
        self.state.armed = false;
        self.state.last_outcome = None;
        self.state.phase = Phase::Active;
    }

    /// Arms the current round so that it accepts an answer
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::InvalidTransition`] outside [`Phase::Active`].
    pub fn arm(&mut self) -> Result<(), Rejection> {
        if self.state.phase != Phase::Active {
            return Err(self.reject(Operation::Arm));
        }

        self.state.armed = true;

        Ok(())
    }

    /// Submits an answer for the current round
    ///
    /// The answer is trimmed and compared exactly with the expected answer.
    /// The round resolves as correct or wrong and the ledger is updated in
    /// the same step.
    ///
    /// # Errors
    ///
    /// * [`Rejection::InvalidTransition`] outside [`Phase::Active`], which
    ///   covers duplicate clicks after the round resolved
    /// * [`Rejection::NotArmed`] if the rules require arming first
    /// * [`Rejection::UnknownOption`] if the round lists options and the
    ///   answer is not one of them
    pub fn submit(&mut self, answer: &str) -> Result<Outcome, Rejection> {
        if self.state.phase != Phase::Active {
            return Err(self.reject(Operation::Submit));
        }

        if self.config.rules().arm_before_answer && !self.state.armed {
            log::debug!("answer ignored before arming");
            return Err(Rejection::NotArmed);
        }

        let answer = answer.trim();
        let Some(round) = self.current_round() else {
            return Err(self.reject(Operation::Submit));
        };

        if !round.accepts(answer) {
            log::debug!("answer {answer:?} is not an option of round {}", round.id());
            return Err(Rejection::UnknownOption(answer.to_owned()));
        }

        let kind = if round.is_correct(answer) {
            OutcomeKind::Correct
        } else {
            OutcomeKind::Wrong
        };

        Ok(self.resolve(kind, Some(answer.to_owned())))
    }

    fn resolve(&mut self, kind: OutcomeKind, answer: Option<String>) -> Outcome {
        let streak = self.state.ledger.next_streak(kind);
        let outcome = Outcome {
            kind,
            round_index: self.state.current_index,
            round_id: self
                .current_round()
                .map(|round| round.id().to_owned())
                .unwrap_or_default(),
            delta: self.config.scoring().points(kind, streak),
            answer,
            time_used: self.state.budget.saturating_sub(self.state.remaining),
        };

        self.state.ledger = self
            .state
            .ledger
            .apply(&outcome, self.config.rules().allow_negative_score);
        self.state.last_outcome = Some(outcome.clone());
        self.state.change_phase(Phase::Active, Phase::Resolved);

        outcome
    }

    /// Leaves a resolved round
    ///
    /// Enters the next round, or finishes the session and commits the
    /// completion bonus if this was the last one.
    ///
    /// # Returns
    ///
    /// The phase after the call.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::InvalidTransition`] outside [`Phase::Resolved`].
    pub fn advance(&mut self) -> Result<Phase, Rejection> {
        if self.state.phase != Phase::Resolved {
            return Err(self.reject(Operation::Advance));
        }

        let next = self.state.current_index + 1;
        if next < self.config.len() {
            self.enter_round(next);
        } else {
            self.finish(FinishReason::Completed);
        }

        Ok(self.state.phase)
    }

    fn finish(&mut self, reason: FinishReason) {
        if !self.state.change_phase(Phase::Resolved, Phase::Finished) {
            return;
        }

        if reason == FinishReason::Completed {
            self.state.ledger = self.state.ledger.apply_completion_bonus(
                self.config.scoring().completion_bonus(),
                self.config.rules().allow_negative_score,
            );
        }
        self.state.finish_reason = Some(reason);
        self.record_highscore();
        self.stop_wall_clock();

        log::info!(
            "session finished ({reason}) with score {}",
            self.state.ledger.score()
        );
    }

    fn record_highscore(&mut self) {
        let key = &self.config.storage().highscore_key;
        let score = self.state.ledger.score();
        let previous = self.store.load(key);

        if score > previous.unwrap_or(0) {
            self.store.save(key, score);
            self.state.highscore = Some(score);
            self.state.new_highscore = true;
        } else {
            self.state.highscore = previous;
        }
    }

    fn session_left(&self) -> Option<Duration> {
        self.config
            .timing()
            .total_limit()
            .map(|limit| limit.saturating_sub(self.state.clock.elapsed()))
    }

    fn budgets(&self) -> impl Iterator<Item = Duration> {
        std::iter::once(self.state.remaining).chain(self.session_left())
    }

    /// Charges at most `delta` to the active round
    ///
    /// Resolves the round as a timeout once its countdown or the session
    /// limit reaches zero. Returns the time actually charged.
    fn charge(&mut self, delta: Duration) -> Duration {
        let step = self.budgets().fold(delta, Ord::min);

        self.state.clock.advance(step);
        self.state.remaining = self.state.remaining.saturating_sub(step);

        let time_up = self.session_left().is_some_and(|left| left.is_zero());
        if self.state.remaining.is_zero() || time_up {
            self.resolve(OutcomeKind::Timeout, None);
            if time_up {
                self.finish(FinishReason::TimeUp);
            }
        }

        step
    }

    /// Splits `requested` into bounded sub-ticks and charges them
    ///
    /// Stops as soon as the round leaves [`Phase::Active`]; whatever is left
    /// of the request is discarded rather than carried into the next round.
    fn run_sub_ticks(&mut self, requested: Duration) -> AppliedDelta {
        let frame = Duration::from_millis(FRAME_MS);
        let mut delta = AppliedDelta::none(requested);
        let mut left = requested;

        while self.state.phase == Phase::Active && !left.is_zero() {
            let step = next_sub_tick(left, frame, self.budgets());
            if step.is_zero() {
                break;
            }

            let charged = self.charge(step);
            left = left.saturating_sub(charged);
            delta.applied += charged;
            delta.sub_ticks += 1;
        }

        delta
    }

    /// Charges a raw delta to the active round in one step
    ///
    /// The delta is clamped to what the round and the session have left.
    ///
    /// # Returns
    ///
    /// The time actually charged.
    ///
    /// # Errors
    ///
    /// * [`Rejection::InvalidTransition`] outside [`Phase::Active`]
    /// * [`Rejection::ClockDesync`] while the wall clock is registered
    pub fn tick(&mut self, delta: Duration) -> Result<Duration, Rejection> {
        if self.state.phase != Phase::Active {
            return Err(self.reject(Operation::Tick));
        }

        if !self.state.clock.admit(ClockSource::Scripted) {
            return Err(self.refuse_scripted());
        }

        Ok(self.charge(delta))
    }

    /// Scripted replay driver
    ///
    /// Values that are not positive finite numbers are a no-op. Accepted
    /// time is split into sub-ticks of at most one frame so that one large
    /// jump produces the same transitions as many small ticks.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::ClockDesync`] while the wall clock is registered;
    /// the refusal is also recorded in the snapshot.
    pub fn try_advance_time(&mut self, ms: f64) -> Result<AppliedDelta, Rejection> {
        let Some(requested) = accept_delta_ms(ms) else {
            return Ok(AppliedDelta::default());
        };

        if !self.state.clock.admit(ClockSource::Scripted) {
            return Err(self.refuse_scripted());
        }

        self.state.clock.record_simulated(requested);

        Ok(self.run_sub_ticks(requested))
    }

    /// Same as [`Engine::try_advance_time`], reporting a refusal in the
    /// returned summary instead of as an error
    pub fn advance_time(&mut self, ms: f64) -> AppliedDelta {
        self.try_advance_time(ms).unwrap_or_else(|_| {
            AppliedDelta::refused(accept_delta_ms(ms).unwrap_or_default(), ClockSource::WallClock)
        })
    }

    fn stop_wall_clock(&mut self) -> bool {
        if !self.state.clock.cancel_wall_clock() {
            return false;
        }

        self.generation += 1;
        self.last_fired = None;
        log::debug!("wall clock stopped");

        true
    }

    /// Cancels the wall-clock driver
    ///
    /// Alarms that were already scheduled become stale and are ignored.
    ///
    /// # Returns
    ///
    /// `true` if a wall clock was registered.
    pub fn pause(&mut self) -> bool {
        self.stop_wall_clock()
    }

    /// Registers the wall-clock driver
    ///
    /// Schedules the first [`AlarmMessage::Tick`]. While the wall clock is
    /// registered, scripted time is refused. Calling it again while already
    /// registered has no effect.
    ///
    /// # Arguments
    ///
    /// * `now` - The current wall-clock instant
    /// * `schedule_message` - Function to schedule delayed messages for timing
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::InvalidTransition`] before start and after the
    /// session finished.
    pub fn resume<S: FnMut(AlarmMessage, web_time::Duration)>(
        &mut self,
        now: web_time::Instant,
        mut schedule_message: S,
    ) -> Result<(), Rejection> {
        if !matches!(self.state.phase, Phase::Active | Phase::Resolved) {
            return Err(self.reject(Operation::Resume));
        }

        if !self.state.clock.register_wall_clock() {
            return Ok(());
        }

        self.generation += 1;
        self.last_fired = Some(now);
        log::debug!("wall clock started");

        schedule_message(
            AlarmMessage::Tick {
                generation: self.generation,
            },
            self.config.timing().tick_interval(),
        );

        Ok(())
    }

    /// Handles a scheduled wall-clock alarm
    ///
    /// Alarms from a chain that was paused or restarted are ignored. A live
    /// alarm charges the wall time since the previous one through the same
    /// sub-tick loop as scripted replay, renders the new state and schedules
    /// the next alarm while the wall clock is still registered.
    ///
    /// # Arguments
    ///
    /// * `message` - The alarm message to process
    /// * `now` - The wall-clock instant the alarm fired at
    /// * `schedule_message` - Function to schedule delayed messages for timing
    /// * `presenter` - Receives the state after the alarm
    pub fn receive_alarm<P: Presenter, S: FnMut(AlarmMessage, web_time::Duration)>(
        &mut self,
        message: AlarmMessage,
        now: web_time::Instant,
        mut schedule_message: S,
        presenter: &P,
    ) -> AppliedDelta {
        match message {
            AlarmMessage::Tick { generation } => {
                if generation != self.generation || !self.state.clock.admit(ClockSource::WallClock)
                {
                    log::debug!("stale alarm {generation} ignored");
                    return AppliedDelta::default();
                }

                let requested = self
                    .last_fired
                    .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
                self.last_fired = Some(now);

                let applied = if self.state.phase == Phase::Active {
                    self.run_sub_ticks(requested)
                } else {
                    AppliedDelta::none(requested)
                };

                presenter.render(&self.snapshot());

                if self.state.clock.is_wall_clock_running() {
                    schedule_message(
                        AlarmMessage::Tick {
                            generation: self.generation,
                        },
                        self.config.timing().tick_interval(),
                    );
                }

                applied
            }
        }
    }

    /// Discards the session and returns to [`Phase::Idle`]
    ///
    /// Cancels the wall clock first so that no alarm from the previous play
    /// through can reach the new one. The highscore store is kept.
    pub fn restart(&mut self) {
        self.stop_wall_clock();
        self.generation += 1;
        self.last_fired = None;
        self.state = SessionState::fresh(self.store.load(&self.config.storage().highscore_key));

        log::info!("session restarted");
    }

    /// Reads a snapshot of the session
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.state, &self.config)
    }

    /// JSON text of [`Engine::snapshot`], for test harnesses
    pub fn render_game_to_text(&self) -> String {
        self.snapshot().to_message()
    }
}
