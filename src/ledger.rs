//! Scoring ledger
//!
//! This module turns classified round outcomes into points. The scoring
//! rule maps each outcome kind to a point delta, and the ledger is the
//! running aggregate of everything that has been committed so far. A
//! round's contribution is appended once and never revised.

use std::time::Duration;

use enum_map::{Enum, EnumMap};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// The classified result of a resolved round
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The submitted answer matched the expected answer
    #[display("correct")]
    Correct,
    /// The submitted answer did not match
    #[display("wrong")]
    Wrong,
    /// The round budget ran out before an answer was submitted
    #[display("timeout")]
    Timeout,
}

/// Serialization helper for ScoringRule
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
struct ScoringRuleSerde {
    correct: i64,
    wrong: i64,
    timeout: i64,
    completion_bonus: i64,
    streak_bonus: i64,
    streak_bonus_threshold: usize,
}

/// Point deltas for each outcome kind plus the session completion bonus
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ScoringRuleSerde", into = "ScoringRuleSerde")]
pub struct ScoringRule {
    deltas: EnumMap<OutcomeKind, i64>,
    completion_bonus: i64,
    /// Extra points for a correct answer that keeps a streak at or above
    /// the threshold
    streak_bonus: i64,
    /// Streak length that earns the bonus, zero disables it
    streak_bonus_threshold: usize,
}

impl From<ScoringRuleSerde> for ScoringRule {
    fn from(serde: ScoringRuleSerde) -> Self {
        Self::new(
            serde.correct,
            serde.wrong,
            serde.timeout,
            serde.completion_bonus,
        )
        .with_streak_bonus(serde.streak_bonus, serde.streak_bonus_threshold)
    }
}

impl From<ScoringRule> for ScoringRuleSerde {
    fn from(rule: ScoringRule) -> Self {
        Self {
            correct: rule.deltas[OutcomeKind::Correct],
            wrong: rule.deltas[OutcomeKind::Wrong],
            timeout: rule.deltas[OutcomeKind::Timeout],
            completion_bonus: rule.completion_bonus,
            streak_bonus: rule.streak_bonus,
            streak_bonus_threshold: rule.streak_bonus_threshold,
        }
    }
}

impl ScoringRule {
    /// Creates a scoring rule from explicit deltas
    pub fn new(correct: i64, wrong: i64, timeout: i64, completion_bonus: i64) -> Self {
        Self {
            deltas: enum_map::enum_map! {
                OutcomeKind::Correct => correct,
                OutcomeKind::Wrong => wrong,
                OutcomeKind::Timeout => timeout,
            },
            completion_bonus,
            streak_bonus: 0,
            streak_bonus_threshold: 0,
        }
    }

    /// Awards `bonus` extra points for every correct answer that brings the
    /// streak to `threshold` or beyond
    #[must_use]
    pub fn with_streak_bonus(mut self, bonus: i64, threshold: usize) -> Self {
        self.streak_bonus = bonus;
        self.streak_bonus_threshold = threshold;
        self
    }

    /// Point delta for an outcome kind
    pub fn delta(&self, kind: OutcomeKind) -> i64 {
        self.deltas[kind]
    }

    /// Points added once when the last round is left
    pub fn completion_bonus(&self) -> i64 {
        self.completion_bonus
    }

    /// Points for an outcome that leaves the streak at `streak`
    ///
    /// This is the outcome delta plus the streak bonus once the threshold
    /// is reached.
    pub fn points(&self, kind: OutcomeKind, streak: usize) -> i64 {
        let bonus = if self.streak_bonus_threshold > 0 && streak >= self.streak_bonus_threshold {
            self.streak_bonus
        } else {
            0
        };

        self.deltas[kind].saturating_add(bonus)
    }
}

/// The result of one round, created exactly once when it leaves `Active`
#[serde_with::serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Classification
    pub kind: OutcomeKind,
    /// Position of the round in play order
    pub round_index: usize,
    /// Identifier of the round
    pub round_id: String,
    /// Point delta the scoring rule assigns to this outcome, streak bonus
    /// included
    pub delta: i64,
    /// The submitted answer, absent on timeout
    pub answer: Option<String>,
    /// Virtual time the round ran before it was resolved
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub time_used: Duration,
}

impl Outcome {
    /// Whether the round was resolved by an answer rather than by the clock
    pub fn was_answered(&self) -> bool {
        self.kind != OutcomeKind::Timeout
    }
}

/// Running score and counters of a session
#[serde_with::serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    /// Current score
    score: i64,
    /// Number of rounds resolved as correct
    correct_count: usize,
    /// Consecutive correct rounds up to the latest one
    streak: usize,
    /// Longest streak of the session
    best_streak: usize,
    /// Number of rounds resolved in any way
    reviewed_count: usize,
    /// Resolved rounds per outcome kind
    outcome_counts: EnumMap<OutcomeKind, usize>,
    /// Score change committed for each resolved round, in play order
    points_earned: Vec<i64>,
    /// Time spent on rounds resolved by an answer
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    reaction_total: Duration,
    /// Whether the completion bonus has been committed
    bonus_applied: bool,
}

/// Adds `delta` to `score`, flooring at zero when negative scores are off
fn add_points(score: i64, delta: i64, allow_negative: bool) -> i64 {
    let score = score.saturating_add(delta);
    if allow_negative { score } else { score.max(0) }
}

impl Ledger {
    /// Commits one outcome
    ///
    /// # Arguments
    ///
    /// * `outcome` - The outcome of the round that was just resolved
    /// * `allow_negative` - When false the score is floored at zero
    ///
    /// # Returns
    ///
    /// The ledger after the outcome. `self` is left untouched, so the same
    /// input always yields the same result.
    #[must_use]
    pub fn apply(&self, outcome: &Outcome, allow_negative: bool) -> Self {
        let mut next = self.clone();

        next.score = add_points(self.score, outcome.delta, allow_negative);
        next.reviewed_count += 1;
        if outcome.kind == OutcomeKind::Correct {
            next.correct_count += 1;
        }
        next.streak = self.next_streak(outcome.kind);
        next.best_streak = self.best_streak.max(next.streak);
        next.outcome_counts[outcome.kind] += 1;
        next.points_earned.push(next.score - self.score);
        if outcome.was_answered() {
            next.reaction_total += outcome.time_used;
        }

        next
    }

    /// Commits the completion bonus
    ///
    /// Returns an unchanged copy if the bonus was already committed.
    #[must_use]
    pub fn apply_completion_bonus(&self, bonus: i64, allow_negative: bool) -> Self {
        if self.bonus_applied {
            return self.clone();
        }

        Self {
            score: add_points(self.score, bonus, allow_negative),
            bonus_applied: true,
            ..self.clone()
        }
    }

    /// Current score
    pub fn score(&self) -> i64 {
        self.score
    }

    /// Number of rounds resolved as correct
    pub fn correct_count(&self) -> usize {
        self.correct_count
    }

    /// Consecutive correct rounds up to the latest one
    pub fn streak(&self) -> usize {
        self.streak
    }

    /// Longest streak of the session
    pub fn best_streak(&self) -> usize {
        self.best_streak
    }

    /// Streak after committing an outcome of `kind`
    ///
    /// Wrong answers and timeouts break the streak.
    pub fn next_streak(&self, kind: OutcomeKind) -> usize {
        match kind {
            OutcomeKind::Correct => self.streak + 1,
            OutcomeKind::Wrong | OutcomeKind::Timeout => 0,
        }
    }

    /// Number of rounds resolved in any way
    pub fn reviewed_count(&self) -> usize {
        self.reviewed_count
    }

    /// Number of rounds resolved by an answer
    pub fn answered_count(&self) -> usize {
        self.outcome_counts[OutcomeKind::Correct] + self.outcome_counts[OutcomeKind::Wrong]
    }

    /// Number of rounds resolved with the given kind
    pub fn count(&self, kind: OutcomeKind) -> usize {
        self.outcome_counts[kind]
    }

    /// Score change committed for each resolved round
    pub fn points_earned(&self) -> &[i64] {
        &self.points_earned
    }

    /// Whether the completion bonus has been committed
    pub fn bonus_applied(&self) -> bool {
        self.bonus_applied
    }

    /// Mean time used on rounds resolved by an answer
    pub fn average_reaction(&self) -> Option<Duration> {
        u32::try_from(self.answered_count())
            .ok()
            .filter(|count| *count > 0)
            .map(|count| self.reaction_total / count)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn outcome(kind: OutcomeKind, delta: i64, ms: u64) -> Outcome {
        Outcome {
            kind,
            round_index: 0,
            round_id: "r1".to_owned(),
            delta,
            answer: (kind != OutcomeKind::Timeout).then(|| "a".to_owned()),
            time_used: Duration::from_millis(ms),
        }
    }

    #[test]
    fn test_scoring_rule_from_json() {
        let rule: ScoringRule =
            serde_json::from_str(r#"{ "correct": 20, "timeout": -10 }"#).unwrap();

        assert_eq!(rule.delta(OutcomeKind::Correct), 20);
        assert_eq!(rule.delta(OutcomeKind::Wrong), 0);
        assert_eq!(rule.delta(OutcomeKind::Timeout), -10);
        assert_eq!(rule.completion_bonus(), 0);
        assert_eq!(rule, ScoringRule::new(20, 0, -10, 0));

        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "correct": 20,
                "wrong": 0,
                "timeout": -10,
                "completion_bonus": 0,
                "streak_bonus": 0,
                "streak_bonus_threshold": 0
            })
        );
    }

    #[test]
    fn test_streak_bonus_from_threshold() {
        let rule: ScoringRule = serde_json::from_str(
            r#"{ "correct": 10, "streak_bonus": 5, "streak_bonus_threshold": 3 }"#,
        )
        .unwrap();

        assert_eq!(rule, ScoringRule::new(10, 0, 0, 0).with_streak_bonus(5, 3));
        assert_eq!(rule.points(OutcomeKind::Correct, 2), 10);
        assert_eq!(rule.points(OutcomeKind::Correct, 3), 15);
        assert_eq!(rule.points(OutcomeKind::Correct, 7), 15);
        assert_eq!(rule.points(OutcomeKind::Wrong, 0), 0);

        let disabled = ScoringRule::new(10, 0, 0, 0).with_streak_bonus(5, 0);
        assert_eq!(disabled.points(OutcomeKind::Correct, 9), 10);
    }

    #[test]
    fn test_streak_resets_on_wrong_and_timeout() {
        let ledger = Ledger::default()
            .apply(&outcome(OutcomeKind::Correct, 10, 0), true)
            .apply(&outcome(OutcomeKind::Correct, 10, 0), true);
        assert_eq!(ledger.streak(), 2);
        assert_eq!(ledger.next_streak(OutcomeKind::Correct), 3);

        let ledger = ledger.apply(&outcome(OutcomeKind::Wrong, 0, 0), true);
        assert_eq!(ledger.streak(), 0);

        let ledger = ledger
            .apply(&outcome(OutcomeKind::Correct, 10, 0), true)
            .apply(&outcome(OutcomeKind::Timeout, 0, 0), true);
        assert_eq!(ledger.streak(), 0);
        assert_eq!(ledger.best_streak(), 2);
    }

    #[test]
    fn test_apply_updates_counters() {
        let ledger = Ledger::default()
            .apply(&outcome(OutcomeKind::Correct, 20, 1_000), true)
            .apply(&outcome(OutcomeKind::Wrong, -5, 3_000), true)
            .apply(&outcome(OutcomeKind::Timeout, -10, 10_000), true);

        assert_eq!(ledger.score(), 5);
        assert_eq!(ledger.correct_count(), 1);
        assert_eq!(ledger.reviewed_count(), 3);
        assert_eq!(ledger.answered_count(), 2);
        assert_eq!(ledger.count(OutcomeKind::Timeout), 1);
        assert_eq!(ledger.points_earned(), &[20, -5, -10]);
        assert_eq!(ledger.average_reaction(), Some(Duration::from_millis(2_000)));
    }

    #[test]
    fn test_apply_is_pure() {
        let ledger = Ledger::default().apply(&outcome(OutcomeKind::Correct, 20, 0), true);
        let event = outcome(OutcomeKind::Wrong, -5, 0);

        let first = ledger.apply(&event, true);
        let second = ledger.apply(&event, true);

        assert_eq!(first, second);
        assert_eq!(ledger.score(), 20);
        assert_eq!(ledger.reviewed_count(), 1);
    }

    #[test]
    fn test_floor_at_zero() {
        let floored = Ledger::default()
            .apply(&outcome(OutcomeKind::Correct, 3, 0), false)
            .apply(&outcome(OutcomeKind::Wrong, -5, 0), false);
        assert_eq!(floored.score(), 0);
        assert_eq!(floored.points_earned(), &[3, -3]);

        let negative = Ledger::default().apply(&outcome(OutcomeKind::Wrong, -5, 0), true);
        assert_eq!(negative.score(), -5);
    }

    #[test]
    fn test_completion_bonus_once() {
        let ledger = Ledger::default()
            .apply_completion_bonus(15, true)
            .apply_completion_bonus(15, true);

        assert_eq!(ledger.score(), 15);
        assert!(ledger.bonus_applied());
        assert!(ledger.points_earned().is_empty());
    }

    #[test]
    fn test_average_reaction_without_answers() {
        let ledger = Ledger::default().apply(&outcome(OutcomeKind::Timeout, 0, 5_000), true);
        assert_eq!(ledger.average_reaction(), None);
    }
}
