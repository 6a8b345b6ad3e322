//! Session configuration
//!
//! This module defines the JSON document an exercise is loaded from: the
//! ordered round list, timing defaults, scoring deltas, rule switches and
//! storage settings. Everything optional falls back to the defaults in
//! [`crate::constants`].

use std::time::Duration;

use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use thiserror::Error;

use crate::{
    constants::{
        clock::{DEFAULT_TICK_MS, MAX_TICK_MS, MAX_TOTAL_MS, MIN_TICK_MS},
        round::{DEFAULT_TIME_BUDGET_MS, MAX_TIME_BUDGET_MS, MIN_TIME_BUDGET_MS},
        session::{DEFAULT_HIGHSCORE_KEY, MAX_ROUNDS_COUNT, MAX_STORAGE_KEY_LENGTH},
    },
    ledger::ScoringRule,
};

use super::{
    common::{validate_optional_duration_ms, validate_rounds},
    round::RoundSpec,
};

/// Errors that make a session impossible to play
#[derive(Error, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The document is not valid JSON or does not have the expected shape
    #[error("configuration could not be parsed: {0}")]
    Parse(String),
    /// The document parsed but violates a limit
    #[error("configuration is invalid: {0}")]
    Invalid(String),
    /// There is nothing to play
    #[error("configuration contains no rounds")]
    NoRounds,
}

/// Timing defaults for a session
#[serde_with::serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Budget for rounds that do not set their own
    #[serde_as(as = "Option<serde_with::DurationMilliSeconds<u64>>")]
    default_round_ms: Option<Duration>,
    /// Interval of the wall-clock alarm
    #[serde_as(as = "Option<serde_with::DurationMilliSeconds<u64>>")]
    tick_ms: Option<Duration>,
    /// Session-wide limit on charged virtual time
    #[serde_as(as = "Option<serde_with::DurationMilliSeconds<u64>>")]
    total_ms: Option<Duration>,
}

impl Timing {
    /// Sets the default round budget
    #[must_use]
    pub fn with_default_round(mut self, budget: Duration) -> Self {
        self.default_round_ms = Some(budget);
        self
    }

    /// Sets the session-wide time limit
    #[must_use]
    pub fn with_total_limit(mut self, limit: Duration) -> Self {
        self.total_ms = Some(limit);
        self
    }

    /// Budget for rounds that do not set their own
    pub fn default_round(&self) -> Duration {
        self.default_round_ms
            .unwrap_or(Duration::from_millis(DEFAULT_TIME_BUDGET_MS))
    }

    /// Interval of the recurring wall-clock alarm
    pub fn tick_interval(&self) -> Duration {
        self.tick_ms
            .unwrap_or(Duration::from_millis(DEFAULT_TICK_MS))
    }

    /// Session-wide limit, if any
    pub fn total_limit(&self) -> Option<Duration> {
        self.total_ms
    }
}

/// Checks every timing value against its bounds
fn validate_timing(timing: &Timing, _ctx: &()) -> garde::Result {
    validate_optional_duration_ms::<MIN_TIME_BUDGET_MS, MAX_TIME_BUDGET_MS>(
        timing.default_round_ms.as_ref(),
    )
    .map_err(|e| garde::Error::new(format!("default_round_ms {e}")))?;
    validate_optional_duration_ms::<MIN_TICK_MS, MAX_TICK_MS>(timing.tick_ms.as_ref())
        .map_err(|e| garde::Error::new(format!("tick_ms {e}")))?;
    validate_optional_duration_ms::<1, MAX_TOTAL_MS>(timing.total_ms.as_ref())
        .map_err(|e| garde::Error::new(format!("total_ms {e}")))
}

/// Rule switches that differ between exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rules {
    /// When false the score is floored at zero after every change
    pub allow_negative_score: bool,
    /// Whether snapshots reveal the expected answer of the current round
    pub expose_answer_key: bool,
    /// Whether a round must be armed before an answer is accepted
    pub arm_before_answer: bool,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            allow_negative_score: true,
            expose_answer_key: false,
            arm_before_answer: false,
        }
    }
}

/// Where results are remembered between sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Storage {
    /// Key under which the best score is stored
    #[garde(length(chars, min = 1, max = MAX_STORAGE_KEY_LENGTH))]
    pub highscore_key: String,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            highscore_key: DEFAULT_HIGHSCORE_KEY.to_owned(),
        }
    }
}

/// A complete exercise configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct SessionConfig {
    /// Rounds in play order
    #[garde(length(max = MAX_ROUNDS_COUNT), dive, custom(|v: &Vec<RoundSpec>, _: &()| validate_rounds(v, &())))]
    #[serde(default)]
    rounds: Vec<RoundSpec>,
    /// Timing defaults
    #[garde(custom(validate_timing))]
    #[serde(default)]
    timing: Timing,
    /// Point deltas per outcome
    #[garde(skip)]
    #[serde(default)]
    scoring: ScoringRule,
    /// Rule switches
    #[garde(skip)]
    #[serde(default)]
    rules: Rules,
    /// Storage settings
    #[garde(dive)]
    #[serde(default)]
    storage: Storage,
}

impl SessionConfig {
    /// Creates a configuration from already-built parts
    pub fn new(rounds: Vec<RoundSpec>, timing: Timing, scoring: ScoringRule, rules: Rules) -> Self {
        Self {
            rounds,
            timing,
            scoring,
            rules,
            storage: Storage::default(),
        }
    }

    /// Parses and validates a JSON document
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Parse`] if the text is not a configuration
    /// document and [`ConfigurationError::Invalid`] if a limit is violated.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigurationError::Parse(e.to_string()))?;
        config.checked()
    }

    /// Same as [`SessionConfig::from_json`] for an already parsed value
    ///
    /// # Errors
    ///
    /// See [`SessionConfig::from_json`].
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigurationError> {
        let config: Self =
            serde_json::from_value(value).map_err(|e| ConfigurationError::Parse(e.to_string()))?;
        config.checked()
    }

    /// Runs validation, consuming and returning the configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Invalid`] with the validation report.
    pub fn checked(self) -> Result<Self, ConfigurationError> {
        self.validate()
            .map_err(|report| ConfigurationError::Invalid(report.to_string()))?;
        Ok(self)
    }

    /// Sets the storage settings
    #[must_use]
    pub fn with_storage(mut self, storage: Storage) -> Self {
        self.storage = storage;
        self
    }

    /// Rounds in play order
    pub fn rounds(&self) -> &[RoundSpec] {
        &self.rounds
    }

    /// Returns the number of rounds
    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    /// Checks if there is anything to play
    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    /// Timing defaults
    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Point deltas per outcome
    pub fn scoring(&self) -> &ScoringRule {
        &self.scoring
    }

    /// Rule switches
    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// Storage settings
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Effective time budget of the round at `index`
    pub fn round_budget(&self, index: usize) -> Option<Duration> {
        self.rounds
            .get(index)
            .map(|round| round.time_budget(self.timing.default_round()))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::ledger::OutcomeKind;

    const DOCUMENT: &str = r#"{
        "rounds": [
            { "id": "r1", "correctOptionId": "a", "options": [{ "id": "a" }, { "id": "b" }] },
            { "id": "r2", "roundMs": 9000, "correctOptionId": "x", "prompt": "Pick x" }
        ],
        "timing": { "default_round_ms": 15000 },
        "scoring": { "correct": 20, "wrong": -5, "timeout": -10, "completion_bonus": 15 },
        "rules": { "allow_negative_score": false },
        "storage": { "highscore_key": "easy_pv_sprint_highscore" }
    }"#;

    #[test]
    fn test_from_json_full_document() {
        let config = SessionConfig::from_json(DOCUMENT).unwrap();

        assert_eq!(config.len(), 2);
        assert!(!config.is_empty());
        assert_eq!(config.round_budget(0), Some(Duration::from_millis(15_000)));
        assert_eq!(config.round_budget(1), Some(Duration::from_millis(9_000)));
        assert_eq!(config.round_budget(2), None);
        assert_eq!(config.scoring().delta(OutcomeKind::Correct), 20);
        assert_eq!(config.scoring().delta(OutcomeKind::Wrong), -5);
        assert_eq!(config.scoring().delta(OutcomeKind::Timeout), -10);
        assert_eq!(config.scoring().completion_bonus(), 15);
        assert!(!config.rules().allow_negative_score);
        assert!(!config.rules().expose_answer_key);
        assert_eq!(config.storage().highscore_key, "easy_pv_sprint_highscore");
    }

    #[test]
    fn test_defaults_apply_when_absent() {
        let config = SessionConfig::from_json(r#"{ "rounds": [{ "id": "r1", "correctOptionId": "a" }] }"#)
            .unwrap();

        assert_eq!(
            config.timing().default_round(),
            Duration::from_millis(DEFAULT_TIME_BUDGET_MS)
        );
        assert_eq!(
            config.timing().tick_interval(),
            Duration::from_millis(DEFAULT_TICK_MS)
        );
        assert_eq!(config.timing().total_limit(), None);
        assert_eq!(config.scoring().delta(OutcomeKind::Correct), 0);
        assert_eq!(config.scoring().completion_bonus(), 0);
        assert_eq!(config.rules(), &Rules::default());
        assert!(config.rules().allow_negative_score);
        assert_eq!(config.storage().highscore_key, DEFAULT_HIGHSCORE_KEY);
    }

    #[test]
    fn test_empty_document_parses_without_rounds() {
        let config = SessionConfig::from_json("{}").unwrap();
        assert!(config.is_empty());
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        assert!(matches!(
            SessionConfig::from_json("{ rounds: "),
            Err(ConfigurationError::Parse(_))
        ));
        assert!(matches!(
            SessionConfig::from_json(r#"{ "rounds": 3 }"#),
            Err(ConfigurationError::Parse(_))
        ));
    }

    #[test]
    fn test_zero_round_budget_is_invalid() {
        let result = SessionConfig::from_json(
            r#"{ "rounds": [{ "id": "r1", "roundMs": 0, "correctOptionId": "a" }] }"#,
        );
        assert!(matches!(result, Err(ConfigurationError::Invalid(_))));
    }

    #[test]
    fn test_zero_default_budget_is_invalid() {
        let result = SessionConfig::from_json(
            r#"{ "rounds": [{ "id": "r1", "correctOptionId": "a" }], "timing": { "default_round_ms": 0 } }"#,
        );
        assert!(matches!(result, Err(ConfigurationError::Invalid(_))));
    }

    #[test]
    fn test_tick_interval_out_of_bounds_is_invalid() {
        let result = SessionConfig::from_json(
            r#"{ "rounds": [{ "id": "r1", "correctOptionId": "a" }], "timing": { "tick_ms": 1 } }"#,
        );
        assert!(matches!(result, Err(ConfigurationError::Invalid(_))));
    }

    #[test]
    fn test_duplicate_round_ids_are_invalid() {
        let result = SessionConfig::from_json(
            r#"{ "rounds": [{ "id": "r1", "correctOptionId": "a" }, { "id": "r1", "correctOptionId": "b" }] }"#,
        );
        let Err(ConfigurationError::Invalid(message)) = result else {
            panic!("expected invalid configuration");
        };
        assert!(message.contains("duplicate round id"));
    }

    #[test]
    fn test_too_many_rounds_is_invalid() {
        let rounds = (0..=MAX_ROUNDS_COUNT)
            .map(|i| RoundSpec::new(format!("r{i}"), "a"))
            .collect();
        let config = SessionConfig::new(rounds, Timing::default(), ScoringRule::default(), Rules::default());
        assert!(matches!(config.checked(), Err(ConfigurationError::Invalid(_))));
    }

    #[test]
    fn test_blank_storage_key_is_invalid() {
        let config = SessionConfig::new(
            vec![RoundSpec::new("r1", "a")],
            Timing::default(),
            ScoringRule::default(),
            Rules::default(),
        )
        .with_storage(Storage {
            highscore_key: String::new(),
        });
        assert!(matches!(config.checked(), Err(ConfigurationError::Invalid(_))));
    }

    #[test]
    fn test_configuration_error_messages() {
        assert_eq!(
            ConfigurationError::NoRounds.to_string(),
            "configuration contains no rounds"
        );
        assert_eq!(
            ConfigurationError::Parse("eof".to_owned()).to_string(),
            "configuration could not be parsed: eof"
        );
    }
}
