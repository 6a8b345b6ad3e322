//! Round model
//!
//! A round is one question or challenge with its own time budget and a single
//! expected answer. Rounds are read from configuration when a session is
//! created and never change afterwards.

use std::time::Duration;

use garde::Validate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::skip_serializing_none;

use crate::constants::round::{MAX_ID_LENGTH, MAX_OPTION_COUNT, MAX_OPTION_ID_LENGTH};

use super::common::validate_identifier;

/// One selectable answer in a round
///
/// Only the identifier is meaningful to the engine; everything else (label,
/// explanation, media) is kept for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AnswerOption {
    /// Identifier submitted when this option is chosen
    #[garde(length(chars, min = 1, max = MAX_OPTION_ID_LENGTH))]
    pub id: String,
    /// Presentation data (text, reason, ...)
    #[garde(skip)]
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Immutable description of one exercise round
#[serde_with::serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RoundSpec {
    /// Stable identifier of the round
    #[garde(length(chars, min = 1, max = MAX_ID_LENGTH), custom(validate_identifier))]
    id: String,
    /// Time budget of this round, falls back to the session default
    #[garde(skip)]
    #[serde_as(as = "Option<serde_with::DurationMilliSeconds<u64>>")]
    round_ms: Option<Duration>,
    /// Identifier of the answer that resolves this round as correct
    #[garde(length(chars, min = 1, max = MAX_OPTION_ID_LENGTH))]
    correct_option_id: String,
    /// Selectable answers; when present, submissions must name one of them
    #[garde(length(max = MAX_OPTION_COUNT), dive)]
    #[serde(default)]
    options: Vec<AnswerOption>,
    /// Content for the presentation layer, not interpreted by the engine
    #[garde(skip)]
    #[serde(flatten)]
    payload: Map<String, Value>,
}

impl RoundSpec {
    /// Creates a round with no options and no payload
    pub fn new(id: impl Into<String>, correct_option_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            round_ms: None,
            correct_option_id: correct_option_id.into(),
            options: Vec::new(),
            payload: Map::new(),
        }
    }

    /// Sets a round-specific time budget
    #[must_use]
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.round_ms = Some(budget);
        self
    }

    /// Adds selectable options by identifier
    #[must_use]
    pub fn with_options<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = ids
            .into_iter()
            .map(|id| AnswerOption {
                id: id.into(),
                extra: Map::new(),
            })
            .collect_vec();
        self
    }

    /// The round identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The round-specific budget, if the configuration set one
    pub fn own_budget(&self) -> Option<&Duration> {
        self.round_ms.as_ref()
    }

    /// The effective time budget given the session default
    pub fn time_budget(&self, default: Duration) -> Duration {
        self.round_ms.unwrap_or(default)
    }

    /// The expected answer
    pub fn correct_option_id(&self) -> &str {
        &self.correct_option_id
    }

    /// The selectable options
    pub fn options(&self) -> &[AnswerOption] {
        &self.options
    }

    /// Identifiers of the selectable options, in configuration order
    pub fn option_ids(&self) -> Vec<&str> {
        self.options.iter().map(|o| o.id.as_str()).collect_vec()
    }

    /// Presentation payload
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Whether `answer` may be submitted for this round at all
    ///
    /// Rounds without an option list accept any answer.
    pub fn accepts(&self, answer: &str) -> bool {
        self.options.is_empty() || self.options.iter().any(|o| o.id == answer)
    }

    /// Whether `answer` matches the expected answer exactly
    pub fn is_correct(&self, answer: &str) -> bool {
        self.correct_option_id == answer
    }
}
