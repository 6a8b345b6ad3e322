//! # Drill Engine Library
//!
//! This library provides a deterministic, round-based engine for timed
//! exercises. It loads an exercise from a JSON document, moves rounds through
//! their phases, scores answers and timeouts, and exposes a stable snapshot
//! of its state. Time is virtual: it is fed either by a recurring wall-clock
//! alarm or by scripted replay, so manual play and automated test harnesses
//! produce identical transitions and scores.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::ignored_unit_patterns)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::wildcard_imports)]
use serde::{Deserialize, Serialize};

pub mod clock;
pub mod constants;
pub mod engine;
pub mod exercise;
pub mod ledger;
pub mod session;
pub mod snapshot;

pub use engine::{Engine, FinishReason, Phase, Rejection};
pub use exercise::config::{ConfigurationError, SessionConfig};
pub use snapshot::Snapshot;

/// Alarm messages for the wall-clock driver
///
/// The host environment delivers each scheduled message back to
/// [`Engine::receive_alarm`] after the requested delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmMessage {
    /// One beat of the recurring countdown
    Tick {
        /// Alarm chain this beat belongs to; outdated chains are ignored
        generation: u64,
    },
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_alarm_message_serialization() {
        let alarm = AlarmMessage::Tick { generation: 4 };
        let json = serde_json::to_string(&alarm).unwrap();

        assert_eq!(json, r#"{"Tick":{"generation":4}}"#);
        assert_eq!(serde_json::from_str::<AlarmMessage>(&json).unwrap(), alarm);
    }

    #[test]
    fn test_json_session_end_to_end() {
        let mut engine = Engine::from_json(
            r#"{
                "rounds": [
                    { "id": "gehen", "correctOptionId": "gegangen", "options": [
                        { "id": "gegangen" }, { "id": "gegeht" }
                    ] },
                    { "id": "sehen", "roundMs": 5000, "correctOptionId": "gesehen" }
                ],
                "scoring": { "correct": 10, "wrong": -2, "timeout": -3, "completion_bonus": 5 },
                "rules": { "allow_negative_score": false }
            }"#,
        )
        .unwrap();

        engine.start().unwrap();
        engine.submit("gegangen").unwrap();
        assert_eq!(engine.advance(), Ok(Phase::Active));
        engine.advance_time(6_000.);
        assert_eq!(engine.advance(), Ok(Phase::Finished));

        let snapshot: serde_json::Value =
            serde_json::from_str(&engine.render_game_to_text()).unwrap();
        assert_eq!(snapshot["score"], 10 - 3 + 5);
        assert_eq!(snapshot["correct_count"], 1);
        assert_eq!(snapshot["reviewed_count"], 2);
        assert_eq!(snapshot["elapsed_virtual_ms"], 5_000);
        assert_eq!(snapshot["simulated_ms"], 6_000);
    }
}
