//! Shared validators for exercise configuration
//!
//! These are custom validation functions for use with the `garde` crate,
//! shared by round and session configuration.

use std::time::Duration;

use itertools::Itertools;

use super::round::RoundSpec;

/// Validation result type for custom validators
type ValidationResult = garde::Result;

/// Validates that a duration falls within specified millisecond bounds.
///
/// # Generics
///
/// * `MIN_MS` - The minimum allowed duration in milliseconds (inclusive).
/// * `MAX_MS` - The maximum allowed duration in milliseconds (inclusive).
///
/// # Errors
///
/// Returns a `garde::Error` if the duration is outside the specified bounds.
pub fn validate_duration_ms<const MIN_MS: u64, const MAX_MS: u64>(
    val: &Duration,
    _ctx: &(),
) -> ValidationResult {
    let millis = val.as_millis();
    if (u128::from(MIN_MS)..=u128::from(MAX_MS)).contains(&millis) {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "outside of bounds [{MIN_MS},{MAX_MS}] ms",
        )))
    }
}

/// Same as [`validate_duration_ms`] for durations that may be absent
///
/// # Errors
///
/// Returns a `garde::Error` if the duration is present and out of bounds.
pub fn validate_optional_duration_ms<const MIN_MS: u64, const MAX_MS: u64>(
    val: Option<&Duration>,
) -> ValidationResult {
    val.map_or(Ok(()), |v| validate_duration_ms::<MIN_MS, MAX_MS>(v, &()))
}

/// Validates that an identifier is not blank
///
/// # Errors
///
/// Returns a `garde::Error` if the identifier is empty after trimming.
pub fn validate_identifier<S: AsRef<str> + ?Sized>(val: &S, _ctx: &()) -> ValidationResult {
    if val.as_ref().trim().is_empty() {
        Err(garde::Error::new("identifier cannot be blank"))
    } else {
        Ok(())
    }
}

/// Validates the round list as a whole
///
/// Round ids must be unique and every per-round budget must be in bounds.
///
/// # Errors
///
/// Returns a `garde::Error` naming the first offending round.
pub fn validate_rounds(rounds: &[RoundSpec], _ctx: &()) -> ValidationResult {
    use crate::constants::round::{MAX_TIME_BUDGET_MS, MIN_TIME_BUDGET_MS};

    if let Some(id) = rounds.iter().map(RoundSpec::id).duplicates().next() {
        return Err(garde::Error::new(format!("duplicate round id `{id}`")));
    }

    for round in rounds {
        validate_optional_duration_ms::<MIN_TIME_BUDGET_MS, MAX_TIME_BUDGET_MS>(
            round.own_budget(),
        )
        .map_err(|e| garde::Error::new(format!("round `{}` roundMs {e}", round.id())))?;
    }

    Ok(())
}
