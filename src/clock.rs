//! Virtual clock
//!
//! The virtual clock is the only authority on how much exercise time has
//! passed. It never advances on its own: it is fed either by the recurring
//! wall-clock alarm or by a scripted `advance_time` call, and only one of the
//! two may own it at a time.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// The origin of a time delta
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
pub enum ClockSource {
    /// The recurring wall-clock alarm registered through `resume`
    #[display("wall clock")]
    WallClock,
    /// A test harness calling `advance_time` directly
    #[display("scripted replay")]
    Scripted,
}

/// Converts a caller-supplied millisecond value into a duration
///
/// Values that are `NaN`, infinite, zero or negative are not time at all and
/// yield `None`; callers treat that as a no-op rather than an error. Finite
/// values beyond the range of [`Duration`] become [`Duration::MAX`].
pub fn accept_delta_ms(ms: f64) -> Option<Duration> {
    if !ms.is_finite() || ms <= 0. {
        return None;
    }

    // Finite values too large for a duration saturate
    let delta = Duration::try_from_secs_f64(ms / 1000.).unwrap_or(Duration::MAX);
    (!delta.is_zero()).then_some(delta)
}

/// Rounds a duration to whole milliseconds for reporting
pub fn whole_millis(duration: Duration) -> u64 {
    (duration.as_secs_f64() * 1000.).round() as u64
}

/// Picks the length of the next sub-tick
///
/// A sub-tick is never longer than one frame, the time the caller still has
/// to spend, or any of the remaining `budgets` (round countdown, session
/// limit). This keeps one large jump equivalent to many small ticks.
pub fn next_sub_tick<I: IntoIterator<Item = Duration>>(
    left: Duration,
    frame: Duration,
    budgets: I,
) -> Duration {
    budgets
        .into_iter()
        .fold(left.min(frame), std::cmp::Ord::min)
}

/// Summary of what happened to a requested time delta
#[skip_serializing_none]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AppliedDelta {
    /// Time the caller asked for
    pub requested: Duration,
    /// Time actually charged to rounds
    pub applied: Duration,
    /// Number of bounded sub-ticks the request was split into
    pub sub_ticks: usize,
    /// Set when the request was refused because another source owns the clock
    pub refused_by: Option<ClockSource>,
}

impl AppliedDelta {
    /// A delta that did nothing
    pub fn none(requested: Duration) -> Self {
        Self {
            requested,
            ..Self::default()
        }
    }

    /// A delta refused because `owner` currently drives the clock
    pub fn refused(requested: Duration, owner: ClockSource) -> Self {
        Self {
            requested,
            refused_by: Some(owner),
            ..Self::default()
        }
    }

    /// Time the caller asked for but that was not charged
    pub fn discarded(&self) -> Duration {
        self.requested.saturating_sub(self.applied)
    }

    /// Whether the request was refused outright
    pub fn is_refused(&self) -> bool {
        self.refused_by.is_some()
    }
}

/// Accumulator of virtual time and owner of the driver registration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualClock {
    /// Total virtual time charged to rounds
    elapsed: Duration,
    /// Total time requested through scripted calls, surplus included
    simulated: Duration,
    /// Whether the recurring wall-clock alarm currently owns the clock
    wall_clock: bool,
    /// Set once a scripted call was refused while the wall clock was running
    desync: bool,
}

impl VirtualClock {
    /// Total virtual time charged so far
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Total time requested by scripted replay
    pub fn simulated(&self) -> Duration {
        self.simulated
    }

    /// Whether the wall-clock alarm is registered
    pub fn is_wall_clock_running(&self) -> bool {
        self.wall_clock
    }

    /// Whether a second source was refused while the wall clock was running
    pub fn desync_detected(&self) -> bool {
        self.desync
    }

    /// Hands the clock to the wall-clock driver
    ///
    /// Returns `false` if it was already registered.
    pub fn register_wall_clock(&mut self) -> bool {
        !std::mem::replace(&mut self.wall_clock, true)
    }

    /// Takes the clock away from the wall-clock driver
    ///
    /// Returns `false` if no wall clock was registered.
    pub fn cancel_wall_clock(&mut self) -> bool {
        std::mem::replace(&mut self.wall_clock, false)
    }

    /// Decides whether `source` may feed time right now
    ///
    /// Scripted time is refused while the wall clock is registered and the
    /// refusal is remembered for inspection. Wall-clock time is only
    /// admitted while its registration is live.
    pub fn admit(&mut self, source: ClockSource) -> bool {
        match source {
            ClockSource::WallClock => self.wall_clock,
            ClockSource::Scripted if self.wall_clock => {
                self.desync = true;
                false
            }
            ClockSource::Scripted => true,
        }
    }

    /// Records time requested by a scripted call
    pub fn record_simulated(&mut self, requested: Duration) {
        self.simulated = self.simulated.saturating_add(requested);
    }

    /// Charges an accepted delta and returns it
    pub fn advance(&mut self, delta: Duration) -> Duration {
        self.elapsed = self.elapsed.saturating_add(delta);
        delta
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_accept_delta_rejects_non_time() {
        assert_eq!(accept_delta_ms(f64::NAN), None);
        assert_eq!(accept_delta_ms(f64::INFINITY), None);
        assert_eq!(accept_delta_ms(f64::NEG_INFINITY), None);
        assert_eq!(accept_delta_ms(0.), None);
        assert_eq!(accept_delta_ms(-5.), None);
    }

    #[test]
    fn test_accept_delta_whole_and_fractional() {
        assert_eq!(accept_delta_ms(100.), Some(Duration::from_millis(100)));
        assert_eq!(
            accept_delta_ms(0.5),
            Some(Duration::from_micros(500))
        );
    }

    #[test]
    fn test_accept_delta_saturates_huge_values() {
        assert_eq!(accept_delta_ms(1e30), Some(Duration::MAX));
        assert_eq!(accept_delta_ms(f64::MAX), Some(Duration::MAX));
    }

    #[test]
    fn test_simulated_time_saturates() {
        let mut clock = VirtualClock::default();
        clock.record_simulated(Duration::MAX);
        clock.record_simulated(Duration::from_secs(1));

        assert_eq!(clock.simulated(), Duration::MAX);
    }

    #[test]
    fn test_whole_millis_rounds() {
        assert_eq!(whole_millis(Duration::from_micros(1_499)), 1);
        assert_eq!(whole_millis(Duration::from_micros(1_500)), 2);
        assert_eq!(whole_millis(Duration::ZERO), 0);
    }

    #[test]
    fn test_next_sub_tick_takes_smallest_bound() {
        let frame = Duration::from_millis(16);

        assert_eq!(
            next_sub_tick(Duration::from_millis(1000), frame, []),
            frame
        );
        assert_eq!(
            next_sub_tick(Duration::from_millis(5), frame, []),
            Duration::from_millis(5)
        );
        assert_eq!(
            next_sub_tick(
                Duration::from_millis(1000),
                frame,
                [Duration::from_millis(40), Duration::from_millis(3)]
            ),
            Duration::from_millis(3)
        );
    }

    #[test]
    fn test_scripted_refused_while_wall_clock_runs() {
        let mut clock = VirtualClock::default();
        assert!(clock.admit(ClockSource::Scripted));
        assert!(!clock.admit(ClockSource::WallClock));
        assert!(!clock.desync_detected());

        assert!(clock.register_wall_clock());
        assert!(!clock.register_wall_clock());
        assert!(clock.admit(ClockSource::WallClock));
        assert!(!clock.admit(ClockSource::Scripted));
        assert!(clock.desync_detected());

        assert!(clock.cancel_wall_clock());
        assert!(!clock.cancel_wall_clock());
        assert!(clock.admit(ClockSource::Scripted));
    }

    #[test]
    fn test_advance_accumulates() {
        let mut clock = VirtualClock::default();
        clock.advance(Duration::from_millis(16));
        clock.advance(Duration::from_millis(4));
        clock.record_simulated(Duration::from_millis(50));

        assert_eq!(clock.elapsed(), Duration::from_millis(20));
        assert_eq!(clock.simulated(), Duration::from_millis(50));
    }

    #[test]
    fn test_applied_delta_discarded() {
        let delta = AppliedDelta {
            requested: Duration::from_millis(15_000),
            applied: Duration::from_millis(10_000),
            sub_ticks: 625,
            refused_by: None,
        };
        assert_eq!(delta.discarded(), Duration::from_millis(5_000));
        assert!(!delta.is_refused());

        let refused = AppliedDelta::refused(Duration::from_millis(10), ClockSource::WallClock);
        assert!(refused.is_refused());
        assert_eq!(refused.discarded(), Duration::from_millis(10));
    }
}
