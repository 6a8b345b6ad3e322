//! Configuration constants for the drill engine
//!
//! This module contains the limits and documented defaults used when loading
//! exercise configuration and when driving the virtual clock.

/// Session-wide configuration constants
pub mod session {
    /// Maximum number of rounds allowed in a single exercise
    pub const MAX_ROUNDS_COUNT: usize = 500;
    /// Maximum length of a storage key used for highscores
    pub const MAX_STORAGE_KEY_LENGTH: usize = 200;
    /// Storage key used when the configuration does not name one
    pub const DEFAULT_HIGHSCORE_KEY: &str = "drill_highscore";
}

/// Round configuration constants
pub mod round {
    /// Maximum length of a round identifier
    pub const MAX_ID_LENGTH: usize = 200;
    /// Maximum length of an answer option identifier
    pub const MAX_OPTION_ID_LENGTH: usize = 200;
    /// Maximum number of answer options in a round
    pub const MAX_OPTION_COUNT: usize = 32;
    /// Minimum time budget for a round in milliseconds
    pub const MIN_TIME_BUDGET_MS: u64 = 1;
    /// Maximum time budget for a round in milliseconds (one hour)
    pub const MAX_TIME_BUDGET_MS: u64 = 3_600_000;
    /// Time budget applied when neither the round nor the session sets one
    pub const DEFAULT_TIME_BUDGET_MS: u64 = 12_000;
}

/// Clock and driver constants
pub mod clock {
    /// Interval of the recurring wall-clock alarm in milliseconds
    pub const DEFAULT_TICK_MS: u64 = 100;
    /// Minimum wall-clock alarm interval in milliseconds
    pub const MIN_TICK_MS: u64 = 10;
    /// Maximum wall-clock alarm interval in milliseconds
    pub const MAX_TICK_MS: u64 = 1_000;
    /// Largest slice of virtual time charged in a single sub-tick (one frame)
    pub const FRAME_MS: u64 = 16;
    /// Maximum session-wide time limit in milliseconds (one day)
    pub const MAX_TOTAL_MS: u64 = 86_400_000;
}
