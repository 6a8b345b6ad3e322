//! Seams toward the outside world
//!
//! The engine never draws anything and never touches persistent storage
//! itself. It talks to the presentation layer through [`Presenter`] and
//! remembers best scores through a [`HighscoreStore`].

use std::collections::BTreeMap;

use super::snapshot::Snapshot;

/// Trait for handing fresh engine state to the presentation layer
///
/// Implementations turn a snapshot into markup, a terminal frame or
/// whatever else the host environment displays.
pub trait Presenter {
    /// Renders the given snapshot
    ///
    /// Called by the wall-clock driver after every alarm it accepted.
    ///
    /// # Arguments
    ///
    /// * `snapshot` - The state to display
    fn render(&self, snapshot: &Snapshot);
}

/// Trait for remembering the best score of an exercise between sessions
pub trait HighscoreStore {
    /// Returns the stored best score under `key`
    fn load(&self, key: &str) -> Option<i64>;

    /// Stores `score` as the best score under `key`
    fn save(&mut self, key: &str, score: i64);
}

/// Highscores kept in memory for the lifetime of the engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryHighscores {
    scores: BTreeMap<String, i64>,
}

impl HighscoreStore for MemoryHighscores {
    fn load(&self, key: &str) -> Option<i64> {
        self.scores.get(key).copied()
    }

    fn save(&mut self, key: &str, score: i64) {
        self.scores.insert(key.to_owned(), score);
    }
}
