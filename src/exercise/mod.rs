//! Exercise content
//!
//! Everything that is loaded from an exercise document before play begins:
//! the session configuration, the rounds it contains and the validators
//! shared between them.

pub mod common;
pub mod config;
pub mod round;
