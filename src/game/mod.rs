//! Game simulation modules

pub mod grid;
pub mod round;
pub mod runner;
pub mod schedule;
pub mod snake;
pub mod snapshot;

pub use round::{RoundCommand, RoundState, RoundSummary};
pub use runner::{GameRound, RoundHandle};
