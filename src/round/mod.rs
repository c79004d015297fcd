//! Round Management Module
//!
//! The round state machine and the hub that serializes votes and admin
//! transitions against it.

mod state;
mod hub;

pub use state::{AcceptedVote, Epoch, RoundSnapshot, MAX_ROUND, RoundState, ScoreEntry, Scoreboard};
pub use hub::VoteHub;
