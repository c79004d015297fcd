//! LiveVote - Live Audience Voting Server
//!
//! Runs timed yes/no voting rounds for one contestant at a time during a
//! live show. Audience members vote over a WebSocket, a display screen
//! follows the running tallies, and an admin console opens, closes and
//! resets rounds.
//!
//! # Architecture
//!
//! A single [`round::VoteHub`] owns the round state machine behind one lock.
//! Votes and admin transitions are serialized through it, accepted votes are
//! written to SQLite, and every change is pushed to connected clients by the
//! broadcast gateway.
//!
//! # Features
//!
//! - LANDING / VOTING / STOPPED / ENDED round state machine
//! - Timed rounds with automatic close at the deadline
//! - One vote per voter identity per round, safe under concurrent submission
//! - Voter identity by client address or per-browser session cookie
//! - Password-protected admin sessions over HTTP and WebSocket
//! - SQLite vote log with CSV and JSON export

pub mod config;
pub mod error;
pub mod model;
pub mod store;
pub mod round;
pub mod broadcast;
pub mod api;

pub use config::LiveVoteConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::LiveVoteConfig;
    pub use crate::error::{Error, Result};
    pub use crate::model::{Contestant, ContestantId, Mode, VoteTally, VoteType, VoterIdentity};
    pub use crate::store::{ExportFormat, ExportReport, VoteStore};
    pub use crate::round::{RoundSnapshot, Scoreboard, VoteHub};
    pub use crate::broadcast::{ClientEvent, Gateway, ServerEvent};
    pub use crate::api::{HttpServer, SessionGate};
}
