//! LiveVote Error Types

use thiserror::Error;

/// Result type alias for LiveVote operations
pub type Result<T> = std::result::Result<T, Error>;

/// LiveVote error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Voting rejections
    #[error("Voting is not open")]
    RoundNotOpen,

    #[error("Voting round has expired")]
    RoundExpired,

    #[error("You have already voted")]
    DuplicateVote,

    #[error("Vote is for contestant {requested}, but the open round is for contestant {active}")]
    ContestantMismatch { requested: i64, active: i64 },

    #[error("Unknown contestant: {0}")]
    UnknownContestant(i64),

    // Admin errors
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Storage errors
    #[error("Store error: {0}")]
    Store(String),

    #[error("Failed to persist vote: {0}")]
    PersistenceWriteFailed(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is a vote or admin rejection that should be
    /// reported back to the caller rather than logged as a fault
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::RoundNotOpen
                | Error::RoundExpired
                | Error::DuplicateVote
                | Error::ContestantMismatch { .. }
                | Error::UnknownContestant(_)
                | Error::Unauthorized
                | Error::InvalidRequest(_)
        )
    }

    /// Stable machine-readable code for clients
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) | Error::ConfigParse(_) => "CONFIG_ERROR",
            Error::RoundNotOpen => "ROUND_NOT_OPEN",
            Error::RoundExpired => "ROUND_EXPIRED",
            Error::DuplicateVote => "DUPLICATE_VOTE",
            Error::ContestantMismatch { .. } => "CONTESTANT_MISMATCH",
            Error::UnknownContestant(_) => "UNKNOWN_CONTESTANT",
            Error::Unauthorized => "UNAUTHORIZED",
            Error::InvalidRequest(_) => "INVALID_REQUEST",
            Error::Store(_) => "STORE_ERROR",
            Error::PersistenceWriteFailed(_) => "PERSISTENCE_WRITE_FAILED",
            Error::Io(_) => "IO_ERROR",
            Error::Network(_) => "NETWORK_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Store(format!("SQLite error: {}", e))
    }
}
