//! Voting Domain Types
//!
//! Contestants, vote kinds, tallies and voter identities shared by the
//! round state machine, the vote store and the wire protocol.

use serde::{Deserialize, Serialize};

/// Contestant row identifier
pub type ContestantId = i64;

/// A contestant that can be voted on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contestant {
    pub id: ContestantId,
    pub name: String,
}

/// Kind of vote a client can cast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Yes,
    No,
}

impl VoteType {
    /// Column value used in the vote log
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::Yes => "yes",
            VoteType::No => "no",
        }
    }
}

impl std::fmt::Display for VoteType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VoteType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" => Ok(VoteType::Yes),
            "no" => Ok(VoteType::No),
            other => Err(crate::Error::InvalidRequest(format!("unknown vote type '{}'", other))),
        }
    }
}

/// Running yes/no counters for one contestant.
///
/// Yes and no are counted independently; a "no" never cancels a "yes".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub yes_count: u64,
    pub no_count: u64,
}

impl VoteTally {
    /// Count one vote
    pub fn add(&mut self, vote: VoteType) {
        match vote {
            VoteType::Yes => self.yes_count += 1,
            VoteType::No => self.no_count += 1,
        }
    }

    /// Total votes counted
    pub fn total(&self) -> u64 {
        self.yes_count + self.no_count
    }
}

/// Round lifecycle mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    /// Welcome screen, nothing to vote on yet
    Landing,
    /// A round is open
    Voting,
    /// Round stopped by the admin
    Stopped,
    /// Round finished (deadline passed or admin ended it)
    Ended,
}

impl Mode {
    /// Whether this is one of the closed-round modes
    pub fn is_closed(&self) -> bool {
        matches!(self, Mode::Stopped | Mode::Ended)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Landing => write!(f, "LANDING"),
            Mode::Voting => write!(f, "VOTING"),
            Mode::Stopped => write!(f, "STOPPED"),
            Mode::Ended => write!(f, "ENDED"),
        }
    }
}

/// Best-effort voter fingerprint (client address or session token).
///
/// Only used as a set-membership key for per-round deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterIdentity(String);

impl VoterIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VoterIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<std::net::IpAddr> for VoterIdentity {
    fn from(addr: std::net::IpAddr) -> Self {
        Self(addr.to_string())
    }
}

/// Contestants seeded when neither the database nor the config provides any
pub const DEFAULT_CONTESTANTS: &[&str] = &[
    "Khadeeja Mohamed Ashraff",
    "Tharanjee Dahanayaka",
    "S.D. Thalpawila",
    "Teesha Hewa Matarage",
    "Gallala Gamage Lakna Hansinee",
    "K.A.D.S. Jayalath",
    "E.A.T.K. Athukorala",
    "K.A. Hiruni Pabasara Warnasekara",
    "W.M.R.L. Walisundara",
    "V. Lochini Weerasekara",
    "U.L.C. Bhashitha",
    "Posandu Mapa",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_counts_independently() {
        let mut tally = VoteTally::default();
        tally.add(VoteType::Yes);
        tally.add(VoteType::Yes);
        tally.add(VoteType::No);
        assert_eq!(tally.yes_count, 2);
        assert_eq!(tally.no_count, 1);
        assert_eq!(tally.total(), 3);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&Mode::Voting).unwrap(), "\"VOTING\"");
        assert_eq!(serde_json::to_string(&VoteType::No).unwrap(), "\"no\"");
        let voter: VoterIdentity = serde_json::from_str("\"10.0.0.7\"").unwrap();
        assert_eq!(voter.as_str(), "10.0.0.7");
    }

    #[test]
    fn test_parse_vote_type() {
        assert_eq!("YES".parse::<VoteType>().unwrap(), VoteType::Yes);
        assert_eq!(" no ".parse::<VoteType>().unwrap(), VoteType::No);
        assert!("maybe".parse::<VoteType>().is_err());
    }
}
