//! WebSocket Wire Protocol
//!
//! JSON messages exchanged with voters, the display screen and the admin
//! console. Every message is an object tagged by `"type"`.

use serde::{Deserialize, Serialize};

use crate::model::{Contestant, ContestantId, Mode, VoteType};
use crate::round::{RoundSnapshot, Scoreboard};

/// Client -> server messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Cast a vote for the active contestant
    CastVote {
        #[serde(default)]
        contestant_id: Option<ContestantId>,
        vote: VoteType,
    },
    /// Open a round (admin)
    AdminOpenRound {
        contestant_id: ContestantId,
        #[serde(default)]
        duration_seconds: Option<u64>,
    },
    /// Close the open round (admin); `mode` defaults to STOPPED
    AdminCloseRound {
        #[serde(default)]
        mode: Option<Mode>,
    },
    /// Zero tallies and clear the vote log (admin)
    AdminReset {
        #[serde(default)]
        landing: bool,
    },
    /// Show the welcome screen (admin)
    AdminShowLanding,
    /// Keepalive
    Ping,
}

impl ClientEvent {
    /// Whether this event changes round state and needs admin rights
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            ClientEvent::AdminOpenRound { .. }
                | ClientEvent::AdminCloseRound { .. }
                | ClientEvent::AdminReset { .. }
                | ClientEvent::AdminShowLanding
        )
    }

    /// Get message type name
    pub fn type_name(&self) -> &'static str {
        match self {
            ClientEvent::CastVote { .. } => "cast_vote",
            ClientEvent::AdminOpenRound { .. } => "admin_open_round",
            ClientEvent::AdminCloseRound { .. } => "admin_close_round",
            ClientEvent::AdminReset { .. } => "admin_reset",
            ClientEvent::AdminShowLanding => "admin_show_landing",
            ClientEvent::Ping => "ping",
        }
    }
}

/// Server -> client messages
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Current round mode, contestant and deadline
    StateSnapshot(RoundSnapshot),
    /// Running tallies for every contestant
    ScoreUpdate { scores: Scoreboard },
    /// Whether voters may vote right now, and on whom
    VotingStatus {
        open: bool,
        contestants: Vec<Contestant>,
    },
    /// Outcome of this connection's vote
    VoteResult { success: bool, message: String },
    /// Rejected or malformed request
    Error { code: String, message: String },
    /// Keepalive reply
    Pong,
}

impl ServerEvent {
    /// Voting status derived from a snapshot
    pub fn voting_status(snapshot: &RoundSnapshot) -> Self {
        ServerEvent::VotingStatus {
            open: snapshot.mode == Mode::Voting,
            contestants: snapshot.active_contestant.iter().cloned().collect(),
        }
    }

    /// Error message for a rejected request
    pub fn error(err: &crate::Error) -> Self {
        ServerEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    /// Get message type name
    pub fn type_name(&self) -> &'static str {
        match self {
            ServerEvent::StateSnapshot(_) => "state_snapshot",
            ServerEvent::ScoreUpdate { .. } => "score_update",
            ServerEvent::VotingStatus { .. } => "voting_status",
            ServerEvent::VoteResult { .. } => "vote_result",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Pong => "pong",
        }
    }

    /// Encode for the wire
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!("Failed to encode {}: {}", self.type_name(), e);
            String::from("{\"type\":\"error\",\"code\":\"INTERNAL_ERROR\",\"message\":\"encoding failed\"}")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::round::ScoreEntry;

    #[test]
    fn test_parse_cast_vote() {
        let event: ClientEvent = serde_json::from_str(r#"{"type":"cast_vote","vote":"yes"}"#).unwrap();
        assert_eq!(event, ClientEvent::CastVote { contestant_id: None, vote: VoteType::Yes });
        assert!(!event.requires_admin());

        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"cast_vote","contestant_id":3,"vote":"no"}"#).unwrap();
        assert_eq!(event, ClientEvent::CastVote { contestant_id: Some(3), vote: VoteType::No });
    }

    #[test]
    fn test_parse_admin_events() {
        let open: ClientEvent =
            serde_json::from_str(r#"{"type":"admin_open_round","contestant_id":1,"duration_seconds":20}"#).unwrap();
        assert!(open.requires_admin());

        let close: ClientEvent = serde_json::from_str(r#"{"type":"admin_close_round","mode":"ENDED"}"#).unwrap();
        assert_eq!(close, ClientEvent::AdminCloseRound { mode: Some(Mode::Ended) });

        let reset: ClientEvent = serde_json::from_str(r#"{"type":"admin_reset"}"#).unwrap();
        assert_eq!(reset, ClientEvent::AdminReset { landing: false });
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"type":"rig_election"}"#).is_err());
    }

    #[test]
    fn test_encode_snapshot_and_scores() {
        let snapshot = RoundSnapshot { mode: Mode::Landing, active_contestant: None, deadline: None };
        let json: serde_json::Value =
            serde_json::from_str(&ServerEvent::StateSnapshot(snapshot).to_json()).unwrap();
        assert_eq!(json["type"], "state_snapshot");
        assert_eq!(json["mode"], "LANDING");

        let mut scores = Scoreboard::new();
        scores.insert(1, ScoreEntry { name: "Alice".into(), yes_count: 2, no_count: 1 });
        let json: serde_json::Value =
            serde_json::from_str(&ServerEvent::ScoreUpdate { scores }.to_json()).unwrap();
        assert_eq!(json["scores"]["1"]["yes_count"], 2);
    }
}
