//! Round State Machine
//!
//! Holds the current mode, the active contestant and deadline, the set of
//! voters seen this round and the live tallies. All transitions are plain
//! synchronous methods; callers serialize access through one lock.
//!
//! ```text
//! LANDING -> VOTING -> {STOPPED | ENDED} -> VOTING -> ...
//!              reset: any -> STOPPED (or LANDING on request)
//! ```

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{Contestant, ContestantId, Mode, VoteTally, VoteType, VoterIdentity};

/// Round generation number. Bumped on every open and reset so a deferred
/// close scheduled for an older round can recognise itself as stale.
pub type Epoch = u64;

/// Longest round an admin may open
pub const MAX_ROUND: Duration = Duration::from_secs(24 * 60 * 60);

/// Public view of the round, pushed to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub mode: Mode,
    pub active_contestant: Option<Contestant>,
    pub deadline: Option<DateTime<Utc>>,
}

/// One scoreboard line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub name: String,
    pub yes_count: u64,
    pub no_count: u64,
}

/// Scores keyed by contestant id
pub type Scoreboard = BTreeMap<ContestantId, ScoreEntry>;

/// An accepted vote
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedVote {
    pub contestant: Contestant,
    pub vote: VoteType,
    pub tally: VoteTally,
}

/// Process-wide round state
#[derive(Debug)]
pub struct RoundState {
    mode: Mode,
    active: Option<Contestant>,
    deadline: Option<DateTime<Utc>>,
    voters: HashSet<VoterIdentity>,
    epoch: Epoch,
    roster: BTreeMap<ContestantId, Contestant>,
    tallies: BTreeMap<ContestantId, VoteTally>,
}

impl RoundState {
    /// Create the state from the contestant roster and any persisted counters
    pub fn new(roster: Vec<(Contestant, VoteTally)>) -> Self {
        let mut contestants = BTreeMap::new();
        let mut tallies = BTreeMap::new();
        for (contestant, tally) in roster {
            tallies.insert(contestant.id, tally);
            contestants.insert(contestant.id, contestant);
        }

        Self {
            mode: Mode::Landing,
            active: None,
            deadline: None,
            voters: HashSet::new(),
            epoch: 0,
            roster: contestants,
            tallies,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn active_contestant(&self) -> Option<&Contestant> {
        self.active.as_ref()
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Whether this voter already has a vote in the current round
    pub fn has_voted(&self, voter: &VoterIdentity) -> bool {
        self.voters.contains(voter)
    }

    /// Number of distinct voters this round
    pub fn voter_count(&self) -> usize {
        self.voters.len()
    }

    pub fn contestants(&self) -> impl Iterator<Item = &Contestant> {
        self.roster.values()
    }

    pub fn tally(&self, id: ContestantId) -> VoteTally {
        self.tallies.get(&id).copied().unwrap_or_default()
    }

    /// Open a round for one contestant, replacing any round in progress.
    /// Returns the new epoch.
    pub fn open_round(
        &mut self,
        contestant_id: ContestantId,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<Epoch> {
        if duration.is_zero() {
            return Err(Error::InvalidRequest("round duration must be greater than zero".into()));
        }
        if duration > MAX_ROUND {
            return Err(Error::InvalidRequest(format!(
                "round duration cannot exceed {}s",
                MAX_ROUND.as_secs()
            )));
        }
        let contestant = self
            .roster
            .get(&contestant_id)
            .cloned()
            .ok_or(Error::UnknownContestant(contestant_id))?;
        let length = chrono::Duration::from_std(duration)
            .map_err(|e| Error::InvalidRequest(format!("round duration out of range: {}", e)))?;
        let deadline = now
            .checked_add_signed(length)
            .ok_or_else(|| Error::InvalidRequest("round deadline out of range".into()))?;

        self.epoch += 1;
        self.mode = Mode::Voting;
        self.active = Some(contestant);
        self.deadline = Some(deadline);
        self.voters.clear();

        Ok(self.epoch)
    }

    /// Close the open round into `mode` (STOPPED or ENDED).
    /// Returns false when no round was open.
    pub fn close_round(&mut self, mode: Mode) -> bool {
        debug_assert!(mode.is_closed(), "close_round needs a closed mode, got {}", mode);
        if self.mode != Mode::Voting {
            return false;
        }

        self.mode = mode;
        self.active = None;
        self.deadline = None;
        true
    }

    /// Deferred close for the round opened at `epoch`. A no-op if that round
    /// was already closed or a newer round has started.
    pub fn close_expired(&mut self, epoch: Epoch) -> bool {
        if self.epoch != epoch {
            return false;
        }
        self.close_round(Mode::Ended)
    }

    /// Go back to the welcome screen, closing any open round.
    /// Returns false when already on LANDING.
    pub fn show_landing(&mut self) -> bool {
        if self.mode == Mode::Landing {
            return false;
        }

        self.mode = Mode::Landing;
        self.active = None;
        self.deadline = None;
        true
    }

    /// Zero all tallies and forget this round's voters. Leaves the state
    /// closed (STOPPED) unless `landing` is set.
    pub fn reset(&mut self, landing: bool) {
        for tally in self.tallies.values_mut() {
            *tally = VoteTally::default();
        }
        self.voters.clear();
        self.active = None;
        self.deadline = None;
        self.epoch += 1;
        self.mode = if landing { Mode::Landing } else { Mode::Stopped };
    }

    /// Validate and count a vote in one step.
    ///
    /// Checks, in order: round open, deadline not passed (closing the round
    /// as ENDED if it has), requested contestant matches, voter not seen this
    /// round. Nothing is counted unless every check passes.
    pub fn cast_vote(
        &mut self,
        voter: &VoterIdentity,
        requested: Option<ContestantId>,
        vote: VoteType,
        now: DateTime<Utc>,
    ) -> Result<AcceptedVote> {
        if self.mode != Mode::Voting {
            return Err(Error::RoundNotOpen);
        }

        if let Some(deadline) = self.deadline {
            if now > deadline {
                self.close_round(Mode::Ended);
                return Err(Error::RoundExpired);
            }
        }

        let contestant = match &self.active {
            Some(c) => c.clone(),
            None => return Err(Error::RoundNotOpen),
        };

        if let Some(requested) = requested {
            if requested != contestant.id {
                return Err(Error::ContestantMismatch {
                    requested,
                    active: contestant.id,
                });
            }
        }

        if !self.voters.insert(voter.clone()) {
            return Err(Error::DuplicateVote);
        }

        let tally = self.tallies.entry(contestant.id).or_default();
        tally.add(vote);

        Ok(AcceptedVote {
            tally: *tally,
            contestant,
            vote,
        })
    }

    /// Current public view of the round
    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            mode: self.mode,
            active_contestant: self.active.clone(),
            deadline: self.deadline,
        }
    }

    /// Current scores for every contestant
    pub fn scoreboard(&self) -> Scoreboard {
        self.roster
            .values()
            .map(|c| {
                let tally = self.tally(c.id);
                (
                    c.id,
                    ScoreEntry {
                        name: c.name.clone(),
                        yes_count: tally.yes_count,
                        no_count: tally.no_count,
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> RoundState {
        RoundState::new(vec![
            (Contestant { id: 1, name: "Alice".into() }, VoteTally::default()),
            (Contestant { id: 2, name: "Bob".into() }, VoteTally::default()),
        ])
    }

    fn voter(id: &str) -> VoterIdentity {
        VoterIdentity::new(id)
    }

    #[test]
    fn test_starts_on_landing() {
        let state = state();
        assert_eq!(state.mode(), Mode::Landing);
        assert!(state.active_contestant().is_none());
        assert_eq!(state.epoch(), 0);
    }

    #[test]
    fn test_open_round() {
        let mut state = state();
        let now = Utc::now();
        let epoch = state.open_round(1, Duration::from_secs(30), now).unwrap();

        assert_eq!(epoch, 1);
        assert_eq!(state.mode(), Mode::Voting);
        assert_eq!(state.active_contestant().unwrap().name, "Alice");
        assert_eq!(state.deadline(), Some(now + chrono::Duration::seconds(30)));
    }

    #[test]
    fn test_open_round_rejects_bad_input() {
        let mut state = state();
        assert!(matches!(
            state.open_round(9, Duration::from_secs(30), Utc::now()),
            Err(Error::UnknownContestant(9))
        ));
        assert!(matches!(
            state.open_round(1, Duration::ZERO, Utc::now()),
            Err(Error::InvalidRequest(_))
        ));
        assert_eq!(state.mode(), Mode::Landing);
    }

    #[test]
    fn test_open_round_rejects_huge_duration() {
        let mut state = state();
        assert!(matches!(
            state.open_round(1, Duration::from_secs(10_000_000_000_000), Utc::now()),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            state.open_round(1, MAX_ROUND + Duration::from_secs(1), Utc::now()),
            Err(Error::InvalidRequest(_))
        ));
        assert_eq!(state.mode(), Mode::Landing);
        assert_eq!(state.epoch(), 0);

        assert!(state.open_round(1, MAX_ROUND, Utc::now()).is_ok());
    }

    #[test]
    fn test_deadline_overflow_rejected() {
        let mut state = state();
        let result = state.open_round(1, Duration::from_secs(60), DateTime::<Utc>::MAX_UTC);
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
        assert_eq!(state.mode(), Mode::Landing);
    }

    #[test]
    fn test_vote_outside_round() {
        let mut state = state();
        let result = state.cast_vote(&voter("a"), None, VoteType::Yes, Utc::now());
        assert!(matches!(result, Err(Error::RoundNotOpen)));
        assert_eq!(state.tally(1), VoteTally::default());
    }

    #[test]
    fn test_duplicate_vote_rejected() {
        let mut state = state();
        let now = Utc::now();
        state.open_round(1, Duration::from_secs(30), now).unwrap();

        let accepted = state.cast_vote(&voter("a"), None, VoteType::Yes, now).unwrap();
        assert_eq!(accepted.tally.yes_count, 1);

        let again = state.cast_vote(&voter("a"), None, VoteType::No, now);
        assert!(matches!(again, Err(Error::DuplicateVote)));
        assert_eq!(state.tally(1), VoteTally { yes_count: 1, no_count: 0 });
    }

    #[test]
    fn test_expired_vote_closes_round() {
        let mut state = state();
        let now = Utc::now();
        state.open_round(1, Duration::from_secs(2), now).unwrap();

        let late = now + chrono::Duration::seconds(3);
        let result = state.cast_vote(&voter("b"), None, VoteType::Yes, late);
        assert!(matches!(result, Err(Error::RoundExpired)));
        assert_eq!(state.mode(), Mode::Ended);
        assert_eq!(state.tally(1).total(), 0);

        let after = state.cast_vote(&voter("b"), None, VoteType::Yes, late);
        assert!(matches!(after, Err(Error::RoundNotOpen)));
    }

    #[test]
    fn test_vote_exactly_at_deadline_counts() {
        let mut state = state();
        let now = Utc::now();
        state.open_round(1, Duration::from_secs(5), now).unwrap();
        let deadline = state.deadline().unwrap();
        assert!(state.cast_vote(&voter("a"), None, VoteType::Yes, deadline).is_ok());
    }

    #[test]
    fn test_contestant_mismatch() {
        let mut state = state();
        let now = Utc::now();
        state.open_round(1, Duration::from_secs(30), now).unwrap();

        let result = state.cast_vote(&voter("a"), Some(2), VoteType::Yes, now);
        assert!(matches!(result, Err(Error::ContestantMismatch { requested: 2, active: 1 })));
        // A rejected vote does not burn the voter's turn
        assert!(!state.has_voted(&voter("a")));
        assert!(state.cast_vote(&voter("a"), Some(1), VoteType::Yes, now).is_ok());
    }

    #[test]
    fn test_new_round_clears_voters_but_keeps_tallies() {
        let mut state = state();
        let now = Utc::now();
        state.open_round(1, Duration::from_secs(30), now).unwrap();
        state.cast_vote(&voter("a"), None, VoteType::Yes, now).unwrap();

        state.open_round(2, Duration::from_secs(30), now).unwrap();
        assert!(!state.has_voted(&voter("a")));
        state.cast_vote(&voter("a"), None, VoteType::No, now).unwrap();

        assert_eq!(state.tally(1), VoteTally { yes_count: 1, no_count: 0 });
        assert_eq!(state.tally(2), VoteTally { yes_count: 0, no_count: 1 });
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut state = state();
        let epoch = state.open_round(1, Duration::from_secs(30), Utc::now()).unwrap();

        assert!(state.close_round(Mode::Stopped));
        assert!(!state.close_round(Mode::Ended));
        assert!(!state.close_expired(epoch));
        assert_eq!(state.mode(), Mode::Stopped);
    }

    #[test]
    fn test_stale_epoch_cannot_close_newer_round() {
        let mut state = state();
        let first = state.open_round(1, Duration::from_secs(30), Utc::now()).unwrap();
        let second = state.open_round(2, Duration::from_secs(30), Utc::now()).unwrap();

        assert!(!state.close_expired(first));
        assert_eq!(state.mode(), Mode::Voting);
        assert!(state.close_expired(second));
        assert_eq!(state.mode(), Mode::Ended);
    }

    #[test]
    fn test_reset_from_any_state() {
        let mut state = state();
        let now = Utc::now();
        state.open_round(1, Duration::from_secs(30), now).unwrap();
        state.cast_vote(&voter("a"), None, VoteType::Yes, now).unwrap();
        let before = state.epoch();

        state.reset(false);
        assert_eq!(state.mode(), Mode::Stopped);
        assert_eq!(state.voter_count(), 0);
        assert!(state.scoreboard().values().all(|s| s.yes_count == 0 && s.no_count == 0));
        assert!(state.epoch() > before);

        state.reset(true);
        assert_eq!(state.mode(), Mode::Landing);
    }

    #[test]
    fn test_show_landing() {
        let mut state = state();
        assert!(!state.show_landing());
        state.open_round(1, Duration::from_secs(30), Utc::now()).unwrap();
        assert!(state.show_landing());
        assert_eq!(state.snapshot().mode, Mode::Landing);
        assert!(state.snapshot().active_contestant.is_none());
    }

    #[test]
    fn test_scoreboard_includes_persisted_counts() {
        let state = RoundState::new(vec![(
            Contestant { id: 4, name: "Dana".into() },
            VoteTally { yes_count: 3, no_count: 2 },
        )]);
        let board = state.scoreboard();
        assert_eq!(board[&4].yes_count, 3);
        assert_eq!(board[&4].no_count, 2);
    }
}
