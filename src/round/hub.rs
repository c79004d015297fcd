//! Vote Hub
//!
//! Owns the round state behind a single lock and is the only writer to it.
//! Admin transitions, vote processing and deferred round expiry all go
//! through the same guard, and queue the resulting snapshot on the
//! broadcast gateway before releasing it, so subscribers see updates in
//! the order the mutations happened.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::broadcast::{ConnectionId, Gateway, ServerEvent};
use crate::error::{Error, Result};
use crate::model::{Contestant, ContestantId, Mode, VoteType, VoterIdentity};
use crate::store::VoteStore;
use super::state::{AcceptedVote, Epoch, RoundSnapshot, RoundState, Scoreboard};

/// Round state plus the pending auto-close task for the open round
struct Inner {
    state: RoundState,
    expiry: Option<JoinHandle<()>>,
}

impl Inner {
    fn cancel_expiry(&mut self) {
        if let Some(task) = self.expiry.take() {
            task.abort();
        }
    }
}

/// Shared voting service handed to every request handler
pub struct VoteHub {
    inner: Mutex<Inner>,
    store: Arc<VoteStore>,
    gateway: Arc<Gateway>,
    default_round: Duration,
}

impl VoteHub {
    /// Build the hub from the store's contestants and persisted counters
    pub async fn new(
        store: Arc<VoteStore>,
        gateway: Arc<Gateway>,
        default_round: Duration,
    ) -> Result<Arc<Self>> {
        let roster = store.tallies().await?;
        tracing::info!("Loaded {} contestants", roster.len());

        Ok(Arc::new(Self {
            inner: Mutex::new(Inner {
                state: RoundState::new(roster),
                expiry: None,
            }),
            store,
            gateway,
            default_round,
        }))
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn store(&self) -> &Arc<VoteStore> {
        &self.store
    }

    pub fn default_round(&self) -> Duration {
        self.default_round
    }

    /// Current round view
    pub async fn snapshot(&self) -> RoundSnapshot {
        self.inner.lock().await.state.snapshot()
    }

    /// Current scores
    pub async fn scoreboard(&self) -> Scoreboard {
        self.inner.lock().await.state.scoreboard()
    }

    /// Contestant roster
    pub async fn contestants(&self) -> Vec<Contestant> {
        self.inner.lock().await.state.contestants().cloned().collect()
    }

    /// Whether the voter already voted in the open round
    pub async fn has_voted(&self, voter: &VoterIdentity) -> bool {
        self.inner.lock().await.state.has_voted(voter)
    }

    // ============ Subscribers ============

    /// Register a client and queue its connect-time snapshot: round state,
    /// scores, voting status and an "already voted" notice when applicable.
    pub async fn connect(
        &self,
        voter: VoterIdentity,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        // Round lock stays held until the connect-time events are queued
        let inner = self.inner.lock().await;
        let (id, rx) = self.gateway.register(voter.clone()).await;

        let snapshot = inner.state.snapshot();
        let already_voted = inner.state.has_voted(&voter);

        self.gateway.send_to(id, ServerEvent::StateSnapshot(snapshot.clone())).await;
        self.gateway
            .send_to(id, ServerEvent::ScoreUpdate { scores: inner.state.scoreboard() })
            .await;

        if already_voted {
            self.gateway
                .send_to(id, ServerEvent::VoteResult {
                    success: false,
                    message: Error::DuplicateVote.to_string(),
                })
                .await;
        } else {
            self.gateway.send_to(id, ServerEvent::voting_status(&snapshot)).await;
        }

        (id, rx)
    }

    /// Remove a client from the broadcast registry
    pub async fn disconnect(&self, id: ConnectionId) {
        self.gateway.unregister(id).await;
    }

    // ============ Admin transitions ============

    /// Open a round for `contestant_id`. The round closes itself as ENDED
    /// when `duration` (or the configured default) elapses.
    pub async fn open_round(
        self: &Arc<Self>,
        contestant_id: ContestantId,
        duration: Option<Duration>,
    ) -> Result<RoundSnapshot> {
        let duration = duration.unwrap_or(self.default_round);

        let mut inner = self.inner.lock().await;
        let epoch = inner.state.open_round(contestant_id, duration, Utc::now())?;
        inner.cancel_expiry();
        inner.expiry = Some(self.schedule_expiry(epoch, duration));

        let snapshot = inner.state.snapshot();
        self.publish_state(&snapshot).await;
        self.gateway
            .broadcast(ServerEvent::ScoreUpdate { scores: inner.state.scoreboard() })
            .await;
        drop(inner);

        if let Some(contestant) = &snapshot.active_contestant {
            tracing::info!(
                "Voting opened for {} (#{}) for {}s",
                contestant.name,
                contestant.id,
                duration.as_secs()
            );
        }
        Ok(snapshot)
    }

    /// Close the open round as STOPPED or ENDED.
    /// Returns false (and broadcasts nothing) when no round was open.
    pub async fn close_round(&self, mode: Mode) -> Result<bool> {
        if !mode.is_closed() {
            return Err(Error::InvalidRequest(format!("cannot close a round into {}", mode)));
        }

        let mut inner = self.inner.lock().await;
        let closed = inner.state.close_round(mode);
        if closed {
            inner.cancel_expiry();
            self.publish_state(&inner.state.snapshot()).await;
        }
        let voters = inner.state.voter_count();
        drop(inner);

        if closed {
            tracing::info!("Voting closed ({}), {} voters this round", mode, voters);
        } else {
            tracing::debug!("Close requested but no round is open");
        }
        Ok(closed)
    }

    /// Switch to the welcome screen
    pub async fn show_landing(&self) -> bool {
        let mut inner = self.inner.lock().await;
        let changed = inner.state.show_landing();
        if changed {
            inner.cancel_expiry();
            self.publish_state(&inner.state.snapshot()).await;
        }
        drop(inner);

        if changed {
            tracing::info!("Showing landing screen");
        }
        changed
    }

    /// Zero all tallies, clear the voter set and the vote log.
    ///
    /// The in-memory reset always happens and is always broadcast; a failed
    /// store reset is reported as `PersistenceWriteFailed` afterwards.
    /// Returns the number of vote log rows removed.
    pub async fn reset(&self, landing: bool) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        inner.state.reset(landing);
        inner.cancel_expiry();
        let cleared = self.store.reset().await;

        self.publish_state(&inner.state.snapshot()).await;
        self.gateway
            .broadcast(ServerEvent::ScoreUpdate { scores: inner.state.scoreboard() })
            .await;
        drop(inner);

        match cleared {
            Ok(rows) => {
                tracing::warn!("Votes reset: {} log rows cleared", rows);
                Ok(rows)
            }
            Err(e) => {
                tracing::error!("Tallies reset in memory but the vote store was not cleared: {}", e);
                Err(Error::PersistenceWriteFailed(e.to_string()))
            }
        }
    }

    // ============ Votes ============

    /// Validate and count one vote.
    ///
    /// The membership check, voter insertion and tally increment happen under
    /// the round lock, so one identity can never have two votes accepted in
    /// the same round. A failed store write is logged and the in-memory tally
    /// stands. On success the new scores go to every subscriber.
    pub async fn submit_vote(
        &self,
        voter: &VoterIdentity,
        contestant_id: Option<ContestantId>,
        vote: VoteType,
    ) -> Result<AcceptedVote> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();

        let outcome = inner.state.cast_vote(voter, contestant_id, vote, now);
        match outcome {
            Ok(accepted) => {
                if let Err(e) = self.store.record_vote(&accepted.contestant, vote, voter, now).await {
                    let err = Error::PersistenceWriteFailed(e.to_string());
                    tracing::error!("Vote from {} counted but not persisted: {}", voter, err);
                }
                self.gateway
                    .broadcast(ServerEvent::ScoreUpdate { scores: inner.state.scoreboard() })
                    .await;
                drop(inner);

                tracing::debug!(
                    "Vote {} for {} from {} (yes={}, no={})",
                    vote,
                    accepted.contestant.name,
                    voter,
                    accepted.tally.yes_count,
                    accepted.tally.no_count
                );
                Ok(accepted)
            }
            Err(Error::RoundExpired) => {
                // cast_vote already closed the round as ENDED
                inner.cancel_expiry();
                self.publish_state(&inner.state.snapshot()).await;
                drop(inner);

                tracing::info!("Late vote from {} closed the expired round", voter);
                Err(Error::RoundExpired)
            }
            Err(e) => Err(e),
        }
    }

    // ============ Helpers ============

    /// Spawn the deferred close for the round opened at `epoch`. The task
    /// only holds a weak handle so it never keeps the hub alive.
    fn schedule_expiry(self: &Arc<Self>, epoch: Epoch, after: Duration) -> JoinHandle<()> {
        let hub: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(hub) = hub.upgrade() {
                hub.expire_round(epoch).await;
            }
        })
    }

    async fn expire_round(&self, epoch: Epoch) {
        let mut inner = self.inner.lock().await;
        let closed = inner.state.close_expired(epoch);
        if closed {
            // This task is the one finishing; just forget the handle
            inner.expiry = None;
            self.publish_state(&inner.state.snapshot()).await;
        }
        drop(inner);

        if closed {
            tracing::info!("Voting round {} reached its deadline", epoch);
        } else {
            tracing::debug!("Deadline for round {} ignored, round already closed", epoch);
        }
    }

    /// Queue a state change for every subscriber. Callers hold the round lock.
    async fn publish_state(&self, snapshot: &RoundSnapshot) {
        self.gateway.broadcast(ServerEvent::StateSnapshot(snapshot.clone())).await;
        self.gateway.broadcast(ServerEvent::voting_status(snapshot)).await;
    }
}
