//! Vote Store
//!
//! SQLite-backed persistence for contestants, their aggregate counters,
//! and the append-only vote log.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::model::{Contestant, ContestantId, VoteTally, VoteType, VoterIdentity};

/// One row of the vote log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub id: i64,
    pub contestant_id: ContestantId,
    pub contestant_name: String,
    pub vote_type: VoteType,
    pub voter_identity: String,
    pub timestamp: DateTime<Utc>,
}

/// Persistent vote store backed by SQLite
pub struct VoteStore {
    /// Database connection
    conn: Mutex<Connection>,
    /// Database file
    path: PathBuf,
}

impl VoteStore {
    /// Create or open the vote database
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Initialize schema
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS contestants (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                yes_votes INTEGER NOT NULL DEFAULT 0,
                no_votes INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS votes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                contestant_id INTEGER NOT NULL REFERENCES contestants(id),
                contestant_name TEXT NOT NULL,
                vote_type TEXT NOT NULL CHECK (vote_type IN ('yes', 'no')),
                voter_identity TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_votes_contestant
                ON votes(contestant_id);
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    /// Insert contestants if the table is empty. Returns how many were added.
    pub async fn seed_contestants<S: AsRef<str>>(&self, names: &[S]) -> Result<usize> {
        let mut conn = self.conn.lock().await;
        let existing: i64 = conn.query_row("SELECT COUNT(*) FROM contestants", [], |row| row.get(0))?;
        if existing > 0 {
            tracing::debug!("Contestant table already has {} rows, skipping seed", existing);
            return Ok(0);
        }

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT INTO contestants (name) VALUES (?1)")?;
            for name in names {
                stmt.execute(params![name.as_ref().trim()])?;
            }
        }
        tx.commit()?;

        Ok(names.len())
    }

    /// Add a single contestant
    pub async fn add_contestant(&self, name: &str) -> Result<Contestant> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidRequest("contestant name cannot be empty".into()));
        }

        let conn = self.conn.lock().await;
        conn.execute("INSERT INTO contestants (name) VALUES (?1)", params![name])?;
        Ok(Contestant {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    /// All contestants in id order
    pub async fn contestants(&self) -> Result<Vec<Contestant>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT id, name FROM contestants ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Contestant {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;

        let mut contestants = Vec::new();
        for result in rows {
            contestants.push(result?);
        }

        Ok(contestants)
    }

    /// Persisted aggregate counters for every contestant
    pub async fn tallies(&self) -> Result<Vec<(Contestant, VoteTally)>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, name, yes_votes, no_votes FROM contestants ORDER BY id"
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                Contestant {
                    id: row.get(0)?,
                    name: row.get(1)?,
                },
                VoteTally {
                    yes_count: row.get::<_, i64>(2)? as u64,
                    no_count: row.get::<_, i64>(3)? as u64,
                },
            ))
        })?;

        let mut tallies = Vec::new();
        for result in rows {
            tallies.push(result?);
        }

        Ok(tallies)
    }

    /// Append a vote to the log and bump the contestant's counter.
    /// Returns the log row id.
    pub async fn record_vote(
        &self,
        contestant: &Contestant,
        vote: VoteType,
        voter: &VoterIdentity,
        at: DateTime<Utc>,
    ) -> Result<i64> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let counter = match vote {
            VoteType::Yes => "UPDATE contestants SET yes_votes = yes_votes + 1 WHERE id = ?1",
            VoteType::No => "UPDATE contestants SET no_votes = no_votes + 1 WHERE id = ?1",
        };
        if tx.execute(counter, params![contestant.id])? == 0 {
            return Err(Error::UnknownContestant(contestant.id));
        }

        tx.execute(
            r#"
            INSERT INTO votes (contestant_id, contestant_name, vote_type, voter_identity, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![contestant.id, contestant.name, vote.as_str(), voter.as_str(), at],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(id)
    }

    /// Zero every counter and clear the vote log. Returns the number of
    /// log rows removed.
    pub async fn reset(&self) -> Result<u64> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute("UPDATE contestants SET yes_votes = 0, no_votes = 0", [])?;
        let deleted = tx.execute("DELETE FROM votes", [])?;
        tx.commit()?;
        Ok(deleted as u64)
    }

    /// Full vote log, oldest first
    pub async fn vote_log(&self) -> Result<Vec<VoteRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, contestant_id, contestant_name, vote_type, voter_identity, created_at
            FROM votes ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            let vote_type: String = row.get(3)?;
            let vote_type = vote_type.parse::<VoteType>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
            })?;
            Ok(VoteRecord {
                id: row.get(0)?,
                contestant_id: row.get(1)?,
                contestant_name: row.get(2)?,
                vote_type,
                voter_identity: row.get(4)?,
                timestamp: row.get(5)?,
            })
        })?;

        let mut log = Vec::new();
        for result in rows {
            log.push(result?);
        }

        Ok(log)
    }

    /// Number of rows in the vote log
    pub async fn vote_count(&self) -> Result<u64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM votes", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Database file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn names() -> Vec<String> {
        vec!["Alice".to_string(), "Bob".to_string()]
    }

    #[tokio::test]
    async fn test_seed_only_once() {
        let dir = tempdir().unwrap();
        let store = VoteStore::open(&dir.path().join("voting.db")).unwrap();

        assert_eq!(store.seed_contestants(&names()).await.unwrap(), 2);
        assert_eq!(store.seed_contestants(&names()).await.unwrap(), 0);

        let contestants = store.contestants().await.unwrap();
        assert_eq!(contestants.len(), 2);
        assert_eq!(contestants[0].name, "Alice");
    }

    #[tokio::test]
    async fn test_record_and_reset() {
        let dir = tempdir().unwrap();
        let store = VoteStore::open(&dir.path().join("voting.db")).unwrap();
        store.seed_contestants(&names()).await.unwrap();
        let alice = store.contestants().await.unwrap().remove(0);

        store.record_vote(&alice, VoteType::Yes, &VoterIdentity::new("10.0.0.1"), Utc::now()).await.unwrap();
        store.record_vote(&alice, VoteType::No, &VoterIdentity::new("10.0.0.2"), Utc::now()).await.unwrap();

        let tallies = store.tallies().await.unwrap();
        assert_eq!(tallies[0].1, VoteTally { yes_count: 1, no_count: 1 });
        assert_eq!(tallies[1].1, VoteTally::default());

        let log = store.vote_log().await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].contestant_name, "Alice");
        assert_eq!(log[0].vote_type, VoteType::Yes);
        assert_eq!(log[1].voter_identity, "10.0.0.2");

        assert_eq!(store.reset().await.unwrap(), 2);
        assert_eq!(store.vote_count().await.unwrap(), 0);
        assert!(store.tallies().await.unwrap().iter().all(|(_, t)| t.total() == 0));
        // Contestants survive a reset
        assert_eq!(store.contestants().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_contestant_rolls_back() {
        let dir = tempdir().unwrap();
        let store = VoteStore::open(&dir.path().join("voting.db")).unwrap();
        let ghost = Contestant { id: 99, name: "Ghost".to_string() };

        let result = store.record_vote(&ghost, VoteType::Yes, &VoterIdentity::new("a"), Utc::now()).await;
        assert!(matches!(result, Err(Error::UnknownContestant(99))));
        assert_eq!(store.vote_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reopen_keeps_counters() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("voting.db");
        {
            let store = VoteStore::open(&path).unwrap();
            store.seed_contestants(&names()).await.unwrap();
            let carol = store.add_contestant("Carol").await.unwrap();
            store.record_vote(&carol, VoteType::Yes, &VoterIdentity::new("x"), Utc::now()).await.unwrap();
        }

        let store = VoteStore::open(&path).unwrap();
        let tallies = store.tallies().await.unwrap();
        assert_eq!(tallies.len(), 3);
        assert_eq!(tallies[2].0.name, "Carol");
        assert_eq!(tallies[2].1.yes_count, 1);
    }
}
