use crate::error::Result;
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionAttempt {
    pub round_id: u64,
    pub attempt: u32,
    pub success: bool,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

pub struct AttemptStore<'a> {
    storage: &'a Storage,
}

impl<'a> AttemptStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub async fn record(&self, attempt: &CompletionAttempt) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "INSERT INTO completion_attempts (round_id, attempt, success, tx_hash, error, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                attempt.round_id as i64,
                attempt.attempt,
                attempt.success,
                attempt.tx_hash,
                attempt.error,
                attempt.timestamp.timestamp(),
            ],
        )?;

        Ok(())
    }

    /// Most recent first, optionally for a single round.
    pub async fn list(&self, round_id: Option<u64>, limit: u32) -> Result<Vec<CompletionAttempt>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT round_id, attempt, success, tx_hash, error, timestamp
             FROM completion_attempts
             WHERE ?1 IS NULL OR round_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![round_id.map(|r| r as i64), limit], |row| {
            Ok(CompletionAttempt {
                round_id: row.get::<_, i64>(0)? as u64,
                attempt: row.get(1)?,
                success: row.get(2)?,
                tx_hash: row.get(3)?,
                error: row.get(4)?,
                timestamp: DateTime::from_timestamp(row.get::<_, i64>(5)?, 0)
                    .unwrap_or_else(Utc::now),
            })
        })?;

        let mut attempts = Vec::new();
        for attempt in rows {
            attempts.push(attempt?);
        }

        Ok(attempts)
    }
}
