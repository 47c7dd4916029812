pub mod attempt_store;
pub mod winner_store;

pub use attempt_store::{AttemptStore, CompletionAttempt};
pub use winner_store::WinnerStore;

use crate::error::{JackpotError, Result};
use rusqlite::Connection;
use std::path::Path;
use tokio::sync::Mutex;

pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    pub async fn new(db_path: &Path) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| JackpotError::internal(format!("Failed to create directory: {}", e)))?;
        }

        let conn = Connection::open(db_path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };

        storage.init_schema().await?;
        Ok(storage)
    }

    pub async fn in_memory() -> Result<Self> {
        let storage = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().await;

        // Keeper audit log, one row per completeRound attempt
        conn.execute(
            "CREATE TABLE IF NOT EXISTS completion_attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                round_id INTEGER NOT NULL,
                attempt INTEGER NOT NULL,
                success INTEGER NOT NULL,
                tx_hash TEXT,
                error TEXT,
                timestamp INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_attempts_round ON completion_attempts(round_id)",
            [],
        )?;

        // Winners history cache
        conn.execute(
            "CREATE TABLE IF NOT EXISTS winners (
                round_id INTEGER PRIMARY KEY,
                winner TEXT NOT NULL,
                winning_ticket_id INTEGER NOT NULL,
                prize_wei TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    pub async fn get_connection(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}
