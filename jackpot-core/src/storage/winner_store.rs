use crate::error::Result;
use crate::storage::Storage;
use crate::types::{Address, Wei, WinnerRecord};
use rusqlite::params;

pub struct WinnerStore<'a> {
    storage: &'a Storage,
}

impl<'a> WinnerStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub async fn upsert_many(&self, winners: &[WinnerRecord]) -> Result<()> {
        let conn = self.storage.get_connection().await;

        for winner in winners {
            conn.execute(
                "INSERT OR REPLACE INTO winners (round_id, winner, winning_ticket_id, prize_wei, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    winner.round_id as i64,
                    winner.winner.to_string(),
                    winner.winning_ticket_id as i64,
                    winner.prize.as_wei().to_string(),
                    winner.timestamp as i64,
                ],
            )?;
        }

        Ok(())
    }

    /// Most recent rounds first.
    pub async fn recent(&self, limit: u64) -> Result<Vec<WinnerRecord>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT round_id, winner, winning_ticket_id, prize_wei, timestamp
             FROM winners ORDER BY round_id DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            let winner: String = row.get(1)?;
            let prize: String = row.get(3)?;
            Ok(WinnerRecord {
                round_id: row.get::<_, i64>(0)? as u64,
                winner: winner.parse().unwrap_or(Address::ZERO),
                winning_ticket_id: row.get::<_, i64>(2)? as u64,
                prize: Wei(prize.parse().unwrap_or(0)),
                timestamp: row.get::<_, i64>(4)? as u64,
            })
        })?;

        let mut winners = Vec::new();
        for winner in rows {
            winners.push(winner?);
        }

        Ok(winners)
    }

    pub async fn count(&self) -> Result<u64> {
        let conn = self.storage.get_connection().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM winners", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
