//! Jackpot core - client library for an on-chain jackpot game
//!
//! Mirrors the current round of a jackpot contract into local state, buys
//! tickets, and runs a keeper that completes rounds once their countdown
//! reaches zero.

pub mod chain;
pub mod client;
pub mod config;
pub mod draw;
pub mod error;
pub mod keeper;
pub mod notify;
pub mod purchase;
pub mod session;
pub mod storage;
pub mod sync;
pub mod types;

pub use client::JackpotClient;
pub use config::{JackpotConfig, KeeperSettings};
pub use draw::DrawEvent;
pub use error::{JackpotError, Result};
pub use keeper::{CompletionOutcome, RoundKeeper, RoundPhase};
pub use notify::{Notification, NotificationCenter, NotificationKind};
pub use purchase::BuyGuard;
pub use session::JackpotSession;
pub use sync::{format_time, time_left, unix_now, RoundSnapshot, RoundSync};
pub use types::{Address, Round, Ticket, WinnerRecord, Wei};

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_client_creation() {
        let temp_dir = tempdir().unwrap();
        let mut config = JackpotConfig::default();
        config.contracts.jackpot =
            Some(Address::from_str("0x5FbDB2315678afecb367f032d93F642f64180aa3").unwrap());

        let client = JackpotClient::new(config, temp_dir.path()).await.unwrap();
        assert_eq!(client.config().chain.chain_id, 16601);
        assert!(client.player_address().is_none());
        assert!(client.cached_history(10).await.unwrap().is_empty());
    }
}
