//! Access to the jackpot and history contracts.
//!
//! Reads and writes go through the traits below so the reconciliation loop
//! and the keeper can run against a live node or an in-memory double.

pub mod abi;
pub mod contract;
pub mod rlp;
pub mod rpc;
pub mod signer;

#[cfg(test)]
pub(crate) mod mock;

pub use contract::{EvmHistory, EvmJackpot, EvmWriter};
pub use rpc::RpcClient;
pub use signer::LocalSigner;

use crate::error::Result;
use crate::types::{Address, RoundInfo, RoundRecord, Ticket, TxReceipt, Wei, WinnerRecord};
use async_trait::async_trait;

#[async_trait]
pub trait JackpotReader: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;

    async fn current_round_id(&self) -> Result<u64>;

    async fn round(&self, round_id: u64) -> Result<RoundRecord>;

    async fn current_round_info(&self) -> Result<RoundInfo>;

    async fn ticket(&self, ticket_id: u64) -> Result<Ticket>;

    async fn user_tickets(&self, owner: &Address) -> Result<Vec<u64>>;

    async fn round_tickets(&self, round_id: u64) -> Result<Vec<u64>>;

    async fn min_deposit(&self) -> Result<Wei>;
}

/// State-changing calls signed by a single account.
#[async_trait]
pub trait JackpotWriter: Send + Sync {
    fn sender(&self) -> Address;

    /// Returns the transaction hash once the node accepted it.
    async fn buy_tickets(&self, value: Wei) -> Result<String>;

    async fn complete_round(&self) -> Result<String>;

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TxReceipt>;
}

#[async_trait]
pub trait HistoryReader: Send + Sync {
    async fn total_winners(&self) -> Result<u64>;

    async fn winners(&self, offset: u64, limit: u64) -> Result<Vec<WinnerRecord>>;
}
