use crate::chain::abi::{encode_call, Decoder, Token};
use crate::chain::rpc::RpcClient;
use crate::chain::signer::{LegacyTransaction, LocalSigner};
use crate::chain::{HistoryReader, JackpotReader, JackpotWriter};
use crate::error::{JackpotError, Result};
use crate::types::{Address, RoundInfo, RoundRecord, Ticket, TxReceipt, Wei, WinnerRecord};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Read side of the jackpot contract over `eth_call`.
pub struct EvmJackpot {
    rpc: Arc<RpcClient>,
    address: Address,
}

impl EvmJackpot {
    pub fn new(rpc: Arc<RpcClient>, address: Address) -> Self {
        Self { rpc, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    async fn call(&self, signature: &str, args: &[Token]) -> Result<Vec<u8>> {
        let data = encode_call(signature, args);
        self.rpc.call(&self.address, &data).await
    }
}

#[async_trait]
impl JackpotReader for EvmJackpot {
    async fn chain_id(&self) -> Result<u64> {
        self.rpc.chain_id().await
    }

    async fn current_round_id(&self) -> Result<u64> {
        let out = self.call("currentRoundId()", &[]).await?;
        Decoder::new(&out).u64(0)
    }

    async fn round(&self, round_id: u64) -> Result<RoundRecord> {
        let out = self
            .call("rounds(uint256)", &[Token::Uint(round_id as u128)])
            .await?;
        let d = Decoder::new(&out);
        Ok(RoundRecord {
            id: d.u64(0)?,
            start_time: d.u64(1)?,
            end_time: d.u64(2)?,
            total_pool: d.wei(3)?,
            winner: d.address(4)?,
            winning_ticket_id: d.u64(5)?,
            completed: d.bool(6)?,
        })
    }

    async fn current_round_info(&self) -> Result<RoundInfo> {
        let out = self.call("getCurrentRoundInfo()", &[]).await?;
        let d = Decoder::new(&out);
        Ok(RoundInfo {
            id: d.u64(0)?,
            start_time: d.u64(1)?,
            end_time: d.u64(2)?,
            total_pool: d.wei(3)?,
            num_tickets: d.u64(4)?,
            is_active: d.bool(5)?,
            time_left: d.u64(6)?,
        })
    }

    async fn ticket(&self, ticket_id: u64) -> Result<Ticket> {
        let out = self
            .call("tickets(uint256)", &[Token::Uint(ticket_id as u128)])
            .await?;
        let d = Decoder::new(&out);
        Ok(Ticket {
            id: d.u64(0)?,
            owner: d.address(1)?,
            round_id: d.u64(2)?,
            timestamp: d.u64(3)?,
        })
    }

    async fn user_tickets(&self, owner: &Address) -> Result<Vec<u64>> {
        let out = self
            .call("getUserTickets(address)", &[Token::Address(*owner)])
            .await?;
        Decoder::new(&out).u64_array(0)
    }

    async fn round_tickets(&self, round_id: u64) -> Result<Vec<u64>> {
        let out = self
            .call("getRoundTickets(uint256)", &[Token::Uint(round_id as u128)])
            .await?;
        Decoder::new(&out).u64_array(0)
    }

    async fn min_deposit(&self) -> Result<Wei> {
        let out = self.call("MIN_DEPOSIT()", &[]).await?;
        Decoder::new(&out).wei(0)
    }
}

/// Read side of the winners history contract.
pub struct EvmHistory {
    rpc: Arc<RpcClient>,
    address: Address,
}

impl EvmHistory {
    pub fn new(rpc: Arc<RpcClient>, address: Address) -> Self {
        Self { rpc, address }
    }
}

#[async_trait]
impl HistoryReader for EvmHistory {
    async fn total_winners(&self) -> Result<u64> {
        let data = encode_call("getTotalWinners()", &[]);
        let out = self.rpc.call(&self.address, &data).await?;
        Decoder::new(&out).u64(0)
    }

    async fn winners(&self, offset: u64, limit: u64) -> Result<Vec<WinnerRecord>> {
        let data = encode_call(
            "getWinners(uint256,uint256)",
            &[Token::Uint(offset as u128), Token::Uint(limit as u128)],
        );
        let out = self.rpc.call(&self.address, &data).await?;

        Decoder::new(&out)
            .tuple_array(0, 5)?
            .into_iter()
            .map(|d| -> Result<WinnerRecord> {
                Ok(WinnerRecord {
                    round_id: d.u64(0)?,
                    winner: d.address(1)?,
                    winning_ticket_id: d.u64(2)?,
                    prize: d.wei(3)?,
                    timestamp: d.u64(4)?,
                })
            })
            .collect()
    }
}

/// Signs and submits jackpot transactions from a locally held key.
pub struct EvmWriter {
    rpc: Arc<RpcClient>,
    contract: Address,
    signer: LocalSigner,
    chain_id: u64,
    receipt_poll_interval: Duration,
    receipt_timeout: Duration,
}

impl EvmWriter {
    pub fn new(
        rpc: Arc<RpcClient>,
        contract: Address,
        signer: LocalSigner,
        chain_id: u64,
        receipt_poll_interval: Duration,
        receipt_timeout: Duration,
    ) -> Self {
        Self {
            rpc,
            contract,
            signer,
            chain_id,
            receipt_poll_interval,
            receipt_timeout,
        }
    }

    async fn send(&self, signature: &str, value: Wei) -> Result<String> {
        let from = self.signer.address();
        let data = encode_call(signature, &[]);

        let nonce = self.rpc.transaction_count(&from).await?;
        let gas_price = self.rpc.gas_price().await?;
        let estimate = self
            .rpc
            .estimate_gas(&from, &self.contract, value, &data)
            .await?;
        // 20% headroom over the estimate
        let gas_limit = estimate.saturating_add(estimate / 5);

        let tx = LegacyTransaction {
            nonce,
            gas_price,
            gas_limit,
            to: self.contract,
            value,
            data,
            chain_id: self.chain_id,
        };

        let raw = self.signer.sign_legacy(&tx)?;
        let tx_hash = self.rpc.send_raw_transaction(&raw).await?;

        tracing::debug!(
            "Submitted {} from {} (nonce {}, gas {}): {}",
            signature,
            from,
            nonce,
            gas_limit,
            tx_hash
        );
        Ok(tx_hash)
    }
}

#[async_trait]
impl JackpotWriter for EvmWriter {
    fn sender(&self) -> Address {
        self.signer.address()
    }

    async fn buy_tickets(&self, value: Wei) -> Result<String> {
        self.send("buyTickets()", value).await
    }

    async fn complete_round(&self) -> Result<String> {
        self.send("completeRound()", Wei::ZERO).await
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TxReceipt> {
        let deadline = tokio::time::Instant::now() + self.receipt_timeout;

        loop {
            if let Some(receipt) = self.rpc.transaction_receipt(tx_hash).await? {
                if !receipt.success {
                    return Err(JackpotError::contract(format!(
                        "Transaction {} reverted",
                        tx_hash
                    )));
                }
                return Ok(receipt);
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(JackpotError::timeout(format!(
                    "No receipt for {} after {:?}",
                    tx_hash, self.receipt_timeout
                )));
            }

            tokio::time::sleep(self.receipt_poll_interval).await;
        }
    }
}
