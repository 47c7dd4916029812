use crate::chain::{HistoryReader, JackpotReader, JackpotWriter};
use crate::error::{JackpotError, Result};
use crate::types::{Address, RoundInfo, RoundRecord, Ticket, TxReceipt, Wei, WinnerRecord};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct MockState {
    pub chain_id: u64,
    pub info: Option<RoundInfo>,
    pub records: HashMap<u64, RoundRecord>,
    pub tickets: HashMap<u64, Ticket>,
    pub user_tickets: HashMap<Address, Vec<u64>>,
    pub round_tickets: HashMap<u64, Vec<u64>>,
    pub winners: Vec<WinnerRecord>,
    pub fail_reads: bool,
    pub failing_ticket_ids: HashSet<u64>,
    pub read_delay: Option<Duration>,
    /// Leading `complete_round` calls that revert before one succeeds.
    pub complete_failures: u32,
    pub complete_calls: u32,
    pub buy_calls: Vec<Wei>,
    pub fail_buys: bool,
    /// Contract `MIN_DEPOSIT`; 0.02 when unset.
    pub min_deposit: Option<Wei>,
    pub info_calls: u32,
    pub round_ticket_calls: u32,
    pub ticket_calls: u32,
}

pub struct MockJackpot {
    pub state: Mutex<MockState>,
    sender: Address,
}

pub fn addr(byte: u8) -> Address {
    Address([byte; 20])
}

impl MockJackpot {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                chain_id: 16601,
                ..Default::default()
            }),
            sender: addr(0xaa),
        }
    }

    /// Active round `id` ending at `end_time`, with tickets `(id, owner)`.
    pub fn with_round(id: u64, end_time: u64, tickets: &[(u64, Address)]) -> Self {
        let mock = Self::new();
        mock.set_round(id, end_time, tickets);
        mock
    }

    pub fn set_round(&self, id: u64, end_time: u64, tickets: &[(u64, Address)]) {
        let mut state = self.state.lock();
        let pool = Wei(10_000_000_000_000_000 * tickets.len() as u128);
        state.info = Some(RoundInfo {
            id,
            start_time: end_time.saturating_sub(300),
            end_time,
            total_pool: pool,
            num_tickets: tickets.len() as u64,
            is_active: true,
            time_left: 0,
        });
        state.records.insert(
            id,
            RoundRecord {
                id,
                start_time: end_time.saturating_sub(300),
                end_time,
                total_pool: pool,
                winner: Address::ZERO,
                winning_ticket_id: 0,
                completed: false,
            },
        );
        state
            .round_tickets
            .insert(id, tickets.iter().map(|(t, _)| *t).collect());
        state.user_tickets.clear();
        for (ticket_id, owner) in tickets {
            state.tickets.insert(
                *ticket_id,
                Ticket {
                    id: *ticket_id,
                    owner: *owner,
                    round_id: id,
                    timestamp: 0,
                },
            );
            state.user_tickets.entry(*owner).or_default().push(*ticket_id);
        }
    }

    /// Finalize the current round with its first ticket as the winner.
    pub fn finish_round(&self) {
        let mut state = self.state.lock();
        let Some(info) = state.info.as_mut() else {
            return;
        };
        info.is_active = false;
        let round_id = info.id;
        let pool = info.total_pool;
        let winning = state
            .round_tickets
            .get(&round_id)
            .and_then(|ids| ids.first().copied())
            .unwrap_or(0);
        let winner = state
            .tickets
            .get(&winning)
            .map(|t| t.owner)
            .unwrap_or(Address::ZERO);
        if let Some(record) = state.records.get_mut(&round_id) {
            record.completed = true;
            record.winner = winner;
            record.winning_ticket_id = winning;
        }
        state.winners.insert(
            0,
            WinnerRecord {
                round_id,
                winner,
                winning_ticket_id: winning,
                prize: pool,
                timestamp: 1_700_000_000 + round_id,
            },
        );
    }

    async fn read_gate(&self) -> Result<()> {
        let (fail, delay) = {
            let state = self.state.lock();
            (state.fail_reads, state.read_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(JackpotError::rpc("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl JackpotReader for MockJackpot {
    async fn chain_id(&self) -> Result<u64> {
        self.read_gate().await?;
        Ok(self.state.lock().chain_id)
    }

    async fn current_round_id(&self) -> Result<u64> {
        self.read_gate().await?;
        Ok(self.state.lock().info.as_ref().map(|i| i.id).unwrap_or(0))
    }

    async fn round(&self, round_id: u64) -> Result<RoundRecord> {
        self.read_gate().await?;
        self.state
            .lock()
            .records
            .get(&round_id)
            .cloned()
            .ok_or_else(|| JackpotError::contract("unknown round"))
    }

    async fn current_round_info(&self) -> Result<RoundInfo> {
        self.read_gate().await?;
        let mut state = self.state.lock();
        state.info_calls += 1;
        state
            .info
            .clone()
            .ok_or_else(|| JackpotError::contract("no round"))
    }

    async fn ticket(&self, ticket_id: u64) -> Result<Ticket> {
        self.read_gate().await?;
        let mut state = self.state.lock();
        state.ticket_calls += 1;
        if state.failing_ticket_ids.contains(&ticket_id) {
            return Err(JackpotError::rpc("ticket lookup failed"));
        }
        state
            .tickets
            .get(&ticket_id)
            .cloned()
            .ok_or_else(|| JackpotError::contract("unknown ticket"))
    }

    async fn user_tickets(&self, owner: &Address) -> Result<Vec<u64>> {
        self.read_gate().await?;
        Ok(self
            .state
            .lock()
            .user_tickets
            .get(owner)
            .cloned()
            .unwrap_or_default())
    }

    async fn round_tickets(&self, round_id: u64) -> Result<Vec<u64>> {
        self.read_gate().await?;
        let mut state = self.state.lock();
        state.round_ticket_calls += 1;
        Ok(state
            .round_tickets
            .get(&round_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn min_deposit(&self) -> Result<Wei> {
        self.read_gate().await?;
        Ok(self
            .state
            .lock()
            .min_deposit
            .unwrap_or(Wei(20_000_000_000_000_000)))
    }
}

#[async_trait]
impl JackpotWriter for MockJackpot {
    fn sender(&self) -> Address {
        self.sender
    }

    async fn buy_tickets(&self, value: Wei) -> Result<String> {
        let mut state = self.state.lock();
        if state.fail_buys {
            return Err(JackpotError::contract("user rejected transaction"));
        }
        state.buy_calls.push(value);
        Ok(format!("0xbuy{}", state.buy_calls.len()))
    }

    async fn complete_round(&self) -> Result<String> {
        let calls = {
            let mut state = self.state.lock();
            state.complete_calls += 1;
            if state.complete_failures > 0 {
                state.complete_failures -= 1;
                return Err(JackpotError::contract("execution reverted"));
            }
            state.complete_calls
        };
        self.finish_round();
        Ok(format!("0xcomplete{}", calls))
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TxReceipt> {
        Ok(TxReceipt {
            tx_hash: tx_hash.to_string(),
            block_number: 1,
            success: true,
        })
    }
}

#[async_trait]
impl HistoryReader for MockJackpot {
    async fn total_winners(&self) -> Result<u64> {
        self.read_gate().await?;
        Ok(self.state.lock().winners.len() as u64)
    }

    async fn winners(&self, offset: u64, limit: u64) -> Result<Vec<WinnerRecord>> {
        self.read_gate().await?;
        Ok(self
            .state
            .lock()
            .winners
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
