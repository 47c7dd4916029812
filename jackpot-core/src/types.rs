use crate::error::{JackpotError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;
const ETHER_DECIMALS: usize = 18;

/// Native currency amount in wei.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Wei(pub u128);

impl Wei {
    pub const ZERO: Wei = Wei(0);

    pub fn from_wei(wei: u128) -> Self {
        Self(wei)
    }

    pub fn as_wei(&self) -> u128 {
        self.0
    }

    /// Parse a decimal ether amount such as `"0.02"`.
    pub fn from_ether_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(JackpotError::InvalidAmount("empty amount".to_string()));
        }

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };

        if frac.len() > ETHER_DECIMALS {
            return Err(JackpotError::InvalidAmount(format!(
                "{} has more than {} decimals",
                s, ETHER_DECIMALS
            )));
        }

        let digits_ok = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if !digits_ok(whole) || !digits_ok(frac) || (whole.is_empty() && frac.is_empty()) {
            return Err(JackpotError::InvalidAmount(s.to_string()));
        }

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| JackpotError::InvalidAmount(s.to_string()))?
        };

        let frac_wei: u128 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{:0<width$}", frac, width = ETHER_DECIMALS);
            padded
                .parse()
                .map_err(|_| JackpotError::InvalidAmount(s.to_string()))?
        };

        whole
            .checked_mul(WEI_PER_ETHER)
            .and_then(|w| w.checked_add(frac_wei))
            .map(Wei)
            .ok_or_else(|| JackpotError::InvalidAmount(format!("{} overflows", s)))
    }

    /// Format as ether rounded to `decimals` places.
    pub fn to_ether(&self, decimals: usize) -> String {
        let decimals = decimals.min(ETHER_DECIMALS);
        let scale = 10u128.pow((ETHER_DECIMALS - decimals) as u32);
        let rounded = self.0 / scale + u128::from(self.0 % scale >= scale / 2 && scale > 1);
        let unit = 10u128.pow(decimals as u32);
        let whole = rounded / unit;
        if decimals == 0 {
            return whole.to_string();
        }
        format!(
            "{}.{:0width$}",
            whole,
            rounded % unit,
            width = decimals
        )
    }

    /// Exact ether value with trailing zeros trimmed, e.g. `0.02`.
    pub fn to_ether_compact(&self) -> String {
        let whole = self.0 / WEI_PER_ETHER;
        let frac = self.0 % WEI_PER_ETHER;
        if frac == 0 {
            return whole.to_string();
        }
        let frac = format!("{:018}", frac);
        format!("{}.{}", whole, frac.trim_end_matches('0'))
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_ether(4))
    }
}

impl std::ops::Add for Wei {
    type Output = Wei;

    fn add(self, rhs: Wei) -> Wei {
        Wei(self.0.saturating_add(rhs.0))
    }
}

/// 20-byte EVM account or contract address.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// `0x1234...5678`
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}...{}", &full[..6], &full[full.len() - 4..])
    }
}

impl FromStr for Address {
    type Err = JackpotError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes =
            hex::decode(hex_part).map_err(|_| JackpotError::InvalidAddress(s.to_string()))?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| JackpotError::InvalidAddress(s.to_string()))?;
        Ok(Address(arr))
    }
}

impl TryFrom<String> for Address {
    type Error = JackpotError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.to_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

/// Decoded `getCurrentRoundInfo()` tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundInfo {
    pub id: u64,
    pub start_time: u64,
    pub end_time: u64,
    pub total_pool: Wei,
    pub num_tickets: u64,
    pub is_active: bool,
    pub time_left: u64,
}

/// Decoded `rounds(id)` mapping entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub id: u64,
    pub start_time: u64,
    pub end_time: u64,
    pub total_pool: Wei,
    pub winner: Address,
    pub winning_ticket_id: u64,
    pub completed: bool,
}

/// Merged client-side snapshot of a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: u64,
    pub start_time: u64,
    pub end_time: u64,
    pub total_pool: Wei,
    pub num_tickets: u64,
    pub is_active: bool,
    pub completed: bool,
    pub winner: Address,
    pub winning_ticket_id: u64,
}

impl Round {
    /// Build from the round info, taking winner data from the mapping entry
    /// when it refers to the same round.
    pub fn from_info(info: &RoundInfo, record: Option<&RoundRecord>) -> Self {
        let record = record.filter(|r| r.id == info.id);
        Self {
            id: info.id,
            start_time: info.start_time,
            end_time: info.end_time,
            total_pool: info.total_pool,
            num_tickets: info.num_tickets,
            is_active: info.is_active,
            completed: !info.is_active,
            winner: record.map(|r| r.winner).unwrap_or(Address::ZERO),
            winning_ticket_id: record.map(|r| r.winning_ticket_id).unwrap_or(0),
        }
    }

    /// Fallback when `getCurrentRoundInfo` is unavailable.
    pub fn from_record(record: &RoundRecord, num_tickets: u64) -> Self {
        Self {
            id: record.id,
            start_time: record.start_time,
            end_time: record.end_time,
            total_pool: record.total_pool,
            num_tickets,
            is_active: !record.completed,
            completed: record.completed,
            winner: record.winner,
            winning_ticket_id: record.winning_ticket_id,
        }
    }

    pub fn has_winner(&self) -> bool {
        self.completed && self.winning_ticket_id != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: u64,
    pub owner: Address,
    pub round_id: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerRecord {
    pub round_id: u64,
    pub winner: Address,
    pub winning_ticket_id: u64,
    pub prize: Wei,
    pub timestamp: u64,
}

impl WinnerRecord {
    pub fn date(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp as i64, 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub success: bool,
}
