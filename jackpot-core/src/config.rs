use crate::error::{JackpotError, Result};
use crate::types::{Address, Wei};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JackpotConfig {
    pub chain: ChainConfig,
    pub contracts: ContractAddresses,
    pub ticket_price: Wei,
    pub min_payment: Wei,
    pub lock_period_secs: u64,
    pub keeper: KeeperSettings,
    #[serde(skip)]
    pub admin_private_key: Option<PrivateKey>,
    #[serde(skip)]
    pub player_private_key: Option<PrivateKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub chain_name: String,
    pub chain_id: u64,
    pub symbol: String,
    pub rpc_url: String,
    pub explorer_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractAddresses {
    pub jackpot: Option<Address>,
    pub history: Option<Address>,
}

/// Timers and bounds for the reconciliation loop and the keeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeeperSettings {
    pub poll_interval: Duration,
    pub full_refresh_every: u32,
    pub countdown_tick: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub confirmation_delay: Duration,
    pub fallback_check_interval: Duration,
    pub fallback_idle_threshold: Duration,
    pub receipt_poll_interval: Duration,
    pub receipt_timeout: Duration,
    pub notification_ttl: Duration,
    pub draw_tick: Duration,
    pub draw_ticks: u32,
    pub reveal_delay: Duration,
    pub history_limit: u64,
}

/// Hex-encoded secp256k1 key. Never serialized, redacted in debug output.
#[derive(Clone)]
pub struct PrivateKey(String);

impl PrivateKey {
    pub fn new(hex_key: impl Into<String>) -> Self {
        Self(hex_key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_name: "OG-Galileo-Testnet".to_string(),
            chain_id: 16601,
            symbol: "OG".to_string(),
            rpc_url: "https://evmrpc-testnet.0g.ai".to_string(),
            explorer_url: "https://chainscan-galileo.0g.ai/".to_string(),
        }
    }
}

impl ChainConfig {
    /// Explorer link for a transaction hash.
    pub fn tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url.trim_end_matches('/'), tx_hash)
    }
}

impl Default for KeeperSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            full_refresh_every: 5,
            countdown_tick: Duration::from_millis(100),
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
            confirmation_delay: Duration::from_secs(2),
            fallback_check_interval: Duration::from_secs(10),
            fallback_idle_threshold: Duration::from_secs(30),
            receipt_poll_interval: Duration::from_secs(1),
            receipt_timeout: Duration::from_secs(60),
            notification_ttl: Duration::from_secs(5),
            draw_tick: Duration::from_millis(100),
            draw_ticks: 30,
            reveal_delay: Duration::from_millis(500),
            history_limit: 10,
        }
    }
}

impl Default for JackpotConfig {
    fn default() -> Self {
        Self {
            chain: ChainConfig::default(),
            contracts: ContractAddresses::default(),
            ticket_price: Wei(10_000_000_000_000_000), // 0.01
            min_payment: Wei(20_000_000_000_000_000),  // 0.02
            lock_period_secs: 5,
            keeper: KeeperSettings::default(),
            admin_private_key: None,
            player_private_key: None,
        }
    }
}

impl JackpotConfig {
    /// Defaults, then the optional JSON file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)?;
                tracing::debug!("Loaded config file {}", p.display());
                serde_json::from_str(&raw)?
            }
            _ => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `JACKPOT_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("JACKPOT_CHAIN") {
            self.chain.chain_name = v;
        }
        if let Some(v) = get("JACKPOT_CHAIN_ID") {
            self.chain.chain_id = v
                .trim()
                .parse()
                .map_err(|_| JackpotError::config(format!("Invalid JACKPOT_CHAIN_ID: {}", v)))?;
        }
        if let Some(v) = get("JACKPOT_SYMBOL") {
            self.chain.symbol = v;
        }
        if let Some(v) = get("JACKPOT_RPC") {
            self.chain.rpc_url = v;
        }
        if let Some(v) = get("JACKPOT_EXPLORER") {
            self.chain.explorer_url = v;
        }
        if let Some(v) = get("JACKPOT_CONTRACT") {
            self.contracts.jackpot = Some(v.parse()?);
        }
        if let Some(v) = get("JACKPOT_HISTORY_CONTRACT") {
            self.contracts.history = Some(v.parse()?);
        }
        if let Some(v) = get("JACKPOT_TICKET_PRICE") {
            self.ticket_price = Wei::from_ether_str(&v)?;
        }
        if let Some(v) = get("JACKPOT_MIN_PAYMENT") {
            self.min_payment = Wei::from_ether_str(&v)?;
        }
        if let Some(v) = get("JACKPOT_ADMIN_PRIVATE_KEY") {
            self.admin_private_key = Some(PrivateKey::new(v));
        }
        if let Some(v) = get("JACKPOT_PRIVATE_KEY") {
            self.player_private_key = Some(PrivateKey::new(v));
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chain.rpc_url.is_empty() {
            return Err(JackpotError::config("RPC URL cannot be empty"));
        }

        if self.chain.chain_id == 0 {
            return Err(JackpotError::config("Chain id must be greater than 0"));
        }

        if self.ticket_price == Wei::ZERO {
            return Err(JackpotError::config("Ticket price must be greater than 0"));
        }

        if self.min_payment < self.ticket_price {
            return Err(JackpotError::config(
                "Minimum payment cannot be below the ticket price",
            ));
        }

        if self.keeper.max_attempts == 0 {
            return Err(JackpotError::config("Keeper needs at least one attempt"));
        }

        if self.keeper.full_refresh_every == 0 {
            return Err(JackpotError::config(
                "Full refresh interval must be at least 1 cycle",
            ));
        }

        Ok(())
    }

    pub fn jackpot_address(&self) -> Result<Address> {
        self.contracts
            .jackpot
            .ok_or_else(|| JackpotError::config("Jackpot contract address not configured"))
    }

    pub fn history_address(&self) -> Result<Address> {
        self.contracts
            .history
            .ok_or_else(|| JackpotError::config("History contract address not configured"))
    }
}
