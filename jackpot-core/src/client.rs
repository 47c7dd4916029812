use crate::chain::{
    EvmHistory, EvmJackpot, EvmWriter, HistoryReader, JackpotReader, JackpotWriter, LocalSigner,
    RpcClient,
};
use crate::config::{JackpotConfig, PrivateKey};
use crate::error::{JackpotError, Result};
use crate::keeper::RoundKeeper;
use crate::notify::NotificationCenter;
use crate::session::JackpotSession;
use crate::storage::{AttemptStore, CompletionAttempt, Storage, WinnerStore};
use crate::sync::RoundSync;
use crate::types::{Address, WinnerRecord};
use std::path::Path;
use std::sync::Arc;

/// Entry point: wires RPC, contracts, signers and the local database from a
/// [`JackpotConfig`].
pub struct JackpotClient {
    config: JackpotConfig,
    storage: Arc<Storage>,
    jackpot: Arc<EvmJackpot>,
    history: Option<Arc<EvmHistory>>,
    admin: Option<Arc<EvmWriter>>,
    player: Option<Arc<EvmWriter>>,
    notifications: NotificationCenter,
}

impl JackpotClient {
    pub async fn new(config: JackpotConfig, data_dir: &Path) -> Result<Self> {
        config.validate()?;

        let db_path = data_dir.join("jackpot.db");
        let storage = Arc::new(Storage::new(&db_path).await?);

        let rpc = Arc::new(RpcClient::new(config.chain.rpc_url.clone())?);
        let contract = config.jackpot_address()?;
        let jackpot = Arc::new(EvmJackpot::new(rpc.clone(), contract));
        let history = config
            .contracts
            .history
            .map(|address| Arc::new(EvmHistory::new(rpc.clone(), address)));

        let writer = |key: &Option<PrivateKey>| -> Result<Option<Arc<EvmWriter>>> {
            let Some(key) = key else {
                return Ok(None);
            };
            let signer = LocalSigner::from_hex(key.expose())?;
            Ok(Some(Arc::new(EvmWriter::new(
                rpc.clone(),
                contract,
                signer,
                config.chain.chain_id,
                config.keeper.receipt_poll_interval,
                config.keeper.receipt_timeout,
            ))))
        };
        let admin = writer(&config.admin_private_key)?;
        let player = writer(&config.player_private_key)?;

        tracing::debug!(
            "Client ready: contract {} on {} ({})",
            contract,
            config.chain.chain_name,
            config.chain.rpc_url
        );

        Ok(Self {
            notifications: NotificationCenter::new(config.keeper.notification_ttl),
            config,
            storage,
            jackpot,
            history,
            admin,
            player,
        })
    }

    pub fn config(&self) -> &JackpotConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    pub fn reader(&self) -> Arc<dyn JackpotReader> {
        self.jackpot.clone()
    }

    pub fn admin_address(&self) -> Option<Address> {
        self.admin.as_ref().map(|w| w.sender())
    }

    pub fn player_address(&self) -> Option<Address> {
        self.player.as_ref().map(|w| w.sender())
    }

    fn round_sync(&self, user: Option<Address>) -> Arc<RoundSync> {
        Arc::new(RoundSync::new(
            self.reader(),
            user,
            self.config.keeper.full_refresh_every,
        ))
    }

    /// Keeper signing with the admin key, or `None` when no key is set.
    pub fn keeper(&self) -> Option<Arc<RoundKeeper>> {
        let Some(admin) = &self.admin else {
            tracing::error!(
                "Admin private key not configured, automatic round completion will not work"
            );
            return None;
        };

        Some(Arc::new(RoundKeeper::new(
            admin.clone(),
            self.notifications.clone(),
            Some(self.storage.clone()),
            &self.config.keeper,
            self.config.lock_period_secs,
        )))
    }

    /// A session tracking the current round for `user`.
    pub fn session(&self, user: Option<Address>, auto_complete: bool) -> JackpotSession {
        let keeper = if auto_complete { self.keeper() } else { None };
        let player = self
            .player
            .clone()
            .map(|w| w as Arc<dyn JackpotWriter>);

        JackpotSession::new(
            self.config.clone(),
            self.round_sync(user),
            self.notifications.clone(),
            keeper,
            player,
        )
    }

    /// One full refresh of the current round, without starting a loop.
    pub async fn load_round(&self, user: Option<Address>) -> Result<Arc<RoundSync>> {
        let sync = self.round_sync(user);
        sync.refresh_all().await?;
        Ok(sync)
    }

    /// Recent winners from the history contract, cached locally.
    pub async fn history(&self, limit: u64) -> Result<Vec<WinnerRecord>> {
        let reader = self
            .history
            .as_ref()
            .ok_or_else(|| JackpotError::config("History contract address not configured"))?;
        fetch_history(reader.as_ref(), &self.storage, limit).await
    }

    /// Winners from the local cache, most recent round first.
    pub async fn cached_history(&self, limit: u64) -> Result<Vec<WinnerRecord>> {
        WinnerStore::new(&self.storage).recent(limit).await
    }

    pub async fn attempts(
        &self,
        round_id: Option<u64>,
        limit: u32,
    ) -> Result<Vec<CompletionAttempt>> {
        AttemptStore::new(&self.storage).list(round_id, limit).await
    }
}

/// Read up to `limit` winners and upsert them into the local cache.
pub async fn fetch_history(
    reader: &dyn HistoryReader,
    storage: &Storage,
    limit: u64,
) -> Result<Vec<WinnerRecord>> {
    let total = reader.total_winners().await?;
    if total == 0 {
        return Ok(Vec::new());
    }

    let winners = reader.winners(0, limit).await?;
    WinnerStore::new(storage).upsert_many(&winners).await?;

    tracing::debug!("Fetched {} of {} winners", winners.len(), total);
    Ok(winners)
}
