//! The long-running view of one jackpot contract.
//!
//! A session owns the reconciliation loop, the countdown, the keeper and the
//! drawing sequence, and exposes the purchase and manual completion actions.
//! Everything it knows about the round comes from the last refresh; the
//! contract stays the source of truth.

use crate::chain::JackpotWriter;
use crate::config::JackpotConfig;
use crate::draw::{DrawEvent, DrawSequencer};
use crate::error::{JackpotError, Result};
use crate::keeper::{CompletionOutcome, RoundKeeper, RoundPhase, COMPLETED_MESSAGE};
use crate::notify::{NotificationCenter, NotificationKind};
use crate::purchase::{minimum_message, BuyGuard};
use crate::sync::{format_time, time_left, unix_now, RefreshKind, RoundSync};
use crate::types::{TxReceipt, Wei};
use chrono::Utc;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, MissedTickBehavior};

pub const WRONG_NETWORK_MESSAGE: &str = "Please connect your wallet to the correct network";
pub const TX_SENT_MESSAGE: &str = "Transaction sent. Waiting for confirmation...";
pub const TX_CONFIRMED_MESSAGE: &str = "Transaction confirmed!";
pub const DRAWING_MESSAGE: &str = "Drawing winner, please wait for the transaction to complete";

const COUNTDOWN_LOG_WINDOW: u64 = 10;

enum LoopEvent {
    Refreshed(RefreshKind),
    Completion {
        round_id: u64,
        outcome: CompletionOutcome,
    },
    /// Completion confirmed and state re-read; the round can be drawn.
    Settled(u64),
}

struct PendingTx<'a>(&'a AtomicBool);

impl Drop for PendingTx<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct JackpotSession {
    config: JackpotConfig,
    sync: Arc<RoundSync>,
    notifications: NotificationCenter,
    keeper: Option<Arc<RoundKeeper>>,
    player: Option<Arc<dyn JackpotWriter>>,
    guard: BuyGuard,
    sequencer: DrawSequencer,
    draw_tx: mpsc::Sender<DrawEvent>,
    draw_rx: Mutex<Option<mpsc::Receiver<DrawEvent>>>,
    drawn_for: Mutex<Option<u64>>,
    draw_task: Mutex<Option<JoinHandle<()>>>,
    completion_task: Mutex<Option<JoinHandle<()>>>,
    tx_pending: AtomicBool,
    last_logged_second: AtomicU64,
}

impl JackpotSession {
    pub fn new(
        config: JackpotConfig,
        sync: Arc<RoundSync>,
        notifications: NotificationCenter,
        keeper: Option<Arc<RoundKeeper>>,
        player: Option<Arc<dyn JackpotWriter>>,
    ) -> Self {
        let (draw_tx, draw_rx) = mpsc::channel(64);
        Self {
            guard: BuyGuard::from_config(&config),
            sequencer: DrawSequencer::new(&config.keeper),
            config,
            sync,
            notifications,
            keeper,
            player,
            draw_tx,
            draw_rx: Mutex::new(Some(draw_rx)),
            drawn_for: Mutex::new(None),
            draw_task: Mutex::new(None),
            completion_task: Mutex::new(None),
            tx_pending: AtomicBool::new(false),
            last_logged_second: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &JackpotConfig {
        &self.config
    }

    pub fn sync(&self) -> &Arc<RoundSync> {
        &self.sync
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    pub fn keeper(&self) -> Option<&Arc<RoundKeeper>> {
        self.keeper.as_ref()
    }

    pub fn guard(&self) -> BuyGuard {
        self.guard
    }

    /// Receiver for drawing frames. Only one consumer; take it before
    /// [`JackpotSession::run`] or the frames are discarded.
    pub fn take_draw_events(&self) -> Option<mpsc::Receiver<DrawEvent>> {
        self.draw_rx.lock().take()
    }

    pub fn time_left(&self) -> u64 {
        self.sync.snapshot().time_left(unix_now())
    }

    pub fn phase(&self) -> Option<RoundPhase> {
        let round = self.sync.current_round()?;
        let completing = self.keeper.as_ref().is_some_and(|k| k.is_completing());
        Some(RoundPhase::derive(
            &round,
            unix_now(),
            self.config.lock_period_secs,
            completing,
        ))
    }

    pub fn buy_disabled_message(&self, amount: Wei) -> Option<String> {
        self.guard.disabled_message(
            self.tx_pending.load(Ordering::Acquire),
            amount,
            self.time_left(),
        )
    }

    /// Drive polling, countdown, keeper and drawing until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let settings = &self.config.keeper;
        let (loop_tx, mut loop_rx) = mpsc::channel(32);

        if self.draw_rx.lock().take().is_some() {
            tracing::debug!("No draw consumer attached, frames will be dropped");
        }

        tracing::info!(
            "Session started for chain {} (keeper {})",
            self.config.chain.chain_id,
            if self.keeper.is_some() { "enabled" } else { "disabled" }
        );

        self.spawn_poll(&loop_tx);

        let start = tokio::time::Instant::now();
        let mut poll = interval_at(start + settings.poll_interval, settings.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut countdown = interval(settings.countdown_tick);
        countdown.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut fallback = interval_at(
            start + settings.fallback_check_interval,
            settings.fallback_check_interval,
        );
        fallback.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Session shutting down");
                    break;
                }
                _ = poll.tick() => self.spawn_poll(&loop_tx),
                _ = countdown.tick() => self.on_countdown_tick(&loop_tx),
                _ = fallback.tick() => self.on_fallback_tick(&loop_tx),
                Some(event) = loop_rx.recv() => self.on_loop_event(event, &loop_tx),
            }
        }

        self.abort_tasks();
        Ok(())
    }

    fn spawn_poll(&self, tx: &mpsc::Sender<LoopEvent>) {
        let sync = self.sync.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let kind = sync.poll_cycle().await;
            let _ = tx.send(LoopEvent::Refreshed(kind)).await;
        });
    }

    fn spawn_full_refresh(&self, tx: &mpsc::Sender<LoopEvent>) {
        let sync = self.sync.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Ok(true) = sync.refresh_all().await {
                let _ = tx.send(LoopEvent::Refreshed(RefreshKind::Full)).await;
            }
        });
    }

    fn on_countdown_tick(&self, tx: &mpsc::Sender<LoopEvent>) {
        self.notifications.prune_expired(Utc::now());

        let Some(round) = self.sync.current_round() else {
            return;
        };
        let now = unix_now();
        let left = time_left(round.end_time, now);

        if left > 0
            && left <= COUNTDOWN_LOG_WINDOW
            && self.last_logged_second.swap(left, Ordering::AcqRel) != left
        {
            tracing::debug!("Round {} ends in {}", round.id, format_time(left));
        }

        let Some(keeper) = &self.keeper else {
            return;
        };
        if keeper.should_fire(&round, now) {
            self.spawn_completion(keeper.clone(), round.id, tx);
        }
    }

    fn on_fallback_tick(&self, tx: &mpsc::Sender<LoopEvent>) {
        let Some(round) = self.sync.current_round() else {
            self.spawn_full_refresh(tx);
            return;
        };
        let now = unix_now();

        if let Some(keeper) = &self.keeper {
            keeper.check_idle(&round, now, Instant::now());
        }

        // an ended round may have been completed by someone else
        if !round.completed && round.end_time > 0 && now >= round.end_time {
            self.spawn_full_refresh(tx);
        }
    }

    fn spawn_completion(
        &self,
        keeper: Arc<RoundKeeper>,
        round_id: u64,
        tx: &mpsc::Sender<LoopEvent>,
    ) {
        let tx = tx.clone();
        let handle = tokio::spawn(async move {
            let outcome = keeper.complete_round(round_id).await;
            let _ = tx.send(LoopEvent::Completion { round_id, outcome }).await;
        });
        *self.completion_task.lock() = Some(handle);
    }

    fn on_loop_event(&self, event: LoopEvent, tx: &mpsc::Sender<LoopEvent>) {
        match event {
            LoopEvent::Refreshed(RefreshKind::Full) => {
                if let Some(round) = self.sync.current_round() {
                    if round.completed {
                        self.start_draw(round.id);
                    }
                }
            }
            LoopEvent::Refreshed(_) => {}
            LoopEvent::Completion { round_id, outcome } => match outcome {
                CompletionOutcome::Completed { .. } => {
                    let sync = self.sync.clone();
                    let tx = tx.clone();
                    let delay = self.config.keeper.confirmation_delay;
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        if let Err(e) = sync.refresh_all().await {
                            tracing::warn!("Refresh after completion failed: {}", e);
                        }
                        let _ = tx.send(LoopEvent::Settled(round_id)).await;
                    });
                }
                CompletionOutcome::Exhausted { attempts, .. } => {
                    tracing::debug!(
                        "Round {} left unresolved after {} attempts",
                        round_id,
                        attempts
                    );
                }
                CompletionOutcome::AlreadyRunning => {}
            },
            LoopEvent::Settled(round_id) => {
                self.start_draw(round_id);
            }
        }
    }

    /// Start the drawing sequence for `round_id` unless it already ran or
    /// another drawing is still playing.
    fn start_draw(&self, round_id: u64) -> bool {
        let mut drawn_for = self.drawn_for.lock();
        if *drawn_for == Some(round_id) {
            return false;
        }

        let mut task = self.draw_task.lock();
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }

        *drawn_for = Some(round_id);

        *task = Some(self.sequencer.spawn(
            self.sync.reader().clone(),
            round_id,
            self.sync.user(),
            self.sync.owners(),
            self.draw_tx.clone(),
        ));
        true
    }

    fn abort_tasks(&self) {
        if let Some(handle) = self.draw_task.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.completion_task.lock().take() {
            handle.abort();
        }
    }

    fn player(&self) -> Result<&Arc<dyn JackpotWriter>> {
        self.player
            .as_ref()
            .ok_or_else(|| JackpotError::MissingKey("JACKPOT_PRIVATE_KEY".to_string()))
    }

    fn begin_tx(&self) -> Result<PendingTx<'_>> {
        if self
            .tx_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(JackpotError::internal("Transaction in progress..."));
        }
        Ok(PendingTx(&self.tx_pending))
    }

    /// Buy tickets worth `amount` from the player wallet.
    ///
    /// Checks the network, the lock window and the minimum before anything is
    /// signed. A failed transaction is reported once and not retried.
    pub async fn buy_tickets(&self, amount: Wei) -> Result<TxReceipt> {
        let player = self.player()?.clone();
        let _pending = self.begin_tx()?;

        let actual = self.sync.reader().chain_id().await?;
        if actual != self.config.chain.chain_id {
            self.notifications.error(WRONG_NETWORK_MESSAGE);
            return Err(JackpotError::WrongNetwork {
                expected: self.config.chain.chain_id,
                actual,
            });
        }

        if self.guard.is_lock_period(self.time_left()) {
            self.notifications.warning(self.guard.lock_message());
            return Err(JackpotError::BuyingLocked {
                lock_period: self.guard.lock_period,
            });
        }

        if amount < self.guard.min_payment {
            self.notifications.warning(self.guard.minimum_message());
            return Err(JackpotError::BelowMinimum {
                minimum: self.guard.min_payment.to_ether_compact(),
            });
        }

        // the contract may demand more than the configured minimum
        match self.sync.reader().min_deposit().await {
            Ok(minimum) if amount < minimum => {
                self.notifications.warning(minimum_message(minimum));
                return Err(JackpotError::BelowMinimum {
                    minimum: minimum.to_ether_compact(),
                });
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Could not read contract minimum deposit: {}", e),
        }

        tracing::info!(
            "Buying {} tickets for {} from {}",
            self.guard.tickets_for(amount),
            amount,
            player.sender()
        );

        let sent = player.buy_tickets(amount).await;
        let receipt = self
            .confirm(player.as_ref(), sent, TX_CONFIRMED_MESSAGE)
            .await?;

        if let Err(e) = self.sync.refresh_all().await {
            tracing::warn!("Refresh after purchase failed: {}", e);
        }
        Ok(receipt)
    }

    /// `completeRound` from the player wallet, outside the keeper.
    pub async fn complete_round_manually(&self) -> Result<TxReceipt> {
        let player = self.player()?.clone();

        if self.keeper.as_ref().is_some_and(|k| k.is_completing()) {
            self.notifications.warning(DRAWING_MESSAGE);
            return Err(JackpotError::internal(DRAWING_MESSAGE));
        }
        let _pending = self.begin_tx()?;

        let sent = player.complete_round().await;
        let receipt = self
            .confirm(player.as_ref(), sent, COMPLETED_MESSAGE)
            .await?;

        if let Err(e) = self.sync.refresh_all().await {
            tracing::warn!("Refresh after completion failed: {}", e);
        }
        Ok(receipt)
    }

    /// Report a submitted transaction and wait for it to be mined. A send
    /// error is reported once and returned as is.
    async fn confirm(
        &self,
        writer: &dyn JackpotWriter,
        sent: Result<String>,
        confirmed: &str,
    ) -> Result<TxReceipt> {
        let tx_hash = match sent {
            Ok(hash) => hash,
            Err(e) => {
                tracing::error!("Transaction failed: {}", e);
                self.notifications.error(e.to_string());
                return Err(e);
            }
        };

        self.notifications
            .push(NotificationKind::Info, TX_SENT_MESSAGE, Some(tx_hash.clone()));

        match writer.wait_for_receipt(&tx_hash).await {
            Ok(receipt) => {
                self.notifications.success(confirmed, Some(tx_hash));
                Ok(receipt)
            }
            Err(e) => {
                tracing::error!("Transaction {} failed: {}", tx_hash, e);
                self.notifications.error(e.to_string());
                Err(e)
            }
        }
    }
}

impl Drop for JackpotSession {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{addr, MockJackpot};
    use crate::config::KeeperSettings;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn fast_config() -> JackpotConfig {
        JackpotConfig {
            keeper: KeeperSettings {
                poll_interval: Duration::from_millis(20),
                countdown_tick: Duration::from_millis(5),
                retry_delay: Duration::from_millis(1),
                confirmation_delay: Duration::from_millis(1),
                fallback_check_interval: Duration::from_millis(50),
                draw_tick: Duration::from_millis(1),
                draw_ticks: 3,
                reveal_delay: Duration::from_millis(1),
                ..KeeperSettings::default()
            },
            ..JackpotConfig::default()
        }
    }

    fn session(mock: Arc<MockJackpot>, with_keeper: bool) -> JackpotSession {
        session_with(fast_config(), mock, with_keeper)
    }

    fn session_with(
        config: JackpotConfig,
        mock: Arc<MockJackpot>,
        with_keeper: bool,
    ) -> JackpotSession {
        let notifications = NotificationCenter::new(config.keeper.notification_ttl);
        let sync = Arc::new(RoundSync::new(mock.clone(), Some(addr(1)), 5));
        let keeper = with_keeper.then(|| {
            Arc::new(RoundKeeper::new(
                mock.clone(),
                notifications.clone(),
                None,
                &config.keeper,
                config.lock_period_secs,
            ))
        });
        JackpotSession::new(config, sync, notifications, keeper, Some(mock))
    }

    fn ether(s: &str) -> Wei {
        Wei::from_ether_str(s).unwrap()
    }

    #[tokio::test]
    async fn buy_on_wrong_network_is_refused() {
        let mock = Arc::new(MockJackpot::with_round(1, unix_now() + 300, &[]));
        mock.state.lock().chain_id = 1;
        let session = session(mock.clone(), false);

        let err = session.buy_tickets(ether("0.05")).await.unwrap_err();
        assert!(matches!(
            err,
            JackpotError::WrongNetwork {
                expected: 16601,
                actual: 1
            }
        ));
        assert_eq!(session.notifications().count_of(NotificationKind::Error), 1);
        assert!(mock.state.lock().buy_calls.is_empty());
    }

    #[tokio::test]
    async fn buy_inside_lock_window_is_refused() {
        let mock = Arc::new(MockJackpot::with_round(1, unix_now() + 3, &[(1, addr(2))]));
        let session = session(mock.clone(), false);
        session.sync().refresh_all().await.unwrap();

        let err = session.buy_tickets(ether("0.05")).await.unwrap_err();
        assert!(matches!(err, JackpotError::BuyingLocked { lock_period: 5 }));
        assert_eq!(
            session.notifications().count_of(NotificationKind::Warning),
            1
        );
        assert!(mock.state.lock().buy_calls.is_empty());
    }

    #[tokio::test]
    async fn buy_below_minimum_is_refused() {
        let mock = Arc::new(MockJackpot::with_round(1, unix_now() + 300, &[]));
        let session = session(mock.clone(), false);
        session.sync().refresh_all().await.unwrap();

        let err = session.buy_tickets(ether("0.01")).await.unwrap_err();
        assert!(matches!(err, JackpotError::BelowMinimum { .. }));
        assert_eq!(
            session.notifications().active()[0].message,
            "Minimum amount is 0.02 0G"
        );
    }

    #[tokio::test]
    async fn buy_below_contract_minimum_is_refused() {
        let mock = Arc::new(MockJackpot::with_round(1, unix_now() + 300, &[]));
        mock.state.lock().min_deposit = Some(ether("0.1"));
        let session = session(mock.clone(), false);
        session.sync().refresh_all().await.unwrap();

        let err = session.buy_tickets(ether("0.05")).await.unwrap_err();
        match err {
            JackpotError::BelowMinimum { minimum } => assert_eq!(minimum, "0.1"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            session.notifications().active()[0].message,
            "Minimum amount is 0.1 0G"
        );
        assert!(mock.state.lock().buy_calls.is_empty());
    }

    #[tokio::test]
    async fn successful_buy_notifies_and_refreshes() {
        let mock = Arc::new(MockJackpot::with_round(1, unix_now() + 300, &[]));
        let session = session(mock.clone(), false);
        session.sync().refresh_all().await.unwrap();

        let receipt = session.buy_tickets(ether("0.05")).await.unwrap();
        assert_eq!(receipt.tx_hash, "0xbuy1");
        assert_eq!(mock.state.lock().buy_calls, vec![ether("0.05")]);

        let active = session.notifications().active();
        assert_eq!(active[0].message, TX_SENT_MESSAGE);
        assert_eq!(active[0].tx_hash.as_deref(), Some("0xbuy1"));
        assert_eq!(active[1].message, TX_CONFIRMED_MESSAGE);
        assert_eq!(session.sync().snapshot().refresh_count, 2);
    }

    #[tokio::test]
    async fn failed_buy_is_reported_once_and_not_retried() {
        let mock = Arc::new(MockJackpot::with_round(1, unix_now() + 300, &[]));
        mock.state.lock().fail_buys = true;
        let session = session(mock.clone(), false);
        session.sync().refresh_all().await.unwrap();

        assert!(session.buy_tickets(ether("0.05")).await.is_err());
        assert_eq!(session.notifications().count_of(NotificationKind::Error), 1);
        assert_eq!(session.notifications().count_of(NotificationKind::Info), 0);
        assert!(session.buy_disabled_message(ether("0.05")).is_none());
    }

    #[tokio::test]
    async fn manual_completion_settles_round() {
        let mock = Arc::new(MockJackpot::with_round(1, unix_now() - 1, &[(4, addr(1))]));
        let session = session(mock.clone(), false);

        let receipt = session.complete_round_manually().await.unwrap();
        assert_eq!(receipt.tx_hash, "0xcomplete1");
        assert!(session.sync().current_round().unwrap().completed);
        assert_eq!(
            session.notifications().count_of(NotificationKind::Success),
            1
        );
    }

    #[tokio::test]
    async fn expired_round_is_completed_and_drawn() {
        let mock = Arc::new(MockJackpot::with_round(
            1,
            unix_now() - 1,
            &[(7, addr(1)), (8, addr(2))],
        ));
        let session = Arc::new(session(mock.clone(), true));
        let mut draws = session.take_draw_events().unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let running = {
            let session = session.clone();
            tokio::spawn(async move {
                session
                    .run(async {
                        let _ = stop_rx.await;
                    })
                    .await
            })
        };

        let reveal = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match draws.recv().await {
                    Some(DrawEvent::Winner(w)) => return w,
                    Some(_) => continue,
                    None => panic!("draw channel closed"),
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(reveal.round_id, 1);
        assert_eq!(reveal.ticket.id, 7);
        assert!(reveal.ticket.is_user);
        assert!(!reveal.fallback);

        let _ = stop_tx.send(());
        running.await.unwrap().unwrap();

        assert_eq!(mock.state.lock().complete_calls, 1);
        let notes = session.notifications();
        assert_eq!(notes.count_of(NotificationKind::Success), 1);
        assert_eq!(notes.count_of(NotificationKind::Error), 0);
    }

    #[tokio::test]
    async fn exhausted_round_is_retried_after_idle_threshold() {
        let mock = Arc::new(MockJackpot::with_round(1, unix_now() - 1, &[(7, addr(1))]));
        mock.state.lock().complete_failures = 3;

        let mut config = fast_config();
        config.keeper.fallback_idle_threshold = Duration::from_millis(30);
        let session = Arc::new(session_with(config, mock.clone(), true));
        let mut draws = session.take_draw_events().unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let running = {
            let session = session.clone();
            tokio::spawn(async move {
                session
                    .run(async {
                        let _ = stop_rx.await;
                    })
                    .await
            })
        };

        let reveal = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match draws.recv().await {
                    Some(DrawEvent::Winner(w)) => return w,
                    Some(_) => continue,
                    None => panic!("draw channel closed"),
                }
            }
        })
        .await
        .unwrap();

        let _ = stop_tx.send(());
        running.await.unwrap().unwrap();

        assert_eq!(reveal.ticket.id, 7);
        assert!(!reveal.fallback);
        // three reverted attempts, then the re-armed sequence succeeds
        assert_eq!(mock.state.lock().complete_calls, 4);
        let notes = session.notifications();
        assert_eq!(notes.count_of(NotificationKind::Error), 1);
        assert_eq!(notes.count_of(NotificationKind::Success), 1);
        assert!(session.sync().current_round().unwrap().completed);
    }
}
