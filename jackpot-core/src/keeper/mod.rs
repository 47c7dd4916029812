//! Auto-completion of expired rounds.
//!
//! A round whose countdown reached zero gets one completion sequence: up to
//! `max_attempts` calls to `completeRound` with a fixed delay between
//! failures. The contract rejects redundant completions, so a duplicate that
//! slips through costs gas but cannot double-settle.

pub mod phase;

pub use phase::RoundPhase;

use crate::chain::JackpotWriter;
use crate::config::KeeperSettings;
use crate::notify::NotificationCenter;
use crate::storage::{AttemptStore, CompletionAttempt, Storage};
use crate::sync::time_left;
use crate::types::Round;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const AUTO_COMPLETE_MESSAGE: &str = "Countdown ended! Drawing winner automatically...";
pub const COMPLETED_MESSAGE: &str = "Round completed successfully!";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Completed { tx_hash: String, attempts: u32 },
    Exhausted { attempts: u32, last_error: String },
    AlreadyRunning,
}

impl CompletionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CompletionOutcome::Completed { .. })
    }
}

#[derive(Debug, Default)]
struct Latch {
    fired_for: Option<u64>,
    last_finished: Option<Instant>,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct RoundKeeper {
    writer: Arc<dyn JackpotWriter>,
    notifications: NotificationCenter,
    storage: Option<Arc<Storage>>,
    max_attempts: u32,
    retry_delay: Duration,
    idle_threshold: Duration,
    lock_period: u64,
    latch: Mutex<Latch>,
    in_flight: AtomicBool,
}

impl RoundKeeper {
    pub fn new(
        writer: Arc<dyn JackpotWriter>,
        notifications: NotificationCenter,
        storage: Option<Arc<Storage>>,
        settings: &KeeperSettings,
        lock_period: u64,
    ) -> Self {
        Self {
            writer,
            notifications,
            storage,
            max_attempts: settings.max_attempts.max(1),
            retry_delay: settings.retry_delay,
            idle_threshold: settings.fallback_idle_threshold,
            lock_period,
            latch: Mutex::new(Latch::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_completing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn phase(&self, round: &Round, now: u64) -> RoundPhase {
        RoundPhase::derive(round, now, self.lock_period, self.is_completing())
    }

    /// Latches and returns true the first time `round` is seen ended. The
    /// caller is expected to run [`RoundKeeper::complete_round`] next.
    pub fn should_fire(&self, round: &Round, now: u64) -> bool {
        let mut latch = self.latch.lock();

        if let Some(fired) = latch.fired_for {
            let new_round_running = round.id != fired && time_left(round.end_time, now) > 0;
            let latched_round_done = round.id == fired && round.completed;
            if new_round_running || latched_round_done {
                tracing::debug!("Completion latch for round {} reset", fired);
                latch.fired_for = None;
            }
        }

        if self.phase(round, now) != RoundPhase::Ended {
            return false;
        }
        if latch.fired_for == Some(round.id) {
            return false;
        }

        latch.fired_for = Some(round.id);
        tracing::debug!("Countdown reached zero for round {}, latch armed", round.id);
        true
    }

    /// Fallback timer hook: if the latched round is still unresolved long
    /// after the last attempt sequence gave up, clear the latch so the next
    /// tick tries again.
    pub fn check_idle(&self, round: &Round, now: u64, at: Instant) -> bool {
        if self.is_completing() || self.phase(round, now) != RoundPhase::Ended {
            return false;
        }

        let mut latch = self.latch.lock();
        if latch.fired_for != Some(round.id) {
            return false;
        }

        let idle = latch
            .last_finished
            .map(|finished| at.saturating_duration_since(finished) >= self.idle_threshold)
            .unwrap_or(false);

        if idle {
            tracing::info!(
                "Round {} still unresolved after {:?}, re-arming completion",
                round.id,
                self.idle_threshold
            );
            latch.fired_for = None;
            latch.last_finished = None;
        }
        idle
    }

    /// Run one bounded completion sequence for `round_id`.
    pub async fn complete_round(&self, round_id: u64) -> CompletionOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return CompletionOutcome::AlreadyRunning;
        }
        let _in_flight = InFlight(&self.in_flight);

        self.notifications.info(AUTO_COMPLETE_MESSAGE);

        let outcome = self.run_attempts(round_id).await;
        self.latch.lock().last_finished = Some(Instant::now());
        outcome
    }

    async fn run_attempts(&self, round_id: u64) -> CompletionOutcome {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            tracing::debug!(
                "Attempt {} to complete round {} from {}",
                attempt,
                round_id,
                self.writer.sender()
            );

            match self.attempt_once().await {
                Ok(tx_hash) => {
                    self.record(round_id, attempt, Ok(&tx_hash)).await;
                    self.notifications
                        .success(COMPLETED_MESSAGE, Some(tx_hash.clone()));
                    tracing::info!(
                        "Round {} completed on attempt {}, tx {}",
                        round_id,
                        attempt,
                        tx_hash
                    );
                    return CompletionOutcome::Completed {
                        tx_hash,
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    last_error = e.to_string();
                    self.record(round_id, attempt, Err(&last_error)).await;

                    if attempt < self.max_attempts {
                        tracing::debug!(
                            "Attempt {} failed: {}, retrying in {:?}",
                            attempt,
                            last_error,
                            self.retry_delay
                        );
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        tracing::warn!(
            "Failed to complete round {} after {} attempts: {}",
            round_id,
            self.max_attempts,
            last_error
        );
        self.notifications.error(format!(
            "Failed to complete round after {} attempts",
            self.max_attempts
        ));

        CompletionOutcome::Exhausted {
            attempts: self.max_attempts,
            last_error,
        }
    }

    async fn attempt_once(&self) -> crate::Result<String> {
        let tx_hash = self.writer.complete_round().await?;
        self.writer.wait_for_receipt(&tx_hash).await?;
        Ok(tx_hash)
    }

    async fn record(&self, round_id: u64, attempt: u32, result: Result<&String, &String>) {
        let Some(storage) = &self.storage else {
            return;
        };

        let entry = CompletionAttempt {
            round_id,
            attempt,
            success: result.is_ok(),
            tx_hash: result.ok().cloned(),
            error: result.err().cloned(),
            timestamp: Utc::now(),
        };

        if let Err(e) = AttemptStore::new(storage).record(&entry).await {
            tracing::warn!("Could not record completion attempt: {}", e);
        }
    }
}
