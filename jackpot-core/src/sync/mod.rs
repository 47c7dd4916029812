pub mod countdown;
pub mod owners;

pub use countdown::{format_time, time_left, unix_now};
pub use owners::TicketOwnerCache;

use crate::chain::JackpotReader;
use crate::error::Result;
use crate::types::{Address, Round};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub const LOAD_ERROR: &str = "Error loading contract data";

/// Read-only cached view of the on-chain round, replaced on each refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub round: Option<Round>,
    pub user_tickets: Vec<u64>,
    pub round_tickets: Vec<u64>,
    pub error: Option<String>,
    pub loading: bool,
    pub refresh_count: u64,
    pub last_refresh: Option<DateTime<Utc>>,
}

impl Default for RoundSnapshot {
    fn default() -> Self {
        Self {
            round: None,
            user_tickets: Vec::new(),
            round_tickets: Vec::new(),
            error: None,
            loading: true,
            refresh_count: 0,
            last_refresh: None,
        }
    }
}

impl RoundSnapshot {
    /// Countdown for the cached round at `now`; zero once completed.
    pub fn time_left(&self, now: u64) -> u64 {
        match &self.round {
            Some(round) if !round.completed => time_left(round.end_time, now),
            _ => 0,
        }
    }

    pub fn win_chance(&self) -> String {
        win_chance(self.user_tickets.len(), self.round_tickets.len())
    }
}

/// Share of the round's tickets held by the user, as a percentage with two
/// decimals, or `"0"` when either side is empty.
pub fn win_chance(user_tickets: usize, round_tickets: usize) -> String {
    if user_tickets == 0 || round_tickets == 0 {
        return "0".to_string();
    }
    format!("{:.2}", user_tickets as f64 / round_tickets as f64 * 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshKind {
    Full,
    Pool,
    Skipped,
}

struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Mirrors round and ticket state from the jackpot contract.
pub struct RoundSync {
    reader: Arc<dyn JackpotReader>,
    user: Option<Address>,
    snapshot: RwLock<RoundSnapshot>,
    owners: RwLock<TicketOwnerCache>,
    refreshing: AtomicBool,
    cycle: AtomicU64,
    full_refresh_every: u64,
}

impl RoundSync {
    pub fn new(
        reader: Arc<dyn JackpotReader>,
        user: Option<Address>,
        full_refresh_every: u32,
    ) -> Self {
        Self {
            reader,
            user,
            snapshot: RwLock::new(RoundSnapshot::default()),
            owners: RwLock::new(TicketOwnerCache::new()),
            refreshing: AtomicBool::new(false),
            cycle: AtomicU64::new(0),
            full_refresh_every: u64::from(full_refresh_every.max(1)),
        }
    }

    pub fn reader(&self) -> &Arc<dyn JackpotReader> {
        &self.reader
    }

    pub fn user(&self) -> Option<Address> {
        self.user
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        self.snapshot.read().clone()
    }

    pub fn current_round(&self) -> Option<Round> {
        self.snapshot.read().round.clone()
    }

    pub fn owners(&self) -> TicketOwnerCache {
        self.owners.read().clone()
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    fn try_begin(&self) -> Option<RefreshGuard<'_>> {
        self.refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshGuard(&self.refreshing))
    }

    /// One timer tick: full refresh on the first cycle and every
    /// `full_refresh_every` cycles, pool-only refresh otherwise.
    pub async fn poll_cycle(&self) -> RefreshKind {
        if self.is_refreshing() {
            tracing::trace!("Refresh in progress, skipping poll cycle");
            return RefreshKind::Skipped;
        }

        let cycle = self.cycle.fetch_add(1, Ordering::AcqRel) + 1;
        let full = cycle == 1 || cycle % self.full_refresh_every == 0;

        let result = if full {
            self.refresh_all().await
        } else {
            self.refresh_pool().await
        };

        match result {
            Ok(false) => RefreshKind::Skipped,
            Ok(true) if full => RefreshKind::Full,
            Ok(true) => RefreshKind::Pool,
            Err(e) => {
                tracing::warn!("Refresh cycle {} failed: {}", cycle, e);
                if full {
                    RefreshKind::Full
                } else {
                    RefreshKind::Pool
                }
            }
        }
    }

    /// Re-read round, mapping entry, user and round tickets. Returns
    /// `Ok(false)` when another refresh is already running.
    pub async fn refresh_all(&self) -> Result<bool> {
        let Some(_guard) = self.try_begin() else {
            return Ok(false);
        };

        match self.fetch_all().await {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::error!("Error refreshing contract data: {}", e);
                let mut snapshot = self.snapshot.write();
                snapshot.error = Some(LOAD_ERROR.to_string());
                snapshot.loading = false;
                Err(e)
            }
        }
    }

    async fn fetch_all(&self) -> Result<()> {
        let reader = &self.reader;
        let round_id = reader.current_round_id().await?;

        let user_fut = async {
            match self.user {
                Some(user) => reader.user_tickets(&user).await,
                None => Ok(Vec::new()),
            }
        };

        let (info, rest) = futures::join!(reader.current_round_info(), async {
            futures::try_join!(
                reader.round(round_id),
                reader.round_tickets(round_id),
                user_fut
            )
        });
        let (record, round_tickets, user_tickets) = rest?;

        let round = match info {
            Ok(info) => Round::from_info(&info, Some(&record)),
            Err(e) => {
                tracing::warn!("getCurrentRoundInfo failed, using rounds mapping: {}", e);
                Round::from_record(&record, round_tickets.len() as u64)
            }
        };

        let user_tickets: Vec<u64> = user_tickets
            .into_iter()
            .filter(|id| round_tickets.contains(id))
            .collect();

        {
            let mut snapshot = self.snapshot.write();
            snapshot.round = Some(round);
            snapshot.user_tickets = user_tickets;
            snapshot.round_tickets = round_tickets.clone();
            snapshot.error = None;
            snapshot.loading = false;
            snapshot.refresh_count += 1;
            snapshot.last_refresh = Some(Utc::now());

            tracing::debug!(
                "Refresh #{} completed: round {} with {} tickets",
                snapshot.refresh_count,
                round_id,
                snapshot.round_tickets.len()
            );
        }

        self.refresh_owners(&round_tickets).await;
        Ok(())
    }

    async fn refresh_owners(&self, ticket_ids: &[u64]) {
        let missing = {
            let owners = self.owners.read();
            if !owners.needs_rebuild(ticket_ids) {
                return;
            }
            owners.missing(ticket_ids)
        };

        let mut fetched = HashMap::with_capacity(missing.len());
        for ticket_id in missing {
            match self.reader.ticket(ticket_id).await {
                Ok(ticket) => {
                    fetched.insert(ticket_id, ticket.owner);
                }
                Err(e) => {
                    tracing::warn!("Error getting owner of ticket {}: {}", ticket_id, e);
                }
            }
        }

        self.owners.write().rebuild(ticket_ids, fetched);
    }

    /// Cheap refresh of the most volatile fields: pool and ticket count.
    pub async fn refresh_pool(&self) -> Result<bool> {
        let Some(_guard) = self.try_begin() else {
            return Ok(false);
        };

        let info = self.reader.current_round_info().await?;

        let mut snapshot = self.snapshot.write();
        if let Some(round) = snapshot.round.as_mut() {
            if round.id == info.id {
                round.total_pool = info.total_pool;
                round.num_tickets = info.num_tickets;
                tracing::trace!("Pool value updated: {}", info.total_pool);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{addr, MockJackpot};
    use std::time::Duration;

    fn sync_for(mock: Arc<MockJackpot>, user: Option<Address>, every: u32) -> RoundSync {
        RoundSync::new(mock, user, every)
    }

    #[tokio::test]
    async fn full_refresh_populates_snapshot() {
        let mock = Arc::new(MockJackpot::with_round(
            1,
            1_000,
            &[(1, addr(1)), (2, addr(2)), (3, addr(1))],
        ));
        let sync = sync_for(mock.clone(), Some(addr(1)), 5);

        assert!(sync.refresh_all().await.unwrap());
        let snap = sync.snapshot();
        let round = snap.round.as_ref().unwrap();
        assert_eq!(round.id, 1);
        assert_eq!(round.end_time, 1_000);
        assert!(!round.completed);
        assert_eq!(snap.round_tickets, vec![1, 2, 3]);
        assert_eq!(snap.user_tickets, vec![1, 3]);
        assert_eq!(snap.win_chance(), "66.67");
        assert!(!snap.loading);
        assert_eq!(snap.refresh_count, 1);

        let owners = sync.owners();
        assert_eq!(owners.owner(2), Some(addr(2)));
        assert_eq!(owners.len(), 3);
    }

    #[tokio::test]
    async fn user_tickets_are_limited_to_current_round() {
        let mock = Arc::new(MockJackpot::with_round(1, 1_000, &[(1, addr(1))]));
        mock.state
            .lock()
            .user_tickets
            .insert(addr(1), vec![1, 99]);
        let sync = sync_for(mock, Some(addr(1)), 5);

        sync.refresh_all().await.unwrap();
        assert_eq!(sync.snapshot().user_tickets, vec![1]);
    }

    #[tokio::test]
    async fn read_errors_surface_generic_message_and_keep_stale_round() {
        let mock = Arc::new(MockJackpot::with_round(1, 1_000, &[(1, addr(1))]));
        let sync = sync_for(mock.clone(), None, 5);
        sync.refresh_all().await.unwrap();

        mock.state.lock().fail_reads = true;
        assert!(sync.refresh_all().await.is_err());

        let snap = sync.snapshot();
        assert_eq!(snap.error.as_deref(), Some(LOAD_ERROR));
        assert_eq!(snap.round.unwrap().id, 1);
    }

    #[tokio::test]
    async fn owner_cache_follows_round_change() {
        let mock = Arc::new(MockJackpot::with_round(1, 1_000, &[(1, addr(1)), (2, addr(2))]));
        let sync = sync_for(mock.clone(), None, 5);
        sync.refresh_all().await.unwrap();
        assert!(sync.owners().contains(1));

        mock.set_round(2, 2_000, &[(7, addr(3))]);
        sync.refresh_all().await.unwrap();

        let owners = sync.owners();
        assert_eq!(owners.ticket_ids(), &[7]);
        assert!(!owners.contains(1));
        assert!(!owners.contains(2));
        assert_eq!(owners.owner(7), Some(addr(3)));
    }

    #[tokio::test]
    async fn cached_owners_are_not_fetched_again() {
        let mock = Arc::new(MockJackpot::with_round(1, 1_000, &[(1, addr(1)), (2, addr(2))]));
        let sync = sync_for(mock.clone(), None, 5);
        sync.refresh_all().await.unwrap();
        sync.refresh_all().await.unwrap();
        assert_eq!(mock.state.lock().ticket_calls, 2);
    }

    #[tokio::test]
    async fn poll_cycles_interleave_full_and_pool_refreshes() {
        let mock = Arc::new(MockJackpot::with_round(1, 1_000, &[(1, addr(1))]));
        let sync = sync_for(mock.clone(), None, 5);

        let mut kinds = Vec::new();
        for _ in 0..10 {
            kinds.push(sync.poll_cycle().await);
        }

        use RefreshKind::*;
        assert_eq!(
            kinds,
            vec![Full, Pool, Pool, Pool, Full, Pool, Pool, Pool, Pool, Full]
        );
        assert_eq!(mock.state.lock().round_ticket_calls, 3);
    }

    #[tokio::test]
    async fn pool_refresh_updates_only_volatile_fields() {
        let mock = Arc::new(MockJackpot::with_round(1, 1_000, &[(1, addr(1))]));
        let sync = sync_for(mock.clone(), None, 5);
        sync.refresh_all().await.unwrap();

        {
            let mut state = mock.state.lock();
            let info = state.info.as_mut().unwrap();
            info.total_pool = crate::types::Wei(42);
            info.num_tickets = 9;
            info.end_time = 5_000;
        }
        sync.refresh_pool().await.unwrap();

        let round = sync.current_round().unwrap();
        assert_eq!(round.total_pool, crate::types::Wei(42));
        assert_eq!(round.num_tickets, 9);
        assert_eq!(round.end_time, 1_000);
    }

    #[tokio::test]
    async fn overlapping_refreshes_are_skipped() {
        let mock = Arc::new(MockJackpot::with_round(1, 1_000, &[(1, addr(1))]));
        mock.state.lock().read_delay = Some(Duration::from_millis(50));
        let sync = Arc::new(sync_for(mock.clone(), None, 5));

        let first = {
            let sync = sync.clone();
            tokio::spawn(async move { sync.refresh_all().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(sync.is_refreshing());
        assert_eq!(sync.poll_cycle().await, RefreshKind::Skipped);
        assert!(!sync.refresh_all().await.unwrap());

        assert!(first.await.unwrap().unwrap());
        assert!(!sync.is_refreshing());
    }

    #[test]
    fn win_chance_handles_empty_lists() {
        assert_eq!(win_chance(0, 10), "0");
        assert_eq!(win_chance(3, 0), "0");
        assert_eq!(win_chance(1, 4), "25.00");
    }

    #[test]
    fn snapshot_countdown_is_zero_once_completed() {
        let mut snap = RoundSnapshot::default();
        assert_eq!(snap.time_left(10), 0);

        let info = crate::types::RoundInfo {
            id: 1,
            start_time: 0,
            end_time: 100,
            total_pool: crate::types::Wei(0),
            num_tickets: 0,
            is_active: true,
            time_left: 0,
        };
        snap.round = Some(Round::from_info(&info, None));
        assert_eq!(snap.time_left(40), 60);

        snap.round.as_mut().unwrap().completed = true;
        assert_eq!(snap.time_left(40), 0);
    }
}
