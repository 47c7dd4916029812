//! Cosmetic drawing sequence shown once a round has been settled.
//!
//! The contract picks the winner; this only replays a short shuffle over the
//! round's tickets before revealing the recorded result. Nothing reads its
//! output back.

use crate::chain::JackpotReader;
use crate::config::KeeperSettings;
use crate::error::Result;
use crate::sync::TicketOwnerCache;
use crate::types::{Address, Wei};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketView {
    pub id: u64,
    pub is_user: bool,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WinnerReveal {
    pub round_id: u64,
    pub ticket: TicketView,
    pub prize: Wei,
    /// The contract had no winner recorded yet; the last candidate is shown.
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DrawEvent {
    Candidate(TicketView),
    Winner(WinnerReveal),
    /// Round had no tickets to draw from.
    Unresolved(u64),
}

/// Everything one drawing needs, captured before the sequence starts.
#[derive(Debug, Clone)]
pub struct DrawInput {
    pub round_id: u64,
    pub ticket_ids: Vec<u64>,
    pub completed: bool,
    pub winning_ticket_id: u64,
    pub prize: Wei,
    pub user_tickets: Vec<u64>,
    pub owners: TicketOwnerCache,
}

impl DrawInput {
    /// Read the settled round straight from the contract rather than from a
    /// possibly stale snapshot.
    pub async fn load(
        reader: &dyn JackpotReader,
        round_id: u64,
        user: Option<Address>,
        owners: TicketOwnerCache,
    ) -> Result<Self> {
        let user_fut = async {
            match user {
                Some(user) => reader.user_tickets(&user).await,
                None => Ok(Vec::new()),
            }
        };
        let (record, ticket_ids, user_tickets) = futures::try_join!(
            reader.round(round_id),
            reader.round_tickets(round_id),
            user_fut
        )?;
        let user_tickets = user_tickets
            .into_iter()
            .filter(|id| ticket_ids.contains(id))
            .collect();

        Ok(Self {
            round_id,
            ticket_ids,
            completed: record.completed,
            winning_ticket_id: record.winning_ticket_id,
            prize: record.total_pool,
            user_tickets,
            owners,
        })
    }

    fn view(&self, ticket_id: u64) -> TicketView {
        TicketView {
            id: ticket_id,
            is_user: self.user_tickets.contains(&ticket_id),
            owner: self.owners.owner(ticket_id).map(|a| a.short()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DrawSequencer {
    pub tick: Duration,
    pub ticks: u32,
    pub reveal_delay: Duration,
}

impl DrawSequencer {
    pub fn new(settings: &KeeperSettings) -> Self {
        Self {
            tick: settings.draw_tick,
            ticks: settings.draw_ticks,
            reveal_delay: settings.reveal_delay,
        }
    }

    pub fn candidate<R: Rng + ?Sized>(input: &DrawInput, rng: &mut R) -> Option<TicketView> {
        input.ticket_ids.choose(rng).map(|id| input.view(*id))
    }

    /// Final frame: the recorded winner if the round is settled, otherwise
    /// the last candidate shown.
    pub fn reveal(input: &DrawInput, last: Option<&TicketView>) -> DrawEvent {
        if input.completed && input.winning_ticket_id != 0 {
            return DrawEvent::Winner(WinnerReveal {
                round_id: input.round_id,
                ticket: input.view(input.winning_ticket_id),
                prize: input.prize,
                fallback: false,
            });
        }

        match last {
            Some(ticket) => DrawEvent::Winner(WinnerReveal {
                round_id: input.round_id,
                ticket: ticket.clone(),
                prize: input.prize,
                fallback: true,
            }),
            None => DrawEvent::Unresolved(input.round_id),
        }
    }

    /// Play the sequence into `events`. Stops early if the receiver is gone.
    pub async fn run<R: Rng + Send>(
        &self,
        input: DrawInput,
        events: mpsc::Sender<DrawEvent>,
        mut rng: R,
    ) {
        tracing::debug!(
            "Drawing round {} over {} tickets",
            input.round_id,
            input.ticket_ids.len()
        );

        let mut last = None;
        if !input.ticket_ids.is_empty() {
            let mut ticker = tokio::time::interval(self.tick);
            for _ in 0..self.ticks {
                ticker.tick().await;
                let Some(view) = Self::candidate(&input, &mut rng) else {
                    break;
                };
                if events.send(DrawEvent::Candidate(view.clone())).await.is_err() {
                    return;
                }
                last = Some(view);
            }
            tokio::time::sleep(self.reveal_delay).await;
        }

        let reveal = Self::reveal(&input, last.as_ref());
        if let DrawEvent::Winner(w) = &reveal {
            if w.fallback {
                tracing::warn!("Round {} has no recorded winner yet", input.round_id);
            } else {
                tracing::info!("Round {} winner: ticket #{}", input.round_id, w.ticket.id);
            }
        }
        let _ = events.send(reveal).await;
    }

    /// Load `round_id` and play it on its own task. Abort the handle to
    /// cancel.
    pub fn spawn(
        self,
        reader: Arc<dyn JackpotReader>,
        round_id: u64,
        user: Option<Address>,
        owners: TicketOwnerCache,
        events: mpsc::Sender<DrawEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            match DrawInput::load(reader.as_ref(), round_id, user, owners).await {
                Ok(input) => self.run(input, events, StdRng::from_entropy()).await,
                Err(e) => tracing::warn!("Could not load round {} for drawing: {}", round_id, e),
            }
        })
    }
}
