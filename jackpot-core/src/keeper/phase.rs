use crate::sync::time_left;
use crate::types::Round;
use serde::{Deserialize, Serialize};

/// Where a round sits in its lifecycle, as seen from the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundPhase {
    /// Accepting tickets, or waiting for the first qualifying purchase.
    Active,
    /// Last seconds before the end time; purchases are refused.
    LockPeriod,
    /// Countdown reached zero, round not finalized.
    Ended,
    /// A completion transaction sequence is in flight.
    Completing,
    Completed,
}

impl RoundPhase {
    pub fn derive(round: &Round, now: u64, lock_period: u64, completing: bool) -> Self {
        if round.completed {
            return RoundPhase::Completed;
        }
        if completing {
            return RoundPhase::Completing;
        }
        if round.end_time > 0 && now >= round.end_time {
            return RoundPhase::Ended;
        }

        let remaining = time_left(round.end_time, now);
        if remaining > 0 && remaining <= lock_period {
            RoundPhase::LockPeriod
        } else {
            RoundPhase::Active
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RoundPhase::Active => "active",
            RoundPhase::LockPeriod => "lock period",
            RoundPhase::Ended => "ended",
            RoundPhase::Completing => "completing",
            RoundPhase::Completed => "completed",
        }
    }
}
