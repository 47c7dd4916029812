use crate::config::JackpotConfig;
use crate::types::Wei;

/// Unit label used in user-facing purchase messages.
pub const CURRENCY_LABEL: &str = "0G";

pub fn minimum_message(minimum: Wei) -> String {
    format!(
        "Minimum amount is {} {}",
        minimum.to_ether_compact(),
        CURRENCY_LABEL
    )
}

/// Client-side purchase gating. The contract re-validates every purchase;
/// this only decides what the user is told before a transaction is built.
#[derive(Debug, Clone, Copy)]
pub struct BuyGuard {
    pub min_payment: Wei,
    pub ticket_price: Wei,
    pub lock_period: u64,
}

impl BuyGuard {
    pub fn new(min_payment: Wei, ticket_price: Wei, lock_period: u64) -> Self {
        Self {
            min_payment,
            ticket_price,
            lock_period,
        }
    }

    pub fn from_config(config: &JackpotConfig) -> Self {
        Self::new(
            config.min_payment,
            config.ticket_price,
            config.lock_period_secs,
        )
    }

    pub fn is_lock_period(&self, time_left: u64) -> bool {
        time_left > 0 && time_left <= self.lock_period
    }

    /// No countdown running, or more than the lock period remaining.
    pub fn is_buying_allowed(&self, time_left: u64) -> bool {
        time_left == 0 || time_left > self.lock_period
    }

    pub fn tickets_for(&self, amount: Wei) -> u64 {
        if self.ticket_price == Wei::ZERO {
            return 0;
        }
        u64::try_from(amount.as_wei() / self.ticket_price.as_wei()).unwrap_or(u64::MAX)
    }

    pub fn minimum_message(&self) -> String {
        minimum_message(self.min_payment)
    }

    pub fn lock_message(&self) -> String {
        format!("Buying disabled in last {} seconds", self.lock_period)
    }

    /// Why the buy action is disabled, if it is. Checks run in a fixed order
    /// so at most one reason is reported.
    pub fn disabled_message(&self, pending: bool, amount: Wei, time_left: u64) -> Option<String> {
        if pending {
            return Some("Transaction in progress...".to_string());
        }
        if amount < self.min_payment {
            return Some(self.minimum_message());
        }
        if self.is_lock_period(time_left) {
            return Some(self.lock_message());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> BuyGuard {
        BuyGuard::from_config(&JackpotConfig::default())
    }

    fn ether(s: &str) -> Wei {
        Wei::from_ether_str(s).unwrap()
    }

    #[test]
    fn lock_window_bounds() {
        let guard = guard();
        assert!(guard.is_buying_allowed(0));
        assert!(!guard.is_buying_allowed(1));
        assert!(!guard.is_buying_allowed(5));
        assert!(guard.is_buying_allowed(6));
        assert!(!guard.is_lock_period(0));
        assert!(guard.is_lock_period(5));
    }

    #[test]
    fn tickets_round_down() {
        let guard = guard();
        assert_eq!(guard.tickets_for(ether("0.02")), 2);
        assert_eq!(guard.tickets_for(ether("0.059")), 5);
        assert_eq!(guard.tickets_for(Wei::ZERO), 0);
    }

    #[test]
    fn round_ended_below_minimum_reports_minimum() {
        // end time == now: countdown is zero, no lock window
        let guard = guard();
        let msg = guard.disabled_message(false, ether("0.01"), 0).unwrap();
        assert_eq!(msg, "Minimum amount is 0.02 0G");
    }

    #[test]
    fn lock_window_reports_lock_only() {
        let guard = guard();
        let msg = guard.disabled_message(false, ether("0.05"), 3).unwrap();
        assert_eq!(msg, "Buying disabled in last 5 seconds");

        // both conditions hold: only one message comes back
        let msg = guard.disabled_message(false, ether("0.01"), 3).unwrap();
        assert_eq!(msg, "Minimum amount is 0.02 0G");
        assert!(!msg.contains("Buying disabled"));
    }

    #[test]
    fn pending_takes_precedence() {
        let guard = guard();
        assert_eq!(
            guard.disabled_message(true, ether("0.01"), 3).as_deref(),
            Some("Transaction in progress...")
        );
        assert_eq!(guard.disabled_message(false, ether("0.05"), 60), None);
    }
}
