use chrono::Utc;

/// Seconds until `end_time`. A zero end time means the countdown has not
/// started. Always derived from the on-chain end time so local drift never
/// accumulates between ticks.
pub fn time_left(end_time: u64, now: u64) -> u64 {
    if end_time == 0 {
        return 0;
    }
    end_time.saturating_sub(now)
}

/// `m:ss`
pub fn format_time(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

pub fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_down_to_zero() {
        assert_eq!(time_left(100, 40), 60);
        assert_eq!(time_left(100, 100), 0);
        assert_eq!(time_left(100, 250), 0);
        assert_eq!(time_left(0, 50), 0);
    }

    #[test]
    fn each_tick_is_independent_of_the_last() {
        let end = 1_000;
        // ticks arriving out of order or after a stall still match end - now
        for now in [990u64, 995, 970, 1_001, 999] {
            assert_eq!(time_left(end, now), end.saturating_sub(now));
        }
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_time(0), "0:00");
        assert_eq!(format_time(9), "0:09");
        assert_eq!(format_time(125), "2:05");
    }
}
