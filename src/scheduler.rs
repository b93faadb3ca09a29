// =============================================================================
// Trading Scheduler — pure cadence functions
// =============================================================================

use crate::types::CircuitLevel;
use chrono::{DateTime, Timelike, Utc};

/// Whether a new cycle should begin right now, given the current UTC time
/// and the configured trading-hours window (`start_hour`, `end_hour`, both
/// in `[0, 24)`, UTC). A window where `start_hour > end_hour` wraps past
/// midnight.
pub fn should_trade_now(now: DateTime<Utc>, start_hour: u32, end_hour: u32) -> bool {
    if start_hour == end_hour {
        return true;
    }
    let hour = now.hour();
    if start_hour < end_hour {
        hour >= start_hour && hour < end_hour
    } else {
        hour >= start_hour || hour < end_hour
    }
}

/// The interval to sleep before the next cycle, widened as the circuit
/// breaker level worsens and after repeated consecutive failures.
///
/// `base_interval_secs` is the nominal cadence. `consecutive_failures`
/// backs off exponentially (`1.5^n`), capped at 4x the base interval.
pub fn get_dynamic_cycle_interval(
    base_interval_secs: u64,
    level: CircuitLevel,
    consecutive_failures: u32,
) -> u64 {
    let level_multiplier: f64 = match level {
        CircuitLevel::Green => 1.0,
        CircuitLevel::Yellow => 1.5,
        CircuitLevel::Orange => 2.5,
        CircuitLevel::Red => 4.0,
    };

    let backoff_multiplier = 1.5_f64.powi(consecutive_failures as i32);
    let multiplier = level_multiplier.max(backoff_multiplier).min(4.0);

    ((base_interval_secs as f64) * multiplier) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 27, hour, 0, 0).unwrap()
    }

    #[test]
    fn non_wrapping_window_matches_inside_only() {
        assert!(should_trade_now(at_hour(10), 8, 18));
        assert!(!should_trade_now(at_hour(20), 8, 18));
    }

    #[test]
    fn wrapping_window_matches_across_midnight() {
        assert!(should_trade_now(at_hour(23), 22, 4));
        assert!(should_trade_now(at_hour(1), 22, 4));
        assert!(!should_trade_now(at_hour(10), 22, 4));
    }

    #[test]
    fn equal_bounds_means_always_on() {
        assert!(should_trade_now(at_hour(0), 5, 5));
    }

    #[test]
    fn green_no_failures_returns_base_interval() {
        assert_eq!(get_dynamic_cycle_interval(60, CircuitLevel::Green, 0), 60);
    }

    #[test]
    fn red_level_quadruples_interval() {
        assert_eq!(get_dynamic_cycle_interval(60, CircuitLevel::Red, 0), 240);
    }

    #[test]
    fn backoff_is_capped_at_four_times_base() {
        let interval = get_dynamic_cycle_interval(60, CircuitLevel::Green, 20);
        assert_eq!(interval, 240);
    }
}
