// =============================================================================
// Circuit Breaker — three triggers protecting collaborative capital
// =============================================================================
//
// Triggers:
//   1. BTC Drop          — trips when BTC's tracked price falls more than a
//                          threshold percentage within a single cycle.
//   2. Portfolio Drawdown — trips when unrealized + realized drawdown from
//                          the tracked peak equity exceeds a threshold.
//   3. Funding Extreme    — trips when any open position's funding rate
//                          exceeds an extreme magnitude.
//
// Severity escalates GREEN -> YELLOW -> ORANGE -> RED. RED halts new entries
// and triggers an emergency flatten of all open positions.
// =============================================================================

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::CircuitLevel;

/// Snapshot of a single trigger for dashboard display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerInfo {
    pub name: String,
    pub current: f64,
    pub limit: f64,
    pub tripped: bool,
}

/// Full snapshot of the circuit breaker's internal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub level: CircuitLevel,
    pub btc_drop_pct: f64,
    pub portfolio_drawdown_pct: f64,
    pub max_funding_rate_abs: f64,
    pub peak_equity: f64,
    pub triggers: Vec<TriggerInfo>,
}

struct Inner {
    peak_equity: f64,
    last_btc_price: Option<f64>,
    btc_drop_pct: f64,
    portfolio_drawdown_pct: f64,
    max_funding_rate_abs: f64,
}

/// Thresholds supplied at construction time, generalizing the four-breaker
/// risk gate onto the trio of triggers this engine actually tracks.
pub struct CircuitBreaker {
    state: RwLock<Inner>,
    btc_drop_yellow_pct: f64,
    btc_drop_orange_pct: f64,
    btc_drop_red_pct: f64,
    drawdown_yellow_pct: f64,
    drawdown_orange_pct: f64,
    drawdown_red_pct: f64,
    funding_extreme_abs: f64,
}

impl CircuitBreaker {
    pub fn new(
        starting_equity: f64,
        btc_drop_yellow_pct: f64,
        btc_drop_orange_pct: f64,
        btc_drop_red_pct: f64,
        drawdown_yellow_pct: f64,
        drawdown_orange_pct: f64,
        drawdown_red_pct: f64,
        funding_extreme_abs: f64,
    ) -> Self {
        info!(
            starting_equity,
            btc_drop_red_pct, drawdown_red_pct, funding_extreme_abs, "CircuitBreaker initialised"
        );

        Self {
            state: RwLock::new(Inner {
                peak_equity: starting_equity,
                last_btc_price: None,
                btc_drop_pct: 0.0,
                portfolio_drawdown_pct: 0.0,
                max_funding_rate_abs: 0.0,
            }),
            btc_drop_yellow_pct,
            btc_drop_orange_pct,
            btc_drop_red_pct,
            drawdown_yellow_pct,
            drawdown_orange_pct,
            drawdown_red_pct,
            funding_extreme_abs,
        }
    }

    /// Feed the latest BTC price, current equity, and open funding rates.
    /// Updates the internal trigger readings and returns the resulting level.
    pub fn evaluate(
        &self,
        btc_price: f64,
        current_equity: f64,
        funding_rates: &[f64],
    ) -> CircuitLevel {
        let mut s = self.state.write();

        s.btc_drop_pct = match s.last_btc_price {
            Some(prev) if prev > 0.0 => ((prev - btc_price) / prev).max(0.0),
            _ => 0.0,
        };
        s.last_btc_price = Some(btc_price);

        if current_equity > s.peak_equity {
            s.peak_equity = current_equity;
        }
        s.portfolio_drawdown_pct = if s.peak_equity > 0.0 {
            ((s.peak_equity - current_equity) / s.peak_equity).max(0.0)
        } else {
            0.0
        };

        s.max_funding_rate_abs = funding_rates
            .iter()
            .map(|r| r.abs())
            .fold(0.0_f64, f64::max);

        let level = self.compute_level(&s);

        if level == CircuitLevel::Red {
            warn!(
                btc_drop_pct = s.btc_drop_pct,
                portfolio_drawdown_pct = s.portfolio_drawdown_pct,
                max_funding_rate_abs = s.max_funding_rate_abs,
                "circuit breaker at RED"
            );
        }

        level
    }

    pub fn get_state(&self) -> CircuitBreakerState {
        let s = self.state.read();
        let level = self.compute_level(&s);
        CircuitBreakerState {
            level,
            btc_drop_pct: s.btc_drop_pct,
            portfolio_drawdown_pct: s.portfolio_drawdown_pct,
            max_funding_rate_abs: s.max_funding_rate_abs,
            peak_equity: s.peak_equity,
            triggers: self.build_trigger_info(&s),
        }
    }

    fn compute_level(&self, s: &Inner) -> CircuitLevel {
        let btc_level = Self::bucket(
            s.btc_drop_pct,
            self.btc_drop_yellow_pct,
            self.btc_drop_orange_pct,
            self.btc_drop_red_pct,
        );
        let drawdown_level = Self::bucket(
            s.portfolio_drawdown_pct,
            self.drawdown_yellow_pct,
            self.drawdown_orange_pct,
            self.drawdown_red_pct,
        );
        let funding_level = if s.max_funding_rate_abs >= self.funding_extreme_abs {
            CircuitLevel::Orange
        } else {
            CircuitLevel::Green
        };

        btc_level.max(drawdown_level).max(funding_level)
    }

    fn bucket(value: f64, yellow: f64, orange: f64, red: f64) -> CircuitLevel {
        if value >= red {
            CircuitLevel::Red
        } else if value >= orange {
            CircuitLevel::Orange
        } else if value >= yellow {
            CircuitLevel::Yellow
        } else {
            CircuitLevel::Green
        }
    }

    fn build_trigger_info(&self, s: &Inner) -> Vec<TriggerInfo> {
        vec![
            TriggerInfo {
                name: "BTC Drop".to_string(),
                current: s.btc_drop_pct * 100.0,
                limit: self.btc_drop_red_pct * 100.0,
                tripped: s.btc_drop_pct >= self.btc_drop_red_pct,
            },
            TriggerInfo {
                name: "Portfolio Drawdown".to_string(),
                current: s.portfolio_drawdown_pct * 100.0,
                limit: self.drawdown_red_pct * 100.0,
                tripped: s.portfolio_drawdown_pct >= self.drawdown_red_pct,
            },
            TriggerInfo {
                name: "Funding Extreme".to_string(),
                current: s.max_funding_rate_abs,
                limit: self.funding_extreme_abs,
                tripped: s.max_funding_rate_abs >= self.funding_extreme_abs,
            },
        ]
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("btc_drop_red_pct", &self.btc_drop_red_pct)
            .field("drawdown_red_pct", &self.drawdown_red_pct)
            .field("funding_extreme_abs", &self.funding_extreme_abs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(10_000.0, 0.03, 0.06, 0.10, 0.05, 0.10, 0.15, 0.02)
    }

    #[test]
    fn starts_green_with_no_movement() {
        let cb = breaker();
        let level = cb.evaluate(50000.0, 10_000.0, &[0.0001]);
        assert_eq!(level, CircuitLevel::Green);
    }

    #[test]
    fn btc_crash_trips_red() {
        let cb = breaker();
        cb.evaluate(50000.0, 10_000.0, &[]);
        let level = cb.evaluate(44000.0, 10_000.0, &[]);
        assert_eq!(level, CircuitLevel::Red);
    }

    #[test]
    fn portfolio_drawdown_trips_orange() {
        let cb = breaker();
        cb.evaluate(50000.0, 10_000.0, &[]);
        let level = cb.evaluate(50000.0, 9_000.0, &[]);
        assert_eq!(level, CircuitLevel::Orange);
    }

    #[test]
    fn extreme_funding_rate_trips_orange() {
        let cb = breaker();
        let level = cb.evaluate(50000.0, 10_000.0, &[0.025]);
        assert_eq!(level, CircuitLevel::Orange);
    }

    #[test]
    fn state_snapshot_reports_tripped_triggers() {
        let cb = breaker();
        cb.evaluate(50000.0, 10_000.0, &[]);
        cb.evaluate(44000.0, 10_000.0, &[]);
        let state = cb.get_state();
        assert_eq!(state.level, CircuitLevel::Red);
        assert!(state.triggers.iter().any(|t| t.name == "BTC Drop" && t.tripped));
    }
}
