// =============================================================================
// Portfolio State — one authoritative shared view, many analyst facades
// =============================================================================
//
// The trading model is collaborative: every analyst trades out of the same
// wallet and position set. `SharedPortfolio` is the single authoritative
// value (refreshed from the exchange every cycle); each `AnalystState` holds
// only its static profile plus an `Arc` pointer back to the same portfolio,
// so there is no duplication and no risk of divergent copies.
// =============================================================================

use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::analysts::AnalystProfile;
use crate::exchange::{ExchangeClient, ExchangePosition};
use crate::types::Side;

/// A position enriched with the current mark-derived unrealized PnL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    pub size: f64,
    pub entry_price: f64,
    pub leverage: f64,
    pub unrealized_pnl: f64,
}

/// The single authoritative portfolio value, shared by every analyst.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedPortfolio {
    pub balance: f64,
    pub positions: Vec<Position>,
    pub total_trades: u64,
    pub win_rate: f64,
    pub last_trade_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl SharedPortfolio {
    pub fn total_value(&self) -> f64 {
        self.balance + self.positions.iter().map(|p| p.unrealized_pnl).sum::<f64>()
    }
}

impl Default for SharedPortfolio {
    fn default() -> Self {
        Self {
            balance: 0.0,
            positions: Vec::new(),
            total_trades: 0,
            win_rate: 0.0,
            last_trade_time: None,
        }
    }
}

/// Per-analyst facade: static identity plus a pointer into the shared portfolio.
#[derive(Clone)]
pub struct AnalystState {
    pub profile: AnalystProfile,
    pub portfolio: Arc<RwLock<SharedPortfolio>>,
}

/// Build the eight `AnalystState` entries, all pointing at the same
/// freshly-initialised `SharedPortfolio`.
pub fn build_analyst_states(roster: Vec<AnalystProfile>) -> (Vec<AnalystState>, Arc<RwLock<SharedPortfolio>>) {
    let portfolio = Arc::new(RwLock::new(SharedPortfolio::default()));
    let states = roster
        .into_iter()
        .map(|profile| AnalystState {
            profile,
            portfolio: Arc::clone(&portfolio),
        })
        .collect();
    (states, portfolio)
}

/// Refresh the shared portfolio from the exchange. The wallet `available`
/// value always dominates any cached figure — this function never trusts a
/// stale in-memory balance over what the exchange reports.
#[instrument(skip(client, portfolio))]
pub async fn refresh(client: &ExchangeClient, portfolio: &Arc<RwLock<SharedPortfolio>>) -> anyhow::Result<()> {
    let assets = client.get_account_assets().await?;
    let balance = assets
        .iter()
        .find(|a| a.asset.eq_ignore_ascii_case("USDT"))
        .map(|a| a.available)
        .unwrap_or(0.0);

    if !balance.is_finite() || balance < 0.0 {
        anyhow::bail!("exchange reported non-finite or negative balance: {balance}");
    }

    let raw_positions = client.get_positions().await?;

    // Per-position mark-price refresh runs concurrently, mirroring
    // `market_data::assemble`'s fan-out; a symbol whose ticker fetch fails
    // falls back to its entry price rather than dropping the position.
    let fetches = raw_positions.into_iter().map(|p: ExchangePosition| async move {
        let mark_price = match client.get_ticker(&p.symbol).await {
            Ok(ticker) => ticker.mark_price,
            Err(e) => {
                warn!(symbol = %p.symbol, error = %e, "mark price refresh failed, using entry price");
                p.entry_price
            }
        };
        Position {
            unrealized_pnl: unrealized_pnl(p.entry_price, mark_price, p.size, p.side),
            symbol: p.symbol,
            side: p.side,
            size: p.size,
            entry_price: p.entry_price,
            leverage: p.leverage,
        }
    });
    let positions = join_all(fetches).await;

    let mut guard = portfolio.write();
    guard.balance = balance;
    guard.positions = positions;
    Ok(())
}

/// Compute unrealized PnL for a position given the current mark price.
pub fn unrealized_pnl(entry_price: f64, mark_price: f64, size: f64, side: Side) -> f64 {
    let direction = match side {
        Side::Long => 1.0,
        Side::Short => -1.0,
    };
    (mark_price - entry_price) * size * direction
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_position_gains_when_mark_rises() {
        let pnl = unrealized_pnl(100.0, 110.0, 2.0, Side::Long);
        assert!((pnl - 20.0).abs() < 1e-9);
    }

    #[test]
    fn short_position_gains_when_mark_falls() {
        let pnl = unrealized_pnl(100.0, 90.0, 2.0, Side::Short);
        assert!((pnl - 20.0).abs() < 1e-9);
    }

    #[test]
    fn total_value_includes_unrealized_pnl() {
        let portfolio = SharedPortfolio {
            balance: 1000.0,
            positions: vec![Position {
                symbol: "cmt_btcusdt".to_string(),
                side: Side::Long,
                size: 1.0,
                entry_price: 100.0,
                leverage: 2.0,
                unrealized_pnl: 50.0,
            }],
            total_trades: 1,
            win_rate: 100.0,
            last_trade_time: None,
        };
        assert!((portfolio.total_value() - 1050.0).abs() < 1e-9);
    }

    #[test]
    fn build_analyst_states_share_one_portfolio() {
        let roster = crate::analysts::roster();
        let (states, portfolio) = build_analyst_states(roster);
        assert_eq!(states.len(), 8);
        portfolio.write().balance = 500.0;
        for s in &states {
            assert_eq!(s.portfolio.read().balance, 500.0);
        }
    }
}
