// =============================================================================
// Risk Council — Stage 4 deterministic checklist
// =============================================================================
//
// Policy: prefer adjustment over veto. Size, leverage, and stop-loss
// distance are clamped down to the configured limit and the trade proceeds;
// only concurrency, same-direction, and weekly-drawdown limits are hard
// blockers that veto the trade outright.
//
// Grounded in the ordered-check, (bool, Option<reason>) shape of the
// teacher's risk engine, generalized from trip-and-block into
// adjust-then-approve.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::exchange::ExchangePosition;
use crate::types::Side;

/// Proposed trade parameters entering the council, before adjustment.
#[derive(Debug, Clone)]
pub struct ProposedTrade {
    pub symbol: String,
    pub side: Side,
    pub position_size: f64,
    pub leverage: f64,
    pub stop_loss: f64,
    pub entry_price: f64,
}

/// The council's decision. When `approved` is true, `position_size`,
/// `leverage`, and `stop_loss` are authoritative for the executor,
/// superseding the champion's original proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskCouncilDecision {
    pub approved: bool,
    pub position_size: f64,
    pub leverage: f64,
    pub stop_loss: f64,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub veto_reason: Option<String>,
}

/// Evaluate a proposed trade against the deterministic checklist.
///
/// `open_positions` is the current portfolio; `weekly_realized_pnl_pct` is
/// the trailing 7x24h realized P&L as a percentage of capital (negative for
/// a loss); `funding_rate` is the proposed symbol's current funding rate;
/// `account_equity` is the portfolio's current total value, the denominator
/// for the net exposure checklist item.
pub fn evaluate(
    config: &EngineConfig,
    proposed: &ProposedTrade,
    open_positions: &[ExchangePosition],
    weekly_realized_pnl_pct: f64,
    funding_rate: Option<f64>,
    account_equity: f64,
) -> RiskCouncilDecision {
    let mut warnings = Vec::new();

    // --- Hard blockers (veto, no adjustment) -------------------------------

    let concurrent = open_positions.len() as u32;
    if concurrent >= config.max_concurrent_positions {
        return vetoed(format!(
            "concurrent positions {concurrent} at or above limit {}",
            config.max_concurrent_positions
        ));
    }

    let same_direction = open_positions
        .iter()
        .filter(|p| p.side == proposed.side)
        .count() as u32;
    if same_direction >= config.max_same_direction_positions {
        return vetoed(format!(
            "same-direction positions {same_direction} at or above limit {}",
            config.max_same_direction_positions
        ));
    }

    if -weekly_realized_pnl_pct >= config.max_weekly_drawdown_pct {
        return vetoed(format!(
            "weekly drawdown {:.2}% at or above limit {:.2}%",
            -weekly_realized_pnl_pct, config.max_weekly_drawdown_pct
        ));
    }

    // --- Soft limits (adjust down, never veto) ------------------------------

    let mut position_size = proposed.position_size;
    if position_size > 10.0 {
        warnings.push(format!("position size {position_size} clamped to 10"));
        position_size = 10.0;
    }

    let mut leverage = proposed.leverage;
    if leverage > config.max_leverage as f64 {
        warnings.push(format!(
            "leverage {leverage} clamped to max {}",
            config.max_leverage
        ));
        leverage = config.max_leverage as f64;
    }

    let mut stop_loss = proposed.stop_loss;
    if proposed.entry_price > 0.0 {
        let distance_pct = ((proposed.entry_price - stop_loss).abs() / proposed.entry_price) * 100.0;
        if distance_pct > config.max_stop_loss_distance_pct {
            let max_distance = proposed.entry_price * (config.max_stop_loss_distance_pct / 100.0);
            stop_loss = match proposed.side {
                Side::Long => proposed.entry_price - max_distance,
                Side::Short => proposed.entry_price + max_distance,
            };
            warnings.push(format!(
                "stop-loss distance {distance_pct:.2}% clamped to limit {:.2}%",
                config.max_stop_loss_distance_pct
            ));
        }
    }

    if let Some(rate) = funding_rate {
        let against = match proposed.side {
            Side::Long => rate > 0.0,
            Side::Short => rate < 0.0,
        };
        if against && rate.abs() > config.max_funding_against_pct {
            warnings.push(format!(
                "funding rate {rate:.4} is unfavorable against {:?} beyond {:.4} threshold",
                proposed.side, config.max_funding_against_pct
            ));
        }
    }

    // Net exposure: margin in use (notional / leverage), not notional, on
    // the side this trade would add to.
    let (existing_long_margin, existing_short_margin) =
        open_positions.iter().fold((0.0, 0.0), |(long, short), p| {
            let margin = margin_used(p.size, p.entry_price, p.leverage);
            match p.side {
                Side::Long => (long + margin, short),
                Side::Short => (long, short + margin),
            }
        });

    let (limit_fraction, existing_margin) = match proposed.side {
        Side::Long => (config.net_exposure_long_limit, existing_long_margin),
        Side::Short => (config.net_exposure_short_limit, existing_short_margin),
    };
    let exposure_cap = (account_equity * limit_fraction).max(0.0);
    let remaining_budget = (exposure_cap - existing_margin).max(0.0);

    if remaining_budget <= 0.0 {
        return vetoed(format!(
            "{:?} net exposure already at or above {:.2}% of equity limit",
            proposed.side,
            limit_fraction * 100.0
        ));
    }

    let proposed_margin = margin_used(position_size, proposed.entry_price, leverage);
    if proposed_margin > remaining_budget && proposed_margin > 0.0 {
        let scale = remaining_budget / proposed_margin;
        position_size *= scale;
        warnings.push(format!(
            "position size clamped to keep {:?} net exposure within {:.2}% of equity",
            proposed.side,
            limit_fraction * 100.0
        ));
    }

    RiskCouncilDecision {
        approved: true,
        position_size,
        leverage,
        stop_loss,
        warnings,
        veto_reason: None,
    }
}

/// Margin used by a position: notional divided by leverage, zero if
/// leverage is non-positive.
fn margin_used(size: f64, entry_price: f64, leverage: f64) -> f64 {
    if leverage > 0.0 {
        (size * entry_price) / leverage
    } else {
        0.0
    }
}

fn vetoed(reason: String) -> RiskCouncilDecision {
    RiskCouncilDecision {
        approved: false,
        position_size: 0.0,
        leverage: 0.0,
        stop_loss: 0.0,
        warnings: Vec::new(),
        veto_reason: Some(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> EngineConfig {
        EngineConfig::default()
    }

    fn base_trade() -> ProposedTrade {
        ProposedTrade {
            symbol: "cmt_btcusdt".to_string(),
            side: Side::Long,
            position_size: 4.0,
            leverage: 5.0,
            stop_loss: 47000.0,
            entry_price: 50000.0,
        }
    }

    #[test]
    fn within_bounds_trade_is_approved_unadjusted() {
        let cfg = base_config();
        let decision = evaluate(&cfg, &base_trade(), &[], 0.0, Some(0.0001), 1_000_000.0);
        assert!(decision.approved);
        assert!(decision.warnings.is_empty());
    }

    #[test]
    fn excessive_leverage_is_clamped_not_vetoed() {
        let cfg = base_config();
        let mut trade = base_trade();
        trade.leverage = 999.0;
        let decision = evaluate(&cfg, &trade, &[], 0.0, None, 1_000_000.0);
        assert!(decision.approved);
        assert_eq!(decision.leverage, cfg.max_leverage as f64);
    }

    #[test]
    fn weekly_drawdown_beyond_limit_vetoes() {
        let cfg = base_config();
        let decision = evaluate(
            &cfg,
            &base_trade(),
            &[],
            -cfg.max_weekly_drawdown_pct - 1.0,
            None,
            1_000_000.0,
        );
        assert!(!decision.approved);
        assert!(decision.veto_reason.unwrap().contains("weekly drawdown"));
    }

    #[test]
    fn concurrency_cap_vetoes() {
        let cfg = base_config();
        let positions: Vec<ExchangePosition> = (0..cfg.max_concurrent_positions)
            .map(|i| ExchangePosition {
                symbol: format!("cmt_sym{i}usdt"),
                side: Side::Short,
                size: 1.0,
                entry_price: 100.0,
                leverage: 2.0,
                unrealized_pnl: 0.0,
            })
            .collect();
        let decision = evaluate(&cfg, &base_trade(), &positions, 0.0, None, 1_000_000.0);
        assert!(!decision.approved);
    }

    #[test]
    fn net_exposure_beyond_limit_clamps_position_size() {
        let cfg = base_config();
        let mut trade = base_trade();
        trade.position_size = 100.0; // notional 5_000_000 @ leverage 5 -> margin 1_000_000
        let decision = evaluate(&cfg, &trade, &[], 0.0, None, 100_000.0);
        assert!(decision.approved);
        assert!(decision.position_size < trade.position_size);
        assert!(decision
            .warnings
            .iter()
            .any(|w| w.contains("net exposure")));
    }

    #[test]
    fn net_exposure_already_saturated_vetoes() {
        let cfg = base_config();
        let positions = vec![ExchangePosition {
            symbol: "cmt_ethusdt".to_string(),
            side: Side::Long,
            size: 100.0,
            entry_price: 1000.0,
            leverage: 1.0,
            unrealized_pnl: 0.0,
        }];
        // existing long margin = 100_000, equity = 100_000, limit 0.8 -> cap 80_000, already exceeded.
        let decision = evaluate(&cfg, &base_trade(), &positions, 0.0, None, 100_000.0);
        assert!(!decision.approved);
        assert!(decision.veto_reason.unwrap().contains("net exposure"));
    }

    #[test]
    fn stop_loss_distance_beyond_limit_is_clamped() {
        let cfg = base_config();
        let mut trade = base_trade();
        trade.stop_loss = 30000.0; // 40% away from 50000 entry
        let decision = evaluate(&cfg, &trade, &[], 0.0, None, 1_000_000.0);
        assert!(decision.approved);
        let distance_pct = ((trade.entry_price - decision.stop_loss) / trade.entry_price) * 100.0;
        assert!((distance_pct - cfg.max_stop_loss_distance_pct).abs() < 1e-6);
    }
}
