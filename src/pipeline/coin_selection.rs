// =============================================================================
// Stage 2 — Coin Selection
// =============================================================================
//
// Four coin-selector analysts each submit a ranked pick list. Rank-weighted
// conviction scores are aggregated across analysts into per-(symbol,
// direction) totals; the highest total wins. A winning MANAGE pick diverts
// the cycle into position management and bypasses Stages 3-4.
// =============================================================================

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{CoinAction, Side};

use super::{StageFailure, WinningPick};

/// One analyst's single pick within their ranked list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinPick {
    pub symbol: String,
    pub action: CoinAction,
    /// Conviction on a [0, 10] scale.
    pub conviction: f64,
    pub reason: String,
}

/// The structural shape an analyst's Stage 2 response must deserialize into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinSelectionResponse {
    pub picks: Vec<CoinPick>,
}

/// Rank-position weight: #1 gets 3x, #2 gets 2x, #3 gets 1x, anything
/// beyond rank 3 does not contribute to the aggregate score.
fn rank_weight(rank: usize) -> f64 {
    match rank {
        0 => 3.0,
        1 => 2.0,
        2 => 1.0,
        _ => 0.0,
    }
}

/// The outcome of aggregating every analyst's ranked pick list.
pub enum Stage2Outcome {
    /// The pipeline should proceed to Stage 3 with this (symbol, direction).
    Proceed(WinningPick),
    /// The winning pick referred to an open position; the pipeline should
    /// divert to position management and skip Stages 3-4.
    Manage { symbol: String, reason: String },
}

/// Aggregate every coin-selector analyst's response into a single winner.
///
/// `approved_symbols` restricts which picks are eligible; picks for any
/// other symbol are dropped before scoring.
pub fn aggregate(
    responses: &[(String, CoinSelectionResponse)],
    approved_symbols: &[String],
) -> Result<Stage2Outcome, StageFailure> {
    if responses.is_empty() {
        return Err(StageFailure::new("coin_selection", "no analyst responses"));
    }

    let mut scores: HashMap<(String, CoinAction), f64> = HashMap::new();
    let mut reasons: HashMap<(String, CoinAction), String> = HashMap::new();

    for (_analyst_id, response) in responses {
        for (rank, pick) in response.picks.iter().enumerate() {
            if !approved_symbols.iter().any(|s| s == &pick.symbol) {
                continue;
            }
            let weight = rank_weight(rank);
            if weight == 0.0 {
                continue;
            }
            let key = (pick.symbol.clone(), pick.action);
            *scores.entry(key.clone()).or_insert(0.0) += weight * pick.conviction;
            reasons.entry(key).or_insert_with(|| pick.reason.clone());
        }
    }

    let ((symbol, action), _score) = scores
        .into_iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .ok_or_else(|| StageFailure::new("coin_selection", "no eligible picks among approved symbols"))?;

    match action {
        CoinAction::Manage => Ok(Stage2Outcome::Manage {
            reason: reasons
                .get(&(symbol.clone(), action))
                .cloned()
                .unwrap_or_default(),
            symbol,
        }),
        CoinAction::Long => Ok(Stage2Outcome::Proceed(WinningPick {
            symbol,
            side: Side::Long,
        })),
        CoinAction::Short => Ok(Stage2Outcome::Proceed(WinningPick {
            symbol,
            side: Side::Short,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pick(symbol: &str, action: CoinAction, conviction: f64) -> CoinPick {
        CoinPick {
            symbol: symbol.to_string(),
            action,
            conviction,
            reason: "test".to_string(),
        }
    }

    #[test]
    fn highest_aggregate_score_wins() {
        let responses = vec![
            (
                "value".to_string(),
                CoinSelectionResponse {
                    picks: vec![pick("cmt_btcusdt", CoinAction::Long, 8.0)],
                },
            ),
            (
                "growth".to_string(),
                CoinSelectionResponse {
                    picks: vec![pick("cmt_ethusdt", CoinAction::Long, 9.0)],
                },
            ),
        ];
        let approved = vec!["cmt_btcusdt".to_string(), "cmt_ethusdt".to_string()];

        // BTC: rank0 weight 3 * 8.0 = 24. ETH: rank0 weight 3 * 9.0 = 27.
        match aggregate(&responses, &approved).unwrap() {
            Stage2Outcome::Proceed(p) => assert_eq!(p.symbol, "cmt_ethusdt"),
            _ => panic!("expected Proceed"),
        }
    }

    #[test]
    fn unapproved_symbols_are_dropped() {
        let responses = vec![(
            "value".to_string(),
            CoinSelectionResponse {
                picks: vec![pick("cmt_shibusdt", CoinAction::Long, 10.0)],
            },
        )];
        let approved = vec!["cmt_btcusdt".to_string()];
        assert!(aggregate(&responses, &approved).is_err());
    }

    #[test]
    fn manage_winner_diverts_to_position_management() {
        let responses = vec![(
            "value".to_string(),
            CoinSelectionResponse {
                picks: vec![pick("cmt_btcusdt", CoinAction::Manage, 10.0)],
            },
        )];
        let approved = vec!["cmt_btcusdt".to_string()];
        match aggregate(&responses, &approved).unwrap() {
            Stage2Outcome::Manage { symbol, .. } => assert_eq!(symbol, "cmt_btcusdt"),
            _ => panic!("expected Manage"),
        }
    }

    #[test]
    fn picks_beyond_rank_three_do_not_contribute() {
        let responses = vec![(
            "value".to_string(),
            CoinSelectionResponse {
                picks: vec![
                    pick("cmt_btcusdt", CoinAction::Long, 1.0),
                    pick("cmt_ethusdt", CoinAction::Long, 1.0),
                    pick("cmt_solusdt", CoinAction::Long, 1.0),
                    pick("cmt_bnbusdt", CoinAction::Long, 100.0),
                ],
            },
        )];
        let approved = vec![
            "cmt_btcusdt".to_string(),
            "cmt_ethusdt".to_string(),
            "cmt_solusdt".to_string(),
            "cmt_bnbusdt".to_string(),
        ];
        match aggregate(&responses, &approved).unwrap() {
            Stage2Outcome::Proceed(p) => assert_eq!(p.symbol, "cmt_btcusdt"),
            _ => panic!("expected Proceed"),
        }
    }
}
