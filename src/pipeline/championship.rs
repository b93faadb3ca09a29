// =============================================================================
// Stage 3 — Championship
// =============================================================================
//
// All eight analysts submit a full thesis for the Stage 2 winner. A judge
// ranks theses on four weighted criteria; the champion is the highest
// scorer. When the dedicated judging call fails, a deterministic fallback
// scorer steps in so a single LLM hiccup never stalls the cycle.
// =============================================================================

use std::collections::HashMap;

use crate::analysts::AnalysisResult;
use crate::config::JudgeCriteriaWeights;

use super::StageFailure;

/// Per-criterion scores the judge assigns to one analyst's thesis, each in
/// `[0, 100]` before weighting.
#[derive(Debug, Clone)]
pub struct CriteriaScores {
    pub data_quality: f64,
    pub logic: f64,
    pub risk_awareness: f64,
    pub catalyst_clarity: f64,
}

impl CriteriaScores {
    fn weighted_total(&self, weights: &JudgeCriteriaWeights) -> f64 {
        (self.data_quality * weights.data_quality
            + self.logic * weights.logic
            + self.risk_awareness * weights.risk_awareness
            + self.catalyst_clarity * weights.catalyst_clarity)
            / 100.0
    }
}

/// The judge's raw response shape, as returned by the dedicated judging role.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct JudgeResponse {
    pub scores: HashMap<String, JudgeCriteriaScoresRaw>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct JudgeCriteriaScoresRaw {
    pub data_quality: f64,
    pub logic: f64,
    pub risk_awareness: f64,
    pub catalyst_clarity: f64,
}

/// Result of the championship: the winning analyst id and every analyst's
/// weighted total, for logging and the event bus.
pub struct ChampionshipResult {
    pub champion_id: String,
    pub totals: HashMap<String, f64>,
}

/// Score every thesis using the judge's response, picking the highest
/// weighted total as champion.
pub fn judge(
    theses: &[AnalysisResult],
    judge_response: &JudgeResponse,
    weights: &JudgeCriteriaWeights,
) -> Result<ChampionshipResult, StageFailure> {
    if theses.is_empty() {
        return Err(StageFailure::new("championship", "no theses submitted"));
    }

    let mut totals = HashMap::new();
    for thesis in theses {
        let raw = judge_response
            .scores
            .get(&thesis.analyst_id)
            .ok_or_else(|| {
                StageFailure::new(
                    "championship",
                    format!("judge omitted a score for analyst '{}'", thesis.analyst_id),
                )
            })?;
        let scores = CriteriaScores {
            data_quality: raw.data_quality,
            logic: raw.logic,
            risk_awareness: raw.risk_awareness,
            catalyst_clarity: raw.catalyst_clarity,
        };
        totals.insert(thesis.analyst_id.clone(), scores.weighted_total(weights));
    }

    pick_champion(totals)
}

/// Deterministic scorer used when the dedicated judging call fails. Proxies
/// "data quality" and "catalyst clarity" from the thesis's own confidence
/// and the count of non-empty bull/bear case entries, since those are the
/// only signals available without a second LLM round-trip.
pub fn judge_fallback(
    theses: &[AnalysisResult],
    weights: &JudgeCriteriaWeights,
) -> Result<ChampionshipResult, StageFailure> {
    if theses.is_empty() {
        return Err(StageFailure::new("championship", "no theses submitted"));
    }

    let mut totals = HashMap::new();
    for thesis in theses {
        let case_count = (thesis.bull_case.len() + thesis.bear_case.len()) as f64;
        let scores = CriteriaScores {
            data_quality: thesis.confidence.min(100.0),
            logic: thesis.confidence.min(100.0),
            risk_awareness: (100.0 - (thesis.leverage / 1.0).min(100.0)).max(0.0),
            catalyst_clarity: (case_count * 15.0).min(100.0),
        };
        totals.insert(thesis.analyst_id.clone(), scores.weighted_total(weights));
    }

    pick_champion(totals)
}

fn pick_champion(totals: HashMap<String, f64>) -> Result<ChampionshipResult, StageFailure> {
    let champion_id = totals
        .iter()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(id, _)| id.clone())
        .ok_or_else(|| StageFailure::new("championship", "no candidate scores produced"))?;

    Ok(ChampionshipResult {
        champion_id,
        totals,
    })
}

/// Whether a refreshed price has deviated enough from the original snapshot
/// to require replacing it for downstream stages, per the named thresholds
/// for Stage 3 (>0.5%) and Stage 4 (>0.3%).
pub fn price_deviation_exceeds(original: f64, refreshed: f64, threshold_pct: f64) -> bool {
    if original <= 0.0 {
        return false;
    }
    (((refreshed - original) / original).abs() * 100.0) > threshold_pct
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysts::PriceTarget;

    fn thesis(id: &str, confidence: f64, leverage: f64) -> AnalysisResult {
        AnalysisResult {
            analyst_id: id.to_string(),
            recommendation: crate::types::Recommendation::Buy,
            confidence,
            thesis: "thesis".to_string(),
            bull_case: vec!["a".to_string(), "b".to_string()],
            bear_case: vec!["c".to_string()],
            price_target: PriceTarget {
                bull: 60000.0,
                base: 55000.0,
                bear: 48000.0,
            },
            stop_loss: 47000.0,
            leverage,
            position_size: 4.0,
            catalyst: "catalyst".to_string(),
            timeframe: "1w".to_string(),
        }
    }

    #[test]
    fn fallback_picks_highest_confidence_as_champion() {
        let theses = vec![thesis("value", 60.0, 3.0), thesis("growth", 90.0, 3.0)];
        let weights = JudgeCriteriaWeights::default();
        let result = judge_fallback(&theses, &weights).unwrap();
        assert_eq!(result.champion_id, "growth");
    }

    #[test]
    fn judge_requires_a_score_for_every_thesis() {
        let theses = vec![thesis("value", 60.0, 3.0)];
        let response = JudgeResponse {
            scores: HashMap::new(),
        };
        let weights = JudgeCriteriaWeights::default();
        assert!(judge(&theses, &response, &weights).is_err());
    }

    #[test]
    fn price_deviation_threshold_is_strict_greater_than() {
        assert!(!price_deviation_exceeds(100.0, 100.5, 0.5));
        assert!(price_deviation_exceeds(100.0, 100.6, 0.5));
    }
}
