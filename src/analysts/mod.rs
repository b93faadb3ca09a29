// =============================================================================
// Analyst roster — eight process-global personas driving the pipeline
// =============================================================================

mod oracle;

pub use oracle::{AnalystOracle, OpenAiOracle};

use serde::{Deserialize, Serialize};

use crate::types::{Methodology, PipelineRole, Recommendation};

/// Static configuration for one analyst. Process-global — never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystProfile {
    pub id: &'static str,
    pub display_name: &'static str,
    pub methodology: Methodology,
    pub role: PipelineRole,
}

/// The eight-analyst roster, fixed at process start.
pub fn roster() -> Vec<AnalystProfile> {
    use Methodology::*;
    use PipelineRole::*;

    vec![
        AnalystProfile {
            id: "value",
            display_name: "The Value Investor",
            methodology: Value,
            role: CoinSelector,
        },
        AnalystProfile {
            id: "growth",
            display_name: "The Growth Hunter",
            methodology: Growth,
            role: CoinSelector,
        },
        AnalystProfile {
            id: "technical",
            display_name: "The Chartist",
            methodology: Technical,
            role: CoinSelector,
        },
        AnalystProfile {
            id: "macro",
            display_name: "The Macro Strategist",
            methodology: Macro,
            role: CoinSelector,
        },
        AnalystProfile {
            id: "sentiment",
            display_name: "The Sentiment Reader",
            methodology: Sentiment,
            role: Specialist,
        },
        AnalystProfile {
            id: "quant",
            display_name: "The Quant",
            methodology: Quant,
            role: Specialist,
        },
        AnalystProfile {
            id: "contrarian",
            display_name: "The Contrarian",
            methodology: Contrarian,
            role: Specialist,
        },
        AnalystProfile {
            id: "risk",
            display_name: "The Risk Officer",
            methodology: Risk,
            role: RiskCouncil,
        },
    ]
}

/// The four analysts empowered to cast picks in Stage 2 — Coin Selection.
pub fn coin_selectors() -> Vec<AnalystProfile> {
    roster()
        .into_iter()
        .filter(|p| matches!(p.role, PipelineRole::CoinSelector))
        .collect()
}

/// The risk-role analyst used in Stage 4 — Risk Council.
pub fn risk_analyst() -> AnalystProfile {
    roster()
        .into_iter()
        .find(|p| matches!(p.role, PipelineRole::RiskCouncil))
        .expect("roster always contains exactly one risk_council analyst")
}

/// Output of one analyst invocation, validated before use downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub analyst_id: String,
    pub recommendation: Recommendation,
    pub confidence: f64,
    pub thesis: String,
    #[serde(default)]
    pub bull_case: Vec<String>,
    #[serde(default)]
    pub bear_case: Vec<String>,
    pub price_target: PriceTarget,
    pub stop_loss: f64,
    pub leverage: f64,
    pub position_size: f64,
    pub catalyst: String,
    pub timeframe: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTarget {
    pub bull: f64,
    pub base: f64,
    pub bear: f64,
}

impl AnalysisResult {
    /// Validate the numeric bounds named in the data model before the
    /// result is trusted by any downstream stage.
    pub fn validate(&self, max_leverage: f64) -> Result<(), String> {
        if !(0.0..=100.0).contains(&self.confidence) {
            return Err(format!("confidence {} out of [0,100]", self.confidence));
        }
        if !(1.0..=max_leverage).contains(&self.leverage) {
            return Err(format!(
                "leverage {} out of [1,{}]",
                self.leverage, max_leverage
            ));
        }
        if !(1.0..=10.0).contains(&self.position_size) {
            return Err(format!("position_size {} out of [1,10]", self.position_size));
        }
        for (name, v) in [
            ("price_target.bull", self.price_target.bull),
            ("price_target.base", self.price_target.base),
            ("price_target.bear", self.price_target.bear),
            ("stop_loss", self.stop_loss),
        ] {
            if !v.is_finite() {
                return Err(format!("{name} is not finite"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_has_eight_analysts_one_per_role_family() {
        let r = roster();
        assert_eq!(r.len(), 8);
        assert_eq!(coin_selectors().len(), 4);
    }

    #[test]
    fn risk_analyst_is_unique() {
        let r = risk_analyst();
        assert_eq!(r.id, "risk");
    }

    fn sample_result() -> AnalysisResult {
        AnalysisResult {
            analyst_id: "value".into(),
            recommendation: Recommendation::Buy,
            confidence: 72.0,
            thesis: "strong fundamentals".into(),
            bull_case: vec!["adoption".into()],
            bear_case: vec![],
            price_target: PriceTarget {
                bull: 60000.0,
                base: 55000.0,
                bear: 48000.0,
            },
            stop_loss: 47000.0,
            leverage: 5.0,
            position_size: 4.0,
            catalyst: "ETF inflows".into(),
            timeframe: "1w".into(),
        }
    }

    #[test]
    fn validate_accepts_in_bounds_result() {
        assert!(sample_result().validate(20.0).is_ok());
    }

    #[test]
    fn validate_rejects_leverage_above_max() {
        let mut r = sample_result();
        r.leverage = 999.0;
        assert!(r.validate(20.0).is_err());
    }

    #[test]
    fn validate_rejects_confidence_out_of_range() {
        let mut r = sample_result();
        r.confidence = 150.0;
        assert!(r.validate(20.0).is_err());
    }
}
