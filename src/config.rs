// =============================================================================
// Engine Configuration — hot-reloadable settings with atomic save
// =============================================================================
//
// Every tunable named in the deliberation/risk/execution design lives here.
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default = "...")]` so that adding a new
// field never breaks loading an older config file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{ExecutionMode, TradingMode};

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

fn default_symbols() -> Vec<String> {
    vec![
        "cmt_btcusdt".to_string(),
        "cmt_ethusdt".to_string(),
        "cmt_solusdt".to_string(),
        "cmt_bnbusdt".to_string(),
        "cmt_xrpusdt".to_string(),
        "cmt_dogeusdt".to_string(),
        "cmt_adausdt".to_string(),
        "cmt_linkusdt".to_string(),
    ]
}

fn default_cycle_interval_ms() -> u64 {
    15 * 60 * 1000
}

fn default_min_trade_interval_ms() -> u64 {
    5 * 60 * 1000
}

fn default_paused_poll_interval_secs() -> u64 {
    60
}

fn default_max_position_percent() -> f64 {
    20.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_min_balance_to_trade() -> f64 {
    10.0
}

fn default_min_confidence_to_trade() -> f64 {
    55.0
}

fn default_max_leverage() -> u32 {
    20
}

fn default_default_leverage() -> u32 {
    3
}

fn default_max_stop_loss_distance_pct() -> f64 {
    10.0
}

fn default_take_profit_default_pct() -> f64 {
    3.0
}

fn default_funding_warn_threshold() -> f64 {
    0.01
}

fn default_max_same_direction_positions() -> u32 {
    4
}

fn default_max_concurrent_positions() -> u32 {
    6
}

fn default_max_weekly_drawdown_pct() -> f64 {
    15.0
}

fn default_max_funding_against_pct() -> f64 {
    0.05
}

fn default_net_exposure_long_limit() -> f64 {
    0.8
}

fn default_net_exposure_short_limit() -> f64 {
    0.8
}

fn default_assumed_average_leverage() -> f64 {
    3.0
}

fn default_judge_criteria_weights() -> JudgeCriteriaWeights {
    JudgeCriteriaWeights::default()
}

/// Relative weights (summing to 100) the championship judge applies to each
/// criterion when scoring competing theses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeCriteriaWeights {
    #[serde(default = "default_weight_25")]
    pub data_quality: f64,
    #[serde(default = "default_weight_30")]
    pub logic: f64,
    #[serde(default = "default_weight_25")]
    pub risk_awareness: f64,
    #[serde(default = "default_weight_20")]
    pub catalyst_clarity: f64,
}

fn default_weight_25() -> f64 {
    25.0
}
fn default_weight_30() -> f64 {
    30.0
}
fn default_weight_20() -> f64 {
    20.0
}

impl Default for JudgeCriteriaWeights {
    fn default() -> Self {
        Self {
            data_quality: 25.0,
            logic: 30.0,
            risk_awareness: 25.0,
            catalyst_clarity: 20.0,
        }
    }
}

/// Top-level runtime configuration for the collaborative trading engine.
///
/// Every field has a serde default so that older JSON files missing new
/// fields still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    // --- Operational modes ---------------------------------------------
    #[serde(default)]
    pub trading_mode: TradingMode,

    #[serde(default)]
    pub execution_mode: ExecutionMode,

    // --- Universe & cadence ----------------------------------------------
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    #[serde(default = "default_cycle_interval_ms")]
    pub cycle_interval_ms: u64,

    #[serde(default = "default_min_trade_interval_ms")]
    pub min_trade_interval_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Trading-hours window, UTC, both in `[0, 24)`. Equal values mean the
    /// engine trades around the clock. See `scheduler::should_trade_now`.
    #[serde(default)]
    pub start_hour: u32,
    #[serde(default)]
    pub end_hour: u32,

    /// Idle sleep applied when `should_trade_now` says no, so the main loop
    /// still wakes up promptly once the window opens.
    #[serde(default = "default_paused_poll_interval_secs")]
    pub paused_poll_interval_secs: u64,

    // --- Position sizing & leverage ---------------------------------------
    #[serde(default = "default_max_position_percent")]
    pub max_position_percent: f64,

    #[serde(default = "default_min_balance_to_trade")]
    pub min_balance_to_trade: f64,

    #[serde(default = "default_min_confidence_to_trade")]
    pub min_confidence_to_trade: f64,

    #[serde(default = "default_max_leverage")]
    pub max_leverage: u32,

    #[serde(default = "default_default_leverage")]
    pub default_leverage: u32,

    #[serde(default = "default_assumed_average_leverage")]
    pub assumed_average_leverage: f64,

    // --- Stop-loss / take-profit -------------------------------------------
    #[serde(default = "default_max_stop_loss_distance_pct")]
    pub max_stop_loss_distance_pct: f64,

    #[serde(default = "default_take_profit_default_pct")]
    pub take_profit_default_pct: f64,

    // --- Risk council checklist --------------------------------------------
    #[serde(default = "default_max_same_direction_positions")]
    pub max_same_direction_positions: u32,

    #[serde(default = "default_max_concurrent_positions")]
    pub max_concurrent_positions: u32,

    #[serde(default = "default_max_weekly_drawdown_pct")]
    pub max_weekly_drawdown_pct: f64,

    #[serde(default = "default_funding_warn_threshold")]
    pub funding_warn_threshold: f64,

    #[serde(default = "default_max_funding_against_pct")]
    pub max_funding_against_pct: f64,

    /// Margin in use by open long positions, as a fraction of equity, may not
    /// exceed this before a new long trade's margin is clamped to fit.
    #[serde(default = "default_net_exposure_long_limit")]
    pub net_exposure_long_limit: f64,

    /// Same as `net_exposure_long_limit`, for the short side.
    #[serde(default = "default_net_exposure_short_limit")]
    pub net_exposure_short_limit: f64,

    // --- Circuit breaker thresholds ------------------------------------------
    #[serde(default = "default_btc_drop_yellow_pct")]
    pub btc_drop_yellow_pct: f64,
    #[serde(default = "default_btc_drop_orange_pct")]
    pub btc_drop_orange_pct: f64,
    #[serde(default = "default_btc_drop_red_pct")]
    pub btc_drop_red_pct: f64,
    #[serde(default = "default_portfolio_drawdown_yellow_pct")]
    pub portfolio_drawdown_yellow_pct: f64,
    #[serde(default = "default_portfolio_drawdown_orange_pct")]
    pub portfolio_drawdown_orange_pct: f64,
    #[serde(default = "default_portfolio_drawdown_red_pct")]
    pub portfolio_drawdown_red_pct: f64,
    #[serde(default = "default_funding_extreme_pct")]
    pub funding_extreme_pct: f64,

    // --- Deliberation ----------------------------------------------------
    #[serde(default = "default_judge_criteria_weights")]
    pub judge_criteria_weights: JudgeCriteriaWeights,

    // --- SSE ---------------------------------------------------------------
    #[serde(default = "default_sse_token_ttl_secs")]
    pub sse_token_ttl_secs: u64,

    #[serde(default = "default_false")]
    pub allow_legacy_sse_token_param: bool,

    // --- Feature flags -----------------------------------------------------
    #[serde(default = "default_true")]
    pub enable_ai_log_upload: bool,

    #[serde(default = "default_true")]
    pub enable_trade_persistence: bool,
}

fn default_btc_drop_yellow_pct() -> f64 {
    4.0
}
fn default_btc_drop_orange_pct() -> f64 {
    7.0
}
fn default_btc_drop_red_pct() -> f64 {
    12.0
}
fn default_portfolio_drawdown_yellow_pct() -> f64 {
    5.0
}
fn default_portfolio_drawdown_orange_pct() -> f64 {
    10.0
}
fn default_portfolio_drawdown_red_pct() -> f64 {
    18.0
}
fn default_funding_extreme_pct() -> f64 {
    0.3
}
fn default_sse_token_ttl_secs() -> u64 {
    60
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trading_mode: TradingMode::Paused,
            execution_mode: ExecutionMode::DryRun,
            symbols: default_symbols(),
            cycle_interval_ms: default_cycle_interval_ms(),
            min_trade_interval_ms: default_min_trade_interval_ms(),
            max_retries: default_max_retries(),
            start_hour: 0,
            end_hour: 0,
            paused_poll_interval_secs: default_paused_poll_interval_secs(),
            max_position_percent: default_max_position_percent(),
            min_balance_to_trade: default_min_balance_to_trade(),
            min_confidence_to_trade: default_min_confidence_to_trade(),
            max_leverage: default_max_leverage(),
            default_leverage: default_default_leverage(),
            assumed_average_leverage: default_assumed_average_leverage(),
            max_stop_loss_distance_pct: default_max_stop_loss_distance_pct(),
            take_profit_default_pct: default_take_profit_default_pct(),
            max_same_direction_positions: default_max_same_direction_positions(),
            max_concurrent_positions: default_max_concurrent_positions(),
            max_weekly_drawdown_pct: default_max_weekly_drawdown_pct(),
            funding_warn_threshold: default_funding_warn_threshold(),
            max_funding_against_pct: default_max_funding_against_pct(),
            net_exposure_long_limit: default_net_exposure_long_limit(),
            net_exposure_short_limit: default_net_exposure_short_limit(),
            btc_drop_yellow_pct: default_btc_drop_yellow_pct(),
            btc_drop_orange_pct: default_btc_drop_orange_pct(),
            btc_drop_red_pct: default_btc_drop_red_pct(),
            portfolio_drawdown_yellow_pct: default_portfolio_drawdown_yellow_pct(),
            portfolio_drawdown_orange_pct: default_portfolio_drawdown_orange_pct(),
            portfolio_drawdown_red_pct: default_portfolio_drawdown_red_pct(),
            funding_extreme_pct: default_funding_extreme_pct(),
            judge_criteria_weights: JudgeCriteriaWeights::default(),
            sse_token_ttl_secs: default_sse_token_ttl_secs(),
            allow_legacy_sse_token_param: false,
            enable_ai_log_upload: true,
            enable_trade_persistence: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        info!(path = %path.display(), symbols = ?config.symbols, "engine config loaded");
        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.trading_mode, TradingMode::Paused);
        assert_eq!(cfg.execution_mode, ExecutionMode::DryRun);
        assert_eq!(cfg.symbols.len(), 8);
        assert!((cfg.max_stop_loss_distance_pct - 10.0).abs() < f64::EPSILON);
        assert_eq!(cfg.max_retries, 3);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.symbols.len(), 8);
        assert_eq!(cfg.max_concurrent_positions, 6);
        assert!(!cfg.allow_legacy_sse_token_param);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "trading_mode": "Live", "symbols": ["cmt_ethusdt"] }"#;
        let cfg: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Live);
        assert_eq!(cfg.symbols, vec!["cmt_ethusdt"]);
        assert_eq!(cfg.max_leverage, 20);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = EngineConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.symbols, cfg2.symbols);
        assert_eq!(cfg.max_leverage, cfg2.max_leverage);
    }
}
