// =============================================================================
// Deliberation Pipeline — four sequential stages per trading cycle
// =============================================================================

pub mod championship;
pub mod coin_selection;

use serde::{Deserialize, Serialize};

use crate::types::Side;

/// A single analyst's contribution to a debate, kept for logging and
/// carried forward to the next stage as context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateTurn {
    pub analyst_name: String,
    pub argument: String,
    pub strength: f64,
    #[serde(default)]
    pub data_points_referenced: Vec<String>,
}

/// Outcome of one stage's internal competition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateResult {
    pub winner: String,
    pub scores: std::collections::HashMap<String, f64>,
    pub turns: Vec<DebateTurn>,
    pub winning_arguments: Vec<String>,
}

/// A stage failed its structural validation or its LLM call errored. The
/// cycle records this, publishes `cycleComplete` with the annotation, and
/// moves on per the stage-level retry policy.
#[derive(Debug, thiserror::Error)]
#[error("stage '{stage}' failed: {reason}")]
pub struct StageFailure {
    pub stage: &'static str,
    pub reason: String,
}

impl StageFailure {
    pub fn new(stage: &'static str, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

/// The winning (symbol, direction) carried from Stage 2 into Stage 3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinningPick {
    pub symbol: String,
    pub side: Side,
}
