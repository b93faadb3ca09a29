// =============================================================================
// Trade Executor — position sizing, order construction, dispatch
// =============================================================================
//
// Grounded in the teacher's `ExecutionEngine::execute_proposal` two-mode
// (demo/live) dispatch and `ExecutionResult` enum, generalized with the
// position-sizing formula this spec defines and the AI-log/TradeRecord side
// effects on top of a live fill.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::event_bus::{EngineEvent, EventBus};
use crate::exchange::{
    ContractSpec, ExchangeClient, OrderMatchPrice, OrderSide, OrderType, PlaceOrderRequest,
};
use crate::risk_council::RiskCouncilDecision;
use crate::types::{ExecutionMode, Side};

/// Outcome of one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionResult {
    Placed {
        client_oid: String,
        exchange_order_id: Option<String>,
    },
    Simulated {
        client_oid: String,
    },
    Blocked {
        reason: String,
    },
    Error {
        reason: String,
    },
}

/// Everything the executor needs to build and place one order.
pub struct ExecutionRequest<'a> {
    pub cycle_number: u64,
    pub symbol: &'a str,
    pub side: Side,
    pub current_price: f64,
    pub balance: f64,
    pub risk_decision: &'a RiskCouncilDecision,
    pub take_profit_price: f64,
    pub contract_spec: &'a ContractSpec,
}

pub struct ExecutionOutcome {
    pub result: ExecutionResult,
    pub size: f64,
    pub margin_required: f64,
}

/// Execute a risk-approved trade, respecting the configured dry-run/live mode.
#[instrument(skip(client, events, config, req), fields(symbol = req.symbol, cycle = req.cycle_number))]
pub async fn execute(
    client: &ExchangeClient,
    events: &EventBus,
    config: &EngineConfig,
    req: ExecutionRequest<'_>,
) -> ExecutionOutcome {
    if req.balance < config.min_balance_to_trade {
        return ExecutionOutcome {
            result: ExecutionResult::Blocked {
                reason: format!(
                    "balance {} below minimum {}",
                    req.balance, config.min_balance_to_trade
                ),
            },
            size: 0.0,
            margin_required: 0.0,
        };
    }
    if req.current_price <= 0.0 {
        return ExecutionOutcome {
            result: ExecutionResult::Blocked {
                reason: "current price is not positive".to_string(),
            },
            size: 0.0,
            margin_required: 0.0,
        };
    }

    let position_percent = (req.risk_decision.position_size / 10.0) * config.max_position_percent;
    let position_value = req.balance * position_percent / 100.0;
    let size = position_value / req.current_price;
    let margin_required = position_value / req.risk_decision.leverage.max(1.0);

    if !size.is_finite() || size <= 0.0 || !margin_required.is_finite() || margin_required <= 0.0 {
        return ExecutionOutcome {
            result: ExecutionResult::Error {
                reason: format!("non-finite sizing: size={size}, margin={margin_required}"),
            },
            size: 0.0,
            margin_required: 0.0,
        };
    }
    if !req.take_profit_price.is_finite() || !req.risk_decision.stop_loss.is_finite() {
        return ExecutionOutcome {
            result: ExecutionResult::Error {
                reason: "take-profit or stop-loss price is not finite".to_string(),
            },
            size: 0.0,
            margin_required: 0.0,
        };
    }

    let client_oid = format!(
        "cte-{}-{}",
        req.cycle_number,
        Uuid::new_v4().simple()
    );
    let client_oid: String = client_oid.chars().take(40).collect();

    let order_side = match req.side {
        Side::Long => OrderSide::OpenLong,
        Side::Short => OrderSide::OpenShort,
    };

    let built = PlaceOrderRequest::build(
        req.contract_spec,
        order_side,
        OrderType::Fok,
        OrderMatchPrice::Market,
        size,
        req.current_price,
        client_oid.clone(),
        Some(req.take_profit_price),
        Some(req.risk_decision.stop_loss),
    );

    let order = match built {
        Ok(o) => o,
        Err(reason) => {
            warn!(reason, "order construction rejected");
            return ExecutionOutcome {
                result: ExecutionResult::Error { reason },
                size,
                margin_required,
            };
        }
    };

    if config.execution_mode == ExecutionMode::DryRun {
        info!(symbol = req.symbol, size, "dry-run trade recorded, no exchange call made");
        events.publish(EngineEvent::TradeExecuted {
            symbol: req.symbol.to_string(),
            dry_run: true,
        });
        return ExecutionOutcome {
            result: ExecutionResult::Simulated { client_oid },
            size,
            margin_required,
        };
    }

    match client.place_order(&order).await {
        Ok(response) => {
            let exchange_order_id = response["orderId"].as_str().map(|s| s.to_string());
            events.publish(EngineEvent::TradeExecuted {
                symbol: req.symbol.to_string(),
                dry_run: false,
            });
            ExecutionOutcome {
                result: ExecutionResult::Placed {
                    client_oid,
                    exchange_order_id,
                },
                size,
                margin_required,
            }
        }
        Err(e) => {
            warn!(error = %e, "order placement failed");
            ExecutionOutcome {
                result: ExecutionResult::Error {
                    reason: e.to_string(),
                },
                size,
                margin_required,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk_council::RiskCouncilDecision;

    fn decision() -> RiskCouncilDecision {
        RiskCouncilDecision {
            approved: true,
            position_size: 4.0,
            leverage: 5.0,
            stop_loss: 47000.0,
            warnings: vec![],
            veto_reason: None,
        }
    }

    #[tokio::test]
    async fn blocks_when_balance_below_minimum() {
        let client = ExchangeClient::new("key", "secret", "https://example.invalid");
        let events = EventBus::new();
        let config = EngineConfig::default();
        let spec = ContractSpec {
            symbol: "cmt_btcusdt".to_string(),
            ..ContractSpec::default()
        };
        let req = ExecutionRequest {
            cycle_number: 1,
            symbol: "cmt_btcusdt",
            side: Side::Long,
            current_price: 50000.0,
            balance: 0.0,
            risk_decision: &decision(),
            take_profit_price: 55000.0,
            contract_spec: &spec,
        };
        let outcome = execute(&client, &events, &config, req).await;
        matches!(outcome.result, ExecutionResult::Blocked { .. });
    }

    #[tokio::test]
    async fn dry_run_mode_simulates_without_network_call() {
        let client = ExchangeClient::new("key", "secret", "https://example.invalid");
        let events = EventBus::new();
        let mut config = EngineConfig::default();
        config.execution_mode = ExecutionMode::DryRun;
        let spec = ContractSpec {
            symbol: "cmt_btcusdt".to_string(),
            ..ContractSpec::default()
        };
        let req = ExecutionRequest {
            cycle_number: 1,
            symbol: "cmt_btcusdt",
            side: Side::Long,
            current_price: 50000.0,
            balance: 10000.0,
            risk_decision: &decision(),
            take_profit_price: 55000.0,
            contract_spec: &spec,
        };
        let outcome = execute(&client, &events, &config, req).await;
        match outcome.result {
            ExecutionResult::Simulated { .. } => {}
            other => panic!("expected Simulated, got {other:?}"),
        }
        assert!(outcome.size > 0.0);
    }
}
