// =============================================================================
// Order construction contract — validated before it ever reaches the wire
// =============================================================================

use serde::{Deserialize, Serialize};

/// Direction + effect, mirroring the exchange's four-value `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderSide {
    OpenLong = 1,
    OpenShort = 2,
    CloseLong = 3,
    CloseShort = 4,
}

/// Execution style for the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderType {
    Normal = 0,
    PostOnly = 1,
    Fok = 2,
    Ioc = 3,
}

/// Whether the order executes at a limit price or at the market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderMatchPrice {
    Limit = 0,
    Market = 1,
}

/// Contract metadata needed to validate and round an order before submission.
#[derive(Debug, Clone)]
pub struct ContractSpec {
    pub symbol: String,
    pub step_size: f64,
    pub tick_size: f64,
    pub max_leverage: u32,
}

impl Default for ContractSpec {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            step_size: 0.0001,
            tick_size: 0.01,
            max_leverage: 500,
        }
    }
}

/// Floor-round `value` to the nearest multiple of `step`, never rounding up
/// (a position or margin requirement must never exceed what was computed).
pub fn round_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    (value / step).floor() * step
}

/// Round `value` to the nearest tick, preserving sign.
pub fn round_to_tick(value: f64, tick: f64) -> f64 {
    if tick <= 0.0 {
        return value;
    }
    (value / tick).round() * tick
}

/// A fully validated order ready for submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub match_price: OrderMatchPrice,
    pub size: String,
    pub price: String,
    pub client_oid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset_take_profit_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset_stop_loss_price: Option<String>,
}

impl PlaceOrderRequest {
    /// Build and validate an order against the given contract spec.
    ///
    /// Returns `Err` with a human-readable reason the moment any field is
    /// out of bounds — callers must not submit a partially-valid order.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        spec: &ContractSpec,
        side: OrderSide,
        order_type: OrderType,
        match_price: OrderMatchPrice,
        raw_size: f64,
        raw_price: f64,
        client_oid: String,
        take_profit: Option<f64>,
        stop_loss: Option<f64>,
    ) -> Result<Self, String> {
        if !spec.symbol.starts_with("cmt_") || !spec.symbol.ends_with("usdt") {
            return Err(format!("symbol '{}' does not match cmt_*usdt", spec.symbol));
        }

        let size = round_to_step(raw_size, spec.step_size);
        if size <= 0.0 {
            return Err(format!(
                "order size rounds to zero or below (raw={raw_size}, step={})",
                spec.step_size
            ));
        }

        let price = round_to_tick(raw_price, spec.tick_size);
        if price <= 0.0 {
            return Err(format!("order price must be positive, got {raw_price}"));
        }

        if client_oid.len() > 40 {
            return Err(format!(
                "client_oid length {} exceeds 40 characters",
                client_oid.len()
            ));
        }

        Ok(Self {
            symbol: spec.symbol.clone(),
            side,
            order_type,
            match_price,
            size: format!("{size}"),
            price: format!("{price}"),
            client_oid,
            preset_take_profit_price: take_profit.map(|v| format!("{v}")),
            preset_stop_loss_price: stop_loss.map(|v| format!("{v}")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_to_step_floors() {
        assert!((round_to_step(1.23456, 0.01) - 1.23).abs() < 1e-9);
        assert!((round_to_step(1.239, 0.01) - 1.23).abs() < 1e-9);
    }

    #[test]
    fn round_to_tick_rounds_nearest() {
        assert!((round_to_tick(100.016, 0.01) - 100.02).abs() < 1e-9);
    }

    #[test]
    fn build_rejects_invalid_symbol() {
        let mut spec = ContractSpec::default();
        spec.symbol = "BTCUSDT".to_string();
        let err = PlaceOrderRequest::build(
            &spec,
            OrderSide::OpenLong,
            OrderType::Fok,
            OrderMatchPrice::Market,
            1.0,
            100.0,
            "oid".to_string(),
            None,
            None,
        )
        .unwrap_err();
        assert!(err.contains("cmt_*usdt"));
    }

    #[test]
    fn build_rejects_oversize_client_oid() {
        let mut spec = ContractSpec::default();
        spec.symbol = "cmt_btcusdt".to_string();
        let oid = "x".repeat(41);
        let err = PlaceOrderRequest::build(
            &spec,
            OrderSide::OpenLong,
            OrderType::Fok,
            OrderMatchPrice::Market,
            1.0,
            100.0,
            oid,
            None,
            None,
        )
        .unwrap_err();
        assert!(err.contains("40 characters"));
    }

    #[test]
    fn build_rejects_size_that_rounds_to_zero() {
        let mut spec = ContractSpec::default();
        spec.symbol = "cmt_btcusdt".to_string();
        let req = PlaceOrderRequest::build(
            &spec,
            OrderSide::OpenLong,
            OrderType::Fok,
            OrderMatchPrice::Market,
            0.00009,
            50000.0,
            "oid-1".to_string(),
            Some(51000.0),
            Some(49000.0),
        );
        // 0.00009 floors to 0 at step 0.0001 -> rejected.
        assert!(req.is_err());
    }

    #[test]
    fn build_accepts_valid_order() {
        let mut spec = ContractSpec::default();
        spec.symbol = "cmt_btcusdt".to_string();
        let req = PlaceOrderRequest::build(
            &spec,
            OrderSide::OpenLong,
            OrderType::Fok,
            OrderMatchPrice::Market,
            1.5,
            50000.0,
            "oid-1".to_string(),
            Some(51000.0),
            Some(49000.0),
        )
        .unwrap();
        assert_eq!(req.symbol, "cmt_btcusdt");
        assert_eq!(req.size, "1.5");
    }
}
