// =============================================================================
// Exchange — typed wrapper over the perpetual-futures REST API
// =============================================================================

mod client;
mod order;

pub use client::ExchangeClient;
pub use order::{
    round_to_step, round_to_tick, ContractSpec, OrderMatchPrice, OrderSide, OrderType,
    PlaceOrderRequest,
};

use serde::{Deserialize, Serialize};

/// Ticker snapshot for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub last: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub volume_24h: f64,
    pub change_24h: f64,
    pub mark_price: f64,
    pub index_price: f64,
    pub best_bid: f64,
    pub best_ask: f64,
}

/// Normalized open position reported by the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangePosition {
    pub symbol: String,
    pub side: crate::types::Side,
    pub size: f64,
    pub entry_price: f64,
    pub leverage: f64,
    pub unrealized_pnl: f64,
}

/// Wallet asset snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountAsset {
    pub asset: String,
    pub available: f64,
    pub frozen: f64,
}
