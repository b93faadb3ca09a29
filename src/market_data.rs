// =============================================================================
// Market Data Assembler — concurrent per-symbol snapshot collection
// =============================================================================

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{instrument, warn};

use crate::exchange::ExchangeClient;

/// A single symbol's market snapshot for one trading cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedMarketData {
    pub symbol: String,
    pub last_price: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub volume_24h: f64,
    pub change_24h: f64,
    pub mark_price: f64,
    pub index_price: f64,
    pub best_bid: f64,
    pub best_ask: f64,
    /// `None` when the exchange omitted the field — distinct from a
    /// reported rate of exactly zero.
    pub funding_rate: Option<f64>,
}

/// Fetch ticker and funding-rate data for every symbol in `universe`
/// concurrently. A single symbol's failure is logged and that symbol is
/// omitted from the result rather than failing the whole cycle.
#[instrument(skip(client, universe))]
pub async fn assemble(
    client: &ExchangeClient,
    universe: &[String],
) -> HashMap<String, ExtendedMarketData> {
    let fetches = universe.iter().map(|symbol| async move {
        let ticker = match client.get_ticker(symbol).await {
            Ok(t) => t,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "ticker fetch failed, omitting symbol");
                return None;
            }
        };

        let funding_rate = match client.get_funding_rate(symbol).await {
            Ok(rate) => rate,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "funding rate fetch failed, treating as undefined");
                None
            }
        };

        Some((
            symbol.clone(),
            ExtendedMarketData {
                symbol: symbol.clone(),
                last_price: ticker.last,
                high_24h: ticker.high_24h,
                low_24h: ticker.low_24h,
                volume_24h: ticker.volume_24h,
                change_24h: ticker.change_24h,
                mark_price: ticker.mark_price,
                index_price: ticker.index_price,
                best_bid: ticker.best_bid,
                best_ask: ticker.best_ask,
                funding_rate,
            },
        ))
    });

    let results = futures::future::join_all(fetches).await;

    let mut out = HashMap::with_capacity(universe.len());
    for entry in results.into_iter().flatten() {
        out.insert(entry.0, entry.1);
    }

    if out.is_empty() && !universe.is_empty() {
        warn!("market data assembly returned no symbols; cycle will be skipped upstream");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_market_data_distinguishes_absent_from_zero_funding() {
        let zero = ExtendedMarketData {
            symbol: "cmt_btcusdt".into(),
            last_price: 50000.0,
            high_24h: 51000.0,
            low_24h: 49000.0,
            volume_24h: 1000.0,
            change_24h: 0.01,
            mark_price: 50000.0,
            index_price: 50000.0,
            best_bid: 49990.0,
            best_ask: 50010.0,
            funding_rate: Some(0.0),
        };
        let absent = ExtendedMarketData {
            funding_rate: None,
            ..zero.clone()
        };
        assert_ne!(zero.funding_rate, absent.funding_rate);
    }
}
