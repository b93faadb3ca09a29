// =============================================================================
// Exchange REST API Client — HMAC-SHA256 signed requests
// =============================================================================
//
// SECURITY: the secret key is never logged or serialized. All signed requests
// include the API key as a header and a recvWindow to tolerate minor clock
// drift between this process and the exchange.
// =============================================================================

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument, warn};

use super::{AccountAsset, ExchangePosition, PlaceOrderRequest, Ticker};
use crate::types::Side;

type HmacSha256 = Hmac<Sha256>;

const RECV_WINDOW: u64 = 5000;

/// Exchange REST client with HMAC-SHA256 request signing.
#[derive(Clone)]
pub struct ExchangeClient {
    api_key: String,
    secret: String,
    base_url: String,
    client: reqwest::Client,
}

impl ExchangeClient {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>, base_url: impl Into<String>) -> Self {
        let api_key = api_key.into();
        let secret = secret.into();
        let base_url = base_url.into();

        let mut default_headers = HeaderMap::new();
        if let Ok(val) = HeaderValue::from_str(&api_key) {
            default_headers.insert("ACCESS-KEY", val);
        }

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        debug!(base_url = %base_url, "ExchangeClient initialised");

        Self {
            api_key,
            secret,
            base_url,
            client,
        }
    }

    // -------------------------------------------------------------------------
    // Signing helpers
    // -------------------------------------------------------------------------

    pub fn sign(&self, query: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC accepts any key size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_millis() as u64
    }

    fn signed_query(&self, params: &str) -> String {
        let ts = Self::timestamp_ms();
        let base = if params.is_empty() {
            format!("timestamp={ts}&recvWindow={RECV_WINDOW}")
        } else {
            format!("{params}&timestamp={ts}&recvWindow={RECV_WINDOW}")
        };
        let sig = self.sign(&base);
        format!("{base}&signature={sig}")
    }

    // -------------------------------------------------------------------------
    // Market data (public)
    // -------------------------------------------------------------------------

    #[instrument(skip(self), name = "exchange::get_ticker")]
    pub async fn get_ticker(&self, symbol: &str) -> Result<Ticker> {
        let url = format!("{}/api/v1/market/ticker?symbol={}", self.base_url, symbol);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET ticker request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("failed to parse ticker response")?;

        if !status.is_success() {
            anyhow::bail!("exchange GET ticker returned {}: {}", status, body);
        }

        let last = Self::parse_f64(&body["last"])?;
        let ticker = Ticker {
            symbol: symbol.to_string(),
            last,
            high_24h: Self::parse_f64(&body["high24h"]).unwrap_or(last),
            low_24h: Self::parse_f64(&body["low24h"]).unwrap_or(last),
            volume_24h: Self::parse_f64(&body["volume24h"]).unwrap_or(0.0),
            change_24h: Self::parse_f64(&body["chg24h"]).unwrap_or(0.0),
            mark_price: Self::parse_f64(&body["markPrice"]).unwrap_or(last),
            index_price: Self::parse_f64(&body["indexPrice"]).unwrap_or(last),
            best_bid: Self::parse_f64(&body["bestBid"]).unwrap_or(last),
            best_ask: Self::parse_f64(&body["bestAsk"]).unwrap_or(last),
        };

        debug!(symbol, last = ticker.last, "ticker fetched");
        Ok(ticker)
    }

    /// Funding rate for `symbol`. Returns `None` when the field is absent
    /// from the response — this is distinct from an observed value of zero.
    #[instrument(skip(self), name = "exchange::get_funding_rate")]
    pub async fn get_funding_rate(&self, symbol: &str) -> Result<Option<f64>> {
        let url = format!(
            "{}/api/v1/market/funding-rate?symbol={}",
            self.base_url, symbol
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET funding-rate request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse funding-rate response")?;

        if !status.is_success() {
            anyhow::bail!("exchange GET funding-rate returned {}: {}", status, body);
        }

        match body.get("fundingRate") {
            Some(v) if !v.is_null() => Ok(Some(Self::parse_f64(v)?)),
            _ => {
                warn!(symbol, "funding rate absent from response");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self), name = "exchange::get_contracts")]
    pub async fn get_contracts(&self) -> Result<serde_json::Value> {
        let url = format!("{}/api/v1/market/contracts", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET contracts request failed")?;
        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("failed to parse contracts response")?;
        if !status.is_success() {
            anyhow::bail!("exchange GET contracts returned {}: {}", status, body);
        }
        Ok(body)
    }

    // -------------------------------------------------------------------------
    // Account (signed)
    // -------------------------------------------------------------------------

    #[instrument(skip(self), name = "exchange::get_account_assets")]
    pub async fn get_account_assets(&self) -> Result<Vec<AccountAsset>> {
        let qs = self.signed_query("");
        let url = format!("{}/api/v1/account/assets?{}", self.base_url, qs);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET account assets request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("failed to parse assets response")?;

        if !status.is_success() {
            anyhow::bail!("exchange GET account assets returned {}: {}", status, body);
        }

        let raw = body
            .as_array()
            .cloned()
            .or_else(|| body["data"].as_array().cloned())
            .context("assets response is not an array")?;

        let mut out = Vec::with_capacity(raw.len());
        for entry in raw {
            let asset = entry["currency"].as_str().unwrap_or("USDT").to_string();
            let available = Self::parse_f64(&entry["available"]).unwrap_or(0.0);
            let frozen = Self::parse_f64(&entry["frozen"]).unwrap_or(0.0);
            out.push(AccountAsset {
                asset,
                available,
                frozen,
            });
        }

        debug!(count = out.len(), "account assets retrieved");
        Ok(out)
    }

    #[instrument(skip(self), name = "exchange::get_positions")]
    pub async fn get_positions(&self) -> Result<Vec<ExchangePosition>> {
        let qs = self.signed_query("");
        let url = format!("{}/api/v1/account/positions?{}", self.base_url, qs);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET positions request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("failed to parse positions response")?;

        if !status.is_success() {
            anyhow::bail!("exchange GET positions returned {}: {}", status, body);
        }

        let raw = body
            .as_array()
            .cloned()
            .or_else(|| body["data"].as_array().cloned())
            .unwrap_or_default();

        let mut out = Vec::with_capacity(raw.len());
        for entry in raw {
            let size = Self::parse_f64(&entry["size"]).unwrap_or(0.0);
            if size <= 0.0 {
                continue;
            }

            let open_value = entry.get("openValue").and_then(|v| Self::parse_f64(v).ok());
            let entry_price = match (open_value, size) {
                (Some(v), s) if s > 0.0 => v / s,
                _ => match Self::parse_f64(&entry["avgPrice"]) {
                    Ok(p) if p > 0.0 => p,
                    _ => {
                        warn!(raw = %entry, "dropping position with unrecoverable entry price");
                        continue;
                    }
                },
            };

            let side = match entry["side"].as_str() {
                Some("long") | Some("1") => Side::Long,
                Some("short") | Some("2") => Side::Short,
                _ => {
                    let holdside = entry["holdSide"].as_i64().unwrap_or(1);
                    if holdside == 2 {
                        Side::Short
                    } else {
                        Side::Long
                    }
                }
            };

            out.push(ExchangePosition {
                symbol: entry["symbol"].as_str().unwrap_or_default().to_string(),
                side,
                size,
                entry_price,
                leverage: Self::parse_f64(&entry["leverage"]).unwrap_or(1.0),
                unrealized_pnl: Self::parse_f64(&entry["unrealizedPnl"]).unwrap_or(0.0),
            });
        }

        debug!(count = out.len(), "positions retrieved");
        Ok(out)
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    #[instrument(skip(self, order), name = "exchange::place_order")]
    pub async fn place_order(&self, order: &PlaceOrderRequest) -> Result<serde_json::Value> {
        let params = serde_json::to_string(order).context("failed to serialise order")?;
        let qs = self.signed_query(&format!("body={params}"));
        let url = format!("{}/api/v1/order/placeOrder?{}", self.base_url, qs);

        debug!(symbol = %order.symbol, client_oid = %order.client_oid, "placing order");

        let resp = self
            .client
            .post(&url)
            .json(order)
            .send()
            .await
            .context("POST placeOrder request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("failed to parse order response")?;

        if !status.is_success() {
            anyhow::bail!("exchange POST placeOrder returned {}: {}", status, body);
        }

        debug!(symbol = %order.symbol, "order placed successfully");
        Ok(body)
    }

    #[instrument(skip(self), name = "exchange::close_all_positions")]
    pub async fn close_all_positions(&self, symbol: &str) -> Result<serde_json::Value> {
        let params = format!("symbol={symbol}");
        let qs = self.signed_query(&params);
        let url = format!("{}/api/v1/order/closeAllPositions?{}", self.base_url, qs);

        warn!(symbol, "closing all positions");

        let resp = self
            .client
            .post(&url)
            .send()
            .await
            .context("POST closeAllPositions request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse closeAllPositions response")?;

        if !status.is_success() {
            anyhow::bail!("exchange POST closeAllPositions returned {}: {}", status, body);
        }

        Ok(body)
    }

    /// Upload an AI decision log to the exchange's audit endpoint. This is
    /// best-effort: callers must not abort a trade on its failure.
    #[instrument(skip(self, payload), name = "exchange::upload_ai_log")]
    pub async fn upload_ai_log(&self, payload: &serde_json::Value) -> Result<String> {
        let qs = self.signed_query("");
        let url = format!("{}/api/v1/ai/uploadLog?{}", self.base_url, qs);

        let resp = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .context("POST uploadAILog request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse uploadAILog response")?;

        if !status.is_success() {
            anyhow::bail!("exchange POST uploadAILog returned {}: {}", status, body);
        }

        Ok(body["logId"].as_str().unwrap_or_default().to_string())
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    fn parse_f64(val: &serde_json::Value) -> Result<f64> {
        if let Some(s) = val.as_str() {
            s.parse::<f64>()
                .with_context(|| format!("failed to parse '{s}' as f64"))
        } else if let Some(n) = val.as_f64() {
            Ok(n)
        } else {
            anyhow::bail!("expected string or number, got: {val}")
        }
    }
}

impl std::fmt::Debug for ExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let _ = &self.api_key;
        f.debug_struct("ExchangeClient")
            .field("api_key", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}
