// =============================================================================
// Collaborative Trader — Main Entry Point
// =============================================================================
//
// The engine boots with trading paused and dry-run execution. Operators
// must explicitly call `/autonomous/start` to begin the deliberation loop,
// and must flip `execution_mode` to `Live` in config before any real order
// reaches the exchange.
// =============================================================================

mod analysts;
mod api;
mod auth;
mod circuit_breaker;
mod config;
mod engine;
mod error;
mod event_bus;
mod exchange;
mod executor;
mod market_data;
mod persistence;
mod pipeline;
mod portfolio;
mod risk_council;
mod scheduler;
mod sse;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::analysts::OpenAiOracle;
use crate::config::EngineConfig;
use crate::engine::EngineController;
use crate::exchange::ExchangeClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║       Collaborative Trader — Starting Up                ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config_path = std::env::var("ENGINE_CONFIG_PATH").unwrap_or_else(|_| "engine_config.json".to_string());
    let mut config = EngineConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load engine config, using defaults");
        EngineConfig::default()
    });

    // SAFETY: force paused + dry-run on every boot regardless of the saved file.
    config.trading_mode = types::TradingMode::Paused;
    config.execution_mode = types::ExecutionMode::DryRun;

    info!(
        symbols = ?config.symbols,
        trading_mode = %config.trading_mode,
        execution_mode = %config.execution_mode,
        "engine configured (SAFE mode: Paused + DryRun)"
    );

    let api_key = std::env::var("EXCHANGE_API_KEY").unwrap_or_default();
    let api_secret = std::env::var("EXCHANGE_API_SECRET").unwrap_or_default();
    let base_url = std::env::var("EXCHANGE_BASE_URL")
        .unwrap_or_else(|_| "https://api.example-exchange.com".to_string());
    let exchange = ExchangeClient::new(api_key, api_secret, base_url);

    let openai_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
    let openai_base = std::env::var("OPENAI_BASE_URL").ok();
    let openai_model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
    let oracle: Arc<dyn crate::analysts::AnalystOracle> =
        Arc::new(OpenAiOracle::new(openai_key, openai_base, openai_model));

    let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
        warn!("JWT_SECRET not set, using an ephemeral development secret");
        "development-only-insecure-secret".to_string()
    });

    let db_path = std::env::var("DATABASE_PATH").unwrap_or_else(|_| "collab_trader.db".to_string());
    let db = persistence::connect(&db_path).await?;

    let engine = EngineController::new(config, exchange, oracle, &jwt_secret, db);
    EngineController::install(Arc::clone(&engine)).await;

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".to_string());
    let app = api::router(Arc::clone(&engine));
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "API server listening");

    let server_engine = Arc::clone(&engine);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
        let _ = server_engine;
    });

    let sweep_engine = Arc::clone(&engine);
    let sweep_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            interval.tick().await;
            sweep_engine.sse_tokens().sweep();
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received, stopping gracefully");

    sweep_handle.abort();
    engine.cleanup().await;
    engine.sse_tokens().stop_token_cleanup();

    info!("collaborative trader shut down complete");
    Ok(())
}
