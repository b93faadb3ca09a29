// =============================================================================
// Engine Controller — owns the single main-loop task and all mutable engine state
// =============================================================================
//
// Grounded in the teacher's `main.rs` subsystem-spawn shape (several
// reconnect-on-error loops, each `tokio::spawn`ed), generalized into one
// controller owning a single `JoinHandle` for the deliberation loop.
// `isRunning`/`isStarting` map onto `AtomicBool`s the way the teacher uses
// `AtomicU64` for `state_version`; the process-global singleton is a
// `parking_lot::RwLock<Option<_>>` rather than hand-rolled double-checked
// locking, so it can be rebuilt by `reset()` after a stop/start cycle.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::analysts::{self, AnalystOracle, AnalystProfile};
use crate::auth::JwtCodec;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::EngineConfig;
use crate::event_bus::{EngineEvent, EventBus};
use crate::exchange::{
    ContractSpec, ExchangeClient, OrderMatchPrice, OrderSide, OrderType, PlaceOrderRequest,
};
use crate::market_data;
use crate::persistence::analyses::AnalysisRepository;
use crate::persistence::portfolios::{PortfolioRecord, PortfolioRepository};
use crate::persistence::trades::{AiLogEntry, AiLogRepository, TradeRecord, TradeRepository};
use crate::pipeline::championship::{self, ChampionshipResult, JudgeResponse};
use crate::pipeline::coin_selection::{self, CoinSelectionResponse, Stage2Outcome};
use crate::pipeline::StageFailure;
use crate::portfolio::{self, AnalystState, SharedPortfolio};
use crate::risk_council;
use crate::scheduler;
use crate::sse::SseTokenRegistry;
use crate::types::{CircuitLevel, ExecutionMode, Side};

/// One iteration of the deliberation loop.
#[derive(Debug, Clone, Serialize, Default)]
pub struct TradingCycle {
    pub cycle_number: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub symbols_analyzed: Vec<String>,
    pub trades_executed: u32,
    pub debates_run: u32,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub is_running: bool,
    pub cycle_count: u64,
    pub analysts: Vec<AnalystStatus>,
    pub current_cycle: Option<TradingCycle>,
    pub shared_portfolio: SharedPortfolio,
    pub next_cycle_in_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalystStatus {
    pub id: String,
    pub display_name: String,
}

/// The process-global singleton handle. A plain `RwLock<Option<_>>` rather
/// than `OnceCell` so `reset()` can swap in a fresh controller after
/// `/autonomous/stop` — `OnceCell::set` cannot be called twice.
static ENGINE: RwLock<Option<Arc<EngineController>>> = RwLock::new(None);

pub struct EngineController {
    config: RwLock<EngineConfig>,
    exchange: ExchangeClient,
    oracle: Arc<dyn AnalystOracle>,
    events: EventBus,
    sse_tokens: SseTokenRegistry,
    jwt: JwtCodec,

    db: SqlitePool,
    portfolio_repo: PortfolioRepository,
    trade_repo: TradeRepository,
    ai_log_repo: AiLogRepository,
    analysis_repo: AnalysisRepository,

    circuit_breaker: CircuitBreaker,
    contract_specs: RwLock<HashMap<String, ContractSpec>>,

    analyst_states: RwLock<Vec<AnalystState>>,
    shared_portfolio: RwLock<Arc<parking_lot::RwLock<SharedPortfolio>>>,

    is_running: AtomicBool,
    is_starting: AtomicBool,
    cycle_count: AtomicU64,
    consecutive_failures: AtomicU32,
    current_user_id: RwLock<Option<String>>,
    current_cycle: RwLock<Option<TradingCycle>>,
    main_loop_handle: RwLock<Option<JoinHandle<()>>>,
}

impl EngineController {
    pub fn new(
        config: EngineConfig,
        exchange: ExchangeClient,
        oracle: Arc<dyn AnalystOracle>,
        jwt_secret: &str,
        db: SqlitePool,
    ) -> Arc<Self> {
        let circuit_breaker = CircuitBreaker::new(
            config.min_balance_to_trade.max(1.0),
            config.btc_drop_yellow_pct / 100.0,
            config.btc_drop_orange_pct / 100.0,
            config.btc_drop_red_pct / 100.0,
            config.portfolio_drawdown_yellow_pct / 100.0,
            config.portfolio_drawdown_orange_pct / 100.0,
            config.portfolio_drawdown_red_pct / 100.0,
            config.funding_extreme_pct / 100.0,
        );

        let contract_specs = config
            .symbols
            .iter()
            .map(|s| {
                (
                    s.clone(),
                    ContractSpec {
                        symbol: s.clone(),
                        ..ContractSpec::default()
                    },
                )
            })
            .collect();

        Arc::new(Self {
            portfolio_repo: PortfolioRepository::new(db.clone()),
            trade_repo: TradeRepository::new(db.clone()),
            ai_log_repo: AiLogRepository::new(db.clone()),
            analysis_repo: AnalysisRepository::new(db.clone()),
            db,
            config: RwLock::new(config),
            exchange,
            oracle,
            events: EventBus::new(),
            sse_tokens: SseTokenRegistry::new(),
            jwt: JwtCodec::new(jwt_secret),
            circuit_breaker,
            contract_specs: RwLock::new(contract_specs),
            analyst_states: RwLock::new(Vec::new()),
            shared_portfolio: RwLock::new(Arc::new(parking_lot::RwLock::new(SharedPortfolio::default()))),
            is_running: AtomicBool::new(false),
            is_starting: AtomicBool::new(false),
            cycle_count: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            current_user_id: RwLock::new(None),
            current_cycle: RwLock::new(None),
            main_loop_handle: RwLock::new(None),
        })
    }

    /// Install `self` as the process-global singleton. Call once at startup.
    pub async fn install(engine: Arc<Self>) {
        *ENGINE.write() = Some(engine);
    }

    pub fn global() -> Option<Arc<Self>> {
        ENGINE.read().clone()
    }

    /// Tear down and replace the global singleton with a freshly built one.
    /// Used by `/autonomous/stop`-then-`/autonomous/start` rebuild cycles and
    /// by tests that need an isolated controller per case.
    pub async fn reset(new_engine: Arc<Self>) -> Arc<Self> {
        if let Some(old) = ENGINE.read().clone() {
            old.cleanup().await;
        }
        *ENGINE.write() = Some(Arc::clone(&new_engine));
        new_engine
    }

    // -------------------------------------------------------------------------
    // Accessors used by the HTTP layer
    // -------------------------------------------------------------------------

    pub fn jwt(&self) -> &JwtCodec {
        &self.jwt
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn sse_tokens(&self) -> &SseTokenRegistry {
        &self.sse_tokens
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    pub fn config(&self) -> EngineConfig {
        self.config.read().clone()
    }

    pub fn authenticate_bearer(&self, token: &str) -> Option<String> {
        self.jwt.verify_access_token(token).ok().map(|c| c.sub)
    }

    pub fn status_json(&self) -> serde_json::Value {
        serde_json::json!({"type": "status", "status": self.get_status()})
    }

    // -------------------------------------------------------------------------
    // start / stop / status / cleanup
    // -------------------------------------------------------------------------

    /// Idempotent, non-reentrant start. Returns immediately if already
    /// starting or running.
    pub async fn start(self: &Arc<Self>, user_id: String) -> anyhow::Result<()> {
        if self.is_running.load(Ordering::SeqCst) || self.is_starting.load(Ordering::SeqCst) {
            info!("start() called while already starting or running, ignoring");
            return Ok(());
        }
        self.is_starting.store(true, Ordering::SeqCst);

        // If a prior lifecycle's loop task is still resolving, wait it out.
        self.cleanup().await;

        let result = self.start_inner(user_id).await;
        self.is_starting.store(false, Ordering::SeqCst);
        result
    }

    async fn start_inner(self: &Arc<Self>, user_id: String) -> anyhow::Result<()> {
        // Exchange reachable + balance seeded.
        let mut attempts = 0;
        let max_retries = self.config().max_retries;
        loop {
            match self.exchange.get_account_assets().await {
                Ok(_) => break,
                Err(e) if attempts < max_retries => {
                    attempts += 1;
                    warn!(attempt = attempts, error = %e, "account seed failed, retrying");
                    tokio::time::sleep(Duration::from_secs(attempts as u64)).await;
                }
                Err(e) => return Err(e.context("exchange unreachable during startup")),
            }
        }

        let portfolio = Arc::new(parking_lot::RwLock::new(SharedPortfolio::default()));
        portfolio::refresh(&self.exchange, &portfolio).await?;
        // `portfolio` is moved into every analyst state and installed below;
        // no outer lock is held across the await above.

        let (states, _) = portfolio::build_analyst_states(analysts::roster());
        // Re-point every analyst state at the freshly seeded portfolio.
        let states: Vec<AnalystState> = states
            .into_iter()
            .map(|s| AnalystState {
                profile: s.profile,
                portfolio: Arc::clone(&portfolio),
            })
            .collect();

        *self.analyst_states.write() = states;
        *self.shared_portfolio.write() = portfolio;
        *self.current_user_id.write() = Some(user_id.clone());

        let portfolio_id = format!("{user_id}-collaborative");
        self.portfolio_repo
            .upsert(&PortfolioRecord {
                id: portfolio_id,
                user_id,
                agent_id: "collaborative".to_string(),
                current_balance: self.shared_portfolio.read().read().balance,
                total_trades: 0,
                win_rate: 0.0,
                updated_at: Utc::now(),
            })
            .await?;

        self.is_running.store(true, Ordering::SeqCst);
        self.events.publish(EngineEvent::Started);

        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move { engine.main_loop().await });
        *self.main_loop_handle.write() = Some(handle);

        Ok(())
    }

    /// Idempotent stop: flips the running flag so the loop observes it
    /// before its next stage/sleep and exits.
    pub fn stop(&self) {
        if self.is_running.swap(false, Ordering::SeqCst) {
            self.events.publish(EngineEvent::Stopped);
        }
    }

    pub fn get_status(&self) -> EngineStatus {
        let analysts = self
            .analyst_states
            .read()
            .iter()
            .map(|s| AnalystStatus {
                id: s.profile.id.to_string(),
                display_name: s.profile.display_name.to_string(),
            })
            .collect();

        let shared_portfolio = self.shared_portfolio.read().read().clone();
        let level = self.circuit_breaker.get_state().level;
        let consecutive_failures = self.consecutive_failures.load(Ordering::SeqCst);
        let next_cycle_in = scheduler::get_dynamic_cycle_interval(
            self.config().cycle_interval_ms / 1000,
            level,
            consecutive_failures,
        );

        EngineStatus {
            is_running: self.is_running.load(Ordering::SeqCst),
            cycle_count: self.cycle_count.load(Ordering::SeqCst),
            analysts,
            current_cycle: self.current_cycle.read().clone(),
            shared_portfolio,
            next_cycle_in_secs: next_cycle_in,
        }
    }

    /// Stop, wait up to 5s for the loop task, then clear all mutable state.
    pub async fn cleanup(&self) {
        self.stop();

        let handle = self.main_loop_handle.write().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
                warn!("main loop did not finish within 5s cleanup window");
            }
        }

        self.analyst_states.write().clear();
        *self.current_cycle.write() = None;
        self.cycle_count.store(0, Ordering::SeqCst);
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    // -------------------------------------------------------------------------
    // Main loop
    // -------------------------------------------------------------------------

    async fn main_loop(self: Arc<Self>) {
        while self.is_running.load(Ordering::SeqCst) {
            let config = self.config();
            if !scheduler::should_trade_now(Utc::now(), config.start_hour, config.end_hour) {
                info!(
                    start_hour = config.start_hour,
                    end_hour = config.end_hour,
                    "outside configured trading-hours window, idling"
                );
                tokio::time::sleep(Duration::from_secs(config.paused_poll_interval_secs)).await;
                continue;
            }

            let cycle_number = self.cycle_count.fetch_add(1, Ordering::SeqCst) + 1;
            self.events.publish(EngineEvent::CycleStart { cycle: cycle_number });

            let mut cycle = TradingCycle {
                cycle_number,
                start_time: Some(Utc::now()),
                ..Default::default()
            };

            let reset_backoff = match self.run_cycle(&mut cycle).await {
                Ok(reset) => reset,
                Err(failure) => {
                    error!(stage = failure.stage, reason = %failure.reason, "stage failed");
                    cycle.errors.push(failure.reason);
                    false
                }
            };

            cycle.end_time = Some(Utc::now());
            self.events.publish(EngineEvent::CycleComplete {
                cycle: cycle_number,
                errors: cycle.errors.clone(),
            });
            *self.current_cycle.write() = Some(cycle);

            let consecutive_failures = if reset_backoff {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                0
            } else {
                self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1
            };

            if !self.is_running.load(Ordering::SeqCst) {
                break;
            }

            let level = self.circuit_breaker.get_state().level;
            let sleep_secs = scheduler::get_dynamic_cycle_interval(
                self.config().cycle_interval_ms / 1000,
                level,
                consecutive_failures,
            );
            tokio::time::sleep(Duration::from_secs(sleep_secs)).await;
        }
    }

    /// Run one cycle to completion. Returns `Ok(true)` when backoff should
    /// reset (success or deliberate skip), `Ok(false)` on a recorded-but-
    /// non-fatal issue, or `Err` on a structural stage failure.
    async fn run_cycle(&self, cycle: &mut TradingCycle) -> Result<bool, StageFailure> {
        let config = self.config();

        // Clone the Arc out from under the outer lock before awaiting —
        // holding `shared_portfolio`'s read guard across an await would pin
        // it for the whole network round-trip.
        let portfolio_handle = Arc::clone(&self.shared_portfolio.read());
        if let Err(e) = portfolio::refresh(&self.exchange, &portfolio_handle).await {
            return Err(StageFailure::new("portfolio_refresh", e.to_string()));
        }

        let market = market_data::assemble(&self.exchange, &config.symbols).await;
        cycle.symbols_analyzed = market.keys().cloned().collect();
        if market.is_empty() {
            return Err(StageFailure::new("market_data", "no symbols returned market data"));
        }

        let btc_symbol = config
            .symbols
            .iter()
            .find(|s| s.contains("btc"))
            .cloned()
            .unwrap_or_else(|| config.symbols[0].clone());
        let btc_price = market.get(&btc_symbol).map(|m| m.last_price).unwrap_or(0.0);

        let equity = self.shared_portfolio.read().read().total_value();
        let funding_rates: Vec<f64> = market.values().filter_map(|m| m.funding_rate).collect();
        let level = self.circuit_breaker.evaluate(btc_price, equity, &funding_rates);

        if level == CircuitLevel::Red {
            warn!("RED ALERT: circuit breaker tripped, closing all positions");
            self.emergency_close().await;
            return Ok(true);
        }

        let selectors = analysts::coin_selectors();
        let mut picks = Vec::with_capacity(selectors.len());
        for profile in &selectors {
            let prompt = build_coin_selection_prompt(profile, &market, &config.symbols);
            let raw = self
                .oracle
                .ask(profile, &prompt)
                .await
                .map_err(|e| StageFailure::new("coin_selection", e.to_string()))?;
            let parsed: CoinSelectionResponse = serde_json::from_value(raw)
                .map_err(|e| StageFailure::new("coin_selection", format!("invalid coin selection shape: {e}")))?;
            picks.push((profile.id.to_string(), parsed));
        }
        cycle.debates_run += 1;
        self.events.publish(EngineEvent::DebatesComplete {
            stage: "coin_selection".to_string(),
        });

        let outcome = coin_selection::aggregate(&picks, &config.symbols)
            .map_err(|e| StageFailure::new("coin_selection", e.reason))?;

        let winning = match outcome {
            Stage2Outcome::Manage { symbol, reason } => {
                info!(symbol, reason, "coin selection diverted to position management");
                self.events.publish(EngineEvent::CoinSelected {
                    symbol: symbol.clone(),
                    side: "manage".to_string(),
                });
                self.manage_position(&symbol, &reason).await;
                return Ok(true);
            }
            Stage2Outcome::Proceed(winning) => winning,
        };
        self.events.publish(EngineEvent::CoinSelected {
            symbol: winning.symbol.clone(),
            side: winning.side.to_string(),
        });

        let mut snapshot = market
            .get(&winning.symbol)
            .cloned()
            .ok_or_else(|| StageFailure::new("championship", "winning symbol missing from market data"))?;

        if let Ok(refreshed) = self.exchange.get_ticker(&winning.symbol).await {
            if championship::price_deviation_exceeds(snapshot.last_price, refreshed.last, 0.5) {
                snapshot.last_price = refreshed.last;
                snapshot.mark_price = refreshed.mark_price;
            }
        }

        let roster = analysts::roster();
        let mut theses = Vec::with_capacity(roster.len());
        for profile in &roster {
            let prompt = build_championship_prompt(profile, &winning, &snapshot);
            let raw = self
                .oracle
                .ask(profile, &prompt)
                .await
                .map_err(|e| StageFailure::new("championship", e.to_string()))?;
            let mut thesis: crate::analysts::AnalysisResult = serde_json::from_value(raw)
                .map_err(|e| StageFailure::new("championship", format!("invalid thesis shape: {e}")))?;
            thesis.analyst_id = profile.id.to_string();
            thesis
                .validate(config.max_leverage as f64)
                .map_err(|e| StageFailure::new("championship", e))?;
            self.analysis_repo
                .insert(cycle.cycle_number, "championship", &thesis)
                .await
                .map_err(|e| warn!(error = %e, "failed to persist analysis record"))
                .ok();
            self.events.publish(EngineEvent::SpecialistAnalysis {
                analyst_id: thesis.analyst_id.clone(),
            });
            theses.push(thesis);
        }
        cycle.debates_run += 1;
        self.events.publish(EngineEvent::DebatesComplete {
            stage: "championship".to_string(),
        });

        let judge_profile = AnalystProfile {
            id: "judge",
            display_name: "The Judge",
            methodology: crate::types::Methodology::Quant,
            role: crate::types::PipelineRole::Specialist,
        };
        let judge_prompt = build_judge_prompt(&theses);
        let championship: ChampionshipResult = match self.oracle.ask(&judge_profile, &judge_prompt).await {
            Ok(raw) => match serde_json::from_value::<JudgeResponse>(raw) {
                Ok(response) => championship::judge(&theses, &response, &config.judge_criteria_weights)
                    .map_err(|e| StageFailure::new("championship", e.reason))?,
                Err(_) => championship::judge_fallback(&theses, &config.judge_criteria_weights)
                    .map_err(|e| StageFailure::new("championship", e.reason))?,
            },
            Err(_) => championship::judge_fallback(&theses, &config.judge_criteria_weights)
                .map_err(|e| StageFailure::new("championship", e.reason))?,
        };
        self.events.publish(EngineEvent::TournamentComplete {
            champion_id: championship.champion_id.clone(),
        });

        let champion = theses
            .iter()
            .find(|t| t.analyst_id == championship.champion_id)
            .ok_or_else(|| StageFailure::new("championship", "champion id not found among theses"))?
            .clone();
        self.events.publish(EngineEvent::ChampionSelected {
            analyst_id: champion.analyst_id.clone(),
            symbol: winning.symbol.clone(),
        });

        if champion.confidence < config.min_confidence_to_trade {
            info!(
                confidence = champion.confidence,
                threshold = config.min_confidence_to_trade,
                "low confidence, skipping trade"
            );
            return Ok(true);
        }

        if let Ok(refreshed) = self.exchange.get_ticker(&winning.symbol).await {
            if championship::price_deviation_exceeds(snapshot.last_price, refreshed.last, 0.3) {
                snapshot.last_price = refreshed.last;
                snapshot.mark_price = refreshed.mark_price;
            }
        }

        let open_positions = self.shared_portfolio.read().read().positions.clone();
        let open_exchange_positions: Vec<crate::exchange::ExchangePosition> = open_positions
            .iter()
            .map(|p| crate::exchange::ExchangePosition {
                symbol: p.symbol.clone(),
                side: p.side,
                size: p.size,
                entry_price: p.entry_price,
                leverage: p.leverage,
                unrealized_pnl: p.unrealized_pnl,
            })
            .collect();

        let balance = self.shared_portfolio.read().read().balance;
        let since = Utc::now() - chrono::Duration::hours(7 * 24);
        let weekly_pnl = self.trade_repo.realized_pnl_since(since).await.unwrap_or(0.0);
        let weekly_pnl_pct = if balance > 0.0 { (weekly_pnl / balance) * 100.0 } else { 0.0 };

        let proposed = risk_council::ProposedTrade {
            symbol: winning.symbol.clone(),
            side: winning.side,
            position_size: champion.position_size,
            leverage: champion.leverage,
            stop_loss: champion.stop_loss,
            entry_price: snapshot.last_price,
        };
        let decision = risk_council::evaluate(
            &config,
            &proposed,
            &open_exchange_positions,
            weekly_pnl_pct,
            snapshot.funding_rate,
            balance,
        );
        self.events.publish(EngineEvent::RiskCouncilDecision {
            approved: decision.approved,
        });

        if !decision.approved {
            info!(reason = ?decision.veto_reason, "risk council vetoed trade");
            return Ok(true);
        }

        let spec = self
            .contract_specs
            .read()
            .get(&winning.symbol)
            .cloned()
            .unwrap_or_else(|| ContractSpec {
                symbol: winning.symbol.clone(),
                ..ContractSpec::default()
            });

        let req = crate::executor::ExecutionRequest {
            cycle_number: cycle.cycle_number,
            symbol: &winning.symbol,
            side: winning.side,
            current_price: snapshot.last_price,
            balance,
            risk_decision: &decision,
            take_profit_price: champion.price_target.base,
            contract_spec: &spec,
        };

        let outcome = crate::executor::execute(&self.exchange, &self.events, &config, req).await;

        match outcome.result {
            crate::executor::ExecutionResult::Placed {
                client_oid,
                exchange_order_id,
            } => {
                cycle.trades_executed += 1;
                self.after_fill(
                    cycle.cycle_number,
                    &winning,
                    &champion,
                    snapshot.last_price,
                    outcome.size,
                    client_oid,
                    exchange_order_id,
                )
                .await;
            }
            crate::executor::ExecutionResult::Simulated { .. } => {
                cycle.trades_executed += 1;
            }
            crate::executor::ExecutionResult::Blocked { reason } => {
                info!(reason, "execution blocked by pre-submission guard");
            }
            crate::executor::ExecutionResult::Error { reason } => {
                cycle.errors.push(format!("execution error: {reason}"));
            }
        }

        Ok(true)
    }

    #[allow(clippy::too_many_arguments)]
    async fn after_fill(
        &self,
        cycle_number: u64,
        winning: &crate::pipeline::WinningPick,
        champion: &crate::analysts::AnalysisResult,
        price: f64,
        size: f64,
        client_oid: String,
        exchange_order_id: Option<String>,
    ) {
        let config = self.config();
        let user_id = self
            .current_user_id
            .read()
            .clone()
            .unwrap_or_else(|| "unknown".to_string());

        if config.enable_ai_log_upload {
            let entry = AiLogEntry::new(
                &user_id,
                "trade_execution",
                "collaborative-pipeline",
                &serde_json::to_string(&champion).unwrap_or_default(),
                &client_oid,
                &champion.thesis,
            );
            match self.exchange.upload_ai_log(&serde_json::to_value(&champion).unwrap_or_default()).await {
                Ok(log_id) => info!(log_id, "AI log uploaded to exchange"),
                Err(e) => warn!(error = %e, "AI log upload failed, continuing"),
            }
            if let Err(e) = self.ai_log_repo.insert(&entry).await {
                warn!(error = %e, "failed to persist AI log entry");
            }
        }

        if config.enable_trade_persistence {
            let record = TradeRecord {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.clone(),
                portfolio_id: format!("{user_id}-collaborative"),
                symbol: winning.symbol.clone(),
                side: winning.side.to_string(),
                size,
                price,
                reason: champion.thesis.clone(),
                confidence: champion.confidence,
                client_order_id: client_oid,
                exchange_order_id,
                executed_at: Utc::now(),
                realized_pnl: None,
            };
            if let Err(e) = self.trade_repo.insert(&record).await {
                warn!(error = %e, "failed to persist trade record");
            }
        }
    }

    /// Close every distinct open position and zero them in memory.
    async fn emergency_close(&self) {
        let symbols: Vec<String> = {
            let portfolio = self.shared_portfolio.read();
            let guard = portfolio.read();
            guard.positions.iter().map(|p| p.symbol.clone()).collect()
        };

        for symbol in &symbols {
            if let Err(e) = self.exchange.close_all_positions(symbol).await {
                error!(symbol, error = %e, "emergency close failed for symbol");
            }
        }

        self.shared_portfolio.read().write().positions.clear();
        self.events.publish(EngineEvent::EmergencyClose { symbols });
    }

    /// Act on a Stage 2 MANAGE pick against its currently open position:
    /// close outright on a severe loss, trim by half on a moderate loss,
    /// otherwise leave it alone. Respects dry-run/live the same way
    /// `executor::execute` does.
    async fn manage_position(&self, symbol: &str, reason: &str) {
        const SEVERE_LOSS_PCT: f64 = -15.0;
        const MODERATE_LOSS_PCT: f64 = -5.0;

        let position = {
            let portfolio = self.shared_portfolio.read();
            let guard = portfolio.read();
            guard.positions.iter().find(|p| p.symbol == symbol).cloned()
        };

        let Some(position) = position else {
            warn!(symbol, reason, "MANAGE pick referenced a symbol with no open position, skipping");
            return;
        };

        let margin = if position.leverage > 0.0 {
            (position.size * position.entry_price) / position.leverage
        } else {
            0.0
        };
        let pnl_pct = if margin > 0.0 {
            (position.unrealized_pnl / margin) * 100.0
        } else {
            0.0
        };

        if pnl_pct <= SEVERE_LOSS_PCT {
            info!(symbol, pnl_pct, reason, "MANAGE: severe loss, closing position outright");
            if let Err(e) = self.exchange.close_all_positions(symbol).await {
                error!(symbol, error = %e, "MANAGE close failed");
            }
            return;
        }

        if pnl_pct <= MODERATE_LOSS_PCT {
            info!(symbol, pnl_pct, reason, "MANAGE: moderate loss, trimming position by half");
            let close_side = match position.side {
                Side::Long => OrderSide::CloseLong,
                Side::Short => OrderSide::CloseShort,
            };
            let spec = self
                .contract_specs
                .read()
                .get(symbol)
                .cloned()
                .unwrap_or_else(|| ContractSpec {
                    symbol: symbol.to_string(),
                    ..ContractSpec::default()
                });
            let half_size = position.size / 2.0;
            let client_oid: String = format!("mgmt-{}", Uuid::new_v4().simple())
                .chars()
                .take(40)
                .collect();

            let built = PlaceOrderRequest::build(
                &spec,
                close_side,
                OrderType::Fok,
                OrderMatchPrice::Market,
                half_size,
                position.entry_price,
                client_oid,
                None,
                None,
            );
            let order = match built {
                Ok(o) => o,
                Err(e) => {
                    warn!(symbol, error = %e, "MANAGE partial-close order rejected");
                    return;
                }
            };

            let config = self.config();
            if config.execution_mode == ExecutionMode::DryRun {
                info!(symbol, "MANAGE dry-run: partial close recorded, no exchange call made");
            } else if let Err(e) = self.exchange.place_order(&order).await {
                error!(symbol, error = %e, "MANAGE partial close failed");
            }
            return;
        }

        info!(symbol, pnl_pct, reason, "MANAGE: position within acceptable bounds, no action taken");
    }
}

fn build_coin_selection_prompt(
    profile: &AnalystProfile,
    market: &HashMap<String, market_data::ExtendedMarketData>,
    approved_symbols: &[String],
) -> String {
    let snapshot = approved_symbols
        .iter()
        .filter_map(|s| market.get(s))
        .map(|m| format!("{}: last={:.2} change24h={:.2}%", m.symbol, m.last_price, m.change_24h))
        .collect::<Vec<_>>()
        .join("; ");

    format!(
        "As {}, rank your top picks among the approved symbols given this market snapshot: {}. \
         Respond with JSON {{\"picks\": [{{\"symbol\", \"action\", \"conviction\", \"reason\"}}]}}.",
        profile.display_name, snapshot
    )
}

fn build_championship_prompt(
    profile: &AnalystProfile,
    winning: &crate::pipeline::WinningPick,
    snapshot: &market_data::ExtendedMarketData,
) -> String {
    format!(
        "As {}, build a full thesis for {} {} at price {:.2} (24h change {:.2}%, funding {:?}). \
         Respond with JSON matching the AnalysisResult contract.",
        profile.display_name, winning.side, winning.symbol, snapshot.last_price, snapshot.change_24h, snapshot.funding_rate
    )
}

fn build_judge_prompt(theses: &[crate::analysts::AnalysisResult]) -> String {
    let summaries = theses
        .iter()
        .map(|t| format!("{}: confidence={:.0}", t.analyst_id, t.confidence))
        .collect::<Vec<_>>()
        .join("; ");
    format!(
        "Score each analyst's thesis on data_quality, logic, risk_awareness, catalyst_clarity (0-100 each): {summaries}. \
         Respond with JSON {{\"scores\": {{analystId: {{criteria...}}}}}}."
    )
}
