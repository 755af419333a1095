// =============================================================================
// tokenpulse-engine — Main Entry Point
// =============================================================================
//
// The engine starts in Demo + Paused mode for safety. Operators switch to
// Live trading via the REST control endpoints. Topology:
//
//   4 adapter tasks -> SignalBus (dedup) -> AggregationCoordinator
//     -> N scoring workers (gate -> score -> risk -> size -> execute)
//   1 PositionMonitor fan-out task (tiered exit rules)
//   1 Axum API server (REST + WebSocket push)
//
// Grounded on the legacy spawn-everything-then-ctrl_c-then-save shape in
// the teacher's `main.rs`, retargeted from market-data streams to the
// adapter/bus/monitor topology above.
// =============================================================================

mod adapters;
mod api;
mod app_state;
mod bus;
mod decision_envelope;
mod execution;
mod gates;
mod model;
mod position;
mod risk;
mod runtime_config;
mod scoring;
mod sizing;
mod snapshot;
mod types;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::{
    channel_listener::ChannelListenerAdapter,
    hot_board::HotBoardAdapter,
    market_discovery::MarketDiscoveryAdapter,
    smart_money::{SmartMoneyAggregatorAdapter, SyntheticSmartMoneyClient},
    Shutdown, SourceAdapter,
};
use crate::app_state::AppState;
use crate::bus::SignalBus;
use crate::decision_envelope::DecisionEnvelope;
use crate::execution::Executor;
use crate::gates::{ExitGate, HardGate};
use crate::model::{Chain, EntrySnapshot, Position, RawSignal, TokenFingerprint, Verdict};
use crate::position::monitor::{MonitorConfig, PositionMonitor};
use crate::position::PositionStore;
use crate::risk::{RiskConfig, RiskManager};
use crate::runtime_config::RuntimeConfig;
use crate::scoring::{AggregationCoordinator, ReadyCandidate, Scorer};
use crate::sizing::PositionSizer;
use crate::snapshot::{SnapshotService, SyntheticChainDataProvider};
use crate::types::{AccountMode, TradingMode};

/// Number of scoring workers pulling ready candidates off the aggregation
/// coordinator's output channel (spec §5: "a pool of N scoring workers,
/// default 4").
const SCORING_WORKER_COUNT: usize = 4;
/// Synthetic demo token universe each adapter cycles through in shadow mode.
fn demo_pool(chain: Chain) -> Vec<String> {
    let prefix = match chain {
        Chain::Sol => "Sol",
        Chain::Bsc => "Bsc",
    };
    (0..12).map(|i| format!("{prefix}Demo{i:03}")).collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        tokenpulse-engine — Starting Up                   ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    // ── 1. Load config, force safe startup mode ──────────────────────────
    let mut config = RuntimeConfig::load("runtime_config.json").unwrap_or_else(|e| {
        warn!(error = %e, "failed to load runtime config, using defaults");
        RuntimeConfig::default()
    });
    config.trading_mode = TradingMode::Paused;
    config.account_mode = AccountMode::Demo;

    info!(
        trading_mode = %config.trading_mode,
        account_mode = %config.account_mode,
        shadow_mode = config.shadow_mode,
        "engine starting in SAFE mode (Demo + Paused)"
    );

    // ── 2. Build shared subsystems ────────────────────────────────────────
    let bus = Arc::new(SignalBus::new());
    let snapshot_provider = Arc::new(SyntheticChainDataProvider::new());
    let snapshots = Arc::new(SnapshotService::with_config(
        snapshot_provider,
        Duration::from_secs(config.cache_ttl_secs),
        config.provider_rps,
        config.provider_burst,
    ));
    let risk = Arc::new(RiskManager::new(
        model::RiskState::default(),
        RiskConfig::from_runtime_config(&config),
    ));
    let positions = Arc::new(PositionStore::new());
    let executor = Arc::new(if config.shadow_mode {
        Executor::shadow()
    } else {
        // Live venue wiring is out of scope (spec §1); shadow mode is the
        // only dispatch path this binary ships with.
        warn!("account_mode requested live execution but no VenueClient is wired — forcing shadow");
        Executor::shadow()
    });

    let state = Arc::new(AppState::new(
        config,
        bus.clone(),
        snapshots.clone(),
        risk.clone(),
        positions.clone(),
        executor.clone(),
    ));

    let shutdown = Shutdown::new();

    // ── 3. Spawn the four source adapters into the bus ───────────────────
    let adapters: Vec<Box<dyn SourceAdapter>> = vec![
        Box::new(ChannelListenerAdapter::new("telegram_alpha_calls", Chain::Sol, demo_pool(Chain::Sol))),
        Box::new(ChannelListenerAdapter::new("telegram_bsc_gems", Chain::Bsc, demo_pool(Chain::Bsc))),
        Box::new(HotBoardAdapter::new("hot_board_dexscreener", Chain::Sol, demo_pool(Chain::Sol))),
        Box::new(SmartMoneyAggregatorAdapter::new(
            "smart_money_aggregator",
            Box::new(SyntheticSmartMoneyClient::new(Chain::Sol, demo_pool(Chain::Sol))),
        )),
        Box::new(MarketDiscoveryAdapter::new("market_discovery_board", Chain::Bsc, demo_pool(Chain::Bsc))),
    ];

    for adapter in adapters {
        let inbound = bus.inbound();
        let adapter_shutdown = shutdown.clone();
        let source_id = adapter.source_id().to_string();
        tokio::spawn(async move {
            info!(source_id = %source_id, "adapter starting");
            adapter.run(inbound, adapter_shutdown).await;
            info!(source_id = %source_id, "adapter stopped");
        });
    }

    // ── 4. Bus -> aggregation coordinator -> ready-candidate channel ─────
    let (aggregation_in_tx, aggregation_in_rx) = mpsc::channel::<RawSignal>(bus::BUS_CAPACITY);
    {
        let bus = bus.clone();
        let bus_shutdown = shutdown.clone();
        tokio::spawn(async move {
            bus.run(aggregation_in_tx, bus_shutdown).await;
            info!("signal bus stopped");
        });
    }

    let coordinator = Arc::new(AggregationCoordinator::new());
    let (ready_tx, ready_rx) = mpsc::channel::<ReadyCandidate>(256);
    {
        let coordinator = coordinator.clone();
        let coordinator_shutdown = shutdown.clone();
        tokio::spawn(async move {
            coordinator.run(aggregation_in_rx, ready_tx, coordinator_shutdown).await;
            info!("aggregation coordinator stopped");
        });
    }

    // ── 5. Scoring worker pool ────────────────────────────────────────────
    // `ready_rx` has one owner; workers share it behind an async mutex so
    // exactly one worker pulls the next candidate, then processes it
    // end-to-end without holding the lock.
    let ready_rx = Arc::new(AsyncMutex::new(ready_rx));
    for worker_id in 0..SCORING_WORKER_COUNT {
        let ready_rx = ready_rx.clone();
        let state = state.clone();
        let worker_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                if worker_shutdown.is_triggered() {
                    return;
                }
                let candidate = {
                    let mut rx = ready_rx.lock().await;
                    rx.recv().await
                };
                match candidate {
                    Some(candidate) => process_candidate(&state, candidate, worker_id).await,
                    None => return,
                }
            }
        });
    }

    // ── 6. Position monitor ──────────────────────────────────────────────
    {
        let monitor_config = MonitorConfig::from_runtime_config(&state.runtime_config.read());
        let monitor = PositionMonitor::new(
            positions.clone(),
            snapshots.clone(),
            executor.clone(),
            risk.clone(),
            bus.clone(),
            monitor_config,
        );
        let monitor_shutdown = shutdown.clone();
        tokio::spawn(async move {
            monitor.run(monitor_shutdown).await;
            info!("position monitor stopped");
        });
    }

    // ── 7. API server ─────────────────────────────────────────────────────
    let api_state = state.clone();
    let bind_addr = std::env::var("TOKENPULSE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());
    let bind_addr_for_log = bind_addr.clone();
    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .expect("failed to bind API server");
        info!(addr = %bind_addr_for_log, "API server listening");
        axum::serve(listener, app).await.expect("API server failed");
    });

    info!("all subsystems running. Press Ctrl+C to stop.");

    // ── 8. Graceful shutdown ──────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received — stopping gracefully");
    shutdown.trigger();

    let grace = Duration::from_secs(state.runtime_config.read().shutdown_grace_secs);
    tokio::time::sleep(grace).await;

    if let Err(e) = state.runtime_config.read().save("runtime_config.json") {
        error!(error = %e, "failed to save runtime config on shutdown");
    }

    info!("tokenpulse-engine shut down complete.");
    Ok(())
}

/// One candidate's full journey: snapshot -> hard gate -> score -> risk ->
/// size -> exit gate -> execute. Errors at any stage collapse to a
/// `DecisionEnvelope::blocked` rather than propagating (spec §7: errors
/// never bubble out of a per-candidate pipeline).
async fn process_candidate(state: &Arc<AppState>, candidate: ReadyCandidate, worker_id: usize) {
    let fingerprint = candidate.fingerprint.clone();

    let timeout = tokio::time::timeout(scoring::SCORE_TIMEOUT, score_and_decide(state, &candidate, worker_id));
    if timeout.await.is_err() {
        warn!(token = %fingerprint, worker_id, "candidate dropped: score_timeout");
        state.push_decision(DecisionEnvelope::blocked(fingerprint, "scorer", "score_timeout"));
    }
}

async fn score_and_decide(state: &Arc<AppState>, candidate: &ReadyCandidate, worker_id: usize) {
    let fingerprint = candidate.fingerprint.clone();
    let chain = fingerprint.chain;

    let hard_gate_snapshot = state.snapshots.get_snapshot(&fingerprint, None).await;
    let (hard_gate_config, exit_gate_config, trading_mode, auto_buy_enabled, max_position_percent) = {
        let config = state.runtime_config.read();
        (
            config.hard_gate.clone(),
            config.exit_gate.clone(),
            config.trading_mode,
            config.auto_buy_enabled,
            config.max_position_percent,
        )
    };
    let hard_verdict = HardGate::evaluate(&hard_gate_snapshot, chain, &hard_gate_config);

    let score = Scorer::score(&fingerprint, &candidate.evidence, candidate.first_seen, hard_verdict.verdict, chrono::Utc::now());

    if hard_verdict.verdict == Verdict::Reject {
        debug_blocked(state, fingerprint.clone(), "hard_gate", hard_verdict.reasons.join("; "));
        return;
    }

    use crate::model::RatingTier;
    match score.tier {
        RatingTier::Reject => {
            state.push_decision(DecisionEnvelope::blocked(fingerprint, "scorer", "score below REJECT threshold"));
            return;
        }
        RatingTier::Watch => {
            state.push_decision(DecisionEnvelope::watch(fingerprint, score.total, score.tier.to_string()));
            return;
        }
        RatingTier::Max | RatingTier::Normal | RatingTier::Small => {}
    }

    if trading_mode != TradingMode::Live || !auto_buy_enabled {
        state.push_decision(DecisionEnvelope::watch(fingerprint, score.total, score.tier.to_string()));
        return;
    }

    let open_positions = state.positions.total_open_count();
    if let Err(deny) = state.risk.can_trade(open_positions) {
        debug_blocked(state, fingerprint.clone(), "risk_manager", deny.to_string());
        return;
    }

    let pools = state.capital_pools.read().clone();
    let size = PositionSizer::size(chain, score.tier, &pools, hard_gate_snapshot.price, max_position_percent);
    if size.native_amount <= 0.0 {
        debug_blocked(state, fingerprint.clone(), "sizer", "sized to zero");
        return;
    }

    let exit_gate_snapshot = state.snapshots.get_snapshot(&fingerprint, Some(size.native_amount)).await;
    let exit_verdict = ExitGate::evaluate(&exit_gate_snapshot, chain, Some(size.native_amount), &exit_gate_config);
    if exit_verdict.verdict == Verdict::Reject {
        debug_blocked(state, fingerprint.clone(), "exit_gate", exit_verdict.reasons.join("; "));
        return;
    }

    let buy = state.executor.buy(chain, &fingerprint.token_address, size.native_amount).await;
    if !buy.success {
        state.push_decision(DecisionEnvelope::blocked(
            fingerprint.clone(),
            "executor",
            buy.error.unwrap_or_else(|| "buy failed".to_string()),
        ));
        return;
    }

    let entry_price = buy.fill_price.unwrap_or(1.0);
    let entry_snapshot = EntrySnapshot {
        top10_percent: exit_gate_snapshot.top10_holder_percent,
        top1_percent: exit_gate_snapshot.top1_holder_percent,
        liquidity_usd: exit_gate_snapshot.liquidity_usd,
        liquidity_native: exit_gate_snapshot.liquidity_native,
        heat: score.breakdown.tg_heat,
    };
    let position = Position::new(chain, fingerprint.token_address.clone(), entry_price, size.native_amount, entry_snapshot, buy.is_simulated);

    match state.positions.insert(position) {
        Ok(()) => {
            info!(worker_id, token = %fingerprint, tier = %score.tier, "position opened");
            state.push_decision(DecisionEnvelope::allow(fingerprint, score.total, score.tier.to_string()));
        }
        Err(reason) => {
            // (I4) lost the race to another worker scoring the same
            // token in the same tick; the buy already executed so this
            // only affects bookkeeping, not funds.
            warn!(token = %fingerprint, reason, "position insert rejected after buy — duplicate open position");
            state.push_decision(DecisionEnvelope::blocked(fingerprint, "position_store", reason));
        }
    }
}

fn debug_blocked(state: &Arc<AppState>, fingerprint: TokenFingerprint, layer: &str, reason: impl Into<String>) {
    state.push_decision(DecisionEnvelope::blocked(fingerprint, layer, reason));
}
