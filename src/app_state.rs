// =============================================================================
// Central Application State
// =============================================================================
//
// The single source of truth tying every subsystem together: the bus, the
// snapshot service, the gates' configs (carried inside runtime config), the
// risk manager, the position store, and the executor. `AppState` owns no
// business logic itself — it wires `Arc`s together and builds the
// serializable snapshot consumed by the REST/WS control surface. Grounded
// on the legacy AppState's version-tracked, RwLock-guarded shared-state
// shape.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::bus::{BusMetrics, SignalBus};
use crate::decision_envelope::DecisionEnvelope;
use crate::execution::Executor;
use crate::model::{Position, RiskState};
use crate::position::PositionStore;
use crate::risk::RiskManager;
use crate::runtime_config::RuntimeConfig;
use crate::snapshot::SnapshotService;
use crate::sizing::CapitalPools;

#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    pub code: Option<String>,
    pub at: String,
}

const MAX_RECENT_ERRORS: usize = 50;
const MAX_RECENT_DECISIONS: usize = 100;

pub struct AppState {
    pub state_version: AtomicU64,
    pub ws_sequence_number: AtomicU64,

    pub runtime_config: Arc<RwLock<RuntimeConfig>>,

    pub bus: Arc<SignalBus>,
    pub snapshots: Arc<SnapshotService>,
    pub risk: Arc<RiskManager>,
    pub positions: Arc<PositionStore>,
    pub executor: Arc<Executor>,
    pub capital_pools: Arc<RwLock<CapitalPools>>,

    pub recent_decisions: RwLock<Vec<DecisionEnvelope>>,
    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    pub no_go_reason: RwLock<Option<String>>,
    pub start_time: std::time::Instant,

    pub ws_user_connected: RwLock<bool>,
    pub last_ws_user_event: RwLock<std::time::Instant>,
}

impl AppState {
    pub fn new(
        config: RuntimeConfig,
        bus: Arc<SignalBus>,
        snapshots: Arc<SnapshotService>,
        risk: Arc<RiskManager>,
        positions: Arc<PositionStore>,
        executor: Arc<Executor>,
    ) -> Self {
        let capital_pools = CapitalPools {
            sol_native: config.total_capital_sol,
            bnb_native: config.total_capital_bnb,
        };

        Self {
            state_version: AtomicU64::new(1),
            ws_sequence_number: AtomicU64::new(0),

            runtime_config: Arc::new(RwLock::new(config)),

            bus,
            snapshots,
            risk,
            positions,
            executor,
            capital_pools: Arc::new(RwLock::new(capital_pools)),

            recent_decisions: RwLock::new(Vec::new()),
            recent_errors: RwLock::new(Vec::new()),

            no_go_reason: RwLock::new(None),
            start_time: std::time::Instant::now(),

            ws_user_connected: RwLock::new(false),
            last_ws_user_event: RwLock::new(std::time::Instant::now()),
        }
    }

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    pub fn push_error(&self, msg: String) {
        self.push_error_with_code(msg, None);
    }

    pub fn push_error_with_code(&self, msg: String, code: Option<String>) {
        let record = ErrorRecord {
            message: msg,
            code,
            at: Utc::now().to_rfc3339(),
        };
        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        self.increment_version();
    }

    pub fn push_decision(&self, envelope: DecisionEnvelope) {
        let mut decisions = self.recent_decisions.write();
        decisions.push(envelope);
        while decisions.len() > MAX_RECENT_DECISIONS {
            decisions.remove(0);
        }
        self.increment_version();
    }

    /// Build a complete, serializable snapshot of engine state — the
    /// payload for `GET /api/v1/state` and the WebSocket push feed.
    pub fn build_snapshot(&self) -> StateSnapshot {
        let now = Utc::now();
        let config = self.runtime_config.read();
        let version = self.current_state_version();
        let risk_state = self.risk.snapshot();

        let truth = TruthHeader {
            state_version: version,
            ws_sequence_number: self.ws_sequence_number.load(Ordering::Relaxed),
            trading_mode: config.trading_mode.to_string(),
            account_mode: config.account_mode.to_string(),
            shadow_mode: self.executor.is_shadow(),
            no_go_reason: self.no_go_reason.read().clone(),
            server_time: now.timestamp_millis(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        };

        let positions = self.positions.open_and_breakeven();
        let history = self.positions.history();
        let recent_decisions = self.recent_decisions.read().clone();
        let recent_errors = self.recent_errors.read().clone();
        let bus_metrics = self.bus.metrics();

        let journal_stats = if !history.is_empty() {
            let total_trades = history.len();
            let wins = history.iter().filter(|p| p.pnl_percent.unwrap_or(0.0) > 0.0).count();
            let win_rate = wins as f64 / total_trades as f64;
            let total_net_pnl: f64 = history.iter().filter_map(|p| p.pnl_native).sum();
            Some(JournalStats {
                total_trades,
                win_rate,
                total_net_pnl,
            })
        } else {
            None
        };

        StateSnapshot {
            state_version: version,
            server_time: now.timestamp_millis(),
            truth,
            positions,
            recent_decisions,
            recent_errors,
            risk: risk_state,
            bus: bus_metrics,
            journal_stats,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub truth: TruthHeader,
    pub positions: Vec<Position>,
    pub recent_decisions: Vec<DecisionEnvelope>,
    pub recent_errors: Vec<ErrorRecord>,
    pub risk: RiskState,
    pub bus: BusMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal_stats: Option<JournalStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TruthHeader {
    pub state_version: u64,
    pub ws_sequence_number: u64,
    pub trading_mode: String,
    pub account_mode: String,
    pub shadow_mode: bool,
    pub no_go_reason: Option<String>,
    pub server_time: i64,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct JournalStats {
    pub total_trades: usize,
    pub win_rate: f64,
    pub total_net_pnl: f64,
}
