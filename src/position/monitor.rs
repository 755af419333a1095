// =============================================================================
// Position Monitor — tiered exit state machine
// =============================================================================
//
// A single fan-out task polls every `{open, breakeven}` position once per
// `MONITOR_POLL` and evaluates the priority-ordered rule table below,
// sequentially per position (never two tasks deciding the same position's
// exit concurrently). The high-water-mark ratchet is grounded on the
// legacy micro-trail's "only tighten, never widen" stop logic, simplified:
// this domain has no order-flow/CVD axis, so the ratchet here is a bare
// `max(hwm, price)` rather than an ATR-phased trail.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bus::SignalBus;
use crate::model::{Chain, ChainSnapshot, ExitType, Position, PositionStatus};
use crate::position::PositionStore;
use crate::risk::RiskManager;
use crate::runtime_config::RuntimeConfig;
use crate::snapshot::SnapshotService;
use crate::execution::Executor;
use crate::adapters::Shutdown;

pub const MONITOR_POLL: Duration = Duration::from_secs(60);
const MAX_CONSECUTIVE_SNAPSHOT_FAILURES: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub stop_loss_pct: f64,
    pub time_stop_sol_minutes: u64,
    pub time_stop_bsc_minutes: u64,
    pub time_stop_pnl_ceiling_pct: f64,
    pub liquidity_crash_threshold: f64,
    pub dev_dump_pct: f64,
    pub smart_money_exodus_pp: f64,
    pub breakeven_trigger_pct: f64,
    pub breakeven_sell_pct: f64,
    pub heat_decay_floor: f64,
    pub smart_money_sell_warning_pp: f64,
    pub sideways_minutes: u64,
    pub drawdown_from_hwm_ratio: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: MONITOR_POLL,
            stop_loss_pct: -50.0,
            time_stop_sol_minutes: 60,
            time_stop_bsc_minutes: 120,
            time_stop_pnl_ceiling_pct: 20.0,
            liquidity_crash_threshold: 0.5,
            dev_dump_pct: 10.0,
            smart_money_exodus_pp: 30.0,
            breakeven_trigger_pct: 100.0,
            breakeven_sell_pct: 50.0,
            heat_decay_floor: 0.4,
            smart_money_sell_warning_pp: 15.0,
            sideways_minutes: 30,
            drawdown_from_hwm_ratio: 0.5,
        }
    }
}

impl MonitorConfig {
    /// Build the monitor's tuning from the operator-facing runtime config
    /// (spec §6's configuration surface); the remaining Phase-1/Phase-2
    /// thresholds have no corresponding operator knob and keep their spec
    /// defaults.
    pub fn from_runtime_config(config: &RuntimeConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.monitor_poll_secs),
            stop_loss_pct: config.stop_loss_pct,
            time_stop_sol_minutes: config.time_stop_sol_minutes,
            time_stop_bsc_minutes: config.time_stop_bsc_minutes,
            breakeven_trigger_pct: config.breakeven_trigger_pct,
            breakeven_sell_pct: config.breakeven_sell_pct,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MonitorAction {
    Hold,
    /// Pre-breakeven profit trim: partial sell, status -> breakeven.
    BreakevenTrim { sell_percent: f64 },
    /// Post-breakeven warning-driven partial sell; stays in breakeven.
    PartialSell { sell_percent: f64 },
    /// Terminal: sell all remaining, status -> closed.
    FullExit { exit_type: ExitType },
}

fn liquidity_ratio(entry_usd: Option<f64>, entry_native: Option<f64>, snapshot: &ChainSnapshot) -> Option<f64> {
    match (entry_usd, snapshot.liquidity_usd) {
        (Some(e), Some(c)) if e > 0.0 => return Some(c / e),
        _ => {}
    }
    match (entry_native, snapshot.liquidity_native) {
        (Some(e), Some(c)) if e > 0.0 => Some(c / e),
        _ => None,
    }
}

/// Pure rule evaluation — no I/O, no mutation. `current_heat` is the
/// live TG-Heat axis value for this token, supplied by the caller (the
/// scorer owns heat tracking); `None` means unknown and the heat-decay
/// warning is skipped rather than fabricated.
pub fn evaluate(position: &Position, snapshot: &ChainSnapshot, current_heat: Option<f64>, config: &MonitorConfig) -> MonitorAction {
    let chain_time_stop_minutes = match position.chain {
        Chain::Sol => config.time_stop_sol_minutes,
        Chain::Bsc => config.time_stop_bsc_minutes,
    };
    let pnl = snapshot.price.map(|p| position.pnl_percent_at(p));
    let hold_minutes = position.hold_duration().as_secs_f64() / 60.0;
    let liq_ratio = liquidity_ratio(
        position.entry_snapshot.liquidity_usd,
        position.entry_snapshot.liquidity_native,
        snapshot,
    );
    let top1_drop = match (position.entry_snapshot.top1_percent, snapshot.top1_holder_percent) {
        (Some(e), Some(c)) => Some(e - c),
        _ => None,
    };
    let top10_drop = match (position.entry_snapshot.top10_percent, snapshot.top10_holder_percent) {
        (Some(e), Some(c)) => Some(e - c),
        _ => None,
    };

    // Emergency rules apply in both phases, highest priority first.
    if let Some(pnl) = pnl {
        if pnl <= config.stop_loss_pct {
            return MonitorAction::FullExit { exit_type: ExitType::StopLoss };
        }
    }
    if hold_minutes >= chain_time_stop_minutes as f64 {
        if let Some(pnl) = pnl {
            if pnl < config.time_stop_pnl_ceiling_pct {
                return MonitorAction::FullExit { exit_type: ExitType::TimeStop };
            }
        }
    }
    if let Some(ratio) = liq_ratio {
        if ratio < config.liquidity_crash_threshold {
            return MonitorAction::FullExit { exit_type: ExitType::Emergency };
        }
    }
    if let Some(drop) = top1_drop {
        if drop > config.dev_dump_pct {
            return MonitorAction::FullExit { exit_type: ExitType::Emergency };
        }
    }
    if let Some(drop) = top10_drop {
        if drop > config.smart_money_exodus_pp {
            return MonitorAction::FullExit { exit_type: ExitType::Emergency };
        }
    }

    match position.status {
        PositionStatus::Open => {
            if let Some(pnl) = pnl {
                if pnl >= config.breakeven_trigger_pct {
                    return MonitorAction::BreakevenTrim {
                        sell_percent: config.breakeven_sell_pct,
                    };
                }
            }
            MonitorAction::Hold
        }
        PositionStatus::Breakeven => {
            let mut warnings = 0u32;

            if let Some(heat) = current_heat {
                if position.entry_snapshot.heat > 0.0 && heat / position.entry_snapshot.heat < config.heat_decay_floor {
                    warnings += 1;
                }
            }
            if let Some(drop) = top10_drop {
                if drop > config.smart_money_sell_warning_pp {
                    warnings += 1;
                }
            }
            if position.last_significant_move.elapsed().as_secs_f64() / 60.0 > config.sideways_minutes as f64 {
                warnings += 1;
            }
            if position.high_water_mark > 0.0 {
                if let Some(price) = snapshot.price {
                    let drawdown = (position.high_water_mark - price) / position.high_water_mark;
                    if drawdown > config.drawdown_from_hwm_ratio {
                        warnings += 1;
                    }
                }
            }

            match warnings {
                w if w >= 3 => MonitorAction::FullExit { exit_type: ExitType::ProfitTake },
                2 => MonitorAction::PartialSell { sell_percent: 50.0 },
                1 => MonitorAction::PartialSell { sell_percent: 33.0 },
                _ => MonitorAction::Hold,
            }
        }
        PositionStatus::Closed => MonitorAction::Hold,
    }
}

/// Drives HWM ratcheting and dispatches `evaluate`'s verdict through the
/// Executor, mutating the stored Position. Returns the action taken, for
/// logging/telemetry.
pub struct PositionMonitor {
    store: Arc<PositionStore>,
    snapshots: Arc<SnapshotService>,
    executor: Arc<Executor>,
    risk: Arc<RiskManager>,
    bus: Arc<SignalBus>,
    config: MonitorConfig,
}

impl PositionMonitor {
    pub fn new(
        store: Arc<PositionStore>,
        snapshots: Arc<SnapshotService>,
        executor: Arc<Executor>,
        risk: Arc<RiskManager>,
        bus: Arc<SignalBus>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            snapshots,
            executor,
            risk,
            bus,
            config,
        }
    }

    /// One evaluation pass over every open/breakeven position, strictly
    /// sequential (I5/ordering guarantee: no two tasks evaluate the same
    /// position concurrently, and here there's only ever one task).
    async fn poll_once(&self) {
        for position in self.store.open_and_breakeven() {
            self.poll_position(&position).await;
        }
    }

    async fn poll_position(&self, position: &Position) {
        let fingerprint = crate::model::TokenFingerprint::new(position.chain, position.token.clone());
        let snapshot = self.snapshots.get_snapshot(&fingerprint, None).await;

        if snapshot.price.is_none() && snapshot.liquidity_usd.is_none() {
            let failures = position.consecutive_snapshot_failures + 1;
            self.store.update(&position.id, |p| p.consecutive_snapshot_failures = failures);
            if failures >= MAX_CONSECUTIVE_SNAPSHOT_FAILURES {
                warn!(position = %position.id, failures, "snapshot unavailable for 3 consecutive polls");
            }
            return;
        }
        self.store.update(&position.id, |p| p.consecutive_snapshot_failures = 0);

        if let Some(price) = snapshot.price {
            self.store.update(&position.id, |p| {
                if price > p.high_water_mark {
                    p.high_water_mark = price;
                    p.last_significant_move = Instant::now();
                }
            });
        }

        // Re-read after the HWM update so `evaluate` sees the latest state.
        let position = match self.store.get(&position.id) {
            Some(p) => p,
            None => return,
        };

        let current_heat = self.bus.current_heat_axis(&fingerprint);
        let action = evaluate(&position, &snapshot, current_heat, &self.config);
        self.apply_action(&position, &snapshot, action).await;
    }

    async fn apply_action(&self, position: &Position, snapshot: &ChainSnapshot, action: MonitorAction) {
        match action {
            MonitorAction::Hold => {}
            MonitorAction::BreakevenTrim { sell_percent } => {
                let sell = self.executor.sell(position.chain, &position.token, sell_percent).await;
                if sell.success {
                    self.store.update(&position.id, |p| {
                        p.remaining_percent = p.remaining_percent * (1.0 - sell_percent / 100.0);
                        p.status = PositionStatus::Breakeven;
                        p.breakeven_done = true;
                    });
                    info!(position = %position.id, sell_percent, "breakeven trim executed");
                }
            }
            MonitorAction::PartialSell { sell_percent } => {
                let sell = self.executor.sell(position.chain, &position.token, sell_percent).await;
                if sell.success {
                    self.store.update(&position.id, |p| {
                        p.remaining_percent = p.remaining_percent * (1.0 - sell_percent / 100.0);
                        if p.remaining_percent <= 0.0 {
                            p.status = PositionStatus::Closed;
                        }
                    });
                    info!(position = %position.id, sell_percent, "warning-driven partial sell executed");
                }
            }
            MonitorAction::FullExit { exit_type } => {
                let sell = self.executor.sell(position.chain, &position.token, 100.0).await;
                if sell.success {
                    let pnl_percent = snapshot.price.map(|p| position.pnl_percent_at(p));
                    let is_win = pnl_percent.map(|p| p > 0.0).unwrap_or(false);
                    self.store.update(&position.id, |p| {
                        p.status = PositionStatus::Closed;
                        p.remaining_percent = 0.0;
                        p.exit_time = Some(chrono::Utc::now());
                        p.exit_price = snapshot.price;
                        p.exit_type = Some(exit_type);
                        p.pnl_percent = pnl_percent;
                        p.pnl_native = sell.amount_native;
                    });
                    self.risk.record_trade_result(is_win);
                    info!(position = %position.id, %exit_type, "position closed");
                }
            }
        }
    }

    /// Run the fan-out loop until `shutdown` fires.
    pub async fn run(&self, shutdown: Shutdown) {
        let mut tick = tokio::time::interval(self.config.poll_interval);
        loop {
            if shutdown.is_triggered() {
                return;
            }
            tokio::select! {
                _ = tick.tick() => self.poll_once().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuthorityState, EntrySnapshot, LpState, TokenFingerprint, WashFlag};

    fn snapshot_at_price(price: f64) -> ChainSnapshot {
        ChainSnapshot {
            fingerprint: TokenFingerprint::new(Chain::Sol, "TOK"),
            snapshot_time: Instant::now(),
            price: Some(price),
            symbol: Some("TOK".into()),
            liquidity_native: Some(100.0),
            liquidity_usd: Some(50_000.0),
            market_cap: Some(500_000.0),
            top10_holder_percent: Some(20.0),
            top1_holder_percent: Some(8.0),
            holder_count: Some(500),
            mint_authority: AuthorityState::Disabled,
            freeze_authority: AuthorityState::Disabled,
            lp_state: LpState::Locked,
            sell_slippage_at_20pct: Some(1.0),
            wash_flag: WashFlag::Low,
            is_bonding_curve: false,
            bonding_curve_progress: None,
            buy_tax_pct: Some(1.0),
            sell_tax_pct: Some(1.0),
            tax_mutable: false,
            is_honeypot: Some(false),
            owner_is_safe_type: Some(true),
        }
    }

    fn open_position(entry_price: f64) -> Position {
        Position::new(
            Chain::Sol,
            "TOK",
            entry_price,
            1.0,
            EntrySnapshot {
                top10_percent: Some(20.0),
                top1_percent: Some(8.0),
                liquidity_usd: Some(50_000.0),
                liquidity_native: Some(100.0),
                heat: 5.0,
            },
            true,
        )
    }

    #[test]
    fn stop_loss_fires_at_threshold() {
        let position = open_position(1.0);
        let snapshot = snapshot_at_price(0.49); // -51%
        let action = evaluate(&position, &snapshot, None, &MonitorConfig::default());
        assert_eq!(action, MonitorAction::FullExit { exit_type: ExitType::StopLoss });
    }

    #[test]
    fn breakeven_trim_fires_at_plus_100_percent() {
        let position = open_position(1.0);
        let snapshot = snapshot_at_price(2.0);
        let action = evaluate(&position, &snapshot, None, &MonitorConfig::default());
        assert_eq!(action, MonitorAction::BreakevenTrim { sell_percent: 50.0 });
    }

    #[test]
    fn liquidity_crash_overrides_a_profitable_pnl() {
        let position = open_position(1.0);
        let mut snapshot = snapshot_at_price(1.1);
        snapshot.liquidity_usd = Some(10_000.0); // 20% of entry's 50k
        let action = evaluate(&position, &snapshot, None, &MonitorConfig::default());
        assert_eq!(action, MonitorAction::FullExit { exit_type: ExitType::Emergency });
    }

    #[test]
    fn holding_in_the_absence_of_any_trigger() {
        let position = open_position(1.0);
        let snapshot = snapshot_at_price(1.05);
        let action = evaluate(&position, &snapshot, None, &MonitorConfig::default());
        assert_eq!(action, MonitorAction::Hold);
    }

    #[test]
    fn post_breakeven_full_exit_requires_three_warnings() {
        let mut position = open_position(1.0);
        position.status = PositionStatus::Breakeven;
        position.high_water_mark = 3.0;
        position.last_significant_move = Instant::now() - Duration::from_secs(40 * 60);

        let mut snapshot = snapshot_at_price(1.2); // drawdown from hwm of 3.0 -> >0.5
        snapshot.top10_holder_percent = Some(4.0); // drop of 16pp -> warning

        let action = evaluate(&position, &snapshot, Some(1.0), &MonitorConfig::default());
        // sideways (>30min) + drawdown(>0.5) + smart-money-selling(>15pp) = 3 warnings
        assert_eq!(action, MonitorAction::FullExit { exit_type: ExitType::ProfitTake });
    }

    #[test]
    fn post_breakeven_zero_warnings_holds_the_moonbag() {
        let mut position = open_position(1.0);
        position.status = PositionStatus::Breakeven;
        position.high_water_mark = 1.2;
        position.last_significant_move = Instant::now();
        let snapshot = snapshot_at_price(1.2);
        let action = evaluate(&position, &snapshot, Some(5.0), &MonitorConfig::default());
        assert_eq!(action, MonitorAction::Hold);
    }

    #[test]
    fn time_stop_fires_when_held_past_the_chain_limit_without_profit() {
        // scenario #3: entry at 1.00, held past the SOL time stop (60 min)
        // at a flat +10% — TIME_STOP fires because pnl is below the
        // ceiling that would otherwise let a winner run past the clock.
        let mut position = open_position(1.0);
        position.entry_instant = Instant::now() - Duration::from_secs(65 * 60);
        let snapshot = snapshot_at_price(1.10);
        let action = evaluate(&position, &snapshot, None, &MonitorConfig::default());
        assert_eq!(action, MonitorAction::FullExit { exit_type: ExitType::TimeStop });
    }

    #[test]
    fn time_stop_does_not_fire_before_the_chain_limit() {
        let mut position = open_position(1.0);
        position.entry_instant = Instant::now() - Duration::from_secs(30 * 60);
        let snapshot = snapshot_at_price(1.10);
        let action = evaluate(&position, &snapshot, None, &MonitorConfig::default());
        assert_eq!(action, MonitorAction::Hold);
    }

    #[test]
    fn unknown_price_never_fabricates_a_stop_loss() {
        let position = open_position(1.0);
        let mut snapshot = snapshot_at_price(0.0);
        snapshot.price = None;
        let action = evaluate(&position, &snapshot, None, &MonitorConfig::default());
        assert_eq!(action, MonitorAction::Hold);
    }
}
