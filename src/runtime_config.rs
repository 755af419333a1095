// =============================================================================
// Runtime Configuration — hot-reloadable engine settings with atomic save
// =============================================================================
//
// Central configuration hub. Every tunable lives here so the engine can be
// reconfigured without a restart. Persistence uses the same atomic
// tmp + rename pattern as the legacy config: write to a `.tmp` sibling,
// then rename, so a crash mid-write never corrupts the file on disk. All
// fields carry `#[serde(default)]` so adding a field never breaks loading
// an older config.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::gates::{ExitGateConfig, HardGateConfig};
use crate::sizing::MAX_POSITION_PERCENT as DEFAULT_MAX_POSITION_PERCENT;
use crate::types::{AccountMode, TradingMode};

fn default_true() -> bool {
    true
}
fn default_max_concurrent_positions() -> u32 {
    3
}
fn default_max_position_percent() -> f64 {
    DEFAULT_MAX_POSITION_PERCENT
}
fn default_total_capital_sol() -> f64 {
    10.0
}
fn default_total_capital_bnb() -> f64 {
    5.0
}
fn default_loss_streak_pause() -> u32 {
    3
}
fn default_pause_hours() -> i64 {
    24
}
fn default_min_stats_trades() -> u32 {
    10
}
fn default_win_rate_floor() -> f64 {
    0.35
}
fn default_stop_loss_pct() -> f64 {
    -50.0
}
fn default_breakeven_trigger_pct() -> f64 {
    100.0
}
fn default_breakeven_sell_pct() -> f64 {
    50.0
}
fn default_time_stop_sol_minutes() -> u64 {
    60
}
fn default_time_stop_bsc_minutes() -> u64 {
    120
}
fn default_monitor_poll_secs() -> u64 {
    60
}
fn default_aggregation_window_secs() -> u64 {
    10 * 60
}
fn default_signal_expiry_secs() -> u64 {
    30 * 60
}
fn default_heat_window_secs() -> u64 {
    15 * 60
}
fn default_cache_ttl_secs() -> u64 {
    60
}
fn default_provider_rps() -> f64 {
    10.0
}
fn default_provider_burst() -> f64 {
    5.0
}
fn default_shutdown_grace_secs() -> u64 {
    10
}

/// Top-level runtime configuration. Every field has a serde default so
/// older JSON files missing new fields still deserialize correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Operational modes ---------------------------------------------------
    #[serde(default)]
    pub trading_mode: TradingMode,
    #[serde(default)]
    pub account_mode: AccountMode,
    /// When true, Executor dispatches synthetic fills regardless of
    /// `account_mode` — belt-and-braces for demo deployments.
    #[serde(default = "default_true")]
    pub shadow_mode: bool,
    #[serde(default)]
    pub auto_buy_enabled: bool,

    // --- Risk / sizing --------------------------------------------------------
    #[serde(default = "default_max_concurrent_positions")]
    pub max_concurrent_positions: u32,
    #[serde(default = "default_max_position_percent")]
    pub max_position_percent: f64,
    #[serde(default = "default_total_capital_sol")]
    pub total_capital_sol: f64,
    #[serde(default = "default_total_capital_bnb")]
    pub total_capital_bnb: f64,
    #[serde(default = "default_loss_streak_pause")]
    pub loss_streak_pause: u32,
    #[serde(default = "default_pause_hours")]
    pub pause_hours: i64,
    #[serde(default = "default_min_stats_trades")]
    pub min_stats_trades: u32,
    #[serde(default = "default_win_rate_floor")]
    pub win_rate_floor: f64,

    // --- Position monitor -------------------------------------------------------
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_breakeven_trigger_pct")]
    pub breakeven_trigger_pct: f64,
    #[serde(default = "default_breakeven_sell_pct")]
    pub breakeven_sell_pct: f64,
    #[serde(default = "default_time_stop_sol_minutes")]
    pub time_stop_sol_minutes: u64,
    #[serde(default = "default_time_stop_bsc_minutes")]
    pub time_stop_bsc_minutes: u64,
    #[serde(default = "default_monitor_poll_secs")]
    pub monitor_poll_secs: u64,

    // --- Scoring ----------------------------------------------------------------
    #[serde(default = "default_aggregation_window_secs")]
    pub aggregation_window_secs: u64,
    #[serde(default = "default_signal_expiry_secs")]
    pub signal_expiry_secs: u64,
    #[serde(default = "default_heat_window_secs")]
    pub heat_window_secs: u64,

    // --- Chain snapshot service --------------------------------------------------
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_provider_rps")]
    pub provider_rps: f64,
    #[serde(default = "default_provider_burst")]
    pub provider_burst: f64,

    // --- Gate thresholds ----------------------------------------------------------
    #[serde(default)]
    pub hard_gate: HardGateConfig,
    #[serde(default)]
    pub exit_gate: ExitGateConfig,

    // --- Orchestrator -------------------------------------------------------------
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            trading_mode: TradingMode::Paused,
            account_mode: AccountMode::Demo,
            shadow_mode: true,
            auto_buy_enabled: false,
            max_concurrent_positions: default_max_concurrent_positions(),
            max_position_percent: default_max_position_percent(),
            total_capital_sol: default_total_capital_sol(),
            total_capital_bnb: default_total_capital_bnb(),
            loss_streak_pause: default_loss_streak_pause(),
            pause_hours: default_pause_hours(),
            min_stats_trades: default_min_stats_trades(),
            win_rate_floor: default_win_rate_floor(),
            stop_loss_pct: default_stop_loss_pct(),
            breakeven_trigger_pct: default_breakeven_trigger_pct(),
            breakeven_sell_pct: default_breakeven_sell_pct(),
            time_stop_sol_minutes: default_time_stop_sol_minutes(),
            time_stop_bsc_minutes: default_time_stop_bsc_minutes(),
            monitor_poll_secs: default_monitor_poll_secs(),
            aggregation_window_secs: default_aggregation_window_secs(),
            signal_expiry_secs: default_signal_expiry_secs(),
            heat_window_secs: default_heat_window_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            provider_rps: default_provider_rps(),
            provider_burst: default_provider_burst(),
            hard_gate: HardGateConfig::default(),
            exit_gate: ExitGateConfig::default(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;
        info!(path = %path.display(), trading_mode = %config.trading_mode, account_mode = %config.account_mode, "runtime config loaded");
        Ok(config)
    }

    /// Persist via atomic tmp + rename.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self).context("failed to serialize runtime config to JSON")?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;
        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.trading_mode, TradingMode::Paused);
        assert_eq!(cfg.account_mode, AccountMode::Demo);
        assert!(cfg.shadow_mode);
        assert_eq!(cfg.max_concurrent_positions, 3);
        assert_eq!(cfg.loss_streak_pause, 3);
        assert_eq!(cfg.pause_hours, 24);
        assert!((cfg.win_rate_floor - 0.35).abs() < f64::EPSILON);
        assert_eq!(cfg.time_stop_sol_minutes, 60);
        assert_eq!(cfg.time_stop_bsc_minutes, 120);
    }

    #[test]
    fn deserialize_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Paused);
        assert_eq!(cfg.max_concurrent_positions, 3);
        assert_eq!(cfg.monitor_poll_secs, 60);
    }

    #[test]
    fn deserialize_partial_json_fills_defaults() {
        let json = r#"{ "trading_mode": "Live", "total_capital_sol": 25.0 }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Live);
        assert_eq!(cfg.total_capital_sol, 25.0);
        assert_eq!(cfg.loss_streak_pause, 3);
    }

    #[test]
    fn roundtrip_serialization() {
        let cfg = RuntimeConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.total_capital_sol, cfg2.total_capital_sol);
        assert_eq!(cfg.trading_mode, cfg2.trading_mode);
    }

    #[test]
    fn atomic_save_and_load_roundtrips() {
        let dir = std::env::temp_dir().join(format!("tokenpulse-cfg-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");

        let mut cfg = RuntimeConfig::default();
        cfg.auto_buy_enabled = true;
        cfg.save(&path).unwrap();

        let loaded = RuntimeConfig::load(&path).unwrap();
        assert!(loaded.auto_buy_enabled);

        std::fs::remove_dir_all(&dir).ok();
    }
}
