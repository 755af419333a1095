// =============================================================================
// Risk Manager — pre-trade gate applied after scoring, before sizing
// =============================================================================
//
// Five rules, checked in order, first match wins. Grounded on the legacy
// risk engine's shape — state behind a single `RwLock`, read via a
// lock-free-to-callers snapshot, single-writer updates — generalized from
// four always-on circuit breakers to the ordered deny-rule list below.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::model::RiskState;
use crate::runtime_config::RuntimeConfig;

pub const LOSS_STREAK_PAUSE: u32 = 3;
pub const PAUSE_HOURS: i64 = 24;
pub const MAX_CONCURRENT_POSITIONS: usize = 3;
pub const MIN_STATS_TRADES: usize = 10;
pub const WIN_RATE_FLOOR: f64 = 0.35;
/// Bound on `recent_outcomes` so the trailing window doesn't grow
/// unbounded across a long-lived process; the win-rate floor only ever
/// looks at the most recent `MIN_STATS_TRADES`-or-more of these.
const OUTCOME_WINDOW: usize = 200;

/// Operator-tunable thresholds for the five deny rules (spec §6's
/// configuration surface). Mirrors `MonitorConfig`: built once from the
/// runtime config at startup and carried by the `RiskManager`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub loss_streak_pause: u32,
    pub pause_hours: i64,
    pub max_concurrent_positions: usize,
    pub min_stats_trades: usize,
    pub win_rate_floor: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            loss_streak_pause: LOSS_STREAK_PAUSE,
            pause_hours: PAUSE_HOURS,
            max_concurrent_positions: MAX_CONCURRENT_POSITIONS,
            min_stats_trades: MIN_STATS_TRADES,
            win_rate_floor: WIN_RATE_FLOOR,
        }
    }
}

impl RiskConfig {
    pub fn from_runtime_config(config: &RuntimeConfig) -> Self {
        Self {
            loss_streak_pause: config.loss_streak_pause,
            pause_hours: config.pause_hours,
            max_concurrent_positions: config.max_concurrent_positions as usize,
            min_stats_trades: config.min_stats_trades as usize,
            win_rate_floor: config.win_rate_floor,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DenyReason {
    Paused {
        until: DateTime<Utc>,
        remaining_minutes: i64,
    },
    ConcurrentCap {
        open_positions: usize,
    },
    WinRateFloor {
        win_rate: f64,
        trades: usize,
    },
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Paused { remaining_minutes, .. } => {
                write!(f, "risk paused, {remaining_minutes}m remaining")
            }
            Self::ConcurrentCap { open_positions } => {
                write!(f, "concurrent position cap reached ({open_positions} open)")
            }
            Self::WinRateFloor { win_rate, trades } => {
                write!(f, "win rate {:.1}% over {trades} trades below floor", win_rate * 100.0)
            }
        }
    }
}

/// Global, process-wide risk gate. One instance per process; single writer,
/// many readers.
pub struct RiskManager {
    state: RwLock<RiskState>,
    config: RiskConfig,
}

impl RiskManager {
    pub fn new(initial: RiskState, config: RiskConfig) -> Self {
        Self {
            state: RwLock::new(initial),
            config,
        }
    }

    /// Rule 1-4 in order; `ALLOW` only if none deny. `open_positions` is
    /// the live count of positions with status `open` or `breakeven`,
    /// supplied by the caller since the Risk Manager holds no position
    /// data itself.
    pub fn can_trade(&self, open_positions: usize) -> Result<(), DenyReason> {
        let now = Utc::now();
        let mut state = self.state.write();

        if let Some(until) = state.paused_until {
            if now < until {
                let remaining_minutes = (until - now).num_minutes().max(0);
                return Err(DenyReason::Paused { until, remaining_minutes });
            }
            state.paused_until = None;
        }

        if state.consecutive_losses >= self.config.loss_streak_pause {
            let until = now + ChronoDuration::hours(self.config.pause_hours);
            state.paused_until = Some(until);
            warn!(consecutive_losses = state.consecutive_losses, until = %until, "loss streak pause engaged");
            return Err(DenyReason::Paused {
                until,
                remaining_minutes: self.config.pause_hours * 60,
            });
        }

        if open_positions >= self.config.max_concurrent_positions {
            return Err(DenyReason::ConcurrentCap { open_positions });
        }

        if state.recent_outcomes.len() >= self.config.min_stats_trades {
            let wins = state.recent_outcomes.iter().filter(|w| **w).count();
            let win_rate = wins as f64 / state.recent_outcomes.len() as f64;
            if win_rate < self.config.win_rate_floor {
                return Err(DenyReason::WinRateFloor {
                    win_rate,
                    trades: state.recent_outcomes.len(),
                });
            }
        }

        Ok(())
    }

    /// A win resets the consecutive-loss streak to zero; a loss increments
    /// it. Both are folded into the trailing outcomes window used by the
    /// win-rate floor.
    pub fn record_trade_result(&self, is_win: bool) {
        let mut state = self.state.write();
        if is_win {
            state.consecutive_losses = 0;
        } else {
            state.consecutive_losses += 1;
        }
        state.recent_outcomes.push(is_win);
        if state.recent_outcomes.len() > OUTCOME_WINDOW {
            let excess = state.recent_outcomes.len() - OUTCOME_WINDOW;
            state.recent_outcomes.drain(0..excess);
        }
        info!(is_win, consecutive_losses = state.consecutive_losses, "trade result recorded");
    }

    pub fn snapshot(&self) -> RiskState {
        self.state.read().clone()
    }

    /// Operator override: clears any active pause immediately.
    pub fn resume(&self) {
        self.state.write().paused_until = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_state_allows() {
        let manager = RiskManager::new(RiskState::default(), RiskConfig::default());
        assert!(manager.can_trade(0).is_ok());
    }

    #[test]
    fn active_pause_denies() {
        let mut state = RiskState::default();
        state.paused_until = Some(Utc::now() + ChronoDuration::hours(1));
        let manager = RiskManager::new(state, RiskConfig::default());
        assert!(matches!(manager.can_trade(0), Err(DenyReason::Paused { .. })));
    }

    #[test]
    fn expired_pause_clears_and_allows() {
        let mut state = RiskState::default();
        state.paused_until = Some(Utc::now() - ChronoDuration::minutes(1));
        let manager = RiskManager::new(state, RiskConfig::default());
        assert!(manager.can_trade(0).is_ok());
        assert!(manager.snapshot().paused_until.is_none());
    }

    #[test]
    fn loss_streak_pause_engages_on_fourth_candidate() {
        // P8 / scenario #5: three sequential losing closes, then the next
        // canTrade() denies with paused_until ~= now + 24h.
        let manager = RiskManager::new(RiskState::default(), RiskConfig::default());
        manager.record_trade_result(false);
        manager.record_trade_result(false);
        manager.record_trade_result(false);

        let before = Utc::now();
        let result = manager.can_trade(0);
        assert!(matches!(result, Err(DenyReason::Paused { .. })));

        let until = manager.snapshot().paused_until.expect("pause recorded");
        let expected = before + ChronoDuration::hours(PAUSE_HOURS);
        assert!((until - expected).num_seconds().abs() <= 1);
    }

    #[test]
    fn a_win_resets_the_streak() {
        let manager = RiskManager::new(RiskState::default(), RiskConfig::default());
        manager.record_trade_result(false);
        manager.record_trade_result(false);
        manager.record_trade_result(true);
        assert_eq!(manager.snapshot().consecutive_losses, 0);
        assert!(manager.can_trade(0).is_ok());
    }

    #[test]
    fn concurrent_cap_denies_at_threshold() {
        let manager = RiskManager::new(RiskState::default(), RiskConfig::default());
        assert!(manager.can_trade(MAX_CONCURRENT_POSITIONS - 1).is_ok());
        assert!(matches!(
            manager.can_trade(MAX_CONCURRENT_POSITIONS),
            Err(DenyReason::ConcurrentCap { .. })
        ));
    }

    #[test]
    fn win_rate_floor_denies_below_threshold_with_enough_trades() {
        let manager = RiskManager::new(RiskState::default(), RiskConfig::default());
        // 2 wins, 8 losses => 20% win rate, below the 35% floor, at exactly
        // MIN_STATS_TRADES trades.
        for _ in 0..2 {
            manager.record_trade_result(true);
        }
        for _ in 0..8 {
            manager.record_trade_result(false);
        }
        // the losses above also trip the loss-streak rule; clear it to
        // isolate the win-rate-floor check.
        manager.resume();
        let mut state = manager.state.write();
        state.consecutive_losses = 0;
        drop(state);

        assert!(matches!(manager.can_trade(0), Err(DenyReason::WinRateFloor { .. })));
    }

    #[test]
    fn win_rate_floor_does_not_apply_below_min_trades() {
        let manager = RiskManager::new(RiskState::default(), RiskConfig::default());
        manager.record_trade_result(false);
        manager.resume();
        manager.state.write().consecutive_losses = 0;
        assert!(manager.can_trade(0).is_ok());
    }

    #[test]
    fn operator_configured_thresholds_are_honored() {
        let config = RiskConfig {
            loss_streak_pause: 1,
            max_concurrent_positions: 1,
            ..RiskConfig::default()
        };
        let manager = RiskManager::new(RiskState::default(), config);
        assert!(manager.can_trade(0).is_ok());
        assert!(matches!(manager.can_trade(1), Err(DenyReason::ConcurrentCap { .. })));

        manager.record_trade_result(false);
        assert!(matches!(manager.can_trade(0), Err(DenyReason::Paused { .. })));
    }
}
