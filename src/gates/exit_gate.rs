// =============================================================================
// Exit Gate — can we get out at this size?
// =============================================================================
//
// Unlike the Hard Gate, `plannedPositionNative` is required input: it
// couples exit feasibility to the trade actually being sized, not to an
// abstract "safe to buy". Absence forces the verdict to at least
// `GREYLIST` regardless of what the individual checks say.

use serde::{Deserialize, Serialize};

use crate::model::{Chain, ChainSnapshot, GateVerdict, Verdict, WashFlag};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitGateChainConfig {
    pub min_liquidity_native: f64,
    pub slippage_reject_pct: f64,
    pub slippage_greylist_floor_pct: f64,
    pub max_top10_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitGateConfig {
    pub sol: ExitGateChainConfig,
    pub bsc: ExitGateChainConfig,
}

impl Default for ExitGateConfig {
    fn default() -> Self {
        Self {
            sol: ExitGateChainConfig {
                min_liquidity_native: 5.0,
                slippage_reject_pct: 5.0,
                slippage_greylist_floor_pct: 2.0,
                max_top10_pct: 35.0,
            },
            bsc: ExitGateChainConfig {
                min_liquidity_native: 10.0,
                slippage_reject_pct: 8.0,
                slippage_greylist_floor_pct: 3.0,
                max_top10_pct: 35.0,
            },
        }
    }
}

pub struct ExitGate;

impl ExitGate {
    pub fn evaluate(
        snapshot: &ChainSnapshot,
        chain: Chain,
        planned_position_native: Option<f64>,
        config: &ExitGateConfig,
    ) -> GateVerdict {
        let cfg = match chain {
            Chain::Sol => &config.sol,
            Chain::Bsc => &config.bsc,
        };
        let mut verdict = GateVerdict::pass();

        match snapshot.liquidity_native {
            None => verdict.push(Verdict::Greylist, "Liquidity (native) unknown"),
            Some(liq) if liq < cfg.min_liquidity_native => verdict.push(
                Verdict::Reject,
                format!("Liquidity {liq:.2} below minimum {:.2}", cfg.min_liquidity_native),
            ),
            Some(_) => {}
        }

        match snapshot.sell_slippage_at_20pct {
            None => verdict.push(Verdict::Greylist, "Slippage at 20% unknown"),
            Some(slippage) if slippage > cfg.slippage_reject_pct => verdict.push(
                Verdict::Reject,
                format!("Slippage {slippage:.1}% exceeds {:.1}%", cfg.slippage_reject_pct),
            ),
            Some(slippage) if slippage >= cfg.slippage_greylist_floor_pct => verdict.push(
                Verdict::Greylist,
                format!("Slippage {slippage:.1}% in cautionary range"),
            ),
            Some(_) => {}
        }

        match snapshot.top10_holder_percent {
            None => verdict.push(Verdict::Greylist, "Top-10 concentration unknown"),
            Some(pct) if pct > cfg.max_top10_pct => verdict.push(
                Verdict::Reject,
                format!("Top-10 concentration {pct:.1}% exceeds {:.1}%", cfg.max_top10_pct),
            ),
            Some(_) => {}
        }

        if matches!(chain, Chain::Bsc) {
            let sell_constraint_detected = snapshot.is_honeypot == Some(true) || snapshot.tax_mutable;
            let sell_constraint_unknown = snapshot.is_honeypot.is_none();
            if sell_constraint_detected {
                verdict.push(Verdict::Reject, "Sell constraint detected");
            } else if sell_constraint_unknown {
                verdict.push(Verdict::Greylist, "Sell constraints unknown");
            }
        }

        // Wash flag is evaluated last because "High combined with any
        // other yellow flag" depends on whether anything else already
        // downgraded this verdict.
        let any_other_yellow = verdict.verdict != Verdict::Pass;
        match snapshot.wash_flag {
            WashFlag::Unknown => verdict.push(Verdict::Greylist, "Wash flag unknown"),
            WashFlag::High if any_other_yellow => {
                verdict.push(Verdict::Reject, "Wash flag HIGH combined with other warning")
            }
            WashFlag::High => verdict.push(Verdict::Greylist, "Wash flag HIGH"),
            WashFlag::Low | WashFlag::Medium => {}
        }

        if planned_position_native.is_none() {
            verdict.push(Verdict::Greylist, "Planned position size not supplied");
        }

        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuthorityState, LpState, TokenFingerprint};

    fn exitable_snapshot(chain: Chain) -> ChainSnapshot {
        ChainSnapshot {
            fingerprint: TokenFingerprint::new(chain, "TOK"),
            snapshot_time: std::time::Instant::now(),
            price: Some(1.0),
            symbol: Some("TOK".into()),
            liquidity_native: Some(50.0),
            liquidity_usd: Some(50_000.0),
            market_cap: Some(500_000.0),
            top10_holder_percent: Some(15.0),
            top1_holder_percent: Some(6.0),
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

    #[test]
    fn missing_planned_position_forces_at_least_greylist() {
        let config = ExitGateConfig::default();
        let verdict = ExitGate::evaluate(&exitable_snapshot(Chain::Sol), Chain::Sol, None, &config);
        assert_ne!(verdict.verdict, Verdict::Pass);
    }

    #[test]
    fn clean_snapshot_with_planned_position_passes() {
        let config = ExitGateConfig::default();
        let verdict = ExitGate::evaluate(&exitable_snapshot(Chain::Sol), Chain::Sol, Some(1.0), &config);
        assert_eq!(verdict.verdict, Verdict::Pass);
    }

    #[test]
    fn high_slippage_rejects() {
        let config = ExitGateConfig::default();
        let mut snap = exitable_snapshot(Chain::Sol);
        snap.sell_slippage_at_20pct = Some(6.0);
        let verdict = ExitGate::evaluate(&snap, Chain::Sol, Some(1.0), &config);
        assert_eq!(verdict.verdict, Verdict::Reject);
    }

    #[test]
    fn wash_flag_high_alone_is_greylist_not_reject() {
        let config = ExitGateConfig::default();
        let mut snap = exitable_snapshot(Chain::Sol);
        snap.wash_flag = WashFlag::High;
        let verdict = ExitGate::evaluate(&snap, Chain::Sol, Some(1.0), &config);
        assert_eq!(verdict.verdict, Verdict::Greylist);
    }

    #[test]
    fn wash_flag_high_with_other_yellow_rejects() {
        let config = ExitGateConfig::default();
        let mut snap = exitable_snapshot(Chain::Sol);
        snap.wash_flag = WashFlag::High;
        snap.sell_slippage_at_20pct = Some(3.0); // cautionary range -> greylist
        let verdict = ExitGate::evaluate(&snap, Chain::Sol, Some(1.0), &config);
        assert_eq!(verdict.verdict, Verdict::Reject);
    }
}
