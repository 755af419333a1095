// =============================================================================
// Hard Gate — safety / quality filter
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::model::{AuthorityState, Chain, ChainSnapshot, GateVerdict, LpState, Verdict};

/// Chain-specific thresholds. SOL and BSC numbers differ because their
/// liquidity regimes differ; BSC alone carries tax/honeypot/owner checks
/// since those concepts are specific to that chain's token-contract model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardGateChainConfig {
    pub min_liq_usd: f64,
    pub min_holders: u64,
    pub max_top10_pct: f64,
    pub max_top10_pct_bonding_curve: f64,
    pub max_slippage_bps: f64,
    pub max_tax_pct: f64,
}

impl Default for HardGateChainConfig {
    fn default() -> Self {
        Self {
            min_liq_usd: 10_000.0,
            min_holders: 50,
            max_top10_pct: 30.0,
            max_top10_pct_bonding_curve: 25.0,
            max_slippage_bps: 500.0,
            max_tax_pct: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardGateConfig {
    pub sol: HardGateChainConfig,
    pub bsc: HardGateChainConfig,
}

impl Default for HardGateConfig {
    fn default() -> Self {
        Self {
            sol: HardGateChainConfig::default(),
            bsc: HardGateChainConfig {
                min_liq_usd: 15_000.0,
                ..HardGateChainConfig::default()
            },
        }
    }
}

pub struct HardGate;

impl HardGate {
    pub fn evaluate(snapshot: &ChainSnapshot, chain: Chain, config: &HardGateConfig) -> GateVerdict {
        let cfg = match chain {
            Chain::Sol => &config.sol,
            Chain::Bsc => &config.bsc,
        };
        let mut verdict = GateVerdict::pass();
        let bonding = snapshot.is_bonding_curve;

        match snapshot.liquidity_usd {
            None => verdict.push(Verdict::Greylist, "Liquidity Unknown"),
            Some(liq) if liq < cfg.min_liq_usd => {
                verdict.push(Verdict::Reject, format!("Liquidity ${liq:.0} below minimum ${:.0}", cfg.min_liq_usd))
            }
            Some(_) => {}
        }

        match snapshot.holder_count {
            None => verdict.push(Verdict::Greylist, "Holder count unknown"),
            Some(h) if h < cfg.min_holders => {
                verdict.push(Verdict::Reject, format!("Holder count {h} below minimum {}", cfg.min_holders))
            }
            Some(_) => {}
        }

        let top10_limit = if bonding {
            cfg.max_top10_pct_bonding_curve
        } else {
            cfg.max_top10_pct
        };
        match snapshot.top10_holder_percent {
            None => verdict.push(Verdict::Greylist, "Top-10 concentration unknown"),
            Some(pct) if pct > top10_limit => verdict.push(
                Verdict::Reject,
                format!("Top-10 concentration {pct:.1}% exceeds {top10_limit:.1}%"),
            ),
            Some(_) => {}
        }

        match snapshot.sell_slippage_at_20pct {
            None => verdict.push(Verdict::Greylist, "Slippage unknown"),
            Some(slippage_pct) if slippage_pct * 100.0 > cfg.max_slippage_bps => verdict.push(
                Verdict::Reject,
                format!("Slippage {:.0}bps exceeds {:.0}bps", slippage_pct * 100.0, cfg.max_slippage_bps),
            ),
            Some(_) => {}
        }

        if matches!(chain, Chain::Bsc) {
            match (snapshot.buy_tax_pct, snapshot.sell_tax_pct) {
                (Some(buy), Some(sell)) => {
                    let total = buy + sell;
                    if total > cfg.max_tax_pct || snapshot.tax_mutable {
                        verdict.push(
                            Verdict::Reject,
                            format!("Tax {total:.1}% exceeds {:.1}% or is mutable", cfg.max_tax_pct),
                        );
                    }
                }
                _ => verdict.push(Verdict::Greylist, "Tax rate unknown"),
            }
        }

        if matches!(chain, Chain::Sol) && !bonding {
            match (snapshot.mint_authority, snapshot.freeze_authority) {
                (AuthorityState::Unknown, _) | (_, AuthorityState::Unknown) => {
                    verdict.push(Verdict::Greylist, "Mint/freeze authority unknown")
                }
                (AuthorityState::Enabled, _) | (_, AuthorityState::Enabled) => {
                    verdict.push(Verdict::Reject, "Mint or freeze authority still enabled")
                }
                _ => {}
            }
        }

        if !bonding {
            match snapshot.lp_state {
                LpState::Unknown => verdict.push(Verdict::Greylist, "LP state unknown"),
                LpState::Unlocked => verdict.push(Verdict::Reject, "LP unlocked"),
                LpState::Burned | LpState::Locked => {}
            }
        }

        if matches!(chain, Chain::Bsc) {
            match snapshot.is_honeypot {
                None => verdict.push(Verdict::Greylist, "Honeypot status unknown"),
                Some(true) => verdict.push(Verdict::Reject, "Honeypot indicator set"),
                Some(false) => {}
            }

            if !bonding {
                match snapshot.owner_is_safe_type {
                    None => verdict.push(Verdict::Greylist, "Owner type unknown"),
                    Some(false) => verdict.push(Verdict::Reject, "Owner not a recognized safe type"),
                    Some(true) => {}
                }
            }
        }

        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TokenFingerprint, WashFlag};

    fn clean_snapshot(chain: Chain) -> ChainSnapshot {
        ChainSnapshot {
            fingerprint: TokenFingerprint::new(chain, "TOK"),
            snapshot_time: std::time::Instant::now(),
            price: Some(1.0),
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
            buy_tax_pct: Some(2.0),
            sell_tax_pct: Some(2.0),
            tax_mutable: false,
            is_honeypot: Some(false),
            owner_is_safe_type: Some(true),
        }
    }

    #[test]
    fn clean_snapshot_passes() {
        let config = HardGateConfig::default();
        let verdict = HardGate::evaluate(&clean_snapshot(Chain::Sol), Chain::Sol, &config);
        assert_eq!(verdict.verdict, Verdict::Pass);
    }

    #[test]
    fn unknown_liquidity_never_passes() {
        let config = HardGateConfig::default();
        let mut snap = clean_snapshot(Chain::Sol);
        snap.liquidity_usd = None;
        let verdict = HardGate::evaluate(&snap, Chain::Sol, &config);
        assert_ne!(verdict.verdict, Verdict::Pass);
        assert!(verdict.reasons.iter().any(|r| r.contains("Liquidity Unknown")));
    }

    #[test]
    fn low_liquidity_rejects() {
        let config = HardGateConfig::default();
        let mut snap = clean_snapshot(Chain::Sol);
        snap.liquidity_usd = Some(500.0);
        let verdict = HardGate::evaluate(&snap, Chain::Sol, &config);
        assert_eq!(verdict.verdict, Verdict::Reject);
    }

    #[test]
    fn bonding_curve_bypasses_authority_and_lp_but_tightens_top10() {
        let config = HardGateConfig::default();
        let mut snap = clean_snapshot(Chain::Sol);
        snap.is_bonding_curve = true;
        snap.mint_authority = AuthorityState::Enabled;
        snap.lp_state = LpState::Unlocked;
        snap.top10_holder_percent = Some(24.0);
        let verdict = HardGate::evaluate(&snap, Chain::Sol, &config);
        assert_eq!(verdict.verdict, Verdict::Pass);

        snap.top10_holder_percent = Some(26.0);
        let verdict = HardGate::evaluate(&snap, Chain::Sol, &config);
        assert_eq!(verdict.verdict, Verdict::Reject);
    }

    #[test]
    fn bsc_honeypot_rejects() {
        let config = HardGateConfig::default();
        let mut snap = clean_snapshot(Chain::Bsc);
        snap.is_honeypot = Some(true);
        let verdict = HardGate::evaluate(&snap, Chain::Bsc, &config);
        assert_eq!(verdict.verdict, Verdict::Reject);
    }

    #[test]
    fn gate_monotonicity_dominant_snapshot_at_least_as_permissive() {
        // P2: if A strictly dominates B on every safety axis, HardGate(A)
        // must be at least as permissive as HardGate(B).
        let config = HardGateConfig::default();
        let better = clean_snapshot(Chain::Sol);
        let mut worse = clean_snapshot(Chain::Sol);
        worse.liquidity_usd = Some(worse.liquidity_usd.unwrap() - 40_000.0);
        worse.top10_holder_percent = Some(worse.top10_holder_percent.unwrap() + 15.0);

        let verdict_better = HardGate::evaluate(&better, Chain::Sol, &config);
        let verdict_worse = HardGate::evaluate(&worse, Chain::Sol, &config);

        let rank = |v: Verdict| match v {
            Verdict::Pass => 2,
            Verdict::Greylist => 1,
            Verdict::Reject => 0,
        };
        assert!(rank(verdict_better.verdict) >= rank(verdict_worse.verdict));
    }
}
