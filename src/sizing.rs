// =============================================================================
// Position Sizer
// =============================================================================
//
// `size(chain, tier, capital) -> (native_amount, usd_approx)`. Per-trade
// size is a tier-scaled fraction of the operator-configured max position
// percent of total capital; each chain's capital pool is tracked
// independently since SOL and BSC trade against unrelated native assets.

use serde::{Deserialize, Serialize};

use crate::model::{Chain, RatingTier};

pub const MAX_POSITION_PERCENT: f64 = 0.02;

/// Fraction of `max_position_percent` each tier is allowed to use: MAX
/// trades the full cap, NORMAL and SMALL scale it down so the three buy
/// tiers produce distinct sizes.
fn tier_multiplier(tier: RatingTier) -> f64 {
    match tier {
        RatingTier::Max => 1.0,
        RatingTier::Normal => 0.75,
        RatingTier::Small => 0.5,
        RatingTier::Watch | RatingTier::Reject => 0.0,
    }
}

/// Independent native-asset capital pools, one per chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalPools {
    pub sol_native: f64,
    pub bnb_native: f64,
}

impl CapitalPools {
    pub fn for_chain(&self, chain: Chain) -> f64 {
        match chain {
            Chain::Sol => self.sol_native,
            Chain::Bsc => self.bnb_native,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SizeResult {
    pub native_amount: f64,
    pub usd_approx: f64,
}

pub struct PositionSizer;

impl PositionSizer {
    /// `native_price_usd` converts the sized native amount to an
    /// approximate USD figure for audit/dashboard display only; sizing
    /// itself is computed entirely in native units. `max_position_percent`
    /// comes from the operator-facing runtime config (spec §6); MAX tier
    /// trades the full percentage, NORMAL and SMALL a scaled-down share of
    /// it.
    pub fn size(
        chain: Chain,
        tier: RatingTier,
        pools: &CapitalPools,
        native_price_usd: Option<f64>,
        max_position_percent: f64,
    ) -> SizeResult {
        let total_capital = pools.for_chain(chain);
        let native_amount = (total_capital * max_position_percent * tier_multiplier(tier)).max(0.0);
        let usd_approx = native_price_usd.map(|p| native_amount * p).unwrap_or(0.0);
        SizeResult { native_amount, usd_approx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pools() -> CapitalPools {
        CapitalPools {
            sol_native: 100.0,
            bnb_native: 50.0,
        }
    }

    #[test]
    fn max_tier_trades_the_full_cap() {
        let result = PositionSizer::size(Chain::Sol, RatingTier::Max, &pools(), None, MAX_POSITION_PERCENT);
        assert_eq!(result.native_amount, 100.0 * MAX_POSITION_PERCENT);
    }

    #[test]
    fn tiers_produce_distinct_sizes() {
        let max = PositionSizer::size(Chain::Sol, RatingTier::Max, &pools(), None, MAX_POSITION_PERCENT);
        let normal = PositionSizer::size(Chain::Sol, RatingTier::Normal, &pools(), None, MAX_POSITION_PERCENT);
        let small = PositionSizer::size(Chain::Sol, RatingTier::Small, &pools(), None, MAX_POSITION_PERCENT);
        assert!(max.native_amount > normal.native_amount);
        assert!(normal.native_amount > small.native_amount);
        assert_eq!(normal.native_amount, 100.0 * MAX_POSITION_PERCENT * 0.75);
        assert_eq!(small.native_amount, 100.0 * MAX_POSITION_PERCENT * 0.5);
    }

    #[test]
    fn watch_and_reject_size_to_zero() {
        assert_eq!(PositionSizer::size(Chain::Sol, RatingTier::Watch, &pools(), None, MAX_POSITION_PERCENT).native_amount, 0.0);
        assert_eq!(PositionSizer::size(Chain::Sol, RatingTier::Reject, &pools(), None, MAX_POSITION_PERCENT).native_amount, 0.0);
    }

    #[test]
    fn chains_use_independent_pools() {
        let sol = PositionSizer::size(Chain::Sol, RatingTier::Max, &pools(), None, MAX_POSITION_PERCENT);
        let bsc = PositionSizer::size(Chain::Bsc, RatingTier::Max, &pools(), None, MAX_POSITION_PERCENT);
        assert_ne!(sol.native_amount, bsc.native_amount);
    }

    #[test]
    fn usd_approx_uses_supplied_price() {
        let result = PositionSizer::size(Chain::Sol, RatingTier::Max, &pools(), Some(150.0), MAX_POSITION_PERCENT);
        assert_eq!(result.usd_approx, result.native_amount * 150.0);
    }

    #[test]
    fn operator_configured_max_position_percent_scales_all_tiers() {
        let tight = PositionSizer::size(Chain::Sol, RatingTier::Max, &pools(), None, 0.01);
        assert_eq!(tight.native_amount, 100.0 * 0.01);
    }
}
