// =============================================================================
// ChainDataProvider — collaborator boundary for on-chain data vendors
// =============================================================================
//
// The actual RPC/indexer calls (liquidity pool reads, holder scans,
// authority lookups, simulated sell quotes) are vendor- and chain-specific
// plumbing out of scope for this spec. `ChainDataProvider` is the seam a
// real integration plugs into; `SyntheticChainDataProvider` is a
// deterministic stand-in used in shadow/demo mode and in tests.

use async_trait::async_trait;

use crate::model::{AuthorityState, Chain, ChainSnapshot, LpState, TokenFingerprint, WashFlag};

#[async_trait]
pub trait ChainDataProvider: Send + Sync {
    /// Fetch everything the service can determine about a token in one
    /// call. Per-field failure is modeled by the provider itself leaving
    /// that field `None` — never a fabricated zero.
    async fn fetch(
        &self,
        fingerprint: &TokenFingerprint,
        planned_position_native: Option<f64>,
    ) -> anyhow::Result<ChainSnapshot>;
}

/// Deterministic synthetic provider. Token addresses are hashed to derive
/// stable-but-varied field values so the same token always produces the
/// same "on-chain" picture within a test run, while different tokens look
/// different from each other.
pub struct SyntheticChainDataProvider {
    /// Addresses in this set simulate a provider that has no data at all
    /// for the token (every field unknown) — used to exercise the
    /// unknown-is-not-pass gate behavior.
    pub blind_spots: Vec<String>,
}

impl SyntheticChainDataProvider {
    pub fn new() -> Self {
        Self {
            blind_spots: Vec::new(),
        }
    }

    fn seed(addr: &str) -> u64 {
        let mut h: u64 = 1469598103934665603;
        for b in addr.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(1099511628211);
        }
        h
    }
}

impl Default for SyntheticChainDataProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainDataProvider for SyntheticChainDataProvider {
    async fn fetch(
        &self,
        fingerprint: &TokenFingerprint,
        planned_position_native: Option<f64>,
    ) -> anyhow::Result<ChainSnapshot> {
        if self.blind_spots.contains(&fingerprint.token_address) {
            return Ok(ChainSnapshot::unknown(fingerprint.clone()));
        }

        let seed = Self::seed(&fingerprint.token_address);
        let pct = |n: u64| (seed % n) as f64 / n as f64;

        let is_bonding_curve = seed % 11 == 0;
        let liquidity_usd = 5_000.0 + pct(97) * 500_000.0;
        let liquidity_native = match fingerprint.chain {
            Chain::Sol => liquidity_usd / 140.0,
            Chain::Bsc => liquidity_usd / 550.0,
        };
        let top10 = 8.0 + pct(53) * (if is_bonding_curve { 20.0 } else { 45.0 });
        let top1 = (top10 * 0.4).min(30.0);
        let holders = 40 + (seed % 4000);

        let sell_slippage_at_20pct = planned_position_native.map(|planned| {
            let size_pressure = (planned * 0.20) / liquidity_native.max(0.0001);
            (size_pressure * 35.0).min(60.0)
        });

        let wash_flag = match seed % 10 {
            0 => WashFlag::High,
            1..=2 => WashFlag::Medium,
            _ => WashFlag::Low,
        };

        Ok(ChainSnapshot {
            fingerprint: fingerprint.clone(),
            snapshot_time: std::time::Instant::now(),
            price: Some(0.001 + pct(991) * 5.0),
            symbol: Some(format!("TKN{}", seed % 1000)),
            liquidity_native: Some(liquidity_native),
            liquidity_usd: Some(liquidity_usd),
            market_cap: Some(liquidity_usd * (3.0 + pct(7))),
            top10_holder_percent: Some(top10),
            top1_holder_percent: Some(top1),
            holder_count: Some(holders),
            mint_authority: if is_bonding_curve || seed % 3 != 0 {
                AuthorityState::Disabled
            } else {
                AuthorityState::Enabled
            },
            freeze_authority: if is_bonding_curve || seed % 4 != 0 {
                AuthorityState::Disabled
            } else {
                AuthorityState::Enabled
            },
            lp_state: if is_bonding_curve {
                LpState::Unlocked
            } else if seed % 5 == 0 {
                LpState::Unlocked
            } else if seed % 2 == 0 {
                LpState::Burned
            } else {
                LpState::Locked
            },
            sell_slippage_at_20pct,
            wash_flag,
            is_bonding_curve,
            bonding_curve_progress: if is_bonding_curve {
                Some(pct(101))
            } else {
                None
            },
            buy_tax_pct: Some(pct(13) * 12.0),
            sell_tax_pct: Some(pct(17) * 12.0),
            tax_mutable: seed % 13 == 0,
            is_honeypot: Some(seed % 37 == 0),
            owner_is_safe_type: Some(seed % 6 != 0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blind_spot_yields_all_unknown() {
        let provider = SyntheticChainDataProvider {
            blind_spots: vec!["BLIND".to_string()],
        };
        let fp = TokenFingerprint::new(Chain::Sol, "BLIND");
        let snap = provider.fetch(&fp, None).await.unwrap();
        assert!(snap.liquidity_usd.is_none());
        assert!(snap.price.is_none());
    }

    #[tokio::test]
    async fn same_token_yields_stable_values() {
        let provider = SyntheticChainDataProvider::new();
        let fp = TokenFingerprint::new(Chain::Sol, "STABLE_TOKEN");
        let a = provider.fetch(&fp, Some(1.0)).await.unwrap();
        let b = provider.fetch(&fp, Some(1.0)).await.unwrap();
        assert_eq!(a.liquidity_usd, b.liquidity_usd);
        assert_eq!(a.top10_holder_percent, b.top10_holder_percent);
    }

    #[tokio::test]
    async fn slippage_unknown_without_planned_position() {
        let provider = SyntheticChainDataProvider::new();
        let fp = TokenFingerprint::new(Chain::Bsc, "NOPLAN");
        let snap = provider.fetch(&fp, None).await.unwrap();
        assert!(snap.sell_slippage_at_20pct.is_none());
    }
}
