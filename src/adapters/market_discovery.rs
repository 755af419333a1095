// =============================================================================
// Market-data discovery adapter
// =============================================================================
//
// Primary evidence: description/social-link presence, raw market_cap and
// liquidity as reported by a market-aggregator listing (not an on-chain
// read — that's the Chain Snapshot Service's job). Useful as an early,
// cheap corroborating source before a snapshot is ever fetched.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::debug;

use crate::adapters::{send_or_drop, Shutdown, SourceAdapter};
use crate::model::{Chain, RawSignal, TokenFingerprint};

struct ListingEntry {
    fingerprint: TokenFingerprint,
    has_socials: bool,
    market_cap: f64,
    liquidity_usd: f64,
}

/// Polls a market-aggregator style listing (new-pair feeds, trending
/// boards) for raw, unvetted market data. Ships a deterministic synthetic
/// listing for shadow/demo mode; a real vendor integration plugs in behind
/// the same `SourceAdapter` trait.
pub struct MarketDiscoveryAdapter {
    source_id: String,
    listings: Vec<ListingEntry>,
    poll_interval: Duration,
}

impl MarketDiscoveryAdapter {
    pub fn new(source_id: impl Into<String>, chain: Chain, tokens: Vec<String>) -> Self {
        let listings = tokens
            .into_iter()
            .enumerate()
            .map(|(i, addr)| ListingEntry {
                fingerprint: TokenFingerprint::new(chain, addr),
                has_socials: i % 3 != 0,
                market_cap: 50_000.0 + (i as f64 * 4_137.0) % 2_000_000.0,
                liquidity_usd: 8_000.0 + (i as f64 * 913.0) % 150_000.0,
            })
            .collect();
        Self {
            source_id: source_id.into(),
            listings,
            poll_interval: Duration::from_secs(45),
        }
    }
}

#[async_trait]
impl SourceAdapter for MarketDiscoveryAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn run(&self, out: mpsc::Sender<RawSignal>, shutdown: Shutdown) {
        let mut tick = interval(self.poll_interval);
        loop {
            if shutdown.is_triggered() {
                return;
            }
            tick.tick().await;

            for entry in &self.listings {
                // A listing with no socials at all is weaker evidence but
                // still worth a bare mention — absence is handled by the
                // scorer, not filtered out here.
                let mut signal =
                    RawSignal::bare(self.source_id.clone(), entry.fingerprint.clone());
                signal.market_cap = Some(entry.market_cap);
                signal.liquidity_usd = Some(entry.liquidity_usd);
                if !entry.has_socials {
                    debug!(source_id = %self.source_id, token = %entry.fingerprint, "listing has no social links");
                }
                send_or_drop(&out, signal, &self.source_id).await;
            }
        }
    }
}
