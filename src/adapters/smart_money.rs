// =============================================================================
// Smart-money aggregator adapter
// =============================================================================
//
// Primary evidence: smart_money_online, smart_money_total, token_tier,
// ai_score, ai_narrative_type. Modeled against a `VendorClient` trait so a
// real aggregator integration is a drop-in swap; ships a synthetic client
// for shadow/demo mode.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{debug, warn};

use crate::adapters::{send_or_drop, Shutdown, SourceAdapter};
use crate::model::{Chain, RawSignal, TokenFingerprint, TokenTier};

/// Narrow collaborator boundary for the actual vendor call. The wire/auth
/// details of a concrete aggregator are out of scope; this trait is the
/// seam a real implementation would plug into.
#[async_trait]
pub trait SmartMoneyClient: Send + Sync {
    async fn poll(&self) -> anyhow::Result<Vec<SmartMoneyObservation>>;
}

pub struct SmartMoneyObservation {
    pub fingerprint: TokenFingerprint,
    pub online: u32,
    pub total: u32,
    pub tier: TokenTier,
    pub ai_score: f64,
    pub ai_narrative_type: String,
}

/// Deterministic synthetic client used in shadow/demo mode and tests.
pub struct SyntheticSmartMoneyClient {
    pool: Vec<(TokenFingerprint, u32, u32, TokenTier, f64, &'static str)>,
}

impl SyntheticSmartMoneyClient {
    pub fn new(chain: Chain, tokens: Vec<String>) -> Self {
        let pool = tokens
            .into_iter()
            .enumerate()
            .map(|(i, addr)| {
                let tier = match i % 4 {
                    0 => TokenTier::Gold,
                    1 => TokenTier::Silver,
                    2 => TokenTier::Bronze,
                    _ => TokenTier::Unknown,
                };
                (
                    TokenFingerprint::new(chain, addr),
                    3 + (i as u32 % 5),
                    10 + (i as u32 % 20),
                    tier,
                    5.0 + (i % 5) as f64,
                    "meme",
                )
            })
            .collect();
        Self { pool }
    }
}

#[async_trait]
impl SmartMoneyClient for SyntheticSmartMoneyClient {
    async fn poll(&self) -> anyhow::Result<Vec<SmartMoneyObservation>> {
        Ok(self
            .pool
            .iter()
            .map(|(fp, online, total, tier, score, narrative)| SmartMoneyObservation {
                fingerprint: fp.clone(),
                online: *online,
                total: *total,
                tier: *tier,
                ai_score: *score,
                ai_narrative_type: narrative.to_string(),
            })
            .collect())
    }
}

pub struct SmartMoneyAggregatorAdapter {
    source_id: String,
    client: Box<dyn SmartMoneyClient>,
    poll_interval: Duration,
}

impl SmartMoneyAggregatorAdapter {
    pub fn new(source_id: impl Into<String>, client: Box<dyn SmartMoneyClient>) -> Self {
        Self {
            source_id: source_id.into(),
            client,
            poll_interval: Duration::from_secs(15),
        }
    }
}

#[async_trait]
impl SourceAdapter for SmartMoneyAggregatorAdapter {
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

            match self.client.poll().await {
                Ok(observations) => {
                    for obs in observations {
                        let mut signal = RawSignal::bare(self.source_id.clone(), obs.fingerprint);
                        signal.smart_money_online = Some(obs.online);
                        signal.smart_money_total = Some(obs.total);
                        signal.token_tier = Some(obs.tier);
                        signal.ai_score = Some(obs.ai_score);
                        signal.ai_narrative_type = Some(obs.ai_narrative_type);
                        send_or_drop(&out, signal, &self.source_id).await;
                    }
                }
                Err(e) => {
                    // TransientExternal per the error taxonomy: swallow and
                    // keep the sequence alive.
                    debug!(source_id = %self.source_id, error = %e, "smart-money poll failed, retrying next tick");
                    warn!(source_id = %self.source_id, "smart-money aggregator poll error");
                }
            }
        }
    }
}
