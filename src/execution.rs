// =============================================================================
// Executor — abstract buy/sell, shadow-mode synthetic fills
// =============================================================================
//
// Grounded on the legacy execution engine's demo-vs-live dispatch (a single
// entry point that either simulates locally or forwards to a real client)
// and the exchange client's request/response shape, generalized from a
// single hardcoded venue to an abstract `VenueClient` trait — the wire
// protocol for any live venue is out of scope here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::model::Chain;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyResult {
    pub success: bool,
    pub trade_id: String,
    pub fill_price: Option<f64>,
    pub tokens_received: Option<f64>,
    pub tx_ref: Option<String>,
    pub is_simulated: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellResult {
    pub success: bool,
    pub fill_price: Option<f64>,
    pub amount_native: Option<f64>,
    pub tx_ref: Option<String>,
    pub is_simulated: bool,
    pub error: Option<String>,
}

/// A single venue fill, as reported by a live client. Distinct from
/// `BuyResult`/`SellResult` because a venue doesn't know about
/// simulation — the Executor wraps this with `is_simulated = false`.
pub struct VenueFill {
    pub fill_price: Option<f64>,
    pub tokens_received: Option<f64>,
    pub amount_native: Option<f64>,
    pub tx_ref: String,
}

/// A connection to a real trading venue. No concrete implementation ships
/// here — wiring a venue's signed-request protocol is out of scope.
#[async_trait]
pub trait VenueClient: Send + Sync {
    async fn buy(&self, chain: Chain, token: &str, size_native: f64) -> anyhow::Result<VenueFill>;
    async fn sell(&self, chain: Chain, token: &str, percent_of_remaining: f64) -> anyhow::Result<VenueFill>;
}

/// Dispatches buy/sell either to a synthetic shadow fill or to a live
/// `VenueClient`. Downstream code treats both outcomes identically except
/// for the `is_simulated` flag carried on every result.
pub struct Executor {
    shadow_mode: bool,
    venue: Option<Arc<dyn VenueClient>>,
    nonce: AtomicU64,
}

impl Executor {
    pub fn shadow() -> Self {
        Self {
            shadow_mode: true,
            venue: None,
            nonce: AtomicU64::new(0),
        }
    }

    pub fn live(venue: Arc<dyn VenueClient>) -> Self {
        Self {
            shadow_mode: false,
            venue: Some(venue),
            nonce: AtomicU64::new(0),
        }
    }

    pub fn is_shadow(&self) -> bool {
        self.shadow_mode
    }

    fn next_tx_ref(&self) -> String {
        let n = self.nonce.fetch_add(1, Ordering::SeqCst);
        format!("SHADOW_{n}")
    }

    pub async fn buy(&self, chain: Chain, token: &str, size_native: f64) -> BuyResult {
        let trade_id = Uuid::new_v4().to_string();

        if self.shadow_mode {
            let tx_ref = self.next_tx_ref();
            info!(chain = %chain, token, size_native, tx_ref = %tx_ref, "shadow buy filled");
            return BuyResult {
                success: true,
                trade_id,
                fill_price: Some(1.0),
                tokens_received: Some(size_native),
                tx_ref: Some(tx_ref),
                is_simulated: true,
                error: None,
            };
        }

        let venue = self.venue.as_ref().expect("live executor must carry a venue client");
        match venue.buy(chain, token, size_native).await {
            Ok(fill) => {
                info!(chain = %chain, token, size_native, tx_ref = %fill.tx_ref, "live buy filled");
                BuyResult {
                    success: true,
                    trade_id,
                    fill_price: fill.fill_price,
                    tokens_received: fill.tokens_received,
                    tx_ref: Some(fill.tx_ref),
                    is_simulated: false,
                    error: None,
                }
            }
            Err(e) => {
                warn!(chain = %chain, token, error = %e, "live buy failed");
                BuyResult {
                    success: false,
                    trade_id,
                    fill_price: None,
                    tokens_received: None,
                    tx_ref: None,
                    is_simulated: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub async fn sell(&self, chain: Chain, token: &str, percent_of_remaining: f64) -> SellResult {
        if self.shadow_mode {
            let tx_ref = self.next_tx_ref();
            info!(chain = %chain, token, percent_of_remaining, tx_ref = %tx_ref, "shadow sell filled");
            return SellResult {
                success: true,
                fill_price: Some(1.0),
                amount_native: Some(percent_of_remaining / 100.0),
                tx_ref: Some(tx_ref),
                is_simulated: true,
                error: None,
            };
        }

        let venue = self.venue.as_ref().expect("live executor must carry a venue client");
        match venue.sell(chain, token, percent_of_remaining).await {
            Ok(fill) => {
                info!(chain = %chain, token, percent_of_remaining, tx_ref = %fill.tx_ref, "live sell filled");
                SellResult {
                    success: true,
                    fill_price: fill.fill_price,
                    amount_native: fill.amount_native,
                    tx_ref: Some(fill.tx_ref),
                    is_simulated: false,
                    error: None,
                }
            }
            Err(e) => {
                warn!(chain = %chain, token, error = %e, "live sell failed");
                SellResult {
                    success: false,
                    fill_price: None,
                    amount_native: None,
                    tx_ref: None,
                    is_simulated: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shadow_buy_always_succeeds_with_synthetic_tx_ref() {
        let executor = Executor::shadow();
        let result = executor.buy(Chain::Sol, "TOK", 1.0).await;
        assert!(result.success);
        assert!(result.is_simulated);
        assert!(result.tx_ref.unwrap().starts_with("SHADOW_"));
    }

    #[tokio::test]
    async fn shadow_sell_always_succeeds_with_synthetic_tx_ref() {
        let executor = Executor::shadow();
        let result = executor.sell(Chain::Sol, "TOK", 50.0).await;
        assert!(result.success);
        assert!(result.is_simulated);
        assert!(result.tx_ref.unwrap().starts_with("SHADOW_"));
    }

    #[tokio::test]
    async fn shadow_tx_refs_are_distinct_across_calls() {
        let executor = Executor::shadow();
        let a = executor.buy(Chain::Sol, "TOK", 1.0).await;
        let b = executor.buy(Chain::Sol, "TOK", 1.0).await;
        assert_ne!(a.tx_ref, b.tx_ref);
    }

    struct FailingVenue;

    #[async_trait]
    impl VenueClient for FailingVenue {
        async fn buy(&self, _chain: Chain, _token: &str, _size: f64) -> anyhow::Result<VenueFill> {
            Err(anyhow::anyhow!("venue unreachable"))
        }
        async fn sell(&self, _chain: Chain, _token: &str, _pct: f64) -> anyhow::Result<VenueFill> {
            Err(anyhow::anyhow!("venue unreachable"))
        }
    }

    #[tokio::test]
    async fn live_failure_surfaces_as_unsuccessful_result_not_a_panic() {
        let executor = Executor::live(Arc::new(FailingVenue));
        let result = executor.buy(Chain::Sol, "TOK", 1.0).await;
        assert!(!result.success);
        assert!(!result.is_simulated);
        assert!(result.error.is_some());
    }
}
