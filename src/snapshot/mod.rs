// =============================================================================
// Chain Snapshot Service — singleflight + rate-limited + TTL-cached fetch
// =============================================================================
//
// `GetSnapshot(chain, token, plannedPositionNative?) -> ChainSnapshot`.
// Concurrent callers for the same cache key share one in-flight fetch;
// calls to the underlying provider are throttled by a token-bucket rate
// limiter; results are cached for `CACHE_TTL`. This mirrors the
// lock-guarded-state-with-atomic-counters idiom of the rate-limit tracker
// this module is grounded on, extended with a TTL-keyed cache and a
// per-key async mutex for the singleflight property.

pub mod provider;
pub mod rate_limiter;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex as SyncMutex, RwLock};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::model::{Chain, ChainSnapshot, TokenFingerprint};
pub use provider::{ChainDataProvider, SyntheticChainDataProvider};
pub use rate_limiter::RateLimiter;

/// Cache entries are valid for this long.
pub const CACHE_TTL: Duration = Duration::from_secs(60);
/// Every external fetch has this long to complete before it degrades to
/// unknown rather than blocking the caller forever.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
/// Width of a planned-position bucket (native units) for cache keying —
/// two callers within the same bucket share a cached slippage quote.
const PLANNED_POSITION_BUCKET: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    fingerprint: TokenFingerprint,
    planned_bucket: Option<i64>,
}

fn bucket(planned_position_native: Option<f64>) -> Option<i64> {
    planned_position_native.map(|p| (p / PLANNED_POSITION_BUCKET).round() as i64)
}

struct CacheEntry {
    snapshot: ChainSnapshot,
    expires_at: Instant,
}

/// Singleflight + rate-limit + TTL-cache wrapper in front of a
/// `ChainDataProvider`. One instance is shared across the whole process;
/// callers never talk to the provider directly.
pub struct SnapshotService {
    provider: Arc<dyn ChainDataProvider>,
    cache: RwLock<HashMap<CacheKey, CacheEntry>>,
    in_flight: SyncMutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>,
    limiters: HashMap<Chain, RateLimiter>,
    cache_ttl: Duration,
}

impl SnapshotService {
    pub fn new(provider: Arc<dyn ChainDataProvider>) -> Self {
        Self::with_config(provider, CACHE_TTL, rate_limiter::DEFAULT_RPS, rate_limiter::DEFAULT_BURST)
    }

    /// Build with operator-tunable cache TTL and provider rate-limit
    /// parameters (spec §6: `CACHE_TTL, provider RPS + burst`). Both
    /// chains share the same provider rate/burst since the config surface
    /// doesn't distinguish them per-chain.
    pub fn with_config(provider: Arc<dyn ChainDataProvider>, cache_ttl: Duration, rps: f64, burst: f64) -> Self {
        let mut limiters = HashMap::new();
        limiters.insert(Chain::Sol, RateLimiter::new("sol-provider", rps, burst));
        limiters.insert(Chain::Bsc, RateLimiter::new("bsc-provider", rps, burst));
        Self {
            provider,
            cache: RwLock::new(HashMap::new()),
            in_flight: SyncMutex::new(HashMap::new()),
            limiters,
            cache_ttl,
        }
    }

    fn fresh_cached(&self, key: &CacheKey) -> Option<ChainSnapshot> {
        let cache = self.cache.read();
        cache.get(key).and_then(|entry| {
            if Instant::now() < entry.expires_at {
                Some(entry.snapshot.clone())
            } else {
                None
            }
        })
    }

    fn key_lock(&self, key: &CacheKey) -> Arc<AsyncMutex<()>> {
        self.in_flight
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Fetch a snapshot, sharing an in-flight fetch with any other caller
    /// requesting the same `(chain, token, planned-position bucket)` and
    /// serving from cache when still fresh. On provider failure or
    /// timeout, returns `ChainSnapshot::unknown` rather than an error —
    /// per the error taxonomy, a snapshot failure degrades a field to
    /// unknown, it never propagates.
    pub async fn get_snapshot(
        &self,
        fingerprint: &TokenFingerprint,
        planned_position_native: Option<f64>,
    ) -> ChainSnapshot {
        let key = CacheKey {
            fingerprint: fingerprint.clone(),
            planned_bucket: bucket(planned_position_native),
        };

        if let Some(snap) = self.fresh_cached(&key) {
            return snap;
        }

        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        // Re-check: another caller may have populated the cache while we
        // waited for the per-key lock (singleflight).
        if let Some(snap) = self.fresh_cached(&key) {
            return snap;
        }

        if let Some(limiter) = self.limiters.get(&fingerprint.chain) {
            limiter.acquire().await;
        }

        let fetch = self.provider.fetch(fingerprint, planned_position_native);
        let snapshot = match tokio::time::timeout(FETCH_TIMEOUT, fetch).await {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                warn!(token = %fingerprint, error = %e, "snapshot provider call failed — treating as unknown");
                ChainSnapshot::unknown(fingerprint.clone())
            }
            Err(_) => {
                warn!(token = %fingerprint, "snapshot fetch timed out — treating as unknown");
                ChainSnapshot::unknown(fingerprint.clone())
            }
        };

        debug!(token = %fingerprint, "snapshot fetched and cached");
        self.cache.write().insert(
            key.clone(),
            CacheEntry {
                snapshot: snapshot.clone(),
                expires_at: Instant::now() + self.cache_ttl,
            },
        );
        // Drop the stale in-flight lock handle so the map doesn't grow
        // without bound across a long process lifetime.
        self.in_flight.lock().remove(&key);

        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingProvider {
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl ChainDataProvider for CountingProvider {
        async fn fetch(
            &self,
            fingerprint: &TokenFingerprint,
            planned: Option<f64>,
        ) -> anyhow::Result<ChainSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            SyntheticChainDataProvider::new().fetch(fingerprint, planned).await
        }
    }

    #[tokio::test]
    async fn repeated_calls_within_ttl_hit_cache() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicU32::new(0),
        });
        let service = SnapshotService::new(provider.clone());
        let fp = TokenFingerprint::new(Chain::Sol, "CACHED");

        service.get_snapshot(&fp, None).await;
        service.get_snapshot(&fp, None).await;
        service.get_snapshot(&fp, None).await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicU32::new(0),
        });
        let service = Arc::new(SnapshotService::new(provider.clone()));
        let fp = TokenFingerprint::new(Chain::Bsc, "CONCURRENT");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            let fp = fp.clone();
            handles.push(tokio::spawn(async move { service.get_snapshot(&fp, None).await }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_planned_position_buckets_are_distinct_keys() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicU32::new(0),
        });
        let service = SnapshotService::new(provider.clone());
        let fp = TokenFingerprint::new(Chain::Sol, "BUCKETS");

        service.get_snapshot(&fp, Some(0.05)).await;
        service.get_snapshot(&fp, Some(5.0)).await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
