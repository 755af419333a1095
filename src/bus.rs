// =============================================================================
// Signal Bus — fan-in over adapters, per-source / per-token dedup windows
// =============================================================================
//
// All adapters share one bounded `mpsc::Sender<RawSignal>` (`BUS_CAPACITY`);
// the bus is the single reader on the other end. It applies two
// deduplication windows before forwarding a signal on to the scoring worker
// pool:
//
//   - `SOURCE_DEDUP_WINDOW` (30 min): suppress repeated emissions for the
//     same `(chain, token, source_id)`.
//   - `GLOBAL_DEDUP_WINDOW` (1 min): suppress re-scoring bursts for the same
//     `(chain, token)` across *all* sources.
//
// Dedup state lives behind `parking_lot::RwLock`-guarded maps, following the
// same lock-guarded-state-with-snapshot-methods idiom used by the risk and
// position engines elsewhere in this crate. Counters are plain atomics in
// the style of the provider rate-limit tracker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::adapters::Shutdown;
use crate::model::{RawSignal, TokenFingerprint};

/// Capacity of the shared inbound channel every adapter writes into.
pub const BUS_CAPACITY: usize = 1024;

/// Suppress repeated emissions for the same `(chain, token, source_id)`.
pub const SOURCE_DEDUP_WINDOW: Duration = Duration::from_secs(30 * 60);
/// Suppress re-scoring bursts for the same `(chain, token)` across sources.
pub const GLOBAL_DEDUP_WINDOW: Duration = Duration::from_secs(60);

/// Same rolling window the scorer uses for its TG-Heat axis (spec
/// `HEAT_WINDOW`). Tracked independently of the aggregation coordinator
/// because a candidate's evidence is drained once it's scored, but the
/// position monitor needs a *live* heat reading long after that — the
/// "heat decay" warning in Phase 2 compares heat at entry to heat now.
const HEAT_WINDOW: Duration = Duration::from_secs(15 * 60);
const TG_HEAT_SATURATION: f64 = 5.0;
const TG_HEAT_WEIGHT: f64 = 15.0;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BusMetrics {
    pub received: u64,
    pub forwarded: u64,
    pub dropped_source_dedup: u64,
    pub dropped_global_dedup: u64,
}

struct DedupState {
    per_source: HashMap<(TokenFingerprint, String), Instant>,
    per_token: HashMap<TokenFingerprint, Instant>,
}

/// Distinct-source sightings per token, independent of the dedup windows
/// above — a source that gets deduped still counts toward heat, since
/// heat measures mention volume, not re-scoring eligibility.
struct HeatState {
    sightings: HashMap<TokenFingerprint, HashMap<String, Instant>>,
}

/// Fan-in point for every source adapter. Construct once, hand every
/// adapter a clone of `inbound()`, then run `bus.run(out, shutdown)` to
/// drive deduped signals onward to the scoring worker pool.
pub struct SignalBus {
    inbound_tx: mpsc::Sender<RawSignal>,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<RawSignal>>,
    dedup: RwLock<DedupState>,
    heat: RwLock<HeatState>,
    received: AtomicU64,
    forwarded: AtomicU64,
    dropped_source_dedup: AtomicU64,
    dropped_global_dedup: AtomicU64,
}

impl SignalBus {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(BUS_CAPACITY);
        Self {
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            dedup: RwLock::new(DedupState {
                per_source: HashMap::new(),
                per_token: HashMap::new(),
            }),
            heat: RwLock::new(HeatState {
                sightings: HashMap::new(),
            }),
            received: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            dropped_source_dedup: AtomicU64::new(0),
            dropped_global_dedup: AtomicU64::new(0),
        }
    }

    /// Sender handle given to every adapter task. Cloning is cheap — it's
    /// the same underlying bounded channel for all adapters.
    pub fn inbound(&self) -> mpsc::Sender<RawSignal> {
        self.inbound_tx.clone()
    }

    pub fn metrics(&self) -> BusMetrics {
        BusMetrics {
            received: self.received.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            dropped_source_dedup: self.dropped_source_dedup.load(Ordering::Relaxed),
            dropped_global_dedup: self.dropped_global_dedup.load(Ordering::Relaxed),
        }
    }

    /// `true` if the signal should be forwarded; records the sighting
    /// either way so window math is based on the most recent attempt, not
    /// just the first.
    fn check_and_record(&self, signal: &RawSignal) -> Result<(), &'static str> {
        let now = Instant::now();
        let mut dedup = self.dedup.write();

        let source_key = (signal.fingerprint.clone(), signal.source_id.clone());
        if let Some(last) = dedup.per_source.get(&source_key) {
            if now.duration_since(*last) < SOURCE_DEDUP_WINDOW {
                return Err("source_dedup");
            }
        }
        if let Some(last) = dedup.per_token.get(&signal.fingerprint) {
            if now.duration_since(*last) < GLOBAL_DEDUP_WINDOW {
                return Err("global_dedup");
            }
        }

        dedup.per_source.insert(source_key, now);
        dedup.per_token.insert(signal.fingerprint.clone(), now);
        Ok(())
    }

    /// Record a sighting for the live heat axis. Called for every received
    /// signal regardless of dedup outcome.
    fn record_heat(&self, signal: &RawSignal) {
        let now = Instant::now();
        let mut heat = self.heat.write();
        heat.sightings
            .entry(signal.fingerprint.clone())
            .or_default()
            .insert(signal.source_id.clone(), now);
    }

    /// The live TG-Heat axis for a token, scaled the same way the scorer
    /// scales it (distinct sources within `HEAT_WINDOW`, saturating at
    /// `TG_HEAT_SATURATION`, weighted to the 0-15 axis range) so it's
    /// directly comparable to `Position::entry_snapshot.heat`. `None` if
    /// the token has never been sighted on this bus instance.
    pub fn current_heat_axis(&self, fingerprint: &TokenFingerprint) -> Option<f64> {
        let now = Instant::now();
        let heat = self.heat.read();
        let sources = heat.sightings.get(fingerprint)?;
        let live = sources
            .values()
            .filter(|&&seen| now.duration_since(seen) < HEAT_WINDOW)
            .count();
        Some((live as f64 / TG_HEAT_SATURATION).min(1.0) * TG_HEAT_WEIGHT)
    }

    fn gc_heat(&self) {
        let now = Instant::now();
        let mut heat = self.heat.write();
        heat.sightings.retain(|_, sources| {
            sources.retain(|_, seen| now.duration_since(*seen) < HEAT_WINDOW);
            !sources.is_empty()
        });
    }

    /// Drop dedup entries older than the widest window in use; called
    /// periodically from `run` so the maps don't grow without bound across
    /// a long-running process.
    fn gc(&self) {
        let now = Instant::now();
        let mut dedup = self.dedup.write();
        dedup
            .per_source
            .retain(|_, last| now.duration_since(*last) < SOURCE_DEDUP_WINDOW);
        dedup
            .per_token
            .retain(|_, last| now.duration_since(*last) < GLOBAL_DEDUP_WINDOW);
    }

    /// Drive the bus until `shutdown` fires or every adapter sender has
    /// been dropped. Deduped signals are forwarded onto `out`.
    pub async fn run(&self, out: mpsc::Sender<RawSignal>, shutdown: Shutdown) {
        let mut rx = self.inbound_rx.lock().await;
        let mut gc_tick = tokio::time::interval(SOURCE_DEDUP_WINDOW / 4);

        loop {
            if shutdown.is_triggered() {
                return;
            }
            tokio::select! {
                biased;
                signal = rx.recv() => {
                    let Some(signal) = signal else { return };
                    self.received.fetch_add(1, Ordering::Relaxed);
                    self.record_heat(&signal);
                    match self.check_and_record(&signal) {
                        Ok(()) => {
                            self.forwarded.fetch_add(1, Ordering::Relaxed);
                            if out.send(signal).await.is_err() {
                                return;
                            }
                        }
                        Err("source_dedup") => {
                            self.dropped_source_dedup.fetch_add(1, Ordering::Relaxed);
                            debug!(token = %signal.fingerprint, source_id = %signal.source_id, "dropped: source dedup window");
                        }
                        Err(_) => {
                            self.dropped_global_dedup.fetch_add(1, Ordering::Relaxed);
                            debug!(token = %signal.fingerprint, "dropped: global dedup window");
                        }
                    }
                }
                _ = gc_tick.tick() => {
                    self.gc();
                    self.gc_heat();
                }
            }
        }
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Chain;

    fn signal(source: &str, addr: &str) -> RawSignal {
        RawSignal::bare(source, TokenFingerprint::new(Chain::Sol, addr))
    }

    #[test]
    fn first_signal_always_forwarded() {
        let bus = SignalBus::new();
        assert!(bus.check_and_record(&signal("chan_a", "TOKEN1")).is_ok());
    }

    #[test]
    fn same_source_same_token_deduped_within_window() {
        let bus = SignalBus::new();
        assert!(bus.check_and_record(&signal("chan_a", "TOKEN1")).is_ok());
        assert_eq!(
            bus.check_and_record(&signal("chan_a", "TOKEN1")),
            Err("source_dedup")
        );
    }

    #[test]
    fn different_source_same_token_deduped_by_global_window() {
        let bus = SignalBus::new();
        assert!(bus.check_and_record(&signal("chan_a", "TOKEN1")).is_ok());
        // Different source but same token within GLOBAL_DEDUP_WINDOW.
        assert_eq!(
            bus.check_and_record(&signal("chan_b", "TOKEN1")),
            Err("global_dedup")
        );
    }

    #[test]
    fn different_tokens_independent() {
        let bus = SignalBus::new();
        assert!(bus.check_and_record(&signal("chan_a", "TOKEN1")).is_ok());
        assert!(bus.check_and_record(&signal("chan_a", "TOKEN2")).is_ok());
    }

    #[test]
    fn heat_axis_unknown_before_any_sighting() {
        let bus = SignalBus::new();
        let fp = TokenFingerprint::new(Chain::Sol, "TOKEN1");
        assert_eq!(bus.current_heat_axis(&fp), None);
    }

    #[test]
    fn heat_axis_tracks_distinct_sources_regardless_of_dedup() {
        let bus = SignalBus::new();
        let s1 = signal("chan_a", "TOKEN1");
        let fp = s1.fingerprint.clone();
        bus.record_heat(&s1);
        bus.record_heat(&signal("chan_a", "TOKEN1")); // same source, still 1 distinct
        bus.record_heat(&signal("chan_b", "TOKEN1"));
        // 2 distinct sources / saturation(5) * weight(15) = 6.0
        assert_eq!(bus.current_heat_axis(&fp), Some(6.0));
    }
}
