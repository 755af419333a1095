// =============================================================================
// Cross Validator / Composite Scorer
// =============================================================================
//
// Two halves:
//
//   - `AggregationCoordinator` — the per-candidate state machine
//     (`observed -> aggregating -> [timer fires] -> scored`). A single
//     coordinator loop owns a timer-wheel-equivalent (a deadline map
//     checked on a periodic tick) rather than spawning one coroutine per
//     candidate, per the design note to prefer one coordinator loop over
//     per-candidate long-running tasks.
//   - `Scorer` — the stateless weighted-sum + decay math, grounded on the
//     `WeightedScorer::score` (weight × confidence × direction summed
//     across signals) and `SignalDecayManager` (half-life exponential
//     decay, `exp(-age * ln2 / half_life)`) pair, adapted to the spec's
//     fixed axis weights and `exp(-age / tau)` decay with a floor.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::adapters::Shutdown;
use crate::model::{CompositeScore, RatingTier, RawSignal, ScoreBreakdown, TokenFingerprint, Verdict};

pub const AGGREGATION_WINDOW: Duration = Duration::from_secs(10 * 60);
pub const MAX_EXTEND: Duration = Duration::from_secs(5 * 60);
pub const HEAT_WINDOW: Duration = Duration::from_secs(15 * 60);
pub const SIGNAL_EXPIRY: Duration = Duration::from_secs(30 * 60);
pub const SCORE_TIMEOUT: Duration = Duration::from_secs(5);
const DECAY_TAU_SECS: f64 = 5.0 * 60.0;
const DECAY_FLOOR: f64 = 0.1;

const SMART_MONEY_WEIGHT: f64 = 40.0;
const AI_NARRATIVE_WEIGHT: f64 = 25.0;
const TG_HEAT_WEIGHT: f64 = 15.0;
const MOMENTUM_WEIGHT: f64 = 10.0;
const SAFETY_WEIGHT: f64 = 10.0;

/// Smart-money online count normalized to 1.0 at this many wallets.
const SMART_MONEY_SATURATION: f64 = 20.0;
/// Distinct-source count normalized to 1.0 at this many sources.
const TG_HEAT_SATURATION: f64 = 5.0;
/// Price-change-% magnitude normalized to 1.0.
const MOMENTUM_SATURATION_PCT: f64 = 50.0;
/// A smart-money-online count at or above this short-circuits aggregation
/// early ("final" evidence per spec's state machine).
const SMART_MONEY_FINAL_THRESHOLD: u32 = 5;

fn decay_factor(age: Duration) -> f64 {
    if age >= SIGNAL_EXPIRY {
        return 0.0;
    }
    (-age.as_secs_f64() / DECAY_TAU_SECS).exp().max(DECAY_FLOOR)
}

// ---------------------------------------------------------------------------
// Aggregation coordinator
// ---------------------------------------------------------------------------

struct Candidate {
    first_seen_instant: Instant,
    first_seen_utc: DateTime<Utc>,
    window_deadline: Instant,
    evidence: Vec<RawSignal>,
    finalized_early: bool,
}

/// A candidate ready to be scored: its pooled evidence plus when it was
/// first observed (used for tie-breaking and decay anchoring).
pub struct ReadyCandidate {
    pub fingerprint: TokenFingerprint,
    pub evidence: Vec<RawSignal>,
    pub first_seen: DateTime<Utc>,
}

/// Owns per-candidate aggregation windows. One coordinator instance serves
/// the whole process; candidates never get their own task.
pub struct AggregationCoordinator {
    candidates: RwLock<HashMap<TokenFingerprint, Candidate>>,
}

impl AggregationCoordinator {
    pub fn new() -> Self {
        Self {
            candidates: RwLock::new(HashMap::new()),
        }
    }

    /// Pool a new piece of evidence, moving the candidate `observed ->
    /// aggregating` if it's new, or extending (up to `MAX_EXTEND`) the
    /// window if it's already aggregating.
    fn ingest(&self, signal: RawSignal) {
        let now = Instant::now();
        let mut candidates = self.candidates.write();
        let finalizes_early = signal
            .smart_money_online
            .map(|n| n >= SMART_MONEY_FINAL_THRESHOLD)
            .unwrap_or(false);

        let entry = candidates
            .entry(signal.fingerprint.clone())
            .or_insert_with(|| Candidate {
                first_seen_instant: now,
                first_seen_utc: signal.timestamp,
                window_deadline: now + AGGREGATION_WINDOW,
                evidence: Vec::new(),
                finalized_early: false,
            });

        let hard_deadline = entry.first_seen_instant + AGGREGATION_WINDOW + MAX_EXTEND;
        entry.window_deadline = (now + AGGREGATION_WINDOW).min(hard_deadline);
        entry.evidence.push(signal);
        if finalizes_early {
            entry.finalized_early = true;
        }
    }

    /// Pull out every candidate whose window has elapsed (or which
    /// received "final" evidence), removing them from the aggregation map.
    fn drain_due(&self, now: Instant) -> Vec<ReadyCandidate> {
        let mut candidates = self.candidates.write();
        let due: Vec<TokenFingerprint> = candidates
            .iter()
            .filter(|(_, c)| c.finalized_early || now >= c.window_deadline)
            .map(|(fp, _)| fp.clone())
            .collect();

        due.into_iter()
            .filter_map(|fp| {
                candidates.remove(&fp).map(|c| ReadyCandidate {
                    fingerprint: fp,
                    evidence: c.evidence,
                    first_seen: c.first_seen_utc,
                })
            })
            .collect()
    }

    /// Drive the coordinator until `shutdown` fires: pool incoming
    /// signals, and on each tick hand off any candidate whose window has
    /// elapsed to `ready`.
    pub async fn run(
        &self,
        mut signals: mpsc::Receiver<RawSignal>,
        ready: mpsc::Sender<ReadyCandidate>,
        shutdown: Shutdown,
    ) {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        loop {
            if shutdown.is_triggered() {
                return;
            }
            tokio::select! {
                biased;
                signal = signals.recv() => {
                    match signal {
                        Some(signal) => self.ingest(signal),
                        None => return,
                    }
                }
                _ = tick.tick() => {
                    for candidate in self.drain_due(Instant::now()) {
                        debug!(token = %candidate.fingerprint, evidence_count = candidate.evidence.len(), "candidate window elapsed, scoring");
                        if ready.send(candidate).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

impl Default for AggregationCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

pub struct Scorer;

impl Scorer {
    pub fn score_to_tier(total: f64) -> RatingTier {
        if total >= 80.0 {
            RatingTier::Max
        } else if total >= 65.0 {
            RatingTier::Normal
        } else if total >= 50.0 {
            RatingTier::Small
        } else if total >= 35.0 {
            RatingTier::Watch
        } else {
            RatingTier::Reject
        }
    }

    fn safety_value(hard_gate: Verdict) -> f64 {
        match hard_gate {
            Verdict::Pass => 10.0,
            Verdict::Greylist => 5.0,
            Verdict::Reject => 0.0,
        }
    }

    /// Combine pooled evidence plus the Hard Gate's verdict into a
    /// `CompositeScore`. `now` is the evaluation instant; each evidence
    /// item's age is measured against it for decay purposes.
    pub fn score(
        fingerprint: &TokenFingerprint,
        evidence: &[RawSignal],
        first_seen: DateTime<Utc>,
        hard_gate: Verdict,
        now: DateTime<Utc>,
    ) -> CompositeScore {
        let mut smart_money_best = 0.0_f64;
        let mut ai_narrative_best = 0.0_f64;
        let mut momentum_best = 0.0_f64;
        let mut distinct_sources = std::collections::HashSet::new();

        for signal in evidence {
            distinct_sources.insert(signal.source_id.clone());

            let age = (now - signal.timestamp)
                .to_std()
                .unwrap_or(Duration::ZERO);
            let decay = decay_factor(age);

            if let Some(online) = signal.smart_money_online {
                let raw = (online as f64 / SMART_MONEY_SATURATION).min(1.0);
                smart_money_best = smart_money_best.max(raw * decay);
            }
            if let Some(score) = signal.ai_score {
                let raw = (score / 10.0).clamp(0.0, 1.0);
                ai_narrative_best = ai_narrative_best.max(raw * decay);
            }
            let momentum_candidates = [
                signal.price_change_5m,
                signal.price_change_1h,
                signal.max_price_gain,
            ];
            for candidate in momentum_candidates.into_iter().flatten() {
                let raw = (candidate.max(0.0) / MOMENTUM_SATURATION_PCT).clamp(0.0, 1.0);
                momentum_best = momentum_best.max(raw * decay);
            }
        }

        let tg_heat_sources = evidence
            .iter()
            .filter(|s| {
                (now - s.timestamp)
                    .to_std()
                    .map(|age| age < HEAT_WINDOW)
                    .unwrap_or(false)
            })
            .map(|s| s.source_id.clone())
            .collect::<std::collections::HashSet<_>>()
            .len();
        let tg_heat_raw = (tg_heat_sources as f64 / TG_HEAT_SATURATION).min(1.0);

        let aggregation_boost = match distinct_sources.len() {
            n if n >= 5 => 15.0,
            n if n >= 3 => 10.0,
            n if n >= 2 => 5.0,
            _ => 0.0,
        };

        let breakdown = ScoreBreakdown {
            smart_money: smart_money_best * SMART_MONEY_WEIGHT,
            ai_narrative: ai_narrative_best * AI_NARRATIVE_WEIGHT,
            tg_heat: tg_heat_raw * TG_HEAT_WEIGHT,
            momentum: momentum_best * MOMENTUM_WEIGHT,
            safety: Self::safety_value(hard_gate),
            aggregation_boost,
        };

        let total = (breakdown.smart_money
            + breakdown.ai_narrative
            + breakdown.tg_heat
            + breakdown.momentum
            + breakdown.safety
            + breakdown.aggregation_boost)
            .clamp(0.0, 100.0);

        // Safety=Reject overrides the composite via gate composition: even
        // if other axes are strong, a rejected safety check forces REJECT.
        let tier = if hard_gate == Verdict::Reject {
            RatingTier::Reject
        } else {
            Self::score_to_tier(total)
        };

        let reason = if hard_gate == Verdict::Reject {
            "hard gate rejected".to_string()
        } else {
            format!("score {total:.1} -> {tier}")
        };

        CompositeScore {
            fingerprint: fingerprint.clone(),
            total,
            breakdown,
            tier,
            reason,
            first_seen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Chain, TokenFingerprint};

    fn bare(source: &str, fp: &TokenFingerprint) -> RawSignal {
        RawSignal::bare(source, fp.clone())
    }

    #[test]
    fn score_is_always_within_bounds() {
        let fp = TokenFingerprint::new(Chain::Sol, "X");
        let mut sig = bare("chan_a", &fp);
        sig.smart_money_online = Some(50);
        sig.ai_score = Some(10.0);
        sig.price_change_5m = Some(500.0);
        let score = Scorer::score(&fp, &[sig], Utc::now(), Verdict::Pass, Utc::now());
        assert!(score.total >= 0.0 && score.total <= 100.0);
    }

    #[test]
    fn reject_safety_forces_reject_tier_even_with_strong_other_axes() {
        let fp = TokenFingerprint::new(Chain::Sol, "X");
        let mut sig = bare("chan_a", &fp);
        sig.smart_money_online = Some(50);
        sig.ai_score = Some(10.0);
        let score = Scorer::score(&fp, &[sig], Utc::now(), Verdict::Reject, Utc::now());
        assert_eq!(score.tier, RatingTier::Reject);
    }

    #[test]
    fn aggregation_boost_applies_at_five_distinct_sources() {
        let fp = TokenFingerprint::new(Chain::Sol, "X");
        let evidence: Vec<RawSignal> = (0..5)
            .map(|i| bare(&format!("chan_{i}"), &fp))
            .collect();
        let score = Scorer::score(&fp, &evidence, Utc::now(), Verdict::Pass, Utc::now());
        assert_eq!(score.breakdown.aggregation_boost, 15.0);
    }

    #[test]
    fn stale_evidence_contributes_nothing() {
        let fp = TokenFingerprint::new(Chain::Sol, "X");
        let mut sig = bare("chan_a", &fp);
        sig.smart_money_online = Some(50);
        sig.timestamp = Utc::now() - chrono::Duration::minutes(45);
        let score = Scorer::score(&fp, &[sig], Utc::now(), Verdict::Pass, Utc::now());
        assert_eq!(score.breakdown.smart_money, 0.0);
    }

    #[test]
    fn unknown_fields_contribute_zero_never_negative() {
        let fp = TokenFingerprint::new(Chain::Sol, "X");
        let sig = bare("chan_a", &fp);
        let score = Scorer::score(&fp, &[sig], Utc::now(), Verdict::Pass, Utc::now());
        assert!(score.breakdown.smart_money >= 0.0);
        assert!(score.breakdown.ai_narrative >= 0.0);
        assert!(score.breakdown.momentum >= 0.0);
    }

    #[tokio::test]
    async fn aggregation_coordinator_pools_evidence_until_window_elapses() {
        let coordinator = AggregationCoordinator::new();
        let fp = TokenFingerprint::new(Chain::Sol, "X");
        coordinator.ingest(bare("chan_a", &fp));
        coordinator.ingest(bare("chan_b", &fp));

        // Window has not elapsed yet.
        assert!(coordinator.drain_due(Instant::now()).is_empty());

        let far_future = Instant::now() + AGGREGATION_WINDOW + Duration::from_secs(1);
        let due = coordinator.drain_due(far_future);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].evidence.len(), 2);
    }

    #[tokio::test]
    async fn smart_money_threshold_finalizes_early() {
        let coordinator = AggregationCoordinator::new();
        let fp = TokenFingerprint::new(Chain::Sol, "X");
        let mut sig = bare("chan_a", &fp);
        sig.smart_money_online = Some(SMART_MONEY_FINAL_THRESHOLD);
        coordinator.ingest(sig);

        let due = coordinator.drain_due(Instant::now());
        assert_eq!(due.len(), 1);
    }
}
