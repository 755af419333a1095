// =============================================================================
// Decision Envelope — auditable record of every trade/no-trade decision
// =============================================================================
//
// Every candidate flows through a multi-layer pipeline (dedup → snapshot →
// hard gate → exit gate → score → risk → size → execute). The Decision
// Envelope captures the verdict from each layer so every decision can be
// audited after the fact. Grounded on the legacy envelope's
// allow/blocked constructors; the layer set is renamed to this pipeline's
// stages.

use serde::Serialize;

use crate::model::TokenFingerprint;

#[derive(Debug, Clone, Serialize)]
pub struct DecisionEnvelope {
    pub id: String,
    pub fingerprint: TokenFingerprint,

    pub dedup_verdict: String,
    pub hard_gate_verdict: String,
    pub exit_gate_verdict: String,
    pub risk_verdict: String,

    /// "BUY", "WATCH", or "DISCARD".
    pub final_decision: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking_layer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub score: Option<f64>,
    pub tier: Option<String>,

    pub created_at: String,
}

impl DecisionEnvelope {
    pub fn allow(fingerprint: TokenFingerprint, score: f64, tier: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            fingerprint,
            dedup_verdict: "PASS".to_string(),
            hard_gate_verdict: "PASS".to_string(),
            exit_gate_verdict: "PASS".to_string(),
            risk_verdict: "PASS".to_string(),
            final_decision: "BUY".to_string(),
            blocking_layer: None,
            reason: None,
            score: Some(score),
            tier: Some(tier.into()),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn watch(fingerprint: TokenFingerprint, score: f64, tier: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            fingerprint,
            dedup_verdict: "PASS".to_string(),
            hard_gate_verdict: "PASS".to_string(),
            exit_gate_verdict: "PASS".to_string(),
            risk_verdict: "PASS".to_string(),
            final_decision: "WATCH".to_string(),
            blocking_layer: None,
            reason: None,
            score: Some(score),
            tier: Some(tier.into()),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn blocked(fingerprint: TokenFingerprint, blocking_layer: impl Into<String>, reason: impl Into<String>) -> Self {
        let layer = blocking_layer.into();
        // Every layer up to and including the blocking one reads REJECT in
        // the trail; layers the candidate never reached stay PASS rather
        // than implying they were evaluated and cleared it.
        let mut envelope = Self {
            id: uuid::Uuid::new_v4().to_string(),
            fingerprint,
            dedup_verdict: "PASS".to_string(),
            hard_gate_verdict: "PASS".to_string(),
            exit_gate_verdict: "PASS".to_string(),
            risk_verdict: "PASS".to_string(),
            final_decision: "DISCARD".to_string(),
            blocking_layer: Some(layer.clone()),
            reason: Some(reason.into()),
            score: None,
            tier: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        match layer.as_str() {
            "dedup" => envelope.dedup_verdict = "REJECT".to_string(),
            "hard_gate" => envelope.hard_gate_verdict = "REJECT".to_string(),
            "exit_gate" => envelope.exit_gate_verdict = "REJECT".to_string(),
            "risk_manager" => envelope.risk_verdict = "REJECT".to_string(),
            _ => {}
        }
        envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Chain;

    #[test]
    fn allow_carries_score_and_tier() {
        let fp = TokenFingerprint::new(Chain::Sol, "TOK");
        let envelope = DecisionEnvelope::allow(fp, 82.0, "MAX");
        assert_eq!(envelope.final_decision, "BUY");
        assert_eq!(envelope.score, Some(82.0));
    }

    #[test]
    fn blocked_records_the_blocking_layer() {
        let fp = TokenFingerprint::new(Chain::Sol, "TOK");
        let envelope = DecisionEnvelope::blocked(fp, "hard_gate", "liquidity below minimum");
        assert_eq!(envelope.final_decision, "DISCARD");
        assert_eq!(envelope.blocking_layer.as_deref(), Some("hard_gate"));
        assert_eq!(envelope.hard_gate_verdict, "REJECT");
        assert_eq!(envelope.exit_gate_verdict, "PASS");
    }

    #[test]
    fn blocked_at_risk_manager_leaves_gate_verdicts_untouched() {
        let fp = TokenFingerprint::new(Chain::Sol, "TOK");
        let envelope = DecisionEnvelope::blocked(fp, "risk_manager", "loss streak pause");
        assert_eq!(envelope.risk_verdict, "REJECT");
        assert_eq!(envelope.hard_gate_verdict, "PASS");
        assert_eq!(envelope.exit_gate_verdict, "PASS");
    }
}
