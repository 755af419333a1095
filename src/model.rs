// =============================================================================
// Core data model — signals, snapshots, gate verdicts, scores, positions
// =============================================================================
//
// Every value that crosses a component boundary lives here. Fields that a
// source or provider did not populate are `None`, never a fabricated zero —
// the scorer and gates both treat "unknown" as a distinct, conservative
// value (see `Unknown<T>` below).

use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which blockchain a token lives on. The two chains have materially
/// different liquidity regimes, so most thresholds are parameterized per
/// chain rather than shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chain {
    Sol,
    Bsc,
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sol => write!(f, "SOL"),
            Self::Bsc => write!(f, "BSC"),
        }
    }
}

/// `(chain, token_address)` — primary key across the system. Token
/// addresses are opaque strings; format differs per chain but is only ever
/// compared, never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenFingerprint {
    pub chain: Chain,
    pub token_address: String,
}

impl TokenFingerprint {
    pub fn new(chain: Chain, token_address: impl Into<String>) -> Self {
        Self {
            chain,
            token_address: token_address.into(),
        }
    }
}

impl std::fmt::Display for TokenFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.chain, self.token_address)
    }
}

/// A value that may be unknown because a source or provider didn't supply
/// it. Distinct from "measured zero" — gates and the scorer treat the two
/// very differently (I7).
pub type Unknown<T> = Option<T>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenTier {
    Bronze,
    Silver,
    Gold,
    Unknown,
}

/// One mention of a token from one source at one instant. Immutable after
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSignal {
    pub source_id: String,
    pub fingerprint: TokenFingerprint,
    pub timestamp: chrono::DateTime<chrono::Utc>,

    pub smart_money_online: Unknown<u32>,
    pub smart_money_total: Unknown<u32>,
    pub signal_count: Unknown<u32>,
    pub max_price_gain: Unknown<f64>,
    pub token_tier: Unknown<TokenTier>,
    pub ai_score: Unknown<f64>,
    pub ai_narrative_type: Unknown<String>,
    pub price: Unknown<f64>,
    pub liquidity_usd: Unknown<f64>,
    pub market_cap: Unknown<f64>,
    pub holders: Unknown<u64>,
    pub volume_24h: Unknown<f64>,
    pub price_change_5m: Unknown<f64>,
    pub price_change_1h: Unknown<f64>,
    pub price_change_24h: Unknown<f64>,
}

impl RawSignal {
    /// Minimal signal with only the fields every adapter can always supply.
    pub fn bare(source_id: impl Into<String>, fingerprint: TokenFingerprint) -> Self {
        Self {
            source_id: source_id.into(),
            fingerprint,
            timestamp: chrono::Utc::now(),
            smart_money_online: None,
            smart_money_total: None,
            signal_count: None,
            max_price_gain: None,
            token_tier: None,
            ai_score: None,
            ai_narrative_type: None,
            price: None,
            liquidity_usd: None,
            market_cap: None,
            holders: None,
            volume_24h: None,
            price_change_5m: None,
            price_change_1h: None,
            price_change_24h: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorityState {
    Enabled,
    Disabled,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LpState {
    Burned,
    Locked,
    Unlocked,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WashFlag {
    Low,
    Medium,
    High,
    Unknown,
}

/// Point-in-time on-chain state for a `TokenFingerprint`. Every numeric
/// field may be unknown; this struct never substitutes a zero for a
/// missing measurement (I7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub fingerprint: TokenFingerprint,
    #[serde(skip, default = "Instant::now")]
    pub snapshot_time: Instant,
    pub price: Unknown<f64>,
    pub symbol: Unknown<String>,
    pub liquidity_native: Unknown<f64>,
    pub liquidity_usd: Unknown<f64>,
    pub market_cap: Unknown<f64>,
    pub top10_holder_percent: Unknown<f64>,
    pub top1_holder_percent: Unknown<f64>,
    pub holder_count: Unknown<u64>,
    pub mint_authority: AuthorityState,
    pub freeze_authority: AuthorityState,
    pub lp_state: LpState,
    pub sell_slippage_at_20pct: Unknown<f64>,
    pub wash_flag: WashFlag,
    pub is_bonding_curve: bool,
    pub bonding_curve_progress: Unknown<f64>,
    pub buy_tax_pct: Unknown<f64>,
    pub sell_tax_pct: Unknown<f64>,
    pub tax_mutable: bool,
    pub is_honeypot: Unknown<bool>,
    pub owner_is_safe_type: Unknown<bool>,
}

impl ChainSnapshot {
    pub fn unknown(fingerprint: TokenFingerprint) -> Self {
        Self {
            fingerprint,
            snapshot_time: Instant::now(),
            price: None,
            symbol: None,
            liquidity_native: None,
            liquidity_usd: None,
            market_cap: None,
            top10_holder_percent: None,
            top1_holder_percent: None,
            holder_count: None,
            mint_authority: AuthorityState::Unknown,
            freeze_authority: AuthorityState::Unknown,
            lp_state: LpState::Unknown,
            sell_slippage_at_20pct: None,
            wash_flag: WashFlag::Unknown,
            is_bonding_curve: false,
            bonding_curve_progress: None,
            buy_tax_pct: None,
            sell_tax_pct: None,
            tax_mutable: false,
            is_honeypot: None,
            owner_is_safe_type: None,
        }
    }
}

/// Tri-state verdict shared by both the Hard Gate and the Exit Gate.
/// `Greylist` means "proceed with caution" — it is never silently
/// upgraded to `Pass`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Pass,
    Greylist,
    Reject,
}

impl Verdict {
    /// Combine two verdicts for the same candidate, keeping the stricter.
    pub fn tighten(self, other: Verdict) -> Verdict {
        use Verdict::*;
        match (self, other) {
            (Reject, _) | (_, Reject) => Reject,
            (Greylist, _) | (_, Greylist) => Greylist,
            (Pass, Pass) => Pass,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Greylist => write!(f, "GREYLIST"),
            Self::Reject => write!(f, "REJECT"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateVerdict {
    pub verdict: Verdict,
    pub reasons: Vec<String>,
}

impl GateVerdict {
    pub fn pass() -> Self {
        Self {
            verdict: Verdict::Pass,
            reasons: Vec::new(),
        }
    }

    pub fn push(&mut self, verdict: Verdict, reason: impl Into<String>) {
        self.verdict = self.verdict.tighten(verdict);
        if verdict != Verdict::Pass {
            self.reasons.push(reason.into());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RatingTier {
    Max,
    Normal,
    Small,
    Watch,
    Reject,
}

impl std::fmt::Display for RatingTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Max => write!(f, "MAX"),
            Self::Normal => write!(f, "NORMAL"),
            Self::Small => write!(f, "SMALL"),
            Self::Watch => write!(f, "WATCH"),
            Self::Reject => write!(f, "REJECT"),
        }
    }
}

/// Per-axis breakdown backing a `CompositeScore`, kept for audit/dashboard
/// display.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub smart_money: f64,
    pub ai_narrative: f64,
    pub tg_heat: f64,
    pub momentum: f64,
    pub safety: f64,
    pub aggregation_boost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeScore {
    pub fingerprint: TokenFingerprint,
    pub total: f64,
    pub breakdown: ScoreBreakdown,
    pub tier: RatingTier,
    pub reason: String,
    pub first_seen: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Breakeven,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitType {
    StopLoss,
    TimeStop,
    Emergency,
    ProfitTake,
}

impl std::fmt::Display for ExitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopLoss => write!(f, "STOP_LOSS"),
            Self::TimeStop => write!(f, "TIME_STOP"),
            Self::Emergency => write!(f, "EMERGENCY"),
            Self::ProfitTake => write!(f, "PROFIT_TAKE"),
        }
    }
}

/// Snapshot of the inputs that justified entry, captured once at open and
/// compared against on every later poll to detect smart-money exodus / dev
/// dumps / heat decay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub top10_percent: Unknown<f64>,
    pub top1_percent: Unknown<f64>,
    pub liquidity_usd: Unknown<f64>,
    pub liquidity_native: Unknown<f64>,
    pub heat: f64,
}

/// An open or historical trade. Created by the Executor on successful buy;
/// mutated only by the Position Monitor and Executor; never deleted, only
/// status-transitioned (I2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub chain: Chain,
    pub token: String,
    #[serde(skip, default = "Instant::now")]
    pub entry_instant: Instant,
    pub entry_time: chrono::DateTime<chrono::Utc>,
    pub entry_price: f64,
    pub entry_size_native: f64,
    pub entry_snapshot: EntrySnapshot,
    pub status: PositionStatus,
    pub remaining_percent: f64,
    pub breakeven_done: bool,
    pub high_water_mark: f64,
    #[serde(skip, default = "Instant::now")]
    pub last_significant_move: Instant,
    pub is_shadow: bool,
    pub consecutive_snapshot_failures: u32,

    pub exit_time: Option<chrono::DateTime<chrono::Utc>>,
    pub exit_price: Option<f64>,
    pub exit_type: Option<ExitType>,
    pub pnl_percent: Option<f64>,
    pub pnl_native: Option<f64>,
}

impl Position {
    pub fn new(
        chain: Chain,
        token: impl Into<String>,
        entry_price: f64,
        entry_size_native: f64,
        entry_snapshot: EntrySnapshot,
        is_shadow: bool,
    ) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4().to_string(),
            chain,
            token: token.into(),
            entry_instant: now,
            entry_time: chrono::Utc::now(),
            entry_price,
            entry_size_native,
            entry_snapshot,
            status: PositionStatus::Open,
            remaining_percent: 100.0,
            breakeven_done: false,
            high_water_mark: entry_price,
            last_significant_move: now,
            is_shadow,
            consecutive_snapshot_failures: 0,
            exit_time: None,
            exit_price: None,
            exit_type: None,
            pnl_percent: None,
            pnl_native: None,
        }
    }

    pub fn pnl_percent_at(&self, current_price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        (current_price - self.entry_price) / self.entry_price * 100.0
    }

    pub fn hold_duration(&self) -> std::time::Duration {
        self.entry_instant.elapsed()
    }
}

/// Process-wide risk state. Persisted so a restart resumes pause state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskState {
    pub consecutive_losses: u32,
    pub paused_until: Option<chrono::DateTime<chrono::Utc>>,
    pub recent_outcomes: Vec<bool>,
}

impl Default for RiskState {
    fn default() -> Self {
        Self {
            consecutive_losses: 0,
            paused_until: None,
            recent_outcomes: Vec::new(),
        }
    }
}
