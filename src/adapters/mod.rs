// =============================================================================
// Source Adapters — normalized producers of RawSignal
// =============================================================================
//
// An adapter is polymorphic over the capability set
// `{start(cancel) -> stream<RawSignal>, stop()}` (spec §9). New vendors
// register by implementing `SourceAdapter`; per-vendor quirks stay inside
// the adapter and are normalized at the boundary rather than expressed as
// a subclass hierarchy.
//
// The real HTTP/auth plumbing for each vendor is out of scope — every
// adapter here ships a deterministic synthetic generator it can run in
// shadow/demo mode and in its own tests.

pub mod channel_listener;
pub mod hot_board;
pub mod market_discovery;
pub mod smart_money;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::model::RawSignal;

/// Cooperative shutdown flag shared by every adapter task. Plain
/// `Arc<AtomicBool>` rather than a dedicated cancellation-token crate,
/// matching the shutdown-flag idiom already used for the orchestrator's
/// own Ctrl+C handling.
#[derive(Clone)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Default cap on signals an adapter may buffer before it starts dropping
/// the oldest entry (spec §4.1).
pub const ADAPTER_MAX_QUEUE: usize = 256;

/// Minimum contract every source adapter fulfils. `start` must not return
/// until `cancel` fires or a permanent (non-retryable) error occurs; a
/// transient vendor error is logged and swallowed, never terminates the
/// sequence.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable identifier used as `RawSignal::source_id` and for dedup /
    /// metrics bucketing.
    fn source_id(&self) -> &str;

    /// Run the adapter until `shutdown` is triggered, pushing normalized
    /// signals onto `out`. A full channel is the adapter's own
    /// backpressure — adapters are expected to maintain their own bounded
    /// internal queue (`ADAPTER_MAX_QUEUE`) and drop the oldest entry on
    /// overflow rather than block indefinitely upstream.
    async fn run(&self, out: mpsc::Sender<RawSignal>, shutdown: Shutdown);
}

/// Bounded send that drops the oldest-equivalent signal (itself, since we
/// have no queue to evict from) rather than blocking when the bus is full.
/// Adapters call this instead of `Sender::send` directly.
pub async fn send_or_drop(out: &mpsc::Sender<RawSignal>, signal: RawSignal, source_id: &str) {
    match out.try_send(signal) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(source_id, "signal bus full — dropping signal");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!(source_id, "signal bus closed — adapter stopping");
        }
    }
}
