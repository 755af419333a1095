// =============================================================================
// Hot-token board adapter
// =============================================================================
//
// Primary evidence: signal_count, max_price_gain, price-change series.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::debug;

use crate::adapters::{send_or_drop, Shutdown, SourceAdapter};
use crate::model::{Chain, RawSignal, TokenFingerprint};

struct BoardEntry {
    fingerprint: TokenFingerprint,
    signal_count: u32,
    max_price_gain: f64,
    price_change_5m: f64,
    price_change_1h: f64,
}

pub struct HotBoardAdapter {
    source_id: String,
    board: Vec<BoardEntry>,
    poll_interval: Duration,
}

impl HotBoardAdapter {
    pub fn new(source_id: impl Into<String>, chain: Chain, tokens: Vec<String>) -> Self {
        let board = tokens
            .into_iter()
            .enumerate()
            .map(|(i, addr)| BoardEntry {
                fingerprint: TokenFingerprint::new(chain, addr),
                signal_count: 2 + (i as u32 % 8),
                max_price_gain: 20.0 + (i as f64 * 7.0) % 200.0,
                price_change_5m: -5.0 + (i as f64 % 10.0),
                price_change_1h: -10.0 + (i as f64 % 25.0),
            })
            .collect();
        Self {
            source_id: source_id.into(),
            board,
            poll_interval: Duration::from_secs(30),
        }
    }
}

#[async_trait]
impl SourceAdapter for HotBoardAdapter {
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

            for entry in &self.board {
                let mut signal = RawSignal::bare(self.source_id.clone(), entry.fingerprint.clone());
                signal.signal_count = Some(entry.signal_count);
                signal.max_price_gain = Some(entry.max_price_gain);
                signal.price_change_5m = Some(entry.price_change_5m);
                signal.price_change_1h = Some(entry.price_change_1h);
                debug!(source_id = %self.source_id, token = %entry.fingerprint, "hot-board entry emitted");
                send_or_drop(&out, signal, &self.source_id).await;
            }
        }
    }
}
