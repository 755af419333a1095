// =============================================================================
// Chat-channel listener adapter
// =============================================================================
//
// Primary evidence: `source_id` = channel name, timestamp of mention.
// Real deployments connect to a chat platform's API per channel; that
// plumbing is a vendor collaborator and out of scope here. This adapter
// ships a deterministic synthetic generator so it can run standalone in
// shadow/demo mode and in its own tests.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::debug;

use crate::adapters::{send_or_drop, Shutdown, SourceAdapter};
use crate::model::{Chain, RawSignal, TokenFingerprint};

pub struct ChannelListenerAdapter {
    channel_name: String,
    chain: Chain,
    /// Candidate token addresses this channel cycles through in demo mode.
    demo_pool: Vec<String>,
    poll_interval: Duration,
}

impl ChannelListenerAdapter {
    pub fn new(channel_name: impl Into<String>, chain: Chain, demo_pool: Vec<String>) -> Self {
        Self {
            channel_name: channel_name.into(),
            chain,
            demo_pool,
            poll_interval: Duration::from_secs(20),
        }
    }
}

#[async_trait]
impl SourceAdapter for ChannelListenerAdapter {
    fn source_id(&self) -> &str {
        &self.channel_name
    }

    async fn run(&self, out: mpsc::Sender<RawSignal>, shutdown: Shutdown) {
        if self.demo_pool.is_empty() {
            return;
        }
        let mut tick = interval(self.poll_interval);
        let mut cursor = 0usize;
        loop {
            if shutdown.is_triggered() {
                return;
            }
            tick.tick().await;
            let token = &self.demo_pool[cursor % self.demo_pool.len()];
            cursor += 1;

            let fingerprint = TokenFingerprint::new(self.chain, token.clone());
            let signal = RawSignal::bare(self.channel_name.clone(), fingerprint);
            debug!(channel = %self.channel_name, token, "channel mention observed");
            send_or_drop(&out, signal, &self.channel_name).await;
        }
    }
}
