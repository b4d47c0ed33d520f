//! In-memory capture provider.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ChannelProvider, SendRequest, SendResult};
use crate::Result;
use crate::domain::Channel;

/// Keeps every request it receives.
///
/// Can be told to fail the next N sends, which makes it useful for dry runs
/// and for exercising the retry path.
#[derive(Debug)]
pub struct MemoryProvider {
    channel: Channel,
    sent: Mutex<Vec<SendRequest>>,
    failures_left: AtomicU32,
    confirm_delivery: bool,
}

impl MemoryProvider {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            sent: Mutex::new(Vec::new()),
            failures_left: AtomicU32::new(0),
            confirm_delivery: false,
        }
    }

    /// Fail the next `count` sends.
    pub fn failing(self, count: u32) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    /// Report sends as delivered rather than merely accepted.
    pub fn confirming_delivery(mut self) -> Self {
        self.confirm_delivery = true;
        self
    }

    pub fn fail_next(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Requests that were accepted, in order.
    pub fn sent(&self) -> Vec<SendRequest> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl ChannelProvider for MemoryProvider {
    fn channel(&self) -> Channel {
        self.channel
    }

    fn name(&self) -> &str {
        "memory"
    }

    async fn send(&self, request: &SendRequest) -> Result<SendResult> {
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Ok(SendResult::failure("simulated failure"));
        }

        self.sent.lock().push(request.clone());
        let provider_id = Some(format!("mem-{}", request.job_id));
        if self.confirm_delivery {
            Ok(SendResult::delivered(provider_id))
        } else {
            Ok(SendResult::accepted(provider_id))
        }
    }
}
