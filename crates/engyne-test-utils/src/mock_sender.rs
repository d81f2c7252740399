// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use engyne_core::{Channel, ChannelSender, EngyneError, OutboundDelivery};

/// Channel sender that captures deliveries instead of sending them.
///
/// `fail_next(n)` makes the next `n` sends return a delivery error.
#[derive(Debug, Clone)]
pub struct MockSender {
    channel: Channel,
    sent: Arc<Mutex<Vec<OutboundDelivery>>>,
    failures: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

impl MockSender {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            sent: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(AtomicUsize::new(0)),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutboundDelivery> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_count(&self) -> usize {
        self.sent().len()
    }

    /// Every call to `send`, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelSender for MockSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, delivery: &OutboundDelivery) -> Result<(), EngyneError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(EngyneError::delivery(self.channel, "injected failure"));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(delivery.clone());
        }
        Ok(())
    }
}
