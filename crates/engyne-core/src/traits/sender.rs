// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound channel delivery seam used by the dispatcher.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::EngyneError;
use crate::types::Channel;

/// One rendered delivery attempt for a single recipient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundDelivery {
    pub channel: Channel,
    pub sent_at: DateTime<Utc>,
    /// Recipient address for the channel, `None` for channels without one.
    pub contact: Option<String>,
    pub message: String,
    /// The verified event record the delivery was produced from.
    pub record: serde_json::Value,
}

/// Delivers messages to one external channel.
#[async_trait]
pub trait ChannelSender: Send + Sync + 'static {
    fn channel(&self) -> Channel;

    async fn send(&self, delivery: &OutboundDelivery) -> Result<(), EngyneError>;
}
