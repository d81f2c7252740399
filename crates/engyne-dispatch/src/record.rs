// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Records persisted by the pipeline and the channel consumers.

use chrono::{DateTime, Utc};
use engyne_core::{Channel, SlotId, VerifiedEvent};
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

/// Lifecycle of one queue item. Queue lines are never rewritten, so the
/// current status of an item lives in the channel's delivery log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DispatchStatus {
    Pending,
    Sent,
    Blocked,
}

/// Why an item was permanently passed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BlockReason {
    MissingContact,
    MissingWebhook,
    /// Operator gave up on a failing item.
    Abandoned,
}

/// One `(VerifiedEvent, channel)` pair, as appended to `<channel>_queue.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchQueueItem {
    pub slot_id: SlotId,
    pub channel: Channel,
    /// Idempotency key of the event.
    pub key: String,
    pub status: DispatchStatus,
    #[serde(default)]
    pub block_reason: Option<BlockReason>,
    pub created_at: DateTime<Utc>,
    pub event: VerifiedEvent,
}

impl DispatchQueueItem {
    pub fn pending(channel: Channel, key: String, event: VerifiedEvent, now: DateTime<Utc>) -> Self {
        Self {
            slot_id: event.slot_id.clone(),
            channel,
            key,
            status: DispatchStatus::Pending,
            block_reason: None,
            created_at: now,
            event,
        }
    }
}

/// Outcome written to `<channel>.log.jsonl` for each handled line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent,
    Blocked,
    /// Passed over because of `dry_run` with the advance override set.
    Skipped,
    /// Already delivered to this recipient inside the dedup window.
    Duplicate,
    /// Unparsable queue line.
    Invalid,
    /// Transient send failure; the item stays at the head.
    Failed,
}

/// Delivery proof line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryLogEntry {
    pub at: DateTime<Utc>,
    /// Queue line index the entry refers to.
    pub line: u64,
    pub outcome: DeliveryOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DispatchStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<BlockReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_id: Option<SlotId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl DeliveryLogEntry {
    pub fn new(at: DateTime<Utc>, line: u64, outcome: DeliveryOutcome) -> Self {
        let status = match outcome {
            DeliveryOutcome::Sent => Some(DispatchStatus::Sent),
            DeliveryOutcome::Blocked => Some(DispatchStatus::Blocked),
            DeliveryOutcome::Failed => Some(DispatchStatus::Pending),
            _ => None,
        };
        Self {
            at,
            line,
            outcome,
            status,
            block_reason: None,
            slot_id: None,
            key: None,
            contact: None,
            detail: None,
        }
    }

    pub fn item(mut self, item: &DispatchQueueItem) -> Self {
        self.slot_id = Some(item.slot_id.clone());
        self.key = Some(item.key.clone());
        self
    }

    pub fn blocked_by(mut self, reason: BlockReason) -> Self {
        self.block_reason = Some(reason);
        self
    }

    pub fn contact(mut self, contact: Option<String>) -> Self {
        self.contact = contact;
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// One accepted event in `verified.jsonl`, written before any queue item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub key: String,
    pub accepted_at: DateTime<Utc>,
    /// Channels the event fans out to; fixed at acceptance.
    pub channels: Vec<Channel>,
    pub event: VerifiedEvent,
}
