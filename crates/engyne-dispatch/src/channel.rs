// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-channel queue consumer.
//!
//! Items are handled strictly in queue order. The cursor only moves past an
//! item once it is sent, permanently blocked, skipped, or a duplicate. An
//! item held by `dry_run`, the rate limit, or a retry backoff stays at the
//! head and stops the tick.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use engyne_config::model::DispatcherConfig;
use engyne_core::{Channel, ChannelSender, Clock, EngyneError, OutboundDelivery};
use engyne_prometheus::{record_dispatch, set_channel_cursor};
use engyne_storage::{ChannelCursor, QueueLine, RuntimeStore, SlotStore};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::limits::{ContactState, RateState};
use crate::record::{BlockReason, DeliveryLogEntry, DeliveryOutcome, DispatchQueueItem};
use crate::render::render_message;

/// Recipient label for channels that deliver without one.
const NO_RECIPIENT: &str = "-";

/// Tunables shared by every channel consumer.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub batch_size: usize,
    pub rate_per_minute: u32,
    pub dry_run_advance: bool,
    pub dedup_window: Duration,
    pub retry_initial: Duration,
    pub retry_max: Duration,
}

impl DispatchSettings {
    pub fn from_config(config: &DispatcherConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            rate_per_minute: config.rate_per_minute,
            dry_run_advance: config.dry_run_advance,
            dedup_window: seconds(config.dedup_window_hours.saturating_mul(3600)),
            retry_initial: seconds(config.retry_initial_secs),
            retry_max: seconds(config.retry_max_secs),
        }
    }

    /// Delay before retry number `failures` (1-based), doubling up to the cap.
    pub fn retry_delay(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(30);
        let delay = self
            .retry_initial
            .checked_mul(1_i32 << exp)
            .unwrap_or(self.retry_max);
        delay.min(self.retry_max)
    }
}

fn seconds(secs: u64) -> Duration {
    Duration::try_seconds(i64::try_from(secs).unwrap_or(i64::MAX)).unwrap_or(Duration::MAX)
}

/// Why the head item was left in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    DryRun,
    RateLimited,
    Retrying,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub sent: usize,
    pub blocked: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub invalid: usize,
    pub failed: usize,
    pub held: Option<HoldReason>,
}

impl TickReport {
    pub fn advanced(&self) -> usize {
        self.sent + self.blocked + self.skipped + self.duplicates + self.invalid
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStatus {
    pub channel: Channel,
    pub cursor: u64,
    pub queue_len: u64,
    pub pending: u64,
    pub webhook_configured: bool,
    pub consecutive_failures: u32,
    pub retry_at: Option<DateTime<Utc>>,
    pub held: Option<HoldReason>,
}

enum Step {
    Advance,
    Hold(HoldReason),
}

pub struct ChannelDispatcher {
    channel: Channel,
    runtime: RuntimeStore,
    slots: SlotStore,
    sender: Option<Arc<dyn ChannelSender>>,
    settings: DispatchSettings,
    clock: Arc<dyn Clock>,
    cursor: ChannelCursor,
    failures: u32,
    retry_at: Option<DateTime<Utc>>,
    held: Option<HoldReason>,
}

impl std::fmt::Debug for ChannelDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelDispatcher")
            .field("channel", &self.channel)
            .field("cursor", &self.cursor.offset())
            .field("failures", &self.failures)
            .finish_non_exhaustive()
    }
}

impl ChannelDispatcher {
    /// Load the channel's durable cursor. Without a `sender`, every item
    /// that reaches delivery is blocked as `missing_webhook`.
    pub fn new(
        channel: Channel,
        runtime: RuntimeStore,
        slots: SlotStore,
        sender: Option<Arc<dyn ChannelSender>>,
        settings: DispatchSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngyneError> {
        let cursor = runtime.cursor(channel)?;
        Ok(Self {
            channel,
            runtime,
            slots,
            sender,
            settings,
            clock,
            cursor,
            failures: 0,
            retry_at: None,
            held: None,
        })
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn offset(&self) -> u64 {
        self.cursor.offset()
    }

    /// Process up to `batch_size` items from the cursor.
    pub async fn tick(&mut self) -> Result<TickReport, EngyneError> {
        let now = self.clock.now();
        let mut report = TickReport::default();

        if let Some(at) = self.retry_at
            && now < at
        {
            report.held = Some(HoldReason::Retrying);
            self.held = report.held;
            return Ok(report);
        }

        let lines = self
            .runtime
            .read_queue(self.channel, self.cursor.offset(), self.settings.batch_size)?;
        let mut contacts: ContactState = self.runtime.read_contact_state(self.channel);
        let mut rate: RateState = self.runtime.read_rate_state(self.channel);

        for line in &lines {
            match self.handle(line, &mut contacts, &mut rate, now, &mut report).await? {
                Step::Advance => self.cursor.advance_to(line.index + 1)?,
                Step::Hold(reason) => {
                    report.held = Some(reason);
                    break;
                }
            }
        }

        self.held = report.held;
        set_channel_cursor(self.channel, self.cursor.offset());
        if report.advanced() > 0 {
            debug!(channel = %self.channel, cursor = self.cursor.offset(), ?report, "dispatch tick");
        }
        Ok(report)
    }

    async fn handle(
        &mut self,
        line: &QueueLine,
        contacts: &mut ContactState,
        rate: &mut RateState,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<Step, EngyneError> {
        if line.raw.trim().is_empty() {
            return Ok(Step::Advance);
        }
        let item: DispatchQueueItem = match serde_json::from_str(&line.raw) {
            Ok(item) => item,
            Err(e) => {
                warn!(channel = %self.channel, line = line.index, error = %e, "invalid queue line");
                self.log(
                    DeliveryLogEntry::new(now, line.index, DeliveryOutcome::Invalid)
                        .detail(format!("json_parse_error: {e}")),
                )?;
                record_dispatch(self.channel, "invalid");
                report.invalid += 1;
                return Ok(Step::Advance);
            }
        };

        let dry_run = match self.slots.read_policy(&item.slot_id) {
            Ok(policy) => policy.dry_run,
            Err(e) => {
                warn!(channel = %self.channel, slot = %item.slot_id, error = %e, "policy unreadable, holding as dry run");
                true
            }
        };
        if dry_run {
            if !self.settings.dry_run_advance {
                return Ok(Step::Hold(HoldReason::DryRun));
            }
            self.log(
                DeliveryLogEntry::new(now, line.index, DeliveryOutcome::Skipped)
                    .item(&item)
                    .detail("dry_run"),
            )?;
            record_dispatch(self.channel, "skipped");
            report.skipped += 1;
            return Ok(Step::Advance);
        }

        let contact = item.event.contact_for(self.channel);
        if self.channel.requires_contact() && contact.is_none() {
            self.block(&item, line.index, BlockReason::MissingContact, now)?;
            report.blocked += 1;
            return Ok(Step::Advance);
        }
        let Some(sender) = self.sender.clone() else {
            self.block(&item, line.index, BlockReason::MissingWebhook, now)?;
            report.blocked += 1;
            return Ok(Step::Advance);
        };

        let recipient = contact.as_deref().unwrap_or(NO_RECIPIENT);
        if contacts.is_duplicate(&item.slot_id, recipient, &item.key, self.settings.dedup_window, now) {
            self.log(
                DeliveryLogEntry::new(now, line.index, DeliveryOutcome::Duplicate)
                    .item(&item)
                    .contact(contact.clone()),
            )?;
            record_dispatch(self.channel, "duplicate");
            report.duplicates += 1;
            return Ok(Step::Advance);
        }

        if !rate.allows(&item.slot_id, self.settings.rate_per_minute, now) {
            debug!(channel = %self.channel, slot = %item.slot_id, reopens_at = ?rate.reopens_at(&item.slot_id), "rate limited");
            return Ok(Step::Hold(HoldReason::RateLimited));
        }

        let delivery = OutboundDelivery {
            channel: self.channel,
            sent_at: now,
            contact: contact.clone(),
            message: render_message(self.channel, &item.event),
            record: serde_json::to_value(&item)?,
        };
        match sender.send(&delivery).await {
            Ok(()) => {
                rate.record(&item.slot_id, now);
                contacts.upsert(&item.slot_id, recipient, &item.key, self.settings.dedup_window, now);
                self.runtime.write_rate_state(self.channel, rate)?;
                self.runtime.write_contact_state(self.channel, contacts)?;
                self.log(
                    DeliveryLogEntry::new(now, line.index, DeliveryOutcome::Sent)
                        .item(&item)
                        .contact(contact),
                )?;
                self.failures = 0;
                self.retry_at = None;
                record_dispatch(self.channel, "sent");
                report.sent += 1;
                Ok(Step::Advance)
            }
            Err(e) => {
                self.failures += 1;
                let delay = self.settings.retry_delay(self.failures);
                self.retry_at = Some(
                    now.checked_add_signed(delay)
                        .unwrap_or(DateTime::<Utc>::MAX_UTC),
                );
                warn!(
                    channel = %self.channel,
                    slot = %item.slot_id,
                    key = %item.key,
                    failures = self.failures,
                    retry_in_secs = delay.num_seconds(),
                    error = %e,
                    "delivery failed"
                );
                self.log(
                    DeliveryLogEntry::new(now, line.index, DeliveryOutcome::Failed)
                        .item(&item)
                        .contact(contact)
                        .detail(e.to_string()),
                )?;
                record_dispatch(self.channel, "failed");
                report.failed += 1;
                Ok(Step::Hold(HoldReason::Retrying))
            }
        }
    }

    fn block(
        &self,
        item: &DispatchQueueItem,
        line: u64,
        reason: BlockReason,
        now: DateTime<Utc>,
    ) -> Result<(), EngyneError> {
        warn!(channel = %self.channel, slot = %item.slot_id, key = %item.key, %reason, "dispatch item blocked");
        self.log(
            DeliveryLogEntry::new(now, line, DeliveryOutcome::Blocked)
                .item(item)
                .blocked_by(reason),
        )?;
        record_dispatch(self.channel, "blocked");
        Ok(())
    }

    fn log(&self, entry: DeliveryLogEntry) -> Result<(), EngyneError> {
        self.runtime.append_delivery_log(self.channel, &entry)
    }

    /// Block the head item as `abandoned` and move past it.
    ///
    /// Returns the abandoned line index, or `None` when the queue is drained.
    pub fn abandon(&mut self) -> Result<Option<u64>, EngyneError> {
        let Some(line) = self
            .runtime
            .read_queue(self.channel, self.cursor.offset(), 1)?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };
        let now = self.clock.now();
        let mut entry = DeliveryLogEntry::new(now, line.index, DeliveryOutcome::Blocked)
            .blocked_by(BlockReason::Abandoned);
        if let Ok(item) = serde_json::from_str::<DispatchQueueItem>(&line.raw) {
            entry = entry.item(&item);
        }
        self.log(entry)?;
        self.cursor.advance_to(line.index + 1)?;
        self.failures = 0;
        self.retry_at = None;
        self.held = None;
        record_dispatch(self.channel, "abandoned");
        set_channel_cursor(self.channel, self.cursor.offset());
        info!(channel = %self.channel, line = line.index, "head item abandoned");
        Ok(Some(line.index))
    }

    pub fn status(&self) -> Result<ChannelStatus, EngyneError> {
        let queue_len = self.runtime.queue_len(self.channel)?;
        Ok(ChannelStatus {
            channel: self.channel,
            cursor: self.cursor.offset(),
            queue_len,
            pending: queue_len.saturating_sub(self.cursor.offset()),
            webhook_configured: self.sender.is_some(),
            consecutive_failures: self.failures,
            retry_at: self.retry_at,
            held: self.held,
        })
    }
}
