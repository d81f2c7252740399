// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Verified event ingestion.
//!
//! An accepted event is written to the ledger first, then fanned out as one
//! queue item per channel enabled in the slot's policy. The set of accepted
//! idempotency keys is rebuilt from the ledger on open, and any queue item
//! lost between the ledger write and the fan-out is appended again. A
//! fan-out that fails part way is repaired the same way when the worker
//! retries the event.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use engyne_core::{Channel, Clock, EngyneError, SlotId, VerifiedEvent};
use engyne_prometheus::record_ingest;
use engyne_storage::{RuntimeStore, SlotStore};
use serde::Serialize;
use strum::IntoEnumIterator;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::record::{DispatchQueueItem, LedgerEntry};

const POLICY_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Accepted,
    /// Key seen before; nothing was written.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestAck {
    pub status: IngestStatus,
    pub slot_id: SlotId,
    pub key: String,
    /// Channels enqueued by this call.
    pub channels: Vec<Channel>,
}

pub struct VerifiedPipeline {
    slots: SlotStore,
    runtime: RuntimeStore,
    secret: Option<String>,
    clock: Arc<dyn Clock>,
    client: reqwest::Client,
    keys: Mutex<AcceptedKeys>,
}

/// Scoped keys with a ledger entry, plus those whose fan-out is unfinished.
#[derive(Debug, Default)]
struct AcceptedKeys {
    seen: HashSet<String>,
    incomplete: HashMap<String, LedgerEntry>,
}

impl std::fmt::Debug for VerifiedPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifiedPipeline")
            .field("runtime", &self.runtime.root())
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl VerifiedPipeline {
    /// Open the pipeline and run crash recovery against the ledger.
    ///
    /// With no `secret` configured every submission is rejected.
    pub fn open(
        slots: SlotStore,
        runtime: RuntimeStore,
        secret: Option<String>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngyneError> {
        let client = reqwest::Client::builder()
            .timeout(POLICY_WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| EngyneError::Internal(format!("http client: {e}")))?;
        let (seen, repaired) = recover(&runtime)?;
        if repaired > 0 {
            warn!(repaired, "re-enqueued dispatch items missing after restart");
        }
        info!(keys = seen.len(), "verified ledger loaded");
        Ok(Self {
            slots,
            runtime,
            secret: secret.filter(|s| !s.is_empty()),
            clock,
            client,
            keys: Mutex::new(AcceptedKeys {
                seen,
                incomplete: HashMap::new(),
            }),
        })
    }

    /// Accept `event` if `credential` matches the worker secret.
    ///
    /// Rejections (bad credential, malformed event, unknown slot) write
    /// nothing. A repeated idempotency key is acknowledged as a duplicate.
    pub async fn ingest(
        &self,
        event: &VerifiedEvent,
        credential: Option<&str>,
    ) -> Result<IngestAck, EngyneError> {
        let result = self.accept(event, credential).await;
        match &result {
            Ok(ack) if ack.status == IngestStatus::Duplicate => record_ingest("duplicate"),
            Ok(_) => record_ingest("accepted"),
            Err(e) => {
                record_ingest("rejected");
                debug!(error = %e, "verified event rejected");
            }
        }
        result
    }

    /// Check a worker credential without submitting anything.
    pub fn authorize(&self, credential: Option<&str>) -> Result<(), EngyneError> {
        match (&self.secret, credential) {
            (Some(expected), Some(given)) if expected == given => Ok(()),
            _ => Err(EngyneError::Unauthorized),
        }
    }

    async fn accept(
        &self,
        event: &VerifiedEvent,
        credential: Option<&str>,
    ) -> Result<IngestAck, EngyneError> {
        self.authorize(credential)?;
        event.validate()?;
        let slot = &event.slot_id;
        if !self.slots.exists(slot) {
            return Err(EngyneError::SlotNotFound(slot.to_string()));
        }
        let policy = self.slots.read_policy(slot)?;
        let key = event.idempotency_key();

        let scoped_key = scoped(slot, &key);
        let mut keys = self.keys.lock().await;
        if keys.seen.contains(&scoped_key) {
            if let Some(entry) = keys.incomplete.get(&scoped_key) {
                let repaired = repair(&self.runtime, entry)?;
                warn!(slot = %slot, key = %key, repaired, "completed interrupted fan-out");
                keys.incomplete.remove(&scoped_key);
            }
            debug!(slot = %slot, key = %key, "duplicate verified event");
            return Ok(IngestAck {
                status: IngestStatus::Duplicate,
                slot_id: slot.clone(),
                key,
                channels: Vec::new(),
            });
        }

        let now = self.clock.now();
        let channels = policy.channels.enabled();
        let entry = LedgerEntry {
            key: key.clone(),
            accepted_at: now,
            channels: channels.clone(),
            event: event.clone(),
        };
        self.runtime.append_verified(&entry)?;
        keys.seen.insert(scoped_key.clone());
        if let Err(e) = fan_out(&self.runtime, &entry) {
            warn!(slot = %slot, key = %key, error = %e, "fan-out incomplete; the next submission repairs it");
            keys.incomplete.insert(scoped_key, entry);
            return Err(e);
        }
        drop(keys);

        info!(slot = %slot, key = %key, channels = ?channels, "verified event accepted");

        if !policy.dry_run
            && let Some(url) = policy.webhook_url
        {
            let client = self.client.clone();
            let body = event.clone();
            tokio::spawn(async move {
                match client.post(&url).json(&body).send().await {
                    Ok(r) if r.status().is_success() => {}
                    Ok(r) => warn!(status = %r.status(), "policy webhook rejected event"),
                    Err(e) => warn!(error = %e, "policy webhook failed"),
                }
            });
        }

        Ok(IngestAck {
            status: IngestStatus::Accepted,
            slot_id: slot.clone(),
            key,
            channels,
        })
    }
}

fn scoped(slot: &SlotId, key: &str) -> String {
    format!("{slot}/{key}")
}

/// Append one queue item per ledger channel. Every channel is attempted;
/// the first failure is returned.
fn fan_out(runtime: &RuntimeStore, entry: &LedgerEntry) -> Result<(), EngyneError> {
    let mut first_err = None;
    for channel in &entry.channels {
        if let Err(e) = runtime.append_queue(*channel, &queue_item(*channel, entry)) {
            warn!(channel = %channel, key = %entry.key, error = %e, "queue append failed");
            first_err.get_or_insert(e);
        }
    }
    first_err.map_or(Ok(()), Err)
}

/// Append the queue items `entry` names but the channel queues lack.
fn repair(runtime: &RuntimeStore, entry: &LedgerEntry) -> Result<usize, EngyneError> {
    let target = scoped(&entry.event.slot_id, &entry.key);
    let mut repaired = 0;
    for channel in &entry.channels {
        let queued = runtime
            .queue_records::<DispatchQueueItem>(*channel)?
            .iter()
            .any(|item| scoped(&item.slot_id, &item.key) == target);
        if !queued {
            runtime.append_queue(*channel, &queue_item(*channel, entry))?;
            repaired += 1;
        }
    }
    Ok(repaired)
}

fn queue_item(channel: Channel, entry: &LedgerEntry) -> DispatchQueueItem {
    DispatchQueueItem::pending(channel, entry.key.clone(), entry.event.clone(), entry.accepted_at)
}

/// Rebuild the accepted-key set and append queue items the ledger names
/// but the channel queues lack. Returns the set and the repair count.
fn recover(runtime: &RuntimeStore) -> Result<(HashSet<String>, usize), EngyneError> {
    let ledger: Vec<LedgerEntry> = runtime.read_verified()?;
    let mut seen = HashSet::with_capacity(ledger.len());
    for entry in &ledger {
        seen.insert(scoped(&entry.event.slot_id, &entry.key));
    }

    let mut repaired = 0;
    for channel in Channel::iter() {
        let expected: Vec<&LedgerEntry> = ledger
            .iter()
            .filter(|e| e.channels.contains(&channel))
            .collect();
        if expected.is_empty() {
            continue;
        }
        let queued: HashSet<String> = runtime
            .queue_records::<DispatchQueueItem>(channel)?
            .into_iter()
            .map(|item| scoped(&item.slot_id, &item.key))
            .collect();
        for entry in expected {
            if queued.contains(&scoped(&entry.event.slot_id, &entry.key)) {
                continue;
            }
            runtime.append_queue(channel, &queue_item(channel, entry))?;
            repaired += 1;
        }
    }
    Ok((seen, repaired))
}
