// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The worker's main loop.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use engyne_core::{
    Clock, EngyneError, ObservedEvent, Phase, SlotId, SlotMetrics, SlotPolicy, VerifiedEvent,
};
use engyne_quality::decide;
use engyne_quality::extract::enrich;
use engyne_storage::SlotStore;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::emitter::VerifiedSink;
use crate::heartbeat::{HeartbeatEmitter, spawn_ticker};
use crate::lifecycle::{EXIT_ERROR, EXIT_OK};
use crate::source::{ClickOutcome, LeadSource, SourcePoll};

/// Lead ids remembered for in-run dedup before the oldest are forgotten.
const RECENT_LEAD_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub heartbeat_interval: Duration,
    /// Pause between polling cycles.
    pub cooldown: Duration,
    /// Events requested from the source per cycle.
    pub poll_limit: usize,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(2),
            cooldown: Duration::from_secs(10),
            poll_limit: 50,
        }
    }
}

pub struct WorkerRuntime {
    store: SlotStore,
    slot: SlotId,
    run_id: String,
    clock: Arc<dyn Clock>,
    emitter: Arc<Mutex<HeartbeatEmitter>>,
    source: Box<dyn LeadSource>,
    sink: Option<Arc<dyn VerifiedSink>>,
    options: WorkerOptions,
    seen: RecentIds,
    metrics: SlotMetrics,
}

impl WorkerRuntime {
    pub fn new(
        store: SlotStore,
        slot: SlotId,
        run_id: impl Into<String>,
        clock: Arc<dyn Clock>,
        source: Box<dyn LeadSource>,
        options: WorkerOptions,
    ) -> Self {
        let run_id = run_id.into();
        let emitter = HeartbeatEmitter::new(
            store.clone(),
            slot.clone(),
            run_id.clone(),
            Some(std::process::id()),
            clock.clone(),
        );
        // Counters carry over across runs of the same slot.
        let metrics = store.read_status(&slot).unwrap_or_default();
        Self {
            store,
            slot,
            run_id,
            clock,
            emitter: Arc::new(Mutex::new(emitter)),
            source,
            sink: None,
            options,
            seen: RecentIds::new(RECENT_LEAD_CAPACITY),
            metrics,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn VerifiedSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run until `cancel` fires or the source fails. Returns the exit code.
    pub async fn run(mut self, cancel: CancellationToken) -> i32 {
        info!(slot = %self.slot, run_id = %self.run_id, "worker starting");
        if let Err(e) = self.boot().await {
            warn!(slot = %self.slot, error = %e, "worker boot failed");
            return EXIT_ERROR;
        }

        let ticker_cancel = cancel.child_token();
        let ticker = spawn_ticker(
            self.emitter.clone(),
            self.options.heartbeat_interval,
            ticker_cancel.clone(),
        );

        let outcome = self.cycles(&cancel).await;
        ticker_cancel.cancel();
        let _ = ticker.await;

        match outcome {
            Ok(()) => {
                self.finish(Phase::Stopping, None).await;
                info!(slot = %self.slot, run_id = %self.run_id, "worker stopped");
                EXIT_OK
            }
            Err(e) => {
                warn!(slot = %self.slot, run_id = %self.run_id, error = %e, "worker failed");
                self.metrics.last_error = Some(e.to_string());
                self.write_status();
                self.finish(Phase::Error, Some(e.to_string())).await;
                EXIT_ERROR
            }
        }
    }

    async fn boot(&mut self) -> Result<(), EngyneError> {
        let mut emitter = self.emitter.lock().await;
        emitter.beat()?;
        emitter.transition(Phase::Init, None)
    }

    async fn set_phase(&self, phase: Phase, message: Option<String>) -> Result<(), EngyneError> {
        self.emitter.lock().await.transition(phase, message)
    }

    async fn finish(&self, phase: Phase, message: Option<String>) {
        if let Err(e) = self.set_phase(phase, message).await {
            warn!(slot = %self.slot, error = %e, "final state write failed");
        }
    }

    async fn pause(&self, cancel: &CancellationToken, duration: Duration) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }

    async fn cycles(&mut self, cancel: &CancellationToken) -> Result<(), EngyneError> {
        while !cancel.is_cancelled() {
            let policy = match self.store.read_policy(&self.slot) {
                Ok(policy) => policy,
                Err(e) => {
                    warn!(slot = %self.slot, error = %e, "policy unusable, waiting");
                    self.metrics.last_error = Some(e.to_string());
                    self.write_status();
                    self.set_phase(Phase::Cooldown, Some(e.to_string())).await?;
                    self.pause(cancel, self.options.cooldown).await;
                    continue;
                }
            };
            self.emitter.lock().await.set_policy_version(policy.version);
            self.set_phase(Phase::ParseLeads, None).await?;

            match self.source.poll(self.options.poll_limit).await? {
                SourcePoll::LoginRequired => {
                    self.set_phase(Phase::LoginRequired, Some("login required".into()))
                        .await?;
                    self.pause(cancel, self.options.heartbeat_interval).await;
                    continue;
                }
                SourcePoll::Leads(leads) => self.evaluate(&policy, leads).await?,
            }

            self.write_status();
            self.set_phase(Phase::Cooldown, None).await?;
            self.pause(cancel, self.options.cooldown).await;
        }
        Ok(())
    }

    async fn evaluate(&mut self, policy: &SlotPolicy, leads: Vec<ObservedEvent>) -> Result<(), EngyneError> {
        let mut clicks = 0u32;
        for mut event in leads {
            if let Some(id) = &event.lead_id
                && !self.seen.insert(id)
            {
                continue;
            }
            enrich(&mut event);
            let decision = decide(policy, &event);
            event.decision = Some(decision);
            engyne_prometheus::record_decision(&decision);

            self.metrics.observed += 1;
            if decision.keep {
                self.metrics.kept += 1;
            } else {
                self.metrics.rejected += 1;
            }
            self.store.append_lead(&self.slot, &event)?;

            if decision.keep && may_click(policy, clicks) {
                clicks += 1;
                self.metrics.clicked += 1;
                match self.source.click(&event).await {
                    Ok(ClickOutcome::Verified(payload)) => {
                        self.metrics.verified += 1;
                        self.notify_verified(&event, payload).await;
                    }
                    Ok(ClickOutcome::NotVerified) => {}
                    Err(e) => {
                        warn!(slot = %self.slot, error = %e, "click failed");
                        self.metrics.last_error = Some(e.to_string());
                    }
                }
            }
        }
        Ok(())
    }

    async fn notify_verified(
        &self,
        event: &ObservedEvent,
        payload: serde_json::Map<String, serde_json::Value>,
    ) {
        let Some(sink) = &self.sink else {
            return;
        };
        let verified = VerifiedEvent {
            slot_id: self.slot.clone(),
            lead_id: event.lead_id.clone(),
            observed_at: event.observed_at,
            title: event.title.clone(),
            payload,
        };
        if let Err(e) = sink.emit(&verified).await {
            warn!(slot = %self.slot, error = %e, "verified notification failed");
        }
    }

    fn write_status(&mut self) {
        self.metrics.updated_at = Some(self.clock.now());
        if let Err(e) = self.store.write_status(&self.slot, &self.metrics) {
            warn!(slot = %self.slot, error = %e, "status write failed");
        }
    }
}

/// Side effects need `dry_run` off, `auto_buy` on, and click budget left.
/// Insertion-ordered id set that evicts its oldest entry past `capacity`.
#[derive(Debug)]
struct RecentIds {
    capacity: usize,
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl RecentIds {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            ids: HashSet::new(),
        }
    }

    /// `false` if `id` is already remembered.
    fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.ids.remove(&oldest);
        }
        self.order.push_back(id.to_string());
        self.ids.insert(id.to_string());
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.order.len()
    }
}

pub fn may_click(policy: &SlotPolicy, clicks_this_cycle: u32) -> bool {
    !policy.dry_run && policy.auto_buy && clicks_this_cycle < policy.max_clicks_per_cycle
}
