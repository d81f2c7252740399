// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The slot supervisor.
//!
//! One coordinating loop per node reconciles every provisioned slot on a
//! fixed tick: launch a worker where none is live, reap exits, restart on
//! stale heartbeats, and enforce run caps. Worker termination runs in
//! spawned tasks so a slow worker never holds up the tick for other slots;
//! a slot with a termination in flight is skipped until it is reaped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use engyne_config::model::SupervisorConfig;
use engyne_core::{
    AlertSink, Clock, EngyneError, HEARTBEAT_STALE_AFTER, LaunchSpec, SlotId, StopReason,
    WorkerExit, WorkerHandle, WorkerLauncher,
};
use engyne_storage::{ControlState, SlotStore, TraceAction, TraceEntry};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::{BOOT_LOOP_ALERT_AFTER, RestartBackoff};
use crate::snapshot::SlotSnapshot;

struct LiveWorker {
    run_id: String,
    started_at: DateTime<Utc>,
    handle: Box<dyn WorkerHandle>,
}

struct Termination {
    run_id: String,
    started_at: DateTime<Utc>,
    /// `None` for an operator restart.
    reason: Option<StopReason>,
    task: JoinHandle<Result<WorkerExit, EngyneError>>,
}

#[derive(Default)]
struct Registry {
    live: HashMap<SlotId, LiveWorker>,
    stopping: HashMap<SlotId, Termination>,
}

type Alerts = Vec<(String, String)>;

pub struct Supervisor {
    slots: SlotStore,
    launcher: Arc<dyn WorkerLauncher>,
    alerts: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    grace: Duration,
    backoff: RestartBackoff,
    registry: Mutex<Registry>,
}

impl Supervisor {
    pub fn new(
        slots: SlotStore,
        launcher: Arc<dyn WorkerLauncher>,
        alerts: Arc<dyn AlertSink>,
        clock: Arc<dyn Clock>,
        config: &SupervisorConfig,
    ) -> Self {
        Self {
            slots,
            launcher,
            alerts,
            clock,
            tick_interval: config.tick_interval(),
            grace: config.stop_grace(),
            backoff: RestartBackoff::from_config(config),
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn store(&self) -> &SlotStore {
        &self.slots
    }

    /// Tick until cancelled, then stop every worker.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(interval = ?self.tick_interval, "supervisor started");
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "supervisor tick failed");
                    }
                }
            }
        }
        self.shutdown().await;
        info!("supervisor stopped");
    }

    /// One reconciliation pass over every provisioned slot.
    pub async fn tick(&self) -> Result<(), EngyneError> {
        let now = self.clock.now();
        let slots = self.slots.list()?;
        let mut alerts = Alerts::new();
        {
            let mut reg = self.registry.lock().await;
            self.reap_finished(&mut reg, now, &mut alerts).await;
            for slot in &slots {
                if let Err(e) = self.reconcile(&mut reg, slot, now, &mut alerts).await {
                    warn!(slot = %slot, error = %e, "slot reconcile failed");
                }
            }
            engyne_prometheus::set_live_workers(reg.live.len());
        }
        self.send_alerts(alerts).await;
        Ok(())
    }

    /// Wait for every in-flight termination and record its outcome.
    pub async fn settle(&self) {
        let mut alerts = Alerts::new();
        {
            let mut reg = self.registry.lock().await;
            let pending: Vec<_> = reg.stopping.drain().collect();
            let now = self.clock.now();
            for (slot, termination) in pending {
                self.finish_termination(&slot, termination, now, &mut alerts).await;
            }
        }
        self.send_alerts(alerts).await;
    }

    /// Gracefully stop every live worker without setting `manual_stop`, so
    /// they start again on the next boot.
    pub async fn shutdown(&self) {
        {
            let mut reg = self.registry.lock().await;
            let live: Vec<SlotId> = reg.live.keys().cloned().collect();
            for slot in live {
                self.begin_termination(&mut reg, &slot, Some(StopReason::Shutdown), false);
            }
        }
        self.settle().await;
        engyne_prometheus::set_live_workers(0);
    }

    /// Clear `manual_stop` so the next tick launches a worker.
    ///
    /// A no-op for a slot that is already enabled and either running or free
    /// to launch.
    pub async fn start(&self, slot: &SlotId) -> Result<SlotSnapshot, EngyneError> {
        self.require(slot)?;
        let now = self.clock.now();
        let reg = self.registry.lock().await;
        let mut control = self.slots.read_control(slot);
        let running = reg.live.contains_key(slot);
        let already_enabled = !control.manual_stop
            && (running || !RestartBackoff::is_waiting(&control, now));
        if !already_enabled {
            control.manual_stop = false;
            control.stop_reason = None;
            RestartBackoff::reset(&mut control);
            self.save_control(slot, &mut control, now)?;
            self.trace(slot, TraceEntry::new(now, TraceAction::StartRequested));
            info!(slot = %slot, "slot start requested");
        }
        Ok(SlotSnapshot::build(&self.slots, slot, running, now))
    }

    /// Set `manual_stop` and gracefully terminate the live worker.
    pub async fn stop(&self, slot: &SlotId) -> Result<SlotSnapshot, EngyneError> {
        self.force_stop(slot, StopReason::Manual).await
    }

    /// Stop with an explicit reason. Stopping an already stopped slot keeps
    /// the original reason.
    pub async fn force_stop(
        &self,
        slot: &SlotId,
        reason: StopReason,
    ) -> Result<SlotSnapshot, EngyneError> {
        self.require(slot)?;
        let now = self.clock.now();
        let mut reg = self.registry.lock().await;
        let mut control = self.slots.read_control(slot);
        let running = reg.live.contains_key(slot);
        if control.manual_stop && !running {
            return Ok(SlotSnapshot::build(&self.slots, slot, false, now));
        }
        if !control.manual_stop {
            control.manual_stop = true;
            control.stop_reason = Some(reason);
            self.save_control(slot, &mut control, now)?;
            let action = match reason {
                StopReason::RemoteLogin => TraceAction::RemoteLoginStop,
                _ => TraceAction::StopRequested,
            };
            let mut entry = TraceEntry::new(now, action).reason(reason);
            if let Some(run_id) = &control.run_id {
                entry = entry.run_id(run_id.clone());
            }
            self.trace(slot, entry);
        }
        info!(slot = %slot, %reason, "slot stop requested");
        self.begin_termination(&mut reg, slot, Some(reason), false);
        Ok(SlotSnapshot::build(&self.slots, slot, false, now))
    }

    /// Stop the live worker and let the next tick start a fresh run.
    /// `manual_stop` ends up cleared.
    pub async fn restart(&self, slot: &SlotId) -> Result<SlotSnapshot, EngyneError> {
        self.require(slot)?;
        let now = self.clock.now();
        let mut reg = self.registry.lock().await;
        let mut control = self.slots.read_control(slot);
        control.manual_stop = false;
        control.stop_reason = None;
        RestartBackoff::reset(&mut control);
        self.save_control(slot, &mut control, now)?;
        self.trace(
            slot,
            TraceEntry::new(now, TraceAction::StartRequested).detail("restart"),
        );
        info!(slot = %slot, "slot restart requested");
        self.begin_termination(&mut reg, slot, None, false);
        Ok(SlotSnapshot::build(&self.slots, slot, false, now))
    }

    /// Clear `manual_stop` only if the slot was stopped for `reason`.
    pub async fn release(&self, slot: &SlotId, reason: StopReason) -> Result<bool, EngyneError> {
        self.require(slot)?;
        let now = self.clock.now();
        let _reg = self.registry.lock().await;
        let mut control = self.slots.read_control(slot);
        if !control.manual_stop || control.stop_reason != Some(reason) {
            debug!(slot = %slot, %reason, "release skipped, slot stopped for another reason");
            return Ok(false);
        }
        control.manual_stop = false;
        control.stop_reason = None;
        RestartBackoff::reset(&mut control);
        self.save_control(slot, &mut control, now)?;
        self.trace(slot, TraceEntry::new(now, TraceAction::Released).reason(reason));
        info!(slot = %slot, %reason, "slot released for auto-resume");
        Ok(true)
    }

    pub async fn snapshot(&self, slot: &SlotId) -> Result<SlotSnapshot, EngyneError> {
        self.require(slot)?;
        let running = self.registry.lock().await.live.contains_key(slot);
        Ok(SlotSnapshot::build(&self.slots, slot, running, self.clock.now()))
    }

    pub async fn list(&self) -> Result<Vec<SlotSnapshot>, EngyneError> {
        let slots = self.slots.list()?;
        let now = self.clock.now();
        let reg = self.registry.lock().await;
        Ok(slots
            .iter()
            .map(|slot| SlotSnapshot::build(&self.slots, slot, reg.live.contains_key(slot), now))
            .collect())
    }

    fn require(&self, slot: &SlotId) -> Result<(), EngyneError> {
        if self.slots.exists(slot) {
            Ok(())
        } else {
            Err(EngyneError::SlotNotFound(slot.to_string()))
        }
    }

    async fn reconcile(
        &self,
        reg: &mut Registry,
        slot: &SlotId,
        now: DateTime<Utc>,
        alerts: &mut Alerts,
    ) -> Result<(), EngyneError> {
        if reg.stopping.contains_key(slot) {
            return Ok(());
        }
        let mut control = self.slots.read_control(slot);

        match reg.live.get_mut(slot).map(|w| w.handle.try_wait()) {
            Some(Ok(None)) => return self.check_running(reg, slot, control, now, alerts),
            Some(Ok(Some(exit))) => {
                if let Some(worker) = reg.live.remove(slot) {
                    self.on_exit(slot, worker, exit, &mut control, now, alerts)?;
                }
            }
            Some(Err(e)) => {
                warn!(slot = %slot, error = %e, "worker status unavailable");
                return Ok(());
            }
            None => {}
        }

        if control.manual_stop || RestartBackoff::is_waiting(&control, now) {
            return Ok(());
        }
        self.launch(reg, slot, control, now, alerts).await
    }

    fn check_running(
        &self,
        reg: &mut Registry,
        slot: &SlotId,
        mut control: ControlState,
        now: DateTime<Utc>,
        alerts: &mut Alerts,
    ) -> Result<(), EngyneError> {
        let Some(worker) = reg.live.get(slot) else {
            return Ok(());
        };
        let run_id = worker.run_id.clone();
        let started_at = worker.started_at;

        if control.manual_stop {
            let reason = control.stop_reason.unwrap_or(StopReason::Manual);
            self.begin_termination(reg, slot, Some(reason), false);
            return Ok(());
        }

        match self.slots.read_policy(slot) {
            Ok(policy) => {
                if let Some(cap) = policy.max_run_minutes
                    && now - started_at >= chrono::Duration::minutes(i64::from(cap))
                {
                    control.manual_stop = true;
                    control.stop_reason = Some(StopReason::RunCap);
                    self.save_control(slot, &mut control, now)?;
                    self.trace(
                        slot,
                        TraceEntry::new(now, TraceAction::RunCapStop)
                            .run_id(run_id.clone())
                            .reason(StopReason::RunCap)
                            .detail(format!("max_run_minutes={cap}")),
                    );
                    warn!(slot = %slot, run_id = %run_id, cap_minutes = cap, "run cap reached, stopping slot");
                    alerts.push((
                        "Run cap reached".into(),
                        format!(
                            "Slot {slot} ran {cap} minutes and was stopped. Start it again to resume."
                        ),
                    ));
                    self.begin_termination(reg, slot, Some(StopReason::RunCap), false);
                    return Ok(());
                }
            }
            Err(e) => debug!(slot = %slot, error = %e, "policy unreadable, run cap not checked"),
        }

        let last_beat = self
            .slots
            .read_worker_state(slot)
            .filter(|w| w.run_id.as_deref() == Some(run_id.as_str()))
            .and_then(|w| w.heartbeat_ts)
            .unwrap_or(started_at);
        let stale = (now - last_beat)
            .to_std()
            .is_ok_and(|age| age > HEARTBEAT_STALE_AFTER);
        if stale {
            let age = (now - last_beat).num_seconds();
            control.stop_reason = Some(StopReason::StaleHeartbeat);
            self.save_control(slot, &mut control, now)?;
            self.trace(
                slot,
                TraceEntry::new(now, TraceAction::StaleRestart)
                    .run_id(run_id.clone())
                    .reason(StopReason::StaleHeartbeat)
                    .detail(format!("heartbeat age {age}s")),
            );
            warn!(slot = %slot, run_id = %run_id, age_secs = age, "stale heartbeat, killing worker");
            alerts.push((
                "Stale worker restarted".into(),
                format!("Slot {slot} run {run_id} missed heartbeats for {age}s and is being restarted."),
            ));
            self.begin_termination(reg, slot, Some(StopReason::StaleHeartbeat), true);
        }
        Ok(())
    }

    fn on_exit(
        &self,
        slot: &SlotId,
        worker: LiveWorker,
        exit: WorkerExit,
        control: &mut ControlState,
        now: DateTime<Utc>,
        alerts: &mut Alerts,
    ) -> Result<(), EngyneError> {
        control.pid = None;
        self.trace(
            slot,
            TraceEntry::new(now, TraceAction::Exited)
                .run_id(worker.run_id.clone())
                .detail(describe_exit(exit)),
        );
        if control.manual_stop {
            info!(slot = %slot, run_id = %worker.run_id, "worker exited while stopped");
            return self.save_control(slot, control, now);
        }

        control.stop_reason = Some(StopReason::Crashed);
        engyne_prometheus::record_worker_stop(StopReason::Crashed);
        let uptime = (now - worker.started_at).to_std().ok();
        let delay = self.backoff.record_failure(control, now, uptime);
        warn!(
            slot = %slot,
            run_id = %worker.run_id,
            exit = %describe_exit(exit),
            failures = control.consecutive_failures,
            ?delay,
            "worker exited unexpectedly"
        );
        self.note_backoff(slot, control, now, delay, alerts);
        self.save_control(slot, control, now)
    }

    async fn launch(
        &self,
        reg: &mut Registry,
        slot: &SlotId,
        mut control: ControlState,
        now: DateTime<Utc>,
        alerts: &mut Alerts,
    ) -> Result<(), EngyneError> {
        match self.slots.read_policy(slot) {
            Ok(_) => {}
            Err(e @ (EngyneError::InvalidPolicy { .. } | EngyneError::Config(_))) => {
                control.manual_stop = true;
                control.stop_reason = Some(StopReason::BootFailure);
                self.save_control(slot, &mut control, now)?;
                self.trace(
                    slot,
                    TraceEntry::new(now, TraceAction::LaunchFailed)
                        .reason(StopReason::BootFailure)
                        .detail(e.to_string()),
                );
                warn!(slot = %slot, error = %e, "slot policy invalid, slot stopped");
                alerts.push((
                    "Slot policy invalid".into(),
                    format!("Slot {slot} was not started: {e}"),
                ));
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let spec = LaunchSpec {
            slot_id: slot.clone(),
            run_id: run_id.clone(),
            slots_root: self.slots.root().to_path_buf(),
        };
        match self.launcher.launch(&spec).await {
            Ok(handle) => {
                let restart = control.run_id.is_some();
                if restart {
                    control.restarts += 1;
                }
                control.run_id = Some(run_id.clone());
                control.pid = handle.pid();
                control.run_started_at = Some(now);
                control.stop_reason = None;
                self.save_control(slot, &mut control, now)?;
                self.trace(slot, TraceEntry::new(now, TraceAction::Started).run_id(run_id.clone()));
                info!(slot = %slot, run_id = %run_id, pid = ?handle.pid(), restart, "worker started");
                engyne_prometheus::record_worker_start(restart);
                reg.live.insert(
                    slot.clone(),
                    LiveWorker {
                        run_id,
                        started_at: now,
                        handle,
                    },
                );
            }
            Err(e) => {
                control.stop_reason = Some(StopReason::BootFailure);
                let delay = self.backoff.record_failure(&mut control, now, None);
                self.trace(
                    slot,
                    TraceEntry::new(now, TraceAction::LaunchFailed)
                        .run_id(run_id)
                        .reason(StopReason::BootFailure)
                        .detail(e.to_string()),
                );
                warn!(slot = %slot, error = %e, failures = control.consecutive_failures, ?delay, "worker launch failed");
                self.note_backoff(slot, &control, now, delay, alerts);
                self.save_control(slot, &mut control, now)?;
            }
        }
        Ok(())
    }

    fn note_backoff(
        &self,
        slot: &SlotId,
        control: &ControlState,
        now: DateTime<Utc>,
        delay: Duration,
        alerts: &mut Alerts,
    ) {
        if !delay.is_zero() {
            self.trace(
                slot,
                TraceEntry::new(now, TraceAction::BackoffDelay).detail(format!(
                    "attempt {} delayed {}s",
                    control.consecutive_failures,
                    delay.as_secs()
                )),
            );
        }
        if control.consecutive_failures == BOOT_LOOP_ALERT_AFTER {
            alerts.push((
                "Worker failing repeatedly".into(),
                format!(
                    "Slot {slot} failed {} times in a row; restarts are backing off.",
                    control.consecutive_failures
                ),
            ));
        }
    }

    /// Move the live worker (if any) into a spawned termination task.
    fn begin_termination(
        &self,
        reg: &mut Registry,
        slot: &SlotId,
        reason: Option<StopReason>,
        force: bool,
    ) {
        let Some(LiveWorker {
            run_id,
            started_at,
            mut handle,
        }) = reg.live.remove(slot)
        else {
            return;
        };
        let grace = self.grace;
        let task = tokio::spawn(async move {
            if force {
                handle.kill().await?;
                Ok(WorkerExit { code: None })
            } else {
                handle.terminate(grace).await
            }
        });
        reg.stopping.insert(
            slot.clone(),
            Termination {
                run_id,
                started_at,
                reason,
                task,
            },
        );
    }

    async fn reap_finished(&self, reg: &mut Registry, now: DateTime<Utc>, alerts: &mut Alerts) {
        let done: Vec<SlotId> = reg
            .stopping
            .iter()
            .filter(|(_, t)| t.task.is_finished())
            .map(|(slot, _)| slot.clone())
            .collect();
        for slot in done {
            if let Some(termination) = reg.stopping.remove(&slot) {
                self.finish_termination(&slot, termination, now, alerts).await;
            }
        }
    }

    async fn finish_termination(
        &self,
        slot: &SlotId,
        termination: Termination,
        now: DateTime<Utc>,
        alerts: &mut Alerts,
    ) {
        let Termination {
            run_id,
            started_at,
            reason,
            task,
        } = termination;
        let detail = match task.await {
            Ok(Ok(exit)) => describe_exit(exit),
            Ok(Err(e)) => {
                warn!(slot = %slot, run_id = %run_id, error = %e, "worker termination failed");
                format!("termination failed: {e}")
            }
            Err(e) => {
                error!(slot = %slot, run_id = %run_id, error = %e, "termination task panicked");
                format!("termination task failed: {e}")
            }
        };

        let mut control = self.slots.read_control(slot);
        if control.run_id.as_deref() == Some(run_id.as_str()) {
            control.pid = None;
        }
        let mut entry = TraceEntry::new(now, TraceAction::Stopped)
            .run_id(run_id.clone())
            .detail(detail);
        if let Some(reason) = reason {
            entry = entry.reason(reason);
            engyne_prometheus::record_worker_stop(reason);
            match reason {
                StopReason::StaleHeartbeat => {
                    let uptime = (now - started_at).to_std().ok();
                    let delay = self.backoff.record_failure(&mut control, now, uptime);
                    self.note_backoff(slot, &control, now, delay, alerts);
                }
                StopReason::Shutdown if !control.manual_stop => {
                    control.stop_reason = Some(StopReason::Shutdown);
                }
                _ => {}
            }
        }
        self.trace(slot, entry);
        info!(slot = %slot, run_id = %run_id, ?reason, "worker stopped");
        if let Err(e) = self.save_control(slot, &mut control, now) {
            warn!(slot = %slot, error = %e, "control write failed");
        }
    }

    fn save_control(
        &self,
        slot: &SlotId,
        control: &mut ControlState,
        now: DateTime<Utc>,
    ) -> Result<(), EngyneError> {
        control.updated_at = Some(now);
        self.slots.write_control(slot, control)
    }

    fn trace(&self, slot: &SlotId, entry: TraceEntry) {
        if let Err(e) = self.slots.append_trace(slot, &entry) {
            warn!(slot = %slot, error = %e, "trace append failed");
        }
    }

    async fn send_alerts(&self, alerts: Alerts) {
        for (title, message) in alerts {
            self.alerts.alert(&title, &message).await;
        }
    }
}

fn describe_exit(exit: WorkerExit) -> String {
    match exit.code {
        Some(code) => format!("exit code {code}"),
        None => "killed by signal".to_string(),
    }
}
