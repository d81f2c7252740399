// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Merged per-slot runtime view served by the control API.

use chrono::{DateTime, Utc};
use engyne_core::{Phase, SlotId, SlotMetrics, StopReason};
use engyne_storage::{ControlState, SlotStore, WorkerState};
use serde::Serialize;

use crate::process::pid_alive;

/// Worker document, supervisor control flags, and metrics for one slot.
///
/// Built from tolerant reads, so it may be slightly stale but is never torn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotSnapshot {
    pub slot_id: SlotId,
    pub phase: Phase,
    /// The supervisor currently owns a live worker for this slot.
    pub running: bool,
    pub pid: Option<u32>,
    pub pid_alive: bool,
    pub run_id: Option<String>,
    pub run_started_at: Option<DateTime<Utc>>,
    pub heartbeat_ts: Option<DateTime<Utc>>,
    pub heartbeat_age_secs: Option<i64>,
    pub manual_stop: bool,
    pub stop_reason: Option<StopReason>,
    pub consecutive_failures: u32,
    pub next_start_after: Option<DateTime<Utc>>,
    pub restarts: u64,
    pub message: Option<String>,
    pub policy_version: Option<u32>,
    pub metrics: Option<SlotMetrics>,
    pub leads_count: usize,
}

impl SlotSnapshot {
    pub(crate) fn build(
        store: &SlotStore,
        slot: &SlotId,
        running: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let control = store.read_control(slot);
        let worker = store
            .read_worker_state(slot)
            .filter(|w| w.run_id.is_some() && w.run_id == control.run_id);
        Self::merge(store, slot, running, now, control, worker)
    }

    fn merge(
        store: &SlotStore,
        slot: &SlotId,
        running: bool,
        now: DateTime<Utc>,
        control: ControlState,
        worker: Option<WorkerState>,
    ) -> Self {
        let phase = match (&worker, running) {
            (Some(w), true) => w.phase,
            (None, true) => Phase::Boot,
            (_, false) => Phase::Stopped,
        };
        let heartbeat_ts = worker.as_ref().and_then(|w| w.heartbeat_ts);
        Self {
            slot_id: slot.clone(),
            phase,
            running,
            pid: control.pid,
            pid_alive: control.pid.is_some_and(pid_alive),
            run_id: control.run_id,
            run_started_at: control.run_started_at,
            heartbeat_ts,
            heartbeat_age_secs: heartbeat_ts.map(|ts| (now - ts).num_seconds()),
            manual_stop: control.manual_stop,
            stop_reason: control.stop_reason,
            consecutive_failures: control.consecutive_failures,
            next_start_after: control.next_start_after,
            restarts: control.restarts,
            message: worker.as_ref().and_then(|w| w.message.clone()),
            policy_version: worker.as_ref().and_then(|w| w.policy_version),
            metrics: store.read_status(slot),
            leads_count: store.leads_count(slot).unwrap_or(0),
        }
    }
}
