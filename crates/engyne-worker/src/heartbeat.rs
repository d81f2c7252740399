// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Heartbeat writer for `slot_state.json`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use engyne_core::{Clock, EngyneError, Phase, SlotId};
use engyne_storage::{SlotStore, WorkerState};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::lifecycle::PhaseMachine;

/// Writes the worker runtime document, keeping `heartbeat_ts` strictly
/// increasing even if the wall clock stalls or steps back.
pub struct HeartbeatEmitter {
    store: SlotStore,
    slot: SlotId,
    run_id: String,
    pid: Option<u32>,
    clock: Arc<dyn Clock>,
    machine: PhaseMachine,
    last: Option<DateTime<Utc>>,
    message: Option<String>,
    policy_version: Option<u32>,
}

impl HeartbeatEmitter {
    pub fn new(
        store: SlotStore,
        slot: SlotId,
        run_id: impl Into<String>,
        pid: Option<u32>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            slot,
            run_id: run_id.into(),
            pid,
            clock,
            machine: PhaseMachine::new(),
            last: None,
            message: None,
            policy_version: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    pub fn set_policy_version(&mut self, version: Option<u32>) {
        self.policy_version = version;
    }

    /// Move to `phase` and write a heartbeat immediately.
    pub fn transition(&mut self, phase: Phase, message: Option<String>) -> Result<(), EngyneError> {
        self.machine.transition(phase)?;
        self.message = message;
        self.beat()?;
        Ok(())
    }

    /// Rewrite the state document with a fresh timestamp.
    pub fn beat(&mut self) -> Result<DateTime<Utc>, EngyneError> {
        let mut ts = self.clock.now();
        if let Some(last) = self.last
            && ts <= last
        {
            ts = last + chrono::Duration::microseconds(1);
        }
        self.store.write_worker_state(
            &self.slot,
            &WorkerState {
                phase: self.machine.phase(),
                pid: self.pid,
                run_id: Some(self.run_id.clone()),
                heartbeat_ts: Some(ts),
                policy_version: self.policy_version,
                message: self.message.clone(),
            },
        )?;
        self.last = Some(ts);
        Ok(ts)
    }
}

/// Re-emit the current phase every `interval` until cancelled.
///
/// Beats stop once the phase is terminal.
pub fn spawn_ticker(
    emitter: Arc<Mutex<HeartbeatEmitter>>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let mut emitter = emitter.lock().await;
                    if emitter.phase().is_terminal() {
                        break;
                    }
                    match emitter.beat() {
                        Ok(ts) => debug!(%ts, "heartbeat"),
                        Err(e) => warn!(error = %e, "heartbeat write failed"),
                    }
                }
            }
        }
    })
}
