// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker process launch seam used by the slot supervisor.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::EngyneError;
use crate::types::SlotId;

/// Everything needed to start one worker run for a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub slot_id: SlotId,
    pub run_id: String,
    pub slots_root: PathBuf,
}

/// How a worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
}

impl WorkerExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Starts worker processes.
#[async_trait]
pub trait WorkerLauncher: Send + Sync + 'static {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn WorkerHandle>, EngyneError>;
}

/// A handle to one running worker.
#[async_trait]
pub trait WorkerHandle: Send + Sync + 'static {
    /// OS process id, if known.
    fn pid(&self) -> Option<u32>;

    /// Non-blocking reap. `Ok(Some(_))` once the worker has exited.
    fn try_wait(&mut self) -> Result<Option<WorkerExit>, EngyneError>;

    /// Request graceful termination, escalating to a kill after `grace`.
    async fn terminate(&mut self, grace: Duration) -> Result<WorkerExit, EngyneError>;

    /// Kill immediately.
    async fn kill(&mut self) -> Result<(), EngyneError>;
}
