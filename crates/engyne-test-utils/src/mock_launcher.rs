// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory worker launcher.
//!
//! Workers never run code; tests drive them by crashing them, hanging them,
//! or writing heartbeats through [`TestHarness`](crate::TestHarness).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use engyne_core::{EngyneError, LaunchSpec, WorkerExit, WorkerHandle, WorkerLauncher};

#[derive(Debug, Default)]
struct WorkerSlotState {
    exit: Option<WorkerExit>,
    terminate_requests: u32,
    killed: bool,
}

#[derive(Debug, Default)]
struct Shared {
    launches: Vec<LaunchSpec>,
    workers: HashMap<String, Arc<Mutex<WorkerSlotState>>>,
}

/// Launcher whose workers live only in memory.
#[derive(Debug, Clone, Default)]
pub struct MockLauncher {
    shared: Arc<Mutex<Shared>>,
    next_pid: Arc<AtomicU32>,
    fail_launch: Arc<AtomicBool>,
    ignore_terminate: Arc<AtomicBool>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockLauncher {
    pub fn new() -> Self {
        Self {
            next_pid: Arc::new(AtomicU32::new(1000)),
            ..Self::default()
        }
    }

    /// Make every following launch fail until reset.
    pub fn fail_launches(&self, fail: bool) {
        self.fail_launch.store(fail, Ordering::SeqCst);
    }

    /// Make workers ignore graceful termination, forcing a kill after grace.
    pub fn ignore_terminate(&self, ignore: bool) {
        self.ignore_terminate.store(ignore, Ordering::SeqCst);
    }

    pub fn launches(&self) -> Vec<LaunchSpec> {
        lock(&self.shared).launches.clone()
    }

    pub fn launch_count(&self) -> usize {
        lock(&self.shared).launches.len()
    }

    /// Launches for one slot, in order.
    pub fn runs_for(&self, slot: &str) -> Vec<String> {
        lock(&self.shared)
            .launches
            .iter()
            .filter(|s| s.slot_id.as_str() == slot)
            .map(|s| s.run_id.clone())
            .collect()
    }

    /// Workers that have not exited.
    pub fn live(&self) -> usize {
        lock(&self.shared)
            .workers
            .values()
            .filter(|w| lock(w).exit.is_none())
            .count()
    }

    /// Simulate the worker for `run_id` exiting on its own.
    pub fn crash(&self, run_id: &str, code: i32) {
        if let Some(worker) = lock(&self.shared).workers.get(run_id) {
            lock(worker).exit = Some(WorkerExit { code: Some(code) });
        }
    }

    /// Number of graceful termination requests the run received.
    pub fn terminate_requests(&self, run_id: &str) -> u32 {
        lock(&self.shared)
            .workers
            .get(run_id)
            .map(|w| lock(w).terminate_requests)
            .unwrap_or(0)
    }

    pub fn was_killed(&self, run_id: &str) -> bool {
        lock(&self.shared)
            .workers
            .get(run_id)
            .is_some_and(|w| lock(w).killed)
    }

    pub fn has_exited(&self, run_id: &str) -> bool {
        lock(&self.shared)
            .workers
            .get(run_id)
            .is_some_and(|w| lock(w).exit.is_some())
    }
}

#[async_trait]
impl WorkerLauncher for MockLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn WorkerHandle>, EngyneError> {
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(EngyneError::Worker {
                message: format!("mock launch failure for {}", spec.slot_id),
                source: None,
            });
        }
        let state = Arc::new(Mutex::new(WorkerSlotState::default()));
        {
            let mut shared = lock(&self.shared);
            shared.launches.push(spec.clone());
            shared.workers.insert(spec.run_id.clone(), state.clone());
        }
        Ok(Box::new(MockWorker {
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            state,
            ignore_terminate: self.ignore_terminate.clone(),
        }))
    }
}

/// Handle returned by [`MockLauncher`].
#[derive(Debug)]
pub struct MockWorker {
    pid: u32,
    state: Arc<Mutex<WorkerSlotState>>,
    ignore_terminate: Arc<AtomicBool>,
}

#[async_trait]
impl WorkerHandle for MockWorker {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn try_wait(&mut self) -> Result<Option<WorkerExit>, EngyneError> {
        Ok(lock(&self.state).exit)
    }

    async fn terminate(&mut self, grace: Duration) -> Result<WorkerExit, EngyneError> {
        {
            let mut state = lock(&self.state);
            state.terminate_requests += 1;
            if let Some(exit) = state.exit {
                return Ok(exit);
            }
            if !self.ignore_terminate.load(Ordering::SeqCst) {
                let exit = WorkerExit { code: Some(0) };
                state.exit = Some(exit);
                return Ok(exit);
            }
        }
        tokio::time::sleep(grace).await;
        self.kill().await?;
        Ok(WorkerExit { code: None })
    }

    async fn kill(&mut self) -> Result<(), EngyneError> {
        let mut state = lock(&self.state);
        state.killed = true;
        state.exit.get_or_insert(WorkerExit { code: None });
        Ok(())
    }
}
