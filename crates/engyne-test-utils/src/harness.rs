// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Temp-dir backed environment for integration tests.

use std::path::Path;

use chrono::{DateTime, Utc};
use engyne_config::EngyneConfig;
use engyne_core::{EngyneError, Phase, SlotId, SlotPolicy};
use engyne_storage::{RuntimeStore, SlotStore, WorkerState};
use tempfile::TempDir;

use crate::clock::ManualClock;

/// Slots and runtime roots under one temp dir, plus a manual clock.
///
/// The config's `paths` point at the temp roots. The directory is removed
/// when the harness is dropped.
pub struct TestHarness {
    dir: TempDir,
    pub slots: SlotStore,
    pub runtime: RuntimeStore,
    pub config: EngyneConfig,
    pub clock: ManualClock,
}

impl TestHarness {
    pub fn new() -> Result<Self, EngyneError> {
        let dir = TempDir::new()?;
        let slots_root = dir.path().join("slots");
        let runtime_root = dir.path().join("runtime");
        std::fs::create_dir_all(&slots_root)?;
        std::fs::create_dir_all(&runtime_root)?;

        let mut config = EngyneConfig::default();
        config.paths.slots_root = slots_root.display().to_string();
        config.paths.runtime_root = runtime_root.display().to_string();

        Ok(Self {
            slots: SlotStore::new(&slots_root),
            runtime: RuntimeStore::new(&runtime_root),
            dir,
            config,
            clock: ManualClock::new(),
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Create a slot with `policy`.
    pub fn provision(&self, id: &str, policy: SlotPolicy) -> Result<SlotId, EngyneError> {
        let slot = SlotId::parse(id)?;
        self.slots.create(&slot, &policy)?;
        Ok(slot)
    }

    /// A policy with dispatch side effects allowed on the given channels.
    pub fn live_policy(channels: &[engyne_core::Channel]) -> SlotPolicy {
        let mut policy = SlotPolicy {
            dry_run: false,
            ..SlotPolicy::default()
        };
        for channel in channels {
            match channel {
                engyne_core::Channel::Whatsapp => policy.channels.whatsapp = true,
                engyne_core::Channel::Telegram => policy.channels.telegram = true,
                engyne_core::Channel::Email => policy.channels.email = true,
                engyne_core::Channel::Sheets => policy.channels.sheets = true,
                engyne_core::Channel::Push => policy.channels.push = true,
                engyne_core::Channel::Slack => policy.channels.slack = true,
            }
        }
        policy
    }

    /// Write a worker heartbeat as the worker for `run_id` would.
    pub fn heartbeat(
        &self,
        slot: &SlotId,
        run_id: &str,
        phase: Phase,
        at: DateTime<Utc>,
    ) -> Result<(), EngyneError> {
        self.slots.write_worker_state(
            slot,
            &WorkerState {
                phase,
                pid: None,
                run_id: Some(run_id.to_string()),
                heartbeat_ts: Some(at),
                policy_version: None,
                message: None,
            },
        )
    }
}
