// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-slot filesystem contract.
//!
//! ```text
//! <slots_root>/<slot_id>/
//!   slot_config.toml   policy (operator-owned)
//!   slot_state.json    worker-written runtime + heartbeat
//!   slot_control.json  supervisor-written control flags
//!   status.json        metrics snapshot
//!   leads.jsonl        observed events, append-only
//!   supervisor.jsonl   corrective-action trace, append-only
//! ```
//!
//! The worker and the supervisor each own one runtime document so neither
//! ever rewrites a file the other writes.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use engyne_core::{EngyneError, ObservedEvent, Phase, SlotId, SlotMetrics, SlotPolicy, StopReason};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::atomic::{append_jsonl, read_json, read_jsonl, read_lines, write_atomic, write_json_atomic};

pub const POLICY_FILE: &str = "slot_config.toml";
pub const WORKER_STATE_FILE: &str = "slot_state.json";
pub const CONTROL_FILE: &str = "slot_control.json";
pub const STATUS_FILE: &str = "status.json";
pub const LEADS_FILE: &str = "leads.jsonl";
pub const TRACE_FILE: &str = "supervisor.jsonl";

/// Runtime document written by the worker on every heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerState {
    pub phase: Phase,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub heartbeat_ts: Option<DateTime<Utc>>,
    /// Policy `version` the worker is running with.
    #[serde(default)]
    pub policy_version: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Control document written only by the supervisor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    #[serde(default)]
    pub manual_stop: bool,
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub run_started_at: Option<DateTime<Utc>>,
    /// Consecutive runs that ended without reaching healthy uptime.
    #[serde(default)]
    pub consecutive_failures: u32,
    /// No launch before this instant (restart backoff).
    #[serde(default)]
    pub next_start_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub restarts: u64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Kinds of automatic or operator actions recorded in `supervisor.jsonl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceAction {
    Started,
    StartRequested,
    StopRequested,
    Stopped,
    Exited,
    StaleRestart,
    BackoffDelay,
    LaunchFailed,
    RunCapStop,
    RemoteLoginStop,
    Released,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub ts: DateTime<Utc>,
    pub action: TraceAction,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub reason: Option<StopReason>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl TraceEntry {
    pub fn new(ts: DateTime<Utc>, action: TraceAction) -> Self {
        Self {
            ts,
            action,
            run_id: None,
            reason: None,
            detail: None,
        }
    }

    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn reason(mut self, reason: StopReason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Handle on the slots root directory.
#[derive(Debug, Clone)]
pub struct SlotStore {
    root: PathBuf,
}

impl SlotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a slot. [`SlotId`] validation keeps this under the root.
    pub fn slot_dir(&self, slot: &SlotId) -> PathBuf {
        self.root.join(slot.as_str())
    }

    fn file(&self, slot: &SlotId, name: &str) -> PathBuf {
        self.slot_dir(slot).join(name)
    }

    pub fn exists(&self, slot: &SlotId) -> bool {
        self.slot_dir(slot).is_dir()
    }

    fn require(&self, slot: &SlotId) -> Result<(), EngyneError> {
        if self.exists(slot) {
            Ok(())
        } else {
            Err(EngyneError::SlotNotFound(slot.to_string()))
        }
    }

    /// Provisioned slots, sorted. Directories with invalid names are ignored.
    pub fn list(&self) -> Result<Vec<SlotId>, EngyneError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut slots = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            match name.to_str().map(SlotId::parse) {
                Some(Ok(slot)) => slots.push(slot),
                _ => debug!(dir = ?name, "ignoring non-slot directory"),
            }
        }
        slots.sort();
        Ok(slots)
    }

    /// Provision a new slot with an initial policy.
    pub fn create(&self, slot: &SlotId, policy: &SlotPolicy) -> Result<(), EngyneError> {
        policy.ensure_valid()?;
        if self.file(slot, POLICY_FILE).exists() {
            return Err(EngyneError::Malformed(format!("slot {slot} already exists")));
        }
        fs::create_dir_all(self.slot_dir(slot))?;
        self.write_policy(slot, policy)
    }

    /// Read and validate the policy. A missing document yields the defaults.
    pub fn read_policy(&self, slot: &SlotId) -> Result<SlotPolicy, EngyneError> {
        self.require(slot)?;
        let path = self.file(slot, POLICY_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SlotPolicy::default());
            }
            Err(e) => return Err(e.into()),
        };
        let policy: SlotPolicy = toml::from_str(&text)
            .map_err(|e| EngyneError::Config(format!("{}: {e}", path.display())))?;
        policy.ensure_valid()?;
        Ok(policy)
    }

    /// Validate and atomically replace the policy document.
    pub fn write_policy(&self, slot: &SlotId, policy: &SlotPolicy) -> Result<(), EngyneError> {
        self.require(slot)?;
        policy.ensure_valid()?;
        let text = toml::to_string_pretty(policy)
            .map_err(|e| EngyneError::Internal(format!("policy serialization: {e}")))?;
        write_atomic(&self.file(slot, POLICY_FILE), text.as_bytes())
    }

    pub fn read_worker_state(&self, slot: &SlotId) -> Option<WorkerState> {
        read_json(&self.file(slot, WORKER_STATE_FILE))
    }

    pub fn write_worker_state(&self, slot: &SlotId, state: &WorkerState) -> Result<(), EngyneError> {
        write_json_atomic(&self.file(slot, WORKER_STATE_FILE), state)
    }

    /// Control flags; absent means "never touched" (auto-start allowed).
    pub fn read_control(&self, slot: &SlotId) -> ControlState {
        read_json(&self.file(slot, CONTROL_FILE)).unwrap_or_default()
    }

    pub fn write_control(&self, slot: &SlotId, control: &ControlState) -> Result<(), EngyneError> {
        write_json_atomic(&self.file(slot, CONTROL_FILE), control)
    }

    pub fn read_status(&self, slot: &SlotId) -> Option<SlotMetrics> {
        read_json(&self.file(slot, STATUS_FILE))
    }

    pub fn write_status(&self, slot: &SlotId, metrics: &SlotMetrics) -> Result<(), EngyneError> {
        write_json_atomic(&self.file(slot, STATUS_FILE), metrics)
    }

    pub fn append_lead(&self, slot: &SlotId, event: &ObservedEvent) -> Result<(), EngyneError> {
        append_jsonl(&self.file(slot, LEADS_FILE), event)
    }

    /// The last `limit` parsable observed events, oldest first.
    pub fn recent_leads(&self, slot: &SlotId, limit: usize) -> Result<Vec<ObservedEvent>, EngyneError> {
        self.require(slot)?;
        let mut leads: Vec<ObservedEvent> = read_jsonl(&self.file(slot, LEADS_FILE))?;
        let skip = leads.len().saturating_sub(limit);
        Ok(leads.split_off(skip))
    }

    pub fn leads_count(&self, slot: &SlotId) -> Result<usize, EngyneError> {
        Ok(read_lines(&self.file(slot, LEADS_FILE))?
            .iter()
            .filter(|l| !l.trim().is_empty())
            .count())
    }

    pub fn append_trace(&self, slot: &SlotId, entry: &TraceEntry) -> Result<(), EngyneError> {
        append_jsonl(&self.file(slot, TRACE_FILE), entry)
    }

    pub fn read_trace(&self, slot: &SlotId) -> Result<Vec<TraceEntry>, EngyneError> {
        read_jsonl(&self.file(slot, TRACE_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SlotStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SlotStore::new(dir.path().join("slots"));
        (dir, store)
    }

    fn slot(id: &str) -> SlotId {
        SlotId::parse(id).unwrap()
    }

    #[test]
    fn list_is_empty_before_provisioning() {
        let (_dir, store) = store();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn create_then_list_and_read_policy() {
        let (_dir, store) = store();
        let policy = SlotPolicy {
            quality_level: 70,
            ..SlotPolicy::default()
        };
        store.create(&slot("b"), &policy).unwrap();
        store.create(&slot("a"), &SlotPolicy::default()).unwrap();
        fs::create_dir_all(store.root().join("not a slot")).unwrap();

        assert_eq!(store.list().unwrap(), vec![slot("a"), slot("b")]);
        assert_eq!(store.read_policy(&slot("b")).unwrap().quality_level, 70);
        assert!(matches!(
            store.create(&slot("a"), &SlotPolicy::default()),
            Err(EngyneError::Malformed(_))
        ));
    }

    #[test]
    fn missing_slot_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.read_policy(&slot("ghost")),
            Err(EngyneError::SlotNotFound(_))
        ));
    }

    #[test]
    fn invalid_policy_is_refused_on_write_and_read() {
        let (_dir, store) = store();
        let id = slot("s1");
        store.create(&id, &SlotPolicy::default()).unwrap();

        let bad = SlotPolicy {
            quality_level: 101,
            ..SlotPolicy::default()
        };
        assert!(matches!(
            store.write_policy(&id, &bad),
            Err(EngyneError::InvalidPolicy { .. })
        ));

        fs::write(store.slot_dir(&id).join(POLICY_FILE), "quality_level = 500\n").unwrap();
        assert!(matches!(
            store.read_policy(&id),
            Err(EngyneError::InvalidPolicy { .. })
        ));

        fs::write(store.slot_dir(&id).join(POLICY_FILE), "qualty = 5\n").unwrap();
        assert!(matches!(store.read_policy(&id), Err(EngyneError::Config(_))));
    }

    #[test]
    fn control_defaults_when_absent() {
        let (_dir, store) = store();
        let id = slot("s1");
        store.create(&id, &SlotPolicy::default()).unwrap();
        assert_eq!(store.read_control(&id), ControlState::default());

        let control = ControlState {
            manual_stop: true,
            stop_reason: Some(StopReason::RunCap),
            ..ControlState::default()
        };
        store.write_control(&id, &control).unwrap();
        assert_eq!(store.read_control(&id), control);
    }

    #[test]
    fn recent_leads_returns_tail_in_order() {
        let (_dir, store) = store();
        let id = slot("s1");
        store.create(&id, &SlotPolicy::default()).unwrap();
        for n in 0..5 {
            let mut event = ObservedEvent::new(Utc::now());
            event.lead_id = Some(format!("lead-{n}"));
            store.append_lead(&id, &event).unwrap();
        }
        let recent = store.recent_leads(&id, 2).unwrap();
        let ids: Vec<_> = recent.iter().filter_map(|e| e.lead_id.clone()).collect();
        assert_eq!(ids, vec!["lead-3", "lead-4"]);
        assert_eq!(store.leads_count(&id).unwrap(), 5);
    }

    #[test]
    fn trace_is_append_only() {
        let (_dir, store) = store();
        let id = slot("s1");
        store.create(&id, &SlotPolicy::default()).unwrap();
        let now = Utc::now();
        store
            .append_trace(&id, &TraceEntry::new(now, TraceAction::Started).run_id("r1"))
            .unwrap();
        store
            .append_trace(
                &id,
                &TraceEntry::new(now, TraceAction::StaleRestart)
                    .run_id("r1")
                    .reason(StopReason::StaleHeartbeat),
            )
            .unwrap();
        let trace = store.read_trace(&id).unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[1].action, TraceAction::StaleRestart);
    }
}
