// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.

use engyne_core::{Channel, Decision, StopReason};
use metrics::{describe_counter, describe_gauge};

/// Register all Engyne metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!("engyne_worker_starts_total", "Worker processes launched");
    describe_counter!("engyne_worker_stops_total", "Worker runs ended, by reason");
    describe_gauge!("engyne_live_workers", "Worker processes currently supervised");
    describe_counter!("engyne_decisions_total", "Quality decisions by outcome");
    describe_counter!("engyne_ingest_total", "Verified-event submissions by outcome");
    describe_counter!("engyne_dispatch_total", "Dispatch outcomes by channel and status");
    describe_gauge!("engyne_channel_cursor", "Committed queue offset per channel");
}

/// `restart` is false for the first run of a slot.
pub fn record_worker_start(restart: bool) {
    let kind = if restart { "restart" } else { "initial" };
    metrics::counter!("engyne_worker_starts_total", "kind" => kind).increment(1);
}

pub fn record_worker_stop(reason: StopReason) {
    metrics::counter!("engyne_worker_stops_total", "reason" => reason.to_string()).increment(1);
}

pub fn set_live_workers(count: usize) {
    metrics::gauge!("engyne_live_workers").set(count as f64);
}

pub fn record_decision(decision: &Decision) {
    let outcome = if decision.keep { "keep" } else { "reject" };
    let reason = decision.reason.map(|r| r.as_str()).unwrap_or("none");
    metrics::counter!("engyne_decisions_total", "outcome" => outcome, "reason" => reason)
        .increment(1);
}

/// `outcome` is one of `accepted`, `duplicate`, `rejected`.
pub fn record_ingest(outcome: &'static str) {
    metrics::counter!("engyne_ingest_total", "outcome" => outcome).increment(1);
}

pub fn record_dispatch(channel: Channel, status: &'static str) {
    metrics::counter!("engyne_dispatch_total", "channel" => channel.to_string(), "status" => status)
        .increment(1);
}

pub fn set_channel_cursor(channel: Channel, offset: u64) {
    metrics::gauge!("engyne_channel_cursor", "channel" => channel.to_string()).set(offset as f64);
}
