// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `engyne worker` command: one slot worker process.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use engyne_config::EngyneConfig;
use engyne_config::model::GatewayConfig;
use engyne_core::{SlotId, SystemClock};
use engyne_storage::SlotStore;
use engyne_worker::{EXIT_ERROR, EXIT_USAGE, HttpVerifiedSink, IdleSource, WorkerOptions, WorkerRuntime};
use tracing::{error, warn};

use crate::shutdown;

/// Base URL the worker uses to reach its own node's API.
pub(crate) fn api_base(gateway: &GatewayConfig) -> String {
    let host = match gateway.host.as_str() {
        "0.0.0.0" => "127.0.0.1",
        "::" => "[::1]",
        other => other,
    };
    format!("http://{host}:{}", gateway.port)
}

pub(crate) fn options(config: &EngyneConfig) -> WorkerOptions {
    WorkerOptions {
        heartbeat_interval: Duration::from_secs(config.supervisor.heartbeat_interval_secs.max(1)),
        ..WorkerOptions::default()
    }
}

pub async fn run_worker(
    config: EngyneConfig,
    slots_root: PathBuf,
    slot_id: &str,
    run_id: String,
) -> i32 {
    crate::init_tracing(&config.node.log_level);

    let slot = match SlotId::parse(slot_id) {
        Ok(slot) => slot,
        Err(e) => {
            error!(error = %e, "refusing to start worker");
            return EXIT_USAGE;
        }
    };

    let mut runtime = WorkerRuntime::new(
        SlotStore::new(slots_root),
        slot.clone(),
        run_id,
        Arc::new(SystemClock),
        Box::new(IdleSource),
        options(&config),
    );

    match config.gateway.worker_secret.as_deref() {
        Some(secret) if !secret.is_empty() => {
            match HttpVerifiedSink::new(&api_base(&config.gateway), secret) {
                Ok(sink) => runtime = runtime.with_sink(Arc::new(sink)),
                Err(e) => {
                    error!(slot = %slot, error = %e, "cannot build verified-event client");
                    return EXIT_ERROR;
                }
            }
        }
        _ => warn!(slot = %slot, "no worker_secret configured; verified events will not be emitted"),
    }

    runtime.run(shutdown::install_signal_handler()).await
}
