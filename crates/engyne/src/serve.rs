// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `engyne serve` command implementation.
//!
//! Wires the supervisor, remote-login arbiter, verified-event pipeline and
//! dispatcher around one set of slot/runtime stores, then serves the HTTP
//! API until SIGINT or SIGTERM. On shutdown every live worker is stopped
//! gracefully without setting `manual_stop`.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use engyne_config::EngyneConfig;
use engyne_core::{Clock, EngyneError, SystemClock};
use engyne_dispatch::{Dispatcher, VerifiedPipeline};
use engyne_gateway::{AuthConfig, GatewayState, HealthState, ServerConfig, start_server};
use engyne_storage::{RuntimeStore, SlotStore};
use engyne_supervisor::{ProcessLauncher, RemoteLoginArbiter, Supervisor, alert_sink_from_config};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::shutdown;

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(15);

type RenderFn = Arc<dyn Fn() -> String + Send + Sync>;

fn prometheus_render(config: &EngyneConfig) -> Result<Option<RenderFn>, EngyneError> {
    if !config.prometheus.enabled {
        return Ok(None);
    }
    let adapter = engyne_prometheus::PrometheusAdapter::install()?;
    Ok(Some(Arc::new(move || adapter.render())))
}

/// `config_path` is the explicit `--config` file, forwarded to workers.
pub async fn run_serve(config: EngyneConfig, config_path: Option<&Path>) -> Result<(), EngyneError> {
    crate::init_tracing(&config.node.log_level);
    info!(node_id = %config.node.node_id, "starting engyne serve");

    let slots_root = config.paths.slots_root();
    let runtime_root = config.paths.runtime_root();
    std::fs::create_dir_all(&slots_root)?;
    std::fs::create_dir_all(&runtime_root)?;
    let slots = SlotStore::new(&slots_root);
    let runtime = RuntimeStore::new(&runtime_root);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let render = prometheus_render(&config)?;

    if config.gateway.bearer_token.is_none() {
        warn!("gateway.bearer_token is not set; operator routes will reject every request");
    }
    if config.gateway.worker_secret.is_none() {
        warn!("gateway.worker_secret is not set; verified events will be rejected");
    }

    let supervisor = Arc::new(Supervisor::new(
        slots.clone(),
        Arc::new(ProcessLauncher::from_config(&config.supervisor, config_path)?),
        alert_sink_from_config(&config.alerts)?,
        clock.clone(),
        &config.supervisor,
    ));
    let arbiter = Arc::new(RemoteLoginArbiter::new(
        runtime.clone(),
        supervisor.clone(),
        clock.clone(),
        &config.remote_login,
    ));
    let pipeline = Arc::new(VerifiedPipeline::open(
        slots.clone(),
        runtime.clone(),
        config.gateway.worker_secret.clone(),
        clock.clone(),
    )?);
    let dispatcher = Arc::new(Dispatcher::from_config(
        runtime,
        slots,
        &config.dispatcher,
        clock,
    )?);

    let cancel = shutdown::install_signal_handler();
    let mut tasks = JoinSet::new();

    {
        let supervisor = supervisor.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move { supervisor.run(cancel).await });
    }
    {
        let arbiter = arbiter.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move { arbiter.run_sweeper(SESSION_SWEEP_INTERVAL, cancel).await });
    }
    if config.dispatcher.enabled {
        let dispatcher = dispatcher.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move { dispatcher.run(cancel).await });
    } else {
        info!("dispatcher disabled; queues accumulate until it is enabled");
    }

    let state = GatewayState {
        supervisor,
        arbiter,
        pipeline,
        dispatcher,
        auth: AuthConfig {
            bearer_token: config.gateway.bearer_token.clone(),
        },
        health: HealthState {
            start_time: Instant::now(),
            node_id: config.node.node_id.clone(),
            prometheus_render: render,
        },
    };

    let served = start_server(&ServerConfig::from(&config.gateway), state, cancel.clone()).await;
    if let Err(e) = &served {
        error!(error = %e, "gateway stopped with an error");
    }

    // The supervisor task stops its workers on cancellation.
    cancel.cancel();
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "background task ended abnormally");
        }
    }

    info!("engyne serve stopped");
    served
}
