// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics adapter for the Engyne control plane.
//!
//! Components record through the metrics-rs facade via the helpers in
//! [`recording`]. Without an installed recorder those calls are no-ops, so
//! library crates never need to know whether Prometheus is enabled.

pub mod recording;

use engyne_core::EngyneError;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub use recording::{
    record_decision, record_dispatch, record_ingest, record_worker_start, record_worker_stop,
    register_metrics, set_channel_cursor, set_live_workers,
};

/// Owns the global Prometheus recorder handle.
#[derive(Clone)]
pub struct PrometheusAdapter {
    handle: PrometheusHandle,
}

impl PrometheusAdapter {
    /// Install the Prometheus recorder globally.
    ///
    /// Only one recorder can be installed per process; a second call fails.
    pub fn install() -> Result<Self, EngyneError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            EngyneError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;
        register_metrics();
        tracing::info!("prometheus metrics recorder installed");
        Ok(Self { handle })
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl std::fmt::Debug for PrometheusAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusAdapter").finish_non_exhaustive()
    }
}
