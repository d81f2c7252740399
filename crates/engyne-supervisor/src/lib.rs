// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Slot Supervisor and Remote Login Session Arbiter.
//!
//! The [`Supervisor`] keeps at most one live worker per slot, restarts on
//! crashes and stale heartbeats with bounded backoff, and enforces run
//! caps. The [`RemoteLoginArbiter`] grants a single node-wide recovery
//! session and pauses the target slot through the supervisor.

pub mod alerts;
pub mod backoff;
pub mod process;
pub mod remote_login;
pub mod snapshot;
pub mod supervisor;

pub use alerts::{SlackWebhookAlerts, TracingAlerts, alert_sink_from_config};
pub use backoff::RestartBackoff;
pub use process::{ProcessLauncher, pid_alive};
pub use remote_login::{RemoteLoginArbiter, RemoteLoginSession, SessionInfo, SlotController};
pub use snapshot::SlotSnapshot;
pub use supervisor::Supervisor;
