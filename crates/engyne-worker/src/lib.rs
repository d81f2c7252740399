// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker Lifecycle Contract.
//!
//! A worker moves `BOOT -> INIT -> PARSE_LEADS <-> COOLDOWN`, may detour
//! through `LOGIN_REQUIRED`, and ends in `STOPPING` or `ERROR`. While in a
//! live phase it rewrites `slot_state.json` at a bounded interval with a
//! strictly increasing `heartbeat_ts`, persists `status.json` every cycle,
//! and exits promptly once cancelled.

pub mod emitter;
pub mod heartbeat;
pub mod lifecycle;
pub mod runtime;
pub mod source;

pub use emitter::{HttpVerifiedSink, VerifiedSink};
pub use heartbeat::HeartbeatEmitter;
pub use lifecycle::{EXIT_ERROR, EXIT_OK, EXIT_USAGE, PhaseMachine};
pub use runtime::{WorkerOptions, WorkerRuntime};
pub use source::{ClickOutcome, IdleSource, LeadSource, SourcePoll};
