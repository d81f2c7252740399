// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Engyne control plane.
//!
//! Provides the error type, shared domain types, the typed slot policy, and
//! the seam traits implemented by the supervisor, dispatcher, and test mocks.

pub mod error;
pub mod policy;
pub mod traits;
pub mod types;
pub mod verified;

pub use error::EngyneError;
pub use policy::{ChannelToggles, PolicyIssue, SlotPolicy};
pub use traits::{
    AlertSink, ChannelSender, Clock, LaunchSpec, OutboundDelivery, SystemClock, WorkerExit,
    WorkerHandle, WorkerLauncher,
};
pub use types::{
    Channel, ContactAvailability, ContactMethod, Decision, HEARTBEAT_STALE_AFTER, ObservedEvent,
    Phase, RejectReason, SlotId, SlotMetrics, StopReason,
};
pub use verified::{VerifiedEvent, WORKER_SECRET_HEADER};
