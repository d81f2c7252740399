// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seam traits between the control plane and its side-effecting collaborators.
//!
//! All async traits use `#[async_trait]` so they can be held as trait objects.

pub mod alert;
pub mod clock;
pub mod launcher;
pub mod sender;

pub use alert::AlertSink;
pub use clock::{Clock, SystemClock};
pub use launcher::{LaunchSpec, WorkerExit, WorkerHandle, WorkerLauncher};
pub use sender::{ChannelSender, OutboundDelivery};
