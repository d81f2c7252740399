// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Engyne integration tests.
//!
//! Mock implementations of the core seam traits plus a temp-dir harness,
//! so supervisor, dispatcher, and gateway tests run without processes or
//! network access.
//!
//! - [`MockLauncher`] - in-memory workers with crash and hang injection
//! - [`MockSender`] - captures deliveries, can be told to fail
//! - [`RecordingAlerts`] - captures alerts
//! - [`ManualClock`] - clock advanced by hand
//! - [`TestHarness`] - temp slots/runtime roots with provisioning helpers

pub mod alerts;
pub mod clock;
pub mod harness;
pub mod mock_launcher;
pub mod mock_sender;

pub use alerts::RecordingAlerts;
pub use clock::ManualClock;
pub use harness::TestHarness;
pub use mock_launcher::{MockLauncher, MockWorker};
pub use mock_sender::MockSender;
