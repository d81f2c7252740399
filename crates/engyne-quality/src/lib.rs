// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quality Decision Engine.
//!
//! [`decide`] is a pure function of a [`SlotPolicy`](engyne_core::SlotPolicy)
//! and one [`ObservedEvent`](engyne_core::ObservedEvent). It performs no I/O,
//! so the worker calls it inline and the preview endpoint calls it on a
//! batch of recent events against a draft policy.

pub mod decide;
pub mod extract;
pub mod matching;
pub mod preview;
pub mod thresholds;

pub use decide::decide;
pub use preview::{PreviewDecision, PreviewReport, preview};
pub use thresholds::{Thresholds, thresholds_for};
