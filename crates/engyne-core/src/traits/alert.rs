// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator alerting seam.

use async_trait::async_trait;

/// Receives alert-worthy events (run-cap stops, stale restarts, boot loops).
///
/// Implementations must never fail the caller: delivery problems are logged
/// and swallowed.
#[async_trait]
pub trait AlertSink: Send + Sync + 'static {
    async fn alert(&self, title: &str, message: &str);
}
