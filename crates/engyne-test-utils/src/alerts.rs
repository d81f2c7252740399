// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use engyne_core::AlertSink;

/// Alert sink that keeps every `(title, message)` pair.
#[derive(Debug, Clone, Default)]
pub struct RecordingAlerts {
    alerts: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<(String, String)> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    /// Titles only, in arrival order.
    pub fn titles(&self) -> Vec<String> {
        self.alerts().into_iter().map(|(title, _)| title).collect()
    }
}

#[async_trait]
impl AlertSink for RecordingAlerts {
    async fn alert(&self, title: &str, message: &str) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push((title.to_string(), message.to_string()));
        }
    }
}
