// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alert sinks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use engyne_config::model::AlertsConfig;
use engyne_core::{AlertSink, EngyneError};
use tracing::warn;

/// Logs alerts at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlerts;

#[async_trait]
impl AlertSink for TracingAlerts {
    async fn alert(&self, title: &str, message: &str) {
        warn!(alert = title, "{message}");
    }
}

/// Posts alerts to a Slack incoming webhook. Delivery failures are logged
/// and dropped.
pub struct SlackWebhookAlerts {
    client: reqwest::Client,
    url: String,
}

impl std::fmt::Debug for SlackWebhookAlerts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackWebhookAlerts")
            .field("url", &"[REDACTED]")
            .finish()
    }
}

impl SlackWebhookAlerts {
    pub fn new(url: impl Into<String>) -> Result<Self, EngyneError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| EngyneError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlertSink for SlackWebhookAlerts {
    async fn alert(&self, title: &str, message: &str) {
        TracingAlerts.alert(title, message).await;
        let text = format!(
            "*{title}*\n{message}\nTime: {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        );
        let result = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);
        if let Err(e) = result {
            warn!(error = %e, "slack alert delivery failed");
        }
    }
}

/// Slack when a webhook is configured, otherwise log only.
pub fn alert_sink_from_config(config: &AlertsConfig) -> Result<Arc<dyn AlertSink>, EngyneError> {
    let sink: Arc<dyn AlertSink> = match &config.slack_webhook_url {
        Some(url) => Arc::new(SlackWebhookAlerts::new(url)?),
        None => Arc::new(TracingAlerts),
    };
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    #[traced_test]
    async fn tracing_sink_logs_title_and_message() {
        TracingAlerts.alert("Stale heartbeat", "slot s1 restarted").await;
        assert!(logs_contain("Stale heartbeat"));
        assert!(logs_contain("slot s1 restarted"));
    }

    #[tokio::test]
    async fn posts_title_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_string_contains("*Run cap reached*"))
            .and(body_string_contains("slot s1 stopped"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = SlackWebhookAlerts::new(format!("{}/hook", server.uri())).unwrap();
        sink.alert("Run cap reached", "slot s1 stopped").await;
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let sink = SlackWebhookAlerts::new(server.uri()).unwrap();
        sink.alert("t", "m").await;
    }

    #[test]
    fn config_without_url_logs_only() {
        assert!(alert_sink_from_config(&AlertsConfig::default()).is_ok());
    }
}
