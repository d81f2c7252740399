// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Verified-event notification from worker to control plane.

use std::time::Duration;

use async_trait::async_trait;
use engyne_core::{EngyneError, VerifiedEvent, WORKER_SECRET_HEADER};
use tracing::debug;

#[async_trait]
pub trait VerifiedSink: Send + Sync + 'static {
    async fn emit(&self, event: &VerifiedEvent) -> Result<(), EngyneError>;
}

/// Posts to `POST {api_base}/events/verified` with the worker secret header.
pub struct HttpVerifiedSink {
    client: reqwest::Client,
    url: String,
    secret: String,
}

impl std::fmt::Debug for HttpVerifiedSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpVerifiedSink")
            .field("url", &self.url)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl HttpVerifiedSink {
    pub fn new(api_base: &str, secret: impl Into<String>) -> Result<Self, EngyneError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| EngyneError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            url: format!("{}/events/verified", api_base.trim_end_matches('/')),
            secret: secret.into(),
        })
    }
}

#[async_trait]
impl VerifiedSink for HttpVerifiedSink {
    async fn emit(&self, event: &VerifiedEvent) -> Result<(), EngyneError> {
        let response = self
            .client
            .post(&self.url)
            .header(WORKER_SECRET_HEADER, &self.secret)
            .json(event)
            .send()
            .await
            .map_err(|e| EngyneError::Delivery {
                channel: "verified".into(),
                message: e.to_string(),
                source: Some(Box::new(e)),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngyneError::delivery(
                "verified",
                format!("ingest returned {status}"),
            ));
        }
        debug!(lead_id = ?event.lead_id, "verified event accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use engyne_core::SlotId;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn event() -> VerifiedEvent {
        VerifiedEvent {
            slot_id: SlotId::parse("s1").unwrap(),
            lead_id: Some("L1".into()),
            observed_at: Utc::now(),
            title: None,
            payload: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn posts_with_secret_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/events/verified"))
            .and(header(WORKER_SECRET_HEADER, "wk"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let sink = HttpVerifiedSink::new(&format!("{}/", server.uri()), "wk").unwrap();
        sink.emit(&event()).await.unwrap();
    }

    #[tokio::test]
    async fn non_success_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let sink = HttpVerifiedSink::new(&server.uri(), "bad").unwrap();
        assert!(matches!(
            sink.emit(&event()).await,
            Err(EngyneError::Delivery { .. })
        ));
    }
}
