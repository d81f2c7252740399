// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook-backed channel senders.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use engyne_config::model::DispatcherConfig;
use engyne_core::{Channel, ChannelSender, EngyneError, OutboundDelivery};
use strum::IntoEnumIterator;
use tracing::debug;

pub const CHANNEL_SECRET_HEADER: &str = "X-Engyne-Channel-Secret";

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts each delivery as JSON to the channel's configured webhook.
pub struct WebhookSender {
    channel: Channel,
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
}

impl std::fmt::Debug for WebhookSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSender")
            .field("channel", &self.channel)
            .field("url", &self.url)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl WebhookSender {
    pub fn new(
        channel: Channel,
        url: impl Into<String>,
        secret: Option<String>,
    ) -> Result<Self, EngyneError> {
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| EngyneError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            channel,
            client,
            url: url.into(),
            secret,
        })
    }
}

#[async_trait]
impl ChannelSender for WebhookSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, delivery: &OutboundDelivery) -> Result<(), EngyneError> {
        let mut request = self.client.post(&self.url).json(delivery);
        if let Some(secret) = &self.secret {
            request = request.header(CHANNEL_SECRET_HEADER, secret);
        }
        let response = request.send().await.map_err(|e| EngyneError::Delivery {
            channel: self.channel.to_string(),
            message: format!("webhook request failed: {e}"),
            source: Some(Box::new(e)),
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngyneError::delivery(
                self.channel,
                format!("webhook returned {status}"),
            ));
        }
        debug!(channel = %self.channel, "webhook delivered");
        Ok(())
    }
}

/// Senders for every channel with a configured webhook URL.
pub fn senders_from_config(
    config: &DispatcherConfig,
) -> Result<HashMap<Channel, Arc<dyn ChannelSender>>, EngyneError> {
    let mut senders: HashMap<Channel, Arc<dyn ChannelSender>> = HashMap::new();
    for channel in Channel::iter() {
        let Some(endpoint) = config.endpoint(channel) else {
            continue;
        };
        let Some(url) = endpoint.webhook_url.as_deref().filter(|u| !u.trim().is_empty()) else {
            continue;
        };
        let sender = WebhookSender::new(channel, url, endpoint.webhook_secret.clone())?;
        senders.insert(channel, Arc::new(sender));
    }
    Ok(senders)
}
