use crate::domain::{
    Channel, DeliveryReceipt, DomainError, DomainResult, WebhookMessage, WebhookSender,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// Identity applied to every webhook post
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscordWebhookConfig {
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Add the configured `username` / `avatar_url` to an object payload unless already present
pub fn with_identity(payload: Value, config: &DiscordWebhookConfig) -> Value {
    let mut object = match payload {
        Value::Object(object) => object,
        other => return other,
    };

    let identity = [
        ("username", config.username.as_deref()),
        ("avatar_url", config.avatar_url.as_deref()),
    ];
    for (key, value) in identity {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            object
                .entry(key)
                .or_insert_with(|| Value::String(value.to_string()));
        }
    }

    Value::Object(object)
}

/// Discord-compatible webhook sender over reqwest
pub struct DiscordWebhookSender {
    client: reqwest::Client,
    config: DiscordWebhookConfig,
}

impl DiscordWebhookSender {
    pub fn new(config: DiscordWebhookConfig) -> DomainResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let client = builder
            .build()
            .map_err(|e| DomainError::InvalidConfiguration(format!("webhook client: {}", e)))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl WebhookSender for DiscordWebhookSender {
    #[instrument(skip(self, message))]
    async fn post(&self, message: WebhookMessage) -> DomainResult<DeliveryReceipt> {
        if message.url.trim().is_empty() {
            return Err(DomainError::DeliveryFailed(
                "Discord webhook URL is not configured".to_string(),
            ));
        }

        let body = with_identity(message.payload, &self.config);

        let response = self
            .client
            .post(&message.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DomainError::DeliveryFailed(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DomainError::DeliveryFailed(format!(
                "webhook responded with {}: {}",
                status, text
            )));
        }

        debug!(status = %status, "webhook delivered");

        Ok(DeliveryReceipt {
            channel: Channel::Webhook,
            recipients: vec![message.url],
            detail: status.to_string(),
        })
    }
}
