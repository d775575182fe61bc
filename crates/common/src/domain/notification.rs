use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fmt;

/// Log-safe form of a recipient key.
///
/// URL keys carry their secret in the path or query, so only the scheme,
/// the host and a short digest of the full URL are kept. Mail addresses
/// pass through.
pub fn redact_recipient(key: &str) -> String {
    let Ok(url) = reqwest::Url::parse(key) else {
        return key.to_string();
    };

    match url.host_str() {
        Some(host) => {
            let digest = hex::encode(Sha256::digest(key.as_bytes()));
            format!("{}://{}/#{}", url.scheme(), host, &digest[..8])
        }
        None => key.to_string(),
    }
}

pub fn redact_recipients(keys: &[String]) -> Vec<String> {
    keys.iter().map(|key| redact_recipient(key)).collect()
}

/// Delivery channel of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Mail,
    Webhook,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mail => f.write_str("mail"),
            Self::Webhook => f.write_str("webhook"),
        }
    }
}

/// Plain-text email
#[derive(Debug, Clone, PartialEq)]
pub struct MailMessage {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    pub fn new(to: Vec<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to,
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// All addresses of the message, to/cc/bcc combined
    pub fn recipients(&self) -> Vec<String> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .cloned()
            .collect()
    }
}

/// JSON payload posted to a webhook URL
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookMessage {
    pub url: String,
    pub payload: serde_json::Value,
}

/// What a notification job delivers
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationPayload {
    Mail(MailMessage),
    Webhook(WebhookMessage),
}

impl NotificationPayload {
    pub fn channel(&self) -> Channel {
        match self {
            Self::Mail(_) => Channel::Mail,
            Self::Webhook(_) => Channel::Webhook,
        }
    }

    /// Recipient keys used for suppression: mail addresses or the webhook URL
    pub fn recipients(&self) -> Vec<String> {
        match self {
            Self::Mail(message) => message.recipients(),
            Self::Webhook(message) => vec![message.url.clone()],
        }
    }

    /// Copy of the payload keeping only the recipients accepted by `keep`;
    /// `None` when no recipient survives
    pub fn retain_recipients<F>(&self, mut keep: F) -> Option<Self>
    where
        F: FnMut(&str) -> bool,
    {
        match self {
            Self::Mail(message) => {
                let mut filter = |list: &[String]| -> Vec<String> {
                    list.iter().filter(|a| keep(a.as_str())).cloned().collect()
                };
                let filtered = MailMessage {
                    to: filter(message.to.as_slice()),
                    cc: filter(message.cc.as_slice()),
                    bcc: filter(message.bcc.as_slice()),
                    subject: message.subject.clone(),
                    body: message.body.clone(),
                };
                if filtered.to.is_empty() && filtered.cc.is_empty() && filtered.bcc.is_empty() {
                    None
                } else {
                    Some(Self::Mail(filtered))
                }
            }
            Self::Webhook(message) => keep(message.url.as_str())
                .then(|| Self::Webhook(message.clone())),
        }
    }
}

/// A unit of work for the notification queue
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationJob {
    pub payload: NotificationPayload,
    pub enqueued_at: DateTime<Utc>,
}

impl NotificationJob {
    pub fn new(payload: NotificationPayload) -> Self {
        Self {
            payload,
            enqueued_at: Utc::now(),
        }
    }

    pub fn mail(message: MailMessage) -> Self {
        Self::new(NotificationPayload::Mail(message))
    }

    pub fn webhook(message: WebhookMessage) -> Self {
        Self::new(NotificationPayload::Webhook(message))
    }
}

/// Outcome of a successful send
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReceipt {
    pub channel: Channel,
    pub recipients: Vec<String>,
    /// Transport response summary (SMTP reply, HTTP status)
    pub detail: String,
}

/// Trait for sending email
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, message: MailMessage) -> DomainResult<DeliveryReceipt>;
}

/// Trait for posting webhook payloads
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn post(&self, message: WebhookMessage) -> DomainResult<DeliveryReceipt>;
}
