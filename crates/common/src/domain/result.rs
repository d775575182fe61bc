use crate::domain::notification::redact_recipients;
use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid device key: {0}")]
    InvalidDeviceKey(String),

    #[error("Invalid metric: {0}")]
    InvalidMetric(String),

    #[error("Storage aggregation failed: {0}")]
    AggregationFailed(String),

    #[error("All recipients suppressed: {}", redact_recipients(.0).join(", "))]
    RecipientsSuppressed(Vec<String>),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Mail transporter is not initialized")]
    MailerNotConfigured,

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Notification queue is closed")]
    QueueClosed,

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}
