use crate::domain::result::{DomainError, DomainResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Domain entity for a registered field device
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    /// Storage identifier, referenced by readings
    pub id: String,
    /// External stable identifier the device reports under
    pub device_key: String,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Repository input for registering a device
#[derive(Debug, Clone)]
pub struct CreateDeviceInput {
    pub id: String,
    pub device_key: String,
    pub name: String,
}

/// Repository trait for device lookups
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// Register a new device
    async fn create_device(&self, input: CreateDeviceInput) -> DomainResult<Device>;

    /// Resolve an external device key to its storage identifier
    async fn find_device_id_by_key(&self, device_key: &str) -> DomainResult<Option<String>>;

    /// All registered devices, newest first
    async fn list_devices(&self) -> DomainResult<Vec<Device>>;
}

pub const MAX_DEVICE_KEY_LEN: usize = 128;

/// Trimmed device key, rejected when empty or longer than `MAX_DEVICE_KEY_LEN` characters
pub fn validate_device_key(device_key: &str) -> DomainResult<&str> {
    let key = device_key.trim();
    if key.is_empty() {
        return Err(DomainError::InvalidDeviceKey(
            "device key must not be empty".to_string(),
        ));
    }
    if key.chars().count() > MAX_DEVICE_KEY_LEN {
        return Err(DomainError::InvalidDeviceKey(format!(
            "device key longer than {} characters",
            MAX_DEVICE_KEY_LEN
        )));
    }
    Ok(key)
}
