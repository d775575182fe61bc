use crate::domain::metric::Metric;
use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rain sensor state reported by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RainStatus {
    Dry,
    Rain,
}

/// Servo (cover) position reported by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServoStatus {
    Open,
    Closed,
}

/// Whether the device is driving the servo itself or following manual commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceMode {
    Auto,
    Manual,
}

impl RainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dry => "DRY",
            Self::Rain => "RAIN",
        }
    }
}

impl ServoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }
}

impl DeviceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::Manual => "MANUAL",
        }
    }
}

impl FromStr for RainStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRY" => Ok(Self::Dry),
            "RAIN" => Ok(Self::Rain),
            other => Err(format!("unknown rain status: {}", other)),
        }
    }
}

impl FromStr for ServoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            other => Err(format!("unknown servo status: {}", other)),
        }
    }
}

impl FromStr for DeviceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AUTO" => Ok(Self::Auto),
            "MANUAL" => Ok(Self::Manual),
            other => Err(format!("unknown device mode: {}", other)),
        }
    }
}

impl fmt::Display for RainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ServoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain entity for a stored sensor reading
///
/// Every field except the identity and timestamp is optional because reads
/// may project only the columns a query needs. Readings written through
/// `store_reading` always carry the categorical fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub device_id: String,
    pub created_at: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub light_intensity: Option<f64>,
    pub rain_status: Option<RainStatus>,
    pub servo_status: Option<ServoStatus>,
    pub mode: Option<DeviceMode>,
}

/// Sensor payload as published by a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorTelemetry {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub light_intensity: Option<f64>,
    pub rain_status: RainStatus,
    pub servo_status: ServoStatus,
    pub mode: DeviceMode,
}

/// Input for persisting a single reading
#[derive(Debug, Clone, PartialEq)]
pub struct StoreReadingInput {
    pub device_id: String,
    pub created_at: DateTime<Utc>,
    pub telemetry: SensorTelemetry,
}

/// Time window of readings for one device, open-ended towards now
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingWindow {
    pub device_id: String,
    pub since: DateTime<Utc>,
}

/// Input for fetching readings of a window in ascending time order
#[derive(Debug, Clone, PartialEq)]
pub struct FindReadingsInput {
    pub window: ReadingWindow,
    /// Metric columns to project; other optional fields come back empty
    pub metrics: Vec<Metric>,
}

/// Input for a storage-side bucketed aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateReadingsInput {
    pub window: ReadingWindow,
    pub metric: Metric,
    pub bucket_count: usize,
}

/// One bucket of a storage-side aggregation
///
/// Both fields are optional since the storage engine may hand back rows
/// without a usable average; callers validate the shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateBucket {
    pub avg_value: Option<f64>,
    pub avg_time_ms: Option<f64>,
}

/// Input for fetching the most recent readings of a device
#[derive(Debug, Clone, PartialEq)]
pub struct LatestReadingsInput {
    pub device_id: String,
    pub limit: usize,
}

/// Repository trait for telemetry storage operations
/// Infrastructure layer (e.g., PostgreSQL) implements this trait
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TelemetryRepository: Send + Sync {
    /// Count readings in a window
    async fn count_readings(&self, window: ReadingWindow) -> DomainResult<u64>;

    /// Fetch readings in a window ordered by `created_at` ascending
    async fn find_readings(&self, input: FindReadingsInput) -> DomainResult<Vec<Reading>>;

    /// Group the window into `bucket_count` time-ordered buckets and average each one
    async fn aggregate_readings(
        &self,
        input: AggregateReadingsInput,
    ) -> DomainResult<Vec<AggregateBucket>>;

    /// Fetch the latest readings of a device, most recent first
    async fn latest_readings(&self, input: LatestReadingsInput) -> DomainResult<Vec<Reading>>;

    /// Persist a reading
    async fn store_reading(&self, input: StoreReadingInput) -> DomainResult<Reading>;
}
