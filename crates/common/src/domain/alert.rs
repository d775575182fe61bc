use crate::domain::reading::Reading;
use std::collections::BTreeSet;
use std::fmt;

/// Reading fields watched for automatic state changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MonitoredField {
    RainStatus,
    ServoStatus,
}

impl MonitoredField {
    pub const ALL: [MonitoredField; 2] = [MonitoredField::RainStatus, MonitoredField::ServoStatus];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RainStatus => "rainStatus",
            Self::ServoStatus => "servoStatus",
        }
    }

    /// Whether this field differs between two readings
    pub fn differs(&self, previous: &Reading, current: &Reading) -> bool {
        match self {
            Self::RainStatus => previous.rain_status != current.rain_status,
            Self::ServoStatus => previous.servo_status != current.servo_status,
        }
    }

    /// Display value of this field on a reading
    pub fn value_on(&self, reading: &Reading) -> &'static str {
        match self {
            Self::RainStatus => reading.rain_status.map(|s| s.as_str()),
            Self::ServoStatus => reading.servo_status.map(|s| s.as_str()),
        }
        .unwrap_or("UNKNOWN")
    }
}

impl fmt::Display for MonitoredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected change of automatic state between two consecutive readings
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub device_id: String,
    pub previous: Reading,
    pub current: Reading,
    pub changed_fields: BTreeSet<MonitoredField>,
}
