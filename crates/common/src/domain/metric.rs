use crate::domain::reading::{Reading, RainStatus, ServoStatus};
use crate::domain::result::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A plottable metric of a reading
///
/// Categorical metrics map to 0/1 so that averaging a bucket yields the
/// fraction of time spent in the "active" state (raining, cover open).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Temperature = 0,
    Humidity = 1,
    Light = 2,
    Rain = 3,
    Servo = 4,
}

type Accessor = fn(&Reading) -> Option<f64>;

// Indexed by the `Metric` discriminant
const ACCESSORS: [Accessor; 5] = [temperature, humidity, light, rain, servo];

fn temperature(r: &Reading) -> Option<f64> {
    r.temperature
}

fn humidity(r: &Reading) -> Option<f64> {
    r.humidity
}

fn light(r: &Reading) -> Option<f64> {
    r.light_intensity
}

fn rain(r: &Reading) -> Option<f64> {
    r.rain_status
        .map(|s| if s == RainStatus::Rain { 1.0 } else { 0.0 })
}

fn servo(r: &Reading) -> Option<f64> {
    r.servo_status
        .map(|s| if s == ServoStatus::Open { 1.0 } else { 0.0 })
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Temperature,
        Metric::Humidity,
        Metric::Light,
        Metric::Rain,
        Metric::Servo,
    ];

    /// Numeric value of this metric for a reading; missing and non-finite values yield `None`
    pub fn value_of(self, reading: &Reading) -> Option<f64> {
        ACCESSORS[self as usize](reading).filter(|v| v.is_finite())
    }

    /// Like [`Metric::value_of`] but a missing value reads as `0.0`; only non-finite values yield `None`
    pub fn value_or_zero(self, reading: &Reading) -> Option<f64> {
        Some(ACCESSORS[self as usize](reading).unwrap_or(0.0)).filter(|v| v.is_finite())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Light => "light",
            Self::Rain => "rain",
            Self::Servo => "servo",
        }
    }
}

impl FromStr for Metric {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "temperature" => Ok(Self::Temperature),
            "humidity" => Ok(Self::Humidity),
            "light" | "lightintensity" | "light_intensity" => Ok(Self::Light),
            "rain" | "rainstatus" | "rain_status" => Ok(Self::Rain),
            "servo" | "servostatus" | "servo_status" => Ok(Self::Servo),
            other => Err(DomainError::InvalidMetric(other.to_string())),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
