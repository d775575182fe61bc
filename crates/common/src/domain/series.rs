use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One point of a dashboard series, recomputed per query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DownsampledPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl DownsampledPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Series of every metric for the same device and window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesBundle {
    pub temperature: Vec<DownsampledPoint>,
    pub humidity: Vec<DownsampledPoint>,
    pub light: Vec<DownsampledPoint>,
    pub rain: Vec<DownsampledPoint>,
    pub servo: Vec<DownsampledPoint>,
}
