use crate::domain::{downsample, round_to_two};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::domain::{
    AggregateBucket, AggregateReadingsInput, DomainError, DomainResult, DownsampledPoint,
    FindReadingsInput, Metric, ReadingWindow, TelemetryRepository,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// One metric of one device since a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesWindow {
    pub device_id: String,
    pub since: DateTime<Utc>,
    pub metric: Metric,
}

impl SeriesWindow {
    pub fn reading_window(&self) -> ReadingWindow {
        ReadingWindow {
            device_id: self.device_id.clone(),
            since: self.since,
        }
    }
}

/// A way of turning a window of readings into a bounded series.
///
/// Implementations agree on the shape of the result (time ordered, at most
/// `cap` points) but not on exact bucket boundaries.
#[async_trait]
pub trait AggregationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn aggregate(
        &self,
        window: &SeriesWindow,
        cap: usize,
    ) -> DomainResult<Vec<DownsampledPoint>>;
}

/// Fetches the raw window and downsamples it in process
pub struct LocalDownsampleStrategy {
    repository: Arc<dyn TelemetryRepository>,
}

impl LocalDownsampleStrategy {
    pub fn new(repository: Arc<dyn TelemetryRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl AggregationStrategy for LocalDownsampleStrategy {
    fn name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip(self, window), fields(device_id = %window.device_id, metric = %window.metric))]
    async fn aggregate(
        &self,
        window: &SeriesWindow,
        cap: usize,
    ) -> DomainResult<Vec<DownsampledPoint>> {
        let readings = self
            .repository
            .find_readings(FindReadingsInput {
                window: window.reading_window(),
                metrics: vec![window.metric],
            })
            .await?;

        debug!(reading_count = readings.len(), "downsampling locally");
        Ok(downsample(&readings, window.metric, cap))
    }
}

/// Lets the database compute `cap` time-ordered buckets
pub struct StorageAggregateStrategy {
    repository: Arc<dyn TelemetryRepository>,
}

impl StorageAggregateStrategy {
    pub fn new(repository: Arc<dyn TelemetryRepository>) -> Self {
        Self { repository }
    }
}

/// Reject empty or partially filled bucket sets, then order and bound them
fn buckets_to_points(
    buckets: Vec<AggregateBucket>,
    cap: usize,
) -> DomainResult<Vec<DownsampledPoint>> {
    if buckets.is_empty() {
        return Err(DomainError::AggregationFailed(
            "storage returned no buckets".to_string(),
        ));
    }

    let mut points = buckets
        .into_iter()
        .enumerate()
        .map(|(index, bucket)| -> DomainResult<DownsampledPoint> {
            let (Some(value), Some(time_ms)) = (bucket.avg_value, bucket.avg_time_ms) else {
                return Err(DomainError::AggregationFailed(format!(
                    "bucket {} is missing an average",
                    index
                )));
            };
            if !value.is_finite() || !time_ms.is_finite() {
                return Err(DomainError::AggregationFailed(format!(
                    "bucket {} has a non-finite average",
                    index
                )));
            }

            let timestamp = DateTime::from_timestamp_millis(time_ms.floor() as i64)
                .ok_or_else(|| {
                    DomainError::AggregationFailed(format!("bucket {} time out of range", index))
                })?;

            Ok(DownsampledPoint::new(timestamp, round_to_two(value)))
        })
        .collect::<DomainResult<Vec<_>>>()?;

    points.sort_by_key(|point| point.timestamp);
    points.truncate(cap);
    Ok(points)
}

#[async_trait]
impl AggregationStrategy for StorageAggregateStrategy {
    fn name(&self) -> &'static str {
        "storage"
    }

    #[instrument(skip(self, window), fields(device_id = %window.device_id, metric = %window.metric))]
    async fn aggregate(
        &self,
        window: &SeriesWindow,
        cap: usize,
    ) -> DomainResult<Vec<DownsampledPoint>> {
        let buckets = self
            .repository
            .aggregate_readings(AggregateReadingsInput {
                window: window.reading_window(),
                metric: window.metric,
                bucket_count: cap,
            })
            .await?;

        debug!(bucket_count = buckets.len(), "storage aggregation returned");
        buckets_to_points(buckets, cap)
    }
}
