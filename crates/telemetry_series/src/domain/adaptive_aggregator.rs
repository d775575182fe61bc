use crate::domain::{
    downsample, AggregationStrategy, LocalDownsampleStrategy, SeriesWindow,
    StorageAggregateStrategy, SERIES_CAP,
};
use chrono::{DateTime, Utc};
use common::domain::{
    DomainResult, DownsampledPoint, FindReadingsInput, Metric, ReadingWindow, SeriesBundle,
    TelemetryRepository,
};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptiveAggregatorConfig {
    /// Maximum points per series
    pub cap: usize,
    /// Windows with more than `cap * threshold_multiplier` rows aggregate in storage
    pub threshold_multiplier: usize,
}

impl Default for AdaptiveAggregatorConfig {
    fn default() -> Self {
        Self {
            cap: SERIES_CAP,
            threshold_multiplier: 20,
        }
    }
}

/// Picks the aggregation strategy for a window based on its row count.
///
/// Small windows are fetched and downsampled in process. Large windows are
/// bucketed by the database; if that fails for any reason the local
/// strategy is used instead, so callers never see a storage aggregation error.
pub struct AdaptiveAggregator {
    repository: Arc<dyn TelemetryRepository>,
    local: LocalDownsampleStrategy,
    storage: StorageAggregateStrategy,
    config: AdaptiveAggregatorConfig,
}

impl AdaptiveAggregator {
    pub fn new(repository: Arc<dyn TelemetryRepository>, config: AdaptiveAggregatorConfig) -> Self {
        Self {
            local: LocalDownsampleStrategy::new(repository.clone()),
            storage: StorageAggregateStrategy::new(repository.clone()),
            repository,
            config,
        }
    }

    /// Row count above which storage aggregation is attempted
    pub fn threshold(&self) -> u64 {
        self.config.cap.saturating_mul(self.config.threshold_multiplier) as u64
    }

    #[instrument(skip(self, window), fields(device_id = %window.device_id, metric = %window.metric))]
    pub async fn aggregate(&self, window: SeriesWindow) -> DomainResult<Vec<DownsampledPoint>> {
        let count = self
            .repository
            .count_readings(window.reading_window())
            .await?;

        if count <= self.threshold() {
            debug!(count, "window below threshold");
            return self.local.aggregate(&window, self.config.cap).await;
        }

        self.aggregate_large(&window, count).await
    }

    async fn aggregate_large(
        &self,
        window: &SeriesWindow,
        count: u64,
    ) -> DomainResult<Vec<DownsampledPoint>> {
        match self.storage.aggregate(window, self.config.cap).await {
            Ok(points) => {
                debug!(count, points = points.len(), strategy = self.storage.name(), "aggregated");
                Ok(points)
            }
            Err(e) => {
                warn!(
                    device_id = %window.device_id,
                    metric = %window.metric,
                    count,
                    error = %e,
                    "storage aggregation failed, falling back to local downsampling"
                );
                self.local.aggregate(window, self.config.cap).await
            }
        }
    }

    /// Series of every metric for one window
    #[instrument(skip(self), fields(device_id = %device_id))]
    pub async fn series_bundle(
        &self,
        device_id: &str,
        since: DateTime<Utc>,
    ) -> DomainResult<SeriesBundle> {
        let window = ReadingWindow {
            device_id: device_id.to_string(),
            since,
        };
        let count = self.repository.count_readings(window.clone()).await?;

        if count <= self.threshold() {
            let readings = self
                .repository
                .find_readings(FindReadingsInput {
                    window,
                    metrics: Metric::ALL.to_vec(),
                })
                .await?;
            let cap = self.config.cap;

            return Ok(SeriesBundle {
                temperature: downsample(&readings, Metric::Temperature, cap),
                humidity: downsample(&readings, Metric::Humidity, cap),
                light: downsample(&readings, Metric::Light, cap),
                rain: downsample(&readings, Metric::Rain, cap),
                servo: downsample(&readings, Metric::Servo, cap),
            });
        }

        let mut bundle = SeriesBundle::default();
        for metric in Metric::ALL {
            let points = self
                .aggregate_large(
                    &SeriesWindow {
                        device_id: device_id.to_string(),
                        since,
                        metric,
                    },
                    count,
                )
                .await?;

            match metric {
                Metric::Temperature => bundle.temperature = points,
                Metric::Humidity => bundle.humidity = points,
                Metric::Light => bundle.light = points,
                Metric::Rain => bundle.rain = points,
                Metric::Servo => bundle.servo = points,
            }
        }

        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use common::domain::{
        AggregateBucket, DeviceMode, DomainError, MockTelemetryRepository, RainStatus, Reading,
        ServoStatus,
    };

    fn since() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn window(metric: Metric) -> SeriesWindow {
        SeriesWindow {
            device_id: "dev-1".to_string(),
            since: since(),
            metric,
        }
    }

    fn readings(count: usize) -> Vec<Reading> {
        (0..count)
            .map(|i| Reading {
                device_id: "dev-1".to_string(),
                created_at: since() + Duration::seconds(i as i64),
                temperature: Some(15.0 + (i % 10) as f64),
                humidity: Some(60.0),
                light_intensity: Some(300.0),
                rain_status: Some(if i % 2 == 0 {
                    RainStatus::Dry
                } else {
                    RainStatus::Rain
                }),
                servo_status: Some(ServoStatus::Open),
                mode: Some(DeviceMode::Auto),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_below_threshold_uses_local_strategy() {
        let mut mock_repo = MockTelemetryRepository::new();
        mock_repo
            .expect_count_readings()
            .times(1)
            .return_once(|_| Ok(4_000));
        mock_repo.expect_aggregate_readings().never();
        mock_repo
            .expect_find_readings()
            .times(1)
            .return_once(|_| Ok(readings(300)));

        let aggregator =
            AdaptiveAggregator::new(Arc::new(mock_repo), AdaptiveAggregatorConfig::default());
        let points = aggregator.aggregate(window(Metric::Temperature)).await.unwrap();

        assert_eq!(points.len(), SERIES_CAP);
    }

    #[tokio::test]
    async fn test_above_threshold_uses_storage_strategy() {
        let mut mock_repo = MockTelemetryRepository::new();
        mock_repo
            .expect_count_readings()
            .times(1)
            .return_once(|_| Ok(4_001));
        mock_repo.expect_find_readings().never();
        mock_repo.expect_aggregate_readings().times(1).return_once(|_| {
            Ok(vec![
                AggregateBucket {
                    avg_value: Some(21.0),
                    avg_time_ms: Some(2_000.0),
                },
                AggregateBucket {
                    avg_value: Some(20.0),
                    avg_time_ms: Some(1_000.0),
                },
            ])
        });

        let aggregator =
            AdaptiveAggregator::new(Arc::new(mock_repo), AdaptiveAggregatorConfig::default());
        let points = aggregator.aggregate(window(Metric::Temperature)).await.unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].value, 20.0);
        assert_eq!(points[1].value, 21.0);
    }

    #[tokio::test]
    async fn test_storage_failure_falls_back_to_local_result() {
        let data = readings(5_000);
        let expected = downsample(&data, Metric::Temperature, SERIES_CAP);

        let mut mock_repo = MockTelemetryRepository::new();
        mock_repo
            .expect_count_readings()
            .times(1)
            .return_once(|_| Ok(5_000));
        mock_repo.expect_aggregate_readings().times(1).return_once(|_| {
            Err(DomainError::RepositoryError(anyhow::anyhow!(
                "function ntile does not exist"
            )))
        });
        mock_repo
            .expect_find_readings()
            .times(1)
            .return_once(move |_| Ok(data));

        let aggregator =
            AdaptiveAggregator::new(Arc::new(mock_repo), AdaptiveAggregatorConfig::default());
        let points = aggregator.aggregate(window(Metric::Temperature)).await.unwrap();

        assert_eq!(points, expected);
    }

    #[tokio::test]
    async fn test_empty_storage_result_falls_back() {
        let mut mock_repo = MockTelemetryRepository::new();
        mock_repo
            .expect_count_readings()
            .return_once(|_| Ok(10_000));
        mock_repo
            .expect_aggregate_readings()
            .return_once(|_| Ok(vec![]));
        mock_repo
            .expect_find_readings()
            .times(1)
            .return_once(|_| Ok(readings(3)));

        let aggregator =
            AdaptiveAggregator::new(Arc::new(mock_repo), AdaptiveAggregatorConfig::default());
        let points = aggregator.aggregate(window(Metric::Humidity)).await.unwrap();

        assert_eq!(points.len(), 3);
    }

    #[tokio::test]
    async fn test_count_error_is_returned() {
        let mut mock_repo = MockTelemetryRepository::new();
        mock_repo.expect_count_readings().return_once(|_| {
            Err(DomainError::RepositoryError(anyhow::anyhow!(
                "connection refused"
            )))
        });

        let aggregator =
            AdaptiveAggregator::new(Arc::new(mock_repo), AdaptiveAggregatorConfig::default());
        let result = aggregator.aggregate(window(Metric::Light)).await;

        assert!(matches!(result, Err(DomainError::RepositoryError(_))));
    }

    #[tokio::test]
    async fn test_bundle_below_threshold_fetches_once() {
        let mut mock_repo = MockTelemetryRepository::new();
        mock_repo
            .expect_count_readings()
            .times(1)
            .return_once(|_| Ok(4));
        mock_repo
            .expect_find_readings()
            .withf(|input: &FindReadingsInput| input.metrics == Metric::ALL.to_vec())
            .times(1)
            .return_once(|_| Ok(readings(4)));

        let aggregator =
            AdaptiveAggregator::new(Arc::new(mock_repo), AdaptiveAggregatorConfig::default());
        let bundle = aggregator.series_bundle("dev-1", since()).await.unwrap();

        assert_eq!(bundle.temperature.len(), 4);
        assert_eq!(bundle.humidity.len(), 4);
        assert_eq!(bundle.light.len(), 4);
        assert_eq!(bundle.rain[1].value, 1.0);
        assert!(bundle.servo.iter().all(|p| p.value == 1.0));
    }

    #[tokio::test]
    async fn test_bundle_above_threshold_aggregates_each_metric() {
        let mut mock_repo = MockTelemetryRepository::new();
        mock_repo
            .expect_count_readings()
            .times(1)
            .return_once(|_| Ok(50_000));
        mock_repo
            .expect_aggregate_readings()
            .times(5)
            .returning(|_| {
                Ok(vec![AggregateBucket {
                    avg_value: Some(0.5),
                    avg_time_ms: Some(1_000.0),
                }])
            });

        let aggregator =
            AdaptiveAggregator::new(Arc::new(mock_repo), AdaptiveAggregatorConfig::default());
        let bundle = aggregator.series_bundle("dev-1", since()).await.unwrap();

        assert_eq!(bundle.temperature.len(), 1);
        assert_eq!(bundle.servo[0].value, 0.5);
    }

    #[test]
    fn test_threshold_is_cap_times_multiplier() {
        let aggregator = AdaptiveAggregator::new(
            Arc::new(MockTelemetryRepository::new()),
            AdaptiveAggregatorConfig {
                cap: 50,
                threshold_multiplier: 4,
            },
        );
        assert_eq!(aggregator.threshold(), 200);
    }
}
