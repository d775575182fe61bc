use crate::domain::{AdaptiveAggregator, SeriesWindow};
use chrono::{DateTime, Duration, Utc};
use common::domain::{
    validate_device_key, DeviceRepository, DomainResult, DownsampledPoint, Metric, SeriesBundle,
};
use std::sync::Arc;
use tracing::{debug, instrument};

pub const DEFAULT_WINDOW_MINUTES: i64 = 30;
pub const MAX_WINDOW_MINUTES: i64 = 43_200;

/// Normalize a requested window length in minutes.
///
/// Missing, non-finite or non-positive values fall back to the default;
/// others are floored and clamped to `1..=MAX_WINDOW_MINUTES`.
pub fn window_minutes(requested: Option<f64>) -> i64 {
    match requested {
        Some(minutes) if minutes.is_finite() && minutes > 0.0 => {
            (minutes.floor() as i64).clamp(1, MAX_WINDOW_MINUTES)
        }
        _ => DEFAULT_WINDOW_MINUTES,
    }
}

/// Dashboard query surface: bounded series per device key and time window
pub struct SeriesService {
    device_repository: Arc<dyn DeviceRepository>,
    aggregator: Arc<AdaptiveAggregator>,
}

impl SeriesService {
    pub fn new(
        device_repository: Arc<dyn DeviceRepository>,
        aggregator: Arc<AdaptiveAggregator>,
    ) -> Self {
        Self {
            device_repository,
            aggregator,
        }
    }

    /// Resolve the key and window start; `None` for an unknown device
    async fn resolve(
        &self,
        device_key: &str,
        minutes: Option<f64>,
    ) -> DomainResult<Option<(String, DateTime<Utc>)>> {
        let key = validate_device_key(device_key)?;
        let since = Utc::now() - Duration::minutes(window_minutes(minutes));

        let device_id = self.device_repository.find_device_id_by_key(key).await?;
        if device_id.is_none() {
            debug!(device_key = %key, "unknown device key, returning empty series");
        }

        Ok(device_id.map(|id| (id, since)))
    }

    #[instrument(skip(self), fields(device_key = %device_key, metric = %metric))]
    pub async fn series(
        &self,
        device_key: &str,
        metric: &str,
        minutes: Option<f64>,
    ) -> DomainResult<Vec<DownsampledPoint>> {
        let metric: Metric = metric.parse()?;

        let Some((device_id, since)) = self.resolve(device_key, minutes).await? else {
            return Ok(Vec::new());
        };

        self.aggregator
            .aggregate(SeriesWindow {
                device_id,
                since,
                metric,
            })
            .await
    }

    #[instrument(skip(self), fields(device_key = %device_key))]
    pub async fn all_series(
        &self,
        device_key: &str,
        minutes: Option<f64>,
    ) -> DomainResult<SeriesBundle> {
        let Some((device_id, since)) = self.resolve(device_key, minutes).await? else {
            return Ok(SeriesBundle::default());
        };

        self.aggregator.series_bundle(&device_id, since).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AdaptiveAggregatorConfig;
    use common::domain::{
        DomainError, FindReadingsInput, MockDeviceRepository, MockTelemetryRepository,
        ReadingWindow,
    };

    fn service(devices: MockDeviceRepository, telemetry: MockTelemetryRepository) -> SeriesService {
        SeriesService::new(
            Arc::new(devices),
            Arc::new(AdaptiveAggregator::new(
                Arc::new(telemetry),
                AdaptiveAggregatorConfig::default(),
            )),
        )
    }

    #[test]
    fn test_window_minutes_normalization() {
        assert_eq!(window_minutes(None), 30);
        assert_eq!(window_minutes(Some(0.0)), 30);
        assert_eq!(window_minutes(Some(-5.0)), 30);
        assert_eq!(window_minutes(Some(f64::NAN)), 30);
        assert_eq!(window_minutes(Some(f64::INFINITY)), 30);
        assert_eq!(window_minutes(Some(0.5)), 1);
        assert_eq!(window_minutes(Some(90.9)), 90);
        assert_eq!(window_minutes(Some(100_000.0)), MAX_WINDOW_MINUTES);
    }

    #[tokio::test]
    async fn test_unknown_metric_is_rejected_before_lookup() {
        let mut devices = MockDeviceRepository::new();
        devices.expect_find_device_id_by_key().never();

        let result = service(devices, MockTelemetryRepository::new())
            .series("gh-1", "pressure", None)
            .await;

        assert!(matches!(result, Err(DomainError::InvalidMetric(_))));
    }

    #[tokio::test]
    async fn test_unknown_device_returns_empty_series() {
        let mut devices = MockDeviceRepository::new();
        devices
            .expect_find_device_id_by_key()
            .times(2)
            .returning(|_| Ok(None));
        let mut telemetry = MockTelemetryRepository::new();
        telemetry.expect_count_readings().never();

        let service = service(devices, telemetry);

        assert!(service
            .series("gh-1", "temperature", Some(60.0))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            service.all_series("gh-1", None).await.unwrap(),
            SeriesBundle::default()
        );
    }

    #[tokio::test]
    async fn test_invalid_device_key_is_rejected_before_lookup() {
        let mut devices = MockDeviceRepository::new();
        devices.expect_find_device_id_by_key().never();

        let service = service(devices, MockTelemetryRepository::new());

        assert!(matches!(
            service.series("   ", "temperature", None).await,
            Err(DomainError::InvalidDeviceKey(_))
        ));
        assert!(matches!(
            service.all_series(&"k".repeat(129), None).await,
            Err(DomainError::InvalidDeviceKey(_))
        ));
    }

    #[tokio::test]
    async fn test_series_queries_window_of_requested_minutes() {
        let mut devices = MockDeviceRepository::new();
        devices
            .expect_find_device_id_by_key()
            .withf(|key: &str| key == "gh-1")
            .times(1)
            .returning(|_| Ok(Some("device-001".to_string())));

        let earliest = Utc::now() - Duration::minutes(61);
        let mut telemetry = MockTelemetryRepository::new();
        telemetry
            .expect_count_readings()
            .withf(move |window: &ReadingWindow| {
                window.device_id == "device-001"
                    && window.since > earliest
                    && window.since <= Utc::now() - Duration::minutes(60)
            })
            .times(1)
            .return_once(|_| Ok(0));
        telemetry
            .expect_find_readings()
            .withf(|input: &FindReadingsInput| input.metrics == vec![Metric::Rain])
            .times(1)
            .return_once(|_| Ok(vec![]));

        let points = service(devices, telemetry)
            .series("gh-1", "rain", Some(60.0))
            .await
            .unwrap();

        assert!(points.is_empty());
    }
}
