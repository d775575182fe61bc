use crate::domain::ReadingStoredHook;
use chrono::Utc;
use common::domain::{
    validate_device_key, DeviceRepository, DomainResult, Reading, SensorTelemetry,
    StoreReadingInput, TelemetryRepository,
};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Persists incoming device telemetry and runs the post-store hook
pub struct ReadingIngestionService {
    device_repository: Arc<dyn DeviceRepository>,
    telemetry_repository: Arc<dyn TelemetryRepository>,
    hook: Arc<dyn ReadingStoredHook>,
}

impl ReadingIngestionService {
    pub fn new(
        device_repository: Arc<dyn DeviceRepository>,
        telemetry_repository: Arc<dyn TelemetryRepository>,
        hook: Arc<dyn ReadingStoredHook>,
    ) -> Self {
        Self {
            device_repository,
            telemetry_repository,
            hook,
        }
    }

    /// Store a reading reported under `device_key`.
    ///
    /// Unknown keys are logged and ignored (`Ok(None)`). Storage errors are
    /// returned; the hook never fails the ingest.
    #[instrument(skip(self, telemetry), fields(device_key = %device_key))]
    pub async fn ingest(
        &self,
        device_key: &str,
        telemetry: SensorTelemetry,
    ) -> DomainResult<Option<Reading>> {
        let key = validate_device_key(device_key)?;

        let Some(device_id) = self.device_repository.find_device_id_by_key(key).await? else {
            warn!(device_key = %key, "telemetry from unknown device ignored");
            return Ok(None);
        };

        let reading = self
            .telemetry_repository
            .store_reading(StoreReadingInput {
                device_id,
                created_at: Utc::now(),
                telemetry,
            })
            .await?;

        debug!(device_id = %reading.device_id, "reading stored");

        let alerted = self.hook.on_reading_stored(&reading.device_id).await;
        debug!(alerted, "post-store hook finished");

        Ok(Some(reading))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MockReadingStoredHook;
    use common::domain::{
        DeviceMode, DomainError, MockDeviceRepository, MockTelemetryRepository, RainStatus,
        ServoStatus,
    };

    fn telemetry() -> SensorTelemetry {
        SensorTelemetry {
            temperature: Some(19.5),
            humidity: Some(77.0),
            light_intensity: Some(15.0),
            rain_status: RainStatus::Rain,
            servo_status: ServoStatus::Closed,
            mode: DeviceMode::Auto,
        }
    }

    fn known_device() -> MockDeviceRepository {
        let mut devices = MockDeviceRepository::new();
        devices
            .expect_find_device_id_by_key()
            .withf(|key: &str| key == "greenhouse-north")
            .times(1)
            .returning(|_| Ok(Some("device-001".to_string())));
        devices
    }

    fn stored(input: StoreReadingInput) -> Reading {
        Reading {
            device_id: input.device_id,
            created_at: input.created_at,
            temperature: input.telemetry.temperature,
            humidity: input.telemetry.humidity,
            light_intensity: input.telemetry.light_intensity,
            rain_status: Some(input.telemetry.rain_status),
            servo_status: Some(input.telemetry.servo_status),
            mode: Some(input.telemetry.mode),
        }
    }

    #[tokio::test]
    async fn test_ingest_stores_and_runs_hook() {
        let mut telemetry_repo = MockTelemetryRepository::new();
        telemetry_repo
            .expect_store_reading()
            .withf(|input: &StoreReadingInput| input.device_id == "device-001")
            .times(1)
            .returning(|input| Ok(stored(input)));

        let mut hook = MockReadingStoredHook::new();
        hook.expect_on_reading_stored()
            .withf(|device_id: &str| device_id == "device-001")
            .times(1)
            .returning(|_| true);

        let service = ReadingIngestionService::new(
            Arc::new(known_device()),
            Arc::new(telemetry_repo),
            Arc::new(hook),
        );

        let reading = service
            .ingest("greenhouse-north", telemetry())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reading.device_id, "device-001");
        assert_eq!(reading.rain_status, Some(RainStatus::Rain));
    }

    #[tokio::test]
    async fn test_unknown_device_is_ignored() {
        let mut devices = MockDeviceRepository::new();
        devices
            .expect_find_device_id_by_key()
            .returning(|_| Ok(None));
        let mut telemetry_repo = MockTelemetryRepository::new();
        telemetry_repo.expect_store_reading().never();
        let mut hook = MockReadingStoredHook::new();
        hook.expect_on_reading_stored().never();

        let service =
            ReadingIngestionService::new(Arc::new(devices), Arc::new(telemetry_repo), Arc::new(hook));

        assert!(service.ingest("nobody", telemetry()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_storage_error_is_returned_without_hook() {
        let mut telemetry_repo = MockTelemetryRepository::new();
        telemetry_repo.expect_store_reading().returning(|_| {
            Err(DomainError::RepositoryError(anyhow::anyhow!(
                "violates foreign key constraint"
            )))
        });
        let mut hook = MockReadingStoredHook::new();
        hook.expect_on_reading_stored().never();

        let service = ReadingIngestionService::new(
            Arc::new(known_device()),
            Arc::new(telemetry_repo),
            Arc::new(hook),
        );

        let result = service.ingest("greenhouse-north", telemetry()).await;

        assert!(matches!(result, Err(DomainError::RepositoryError(_))));
    }

    #[tokio::test]
    async fn test_invalid_key_is_rejected() {
        let service = ReadingIngestionService::new(
            Arc::new(MockDeviceRepository::new()),
            Arc::new(MockTelemetryRepository::new()),
            Arc::new(MockReadingStoredHook::new()),
        );

        let result = service.ingest("", telemetry()).await;

        assert!(matches!(result, Err(DomainError::InvalidDeviceKey(_))));
    }
}
