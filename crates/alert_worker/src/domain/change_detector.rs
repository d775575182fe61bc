use common::domain::{
    AlertEvent, DeviceMode, LatestReadingsInput, MonitoredField, Reading, TelemetryRepository,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// Compare the latest reading with the one before it.
///
/// Only devices in automatic mode raise events; a manual change of the
/// cover or a rain reading during manual operation is not an alert.
pub fn compare_readings(current: &Reading, previous: &Reading) -> Option<AlertEvent> {
    if current.mode != Some(DeviceMode::Auto) {
        return None;
    }

    let changed_fields: BTreeSet<MonitoredField> = MonitoredField::ALL
        .into_iter()
        .filter(|field| field.differs(previous, current))
        .collect();

    if changed_fields.is_empty() {
        return None;
    }

    Some(AlertEvent {
        device_id: current.device_id.clone(),
        previous: previous.clone(),
        current: current.clone(),
        changed_fields,
    })
}

/// Detects automatic state transitions from the two most recent readings of a device
pub struct ChangeDetector {
    repository: Arc<dyn TelemetryRepository>,
}

impl ChangeDetector {
    pub fn new(repository: Arc<dyn TelemetryRepository>) -> Self {
        Self { repository }
    }

    /// Lookup failures are logged and treated as "no change"
    #[instrument(skip(self), fields(device_id = %device_id))]
    pub async fn detect(&self, device_id: &str) -> Option<AlertEvent> {
        let latest = match self
            .repository
            .latest_readings(LatestReadingsInput {
                device_id: device_id.to_string(),
                limit: 2,
            })
            .await
        {
            Ok(readings) => readings,
            Err(e) => {
                error!(error = %e, "failed to load latest readings");
                return None;
            }
        };

        let [current, previous, ..] = latest.as_slice() else {
            debug!(count = latest.len(), "not enough readings to compare");
            return None;
        };

        let event = compare_readings(current, previous);
        if let Some(event) = &event {
            debug!(changed = ?event.changed_fields, "state change detected");
        }
        event
    }
}
