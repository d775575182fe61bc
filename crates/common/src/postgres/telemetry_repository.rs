use crate::domain::{
    AggregateBucket, AggregateReadingsInput, DeviceMode, DomainError, DomainResult,
    FindReadingsInput, LatestReadingsInput, Metric, RainStatus, Reading, ReadingWindow,
    ServoStatus, StoreReadingInput, TelemetryRepository,
};
use crate::postgres::PostgresClient;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, instrument};

const ALL_COLUMNS: &str =
    "device_id, created_at, temperature, humidity, light_intensity, rain_status, servo_status, mode";

/// Telemetry row as selected from PostgreSQL; categorical columns stay textual until mapped
#[derive(Debug, Clone)]
struct ReadingRow {
    device_id: String,
    created_at: DateTime<Utc>,
    temperature: Option<f64>,
    humidity: Option<f64>,
    light_intensity: Option<f64>,
    rain_status: Option<String>,
    servo_status: Option<String>,
    mode: Option<String>,
}

impl ReadingRow {
    /// Columns are expected in `ALL_COLUMNS` order
    fn from_row(row: &Row) -> anyhow::Result<Self> {
        Ok(Self {
            device_id: row.try_get(0)?,
            created_at: row.try_get(1)?,
            temperature: row.try_get(2)?,
            humidity: row.try_get(3)?,
            light_intensity: row.try_get(4)?,
            rain_status: row.try_get(5)?,
            servo_status: row.try_get(6)?,
            mode: row.try_get(7)?,
        })
    }
}

/// Convert database ReadingRow to domain Reading
impl TryFrom<ReadingRow> for Reading {
    type Error = anyhow::Error;

    fn try_from(row: ReadingRow) -> Result<Self, Self::Error> {
        Ok(Reading {
            device_id: row.device_id,
            created_at: row.created_at,
            temperature: row.temperature,
            humidity: row.humidity,
            light_intensity: row.light_intensity,
            rain_status: row
                .rain_status
                .map(|s| s.parse::<RainStatus>())
                .transpose()
                .map_err(anyhow::Error::msg)?,
            servo_status: row
                .servo_status
                .map(|s| s.parse::<ServoStatus>())
                .transpose()
                .map_err(anyhow::Error::msg)?,
            mode: row
                .mode
                .map(|s| s.parse::<DeviceMode>())
                .transpose()
                .map_err(anyhow::Error::msg)?,
        })
    }
}

fn map_rows(rows: &[Row]) -> DomainResult<Vec<Reading>> {
    rows.iter()
        .map(|row| ReadingRow::from_row(row).and_then(Reading::try_from))
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(DomainError::RepositoryError)
}

/// Select list projecting only the requested metric columns; the rest come back NULL
fn projection(metrics: &[Metric]) -> String {
    let wants = |metric: Metric| metrics.contains(&metric);
    let pick = |metric: Metric, column: &'static str, null_type: &str| {
        if wants(metric) {
            column.to_string()
        } else {
            format!("NULL::{} AS {}", null_type, column)
        }
    };

    [
        "device_id".to_string(),
        "created_at".to_string(),
        pick(Metric::Temperature, "temperature", "float8"),
        pick(Metric::Humidity, "humidity", "float8"),
        pick(Metric::Light, "light_intensity", "float8"),
        pick(Metric::Rain, "rain_status", "text"),
        pick(Metric::Servo, "servo_status", "text"),
        "NULL::text AS mode".to_string(),
    ]
    .join(", ")
}

/// SQL expression extracting a metric as a number, mirroring `Metric::value_of`
fn value_expression(metric: Metric) -> &'static str {
    match metric {
        Metric::Temperature => "temperature",
        Metric::Humidity => "humidity",
        Metric::Light => "light_intensity",
        Metric::Rain => "(CASE WHEN rain_status = 'RAIN' THEN 1.0 ELSE 0.0 END)::float8",
        Metric::Servo => "(CASE WHEN servo_status = 'OPEN' THEN 1.0 ELSE 0.0 END)::float8",
    }
}

/// PostgreSQL implementation of TelemetryRepository trait
#[derive(Clone)]
pub struct PostgresTelemetryRepository {
    client: PostgresClient,
}

impl PostgresTelemetryRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    async fn connection(&self) -> DomainResult<deadpool_postgres::Client> {
        self.client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)
    }
}

#[async_trait]
impl TelemetryRepository for PostgresTelemetryRepository {
    #[instrument(skip(self, window), fields(device_id = %window.device_id, since = %window.since))]
    async fn count_readings(&self, window: ReadingWindow) -> DomainResult<u64> {
        let conn = self.connection().await?;

        let row = conn
            .query_one(
                "SELECT COUNT(*) FROM telemetry WHERE device_id = $1 AND created_at >= $2",
                &[&window.device_id, &window.since],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let count: i64 = row.get(0);
        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self, input), fields(device_id = %input.window.device_id, metrics = ?input.metrics))]
    async fn find_readings(&self, input: FindReadingsInput) -> DomainResult<Vec<Reading>> {
        let conn = self.connection().await?;

        let sql = format!(
            "SELECT {} FROM telemetry
             WHERE device_id = $1 AND created_at >= $2
             ORDER BY created_at ASC, id ASC",
            projection(&input.metrics)
        );

        let rows = conn
            .query(sql.as_str(), &[&input.window.device_id, &input.window.since])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("found {} readings", rows.len());
        map_rows(&rows)
    }

    #[instrument(skip(self, input), fields(device_id = %input.window.device_id, metric = %input.metric, bucket_count = input.bucket_count))]
    async fn aggregate_readings(
        &self,
        input: AggregateReadingsInput,
    ) -> DomainResult<Vec<AggregateBucket>> {
        let conn = self.connection().await?;

        let bucket_count = i32::try_from(input.bucket_count)
            .context("bucket count out of range")
            .map_err(DomainError::RepositoryError)?;

        let sql = format!(
            "SELECT AVG(value)::float8 AS avg_value,
                    AVG(EXTRACT(EPOCH FROM created_at) * 1000)::float8 AS avg_time_ms
             FROM (
                 SELECT created_at,
                        {} AS value,
                        NTILE($3) OVER (ORDER BY created_at, id) AS bucket
                 FROM telemetry
                 WHERE device_id = $1 AND created_at >= $2
             ) buckets
             WHERE value IS NOT NULL
             GROUP BY bucket
             ORDER BY bucket",
            value_expression(input.metric)
        );

        let rows = conn
            .query(
                sql.as_str(),
                &[&input.window.device_id, &input.window.since, &bucket_count],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        rows.iter()
            .map(|row| -> Result<AggregateBucket, tokio_postgres::Error> {
                Ok(AggregateBucket {
                    avg_value: row.try_get(0)?,
                    avg_time_ms: row.try_get(1)?,
                })
            })
            .collect::<Result<Vec<_>, tokio_postgres::Error>>()
            .map_err(|e| DomainError::RepositoryError(e.into()))
    }

    #[instrument(skip(self, input), fields(device_id = %input.device_id, limit = input.limit))]
    async fn latest_readings(&self, input: LatestReadingsInput) -> DomainResult<Vec<Reading>> {
        let conn = self.connection().await?;

        let limit = input.limit as i64;
        let sql = format!(
            "SELECT {} FROM telemetry
             WHERE device_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2",
            ALL_COLUMNS
        );

        let rows = conn
            .query(sql.as_str(), &[&input.device_id, &limit])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        map_rows(&rows)
    }

    #[instrument(skip(self, input), fields(device_id = %input.device_id))]
    async fn store_reading(&self, input: StoreReadingInput) -> DomainResult<Reading> {
        let conn = self.connection().await?;
        let telemetry = &input.telemetry;

        conn.execute(
            "INSERT INTO telemetry (device_id, created_at, temperature, humidity, light_intensity, rain_status, servo_status, mode)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            &[
                &input.device_id,
                &input.created_at,
                &telemetry.temperature,
                &telemetry.humidity,
                &telemetry.light_intensity,
                &telemetry.rain_status.as_str(),
                &telemetry.servo_status.as_str(),
                &telemetry.mode.as_str(),
            ],
        )
        .await
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("stored reading for device: {}", input.device_id);

        Ok(Reading {
            device_id: input.device_id,
            created_at: input.created_at,
            temperature: telemetry.temperature,
            humidity: telemetry.humidity,
            light_intensity: telemetry.light_intensity,
            rain_status: Some(telemetry.rain_status),
            servo_status: Some(telemetry.servo_status),
            mode: Some(telemetry.mode),
        })
    }
}
