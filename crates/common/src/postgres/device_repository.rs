use crate::domain::{CreateDeviceInput, Device, DeviceRepository, DomainError, DomainResult};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::Row;
use tracing::{debug, instrument};

/// PostgreSQL implementation of DeviceRepository trait
#[derive(Clone)]
pub struct PostgresDeviceRepository {
    client: PostgresClient,
}

impl PostgresDeviceRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

fn device_from_row(row: &Row) -> Device {
    Device {
        id: row.get("id"),
        device_key: row.get("device_key"),
        name: row.get("device_name"),
        created_at: Some(row.get("created_at")),
        updated_at: Some(row.get("updated_at")),
    }
}

#[async_trait]
impl DeviceRepository for PostgresDeviceRepository {
    #[instrument(skip(self, input), fields(device_id = %input.id, device_key = %input.device_key))]
    async fn create_device(&self, input: CreateDeviceInput) -> DomainResult<Device> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();

        conn.execute(
            "INSERT INTO devices (id, device_key, device_name, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $4)",
            &[&input.id, &input.device_key, &input.name, &now],
        )
        .await
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("registered device: {}", input.device_key);

        Ok(Device {
            id: input.id,
            device_key: input.device_key,
            name: input.name,
            created_at: Some(now),
            updated_at: Some(now),
        })
    }

    #[instrument(skip(self), fields(device_key = %device_key))]
    async fn find_device_id_by_key(&self, device_key: &str) -> DomainResult<Option<String>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt("SELECT id FROM devices WHERE device_key = $1", &[&device_key])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.map(|row| row.get(0)))
    }

    #[instrument(skip(self))]
    async fn list_devices(&self) -> DomainResult<Vec<Device>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                "SELECT id, device_key, device_name, created_at, updated_at
                 FROM devices
                 ORDER BY created_at DESC, id DESC",
                &[],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(device_count = rows.len(), "listed devices");

        Ok(rows.iter().map(device_from_row).collect())
    }
}
