use crate::postgres::PostgresClient;
use anyhow::{Context, Result};
use tracing::{debug, info};

/// Ordered schema migrations, embedded at compile time
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_create_devices_and_telemetry",
        include_str!("../../migrations/001_create_devices_and_telemetry.sql"),
    ),
    (
        "002_add_device_updated_at",
        include_str!("../../migrations/002_add_device_updated_at.sql"),
    ),
];

/// Applies the embedded schema migrations that have not run yet
///
/// Applied versions are tracked in `schema_migrations`; each migration runs
/// in its own transaction.
pub struct SchemaMigrator {
    client: PostgresClient,
}

impl SchemaMigrator {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.client.get_connection().await?;

        conn.batch_execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version    TEXT PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .await
        .context("failed to create schema_migrations table")?;

        for (version, sql) in MIGRATIONS {
            let applied = conn
                .query_opt(
                    "SELECT version FROM schema_migrations WHERE version = $1",
                    &[version],
                )
                .await?
                .is_some();

            if applied {
                debug!(version = %version, "migration already applied");
                continue;
            }

            let tx = conn.transaction().await?;
            tx.batch_execute(sql)
                .await
                .with_context(|| format!("migration {} failed", version))?;
            tx.execute(
                "INSERT INTO schema_migrations (version) VALUES ($1)",
                &[version],
            )
            .await?;
            tx.commit().await?;

            info!(version = %version, "applied migration");
        }

        Ok(())
    }
}
