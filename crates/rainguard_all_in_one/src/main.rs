mod config;

use alert_worker::alert_worker::{AlertWorker, AlertWorkerConfig};
use alert_worker::domain::{AlertDestinations, RateLimitConfig, ReadingIngestionService};
use common::domain::{CreateDeviceInput, DeviceRepository, MailSender, WebhookSender};
use common::mail::{SmtpConfig, SmtpMailer};
use common::postgres::{
    PostgresClient, PostgresConfig, PostgresDeviceRepository, PostgresTelemetryRepository,
    SchemaMigrator,
};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig, TelemetryProviders};
use common::webhook::{DiscordWebhookConfig, DiscordWebhookSender};
use crate::config::ServiceConfig;
use rainguard_runner::Runner;
use std::sync::Arc;
use std::time::Duration;
use telemetry_series::domain::{AdaptiveAggregator, AdaptiveAggregatorConfig, SeriesService};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        "Starting rainguard service"
    );
    debug!(
        smtp_enabled = config.smtp_host.is_some(),
        webhook_enabled = config.discord_webhook_url.is_some(),
        queue_max_sends = config.queue_max_sends,
        queue_window_ms = config.queue_window_ms,
        series_cap = config.series_cap,
        "Configuration loaded"
    );

    let repositories = match initialize_storage(&config).await {
        Ok(repositories) => repositories,
        Err(e) => {
            error!("Failed to initialize storage: {:#}", e);
            std::process::exit(1);
        }
    };

    let (mail_sender, webhook_sender) = match initialize_senders(&config).await {
        Ok(senders) => senders,
        Err(e) => {
            error!("Failed to initialize notification senders: {:#}", e);
            std::process::exit(1);
        }
    };

    // Read path
    let aggregator = Arc::new(AdaptiveAggregator::new(
        repositories.telemetry.clone(),
        AdaptiveAggregatorConfig {
            cap: config.series_cap,
            threshold_multiplier: config.series_threshold_multiplier,
        },
    ));
    let series_service = Arc::new(SeriesService::new(
        repositories.device.clone(),
        aggregator,
    ));

    // Ingest and alert path
    let alert_worker = AlertWorker::new(
        repositories.device.clone(),
        repositories.telemetry.clone(),
        mail_sender,
        webhook_sender,
        AlertWorkerConfig {
            rate_limit: RateLimitConfig {
                max_sends: config.queue_max_sends,
                window: Duration::from_millis(config.queue_window_ms),
                suppression: Duration::from_millis(config.queue_suppression_ms),
            },
            destinations: AlertDestinations {
                mail_to: config.alert_mail_to(),
                mail_cc: config.alert_mail_cc(),
                mail_bcc: config.alert_mail_bcc(),
                webhook_url: config.discord_webhook_url.clone(),
            },
        },
    );

    // MQTT/WebSocket ingress and the HTTP dashboard are not part of this
    // binary; they attach to these handles, held until the runner exits.
    let services = Services {
        series: series_service,
        ingestion: alert_worker.ingestion_service(),
        devices: repositories.device.clone(),
    };

    match services.devices.list_devices().await {
        Ok(devices) => info!(device_count = devices.len(), "Series and ingestion services ready"),
        Err(e) => error!(error = %e, "Failed to list registered devices"),
    }

    let runner = Runner::new()
        .with_named_process("notification_queue", alert_worker.into_runner_process())
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            shutdown_telemetry(telemetry_providers);
            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(config.closer_timeout_secs));

    runner.run().await;
}

/// Query and ingest handles exposed to the ingress transports
#[allow(dead_code)]
struct Services {
    series: Arc<SeriesService>,
    ingestion: Arc<ReadingIngestionService>,
    devices: Arc<dyn DeviceRepository>,
}

struct Repositories {
    device: Arc<PostgresDeviceRepository>,
    telemetry: Arc<PostgresTelemetryRepository>,
}

async fn initialize_storage(config: &ServiceConfig) -> anyhow::Result<Repositories> {
    info!(
        host = %config.postgres_host,
        port = config.postgres_port,
        database = %config.postgres_database,
        "Connecting to PostgreSQL"
    );

    let client = PostgresClient::from_config(&PostgresConfig {
        host: config.postgres_host.clone(),
        port: config.postgres_port,
        database: config.postgres_database.clone(),
        username: config.postgres_username.clone(),
        password: config.postgres_password.clone(),
        max_pool_size: config.postgres_max_pool_size,
    })?;
    client.ping().await?;

    if config.postgres_run_migrations {
        SchemaMigrator::new(client.clone()).run_migrations().await?;
    }

    let device = Arc::new(PostgresDeviceRepository::new(client.clone()));
    let telemetry = Arc::new(PostgresTelemetryRepository::new(client));

    if let Some(device_key) = config.seed_device_key.as_deref() {
        seed_device(
            device.as_ref(),
            device_key,
            config.seed_device_name.as_deref(),
        )
        .await?;
    }

    Ok(Repositories { device, telemetry })
}

async fn seed_device(
    repository: &dyn DeviceRepository,
    device_key: &str,
    name: Option<&str>,
) -> anyhow::Result<()> {
    if let Some(id) = repository.find_device_id_by_key(device_key).await? {
        debug!(device_key = %device_key, device_id = %id, "seed device already registered");
        return Ok(());
    }

    let device = repository
        .create_device(CreateDeviceInput {
            id: xid::new().to_string(),
            device_key: device_key.to_string(),
            name: name.unwrap_or(device_key).to_string(),
        })
        .await?;

    info!(device_key = %device.device_key, device_id = %device.id, "registered seed device");
    Ok(())
}

async fn initialize_senders(
    config: &ServiceConfig,
) -> anyhow::Result<(Arc<dyn MailSender>, Arc<dyn WebhookSender>)> {
    let mut mailer = SmtpMailer::new(&SmtpConfig {
        host: config.smtp_host.clone(),
        port: config.smtp_port,
        secure: config.smtp_secure,
        username: config.smtp_user.clone(),
        password: config.smtp_pass.clone(),
        from: config.mail_from.clone(),
        from_name: config.mail_from_name.clone(),
    })?;
    if mailer.is_enabled() {
        mailer.verify().await;
    }

    let webhook = DiscordWebhookSender::new(DiscordWebhookConfig {
        username: config.discord_username.clone(),
        avatar_url: config.discord_avatar_url.clone(),
        timeout_secs: Some(config.webhook_timeout_secs),
    })?;

    Ok((Arc::new(mailer), Arc::new(webhook)))
}
