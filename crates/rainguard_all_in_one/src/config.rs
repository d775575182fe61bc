use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // PostgreSQL configuration
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    /// Apply the embedded schema migrations at start-up
    #[serde(default = "default_true")]
    pub postgres_run_migrations: bool,

    /// Device registered at start-up when its key is unknown
    #[serde(default)]
    pub seed_device_key: Option<String>,

    #[serde(default)]
    pub seed_device_name: Option<String>,

    // SMTP configuration; mail alerts are disabled without a host
    #[serde(default)]
    pub smtp_host: Option<String>,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// Implicit TLS instead of STARTTLS
    #[serde(default)]
    pub smtp_secure: bool,

    #[serde(default)]
    pub smtp_user: Option<String>,

    #[serde(default)]
    pub smtp_pass: Option<String>,

    #[serde(default)]
    pub mail_from: Option<String>,

    #[serde(default)]
    pub mail_from_name: Option<String>,

    // Alert destinations (comma-separated address lists)
    #[serde(default)]
    pub alert_mail_to: String,

    #[serde(default)]
    pub alert_mail_cc: String,

    #[serde(default)]
    pub alert_mail_bcc: String,

    #[serde(default)]
    pub discord_webhook_url: Option<String>,

    #[serde(default)]
    pub discord_username: Option<String>,

    #[serde(default)]
    pub discord_avatar_url: Option<String>,

    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,

    // Notification queue throttling
    /// Sends allowed per sliding window
    #[serde(default = "default_queue_max_sends")]
    pub queue_max_sends: usize,

    #[serde(default = "default_queue_window_ms")]
    pub queue_window_ms: u64,

    /// Minimum spacing between two alerts to the same recipient
    #[serde(default = "default_queue_suppression_ms")]
    pub queue_suppression_ms: u64,

    // Series aggregation
    #[serde(default = "default_series_cap")]
    pub series_cap: usize,

    /// Windows above `series_cap * series_threshold_multiplier` rows aggregate in PostgreSQL
    #[serde(default = "default_series_threshold_multiplier")]
    pub series_threshold_multiplier: usize,

    #[serde(default = "default_closer_timeout_secs")]
    pub closer_timeout_secs: u64,

    // OpenTelemetry configuration
    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "rainguard".to_string()
}

fn default_postgres_username() -> String {
    "rainguard".to_string()
}

fn default_postgres_password() -> String {
    "rainguard".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_smtp_port() -> u16 {
    587
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

fn default_queue_max_sends() -> usize {
    10
}

fn default_queue_window_ms() -> u64 {
    60_000
}

fn default_queue_suppression_ms() -> u64 {
    60_000
}

fn default_series_cap() -> usize {
    200
}

fn default_series_threshold_multiplier() -> usize {
    20
}

fn default_closer_timeout_secs() -> u64 {
    10
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "rainguard".to_string()
}

/// Split a comma-separated list, dropping blanks
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("RAINGUARD"))
            .build()?
            .try_deserialize()
    }

    pub fn alert_mail_to(&self) -> Vec<String> {
        split_list(&self.alert_mail_to)
    }

    pub fn alert_mail_cc(&self) -> Vec<String> {
        split_list(&self.alert_mail_cc)
    }

    pub fn alert_mail_bcc(&self) -> Vec<String> {
        split_list(&self.alert_mail_bcc)
    }
}
