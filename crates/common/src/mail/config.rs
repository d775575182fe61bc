use serde::{Deserialize, Serialize};

/// SMTP transport configuration; the mailer stays disabled without a host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    /// Implicit TLS (SMTPS); otherwise STARTTLS is used when the server offers it
    pub secure: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
    pub from_name: Option<String>,
}

impl SmtpConfig {
    /// Configured host, ignoring blank values
    pub fn host(&self) -> Option<&str> {
        self.host
            .as_deref()
            .map(str::trim)
            .filter(|host| !host.is_empty())
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 587,
            secure: false,
            username: None,
            password: None,
            from: None,
            from_name: None,
        }
    }
}
