use crate::domain::{
    Channel, DeliveryReceipt, DomainError, DomainResult, MailMessage, MailSender,
};
use crate::mail::SmtpConfig;
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, error, info, instrument, warn};

type Transport = AsyncSmtpTransport<Tokio1Executor>;

/// Sender mailbox: `from` when configured, else `no-reply@<host>`, with the optional display name
pub fn sender_mailbox(config: &SmtpConfig, host: &str) -> DomainResult<Mailbox> {
    let address = config
        .from
        .as_deref()
        .map(str::trim)
        .filter(|from| !from.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("no-reply@{}", host));

    let address = address
        .parse()
        .map_err(|e| DomainError::InvalidRecipient(format!("{}: {}", address, e)))?;

    let name = config
        .from_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    Ok(Mailbox::new(name, address))
}

fn parse_mailbox(address: &str) -> DomainResult<Mailbox> {
    address
        .trim()
        .parse()
        .map_err(|e| DomainError::InvalidRecipient(format!("{}: {}", address, e)))
}

/// Build a plain-text message from the domain mail
pub fn compose_message(from: &Mailbox, message: &MailMessage) -> DomainResult<Message> {
    let mut builder = Message::builder()
        .from(from.clone())
        .subject(message.subject.as_str())
        .header(ContentType::TEXT_PLAIN);

    for address in &message.to {
        builder = builder.to(parse_mailbox(address)?);
    }
    for address in &message.cc {
        builder = builder.cc(parse_mailbox(address)?);
    }
    for address in &message.bcc {
        builder = builder.bcc(parse_mailbox(address)?);
    }

    builder
        .body(message.body.clone())
        .map_err(|e| DomainError::DeliveryFailed(format!("invalid message: {}", e)))
}

fn build_transport(config: &SmtpConfig, host: &str) -> DomainResult<Transport> {
    let invalid = |e: lettre::transport::smtp::Error| {
        DomainError::InvalidConfiguration(format!("SMTP transport for {}: {}", host, e))
    };

    let mut builder = if config.secure {
        Transport::relay(host).map_err(invalid)?
    } else {
        let tls = TlsParameters::new(host.to_string()).map_err(invalid)?;
        Transport::builder_dangerous(host).tls(Tls::Opportunistic(tls))
    };

    builder = builder.port(config.port);

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
    }

    Ok(builder.build())
}

/// SMTP implementation of MailSender backed by a pooled lettre transport
pub struct SmtpMailer {
    transport: Option<Transport>,
    from: Option<Mailbox>,
}

impl SmtpMailer {
    /// Build the mailer; without an SMTP host it is created disabled
    pub fn new(config: &SmtpConfig) -> DomainResult<Self> {
        let Some(host) = config.host() else {
            warn!("SMTP host not configured, mail delivery disabled");
            return Ok(Self::disabled());
        };

        let from = sender_mailbox(config, host)?;
        let transport = build_transport(config, host)?;

        info!(
            host = %host,
            port = config.port,
            secure = config.secure,
            "SMTP transport configured"
        );

        Ok(Self {
            transport: Some(transport),
            from: Some(from),
        })
    }

    pub fn disabled() -> Self {
        Self {
            transport: None,
            from: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Check the SMTP connection; the mailer disables itself when the server is unreachable
    pub async fn verify(&mut self) -> bool {
        let Some(transport) = &self.transport else {
            return false;
        };

        match transport.test_connection().await {
            Ok(true) => {
                info!("SMTP connection verified");
                true
            }
            Ok(false) => {
                error!("SMTP server rejected the connection check, mail delivery disabled");
                self.transport = None;
                false
            }
            Err(e) => {
                error!(error = %e, "SMTP verification failed, mail delivery disabled");
                self.transport = None;
                false
            }
        }
    }
}

#[async_trait]
impl MailSender for SmtpMailer {
    #[instrument(skip(self, message), fields(subject = %message.subject, recipients = message.to.len() + message.cc.len() + message.bcc.len()))]
    async fn send(&self, message: MailMessage) -> DomainResult<DeliveryReceipt> {
        let (Some(transport), Some(from)) = (&self.transport, &self.from) else {
            return Err(DomainError::MailerNotConfigured);
        };

        let email = compose_message(from, &message)?;
        let response = transport
            .send(email)
            .await
            .map_err(|e| DomainError::DeliveryFailed(e.to_string()))?;

        debug!(code = %response.code(), "mail accepted by SMTP server");

        Ok(DeliveryReceipt {
            channel: Channel::Mail,
            recipients: message.recipients(),
            detail: format!(
                "{} {}",
                response.code(),
                response
                    .message()
                    .map(|line| line.to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            ),
        })
    }
}
