use crate::domain::{AlertComposer, ChangeDetector, DeliveryTicket, NotificationQueue};
use async_trait::async_trait;
use common::domain::{redact_recipients, AlertEvent, Channel, NotificationJob};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Where alerts are delivered; an empty destination disables its channel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertDestinations {
    pub mail_to: Vec<String>,
    pub mail_cc: Vec<String>,
    pub mail_bcc: Vec<String>,
    pub webhook_url: Option<String>,
}

impl AlertDestinations {
    fn has_mail(&self) -> bool {
        !(self.mail_to.is_empty() && self.mail_cc.is_empty() && self.mail_bcc.is_empty())
    }

    fn webhook_url(&self) -> Option<&str> {
        self.webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Called after a reading has been persisted
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReadingStoredHook: Send + Sync {
    /// Returns whether an alert was dispatched
    async fn on_reading_stored(&self, device_id: &str) -> bool;
}

/// Turns detected state changes into queued notifications
pub struct AlertService {
    detector: Arc<ChangeDetector>,
    queue: NotificationQueue,
    composer: AlertComposer,
    destinations: AlertDestinations,
}

impl AlertService {
    pub fn new(
        detector: Arc<ChangeDetector>,
        queue: NotificationQueue,
        composer: AlertComposer,
        destinations: AlertDestinations,
    ) -> Self {
        if !destinations.has_mail() && destinations.webhook_url().is_none() {
            warn!("no alert destinations configured, alerts will only be logged");
        }

        Self {
            detector,
            queue,
            composer,
            destinations,
        }
    }

    /// Enqueue one job per configured channel for `event`
    pub fn dispatch(&self, event: &AlertEvent) -> Vec<(Channel, DeliveryTicket)> {
        let mut tickets = Vec::with_capacity(2);

        if self.destinations.has_mail() {
            let mut message = self.composer.mail(event, self.destinations.mail_to.clone());
            message.cc = self.destinations.mail_cc.clone();
            message.bcc = self.destinations.mail_bcc.clone();
            tickets.push((Channel::Mail, self.queue.enqueue(NotificationJob::mail(message))));
        } else {
            warn!(device_id = %event.device_id, "no mail recipients configured, skipping mail alert");
        }

        match self.destinations.webhook_url() {
            Some(url) => {
                let message = self.composer.webhook(event, url.to_string());
                tickets.push((
                    Channel::Webhook,
                    self.queue.enqueue(NotificationJob::webhook(message)),
                ));
            }
            None => {
                warn!(device_id = %event.device_id, "no webhook URL configured, skipping webhook alert");
            }
        }

        tickets
    }
}

/// Log every ticket's outcome once it resolves
fn log_outcomes(device_id: String, tickets: Vec<(Channel, DeliveryTicket)>) {
    tokio::spawn(async move {
        for (channel, ticket) in tickets {
            match ticket.await {
                Ok(receipt) => info!(
                    device_id = %device_id,
                    channel = %channel,
                    recipients = ?redact_recipients(&receipt.recipients),
                    "alert delivered"
                ),
                Err(e) => error!(
                    device_id = %device_id,
                    channel = %channel,
                    error = %e,
                    "alert not delivered"
                ),
            }
        }
    });
}

#[async_trait]
impl ReadingStoredHook for AlertService {
    #[instrument(skip(self), fields(device_id = %device_id))]
    async fn on_reading_stored(&self, device_id: &str) -> bool {
        let Some(event) = self.detector.detect(device_id).await else {
            return false;
        };

        info!(changed = ?event.changed_fields, "automatic state change, dispatching alert");

        let tickets = self.dispatch(&event);
        if tickets.is_empty() {
            return false;
        }

        log_outcomes(event.device_id, tickets);
        true
    }
}
