use crate::domain::rate_state::{RateLimitConfig, RateState};
use common::domain::{
    redact_recipients, DeliveryReceipt, DomainError, DomainResult, MailSender, NotificationJob,
    NotificationPayload, WebhookSender,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What the processor is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Processing,
    RateLimited,
}

struct QueuedJob {
    job: NotificationJob,
    reply: oneshot::Sender<DomainResult<DeliveryReceipt>>,
}

/// Resolves once the job has been delivered or rejected
#[derive(Debug)]
pub struct DeliveryTicket {
    receiver: oneshot::Receiver<DomainResult<DeliveryReceipt>>,
}

impl Future for DeliveryTicket {
    type Output = DomainResult<DeliveryReceipt>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // a dropped reply sender means the processor is gone
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(DomainError::QueueClosed)))
    }
}

/// Handle for submitting notification jobs.
///
/// Jobs are delivered strictly in submission order by the single
/// [`NotificationProcessor`] created alongside the handle.
#[derive(Clone)]
pub struct NotificationQueue {
    sender: mpsc::UnboundedSender<QueuedJob>,
    state: watch::Receiver<QueueState>,
    shutdown: CancellationToken,
}

impl NotificationQueue {
    pub fn new(
        config: RateLimitConfig,
        mail_sender: Arc<dyn MailSender>,
        webhook_sender: Arc<dyn WebhookSender>,
    ) -> (Self, NotificationProcessor) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(QueueState::Idle);
        let shutdown = CancellationToken::new();

        let queue = Self {
            sender,
            state: state_rx,
            shutdown: shutdown.clone(),
        };
        let processor = NotificationProcessor {
            receiver,
            state: state_tx,
            shutdown,
            rate: RateState::new(config),
            mail_sender,
            webhook_sender,
        };

        (queue, processor)
    }

    /// Append a job without waiting for its delivery
    pub fn enqueue(&self, job: NotificationJob) -> DeliveryTicket {
        let (reply, receiver) = oneshot::channel();
        let channel = job.payload.channel();

        if self.sender.send(QueuedJob { job, reply }).is_err() {
            warn!(channel = %channel, "notification queue closed, job rejected");
        } else {
            debug!(channel = %channel, "notification job enqueued");
        }

        DeliveryTicket { receiver }
    }

    pub fn state(&self) -> QueueState {
        *self.state.borrow()
    }

    /// Receiver notified on every state transition
    pub fn subscribe_state(&self) -> watch::Receiver<QueueState> {
        self.state.clone()
    }

    /// Stop the processor; jobs not yet delivered are rejected with `QueueClosed`
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Owns the backlog and the rate state; delivers one job at a time
pub struct NotificationProcessor {
    receiver: mpsc::UnboundedReceiver<QueuedJob>,
    state: watch::Sender<QueueState>,
    shutdown: CancellationToken,
    rate: RateState,
    mail_sender: Arc<dyn MailSender>,
    webhook_sender: Arc<dyn WebhookSender>,
}

impl NotificationProcessor {
    fn set_state(&self, state: QueueState) {
        self.state.send_replace(state);
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        info!("notification processor started");

        loop {
            self.set_state(QueueState::Idle);

            let queued = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                next = self.receiver.recv() => match next {
                    Some(queued) => queued,
                    None => break,
                },
            };

            self.set_state(QueueState::Processing);

            if !self.wait_for_capacity().await {
                let _ = queued.reply.send(Err(DomainError::QueueClosed));
                break;
            }

            let result = self.deliver(queued.job).await;
            // the caller may have dropped its ticket
            let _ = queued.reply.send(result);
        }

        let rejected = self.drain();
        self.set_state(QueueState::Idle);
        info!(rejected, "notification processor stopped");
        Ok(())
    }

    /// Sleep while the sliding window is full; `false` when shut down meanwhile
    async fn wait_for_capacity(&mut self) -> bool {
        loop {
            let Some(wait) = self.rate.wait_time(Instant::now()) else {
                return true;
            };

            self.set_state(QueueState::RateLimited);
            debug!(
                wait_ms = wait.as_millis() as u64,
                sends_in_window = self.rate.sends_in_window(),
                "rate limit reached, delaying delivery"
            );

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return false,
                _ = tokio::time::sleep(wait) => {}
            }

            self.set_state(QueueState::Processing);
        }
    }

    async fn deliver(&mut self, job: NotificationJob) -> DomainResult<DeliveryReceipt> {
        let channel = job.payload.channel();
        let requested = job.payload.recipients();
        let now = Instant::now();

        let rate = &self.rate;
        let Some(payload) = job
            .payload
            .retain_recipients(|recipient| !rate.is_suppressed(recipient, now))
        else {
            warn!(
                channel = %channel,
                recipients = ?redact_recipients(&requested),
                "all recipients suppressed"
            );
            return Err(DomainError::RecipientsSuppressed(requested));
        };

        let recipients = payload.recipients();
        if recipients.len() < requested.len() {
            debug!(
                channel = %channel,
                kept = recipients.len(),
                requested = requested.len(),
                "suppressed recently notified recipients"
            );
        }

        let result = match payload {
            NotificationPayload::Mail(message) => self.mail_sender.send(message).await,
            NotificationPayload::Webhook(message) => self.webhook_sender.post(message).await,
        };

        match &result {
            Ok(receipt) => {
                self.rate.record(recipients.as_slice(), Instant::now());
                info!(channel = %channel, detail = %receipt.detail, "notification delivered");
            }
            Err(e) => {
                error!(channel = %channel, error = %e, "notification delivery failed");
            }
        }

        result
    }

    /// Reject everything still queued
    fn drain(&mut self) -> usize {
        self.receiver.close();

        let mut rejected = 0;
        while let Ok(queued) = self.receiver.try_recv() {
            let _ = queued.reply.send(Err(DomainError::QueueClosed));
            rejected += 1;
        }
        rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{
        Channel, MailMessage, MockMailSender, MockWebhookSender, WebhookMessage,
    };
    use std::sync::Mutex;
    use std::time::Duration;

    fn mail_job(to: &[&str]) -> NotificationJob {
        NotificationJob::mail(MailMessage::new(
            to.iter().map(|a| a.to_string()).collect(),
            "Rain detected",
            "body",
        ))
    }

    fn webhook_job(url: &str) -> NotificationJob {
        NotificationJob::webhook(WebhookMessage {
            url: url.to_string(),
            payload: serde_json::json!({ "content": "Rain detected" }),
        })
    }

    fn mail_receipt(message: &MailMessage) -> DeliveryReceipt {
        DeliveryReceipt {
            channel: Channel::Mail,
            recipients: message.recipients(),
            detail: "250 OK".to_string(),
        }
    }

    fn no_suppression(max_sends: usize) -> RateLimitConfig {
        RateLimitConfig {
            max_sends,
            window: Duration::from_secs(60),
            suppression: Duration::ZERO,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_window_delays_fourth_send() {
        let mut mail = MockMailSender::new();
        mail.expect_send()
            .times(4)
            .returning(|message| Ok(mail_receipt(&message)));

        let (queue, processor) = NotificationQueue::new(
            no_suppression(3),
            Arc::new(mail),
            Arc::new(MockWebhookSender::new()),
        );
        let handle = tokio::spawn(processor.run());

        let start = Instant::now();
        let tickets: Vec<_> = ["a@x.io", "b@x.io", "c@x.io", "d@x.io"]
            .iter()
            .map(|to| queue.enqueue(mail_job(&[to])))
            .collect();

        let mut delivered_at = Vec::new();
        for ticket in tickets {
            ticket.await.unwrap();
            delivered_at.push(Instant::now() - start);
        }

        assert!(delivered_at[2] < Duration::from_secs(1));
        assert!(delivered_at[3] >= Duration::from_secs(60));

        queue.shutdown();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_recently_notified_recipient_is_suppressed() {
        let mut mail = MockMailSender::new();
        mail.expect_send()
            .times(1)
            .returning(|message| Ok(mail_receipt(&message)));

        let (queue, processor) = NotificationQueue::new(
            RateLimitConfig::default(),
            Arc::new(mail),
            Arc::new(MockWebhookSender::new()),
        );
        tokio::spawn(processor.run());

        let first = queue.enqueue(mail_job(&["ops@x.io"])).await;
        let second = queue.enqueue(mail_job(&["ops@x.io"])).await;

        assert!(first.is_ok());
        match second {
            Err(DomainError::RecipientsSuppressed(recipients)) => {
                assert_eq!(recipients, vec!["ops@x.io"]);
            }
            other => panic!("expected suppression, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppressed_webhook_error_hides_url_token() {
        let url = "https://discord.com/api/webhooks/77/hook-secret";
        let mut webhook = MockWebhookSender::new();
        webhook.expect_post().times(1).returning(|message| {
            Ok(DeliveryReceipt {
                channel: Channel::Webhook,
                recipients: vec![message.url],
                detail: "204 No Content".to_string(),
            })
        });

        let (queue, processor) = NotificationQueue::new(
            RateLimitConfig::default(),
            Arc::new(MockMailSender::new()),
            Arc::new(webhook),
        );
        tokio::spawn(processor.run());

        assert!(queue.enqueue(webhook_job(url)).await.is_ok());
        let err = queue
            .enqueue(webhook_job(url))
            .await
            .expect_err("second post within the suppression window");

        assert!(matches!(err, DomainError::RecipientsSuppressed(_)));
        assert!(!err.to_string().contains("hook-secret"));
        assert!(err.to_string().contains("discord.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppression_filters_only_recent_recipients() {
        let mut mail = MockMailSender::new();
        mail.expect_send()
            .withf(|message: &MailMessage| message.to == vec!["ops@x.io"])
            .times(1)
            .returning(|message| Ok(mail_receipt(&message)));
        mail.expect_send()
            .withf(|message: &MailMessage| message.to == vec!["field@x.io"])
            .times(1)
            .returning(|message| Ok(mail_receipt(&message)));

        let (queue, processor) = NotificationQueue::new(
            RateLimitConfig::default(),
            Arc::new(mail),
            Arc::new(MockWebhookSender::new()),
        );
        tokio::spawn(processor.run());

        queue.enqueue(mail_job(&["ops@x.io"])).await.unwrap();
        let receipt = queue
            .enqueue(mail_job(&["ops@x.io", "field@x.io"]))
            .await
            .unwrap();

        assert_eq!(receipt.recipients, vec!["field@x.io"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppression_expires_after_threshold() {
        let mut mail = MockMailSender::new();
        mail.expect_send()
            .times(2)
            .returning(|message| Ok(mail_receipt(&message)));

        let (queue, processor) = NotificationQueue::new(
            RateLimitConfig::default(),
            Arc::new(mail),
            Arc::new(MockWebhookSender::new()),
        );
        tokio::spawn(processor.run());

        queue.enqueue(mail_job(&["ops@x.io"])).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(queue.enqueue(mail_job(&["ops@x.io"])).await.is_ok());
    }

    #[tokio::test]
    async fn test_jobs_are_delivered_in_order() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sent_clone = sent.clone();

        let mut mail = MockMailSender::new();
        mail.expect_send().times(3).returning(move |message| {
            sent_clone.lock().unwrap().push(message.to[0].clone());
            Ok(mail_receipt(&message))
        });

        let (queue, processor) = NotificationQueue::new(
            no_suppression(10),
            Arc::new(mail),
            Arc::new(MockWebhookSender::new()),
        );
        tokio::spawn(processor.run());

        let tickets: Vec<_> = ["1@x.io", "2@x.io", "3@x.io"]
            .iter()
            .map(|to| queue.enqueue(mail_job(&[to])))
            .collect();
        for ticket in tickets {
            ticket.await.unwrap();
        }

        assert_eq!(*sent.lock().unwrap(), vec!["1@x.io", "2@x.io", "3@x.io"]);
    }

    #[tokio::test]
    async fn test_failed_send_does_not_stop_the_queue() {
        let mut mail = MockMailSender::new();
        mail.expect_send()
            .times(1)
            .returning(|_| Err(DomainError::DeliveryFailed("connection reset".to_string())));

        let mut webhook = MockWebhookSender::new();
        webhook.expect_post().times(1).returning(|message| {
            Ok(DeliveryReceipt {
                channel: Channel::Webhook,
                recipients: vec![message.url],
                detail: "204 No Content".to_string(),
            })
        });

        let (queue, processor) =
            NotificationQueue::new(no_suppression(10), Arc::new(mail), Arc::new(webhook));
        tokio::spawn(processor.run());

        let mail_ticket = queue.enqueue(mail_job(&["ops@x.io"]));
        let webhook_ticket = queue.enqueue(webhook_job("https://hooks.example.com/1"));

        assert!(matches!(
            mail_ticket.await,
            Err(DomainError::DeliveryFailed(_))
        ));
        let receipt = webhook_ticket.await.unwrap();
        assert_eq!(receipt.channel, Channel::Webhook);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_rejects_pending_jobs() {
        let mut mail = MockMailSender::new();
        mail.expect_send()
            .times(1)
            .returning(|message| Ok(mail_receipt(&message)));

        let (queue, processor) = NotificationQueue::new(
            no_suppression(1),
            Arc::new(mail),
            Arc::new(MockWebhookSender::new()),
        );
        let mut state = queue.subscribe_state();
        let handle = tokio::spawn(processor.run());

        let first = queue.enqueue(mail_job(&["1@x.io"]));
        let second = queue.enqueue(mail_job(&["2@x.io"]));
        let third = queue.enqueue(mail_job(&["3@x.io"]));

        assert!(first.await.is_ok());
        state
            .wait_for(|s| *s == QueueState::RateLimited)
            .await
            .unwrap();

        queue.shutdown();

        assert!(matches!(second.await, Err(DomainError::QueueClosed)));
        assert!(matches!(third.await, Err(DomainError::QueueClosed)));
        handle.await.unwrap().unwrap();

        assert!(matches!(
            queue.enqueue(mail_job(&["4@x.io"])).await,
            Err(DomainError::QueueClosed)
        ));
    }

    #[tokio::test]
    async fn test_ticket_rejected_without_processor() {
        let (queue, processor) = NotificationQueue::new(
            RateLimitConfig::default(),
            Arc::new(MockMailSender::new()),
            Arc::new(MockWebhookSender::new()),
        );
        drop(processor);

        let result = queue.enqueue(mail_job(&["ops@x.io"])).await;

        assert!(matches!(result, Err(DomainError::QueueClosed)));
        assert_eq!(queue.state(), QueueState::Idle);
    }
}
