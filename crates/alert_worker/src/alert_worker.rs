use crate::domain::{
    AlertComposer, AlertDestinations, AlertService, ChangeDetector, NotificationProcessor,
    NotificationQueue, RateLimitConfig, ReadingIngestionService,
};
use common::domain::{DeviceRepository, MailSender, TelemetryRepository, WebhookSender};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct AlertWorkerConfig {
    pub rate_limit: RateLimitConfig,
    pub destinations: AlertDestinations,
}

/// Change detection and throttled alert delivery
pub struct AlertWorker {
    queue: NotificationQueue,
    processor: NotificationProcessor,
    alert_service: Arc<AlertService>,
    ingestion_service: Arc<ReadingIngestionService>,
}

impl AlertWorker {
    pub fn new(
        device_repository: Arc<dyn DeviceRepository>,
        telemetry_repository: Arc<dyn TelemetryRepository>,
        mail_sender: Arc<dyn MailSender>,
        webhook_sender: Arc<dyn WebhookSender>,
        config: AlertWorkerConfig,
    ) -> Self {
        info!(
            max_sends = config.rate_limit.max_sends,
            window_ms = config.rate_limit.window.as_millis() as u64,
            suppression_ms = config.rate_limit.suppression.as_millis() as u64,
            "Initializing alert worker"
        );

        let (queue, processor) =
            NotificationQueue::new(config.rate_limit, mail_sender, webhook_sender);

        let detector = Arc::new(ChangeDetector::new(telemetry_repository.clone()));
        let alert_service = Arc::new(AlertService::new(
            detector,
            queue.clone(),
            AlertComposer::default(),
            config.destinations,
        ));

        let ingestion_service = Arc::new(ReadingIngestionService::new(
            device_repository,
            telemetry_repository,
            alert_service.clone(),
        ));

        Self {
            queue,
            processor,
            alert_service,
            ingestion_service,
        }
    }

    pub fn queue(&self) -> NotificationQueue {
        self.queue.clone()
    }

    pub fn alert_service(&self) -> Arc<AlertService> {
        self.alert_service.clone()
    }

    /// Entry point for device telemetry transports
    pub fn ingestion_service(&self) -> Arc<ReadingIngestionService> {
        self.ingestion_service.clone()
    }

    /// The queue processor as a runner process; runner cancellation closes the queue
    pub fn into_runner_process(
        self,
    ) -> Box<
        dyn FnOnce(
                CancellationToken,
            ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
            + Send,
    > {
        let queue = self.queue;
        let processor = self.processor;

        Box::new(move |ctx| {
            Box::pin(async move {
                let run = processor.run();
                tokio::pin!(run);

                tokio::select! {
                    result = &mut run => result,
                    _ = ctx.cancelled() => {
                        queue.shutdown();
                        run.await
                    }
                }
            })
        })
    }
}
