pub mod domain;
pub mod mail;
pub mod postgres;
pub mod telemetry;
pub mod webhook;

pub use domain::*;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockDeviceRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockMailSender;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockTelemetryRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockWebhookSender;
