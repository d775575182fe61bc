mod alert_composer;
mod alert_service;
mod change_detector;
mod ingestion_service;
mod notification_queue;
mod rate_state;

pub use alert_composer::*;
pub use alert_service::*;
pub use change_detector::*;
pub use ingestion_service::*;
pub use notification_queue::*;
pub use rate_state::RateLimitConfig;
