pub mod alert_worker;
pub mod domain;

pub use alert_worker::*;
pub use domain::*;
