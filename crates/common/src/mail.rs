mod config;
mod smtp_mailer;

pub use config::*;
pub use smtp_mailer::*;
