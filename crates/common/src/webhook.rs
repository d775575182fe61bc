mod discord_webhook;

pub use discord_webhook::*;
