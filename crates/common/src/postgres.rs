mod client;
mod config;
mod device_repository;
mod schema;
mod telemetry_repository;

pub use client::*;
pub use config::*;
pub use device_repository::*;
pub use schema::*;
pub use telemetry_repository::*;
