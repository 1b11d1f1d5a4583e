//! Infrastructure layer: configuration and Postgres-backed store adapters.

pub mod config;
pub mod postgres;

pub use config::{AppConfig, ConfigError, StoreBackend};
