//! Infrastructure layer: configuration, keyed store, jobs, cron and workflows.

pub mod config;
pub mod jobs;
pub mod schedule;
pub mod services;
pub mod store;
pub mod workflows;

pub use config::{ConfigError, ServiceConfig};
pub use services::{Backends, CHECK_DAILY_REPORT, DAILY_GENERATION, Services, StartError};
