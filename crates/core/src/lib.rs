//! `officedesk-core`: shared building blocks.
//!
//! This crate contains identifiers, the domain error model and calendar helpers
//! (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;
pub mod time;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{ReportId, TaskId, UserId};
pub use time::{DayWindow, day_window, elapsed_days, local_time_to_utc};
