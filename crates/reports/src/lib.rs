//! Daily report domain module.
//!
//! This crate contains the report lifecycle rules, period tasks and the
//! prompts/payloads exchanged with the completion service, implemented purely
//! as deterministic domain logic (no IO, no HTTP, no storage).

pub mod prompt;
pub mod report;
pub mod review;
pub mod task;

pub use prompt::{ProgressPrompt, ReviewPrompt};
pub use report::{GenerationFailure, Picture, ReportRecord, ReportState, STUCK_AFTER_SECS};
pub use review::{CategoryScores, PayloadError, ReportReview, TaskProgress};
pub use task::{NewPeriodTask, PeriodTask, TaskSchedule};
