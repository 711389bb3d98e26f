//! Report review, reconciliation sweep and task progress workflows.
//!
//! Workflows own the read-modify-write sequences against the keyed stores and
//! hand slow work (completion calls) to jobs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use officedesk_core::{DomainError, ReportId, TaskId, UserId};
use officedesk_reports::{PeriodTask, ReportRecord};

use crate::store::{KeyedStore, StoreError};

pub mod report_review;
pub mod sweep;
pub mod task_progress;

pub use report_review::{GenerationOutcome, ReportWorkflow};
pub use sweep::{ReconciliationSweep, SweepReport};
pub use task_progress::{ProgressOutcome, TaskProgressWorkflow};

pub type ReportStore = Arc<dyn KeyedStore<ReportRecord>>;
pub type TaskStore = Arc<dyn KeyedStore<PeriodTask>>;

/// What happens to a report when every completion attempt failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustedPolicy {
    /// Keep `generating` set and leave the record to the next sweep.
    #[default]
    LeaveGenerating,
    /// Clear `generating` and record the failure.
    MarkFailed,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("report not found: {0}")]
    ReportNotFound(ReportId),
    #[error("no period task for {owner} covering {at}")]
    TaskNotFound { owner: UserId, at: DateTime<Utc> },
    #[error("period task not found: {0}")]
    UnknownTask(TaskId),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("could not schedule job: {0}")]
    Schedule(String),
    #[error("invalid sweep window: {0}")]
    Window(DomainError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Rejected(DomainError::Conflict(msg)) => Self::Conflict(msg),
            StoreError::AlreadyExists(key) => Self::Conflict(format!("record {key} already exists")),
            other => Self::Store(other),
        }
    }
}

/// Delay of the `index`-th job in a staggered batch.
pub(crate) fn staggered(step: Duration, index: usize) -> Duration {
    step.saturating_mul(u32::try_from(index).unwrap_or(u32::MAX))
}

/// The owner's task whose window covers `at`; the latest-starting one if several do.
pub(crate) fn task_covering(
    tasks: &dyn KeyedStore<PeriodTask>,
    owner: &UserId,
    at: DateTime<Utc>,
) -> Result<Option<PeriodTask>, WorkflowError> {
    let matches = tasks.query(&|t: &PeriodTask| t.assignee_id() == owner && t.covers(at))?;
    Ok(matches.into_iter().max_by_key(|t| (t.start(), t.id_typed())))
}
