//! Core job types.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use officedesk_core::{ReportId, TaskId};

use crate::workflows::WorkflowError;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a job does, with its typed payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    /// Produce the review for a submitted report.
    GenerateReportReview {
        report_id: ReportId,
        picture_paths: Vec<PathBuf>,
    },
    /// Summarise a period task's progress and draft the next day's assignment.
    GenerateTaskProgress { task_id: TaskId },
}

impl JobKind {
    pub fn report_review(report_id: ReportId, picture_paths: Vec<PathBuf>) -> Self {
        Self::GenerateReportReview {
            report_id,
            picture_paths,
        }
    }

    pub fn task_progress(task_id: TaskId) -> Self {
        Self::GenerateTaskProgress { task_id }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            JobKind::GenerateReportReview { .. } => "generate_report_review",
            JobKind::GenerateTaskProgress { .. } => "generate_task_progress",
        }
    }
}

/// A unit of deferred work. Consumed exactly once by a worker; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: JobId,
    pub kind: JobKind,
    /// Earliest instant the job may start.
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledJob {
    /// Job runnable right away.
    pub fn immediate(kind: JobKind) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            kind,
            run_at: now,
            created_at: now,
        }
    }
}

/// Job system error.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("{0} is shut down")]
    ShutDown(&'static str),
    #[error("delay of {0:?} is out of range")]
    DelayOutOfRange(std::time::Duration),
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}
