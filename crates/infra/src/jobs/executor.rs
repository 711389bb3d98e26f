//! Routes each job kind to the workflow that handles it.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use super::pool::JobRunner;
use super::types::{JobError, JobKind, ScheduledJob};
use crate::workflows::{ReportWorkflow, TaskProgressWorkflow};

/// The pool's job runner.
pub struct JobExecutor {
    reports: Arc<ReportWorkflow>,
    progress: Arc<TaskProgressWorkflow>,
}

impl JobExecutor {
    pub fn new(reports: Arc<ReportWorkflow>, progress: Arc<TaskProgressWorkflow>) -> Self {
        Self { reports, progress }
    }
}

impl JobRunner for JobExecutor {
    fn run(&self, job: &ScheduledJob) -> Result<(), JobError> {
        match &job.kind {
            JobKind::GenerateReportReview {
                report_id,
                picture_paths,
            } => {
                let outcome = self.reports.generate(*report_id, picture_paths.clone())?;
                info!(job_id = %job.id, report_id = %report_id, outcome = ?outcome, "review job finished");
            }
            JobKind::GenerateTaskProgress { task_id } => {
                let outcome = self.progress.generate_progress(*task_id, Utc::now())?;
                info!(job_id = %job.id, task_id = %task_id, outcome = ?outcome, "progress job finished");
            }
        }
        Ok(())
    }
}
