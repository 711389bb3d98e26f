//! Re-drives submitted reports that never got a review.
//!
//! The delayed timers are in memory only, so a restart (or an exhausted
//! completion) can leave submitted reports without a review. The daily sweep
//! schedules a fresh generation job for each of them, one stagger step apart.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{error, info, warn};

use officedesk_core::{DayWindow, day_window};
use officedesk_reports::ReportRecord;

use super::{ReportStore, ReportWorkflow, WorkflowError, staggered};
use crate::store::KeyedStore;

/// Outcome of one sweep run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Submitted records without a review inside the window.
    pub matched: usize,
    pub scheduled: usize,
    /// Matched records generating for more than a day.
    pub stuck: usize,
    pub failed: usize,
}

pub struct ReconciliationSweep {
    reports: ReportStore,
    workflow: Arc<ReportWorkflow>,
    stagger: Duration,
    timezone: Tz,
    lookback_days: u32,
}

impl ReconciliationSweep {
    pub fn new(reports: ReportStore, workflow: Arc<ReportWorkflow>, timezone: Tz) -> Self {
        Self {
            reports,
            workflow,
            stagger: Duration::from_secs(60),
            timezone,
            lookback_days: 1,
        }
    }

    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    /// Sweep the configured lookback window ending at local midnight of `now`'s day.
    pub fn run(&self, now: DateTime<Utc>) -> Result<SweepReport, WorkflowError> {
        let window =
            day_window(self.timezone, now, self.lookback_days).map_err(WorkflowError::Window)?;
        self.sweep(window, now)
    }

    /// Schedule generation for every submitted, unreviewed record created inside `window`.
    pub fn sweep(&self, window: DayWindow, now: DateTime<Utc>) -> Result<SweepReport, WorkflowError> {
        let mut pending = self
            .reports
            .query(&|r: &ReportRecord| r.awaits_review() && window.contains(r.created_at()))?;
        pending.sort_by_key(|r| (r.created_at(), r.id_typed()));

        let mut report = SweepReport {
            matched: pending.len(),
            ..SweepReport::default()
        };

        for (idx, record) in pending.iter().enumerate() {
            let report_id = record.id_typed();
            if record.is_stuck(now) {
                report.stuck += 1;
                warn!(
                    report_id = %report_id,
                    owner = %record.owner_id(),
                    "report generating for more than a day"
                );
            }

            let delay = staggered(self.stagger, idx);
            match self.workflow.resubmit(report_id, delay) {
                Ok(job_id) => {
                    report.scheduled += 1;
                    info!(
                        report_id = %report_id,
                        job_id = %job_id,
                        delay_secs = delay.as_secs(),
                        "review generation rescheduled"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    error!(report_id = %report_id, error = %e, "failed to reschedule review");
                }
            }
        }

        info!(
            window_start = %window.start,
            window_end = %window.end,
            matched = report.matched,
            scheduled = report.scheduled,
            stuck = report.stuck,
            failed = report.failed,
            "reconciliation sweep finished"
        );
        Ok(report)
    }
}
