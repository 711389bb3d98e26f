//! Prompt builders for the completion service.

use chrono::{DateTime, Utc};

use crate::report::ReportRecord;
use crate::task::{PeriodTask, TaskSchedule};

const NOT_RECORDED: &str = "(none recorded)";

/// Context for reviewing one daily report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewPrompt {
    pub basic_requirements: String,
    pub detail_requirements: String,
    pub schedule: TaskSchedule,
    pub completed_description: Option<String>,
    pub daily_task: Option<String>,
    pub report_text: String,
}

impl ReviewPrompt {
    /// Day counts are taken at the report's creation time.
    pub fn new(task: &PeriodTask, report: &ReportRecord) -> Self {
        Self {
            basic_requirements: task.basic_requirements().to_string(),
            detail_requirements: task.detail_requirements().to_string(),
            schedule: task.schedule_at(report.created_at()),
            completed_description: task.completed_description().map(str::to_string),
            daily_task: report.daily_task().map(str::to_string),
            report_text: report.text().unwrap_or_default().to_string(),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "You review the daily work report of a team member.\n\
             \n\
             Period task requirements:\n{basic}\n\n\
             Detailed requirements:\n{detail}\n\n\
             Task length: {total} days. Elapsed: {elapsed} days. Remaining: {remaining} days.\n\n\
             Work completed before today:\n{completed}\n\n\
             Today's assigned task:\n{daily}\n\n\
             Today's report:\n{text}\n\n\
             Evaluate the report against today's assignment and the overall progress. \
             Score `basic_score` for the assigned work, `excess_score` for work beyond it and \
             `extra_score` for initiative (each 0-100). Images, if attached, belong to the report.",
            basic = self.basic_requirements,
            detail = self.detail_requirements,
            total = self.schedule.total_days,
            elapsed = self.schedule.elapsed_days,
            remaining = self.schedule.remaining_days,
            completed = self.completed_description.as_deref().unwrap_or(NOT_RECORDED),
            daily = self.daily_task.as_deref().unwrap_or(NOT_RECORDED),
            text = self.report_text,
        )
    }
}

/// Context for summarising task progress and assigning the next day's work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressPrompt {
    pub basic_requirements: String,
    pub detail_requirements: String,
    pub schedule: TaskSchedule,
    pub completed_description: Option<String>,
    pub last_daily_task: Option<String>,
    pub last_review: Option<String>,
}

impl ProgressPrompt {
    /// `latest_report` is the assignee's most recent report, if any.
    pub fn new(task: &PeriodTask, latest_report: Option<&ReportRecord>, now: DateTime<Utc>) -> Self {
        Self {
            basic_requirements: task.basic_requirements().to_string(),
            detail_requirements: task.detail_requirements().to_string(),
            schedule: task.schedule_at(now),
            completed_description: task.completed_description().map(str::to_string),
            last_daily_task: latest_report.and_then(|r| r.daily_task()).map(str::to_string),
            last_review: latest_report
                .and_then(|r| r.review())
                .map(|review| review.evaluation.clone()),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "You track a team member's progress on a period task.\n\
             \n\
             Period task requirements:\n{basic}\n\n\
             Detailed requirements:\n{detail}\n\n\
             Task length: {total} days. Elapsed: {elapsed} days. Remaining: {remaining} days.\n\n\
             Work completed so far:\n{completed}\n\n\
             Most recent daily task:\n{daily}\n\n\
             Review of the most recent report:\n{review}\n\n\
             Write `completion_status`, an updated summary of everything completed so far, and \
             `next_task`, the work to assign for the next day so the task finishes on time.",
            basic = self.basic_requirements,
            detail = self.detail_requirements,
            total = self.schedule.total_days,
            elapsed = self.schedule.elapsed_days,
            remaining = self.schedule.remaining_days,
            completed = self.completed_description.as_deref().unwrap_or(NOT_RECORDED),
            daily = self.last_daily_task.as_deref().unwrap_or(NOT_RECORDED),
            review = self.last_review.as_deref().unwrap_or(NOT_RECORDED),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::NewPeriodTask;
    use chrono::{Duration, TimeZone};
    use officedesk_core::{ReportId, TaskId, UserId};

    fn fixture() -> (PeriodTask, ReportRecord) {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let owner = UserId::new("e1001").unwrap();
        let mut task = PeriodTask::new(
            NewPeriodTask {
                id: TaskId::new(),
                assigner_id: UserId::new("lead").unwrap(),
                assignee_id: owner.clone(),
                start,
                end: start + Duration::days(14),
                basic_requirements: "build the sweep".into(),
                detail_requirements: "stagger jobs by a minute".into(),
            },
            start,
        )
        .unwrap();
        task.record_progress("queue and pool done".into(), start + Duration::days(3));

        let created = start + Duration::days(4) + Duration::hours(9);
        let mut report =
            ReportRecord::draft(ReportId::new(), owner.clone(), Some("write sweep".into()), created);
        report
            .submit(&owner, "sweep written, tests pending".into(), vec![], created)
            .unwrap();
        (task, report)
    }

    #[test]
    fn review_prompt_carries_all_context() {
        let (task, report) = fixture();
        let prompt = ReviewPrompt::new(&task, &report);

        assert_eq!(prompt.schedule.elapsed_days, 4);
        assert_eq!(prompt.schedule.remaining_days, 9);

        let text = prompt.render();
        assert!(text.contains("build the sweep"));
        assert!(text.contains("stagger jobs by a minute"));
        assert!(text.contains("Task length: 14 days. Elapsed: 4 days. Remaining: 9 days."));
        assert!(text.contains("queue and pool done"));
        assert!(text.contains("write sweep"));
        assert!(text.contains("sweep written, tests pending"));
    }

    #[test]
    fn progress_prompt_without_history_says_so() {
        let (task, _) = fixture();
        let prompt = ProgressPrompt::new(&task, None, task.start() + Duration::days(1));

        let text = prompt.render();
        assert!(text.contains("Most recent daily task:\n(none recorded)"));
        assert!(text.contains("Review of the most recent report:\n(none recorded)"));
    }

    #[test]
    fn progress_prompt_uses_latest_report() {
        let (task, report) = fixture();
        let prompt = ProgressPrompt::new(&task, Some(&report), task.start() + Duration::days(5));

        assert_eq!(prompt.last_daily_task.as_deref(), Some("write sweep"));
        assert_eq!(prompt.last_review, None);
    }
}
