//! Daily task-progress generation.
//!
//! Once a day every active period task gets a job that asks the completion
//! service to summarise progress so far and assign the next day's work. The
//! assignment is stored as a draft report the member later submits.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use officedesk_ai::{CompletionClient, CompletionContext, CompletionRequest};
use officedesk_core::{ReportId, TaskId};
use officedesk_reports::{PeriodTask, ProgressPrompt, ReportRecord, TaskProgress};

use super::{ReportStore, TaskStore, WorkflowError, staggered};
use crate::jobs::{JobKind, JobScheduler};
use crate::store::{KeyedStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressOutcome {
    /// Task description updated and the next day's draft created.
    Updated { draft_id: ReportId },
    /// Completion exhausted; task left unchanged.
    Exhausted { attempts: u32 },
}

pub struct TaskProgressWorkflow {
    tasks: TaskStore,
    reports: ReportStore,
    client: Arc<CompletionClient>,
    scheduler: Arc<dyn JobScheduler>,
    stagger: Duration,
}

impl TaskProgressWorkflow {
    pub fn new(
        tasks: TaskStore,
        reports: ReportStore,
        client: Arc<CompletionClient>,
        scheduler: Arc<dyn JobScheduler>,
    ) -> Self {
        Self {
            tasks,
            reports,
            client,
            scheduler,
            stagger: Duration::from_secs(60),
        }
    }

    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    /// Schedule one progress job per task still running at `now`. Returns how many were scheduled.
    pub fn run_daily_task_generation(&self, now: DateTime<Utc>) -> Result<usize, WorkflowError> {
        let mut active = self.tasks.query(&|t: &PeriodTask| t.is_active(now))?;
        active.sort_by_key(|t| (t.start(), t.id_typed()));

        let mut scheduled = 0;
        for (idx, task) in active.iter().enumerate() {
            let task_id = task.id_typed();
            match self
                .scheduler
                .schedule(JobKind::task_progress(task_id), staggered(self.stagger, idx))
            {
                Ok(job_id) => {
                    scheduled += 1;
                    info!(task_id = %task_id, job_id = %job_id, "task progress scheduled");
                }
                Err(e) => error!(task_id = %task_id, error = %e, "failed to schedule task progress"),
            }
        }

        info!(active = active.len(), scheduled, "daily task generation dispatched");
        Ok(scheduled)
    }

    /// Summarise one task and draft the assignee's next daily task.
    pub fn generate_progress(
        &self,
        task_id: TaskId,
        now: DateTime<Utc>,
    ) -> Result<ProgressOutcome, WorkflowError> {
        let task = self
            .tasks
            .get(&task_id)?
            .ok_or(WorkflowError::UnknownTask(task_id))?;
        let assignee = task.assignee_id().clone();

        let latest = self
            .reports
            .query(&|r: &ReportRecord| r.owner_id() == &assignee)?
            .into_iter()
            .max_by_key(|r| (r.created_at(), r.id_typed()));

        let request = CompletionRequest::new(ProgressPrompt::new(&task, latest.as_ref(), now).render())
            .with_schema(TaskProgress::SCHEMA_NAME, TaskProgress::response_schema());
        let ctx = CompletionContext::task(assignee.clone());

        let progress = match self.client.complete_structured::<TaskProgress>(&ctx, &request) {
            Ok(progress) => progress,
            Err(exhausted) => {
                warn!(
                    task_id = %task_id,
                    attempts = exhausted.attempts,
                    error = %exhausted.last_error,
                    "task progress generation exhausted, task left unchanged"
                );
                return Ok(ProgressOutcome::Exhausted {
                    attempts: exhausted.attempts,
                });
            }
        };

        self.tasks
            .update(&task_id, &mut |t: &mut PeriodTask| {
                t.record_progress(progress.completion_status.clone(), now);
                Ok(())
            })
            .map_err(|e| match e {
                StoreError::NotFound(_) => WorkflowError::UnknownTask(task_id),
                other => other.into(),
            })?;

        let draft = ReportRecord::draft(ReportId::new(), assignee, Some(progress.next_task), now);
        let draft_id = draft.id_typed();
        self.reports.insert(draft)?;

        info!(task_id = %task_id, draft_id = %draft_id, "task progress recorded");
        Ok(ProgressOutcome::Updated { draft_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::testkit::{Kit, day, owner};
    use officedesk_ai::{CompletionError, CompletionPurpose, ScriptedCompletionService};
    use officedesk_core::UserId;
    use officedesk_reports::ReportState;

    const PROGRESS_JSON: &str =
        r#"{"completion_status":"pool and timers done","next_task":"write the sweep"}"#;

    fn workflow(kit: &Kit) -> TaskProgressWorkflow {
        TaskProgressWorkflow::new(
            kit.tasks.clone(),
            kit.reports.clone(),
            kit.client.clone(),
            kit.scheduler.clone(),
        )
        .with_stagger(Duration::from_secs(30))
    }

    #[test]
    fn schedules_only_active_tasks_staggered() {
        let kit = Kit::new(ScriptedCompletionService::new(), 0);
        let wf = workflow(&kit);
        let a = kit.add_task(&owner(), day(1, 0), 10);
        let b = kit.add_task(&UserId::new("e2002").unwrap(), day(2, 0), 10);
        kit.add_task(&owner(), day(1, 0), 1); // ended on day 2

        let scheduled = wf.run_daily_task_generation(day(5, 0)).unwrap();

        assert_eq!(scheduled, 2);
        assert_eq!(
            kit.scheduler.scheduled(),
            vec![
                (JobKind::task_progress(a.id_typed()), Duration::ZERO),
                (JobKind::task_progress(b.id_typed()), Duration::from_secs(30)),
            ]
        );
    }

    #[test]
    fn progress_updates_task_and_creates_next_draft() {
        let kit = Kit::new(ScriptedCompletionService::replying(PROGRESS_JSON), 0);
        let wf = workflow(&kit);
        let task = kit.add_task(&owner(), day(1, 0), 10);

        let outcome = wf.generate_progress(task.id_typed(), day(4, 18)).unwrap();
        let ProgressOutcome::Updated { draft_id } = outcome else {
            panic!("expected an update, got {outcome:?}");
        };

        let stored = kit.tasks.get(&task.id_typed()).unwrap().unwrap();
        assert_eq!(stored.completed_description(), Some("pool and timers done"));

        let draft = kit.reports.get(&draft_id).unwrap().unwrap();
        assert_eq!(draft.state(), ReportState::Draft);
        assert_eq!(draft.owner_id(), &owner());
        assert_eq!(draft.daily_task(), Some("write the sweep"));

        let entries = kit.log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].purpose, CompletionPurpose::Task);
        let request = &kit.service.requests()[0];
        assert_eq!(request.schema.as_ref().unwrap().name, TaskProgress::SCHEMA_NAME);
    }

    #[test]
    fn prompt_includes_latest_report_context() {
        let kit = Kit::new(ScriptedCompletionService::replying(PROGRESS_JSON), 0);
        let wf = workflow(&kit);
        let task = kit.add_task(&owner(), day(1, 0), 10);
        kit.reports
            .insert(ReportRecord::draft(ReportId::new(), owner(), Some("old task".into()), day(2, 18)))
            .unwrap();
        kit.reports
            .insert(ReportRecord::draft(ReportId::new(), owner(), Some("yesterday's task".into()), day(3, 18)))
            .unwrap();

        wf.generate_progress(task.id_typed(), day(4, 18)).unwrap();
        let text = &kit.service.requests()[0].text;
        assert!(text.contains("yesterday's task"));
        assert!(!text.contains("old task"));
    }

    #[test]
    fn exhaustion_leaves_task_unchanged() {
        let kit = Kit::new(
            ScriptedCompletionService::failing(CompletionError::EmptyResponse),
            2,
        );
        let wf = workflow(&kit);
        let task = kit.add_task(&owner(), day(1, 0), 10);

        let outcome = wf.generate_progress(task.id_typed(), day(4, 18)).unwrap();
        assert_eq!(outcome, ProgressOutcome::Exhausted { attempts: 3 });
        assert_eq!(
            kit.tasks.get(&task.id_typed()).unwrap().unwrap().completed_description(),
            None
        );
        assert!(kit.reports.is_empty());
        assert_eq!(kit.log.len(), 3);
    }

    #[test]
    fn unknown_task_is_not_found() {
        let kit = Kit::new(ScriptedCompletionService::new(), 0);
        let wf = workflow(&kit);
        assert!(matches!(
            wf.generate_progress(TaskId::new(), day(4, 18)),
            Err(WorkflowError::UnknownTask(_))
        ));
    }
}
