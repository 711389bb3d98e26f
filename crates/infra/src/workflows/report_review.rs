//! Submitted report → scheduled generation → review.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use officedesk_ai::{CompletionClient, CompletionContext, CompletionRequest};
use officedesk_core::{ReportId, UserId};
use officedesk_reports::{Picture, ReportRecord, ReportReview, ReviewPrompt};

use super::{ExhaustedPolicy, ReportStore, TaskStore, WorkflowError, task_covering};
use crate::jobs::{JobId, JobKind, JobScheduler};
use crate::store::{KeyedStore, StoreError};

/// How a generation job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Reviewed,
    /// Someone else wrote the review first; nothing to do.
    AlreadyReviewed,
    /// Completion exhausted; record still generating.
    LeftGenerating { attempts: u32 },
    /// Completion exhausted; record marked failed.
    MarkedFailed { attempts: u32 },
}

pub struct ReportWorkflow {
    reports: ReportStore,
    tasks: TaskStore,
    client: Arc<CompletionClient>,
    scheduler: Arc<dyn JobScheduler>,
    grace_delay: Duration,
    exhausted_policy: ExhaustedPolicy,
}

impl ReportWorkflow {
    pub fn new(
        reports: ReportStore,
        tasks: TaskStore,
        client: Arc<CompletionClient>,
        scheduler: Arc<dyn JobScheduler>,
    ) -> Self {
        Self {
            reports,
            tasks,
            client,
            scheduler,
            grace_delay: Duration::from_secs(5 * 60),
            exhausted_policy: ExhaustedPolicy::default(),
        }
    }

    /// Delay between submission and the generation job.
    pub fn with_grace_delay(mut self, delay: Duration) -> Self {
        self.grace_delay = delay;
        self
    }

    pub fn with_exhausted_policy(mut self, policy: ExhaustedPolicy) -> Self {
        self.exhausted_policy = policy;
        self
    }

    /// Store the submitted report, mark it generating and schedule its review.
    ///
    /// Fills the draft with this id if one exists, otherwise inserts a new record.
    /// A failure to schedule is logged only; the next sweep picks the record up.
    pub fn create(
        &self,
        owner_id: UserId,
        report_id: ReportId,
        text: String,
        pictures: Vec<Picture>,
    ) -> Result<ReportId, WorkflowError> {
        let now = Utc::now();

        let record = if self.reports.get(&report_id)?.is_some() {
            self.reports.update(&report_id, &mut |r: &mut ReportRecord| {
                r.submit(&owner_id, text.clone(), pictures.clone(), now)
            })?
        } else {
            let record = ReportRecord::submitted(report_id, owner_id.clone(), text, pictures, now)
                .map_err(StoreError::Rejected)?;
            self.reports.insert(record.clone())?;
            record
        };

        info!(report_id = %report_id, owner = %owner_id, "report submitted");

        let kind = JobKind::report_review(report_id, record.picture_paths());
        if let Err(e) = self.scheduler.schedule(kind, self.grace_delay) {
            error!(report_id = %report_id, error = %e, "failed to schedule review generation");
        }
        Ok(report_id)
    }

    /// Produce and store the review for one report.
    pub fn generate(
        &self,
        report_id: ReportId,
        picture_paths: Vec<PathBuf>,
    ) -> Result<GenerationOutcome, WorkflowError> {
        let report = self
            .reports
            .get(&report_id)?
            .ok_or(WorkflowError::ReportNotFound(report_id))?;
        if report.review().is_some() {
            info!(report_id = %report_id, "report already reviewed, skipping generation");
            return Ok(GenerationOutcome::AlreadyReviewed);
        }

        let owner = report.owner_id().clone();
        let task = task_covering(self.tasks.as_ref(), &owner, report.created_at())?.ok_or_else(
            || WorkflowError::TaskNotFound {
                owner: owner.clone(),
                at: report.created_at(),
            },
        )?;

        let request = CompletionRequest::new(ReviewPrompt::new(&task, &report).render())
            .with_images(picture_paths)
            .with_schema(ReportReview::SCHEMA_NAME, ReportReview::response_schema());
        let ctx = CompletionContext::report(owner);

        match self.client.complete_structured::<ReportReview>(&ctx, &request) {
            Ok(review) => {
                let scores = review.scores;
                self.reports.update(&report_id, &mut |r: &mut ReportRecord| {
                    r.apply_review(review.clone(), Utc::now())
                })?;
                info!(
                    report_id = %report_id,
                    basic = scores.basic,
                    excess = scores.excess,
                    extra = scores.extra,
                    "report reviewed"
                );
                Ok(GenerationOutcome::Reviewed)
            }
            Err(exhausted) => match self.exhausted_policy {
                ExhaustedPolicy::LeaveGenerating => {
                    warn!(
                        report_id = %report_id,
                        attempts = exhausted.attempts,
                        error = %exhausted.last_error,
                        "review generation exhausted, leaving record generating"
                    );
                    Ok(GenerationOutcome::LeftGenerating {
                        attempts: exhausted.attempts,
                    })
                }
                ExhaustedPolicy::MarkFailed => {
                    let reason = exhausted.last_error.to_string();
                    self.reports.update(&report_id, &mut |r: &mut ReportRecord| {
                        r.mark_failed(reason.clone(), exhausted.attempts, Utc::now())
                    })?;
                    warn!(
                        report_id = %report_id,
                        attempts = exhausted.attempts,
                        error = %reason,
                        "review generation exhausted, record marked failed"
                    );
                    Ok(GenerationOutcome::MarkedFailed {
                        attempts: exhausted.attempts,
                    })
                }
            },
        }
    }

    /// Put a submitted record back into generating and schedule a new job.
    ///
    /// If the job cannot be scheduled the record is restored, so a failed
    /// report keeps its failure marker.
    pub fn resubmit(&self, report_id: ReportId, delay: Duration) -> Result<JobId, WorkflowError> {
        let mut previous: Option<ReportRecord> = None;
        let record = self
            .reports
            .update(&report_id, &mut |r: &mut ReportRecord| {
                previous = Some(r.clone());
                r.begin_generation(Utc::now())
            })
            .map_err(|e| match e {
                StoreError::NotFound(_) => WorkflowError::ReportNotFound(report_id),
                other => other.into(),
            })?;

        match self
            .scheduler
            .schedule(JobKind::report_review(report_id, record.picture_paths()), delay)
        {
            Ok(job_id) => Ok(job_id),
            Err(e) => {
                if let Some(previous) = previous {
                    self.restore(report_id, previous);
                }
                Err(WorkflowError::Schedule(e.to_string()))
            }
        }
    }

    /// Put back a record's pre-resubmit state unless something else has written a review since.
    fn restore(&self, report_id: ReportId, previous: ReportRecord) {
        let restored = self.reports.update(&report_id, &mut |r: &mut ReportRecord| {
            if r.review().is_none() {
                *r = previous.clone();
            }
            Ok(())
        });
        if let Err(e) = restored {
            error!(report_id = %report_id, error = %e, "failed to restore report after scheduling error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::testkit::{Kit, REVIEW_JSON, day, owner};
    use officedesk_ai::{CompletionError, CompletionPurpose, ScriptedCompletionService};
    use officedesk_reports::ReportState;

    fn workflow(kit: &Kit, policy: ExhaustedPolicy) -> ReportWorkflow {
        ReportWorkflow::new(
            kit.reports.clone(),
            kit.tasks.clone(),
            kit.client.clone(),
            kit.scheduler.clone(),
        )
        .with_grace_delay(Duration::from_secs(300))
        .with_exhausted_policy(policy)
    }

    fn seed_submitted(kit: &Kit, at: chrono::DateTime<Utc>) -> ReportId {
        let id = ReportId::new();
        let record = ReportRecord::submitted(id, owner(), "wired the pool".into(), vec![], at).unwrap();
        kit.reports.insert(record).unwrap();
        id
    }

    #[test]
    fn create_marks_generating_and_schedules_after_grace_delay() {
        let kit = Kit::new(ScriptedCompletionService::new(), 0);
        let wf = workflow(&kit, ExhaustedPolicy::LeaveGenerating);

        let id = ReportId::new();
        let pictures = vec![Picture {
            url: "https://img.example/a.png".into(),
            local_path: PathBuf::from("/srv/img/a.png"),
        }];
        let returned = wf.create(owner(), id, "did the thing".into(), pictures).unwrap();
        assert_eq!(returned, id);

        let stored = kit.reports.get(&id).unwrap().unwrap();
        assert!(stored.is_generating());
        assert!(stored.review().is_none());

        assert_eq!(
            kit.scheduler.scheduled(),
            vec![(
                JobKind::report_review(id, vec![PathBuf::from("/srv/img/a.png")]),
                Duration::from_secs(300)
            )]
        );
    }

    #[test]
    fn create_fills_an_existing_draft_and_rejects_a_second_submit() {
        let kit = Kit::new(ScriptedCompletionService::new(), 0);
        let wf = workflow(&kit, ExhaustedPolicy::LeaveGenerating);
        let id = ReportId::new();
        kit.reports
            .insert(ReportRecord::draft(id, owner(), Some("write tests".into()), Utc::now()))
            .unwrap();

        wf.create(owner(), id, "tests written".into(), vec![]).unwrap();
        let stored = kit.reports.get(&id).unwrap().unwrap();
        assert_eq!(stored.daily_task(), Some("write tests"));
        assert_eq!(stored.state(), ReportState::Submitted);

        let err = wf.create(owner(), id, "again".into(), vec![]).unwrap_err();
        assert!(matches!(err, WorkflowError::Conflict(_)));
        assert_eq!(kit.scheduler.len(), 1);
    }

    #[test]
    fn schedule_failure_still_returns_the_id() {
        let mut kit = Kit::new(ScriptedCompletionService::new(), 0);
        kit.scheduler = Arc::new(crate::jobs::RecordingScheduler::refusing());
        let wf = workflow(&kit, ExhaustedPolicy::LeaveGenerating);

        let id = ReportId::new();
        assert_eq!(wf.create(owner(), id, "text".into(), vec![]).unwrap(), id);
        assert!(kit.reports.get(&id).unwrap().unwrap().is_generating());
    }

    #[test]
    fn successful_generation_writes_review_and_clears_generating() {
        let kit = Kit::new(ScriptedCompletionService::replying(REVIEW_JSON), 3);
        let wf = workflow(&kit, ExhaustedPolicy::LeaveGenerating);
        kit.add_task(&owner(), day(1, 0), 10);
        let id = seed_submitted(&kit, day(3, 9));

        let outcome = wf.generate(id, vec![]).unwrap();
        assert_eq!(outcome, GenerationOutcome::Reviewed);

        let stored = kit.reports.get(&id).unwrap().unwrap();
        assert!(stored.is_complete());
        assert!(!stored.is_generating());
        assert_eq!(stored.scores().unwrap().basic, 70);

        assert_eq!(kit.service.calls(), 1);
        let prompt = &kit.service.requests()[0];
        assert!(prompt.text.contains("wired the pool"));
        assert!(prompt.text.contains("Elapsed: 2 days"));
        assert_eq!(prompt.schema.as_ref().unwrap().name, ReportReview::SCHEMA_NAME);
        assert_eq!(kit.log.entries()[0].purpose, CompletionPurpose::Report);
    }

    #[test]
    fn exhausted_generation_leaves_record_generating_by_default() {
        let kit = Kit::new(
            ScriptedCompletionService::failing(CompletionError::Transport("down".into())),
            3,
        );
        let wf = workflow(&kit, ExhaustedPolicy::LeaveGenerating);
        kit.add_task(&owner(), day(1, 0), 10);
        let id = seed_submitted(&kit, day(3, 9));

        let outcome = wf.generate(id, vec![]).unwrap();
        assert_eq!(outcome, GenerationOutcome::LeftGenerating { attempts: 4 });

        let stored = kit.reports.get(&id).unwrap().unwrap();
        assert!(stored.is_generating());
        assert!(stored.review().is_none());
        assert_eq!(kit.log.len(), 4);
        assert_eq!(kit.service.calls(), 4);
    }

    #[test]
    fn mark_failed_policy_records_failure_and_resubmit_recovers() {
        let kit = Kit::new(ScriptedCompletionService::new(), 1);
        kit.service.push_ok("not json");
        kit.service.push_ok("still not json");
        kit.service.push_ok(REVIEW_JSON);
        let wf = workflow(&kit, ExhaustedPolicy::MarkFailed);
        kit.add_task(&owner(), day(1, 0), 10);
        let id = seed_submitted(&kit, day(3, 9));

        let outcome = wf.generate(id, vec![]).unwrap();
        assert_eq!(outcome, GenerationOutcome::MarkedFailed { attempts: 2 });
        let stored = kit.reports.get(&id).unwrap().unwrap();
        assert_eq!(stored.state(), ReportState::Failed);
        assert_eq!(stored.failure().unwrap().attempts, 2);

        wf.resubmit(id, Duration::from_secs(60)).unwrap();
        assert!(kit.reports.get(&id).unwrap().unwrap().is_generating());

        assert_eq!(wf.generate(id, vec![]).unwrap(), GenerationOutcome::Reviewed);
        assert!(kit.reports.get(&id).unwrap().unwrap().is_complete());
    }

    #[test]
    fn missing_report_or_task_is_not_found() {
        let kit = Kit::new(ScriptedCompletionService::replying(REVIEW_JSON), 0);
        let wf = workflow(&kit, ExhaustedPolicy::LeaveGenerating);

        assert!(matches!(
            wf.generate(ReportId::new(), vec![]),
            Err(WorkflowError::ReportNotFound(_))
        ));

        // Task window ends before the report was written.
        kit.add_task(&owner(), day(1, 0), 1);
        let id = seed_submitted(&kit, day(3, 9));
        assert!(matches!(
            wf.generate(id, vec![]),
            Err(WorkflowError::TaskNotFound { .. })
        ));
        assert_eq!(kit.service.calls(), 0);
    }

    #[test]
    fn already_reviewed_report_is_not_regenerated() {
        let kit = Kit::new(ScriptedCompletionService::replying(REVIEW_JSON), 0);
        let wf = workflow(&kit, ExhaustedPolicy::LeaveGenerating);
        kit.add_task(&owner(), day(1, 0), 10);
        let id = seed_submitted(&kit, day(3, 9));

        wf.generate(id, vec![]).unwrap();
        assert_eq!(wf.generate(id, vec![]).unwrap(), GenerationOutcome::AlreadyReviewed);
        assert_eq!(kit.service.calls(), 1);
    }

    #[test]
    fn latest_starting_task_wins_when_windows_overlap() {
        let kit = Kit::new(ScriptedCompletionService::replying(REVIEW_JSON), 0);
        let wf = workflow(&kit, ExhaustedPolicy::LeaveGenerating);
        kit.add_task(&owner(), day(1, 0), 20);
        let newer = kit.add_task(&owner(), day(2, 0), 5);
        let id = seed_submitted(&kit, day(3, 9));

        wf.generate(id, vec![]).unwrap();
        let prompt = &kit.service.requests()[0].text;
        let expected = format!("Task length: {} days", newer.schedule_at(day(3, 9)).total_days);
        assert!(prompt.contains(&expected));
    }

    #[test]
    fn resubmit_of_draft_is_a_conflict() {
        let kit = Kit::new(ScriptedCompletionService::new(), 0);
        let wf = workflow(&kit, ExhaustedPolicy::LeaveGenerating);
        let id = ReportId::new();
        kit.reports
            .insert(ReportRecord::draft(id, owner(), None, Utc::now()))
            .unwrap();

        assert!(matches!(
            wf.resubmit(id, Duration::ZERO),
            Err(WorkflowError::Conflict(_))
        ));
        assert!(kit.scheduler.is_empty());
    }
}
