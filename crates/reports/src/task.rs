use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use officedesk_core::{DomainError, DomainResult, Entity, TaskId, UserId, elapsed_days};

/// Input for creating a period task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPeriodTask {
    pub id: TaskId,
    pub assigner_id: UserId,
    pub assignee_id: UserId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub basic_requirements: String,
    pub detail_requirements: String,
}

/// A multi-day assignment for one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodTask {
    id: TaskId,
    assigner_id: UserId,
    assignee_id: UserId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    basic_requirements: String,
    detail_requirements: String,
    completed_description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Day counts of a task relative to some instant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSchedule {
    pub total_days: i64,
    pub elapsed_days: i64,
    pub remaining_days: i64,
}

impl Entity for PeriodTask {
    type Id = TaskId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl PeriodTask {
    pub fn new(input: NewPeriodTask, now: DateTime<Utc>) -> DomainResult<Self> {
        if input.end <= input.start {
            return Err(DomainError::validation("task end must be after its start"));
        }
        if input.basic_requirements.trim().is_empty() {
            return Err(DomainError::validation("basic requirements cannot be empty"));
        }
        if input.detail_requirements.trim().is_empty() {
            return Err(DomainError::validation("detail requirements cannot be empty"));
        }

        Ok(Self {
            id: input.id,
            assigner_id: input.assigner_id,
            assignee_id: input.assignee_id,
            start: input.start,
            end: input.end,
            basic_requirements: input.basic_requirements,
            detail_requirements: input.detail_requirements,
            completed_description: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id_typed(&self) -> TaskId {
        self.id
    }

    pub fn assigner_id(&self) -> &UserId {
        &self.assigner_id
    }

    pub fn assignee_id(&self) -> &UserId {
        &self.assignee_id
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn basic_requirements(&self) -> &str {
        &self.basic_requirements
    }

    pub fn detail_requirements(&self) -> &str {
        &self.detail_requirements
    }

    pub fn completed_description(&self) -> Option<&str> {
        self.completed_description.as_deref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether `at` falls inside the assignment window (both ends inclusive).
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }

    /// Not finished yet at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.end >= now
    }

    /// Day counts as seen from `at`, clamped to the task window.
    pub fn schedule_at(&self, at: DateTime<Utc>) -> TaskSchedule {
        let total_days = elapsed_days(self.start, self.end);
        let elapsed = elapsed_days(self.start, at).clamp(0, total_days);
        let remaining = elapsed_days(at, self.end).clamp(0, total_days);
        TaskSchedule {
            total_days,
            elapsed_days: elapsed,
            remaining_days: remaining,
        }
    }

    /// Replace the accumulated completion description.
    pub fn record_progress(&mut self, completed_description: String, now: DateTime<Utc>) {
        self.completed_description = Some(completed_description);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn task(start: DateTime<Utc>, days: i64) -> PeriodTask {
        PeriodTask::new(
            NewPeriodTask {
                id: TaskId::new(),
                assigner_id: UserId::new("lead").unwrap(),
                assignee_id: UserId::new("e1001").unwrap(),
                start,
                end: start + Duration::days(days),
                basic_requirements: "ship the report module".into(),
                detail_requirements: "endpoints, tests, docs".into(),
            },
            start,
        )
        .unwrap()
    }

    #[test]
    fn schedule_counts_whole_days() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let t = task(start, 10);

        let s = t.schedule_at(start + Duration::days(3) + Duration::hours(5));
        assert_eq!(s.total_days, 10);
        assert_eq!(s.elapsed_days, 3);
        assert_eq!(s.remaining_days, 6);
    }

    #[test]
    fn schedule_is_clamped_outside_the_window() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let t = task(start, 5);

        let before = t.schedule_at(start - Duration::days(2));
        assert_eq!((before.elapsed_days, before.remaining_days), (0, 5));

        let after = t.schedule_at(start + Duration::days(9));
        assert_eq!((after.elapsed_days, after.remaining_days), (5, 0));
    }

    #[test]
    fn covers_is_inclusive_and_activity_follows_end() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let t = task(start, 5);

        assert!(t.covers(start));
        assert!(t.covers(t.end()));
        assert!(!t.covers(t.end() + Duration::seconds(1)));
        assert!(t.is_active(t.end()));
        assert!(!t.is_active(t.end() + Duration::seconds(1)));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let start = Utc::now();
        let err = PeriodTask::new(
            NewPeriodTask {
                id: TaskId::new(),
                assigner_id: UserId::new("lead").unwrap(),
                assignee_id: UserId::new("e1001").unwrap(),
                start,
                end: start,
                basic_requirements: "a".into(),
                detail_requirements: "b".into(),
            },
            start,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn record_progress_replaces_description() {
        let start = Utc::now();
        let mut t = task(start, 3);
        t.record_progress("API done".into(), start + Duration::days(1));
        t.record_progress("API and tests done".into(), start + Duration::days(2));
        assert_eq!(t.completed_description(), Some("API and tests done"));
        assert_eq!(t.updated_at(), start + Duration::days(2));
    }
}
