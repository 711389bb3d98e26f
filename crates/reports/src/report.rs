use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use officedesk_core::{DomainError, DomainResult, Entity, ReportId, UserId};

use crate::review::{CategoryScores, ReportReview};

/// Seconds a record may stay generating before the sweep reports it stuck.
pub const STUCK_AFTER_SECS: i64 = 86_400;

/// An uploaded picture: public URL plus where the image server stored it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Picture {
    pub url: String,
    pub local_path: PathBuf,
}

/// Why the last generation attempt gave up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationFailure {
    pub reason: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

/// Lifecycle state, derived from the stored fields.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportState {
    /// Created (usually carrying the day's task) but not submitted yet.
    Draft,
    /// Submitted; a review is being generated.
    Submitted,
    /// Review written.
    Reviewed,
    /// Generation gave up; waiting for the sweep to re-drive it.
    Failed,
}

/// Daily report.
///
/// Invariants (checked by [`ReportRecord::check_invariants`]):
/// - `generating` and `review` are never both set;
/// - a failure marker implies neither `generating` nor `review`;
/// - only submitted records generate or carry a review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    id: ReportId,
    owner_id: UserId,
    daily_task: Option<String>,
    text: Option<String>,
    pictures: Vec<Picture>,
    review: Option<ReportReview>,
    generating: bool,
    failure: Option<GenerationFailure>,
    submitted_at: Option<DateTime<Utc>>,
    generation_started_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Entity for ReportRecord {
    type Id = ReportId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl ReportRecord {
    /// New draft holding the day's assignment for `owner_id`.
    pub fn draft(
        id: ReportId,
        owner_id: UserId,
        daily_task: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            daily_task,
            text: None,
            pictures: Vec::new(),
            review: None,
            generating: false,
            failure: None,
            submitted_at: None,
            generation_started_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// New record submitted directly (no draft existed).
    pub fn submitted(
        id: ReportId,
        owner_id: UserId,
        text: String,
        pictures: Vec<Picture>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let mut record = Self::draft(id, owner_id.clone(), None, now);
        record.submit(&owner_id, text, pictures, now)?;
        Ok(record)
    }

    pub fn id_typed(&self) -> ReportId {
        self.id
    }

    pub fn owner_id(&self) -> &UserId {
        &self.owner_id
    }

    pub fn daily_task(&self) -> Option<&str> {
        self.daily_task.as_deref()
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn pictures(&self) -> &[Picture] {
        &self.pictures
    }

    pub fn picture_paths(&self) -> Vec<PathBuf> {
        self.pictures.iter().map(|p| p.local_path.clone()).collect()
    }

    pub fn review(&self) -> Option<&ReportReview> {
        self.review.as_ref()
    }

    pub fn scores(&self) -> Option<CategoryScores> {
        self.review.as_ref().map(|r| r.scores)
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn failure(&self) -> Option<&GenerationFailure> {
        self.failure.as_ref()
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn state(&self) -> ReportState {
        if self.review.is_some() {
            ReportState::Reviewed
        } else if self.generating {
            ReportState::Submitted
        } else if self.submitted_at.is_none() {
            ReportState::Draft
        } else {
            ReportState::Failed
        }
    }

    /// Reviewed and no longer generating.
    pub fn is_complete(&self) -> bool {
        self.review.is_some() && !self.generating
    }

    /// Submitted but without a review (in flight, failed, or stuck).
    pub fn awaits_review(&self) -> bool {
        self.submitted_at.is_some() && self.review.is_none()
    }

    /// Generating for longer than [`STUCK_AFTER_SECS`].
    pub fn is_stuck(&self, now: DateTime<Utc>) -> bool {
        match (self.generating, self.generation_started_at) {
            (true, Some(started)) => now - started > Duration::seconds(STUCK_AFTER_SECS),
            _ => false,
        }
    }

    /// Fill in the submitted content and start generating.
    ///
    /// The record's creation time becomes the submission time: the sweep
    /// window, the task lookup and the review prompt all key on it.
    pub fn submit(
        &mut self,
        owner_id: &UserId,
        text: String,
        pictures: Vec<Picture>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if &self.owner_id != owner_id {
            return Err(DomainError::conflict("report belongs to another member"));
        }
        if self.state() != ReportState::Draft {
            return Err(DomainError::conflict(format!(
                "report {} was already submitted",
                self.id
            )));
        }
        if text.trim().is_empty() {
            return Err(DomainError::validation("report text cannot be empty"));
        }

        self.text = Some(text);
        self.pictures = pictures;
        self.submitted_at = Some(now);
        self.created_at = now;
        self.start_generating(now);
        Ok(())
    }

    /// Re-enter the generating window (re-drive after a failure or a lost job).
    pub fn begin_generation(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        match self.state() {
            ReportState::Draft => Err(DomainError::conflict(format!(
                "report {} has not been submitted",
                self.id
            ))),
            ReportState::Reviewed => Err(DomainError::conflict(format!(
                "report {} is already reviewed",
                self.id
            ))),
            ReportState::Submitted | ReportState::Failed => {
                self.start_generating(now);
                Ok(())
            }
        }
    }

    /// Write the review and leave the generating window in one step.
    pub fn apply_review(&mut self, review: ReportReview, now: DateTime<Utc>) -> DomainResult<()> {
        match self.state() {
            ReportState::Submitted | ReportState::Failed => {
                self.review = Some(review);
                self.generating = false;
                self.failure = None;
                self.generation_started_at = None;
                self.updated_at = now;
                Ok(())
            }
            ReportState::Reviewed => Err(DomainError::conflict(format!(
                "report {} is already reviewed",
                self.id
            ))),
            ReportState::Draft => Err(DomainError::conflict(format!(
                "report {} has not been submitted",
                self.id
            ))),
        }
    }

    /// Leave the generating window without a review.
    pub fn mark_failed(
        &mut self,
        reason: impl Into<String>,
        attempts: u32,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if self.state() != ReportState::Submitted {
            return Err(DomainError::conflict(format!(
                "report {} is not generating",
                self.id
            )));
        }
        self.generating = false;
        self.generation_started_at = None;
        self.failure = Some(GenerationFailure {
            reason: reason.into(),
            attempts,
            failed_at: now,
        });
        self.updated_at = now;
        Ok(())
    }

    pub fn check_invariants(&self) -> DomainResult<()> {
        if self.generating && self.review.is_some() {
            return Err(DomainError::invariant("generating record carries a review"));
        }
        if self.failure.is_some() && (self.generating || self.review.is_some()) {
            return Err(DomainError::invariant(
                "failed record is generating or reviewed",
            ));
        }
        if self.submitted_at.is_none() && (self.generating || self.review.is_some()) {
            return Err(DomainError::invariant("draft record is generating or reviewed"));
        }
        Ok(())
    }

    fn start_generating(&mut self, now: DateTime<Utc>) {
        self.generating = true;
        self.failure = None;
        self.generation_started_at = Some(now);
        self.updated_at = now;
    }
}
