//! Structured payloads returned by the completion service.
//!
//! Both payloads validate while deserializing (`serde(try_from)`), so a reply
//! that parses as JSON but breaks a rule is rejected the same way as malformed
//! JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;

/// Per-category review scores.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryScores {
    /// Completion of the assigned daily task.
    pub basic: u8,
    /// Work beyond the assigned task.
    pub excess: u8,
    /// Extra credit (initiative, quality of write-up).
    pub extra: u8,
}

impl CategoryScores {
    pub const MAX: u8 = 100;

    pub fn total(&self) -> u16 {
        u16::from(self.basic) + u16::from(self.excess) + u16::from(self.extra)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("field `{0}` must not be empty")]
    EmptyField(&'static str),

    #[error("score `{category}` = {value} is outside 0..={max}")]
    ScoreOutOfRange {
        category: &'static str,
        value: i64,
        max: u8,
    },
}

/// Review of one daily report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawReportReview", into = "RawReportReview")]
pub struct ReportReview {
    pub evaluation: String,
    pub strengths: Vec<String>,
    pub suggestions: Vec<String>,
    pub scores: CategoryScores,
}

/// Wire shape of [`ReportReview`] (flat, as requested from the service).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawReportReview {
    evaluation: String,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    suggestions: Vec<String>,
    basic_score: i64,
    excess_score: i64,
    extra_score: i64,
}

fn score(category: &'static str, value: i64) -> Result<u8, PayloadError> {
    u8::try_from(value)
        .ok()
        .filter(|v| *v <= CategoryScores::MAX)
        .ok_or(PayloadError::ScoreOutOfRange {
            category,
            value,
            max: CategoryScores::MAX,
        })
}

impl TryFrom<RawReportReview> for ReportReview {
    type Error = PayloadError;

    fn try_from(raw: RawReportReview) -> Result<Self, Self::Error> {
        if raw.evaluation.trim().is_empty() {
            return Err(PayloadError::EmptyField("evaluation"));
        }
        Ok(Self {
            evaluation: raw.evaluation,
            strengths: raw.strengths,
            suggestions: raw.suggestions,
            scores: CategoryScores {
                basic: score("basic_score", raw.basic_score)?,
                excess: score("excess_score", raw.excess_score)?,
                extra: score("extra_score", raw.extra_score)?,
            },
        })
    }
}

impl From<ReportReview> for RawReportReview {
    fn from(review: ReportReview) -> Self {
        Self {
            evaluation: review.evaluation,
            strengths: review.strengths,
            suggestions: review.suggestions,
            basic_score: i64::from(review.scores.basic),
            excess_score: i64::from(review.scores.excess),
            extra_score: i64::from(review.scores.extra),
        }
    }
}

impl ReportReview {
    pub const SCHEMA_NAME: &'static str = "daily_report_review";

    /// JSON schema sent with review requests.
    pub fn response_schema() -> JsonValue {
        let score = json!({ "type": "integer", "minimum": 0, "maximum": CategoryScores::MAX });
        json!({
            "type": "object",
            "properties": {
                "evaluation": { "type": "string" },
                "strengths": { "type": "array", "items": { "type": "string" } },
                "suggestions": { "type": "array", "items": { "type": "string" } },
                "basic_score": score,
                "excess_score": score,
                "extra_score": score,
            },
            "required": [
                "evaluation", "strengths", "suggestions",
                "basic_score", "excess_score", "extra_score"
            ],
            "additionalProperties": false,
        })
    }
}

/// Progress assessment of a period task plus the next day's assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTaskProgress")]
pub struct TaskProgress {
    pub completion_status: String,
    pub next_task: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawTaskProgress {
    completion_status: String,
    next_task: String,
}

impl TryFrom<RawTaskProgress> for TaskProgress {
    type Error = PayloadError;

    fn try_from(raw: RawTaskProgress) -> Result<Self, Self::Error> {
        if raw.completion_status.trim().is_empty() {
            return Err(PayloadError::EmptyField("completion_status"));
        }
        if raw.next_task.trim().is_empty() {
            return Err(PayloadError::EmptyField("next_task"));
        }
        Ok(Self {
            completion_status: raw.completion_status,
            next_task: raw.next_task,
        })
    }
}

impl TaskProgress {
    pub const SCHEMA_NAME: &'static str = "task_progress";

    pub fn response_schema() -> JsonValue {
        json!({
            "type": "object",
            "properties": {
                "completion_status": { "type": "string" },
                "next_task": { "type": "string" },
            },
            "required": ["completion_status", "next_task"],
            "additionalProperties": false,
        })
    }
}
