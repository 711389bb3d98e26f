//! Append-only audit trail of completion attempts.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use officedesk_core::UserId;

/// What a completion was requested for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPurpose {
    Report,
    Task,
}

/// One attempt against the completion service. Never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionLogEntry {
    pub id: Uuid,
    pub requester: UserId,
    pub purpose: CompletionPurpose,
    /// 1-indexed attempt within one completion call.
    pub attempt: u32,
    pub request: JsonValue,
    pub response: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum CompletionLogError {
    #[error("completion log storage error: {0}")]
    Storage(String),
}

pub trait CompletionLog: Send + Sync {
    fn append(&self, entry: CompletionLogEntry) -> Result<(), CompletionLogError>;
}

impl<L> CompletionLog for Arc<L>
where
    L: CompletionLog + ?Sized,
{
    fn append(&self, entry: CompletionLogEntry) -> Result<(), CompletionLogError> {
        (**self).append(entry)
    }
}

/// In-memory completion log for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCompletionLog {
    entries: RwLock<Vec<CompletionLogEntry>>,
}

impl InMemoryCompletionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<CompletionLogEntry> {
        self.entries.read().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CompletionLog for InMemoryCompletionLog {
    fn append(&self, entry: CompletionLogEntry) -> Result<(), CompletionLogError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| CompletionLogError::Storage("lock poisoned".to_string()))?;
        entries.push(entry);
        Ok(())
    }
}
