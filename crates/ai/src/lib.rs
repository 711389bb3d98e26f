//! `officedesk-ai`
//!
//! **Responsibility:** boundary to the external text/vision completion service.
//!
//! This crate is intentionally **not** part of the domain model:
//! - It must not depend on report/task records.
//! - It must not mutate domain state.
//! - It returns raw or structured payloads; callers decide what to write.

pub mod client;
pub mod completion;
pub mod log;
pub mod openai;
pub mod retry;
pub mod scripted;

pub use client::{CompletionClient, CompletionContext, CompletionExhausted};
pub use completion::{CompletionError, CompletionRequest, CompletionService, ResponseSchema};
pub use log::{
    CompletionLog, CompletionLogEntry, CompletionLogError, CompletionPurpose, InMemoryCompletionLog,
};
pub use openai::{OpenAiCompletionService, OpenAiConfig};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use scripted::ScriptedCompletionService;
