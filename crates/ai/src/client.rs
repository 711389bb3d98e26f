//! Bounded-retry wrapper around a [`CompletionService`].

use std::sync::Arc;
use std::thread;

use chrono::Utc;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use officedesk_core::UserId;

use crate::completion::{CompletionError, CompletionRequest, CompletionService};
use crate::log::{CompletionLog, CompletionLogEntry, CompletionPurpose};
use crate::retry::RetryPolicy;

/// Who asks, and for what; copied into every log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionContext {
    pub requester: UserId,
    pub purpose: CompletionPurpose,
}

impl CompletionContext {
    pub fn report(requester: UserId) -> Self {
        Self {
            requester,
            purpose: CompletionPurpose::Report,
        }
    }

    pub fn task(requester: UserId) -> Self {
        Self {
            requester,
            purpose: CompletionPurpose::Task,
        }
    }
}

/// Every attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("completion gave up after {attempts} attempt(s): {last_error}")]
pub struct CompletionExhausted {
    pub attempts: u32,
    pub last_error: CompletionError,
}

/// Retrying completion client.
///
/// Makes at most `1 + policy.max_retries` calls. Transport failures, empty
/// replies and (for structured calls) replies that do not parse are retried.
/// Each attempt is appended to the completion log before the next one starts.
#[derive(Clone)]
pub struct CompletionClient {
    service: Arc<dyn CompletionService>,
    log: Arc<dyn CompletionLog>,
    policy: RetryPolicy,
}

impl CompletionClient {
    pub fn new(
        service: Arc<dyn CompletionService>,
        log: Arc<dyn CompletionLog>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            service,
            log,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Raw completion text; a blank reply counts as a failed attempt.
    ///
    /// When the request carries a schema the reply must at least be valid
    /// JSON; otherwise it counts as a failed attempt too.
    pub fn complete_text(
        &self,
        ctx: &CompletionContext,
        request: &CompletionRequest,
    ) -> Result<String, CompletionExhausted> {
        let expects_json = request.schema.is_some();
        self.complete_with(ctx, request, |raw| {
            if expects_json {
                serde_json::from_str::<serde_json::Value>(raw)
                    .map_err(|e| CompletionError::Malformed(e.to_string()))?;
            }
            Ok(raw.to_string())
        })
    }

    /// Completion parsed into `T`; a reply that does not deserialize counts as a failed attempt.
    pub fn complete_structured<T: DeserializeOwned>(
        &self,
        ctx: &CompletionContext,
        request: &CompletionRequest,
    ) -> Result<T, CompletionExhausted> {
        self.complete_with(ctx, request, |raw| {
            serde_json::from_str(raw).map_err(|e| CompletionError::Malformed(e.to_string()))
        })
    }

    fn complete_with<T>(
        &self,
        ctx: &CompletionContext,
        request: &CompletionRequest,
        parse: impl Fn(&str) -> Result<T, CompletionError>,
    ) -> Result<T, CompletionExhausted> {
        let max_attempts = self.policy.max_attempts();
        let audit = request.audit_payload();
        let mut attempt = 0;
        let mut last_error = CompletionError::EmptyResponse;

        while attempt < max_attempts {
            attempt += 1;
            let delay = self.policy.delay_before(attempt);
            if !delay.is_zero() {
                thread::sleep(delay);
            }

            let raw = self.service.request(request);
            let outcome = raw
                .as_deref()
                .map_err(Clone::clone)
                .and_then(|text| {
                    if text.trim().is_empty() {
                        Err(CompletionError::EmptyResponse)
                    } else {
                        parse(text)
                    }
                });

            self.record(ctx, attempt, &audit, &raw, outcome.as_ref().err());

            match outcome {
                Ok(value) => {
                    debug!(
                        purpose = ?ctx.purpose,
                        requester = %ctx.requester,
                        attempt,
                        "completion succeeded"
                    );
                    return Ok(value);
                }
                Err(error) => {
                    warn!(
                        purpose = ?ctx.purpose,
                        requester = %ctx.requester,
                        attempt,
                        max_attempts,
                        error = %error,
                        "completion attempt failed"
                    );
                    last_error = error;
                }
            }
        }

        info!(
            purpose = ?ctx.purpose,
            requester = %ctx.requester,
            attempts = attempt,
            "completion retries exhausted"
        );
        Err(CompletionExhausted {
            attempts: attempt,
            last_error,
        })
    }

    fn record(
        &self,
        ctx: &CompletionContext,
        attempt: u32,
        audit: &serde_json::Value,
        raw: &Result<String, CompletionError>,
        error: Option<&CompletionError>,
    ) {
        let entry = CompletionLogEntry {
            id: Uuid::now_v7(),
            requester: ctx.requester.clone(),
            purpose: ctx.purpose,
            attempt,
            request: audit.clone(),
            response: raw.as_ref().ok().cloned(),
            error: error.map(ToString::to_string),
            created_at: Utc::now(),
        };
        if let Err(e) = self.log.append(entry) {
            warn!(attempt, error = %e, "failed to append completion log entry");
        }
    }
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
