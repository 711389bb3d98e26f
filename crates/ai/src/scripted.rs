use std::collections::VecDeque;
use std::sync::Mutex;

use crate::completion::{CompletionError, CompletionRequest, CompletionService};

/// Completion service that replays scripted replies, for tests/dev.
///
/// Queued replies are served first; once the queue is empty the fallback
/// reply (if any) is returned for every further call.
#[derive(Debug, Default)]
pub struct ScriptedCompletionService {
    script: Mutex<VecDeque<Result<String, CompletionError>>>,
    fallback: Option<Result<String, CompletionError>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer with `reply`.
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            fallback: Some(Ok(reply.into())),
            ..Self::default()
        }
    }

    /// Always fail with `error`.
    pub fn failing(error: CompletionError) -> Self {
        Self {
            fallback: Some(Err(error)),
            ..Self::default()
        }
    }

    pub fn push_ok(&self, reply: impl Into<String>) {
        self.push(Ok(reply.into()));
    }

    pub fn push_err(&self, error: CompletionError) {
        self.push(Err(error));
    }

    fn push(&self, reply: Result<String, CompletionError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(reply);
        }
    }

    /// Number of calls received so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl CompletionService for ScriptedCompletionService {
    fn request(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next.or_else(|| self.fallback.clone()) {
            Some(reply) => reply,
            None => Err(CompletionError::Transport("no scripted reply left".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_then_fallback() {
        let service = ScriptedCompletionService::replying("default");
        service.push_ok("first");

        let req = CompletionRequest::new("q");
        assert_eq!(service.request(&req).unwrap(), "first");
        assert_eq!(service.request(&req).unwrap(), "default");
        assert_eq!(service.request(&req).unwrap(), "default");
        assert_eq!(service.calls(), 3);
    }

    #[test]
    fn empty_script_without_fallback_is_a_transport_error() {
        let service = ScriptedCompletionService::new();
        assert!(matches!(
            service.request(&CompletionRequest::new("q")),
            Err(CompletionError::Transport(_))
        ));
    }
}
