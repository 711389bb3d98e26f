use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;

/// JSON schema the reply must follow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: JsonValue,
}

/// One prompt sent to the completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub text: String,
    /// Local image files attached to the prompt.
    pub images: Vec<PathBuf>,
    pub schema: Option<ResponseSchema>,
}

impl CompletionRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            images: Vec::new(),
            schema: None,
        }
    }

    pub fn with_images(mut self, images: Vec<PathBuf>) -> Self {
        self.images = images;
        self
    }

    pub fn with_schema(mut self, name: impl Into<String>, schema: JsonValue) -> Self {
        self.schema = Some(ResponseSchema {
            name: name.into(),
            schema,
        });
        self
    }

    /// Compact form written to the completion log (image bytes are not logged).
    pub fn audit_payload(&self) -> JsonValue {
        json!({
            "text": self.text,
            "images": self.images,
            "schema": self.schema.as_ref().map(|s| &s.name),
        })
    }
}

/// A single failed call to the completion service.
///
/// Every variant is treated as transient by [`crate::CompletionClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("service returned an empty response")]
    EmptyResponse,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// External text/vision completion service.
///
/// Calls block the current thread; only pool workers invoke it.
pub trait CompletionService: Send + Sync {
    fn request(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

impl<S> CompletionService for Arc<S>
where
    S: CompletionService + ?Sized,
{
    fn request(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        (**self).request(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_payload_names_schema_but_not_its_body() {
        let req = CompletionRequest::new("review this")
            .with_images(vec![PathBuf::from("/srv/pics/a.png")])
            .with_schema("daily_report_review", json!({"type": "object"}));

        let payload = req.audit_payload();
        assert_eq!(payload["text"], "review this");
        assert_eq!(payload["images"][0], "/srv/pics/a.png");
        assert_eq!(payload["schema"], "daily_report_review");
    }

    #[test]
    fn plain_request_has_null_schema_in_audit() {
        let payload = CompletionRequest::new("hi").audit_payload();
        assert!(payload["schema"].is_null());
        assert_eq!(payload["images"].as_array().map(Vec::len), Some(0));
    }
}
