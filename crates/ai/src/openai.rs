//! OpenAI-compatible chat completion service (blocking HTTP).

use std::path::Path;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::completion::{CompletionError, CompletionRequest, CompletionService};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiConfig {
    pub api_key: String,
    /// Base URL up to and including the API version, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-2024-08-06".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

// ── OpenAI-compatible request/response ──

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize, PartialEq)]
struct ImageUrl {
    url: String,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    schema: &'a JsonValue,
    strict: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Completion service backed by an OpenAI-compatible `/chat/completions` endpoint.
///
/// Builds a blocking client; construct and drop it outside any async runtime.
pub struct OpenAiCompletionService {
    config: OpenAiConfig,
    client: reqwest::blocking::Client,
}

impl OpenAiCompletionService {
    pub fn new(config: OpenAiConfig) -> Result<Self, CompletionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CompletionError::Transport(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

impl CompletionService for OpenAiCompletionService {
    fn request(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: content_parts(request),
            }],
            response_format: request.schema.as_ref().map(|s| ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: &s.name,
                    schema: &s.schema,
                    strict: true,
                },
            }),
        };

        let res = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body: res.text().unwrap_or_default(),
            });
        }

        let parsed: ChatResponse = res
            .json()
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        debug!(model = %self.config.model, bytes = content.len(), "chat completion received");
        if content.trim().is_empty() {
            return Err(CompletionError::EmptyResponse);
        }
        Ok(content)
    }
}

fn content_parts(request: &CompletionRequest) -> Vec<ContentPart> {
    let mut parts = vec![ContentPart::Text {
        text: request.text.clone(),
    }];
    for path in &request.images {
        match image_data_url(path) {
            Ok(url) => parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl { url },
            }),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable image"),
        }
    }
    parts
}

fn image_data_url(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(format!(
        "data:{};base64,{}",
        mime_for(path),
        STANDARD.encode(bytes)
    ))
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn mime_follows_extension() {
        assert_eq!(mime_for(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_for(Path::new("a.webp")), "image/webp");
        assert_eq!(mime_for(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("noext")), "image/jpeg");
    }

    #[test]
    fn readable_images_become_data_urls_and_missing_ones_are_skipped() {
        let dir = std::env::temp_dir().join(format!("officedesk-ai-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let img = dir.join("shot.png");
        std::fs::write(&img, b"abc").unwrap();

        let req = CompletionRequest::new("describe")
            .with_images(vec![img.clone(), PathBuf::from("/definitely/missing.png")]);
        let parts = content_parts(&req);

        assert_eq!(parts.len(), 2);
        assert_eq!(
            parts[1],
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: "data:image/png;base64,YWJj".into()
                }
            }
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn request_body_carries_json_schema_format() {
        let schema = json!({"type": "object"});
        let body = ChatRequest {
            model: "m",
            messages: vec![ChatMessage {
                role: "user",
                content: vec![ContentPart::Text { text: "hi".into() }],
            }],
            response_format: Some(ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: "verdict",
                    schema: &schema,
                    strict: true,
                },
            }),
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["messages"][0]["content"][0]["type"], "text");
        assert_eq!(value["response_format"]["type"], "json_schema");
        assert_eq!(value["response_format"]["json_schema"]["name"], "verdict");
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let service = OpenAiCompletionService::new(OpenAiConfig {
            base_url: "http://localhost:9/v1/".into(),
            ..OpenAiConfig::default()
        })
        .unwrap();
        assert_eq!(service.endpoint(), "http://localhost:9/v1/chat/completions");
    }

    #[test]
    fn unreachable_endpoint_is_a_transport_error() {
        let service = OpenAiCompletionService::new(OpenAiConfig {
            base_url: "http://127.0.0.1:9/v1".into(),
            timeout: Duration::from_secs(2),
            ..OpenAiConfig::default()
        })
        .unwrap();
        assert!(matches!(
            service.request(&CompletionRequest::new("hi")),
            Err(CompletionError::Transport(_))
        ));
    }
}
