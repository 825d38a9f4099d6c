//! Conversational model collaborator.
//!
//! The controller only knows [`ModelClient::respond`]: give it the working
//! transcript, get the next assistant utterance back. Vendor specifics stay
//! behind the trait. [`OpenAiCompatClient`] speaks the chat-completions
//! dialect shared by most hosted endpoints (OpenAI, DashScope, DeepSeek,
//! OpenRouter).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::error::TransportError;
use crate::transcript::{Role, Turn};

/// One completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    /// Visible answer. `None` when the endpoint returned no content.
    pub text: Option<String>,
    /// Reasoning trace, when the endpoint exposes one.
    pub thinking: Option<String>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            thinking: None,
        }
    }

    pub fn with_thinking(mut self, thinking: impl Into<String>) -> Self {
        self.thinking = Some(thinking.into());
        self
    }
}

/// Produces the next assistant turn for a transcript.
///
/// Implementations must not retry on transport failure; the error is
/// propagated to the host unchanged.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn respond(&self, transcript: &[Turn]) -> Result<ModelReply, TransportError>;
}

// ---------------------------------------------------------------------------
// OpenAI-compatible HTTP client
// ---------------------------------------------------------------------------

/// Configuration for [`OpenAiCompatClient`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Base URL up to and including the version segment, e.g.
    /// `https://api.openai.com/v1`.
    pub base_url: String,

    /// Model identifier sent to the endpoint.
    pub model: String,

    /// Bearer token.
    #[serde(default, skip_serializing)]
    pub api_key: String,

    pub temperature: f32,

    pub max_tokens: u32,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key: String::new(),
            temperature: 0.0,
            max_tokens: 500,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

/// Chat-completions client over `reqwest`.
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl OpenAiCompatClient {
    pub fn new(config: ClientConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

fn wire_role(role: Role) -> Option<&'static str> {
    match role {
        Role::System => Some("system"),
        Role::User => Some("user"),
        Role::Assistant => Some("assistant"),
        Role::Thinking => None,
    }
}

/// Convert a working transcript into chat messages, dropping thinking turns.
fn to_messages(transcript: &[Turn]) -> Vec<ChatMessage<'_>> {
    transcript
        .iter()
        .filter_map(|turn| {
            wire_role(turn.role).map(|role| ChatMessage {
                role,
                content: &turn.content,
            })
        })
        .collect()
}

fn parse_reply(body: &str) -> Result<ModelReply, TransportError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| TransportError::Payload(e.to_string()))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| TransportError::Payload("response has no choices".to_string()))?;
    Ok(ModelReply {
        text: choice.message.content,
        thinking: choice.message.reasoning_content,
    })
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
    #[instrument(skip(self, transcript), fields(model = %self.config.model, turns = transcript.len()))]
    async fn respond(&self, transcript: &[Turn]) -> Result<ModelReply, TransportError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: to_messages(transcript),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(bytes = body.len(), "completion received");
        parse_reply(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_messages_drops_thinking() {
        let turns = vec![
            Turn::new(Role::System, "sys"),
            Turn::new(Role::User, "hi"),
            Turn::new(Role::Thinking, "internal"),
            Turn::new(Role::Assistant, "hello"),
        ];
        let messages = to_messages(&turns);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[2].content, "hello");
    }

    #[test]
    fn test_parse_reply_with_reasoning() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"pmttw","reasoning_content":"shift by 8"}}]}"#;
        let reply = parse_reply(body).expect("parse");
        assert_eq!(reply.text.as_deref(), Some("pmttw"));
        assert_eq!(reply.thinking.as_deref(), Some("shift by 8"));
    }

    #[test]
    fn test_parse_reply_null_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        let reply = parse_reply(body).expect("parse");
        assert_eq!(reply.text, None);
    }

    #[test]
    fn test_parse_reply_without_choices_is_payload_error() {
        let err = parse_reply(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, TransportError::Payload(_)));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = OpenAiCompatClient::new(ClientConfig {
            base_url: "https://api.deepseek.com/".to_string(),
            ..ClientConfig::default()
        })
        .expect("client");
        assert_eq!(client.endpoint(), "https://api.deepseek.com/chat/completions");
    }

    #[test]
    fn test_client_config_never_serializes_api_key() {
        let cfg = ClientConfig {
            api_key: "sk-secret".to_string(),
            ..ClientConfig::default()
        };
        let json = serde_json::to_string(&cfg).expect("serialize");
        assert!(!json.contains("sk-secret"));
    }
}
