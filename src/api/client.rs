//! Non-streaming client for the Anthropic messages endpoint.

use async_trait::async_trait;
use std::fmt;
use tracing::debug;

use crate::api::{ChatMessage, ContentPart, MessageRequest, MessageResponse};
use crate::core::config::Config;
use crate::utils::text::truncate_at_boundary;
use crate::utils::url::construct_api_url;

/// Prompts longer than this are truncated before submission.
pub const MAX_PROMPT_LEN: usize = 100_000;

/// Submitted in place of an empty prompt; the API rejects empty content.
const DEFAULT_PROMPT: &str = "Hello";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;
const SYSTEM_PROMPT: &str =
    "You are Claude, an AI assistant by Anthropic. You're helpful, harmless, and honest.";

#[derive(Debug)]
pub enum LlmError {
    /// The request never completed.
    Transport(reqwest::Error),
    /// The API answered with a non-success status.
    Status { code: u16, body: String },
    /// The response body could not be decoded.
    Decode(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::Transport(err) => write!(f, "error making request to Claude: {err}"),
            LlmError::Status { code, body } => {
                write!(f, "error from Claude API (Status {code}): {body}")
            }
            LlmError::Decode(msg) => write!(f, "error decoding response: {msg}"),
        }
    }
}

impl std::error::Error for LlmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LlmError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

/// Single-call abstraction over the language model: prompt in, text out.
///
/// The trait seam lets tests substitute a stub backend for the real
/// HTTP client.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn ask(&self, prompt: &str) -> Result<String, LlmError>;
}

pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl LlmClient {
    pub fn new(config: &Config) -> Self {
        LlmClient {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    /// Build the request payload, applying the prompt length cap and the
    /// non-empty fallback.
    fn build_request(model: &str, prompt: &str) -> MessageRequest {
        let prompt = truncate_at_boundary(prompt, MAX_PROMPT_LEN);
        let prompt = if prompt.is_empty() {
            DEFAULT_PROMPT
        } else {
            prompt
        };

        MessageRequest {
            model: model.to_string(),
            max_tokens: MAX_TOKENS,
            system: Some(SYSTEM_PROMPT.to_string()),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![ContentPart {
                    kind: "text".to_string(),
                    text: prompt.to_string(),
                }],
            }],
        }
    }
}

#[async_trait]
impl LlmBackend for LlmClient {
    async fn ask(&self, prompt: &str) -> Result<String, LlmError> {
        let request = Self::build_request(&self.model, prompt);
        debug!(model = %self.model, prompt_len = prompt.len(), "submitting prompt");

        let response = self
            .client
            .post(construct_api_url(&self.base_url, "messages"))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(LlmError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let parsed: MessageResponse = response
            .json()
            .await
            .map_err(|err| LlmError::Decode(err.to_string()))?;

        debug!(id = %parsed.id, blocks = parsed.content.len(), "response received");

        // Concatenate text blocks in order; other block kinds are ignored.
        let text = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();
        Ok(text)
    }
}
