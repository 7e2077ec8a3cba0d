use serde::{Deserialize, Serialize};

#[derive(Serialize)]
pub struct MessageRequest {
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
}

#[derive(Serialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

#[derive(Deserialize)]
pub struct MessageResponse {
    pub content: Vec<ContentBlock>,
    pub id: String,
}

/// One typed block of a response. Only `text` blocks carry content we
/// render; other kinds are ignored.
#[derive(Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

pub mod client;

pub use client::{LlmBackend, LlmClient, LlmError};
