//! Gmail capability provider over the Gmail REST API.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::env;
use std::fs;
use tracing::debug;

use super::{count_param, require_str, Capability, Provider, ProviderError};
use crate::core::config::credential_path;
use crate::utils::url::construct_api_url;

const DEFAULT_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";
const TOKEN_FILE: &str = "gmail_token.txt";
const DEFAULT_COUNT: usize = 10;

#[derive(Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Deserialize)]
struct GmailMessage {
    id: String,
    #[serde(default)]
    snippet: String,
    #[serde(rename = "threadId", default)]
    thread_id: String,
    payload: Option<MessagePart>,
}

#[derive(Deserialize)]
struct MessagePart {
    #[serde(rename = "mimeType", default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Deserialize)]
struct PartBody {
    data: Option<String>,
}

/// Provider for a Gmail mailbox. Token acquisition is out of scope: an
/// OAuth access token is expected in the environment or the config
/// directory.
pub struct GmailProvider {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl GmailProvider {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let token = load_token()?;
        Ok(GmailProvider {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            token,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let response = self
            .client
            .get(construct_api_url(&self.base_url, endpoint))
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|err| ProviderError::Upstream(format!("unable to reach Gmail: {err}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::Auth(format!(
                "Gmail rejected the access token (status {status})"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream(format!(
                "unable to retrieve messages (status {status}): {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|err| ProviderError::Upstream(format!("unable to decode Gmail reply: {err}")))
    }

    async fn unread_ids(&self, count: usize) -> Result<Vec<String>, ProviderError> {
        let list: MessageList = self
            .get_json(
                "users/me/messages",
                &[
                    ("q", "is:unread".to_string()),
                    ("maxResults", count.to_string()),
                ],
            )
            .await?;
        Ok(list.messages.into_iter().map(|m| m.id).collect())
    }

    async fn fetch_message(&self, id: &str, format: &str) -> Result<GmailMessage, ProviderError> {
        self.get_json(
            &format!("users/me/messages/{id}"),
            &[("format", format.to_string())],
        )
        .await
    }

    /// `[{id, from, to, subject, date}]`
    async fn list_unread(&self) -> Result<Value, ProviderError> {
        let ids = self.unread_ids(DEFAULT_COUNT).await?;
        let mut emails = Vec::new();
        for id in ids {
            // a message that vanished between list and fetch is skipped
            match self.fetch_message(&id, "metadata").await {
                Ok(message) => emails.push(email_metadata(&message, false)),
                Err(err) => debug!(%id, %err, "skipping unread message"),
            }
        }
        Ok(Value::Array(emails))
    }

    /// `{count, emails: [{id, from, subject, date, snippet}]}`
    async fn summarize_unread(&self, count: usize) -> Result<Value, ProviderError> {
        let ids = self.unread_ids(count).await?;
        let mut emails = Vec::new();
        for id in ids {
            match self.fetch_message(&id, "metadata").await {
                Ok(message) => emails.push(email_metadata(&message, true)),
                Err(err) => debug!(%id, %err, "skipping unread message"),
            }
        }
        Ok(json!({
            "count": emails.len(),
            "emails": emails,
        }))
    }

    /// `{id, from, to, subject, date, snippet, body}`
    async fn get_email(&self, id: &str) -> Result<Value, ProviderError> {
        let message = self.fetch_message(id, "full").await?;
        let mut email = email_metadata(&message, true);
        if let Some(map) = email.as_object_mut() {
            map.insert("threadId".to_string(), json!(message.thread_id));
            // top-level body first, then the first text/plain part
            let body = message.payload.as_ref().and_then(|payload| {
                decode_part(payload).or_else(|| payload.parts.iter().find_map(plain_text_body))
            });
            if let Some(body) = body {
                map.insert("body".to_string(), json!(body));
            }
        }
        Ok(email)
    }
}

#[async_trait]
impl Provider for GmailProvider {
    fn name(&self) -> &str {
        "Gmail"
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability {
            name: "email".to_string(),
            description: "Access and summarize email".to_string(),
            commands: vec![
                "list_unread".to_string(),
                "get_email".to_string(),
                "summarize_unread".to_string(),
            ],
        }]
    }

    async fn execute(
        &self,
        command: &str,
        params: &Map<String, Value>,
    ) -> Result<Value, ProviderError> {
        match command {
            "list_unread" => self.list_unread().await,
            "get_email" => {
                let id = require_str(params, "id")?;
                self.get_email(id).await
            }
            "summarize_unread" => {
                let count = count_param(params, "count", DEFAULT_COUNT);
                self.summarize_unread(count).await
            }
            other => Err(ProviderError::UnknownCommand(other.to_string())),
        }
    }
}

/// Project the interesting headers into the open result mapping, keys
/// lowercased.
fn email_metadata(message: &GmailMessage, with_snippet: bool) -> Value {
    let mut email = Map::new();
    email.insert("id".to_string(), json!(message.id));
    if let Some(payload) = &message.payload {
        for header in &payload.headers {
            match header.name.as_str() {
                "From" | "To" | "Subject" | "Date" => {
                    email.insert(header.name.to_lowercase(), json!(header.value));
                }
                _ => {}
            }
        }
    }
    if with_snippet {
        email.insert("snippet".to_string(), json!(message.snippet));
    }
    Value::Object(email)
}

/// Depth-first search for the first decodable text/plain part.
fn plain_text_body(part: &MessagePart) -> Option<String> {
    if part.mime_type == "text/plain" {
        if let Some(text) = decode_part(part) {
            return Some(text);
        }
    }
    part.parts.iter().find_map(plain_text_body)
}

fn decode_part(part: &MessagePart) -> Option<String> {
    let data = part.body.as_ref()?.data.as_deref()?;
    let bytes = URL_SAFE.decode(data).ok()?;
    String::from_utf8(bytes).ok()
}

fn load_token() -> Result<String, Box<dyn std::error::Error>> {
    if let Ok(token) = env::var("GMAIL_ACCESS_TOKEN") {
        if !token.is_empty() {
            return Ok(token);
        }
    }

    let path = match env::var("GMAIL_TOKEN_PATH") {
        Ok(path) if !path.is_empty() => std::path::PathBuf::from(path),
        _ => credential_path(TOKEN_FILE).ok_or("unable to determine config directory")?,
    };
    let token = fs::read_to_string(&path)
        .map_err(|err| format!("unable to read token file {}: {err}", path.display()))?;
    Ok(token.trim().to_string())
}
