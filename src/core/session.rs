//! Session state machine and the single-outstanding-request pipeline.
//!
//! The chat loop exclusively owns a [`SessionState`]; each submission
//! spawns one worker task that runs router → provider/formatter → LLM and
//! reports back exactly one terminal [`SessionEvent`] over a channel.
//! Nothing else is shared between the worker and the loop, so the state
//! needs no locks. Submissions made while a request is in flight are
//! ignored: no queueing, no cancellation, no retries.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::api::LlmBackend;
use crate::core::render;
use crate::core::router::{self, Invocation, RouteAction};
use crate::core::webpage::fetch_webpage;
use crate::providers::{ProviderError, ProviderRegistry};

const WELCOME: &str = "Valet\n\
    -----\n\
    Type your requests or commands. Type 'exit' to quit.\n\n\
    Example commands:\n\
    - summarise my unread e-mails\n\
    - what's on this webpage? bbc.co.uk\n\
    - summarize slack channel #general\n\
    - tell me about rust\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    System,
    User,
    Assistant,
    Error,
}

/// One rendered transcript entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub kind: EntryKind,
    pub content: String,
}

/// Terminal outcome of one in-flight request.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Response(String),
    Failure(String),
}

/// Transcript, loading flag, and last error. Mutated only by the owning
/// chat loop.
pub struct SessionState {
    messages: VecDeque<Entry>,
    loading: bool,
    last_error: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        let mut state = SessionState {
            messages: VecDeque::new(),
            loading: false,
            last_error: None,
        };
        state.push(EntryKind::System, WELCOME.to_string());
        state
    }

    pub fn welcome_text() -> &'static str {
        WELCOME
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.messages.iter()
    }

    /// Record a submission and transition to loading. Returns false, and
    /// changes nothing, while a request is already outstanding or the
    /// input is empty.
    pub fn begin_request(&mut self, input: &str) -> bool {
        if self.loading || input.trim().is_empty() {
            return false;
        }
        self.push(EntryKind::User, format!("> {input}"));
        self.loading = true;
        true
    }

    /// Fold a terminal worker event back into the transcript and return
    /// to idle.
    pub fn apply_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Response(text) => {
                self.push(EntryKind::Assistant, text);
                self.last_error = None;
            }
            SessionEvent::Failure(message) => {
                self.push(EntryKind::Error, format!("Error: {message}"));
                self.last_error = Some(message);
            }
        }
        self.loading = false;
    }

    /// Reset the transcript to the welcome content. Valid in any state;
    /// deliberately leaves `loading` alone so an in-flight request still
    /// resolves normally.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.push(EntryKind::System, WELCOME.to_string());
    }

    fn push(&mut self, kind: EntryKind, content: String) {
        self.messages.push_back(Entry { kind, content });
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a worker task needs to resolve one submission.
#[derive(Clone)]
pub struct RequestContext {
    pub registry: Arc<ProviderRegistry>,
    pub llm: Arc<dyn LlmBackend>,
    pub http: reqwest::Client,
}

/// Owns the sending half of the event channel; each submission becomes
/// one spawned task that sends exactly one terminal event.
#[derive(Clone)]
pub struct RequestService {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl RequestService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (RequestService { tx }, rx)
    }

    pub fn spawn_request(&self, ctx: RequestContext, input: String) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            debug!(input = %input, "request started");
            let event = match process_command(&ctx, &input).await {
                Ok(text) => SessionEvent::Response(text),
                Err(message) => SessionEvent::Failure(message),
            };
            let _ = tx.send(event);
        });
    }
}

/// Resolve one submission to its rendered transcript text.
pub async fn process_command(ctx: &RequestContext, input: &str) -> Result<String, String> {
    match router::route(input) {
        RouteAction::Exit => Ok("Exiting...".to_string()),
        RouteAction::Literal(text) => Ok(text.to_string()),
        RouteAction::Prompt(prompt) => ctx.llm.ask(&prompt).await.map_err(|err| err.to_string()),
        RouteAction::SummarizeWebpage { url } => summarize_webpage(ctx, &url).await,
        RouteAction::Dispatch(invocation) => dispatch(ctx, invocation).await,
    }
}

async fn summarize_webpage(ctx: &RequestContext, url: &str) -> Result<String, String> {
    let content = fetch_webpage(&ctx.http, url)
        .await
        .map_err(|err| format!("error fetching webpage: {err}"))?;
    let prompt = render::webpage_prompt(url, &content);
    ctx.llm.ask(&prompt).await.map_err(|err| err.to_string())
}

async fn dispatch(ctx: &RequestContext, invocation: Invocation) -> Result<String, String> {
    let result = ctx
        .registry
        .execute(invocation.provider, invocation.command, &invocation.params)
        .await
        .map_err(|err| describe_provider_error(&invocation, &err))?;

    match (invocation.provider, invocation.command) {
        (router::GMAIL_PROVIDER, "summarize_unread") => summarize_emails(ctx, &result).await,
        (router::SLACK_PROVIDER, "list_channels") => list_channels(&result),
        (router::SLACK_PROVIDER, "summarize_channel") => summarize_channel(ctx, &result).await,
        // no fixed template for this command: show the raw result
        _ => serde_json::to_string_pretty(&result).map_err(|err| err.to_string()),
    }
}

async fn summarize_emails(ctx: &RequestContext, result: &Value) -> Result<String, String> {
    let summary = result
        .as_object()
        .ok_or_else(|| "unexpected result type".to_string())?;
    let count = summary.get("count").and_then(Value::as_u64).unwrap_or(0);
    if count == 0 {
        return Ok(render::NO_UNREAD_EMAILS.to_string());
    }
    let emails = summary
        .get("emails")
        .and_then(Value::as_array)
        .ok_or_else(|| "unexpected result type".to_string())?;

    let block = render::email_block(count, emails, Utc::now());
    let prompt = render::email_summary_prompt(&block);
    ctx.llm.ask(&prompt).await.map_err(|err| err.to_string())
}

fn list_channels(result: &Value) -> Result<String, String> {
    let channels = result
        .get("channels")
        .and_then(Value::as_array)
        .ok_or_else(|| "unexpected result type".to_string())?;
    if channels.is_empty() {
        return Ok(render::NO_CHANNELS.to_string());
    }
    Ok(render::channel_list(channels))
}

async fn summarize_channel(ctx: &RequestContext, result: &Value) -> Result<String, String> {
    let summary = result
        .as_object()
        .ok_or_else(|| "unexpected result type".to_string())?;
    let channel_name = summary
        .get("channel_name")
        .and_then(Value::as_str)
        .unwrap_or("");
    let messages = summary
        .get("messages")
        .and_then(Value::as_array)
        .ok_or_else(|| "unexpected result type".to_string())?;

    if messages.is_empty() {
        return Ok(format!("No recent messages found in #{channel_name}"));
    }

    let block = render::channel_messages_block(channel_name, messages);
    let prompt = render::channel_summary_prompt(&block);
    ctx.llm.ask(&prompt).await.map_err(|err| err.to_string())
}

/// Turn a provider error into the instructional line the transcript
/// shows. Providers are not required to emit typed errors, so auth
/// conditions are detected from the rendered message.
fn describe_provider_error(invocation: &Invocation, err: &ProviderError) -> String {
    let text = err.to_string();

    if matches!(err, ProviderError::NotFound(_)) {
        return match invocation.provider {
            router::SLACK_PROVIDER => {
                "Slack integration is not configured. See the README for setup instructions."
                    .to_string()
            }
            router::GMAIL_PROVIDER => {
                "Gmail integration is not configured. See the README for setup instructions."
                    .to_string()
            }
            other => format!("provider not found: {other}"),
        };
    }

    if text.contains("authentication") || text.contains("token") {
        return match invocation.provider {
            router::SLACK_PROVIDER => {
                "Slack authentication failed. Please check your token in the valet config directory."
                    .to_string()
            }
            router::GMAIL_PROVIDER => {
                "Gmail authentication failed. Please check your token in the valet config directory."
                    .to_string()
            }
            _ => text,
        };
    }

    match (invocation.provider, invocation.command) {
        (router::GMAIL_PROVIDER, "summarize_unread") => {
            format!("failed to get unread emails: {text}")
        }
        (router::SLACK_PROVIDER, "list_channels") => {
            format!("failed to list Slack channels: {text}")
        }
        (router::SLACK_PROVIDER, "summarize_channel") => {
            format!("failed to summarize Slack channel: {text}")
        }
        _ => text,
    }
}

#[cfg(test)]
mod tests;
