//! Maps free-text commands onto provider invocations, literal replies, or
//! the LLM fallback.
//!
//! Routing is priority-ordered substring and prefix matching, evaluated
//! top to bottom. This is deliberate and inspectable: adding a provider
//! is one more ordered rule, not a retrained model. The channel and URL
//! extraction heuristics can misfire on ordinary words; that behavior is
//! intentional and covered by tests.

use serde_json::{json, Map, Value};

pub const GMAIL_PROVIDER: &str = "Gmail";
pub const SLACK_PROVIDER: &str = "Slack";

const DEFAULT_EMAIL_COUNT: u64 = 10;
const DEFAULT_MESSAGE_COUNT: u64 = 20;

pub const NO_URL_FALLBACK: &str = "Please provide a URL to summarize.";
pub const NO_CHANNEL_FALLBACK: &str = "Please specify a Slack channel name or ID to summarize.";

/// A structured provider dispatch decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub provider: &'static str,
    pub command: &'static str,
    pub params: Map<String, Value>,
}

/// Outcome of routing one trimmed command.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteAction {
    /// Terminate the session; nothing is dispatched.
    Exit,
    /// Answer with a fixed instructional string; nothing is dispatched.
    Literal(&'static str),
    /// Invoke a provider command through the registry.
    Dispatch(Invocation),
    /// Fetch the page and summarize it through the LLM.
    SummarizeWebpage { url: String },
    /// Forward the text verbatim as an LLM prompt.
    Prompt(String),
}

/// Route one raw command. Pure: no I/O, no registry access.
pub fn route(input: &str) -> RouteAction {
    let command = input.trim();

    if command == "exit" {
        return RouteAction::Exit;
    }

    if command.contains("unread emails") || command.contains("unread e-mails") {
        let mut params = Map::new();
        params.insert("count".to_string(), json!(DEFAULT_EMAIL_COUNT));
        return RouteAction::Dispatch(Invocation {
            provider: GMAIL_PROVIDER,
            command: "summarize_unread",
            params,
        });
    }

    if command.starts_with("what's on this webpage") {
        return match extract_url(command) {
            Some(url) => RouteAction::SummarizeWebpage { url },
            None => RouteAction::Literal(NO_URL_FALLBACK),
        };
    }

    if command.starts_with("list slack channels") || command.starts_with("show slack channels") {
        return RouteAction::Dispatch(Invocation {
            provider: SLACK_PROVIDER,
            command: "list_channels",
            params: Map::new(),
        });
    }

    if command.contains("summarize slack channel") || command.contains("summarise slack channel") {
        return match extract_channel(command) {
            Some(channel) => RouteAction::Dispatch(channel_summary(&channel)),
            None => RouteAction::Literal(NO_CHANNEL_FALLBACK),
        };
    }

    RouteAction::Prompt(command.to_string())
}

/// The URL is whatever follows the first `?`; without one, the trailing
/// whitespace token when the command is long enough to plausibly carry
/// a URL.
fn extract_url(command: &str) -> Option<String> {
    match command.split_once('?') {
        Some((_, rest)) => {
            let url = rest.trim();
            if url.is_empty() {
                None
            } else {
                Some(url.to_string())
            }
        }
        None => {
            let fields: Vec<&str> = command.split_whitespace().collect();
            if fields.len() > 4 {
                fields.last().map(|url| url.to_string())
            } else {
                None
            }
        }
    }
}

/// Narrow the command down to a channel token by splitting on "channel",
/// then "in", then "#", each applied to the remainder of the previous
/// split. Falls back to the trailing token when it looks like a channel
/// reference.
fn extract_channel(command: &str) -> Option<String> {
    let mut scope = command;
    let mut narrowed = false;
    for pattern in ["channel", "in", "#"] {
        if let Some((_, tail)) = scope.split_once(pattern) {
            let tail = tail.trim();
            if !tail.is_empty() {
                scope = tail;
                narrowed = true;
            }
        }
    }
    if narrowed {
        return Some(scope.to_string());
    }

    let last = command.split_whitespace().last()?;
    if last.starts_with('#') || last.starts_with('C') {
        Some(last.to_string())
    } else {
        None
    }
}

/// A 9-character token starting with "C" is treated as a channel ID and
/// passed on the direct-ID path; anything else goes through name lookup
/// with a leading "#" stripped. Resolution differs between the two.
fn channel_summary(channel: &str) -> Invocation {
    let mut params = Map::new();
    if channel.len() == 9 && channel.starts_with('C') {
        params.insert("channel_id".to_string(), Value::String(channel.to_string()));
    } else {
        params.insert(
            "channel".to_string(),
            Value::String(channel.trim_start_matches('#').to_string()),
        );
    }
    params.insert("count".to_string(), json!(DEFAULT_MESSAGE_COUNT));
    Invocation {
        provider: SLACK_PROVIDER,
        command: "summarize_channel",
        params,
    }
}
