//! Renders provider results into the fixed numbered templates handed to
//! the LLM, and hosts the shared relative-time bucketing.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::utils::text::truncate_at_boundary;

/// Fetched page content is hard-truncated to this many bytes before it is
/// embedded in a prompt.
pub const MAX_PAGE_CONTENT: usize = 8_000;

const TRUNCATION_MARKER: &str = "... (content truncated)";

pub const NO_UNREAD_EMAILS: &str = "You have no unread emails.";
pub const NO_CHANNELS: &str = "No Slack channels found.";

/// Relative-time bucketing shared by every formatter.
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now.signed_duration_since(then);

    if diff.num_seconds() < 60 {
        return "just now".to_string();
    }
    if diff.num_hours() < 1 {
        let minutes = diff.num_minutes();
        return if minutes == 1 {
            "1 minute ago".to_string()
        } else {
            format!("{minutes} minutes ago")
        };
    }
    if diff.num_hours() < 24 {
        let hours = diff.num_hours();
        return if hours == 1 {
            "1 hour ago".to_string()
        } else {
            format!("{hours} hours ago")
        };
    }
    if diff.num_hours() < 48 {
        return "yesterday".to_string();
    }
    if diff.num_days() < 7 {
        return format!("{} days ago", diff.num_days());
    }
    then.format("%b %-d").to_string()
}

/// Parse an email `Date:` header. RFC 2822 first, then the layouts that
/// show up in the wild (trailing zone names, missing weekday).
pub fn parse_email_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc2822(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    // "Mon, 2 Jan 2006 15:04:05 -0700 (MST)": strip the zone name
    let stripped = match raw.rsplit_once('(') {
        Some((head, tail)) if tail.ends_with(')') => head.trim_end(),
        _ => raw,
    };

    const LAYOUTS: &[&str] = &[
        "%a, %d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M:%S %z",
        "%a, %d %b %y %H:%M:%S %z",
    ];
    for layout in LAYOUTS {
        if let Ok(parsed) = DateTime::parse_from_str(stripped, layout) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    None
}

fn field_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

fn field_u64(value: &Value, key: &str) -> u64 {
    match value.get(key) {
        Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().map(|v| v as u64)).unwrap_or(0),
        _ => 0,
    }
}

/// Numbered unread-email block: From/Subject/relative-time plus an
/// optional snippet line. A date that parses in no known layout renders
/// verbatim.
pub fn email_block(count: u64, emails: &[Value], now: DateTime<Utc>) -> String {
    let mut block = format!("You have {count} unread emails:\n");
    for (i, email) in emails.iter().enumerate() {
        let date = field_str(email, "date");
        let received = match parse_email_date(date) {
            Some(parsed) => time_ago(parsed, now),
            None => date.to_string(),
        };
        block.push_str(&format!(
            "{}. From: {}, Subject: {}, Received: {}\n",
            i + 1,
            field_str(email, "from"),
            field_str(email, "subject"),
            received,
        ));
        let snippet = field_str(email, "snippet");
        if !snippet.is_empty() {
            block.push_str(&format!("   Snippet: {snippet}\n"));
        }
    }
    block
}

pub fn email_summary_prompt(block: &str) -> String {
    format!(
        "Here are my unread emails. Please provide a brief summary of each, \
         including who they're from and what they appear to be about:\n\n{block}"
    )
}

/// Channel roster, rendered directly into the transcript without an LLM
/// pass: `#name (N members) - topic`, topic omitted when empty.
pub fn channel_list(channels: &[Value]) -> String {
    let mut listing = String::from("Available Slack channels:\n\n");
    for channel in channels {
        let name = field_str(channel, "name");
        let members = field_u64(channel, "member_count");
        let topic = field_str(channel, "topic");
        if topic.is_empty() {
            listing.push_str(&format!("#{name} ({members} members)\n"));
        } else {
            listing.push_str(&format!("#{name} ({members} members) - {topic}\n"));
        }
    }
    listing
}

/// Numbered, attributed, time-relative message lines for one channel.
pub fn channel_messages_block(channel_name: &str, messages: &[Value]) -> String {
    let mut block = format!("Recent messages from #{channel_name} (newest first):\n\n");
    for (i, message) in messages.iter().enumerate() {
        block.push_str(&format!(
            "{}. {} ({}): {}\n",
            i + 1,
            field_str(message, "user"),
            field_str(message, "time_ago"),
            field_str(message, "text"),
        ));
    }
    block
}

pub fn channel_summary_prompt(block: &str) -> String {
    format!(
        "Here are recent messages from a Slack channel. Please provide:\n\
         1. A concise summary of the main topics and discussions\n\
         2. Any important decisions or action items\n\
         3. Any questions that appear to need answers\n\n{block}"
    )
}

/// Prompt for a fetched page, with the raw content hard-truncated and an
/// explicit marker appended when anything was cut.
pub fn webpage_prompt(url: &str, content: &str) -> String {
    let truncated = truncate_at_boundary(content, MAX_PAGE_CONTENT);
    let body = if truncated.len() < content.len() {
        format!("{truncated}{TRUNCATION_MARKER}")
    } else {
        truncated.to_string()
    };
    format!("Please summarize the content of this webpage from {url}:\n\n{body}")
}
