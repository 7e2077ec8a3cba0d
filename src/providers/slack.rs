//! Slack capability provider over the Slack Web API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::env;
use std::fs;
use tracing::debug;

use super::{count_param, Capability, Provider, ProviderError};
use crate::core::config::credential_path;
use crate::core::render::time_ago;
use crate::utils::url::construct_api_url;

const DEFAULT_BASE_URL: &str = "https://slack.com/api";
const TOKEN_FILE: &str = "slack_token.txt";
const DEFAULT_COUNT: usize = 10;

/// Slack error codes that mean the token is bad, as opposed to the
/// request.
const AUTH_ERRORS: &[&str] = &[
    "invalid_auth",
    "not_authed",
    "account_inactive",
    "token_revoked",
    "token_expired",
];

#[derive(Deserialize)]
struct ChannelsResponse {
    ok: bool,
    error: Option<String>,
    #[serde(default)]
    channels: Vec<SlackChannel>,
}

#[derive(Deserialize)]
struct SlackChannel {
    id: String,
    name: String,
    #[serde(default)]
    is_private: bool,
    #[serde(default)]
    topic: Topic,
    #[serde(default)]
    num_members: u64,
}

#[derive(Deserialize, Default)]
struct Topic {
    #[serde(default)]
    value: String,
}

#[derive(Deserialize)]
struct HistoryResponse {
    ok: bool,
    error: Option<String>,
    #[serde(default)]
    messages: Vec<SlackMessage>,
}

#[derive(Deserialize)]
struct SlackMessage {
    #[serde(default)]
    user: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    ts: String,
}

#[derive(Deserialize)]
struct ChannelInfoResponse {
    ok: bool,
    error: Option<String>,
    channel: Option<SlackChannel>,
}

#[derive(Deserialize)]
struct UserInfoResponse {
    ok: bool,
    user: Option<SlackUser>,
}

#[derive(Deserialize)]
struct SlackUser {
    #[serde(default)]
    name: String,
    #[serde(default)]
    real_name: String,
}

/// Provider for a Slack workspace. The bot token comes from the
/// environment or the config directory.
pub struct SlackProvider {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl SlackProvider {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let token = load_token()?;
        Ok(SlackProvider {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            token,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let response = self
            .client
            .get(construct_api_url(&self.base_url, method))
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|err| ProviderError::Upstream(format!("unable to reach Slack: {err}")))?;

        response
            .json()
            .await
            .map_err(|err| ProviderError::Upstream(format!("unable to decode Slack reply: {err}")))
    }

    /// `{channels: [{id, name, is_private, topic, member_count}]}`
    async fn list_channels(&self) -> Result<Value, ProviderError> {
        let channels = self.fetch_channels().await?;
        let listing: Vec<Value> = channels
            .iter()
            .map(|channel| {
                json!({
                    "id": channel.id,
                    "name": channel.name,
                    "is_private": channel.is_private,
                    "topic": channel.topic.value,
                    "member_count": channel.num_members,
                })
            })
            .collect();
        Ok(json!({ "channels": listing }))
    }

    async fn fetch_channels(&self) -> Result<Vec<SlackChannel>, ProviderError> {
        let response: ChannelsResponse = self
            .get_json(
                "conversations.list",
                &[("types", "public_channel,private_channel".to_string())],
            )
            .await?;
        if !response.ok {
            return Err(api_error("unable to list channels", response.error));
        }
        Ok(response.channels)
    }

    /// `{channel_id, channel_name?, messages: [{user, text, timestamp,
    /// time_ago}]}`
    async fn recent_messages(&self, channel_id: &str, count: usize) -> Result<Value, ProviderError> {
        let history: HistoryResponse = self
            .get_json(
                "conversations.history",
                &[
                    ("channel", channel_id.to_string()),
                    ("limit", count.to_string()),
                ],
            )
            .await?;
        if !history.ok {
            return Err(api_error("unable to get channel history", history.error));
        }

        let now = Utc::now();
        let mut usernames: HashMap<String, String> = HashMap::new();
        let mut messages = Vec::new();
        for message in &history.messages {
            let user = if message.user.is_empty() {
                "Unknown".to_string()
            } else {
                match usernames.get(&message.user) {
                    Some(name) => name.clone(),
                    None => {
                        let name = self.resolve_username(&message.user).await;
                        usernames.insert(message.user.clone(), name.clone());
                        name
                    }
                }
            };

            let timestamp = parse_slack_timestamp(&message.ts);
            messages.push(json!({
                "user": user,
                "text": message.text,
                "timestamp": timestamp.map(|ts| ts.to_rfc3339()).unwrap_or_default(),
                "time_ago": timestamp
                    .map(|ts| time_ago(ts, now))
                    .unwrap_or_else(|| message.ts.clone()),
            }));
        }

        let mut result = Map::new();
        result.insert("channel_id".to_string(), json!(channel_id));
        result.insert("messages".to_string(), Value::Array(messages));
        // channel info is best-effort; history alone is still useful
        if let Some(name) = self.channel_name(channel_id).await {
            result.insert("channel_name".to_string(), json!(name));
        }
        Ok(Value::Object(result))
    }

    /// `recent_messages` plus `{count, channel_name}`. The name falls
    /// back to the ID when lookup fails.
    async fn summarize_channel(
        &self,
        channel_id: &str,
        count: usize,
    ) -> Result<Value, ProviderError> {
        let mut result = self.recent_messages(channel_id, count).await?;
        if let Some(map) = result.as_object_mut() {
            map.insert("count".to_string(), json!(count));
            if !map.contains_key("channel_name") {
                map.insert("channel_name".to_string(), json!(channel_id));
            }
        }
        Ok(result)
    }

    async fn channel_name(&self, channel_id: &str) -> Option<String> {
        let info: ChannelInfoResponse = self
            .get_json("conversations.info", &[("channel", channel_id.to_string())])
            .await
            .ok()?;
        if !info.ok {
            debug!(channel = %channel_id, error = ?info.error, "channel info lookup failed");
            return None;
        }
        info.channel.map(|channel| channel.name)
    }

    async fn resolve_username(&self, user_id: &str) -> String {
        let info: Result<UserInfoResponse, _> = self
            .get_json("users.info", &[("user", user_id.to_string())])
            .await;
        match info {
            Ok(response) if response.ok => response
                .user
                .map(|user| {
                    if user.real_name.is_empty() {
                        user.name
                    } else {
                        user.real_name
                    }
                })
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| user_id.to_string()),
            _ => user_id.to_string(),
        }
    }

    async fn channel_id_by_name(&self, channel_name: &str) -> Result<String, ProviderError> {
        let channels = self.fetch_channels().await?;
        find_channel_id(&channels, channel_name)
    }
}

#[async_trait]
impl Provider for SlackProvider {
    fn name(&self) -> &str {
        "Slack"
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability {
            name: "messages".to_string(),
            description: "Access and summarize Slack messages".to_string(),
            commands: vec![
                "list_channels".to_string(),
                "recent_messages".to_string(),
                "summarize_channel".to_string(),
            ],
        }]
    }

    async fn execute(
        &self,
        command: &str,
        params: &Map<String, Value>,
    ) -> Result<Value, ProviderError> {
        match command {
            "list_channels" => self.list_channels().await,
            "recent_messages" => {
                let channel_id = params
                    .get("channel_id")
                    .and_then(Value::as_str)
                    .ok_or(ProviderError::MissingParameter("channel_id"))?;
                let count = count_param(params, "count", DEFAULT_COUNT);
                self.recent_messages(channel_id, count).await
            }
            "summarize_channel" => {
                let count = count_param(params, "count", DEFAULT_COUNT);
                let channel_id = match params.get("channel_id").and_then(Value::as_str) {
                    Some(id) => id.to_string(),
                    None => {
                        let name = params.get("channel").and_then(Value::as_str).ok_or(
                            ProviderError::MissingParameter("either channel_id or channel"),
                        )?;
                        self.channel_id_by_name(name).await?
                    }
                };
                self.summarize_channel(&channel_id, count).await
            }
            other => Err(ProviderError::UnknownCommand(other.to_string())),
        }
    }
}

/// Map Slack's `{ok: false, error}` envelope onto the provider error
/// taxonomy.
fn api_error(context: &str, error: Option<String>) -> ProviderError {
    let code = error.unwrap_or_else(|| "unknown error".to_string());
    if AUTH_ERRORS.contains(&code.as_str()) {
        ProviderError::Auth(code)
    } else {
        ProviderError::Upstream(format!("{context}: {code}"))
    }
}

/// Exact-name lookup, leading `#` stripped.
fn find_channel_id(channels: &[SlackChannel], channel_name: &str) -> Result<String, ProviderError> {
    let wanted = channel_name.trim_start_matches('#');
    channels
        .iter()
        .find(|channel| channel.name == wanted)
        .map(|channel| channel.id.clone())
        .ok_or_else(|| ProviderError::Upstream(format!("channel not found: {wanted}")))
}

/// Slack timestamps look like `"1234567890.123456"`; the fraction is a
/// uniqueness suffix, not subsecond precision we care about.
fn parse_slack_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    let seconds = ts.split('.').next()?.parse::<i64>().ok()?;
    DateTime::from_timestamp(seconds, 0)
}

fn load_token() -> Result<String, Box<dyn std::error::Error>> {
    if let Ok(token) = env::var("SLACK_TOKEN") {
        if !token.is_empty() {
            return Ok(token);
        }
    }

    let path = match env::var("SLACK_TOKEN_PATH") {
        Ok(path) if !path.is_empty() => std::path::PathBuf::from(path),
        _ => credential_path(TOKEN_FILE).ok_or("unable to determine config directory")?,
    };
    let token = fs::read_to_string(&path)
        .map_err(|err| format!("unable to read token file {}: {err}", path.display()))?;
    Ok(token.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_provider() -> SlackProvider {
        SlackProvider {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            token: "xoxb-test".to_string(),
        }
    }

    #[test]
    fn timestamps_parse_seconds_and_ignore_the_suffix() {
        let parsed = parse_slack_timestamp("1714000000.000200").unwrap();
        assert_eq!(parsed.timestamp(), 1_714_000_000);
        assert!(parse_slack_timestamp("not-a-ts").is_none());
        assert!(parse_slack_timestamp("").is_none());
    }

    #[test]
    fn auth_error_codes_map_to_auth_everything_else_to_upstream() {
        let err = api_error("unable to list channels", Some("invalid_auth".to_string()));
        assert!(matches!(err, ProviderError::Auth(_)));
        assert!(err.to_string().contains("token") || err.to_string().contains("authentication"));

        let err = api_error("unable to list channels", Some("ratelimited".to_string()));
        assert!(matches!(err, ProviderError::Upstream(_)));
        assert_eq!(err.to_string(), "unable to list channels: ratelimited");

        let err = api_error("unable to list channels", None);
        assert_eq!(err.to_string(), "unable to list channels: unknown error");
    }

    #[test]
    fn name_lookup_matches_exactly_and_strips_the_hash() {
        let channels = vec![
            SlackChannel {
                id: "C11111111".to_string(),
                name: "general".to_string(),
                is_private: false,
                topic: Topic::default(),
                num_members: 10,
            },
            SlackChannel {
                id: "C22222222".to_string(),
                name: "general-team".to_string(),
                is_private: false,
                topic: Topic::default(),
                num_members: 4,
            },
        ];

        assert_eq!(find_channel_id(&channels, "general").unwrap(), "C11111111");
        assert_eq!(
            find_channel_id(&channels, "#general-team").unwrap(),
            "C22222222"
        );
        let err = find_channel_id(&channels, "missing").unwrap_err();
        assert_eq!(err.to_string(), "channel not found: missing");
    }

    #[test]
    fn channel_envelope_deserializes_topic_and_member_count() {
        let body = r#"{
            "ok": true,
            "channels": [
                {"id": "C12345678", "name": "general", "is_private": false,
                 "topic": {"value": "All hands"}, "num_members": 12}
            ]
        }"#;
        let parsed: ChannelsResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.ok);
        assert_eq!(parsed.channels[0].name, "general");
        assert_eq!(parsed.channels[0].topic.value, "All hands");
        assert_eq!(parsed.channels[0].num_members, 12);
    }

    #[tokio::test]
    async fn recent_messages_requires_a_channel_id() {
        let provider = test_provider();
        let err = provider
            .execute("recent_messages", &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MissingParameter("channel_id")));
    }

    #[tokio::test]
    async fn summarize_channel_requires_some_channel_reference() {
        let provider = test_provider();
        let err = provider
            .execute("summarize_channel", &Map::new())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "either channel_id or channel parameter required"
        );
    }

    #[tokio::test]
    async fn unknown_commands_are_rejected() {
        let provider = test_provider();
        let err = provider.execute("post_message", &Map::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "unknown command: post_message");
    }
}
