//! Capability providers and the registry that addresses them by name.
//!
//! A provider is a pluggable object wrapping one external data source. It
//! exposes named commands with open, per-command parameter and result
//! shapes ([`serde_json::Value`]), so new providers and commands plug in
//! without touching the router. Capability descriptors are declarative
//! metadata only; nothing validates them against actual dispatch.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

pub mod gmail;
pub mod registry;
pub mod slack;

pub use registry::ProviderRegistry;

/// Declarative description of a provider's supported command group.
#[derive(Debug, Clone, Serialize)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub commands: Vec<String>,
}

/// A pluggable capability object exposing named commands against an
/// external data source.
///
/// Providers are constructed once at startup and live for the process
/// lifetime. The pipeline never issues two calls to the same provider
/// concurrently, so implementations only need to support repeated
/// sequential calls.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> Vec<Capability>;

    /// Run `command` with the given parameters. The result shape is fixed
    /// per command and documented on the implementing provider.
    async fn execute(
        &self,
        command: &str,
        params: &Map<String, Value>,
    ) -> Result<Value, ProviderError>;
}

impl fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider").field("name", &self.name()).finish()
    }
}

/// Errors surfaced by providers and the registry.
///
/// These are deliberately message-oriented: the registry forwards provider
/// errors unchanged, and callers inspect the rendered text to detect
/// domain conditions such as authentication failures.
#[derive(Debug)]
pub enum ProviderError {
    /// No provider registered under the requested name.
    NotFound(String),
    /// A required parameter was absent or had the wrong type.
    MissingParameter(&'static str),
    /// The provider does not recognize the command.
    UnknownCommand(String),
    /// The upstream service rejected the provider's credentials.
    Auth(String),
    /// Any other upstream failure.
    Upstream(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::NotFound(name) => write!(f, "provider not found: {name}"),
            ProviderError::MissingParameter(name) => write!(f, "{name} parameter required"),
            ProviderError::UnknownCommand(command) => write!(f, "unknown command: {command}"),
            ProviderError::Auth(msg) => write!(f, "authentication failed: {msg}"),
            ProviderError::Upstream(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Read an integer parameter, tolerating any JSON number representation.
///
/// Invocation params are an open mapping; counts may arrive as integers
/// or floats depending on who built the map.
pub(crate) fn count_param(params: &Map<String, Value>, key: &str, default: usize) -> usize {
    match params.get(key) {
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|v| v as usize)
            .or_else(|| n.as_f64().map(|v| v as usize))
            .unwrap_or(default),
        _ => default,
    }
}

/// Read a required string parameter.
pub(crate) fn require_str<'a>(
    params: &'a Map<String, Value>,
    key: &'static str,
) -> Result<&'a str, ProviderError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or(ProviderError::MissingParameter(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn count_param_accepts_integer_and_float_numbers() {
        assert_eq!(count_param(&params(&[("count", json!(5))]), "count", 10), 5);
        assert_eq!(
            count_param(&params(&[("count", json!(5.0))]), "count", 10),
            5
        );
        assert_eq!(count_param(&params(&[]), "count", 10), 10);
        assert_eq!(
            count_param(&params(&[("count", json!("7"))]), "count", 10),
            10
        );
    }

    #[test]
    fn require_str_reports_missing_or_mistyped_values() {
        let present = params(&[("id", json!("abc"))]);
        assert_eq!(require_str(&present, "id").unwrap(), "abc");

        let missing = params(&[]);
        let err = require_str(&missing, "id").unwrap_err();
        assert!(matches!(err, ProviderError::MissingParameter("id")));

        let mistyped = params(&[("id", json!(42))]);
        let err = require_str(&mistyped, "id").unwrap_err();
        assert_eq!(err.to_string(), "id parameter required");
    }
}
