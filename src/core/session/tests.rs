use super::*;
use async_trait::async_trait;
use serde_json::{json, Map};

use crate::api::LlmError;
use crate::providers::{Capability, Provider};

/// Backend that echoes its prompt, so formatter output is observable
/// verbatim.
struct EchoLlm;

#[async_trait]
impl LlmBackend for EchoLlm {
    async fn ask(&self, prompt: &str) -> Result<String, LlmError> {
        Ok(prompt.to_string())
    }
}

/// Backend that always fails with a status error.
struct FailingLlm;

#[async_trait]
impl LlmBackend for FailingLlm {
    async fn ask(&self, _prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::Status {
            code: 500,
            body: "overloaded".to_string(),
        })
    }
}

struct StubProvider {
    name: &'static str,
    result: Result<Value, fn() -> ProviderError>,
}

#[async_trait]
impl Provider for StubProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn capabilities(&self) -> Vec<Capability> {
        Vec::new()
    }

    async fn execute(
        &self,
        _command: &str,
        _params: &Map<String, Value>,
    ) -> Result<Value, ProviderError> {
        match &self.result {
            Ok(value) => Ok(value.clone()),
            Err(make) => Err(make()),
        }
    }
}

fn context_with(registry: ProviderRegistry, llm: Arc<dyn LlmBackend>) -> RequestContext {
    RequestContext {
        registry: Arc::new(registry),
        llm,
        http: reqwest::Client::new(),
    }
}

fn echo_context(registry: ProviderRegistry) -> RequestContext {
    context_with(registry, Arc::new(EchoLlm))
}

mod state_machine {
    use super::*;

    #[test]
    fn new_session_starts_idle_with_the_welcome_entry() {
        let state = SessionState::new();
        assert!(!state.is_loading());
        let entries: Vec<_> = state.entries().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EntryKind::System);
        assert_eq!(entries[0].content, SessionState::welcome_text());
    }

    #[test]
    fn begin_request_appends_the_literal_command_and_loads() {
        let mut state = SessionState::new();
        assert!(state.begin_request("tell me about rust"));
        assert!(state.is_loading());
        let last = state.entries().last().unwrap();
        assert_eq!(last.kind, EntryKind::User);
        assert_eq!(last.content, "> tell me about rust");
    }

    #[test]
    fn submissions_while_loading_are_ignored_without_history_change() {
        let mut state = SessionState::new();
        assert!(state.begin_request("first"));
        let before: Vec<_> = state.entries().cloned().collect();

        assert!(!state.begin_request("second"));
        let after: Vec<_> = state.entries().cloned().collect();
        assert_eq!(before, after);
        assert!(state.is_loading());

        // the outstanding request resolves; only then does history move
        state.apply_event(SessionEvent::Response("done".to_string()));
        assert!(!state.is_loading());
        assert_eq!(state.entries().last().unwrap().content, "done");
    }

    #[test]
    fn empty_submissions_are_ignored() {
        let mut state = SessionState::new();
        assert!(!state.begin_request(""));
        assert!(!state.begin_request("   "));
        assert!(!state.is_loading());
    }

    #[test]
    fn failure_event_renders_an_error_line_and_retains_the_error() {
        let mut state = SessionState::new();
        state.begin_request("anything");
        state.apply_event(SessionEvent::Failure("boom".to_string()));

        assert!(!state.is_loading());
        assert_eq!(state.last_error(), Some("boom"));
        let last = state.entries().last().unwrap();
        assert_eq!(last.kind, EntryKind::Error);
        assert_eq!(last.content, "Error: boom");
    }

    #[test]
    fn a_success_after_a_failure_clears_the_retained_error() {
        let mut state = SessionState::new();
        state.begin_request("a");
        state.apply_event(SessionEvent::Failure("boom".to_string()));
        state.begin_request("b");
        state.apply_event(SessionEvent::Response("fine".to_string()));
        assert_eq!(state.last_error(), None);
    }

    #[test]
    fn clear_resets_history_without_touching_loading() {
        let mut state = SessionState::new();
        state.begin_request("something");
        assert!(state.is_loading());

        state.clear();
        assert!(state.is_loading());
        let entries: Vec<_> = state.entries().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, SessionState::welcome_text());

        // the in-flight request still resolves normally
        state.apply_event(SessionEvent::Response("late".to_string()));
        assert!(!state.is_loading());
        assert_eq!(state.entries().count(), 2);
    }
}

mod worker {
    use super::*;

    #[tokio::test]
    async fn each_submission_produces_exactly_one_terminal_event() {
        let (service, mut rx) = RequestService::new();
        let ctx = echo_context(ProviderRegistry::new());

        service.spawn_request(ctx, "hello there".to_string());

        let event = rx.recv().await.unwrap();
        assert_eq!(event, SessionEvent::Response("hello there".to_string()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn llm_failures_surface_as_a_single_failure_event() {
        let (service, mut rx) = RequestService::new();
        let ctx = context_with(ProviderRegistry::new(), Arc::new(FailingLlm));

        service.spawn_request(ctx, "hello".to_string());

        match rx.recv().await.unwrap() {
            SessionEvent::Failure(message) => {
                assert!(message.contains("Status 500"));
                assert!(message.contains("overloaded"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }
}

mod dispatch {
    use super::*;

    #[tokio::test]
    async fn literal_routes_never_touch_providers_or_the_llm() {
        let ctx = context_with(ProviderRegistry::new(), Arc::new(FailingLlm));
        let text = process_command(&ctx, "what's on this webpage?")
            .await
            .unwrap();
        assert_eq!(text, "Please provide a URL to summarize.");
    }

    #[tokio::test]
    async fn email_summary_round_trips_source_fields_through_an_echo_llm() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(StubProvider {
            name: "Gmail",
            result: Ok(json!({
                "count": 2,
                "emails": [
                    {"from": "alice@example.com", "subject": "Standup", "date": "", "snippet": "moved to 10am"},
                    {"from": "bob@example.com", "subject": "Invoice", "date": ""},
                ],
            })),
        }));

        let echoed = process_command(&echo_context(registry), "summarize my unread emails")
            .await
            .unwrap();

        for field in [
            "alice@example.com",
            "Standup",
            "moved to 10am",
            "bob@example.com",
            "Invoice",
        ] {
            assert!(echoed.contains(field), "missing {field}: {echoed}");
        }
        assert!(echoed.contains("You have 2 unread emails:"));
    }

    #[tokio::test]
    async fn zero_unread_emails_short_circuits_before_the_llm() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(StubProvider {
            name: "Gmail",
            result: Ok(json!({"count": 0, "emails": []})),
        }));

        // a failing LLM proves no call is made
        let ctx = context_with(registry, Arc::new(FailingLlm));
        let text = process_command(&ctx, "summarize my unread emails")
            .await
            .unwrap();
        assert_eq!(text, render::NO_UNREAD_EMAILS);
    }

    #[tokio::test]
    async fn channel_list_is_rendered_directly_without_an_llm_pass() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(StubProvider {
            name: "Slack",
            result: Ok(json!({
                "channels": [
                    {"name": "general", "member_count": 8, "topic": "Announcements"},
                ],
            })),
        }));

        let ctx = context_with(registry, Arc::new(FailingLlm));
        let text = process_command(&ctx, "list slack channels").await.unwrap();
        assert!(text.contains("#general (8 members) - Announcements"));
    }

    #[tokio::test]
    async fn channel_summary_round_trips_messages_through_an_echo_llm() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(StubProvider {
            name: "Slack",
            result: Ok(json!({
                "channel_name": "general",
                "messages": [
                    {"user": "dana", "time_ago": "just now", "text": "deploy is done"},
                ],
            })),
        }));

        let echoed = process_command(
            &echo_context(registry),
            "summarize slack channel #general",
        )
        .await
        .unwrap();

        assert!(echoed.contains("Recent messages from #general"));
        assert!(echoed.contains("dana (just now): deploy is done"));
    }

    #[tokio::test]
    async fn empty_channel_reports_no_recent_messages() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(StubProvider {
            name: "Slack",
            result: Ok(json!({"channel_name": "quiet", "messages": []})),
        }));

        let ctx = context_with(registry, Arc::new(FailingLlm));
        let text = process_command(&ctx, "summarize slack channel #quiet")
            .await
            .unwrap();
        assert_eq!(text, "No recent messages found in #quiet");
    }

    #[tokio::test]
    async fn missing_provider_yields_the_instructional_message() {
        let ctx = echo_context(ProviderRegistry::new());
        let err = process_command(&ctx, "summarize slack channel #general")
            .await
            .unwrap_err();
        assert!(err.contains("Slack integration is not configured"));
    }

    #[tokio::test]
    async fn auth_flavored_provider_errors_name_the_credential_location() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(StubProvider {
            name: "Slack",
            result: Err(|| ProviderError::Auth("invalid_auth".to_string())),
        }));

        let err = process_command(&echo_context(registry), "summarize slack channel #general")
            .await
            .unwrap_err();
        assert!(err.contains("Slack authentication failed"));
    }

    #[tokio::test]
    async fn other_provider_errors_are_wrapped_with_command_context() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(StubProvider {
            name: "Slack",
            result: Err(|| ProviderError::Upstream("rate limited".to_string())),
        }));

        let err = process_command(&echo_context(registry), "list slack channels")
            .await
            .unwrap_err();
        assert_eq!(err, "failed to list Slack channels: rate limited");
    }

    #[tokio::test]
    async fn unexpected_result_shapes_are_reported() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(StubProvider {
            name: "Gmail",
            result: Ok(json!("not a map")),
        }));

        let err = process_command(&echo_context(registry), "summarize my unread emails")
            .await
            .unwrap_err();
        assert_eq!(err, "unexpected result type");
    }
}
