//! End-to-end turn flows against a local mock server: threaded SSE with
//! midtoken auth, raw-line streaming, bearer-key auth, and the batched web
//! form dialect.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use ai_chat_core::auth::{MidTokenConfig, MidTokenManager, NullTokenStore};
use ai_chat_core::credentials::StaticCredentials;
use ai_chat_core::providers::{HttpChatAdapter, ProviderAdapter, ProviderProfile};
use ai_chat_core::session::{
    SessionOrchestrator, StreamChannel, TurnObserver, TurnOptions, TurnOutcome,
};
use ai_chat_core::transport::HttpTransport;
use ai_chat_core::types::model::{AiModel, ModelCapabilities, ModelRegistry, Provider};
use ai_chat_core::types::state::ConversationState;
use ai_chat_core::{Error, ParsedAction};

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl TurnObserver for RecordingObserver {
    fn on_request_started(&self) {
        self.push("started".into());
    }
    fn on_stream_update(&self, channel: StreamChannel, text: &str) {
        self.push(format!("update:{channel:?}:{text}"));
    }
    fn on_request_completed(&self) {
        self.push("completed".into());
    }
    fn on_actions_processed(&self, outcome: &TurnOutcome) {
        self.push(format!("actions:{}", outcome.explanation));
    }
    fn on_error(&self, message: &str) {
        self.push(format!("error:{message}"));
    }
    fn on_state_updated(&self, state: &ConversationState) {
        self.push(format!(
            "state:{}/{}",
            state.conversation_id.as_deref().unwrap_or("-"),
            state.last_parent_id.as_deref().unwrap_or("-"),
        ));
    }
}

fn model(id: &str, provider: Provider) -> AiModel {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("ai_chat_core=debug")
        .try_init();
    AiModel::new(id, id, provider, ModelCapabilities::default())
}

fn transport() -> Arc<HttpTransport> {
    Arc::new(HttpTransport::new().unwrap())
}

fn midtoken_manager(server: &mockito::ServerGuard) -> Arc<MidTokenManager> {
    Arc::new(MidTokenManager::new(
        transport(),
        Arc::new(NullTokenStore),
        MidTokenConfig {
            endpoint: format!("{}/wu.json", server.url()),
            max_uses: 20,
            max_age: Duration::from_secs(300),
        },
    ))
}

#[tokio::test]
async fn threaded_sse_turn_runs_the_full_lifecycle() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("GET", "/wu.json")
        .with_body("umx.wu('mid-token-1')")
        .create_async()
        .await;

    let new_chat = server
        .mock("POST", "/chats/new")
        .match_header("bx-umidtoken", "mid-token-1")
        .match_header("bx-v", "2.5.31")
        .with_body(json!({ "success": true, "data": { "id": "chat-1" } }).to_string())
        .expect(1)
        .create_async()
        .await;

    let sse_body = concat!(
        "data: {\"response.created\":{\"chat_id\":\"chat-1\",\"response_id\":\"resp-9\"}}\n\n",
        "data: {\"choices\":[{\"delta\":{\"phase\":\"think\",\"content\":\"pondering\",\"status\":\"typing\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"phase\":\"answer\",\"content\":\"Hello \",\"status\":\"typing\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"phase\":\"answer\",\"content\":\"world\",\"status\":\"finished\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    let completion = server
        .mock("POST", "/chat/completions?chat_id=chat-1")
        .match_header("Referer", mockito::Matcher::Regex("/c/chat-1$".into()))
        .with_body(sse_body)
        .expect(1)
        .create_async()
        .await;

    let mut profile = ProviderProfile::qwen_web();
    profile.base_url = server.url();
    let adapter: Arc<dyn ProviderAdapter> = Arc::new(
        HttpChatAdapter::new(profile, transport(), Arc::new(StaticCredentials::new()))
            .with_midtoken(midtoken_manager(&server)),
    );
    let orch = SessionOrchestrator::with_adapters(
        vec![adapter],
        Arc::new(ModelRegistry::with_defaults()),
    );

    let observer = Arc::new(RecordingObserver::default());
    let mut state = ConversationState::new();
    let outcome = orch
        .send_turn(
            TurnOptions::user_text(&model("qwen3-coder-plus", Provider::Alibaba), "hi"),
            &mut state,
            observer.clone(),
        )
        .await
        .unwrap();

    new_chat.assert_async().await;
    completion.assert_async().await;

    assert_eq!(
        outcome.action,
        ParsedAction::PlainText {
            text: "Hello world".into()
        }
    );
    assert_eq!(outcome.thinking, "pondering");
    assert_eq!(state.conversation_id.as_deref(), Some("chat-1"));
    assert_eq!(state.last_parent_id.as_deref(), Some("resp-9"));

    assert_eq!(
        observer.events(),
        vec![
            "started",
            "state:chat-1/-",
            "state:chat-1/resp-9",
            "update:Thinking:pondering",
            "update:Answer:Hello ",
            "update:Answer:Hello world",
            "completed",
            "actions:Hello world",
        ]
    );
}

#[tokio::test]
async fn stale_midtoken_is_refreshed_once_on_unauthorized() {
    let mut server = mockito::Server::new_async().await;

    // Initial acquisition plus the forced refresh after the 401.
    let token_mock = server
        .mock("GET", "/wu.json")
        .with_body("umx.wu('mid-token-x')")
        .expect(2)
        .create_async()
        .await;

    server
        .mock("POST", "/chats/new")
        .with_body(json!({ "success": true, "data": { "id": "chat-2" } }).to_string())
        .create_async()
        .await;

    let completion = server
        .mock("POST", "/chat/completions?chat_id=chat-2")
        .with_status(401)
        .with_body("unauthorized")
        .expect(2)
        .create_async()
        .await;

    let mut profile = ProviderProfile::qwen_web();
    profile.base_url = server.url();
    let adapter = HttpChatAdapter::new(profile, transport(), Arc::new(StaticCredentials::new()))
        .with_midtoken(midtoken_manager(&server));

    let observer = RecordingObserver::default();
    let mut state = ConversationState::new();
    let err = adapter
        .send_turn(
            &TurnOptions::user_text(&model("qwen3-coder-plus", Provider::Alibaba), "hi"),
            &mut state,
            &observer,
        )
        .await
        .unwrap_err();

    token_mock.assert_async().await;
    completion.assert_async().await;
    match err {
        Error::Transport(t) => assert_eq!(t.status_code(), Some(401)),
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn raw_line_stream_accumulates_plain_text() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/generateStream")
        .with_body("Hello\nWorld")
        .create_async()
        .await;

    let mut profile = ProviderProfile::yqcloud();
    profile.base_url = server.url();
    let adapter = HttpChatAdapter::new(profile, transport(), Arc::new(StaticCredentials::new()));

    let observer = RecordingObserver::default();
    let mut state = ConversationState::new();
    let outcome = adapter
        .send_turn(
            &TurnOptions::user_text(&model("gpt-4", Provider::Yqcloud), "hi"),
            &mut state,
            &observer,
        )
        .await
        .unwrap();

    assert_eq!(
        outcome.action,
        ParsedAction::PlainText {
            text: "Hello\nWorld".into()
        }
    );
    assert_eq!(
        observer.events(),
        vec!["update:Answer:Hello", "update:Answer:Hello\nWorld"]
    );
    // Stateless provider never touches conversation state.
    assert!(state.is_fresh());
}

#[tokio::test]
async fn chat_event_stream_separates_thinking_from_answer() {
    let mut server = mockito::Server::new_async().await;
    let sse_body = concat!(
        "data: {\"type\":\"chat:completion\",\"data\":{\"phase\":\"thinking\",\"delta_content\":\"<p>mulling</p>\"}}\n\n",
        "data: {\"type\":\"chat:completion\",\"data\":{\"phase\":\"answer\",\"delta_content\":\"All done.\"}}\n\n",
        "data: [DONE]\n\n",
    );
    let completion = server
        .mock("POST", "/chat/completions")
        .match_header("Authorization", "Bearer zhipu-key")
        .with_body(sse_body)
        .expect(1)
        .create_async()
        .await;

    let credentials = StaticCredentials::new();
    credentials.set(Provider::Zhipu, "zhipu-key");

    let mut profile = ProviderProfile::zhipu();
    profile.base_url = server.url();
    let adapter = HttpChatAdapter::new(profile, transport(), Arc::new(credentials));

    let observer = RecordingObserver::default();
    let mut state = ConversationState::new();
    let outcome = adapter
        .send_turn(
            &TurnOptions::user_text(&model("glm-4-plus", Provider::Zhipu), "hi"),
            &mut state,
            &observer,
        )
        .await
        .unwrap();

    completion.assert_async().await;
    assert_eq!(outcome.thinking, "mulling");
    assert_eq!(
        outcome.action,
        ParsedAction::PlainText {
            text: "All done.".into()
        }
    );
}

#[tokio::test]
async fn missing_bearer_key_fails_before_any_network_call() {
    let adapter = HttpChatAdapter::new(
        ProviderProfile::zhipu(),
        transport(),
        Arc::new(StaticCredentials::new()),
    );
    let observer = RecordingObserver::default();
    let mut state = ConversationState::new();
    let err = adapter
        .send_turn(
            &TurnOptions::user_text(&model("glm-4-plus", Provider::Zhipu), "hi"),
            &mut state,
            &observer,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth { .. }));
    assert!(observer.events().is_empty());
}

#[tokio::test]
async fn batched_web_turn_parses_candidates_and_metadata() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("GET", "/app")
        .with_body(r#"<html>window.WIZ = {"SNlM0e":"at-token-1"};</html>"#)
        .create_async()
        .await;

    let body = json!([
        null,
        ["cid-1", "rid-1", "rcid-1"],
        null,
        null,
        [[null, ["The answer"]]]
    ]);
    let line3 = json!([[null, null, body.to_string()]]).to_string();
    let raw = format!(")]}}'\n\n{line3}\n");

    let generate = server
        .mock(
            "POST",
            "/_/BardChatUi/data/assistant.lamda.BardFrontendService/StreamGenerate",
        )
        .with_body(raw)
        .expect(1)
        .create_async()
        .await;

    let credentials = StaticCredentials::new();
    credentials.set(Provider::Google, "psid-cookie-value");

    let mut profile = ProviderProfile::gemini_web();
    profile.base_url = server.url();
    let adapter = HttpChatAdapter::new(profile, transport(), Arc::new(credentials));

    let observer = RecordingObserver::default();
    let mut state = ConversationState::new();
    let outcome = adapter
        .send_turn(
            &TurnOptions::user_text(&model("gemini-2.5-flash", Provider::Google), "hi"),
            &mut state,
            &observer,
        )
        .await
        .unwrap();

    generate.assert_async().await;
    assert_eq!(
        outcome.action,
        ParsedAction::PlainText {
            text: "The answer".into()
        }
    );
    assert_eq!(state.conversation_id.as_deref(), Some("cid-1"));
    assert_eq!(state.last_parent_id.as_deref(), Some("rcid-1"));
    // Batched providers emit no partial updates, only the state change.
    assert_eq!(observer.events(), vec!["state:cid-1/rcid-1"]);
}

#[tokio::test]
async fn live_model_list_replaces_only_that_provider() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/wu.json")
        .with_body("umx.wu('mid-token-m')")
        .create_async()
        .await;
    server
        .mock("GET", "/models")
        .with_body(
            json!({
                "data": [{
                    "id": "qwen-live-1",
                    "name": "Qwen Live 1",
                    "info": { "meta": {
                        "capabilities": { "thinking": true, "vision": false },
                        "max_context_length": 131072,
                    }},
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let mut profile = ProviderProfile::qwen_web();
    profile.base_url = server.url();
    let adapter: Arc<dyn ProviderAdapter> = Arc::new(
        HttpChatAdapter::new(profile, transport(), Arc::new(StaticCredentials::new()))
            .with_midtoken(midtoken_manager(&server)),
    );
    let orch = SessionOrchestrator::with_adapters(
        vec![adapter],
        Arc::new(ModelRegistry::with_defaults()),
    );

    let count = orch.refresh_models(Provider::Alibaba).await.unwrap();
    assert_eq!(count, 1);
    let live = orch.registry().by_id("qwen-live-1").unwrap();
    assert!(live.capabilities.thinking);
    assert_eq!(live.capabilities.max_context_tokens, 131072);
    assert!(orch.registry().by_id("qwen3-coder-plus").is_none());
    assert!(orch.registry().by_id("glm-4-plus").is_some());
}
