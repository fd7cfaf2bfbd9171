//! Request-body construction for every provider wire dialect.
//!
//! Adapters stay thin by delegating payload assembly here. Each builder is a
//! pure function from model, conversation state, and turn inputs to a
//! `serde_json::Value`, so the exact bodies are unit-testable without a
//! network in sight.
//!
//! | Builder | Dialect |
//! |---------|---------|
//! | [`new_chat_body`] / [`threaded_completion_body`] | Threaded web chat (server-assigned conversation and parent ids) |
//! | [`tool_continuation_body`] | Tool-result follow-up turn on a threaded conversation |
//! | [`openai_style_body`] | Stateless OpenAI-compatible completion with inline history |
//! | [`prompt_concat_body`] | Prompt-concatenation services with no message array |
//! | [`gemini_form_fields`] | Batched `f.req` form envelope for the Gemini web frontend |

pub mod prompts;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::types::message::{now_millis, ChatMessage};
use crate::types::model::AiModel;
use crate::types::state::ConversationState;
use crate::types::tool::ToolSpec;
use crate::Result;

/// One executed tool invocation, echoed back to the model on a
/// continuation turn.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub name: String,
    pub result: Value,
}

/// Body for creating a new server-side conversation thread.
pub fn new_chat_body(model: &AiModel, web_search: bool) -> Value {
    json!({
        "title": "New Chat",
        "models": [model.id],
        "chat_mode": "normal",
        "chat_type": if web_search { "search" } else { "t2t" },
        "timestamp": now_millis(),
    })
}

/// Completion body for a threaded user turn.
///
/// On a fresh conversation the system instruction is injected as the first
/// message; later turns rely on server-side threading via `parent_id` and
/// send only the new user message.
pub fn threaded_completion_body(
    model: &AiModel,
    state: &ConversationState,
    text: &str,
    thinking: bool,
    web_search: bool,
    tools: &[ToolSpec],
) -> Value {
    let mut messages = Vec::new();
    if state.is_fresh() {
        messages.push(json!({
            "role": "system",
            "content": prompts::system_prompt(!tools.is_empty()),
        }));
    }
    messages.push(threaded_user_message(model, text, thinking, web_search));

    let mut body = json!({
        "stream": true,
        "incremental_output": true,
        "chat_id": state.conversation_id,
        "chat_mode": "normal",
        "model": model.id,
        "parent_id": state.last_parent_id,
        "timestamp": now_millis(),
        "messages": messages,
    });
    if !tools.is_empty() {
        body["tools"] = ToolSpec::to_wire_array(tools);
        body["tool_choice"] = json!({ "type": "auto" });
    }
    body
}

/// Continuation body carrying executed tool results back to the model.
///
/// Results are serialized as a `tool_result` action object and fenced as a
/// JSON code block inside an ordinary user message. Thinking is disabled for
/// the continuation and no system message is sent.
pub fn tool_continuation_body(
    model: &AiModel,
    state: &ConversationState,
    results: &[ToolResult],
) -> Result<Value> {
    let payload = json!({
        "action": "tool_result",
        "results": results
            .iter()
            .map(|r| json!({ "name": r.name, "result": r.result }))
            .collect::<Vec<_>>(),
    });
    let fenced = format!("```json\n{}\n```\n", serde_json::to_string(&payload)?);

    Ok(json!({
        "stream": true,
        "incremental_output": true,
        "chat_id": state.conversation_id,
        "chat_mode": "normal",
        "model": model.id,
        "parent_id": state.last_parent_id,
        "timestamp": now_millis(),
        "messages": [{
            "role": "user",
            "content": fenced,
            "user_action": "chat",
            "files": [],
            "timestamp": now_millis(),
            "models": [model.id],
            "chat_type": "t2t",
            "feature_config": {
                "thinking_enabled": false,
                "output_schema": "phase",
            },
            "fid": Uuid::new_v4().to_string(),
            "childrenIds": [],
        }],
    }))
}

fn threaded_user_message(model: &AiModel, text: &str, thinking: bool, web_search: bool) -> Value {
    let mut feature_config = json!({
        "thinking_enabled": thinking,
        "output_schema": "phase",
    });
    if web_search {
        feature_config["search_version"] = json!("v2");
    }
    if thinking {
        feature_config["thinking_budget"] = json!(38912);
    }
    json!({
        "role": "user",
        "content": text,
        "user_action": "chat",
        "files": [],
        "timestamp": now_millis(),
        "models": [model.id],
        "chat_type": if web_search { "search" } else { "t2t" },
        "feature_config": feature_config,
        "fid": Uuid::new_v4().to_string(),
        // Threading is top-level parent_id only; the per-message field stays null.
        "parentId": null,
        "childrenIds": [],
    })
}

/// Stateless OpenAI-style completion body with full inline history.
pub fn openai_style_body(
    model: &AiModel,
    history: &[ChatMessage],
    text: &str,
    thinking: bool,
    tools_enabled: bool,
) -> Value {
    let mut messages = vec![json!({
        "role": "system",
        "content": prompts::system_prompt(tools_enabled),
    })];
    for msg in history.iter().filter(|m| !m.transient) {
        messages.push(json!({ "role": msg.role_str(), "content": msg.content }));
    }
    messages.push(json!({ "role": "user", "content": text }));

    json!({
        "chat_id": "local",
        "id": Uuid::new_v4().to_string(),
        "stream": true,
        "model": model.id,
        "messages": messages,
        "features": { "enable_thinking": thinking },
    })
}

/// Body for prompt-concatenation services: history is flattened into one
/// `role: content` transcript, the system instruction rides in its own field.
pub fn prompt_concat_body(history: &[ChatMessage], text: &str, tools_enabled: bool) -> Value {
    let mut prompt = String::new();
    for msg in history.iter().filter(|m| !m.transient) {
        prompt.push_str(msg.role_str());
        prompt.push_str(": ");
        prompt.push_str(&msg.content);
        prompt.push('\n');
    }
    prompt.push_str("user: ");
    prompt.push_str(text);
    prompt.push('\n');

    json!({
        "prompt": prompt,
        "userId": format!("#/chat/{}", now_millis()),
        "network": true,
        "system": prompts::system_prompt(tools_enabled),
        "withoutContext": false,
        "stream": true,
    })
}

/// Form fields for the Gemini web frontend's batched `StreamGenerate` call.
///
/// The prompt travels inside a doubly-encoded JSON array under `f.req`, with
/// the conversation metadata triple (`cid`, `rid`, `rcid`) threading replies.
/// `conversation_id` carries the cid, `last_parent_id` the rcid.
pub fn gemini_form_fields(
    access_token: &str,
    state: &ConversationState,
    text: &str,
) -> Vec<(String, String)> {
    let metadata = json!([state.conversation_id, null, state.last_parent_id]);
    let inner = json!([[text, 0, null, []], null, metadata]);
    let outer = json!([null, inner.to_string()]);
    vec![
        ("at".to_string(), access_token.to_string()),
        ("f.req".to_string(), outer.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::model::{AiModel, ModelCapabilities, Provider};

    fn model() -> AiModel {
        AiModel::new(
            "qwen3-coder-plus",
            "Qwen3 Coder Plus",
            Provider::Alibaba,
            ModelCapabilities::default(),
        )
    }

    #[test]
    fn fresh_conversation_injects_system_message_first() {
        let state = ConversationState::new();
        let body = threaded_completion_body(&model(), &state, "hi", false, false, &[]);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert!(messages[0]["content"]
            .as_str()
            .unwrap()
            .starts_with("You are CodexAgent"));
        assert_eq!(messages[1]["role"], "user");
    }

    #[test]
    fn continued_conversation_sends_only_the_user_message() {
        let state = ConversationState {
            conversation_id: Some("c-1".into()),
            last_parent_id: Some("p-1".into()),
        };
        let body = threaded_completion_body(&model(), &state, "again", false, false, &[]);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(body["parent_id"], "p-1");
        assert_eq!(body["chat_id"], "c-1");
    }

    #[test]
    fn tool_mode_selects_file_ops_prompt_and_advertises_tools() {
        let state = ConversationState::new();
        let tools = crate::types::tool::default_file_tools();
        let body = threaded_completion_body(&model(), &state, "build it", false, false, &tools);
        assert!(body["messages"][0]["content"]
            .as_str()
            .unwrap()
            .contains("file_operation"));
        assert_eq!(body["tool_choice"]["type"], "auto");
        assert_eq!(body["tools"].as_array().unwrap().len(), tools.len());
    }

    #[test]
    fn feature_config_flags_follow_turn_options() {
        let state = ConversationState::new();
        let body = threaded_completion_body(&model(), &state, "q", true, true, &[]);
        let config = &body["messages"][1]["feature_config"];
        assert_eq!(config["thinking_enabled"], true);
        assert_eq!(config["thinking_budget"], 38912);
        assert_eq!(config["search_version"], "v2");
        assert_eq!(body["messages"][1]["chat_type"], "search");

        let plain = threaded_completion_body(&model(), &state, "q", false, false, &[]);
        let config = &plain["messages"][1]["feature_config"];
        assert_eq!(config["thinking_enabled"], false);
        assert!(config.get("thinking_budget").is_none());
        assert!(config.get("search_version").is_none());
    }

    #[test]
    fn tool_continuation_is_fenced_and_thinking_free() {
        let state = ConversationState {
            conversation_id: Some("c-9".into()),
            last_parent_id: Some("p-9".into()),
        };
        let results = vec![ToolResult {
            name: "readFile".into(),
            result: json!({ "ok": true, "content": "<html></html>" }),
        }];
        let body = tool_continuation_body(&model(), &state, &results).unwrap();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        let content = messages[0]["content"].as_str().unwrap();
        assert!(content.starts_with("```json\n"));
        assert!(content.contains("\"action\":\"tool_result\""));
        assert!(content.contains("readFile"));
        assert_eq!(messages[0]["feature_config"]["thinking_enabled"], false);
    }

    #[test]
    fn prompt_concat_flattens_history_in_order() {
        let history = vec![
            ChatMessage::user("first"),
            ChatMessage::assistant("second"),
        ];
        let body = prompt_concat_body(&history, "third", false);
        let prompt = body["prompt"].as_str().unwrap();
        assert_eq!(prompt, "user: first\nassistant: second\nuser: third\n");
        assert_eq!(body["network"], true);
        assert_eq!(body["withoutContext"], false);
    }

    #[test]
    fn transient_placeholders_are_excluded_from_payloads() {
        let history = vec![
            ChatMessage::user("hello"),
            ChatMessage::placeholder("Thinking…"),
        ];
        let body = openai_style_body(&model(), &history, "next", false, false);
        let messages = body["messages"].as_array().unwrap();
        // system + one history entry + the new user message
        assert_eq!(messages.len(), 3);
    }

    #[test]
    fn gemini_envelope_double_encodes_the_inner_request() {
        let state = ConversationState {
            conversation_id: Some("cid-1".into()),
            last_parent_id: Some("rcid-1".into()),
        };
        let fields = gemini_form_fields("tok", &state, "hello");
        assert_eq!(fields[0], ("at".to_string(), "tok".to_string()));
        let (name, value) = &fields[1];
        assert_eq!(name, "f.req");
        let outer: Value = serde_json::from_str(value).unwrap();
        let inner: Value = serde_json::from_str(outer[1].as_str().unwrap()).unwrap();
        assert_eq!(inner[0][0], "hello");
        assert_eq!(inner[2][0], "cid-1");
        assert_eq!(inner[2][2], "rcid-1");
    }
}
