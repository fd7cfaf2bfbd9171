//! The one HTTP chat adapter, parameterized by [`ProviderProfile`].
//!
//! Auth resolution, thread bootstrap, body construction, stream accumulation,
//! and final classification all branch on profile data. The streaming loop
//! mirrors the browser frontends it speaks to: thinking and answer text are
//! accumulated per phase and re-emitted cumulatively through the observer.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::MidTokenManager;
use crate::credentials::CredentialStore;
use crate::demux;
use crate::protocol;
use crate::session::{StreamChannel, TurnInput, TurnObserver, TurnOptions, TurnOutcome};
use crate::transport::decode::StreamFormat;
use crate::transport::HttpTransport;
use crate::types::action::WebSource;
use crate::types::model::{AiModel, ModelCapabilities, Provider};
use crate::types::state::ConversationState;
use crate::{Error, Result};

use super::profile::{AuthScheme, DeltaShape, Framing, ProviderProfile, RequestShape};
use super::ProviderAdapter;

/// Access token mined out of the Gemini app page.
static GEMINI_AT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""SNlM0e":"(.*?)""#).expect("gemini token pattern"));

/// Zhipu wraps streamed fragments in HTML.
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("html tag pattern"));

pub struct HttpChatAdapter {
    profile: ProviderProfile,
    transport: Arc<HttpTransport>,
    credentials: Arc<dyn CredentialStore>,
    midtoken: Option<Arc<MidTokenManager>>,
}

/// Resolved per-call authentication material.
#[derive(Default)]
struct AuthMaterial {
    bearer: Option<String>,
    midtoken: Option<String>,
    cookie: Option<String>,
}

/// Mutable turn accumulation shared by the delta interpreters.
struct TurnAccumulator {
    thinking: String,
    answer: String,
    raw: String,
    web_sources: Vec<WebSource>,
    seen_urls: HashSet<String>,
    finished: bool,
}

impl TurnAccumulator {
    fn new() -> Self {
        Self {
            thinking: String::new(),
            answer: String::new(),
            raw: String::new(),
            web_sources: Vec::new(),
            seen_urls: HashSet::new(),
            finished: false,
        }
    }

    /// The text handed to the classifier: the answer, or the thinking
    /// transcript when the model never opened an answer phase.
    fn final_text(&self) -> &str {
        if self.answer.is_empty() {
            &self.thinking
        } else {
            &self.answer
        }
    }
}

impl HttpChatAdapter {
    pub fn new(
        profile: ProviderProfile,
        transport: Arc<HttpTransport>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            profile,
            transport,
            credentials,
            midtoken: None,
        }
    }

    /// Required for [`AuthScheme::MidToken`] profiles.
    pub fn with_midtoken(mut self, manager: Arc<MidTokenManager>) -> Self {
        self.midtoken = Some(manager);
        self
    }

    pub fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    async fn resolve_auth(&self, force_token_refresh: bool) -> Result<AuthMaterial> {
        let mut material = AuthMaterial::default();
        match self.profile.auth {
            AuthScheme::None => {}
            AuthScheme::BearerKey => {
                let key = self
                    .credentials
                    .credential(self.profile.provider)
                    .ok_or_else(|| {
                        Error::auth(self.profile.provider, "API key not configured")
                    })?;
                material.bearer = Some(key);
            }
            AuthScheme::MidToken => {
                let manager = self.midtoken.as_ref().ok_or_else(|| {
                    Error::TokenAcquisition("no token manager configured".to_string())
                })?;
                material.midtoken = Some(manager.ensure_token(force_token_refresh).await?);
            }
            AuthScheme::CookieSession => {
                let raw = self
                    .credentials
                    .credential(self.profile.provider)
                    .ok_or_else(|| {
                        Error::auth(self.profile.provider, "session cookie not configured")
                    })?;
                // A bare value is the __Secure-1PSID cookie; anything with
                // '=' is taken as a complete Cookie header.
                material.cookie = Some(if raw.contains('=') {
                    raw
                } else {
                    format!("__Secure-1PSID={raw}")
                });
            }
        }
        Ok(material)
    }

    fn headers(&self, auth: &AuthMaterial, conversation_id: Option<&str>) -> Vec<(String, String)> {
        self.profile.headers(
            auth.bearer.as_deref(),
            auth.midtoken.as_deref(),
            auth.cookie.as_deref(),
            conversation_id,
        )
    }

    /// A 401/429 on a midtoken profile means the token went stale server
    /// side; one forced refresh and retry is allowed.
    fn wants_token_retry(&self, error: &Error) -> bool {
        if self.profile.auth != AuthScheme::MidToken {
            return false;
        }
        match error {
            Error::Transport(t) => matches!(t.status_code(), Some(401) | Some(429)),
            _ => false,
        }
    }

    async fn ensure_thread(
        &self,
        options: &TurnOptions,
        state: &mut ConversationState,
        auth: &AuthMaterial,
        observer: &dyn TurnObserver,
    ) -> Result<()> {
        let path = match (&self.profile.new_chat_path, &state.conversation_id) {
            (Some(path), None) => path,
            _ => return Ok(()),
        };
        let url = format!("{}{}", self.profile.base_url, path);
        let body = protocol::new_chat_body(&options.model, options.web_search);
        let response = self
            .transport
            .post_json(&url, &self.headers(auth, None), &body)
            .await?;

        let id = response["data"]["id"]
            .as_str()
            .or_else(|| response["data"]["chat_id"].as_str())
            .ok_or_else(|| {
                Error::Conversation(format!(
                    "thread creation returned no id: {}",
                    crate::transport::truncate_snippet(&response.to_string())
                ))
            })?;
        debug!(conversation_id = id, "created conversation thread");
        state.conversation_id = Some(id.to_string());
        observer.on_state_updated(state);
        Ok(())
    }

    fn completion_body(
        &self,
        options: &TurnOptions,
        state: &ConversationState,
    ) -> Result<Value> {
        match (&self.profile.request_shape, &options.input) {
            (RequestShape::ThreadedWeb, TurnInput::UserText(text)) => {
                Ok(protocol::threaded_completion_body(
                    &options.model,
                    state,
                    text,
                    options.thinking,
                    options.web_search,
                    &options.tools,
                ))
            }
            (RequestShape::ThreadedWeb, TurnInput::ToolResults(results)) => {
                protocol::tool_continuation_body(&options.model, state, results)
            }
            (RequestShape::OpenAiStyle, TurnInput::UserText(text)) => Ok(protocol::openai_style_body(
                &options.model,
                &options.history,
                text,
                options.thinking,
                !options.tools.is_empty(),
            )),
            (RequestShape::PromptConcat, TurnInput::UserText(text)) => Ok(
                protocol::prompt_concat_body(&options.history, text, !options.tools.is_empty()),
            ),
            (RequestShape::GeminiWeb, _) => Err(Error::Conversation(
                "batched web provider has no streaming body".to_string(),
            )),
            (_, TurnInput::ToolResults(_)) => Err(Error::Conversation(format!(
                "{} does not support tool-result continuation",
                self.profile.provider.display_name()
            ))),
        }
    }

    async fn send_streaming(
        &self,
        options: &TurnOptions,
        state: &mut ConversationState,
        observer: &dyn TurnObserver,
    ) -> Result<TurnOutcome> {
        let mut auth = self.resolve_auth(false).await?;
        self.ensure_thread(options, state, &auth, observer).await?;

        let body = self.completion_body(options, state)?;
        let url = self.profile.completion_url(state.conversation_id.as_deref());
        let format = match self.profile.framing {
            Framing::Sse => StreamFormat::Sse,
            Framing::RawLines => StreamFormat::RawLines,
            Framing::Batched => unreachable!("batched profiles use send_batched"),
        };

        let headers = self.headers(&auth, state.conversation_id.as_deref());
        let stream = match self.transport.post_stream(&url, &headers, &body, format).await {
            Ok(stream) => stream,
            Err(e) if self.wants_token_retry(&e) => {
                warn!(error = %e, "stale midtoken, refreshing and retrying once");
                auth = self.resolve_auth(true).await?;
                let headers = self.headers(&auth, state.conversation_id.as_deref());
                self.transport.post_stream(&url, &headers, &body, format).await?
            }
            Err(e) => return Err(e),
        };

        let mut stream = stream;
        let mut acc = TurnAccumulator::new();
        while let Some(frame) = stream.next().await {
            let frame = frame?;
            acc.raw.push_str(&frame.to_string());
            acc.raw.push('\n');
            match self.profile.delta_shape {
                DeltaShape::Phased => self.apply_phased(&frame, &mut acc, state, observer),
                DeltaShape::ChatEvent => self.apply_chat_event(&frame, &mut acc, observer),
                DeltaShape::RawText => self.apply_raw_text(&frame, &mut acc, observer),
            }
            if acc.finished {
                break;
            }
        }

        self.finish(acc, options, state, observer)
    }

    /// `choices[0].delta` frames with `phase` plus `response.created`
    /// metadata frames.
    fn apply_phased(
        &self,
        frame: &Value,
        acc: &mut TurnAccumulator,
        state: &mut ConversationState,
        observer: &dyn TurnObserver,
    ) {
        if let Some(created) = frame.get("response.created") {
            if let Some(chat_id) = created.get("chat_id").and_then(Value::as_str) {
                state.conversation_id = Some(chat_id.to_string());
            }
            if let Some(response_id) = created.get("response_id").and_then(Value::as_str) {
                state.last_parent_id = Some(response_id.to_string());
            }
            observer.on_state_updated(state);
            return;
        }

        let delta = &frame["choices"][0]["delta"];
        if delta.is_null() {
            return;
        }
        let content = delta.get("content").and_then(Value::as_str).unwrap_or("");
        match delta.get("phase").and_then(Value::as_str).unwrap_or("") {
            "think" => {
                acc.thinking.push_str(content);
                observer.on_stream_update(StreamChannel::Thinking, &acc.thinking);
            }
            "answer" => {
                acc.answer.push_str(content);
                observer.on_stream_update(StreamChannel::Answer, &acc.answer);
            }
            "web_search" => self.harvest_web_sources(delta, acc),
            _ => {}
        }
        if delta.get("status").and_then(Value::as_str) == Some("finished") {
            acc.finished = true;
        }
    }

    fn harvest_web_sources(&self, delta: &Value, acc: &mut TurnAccumulator) {
        let infos = match delta["extra"]["web_search_info"].as_array() {
            Some(infos) => infos,
            None => return,
        };
        for info in infos {
            let url = match info.get("url").and_then(Value::as_str) {
                Some(url) if !url.is_empty() => url,
                _ => continue,
            };
            if !acc.seen_urls.insert(url.to_string()) {
                continue;
            }
            acc.web_sources.push(WebSource {
                url: url.to_string(),
                title: info
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or(url)
                    .to_string(),
                snippet: info
                    .get("snippet")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                favicon: info
                    .get("hostlogo")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
        }
    }

    /// `{"type":"chat:completion","data":{...}}` event frames.
    fn apply_chat_event(
        &self,
        frame: &Value,
        acc: &mut TurnAccumulator,
        observer: &dyn TurnObserver,
    ) {
        if frame.get("type").and_then(Value::as_str) != Some("chat:completion") {
            return;
        }
        let data = &frame["data"];
        let phase = data.get("phase").and_then(Value::as_str).unwrap_or("");
        if phase == "thinking" {
            if let Some(delta) = data.get("delta_content").and_then(Value::as_str) {
                acc.thinking.push_str(strip_html(delta).trim());
                observer.on_stream_update(StreamChannel::Thinking, &acc.thinking);
            }
            return;
        }
        if let Some(edit) = data.get("edit_content").and_then(Value::as_str) {
            acc.answer.push_str(strip_html(edit).trim());
        } else if let Some(delta) = data.get("delta_content").and_then(Value::as_str) {
            acc.answer.push_str(delta);
        } else {
            return;
        }
        observer.on_stream_update(StreamChannel::Answer, &acc.answer);
    }

    /// Raw newline-delimited text fragments.
    fn apply_raw_text(
        &self,
        frame: &Value,
        acc: &mut TurnAccumulator,
        observer: &dyn TurnObserver,
    ) {
        let fragment = match frame {
            Value::String(line) => line.clone(),
            other => other.to_string(),
        };
        if !acc.answer.is_empty() {
            acc.answer.push('\n');
        }
        acc.answer.push_str(&fragment);
        observer.on_stream_update(StreamChannel::Answer, &acc.answer);
    }

    async fn send_batched(
        &self,
        options: &TurnOptions,
        state: &mut ConversationState,
        observer: &dyn TurnObserver,
    ) -> Result<TurnOutcome> {
        let text = match &options.input {
            TurnInput::UserText(text) => text,
            TurnInput::ToolResults(_) => {
                return Err(Error::Conversation(format!(
                    "{} does not support tool-result continuation",
                    self.profile.provider.display_name()
                )))
            }
        };

        let auth = self.resolve_auth(false).await?;
        let access_token = self.fetch_gemini_access_token(&auth).await?;
        let fields = protocol::gemini_form_fields(&access_token, state, text);
        let raw = self
            .transport
            .post_form(
                &self.profile.completion_url(None),
                &self.headers(&auth, None),
                &fields,
            )
            .await?;

        let reply = parse_gemini_reply(&raw)?;
        if let Some((cid, rcid)) = reply.metadata {
            state.conversation_id = Some(cid);
            state.last_parent_id = rcid;
            observer.on_state_updated(state);
        }

        // Batched turns emit no partial updates by design of the endpoint.
        let demuxed = demux::classify(&reply.text, self.profile.tool_continuation)?;
        Ok(TurnOutcome::from_demuxed(
            demuxed,
            raw,
            reply.thoughts.unwrap_or_default(),
            Vec::new(),
        ))
    }

    async fn fetch_gemini_access_token(&self, auth: &AuthMaterial) -> Result<String> {
        let url = format!("{}/app", self.profile.base_url);
        let html = self.transport.get_text(&url, &self.headers(auth, None)).await?;
        GEMINI_AT_PATTERN
            .captures(&html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| {
                Error::auth(
                    self.profile.provider,
                    "access token not found, session cookie is likely expired",
                )
            })
    }

    fn finish(
        &self,
        acc: TurnAccumulator,
        _options: &TurnOptions,
        _state: &ConversationState,
        _observer: &dyn TurnObserver,
    ) -> Result<TurnOutcome> {
        let demuxed = demux::classify(acc.final_text(), self.profile.tool_continuation)?;
        Ok(TurnOutcome::from_demuxed(
            demuxed,
            acc.raw,
            acc.thinking,
            acc.web_sources,
        ))
    }
}

fn strip_html(fragment: &str) -> String {
    HTML_TAG.replace_all(fragment, "").into_owned()
}

struct GeminiReply {
    text: String,
    thoughts: Option<String>,
    /// `(cid, rcid)` conversation metadata when present.
    metadata: Option<(String, Option<String>)>,
}

/// Parse the batched `StreamGenerate` body: an anti-JSON prefix, then a line
/// holding a JSON array whose parts carry doubly-encoded payloads. The first
/// part with a non-null candidates slot is the body; candidate text sits at
/// `[4][0][1][0]`, optional thoughts at `[4][0][37][0][0]`, conversation
/// metadata at `[1]`.
fn parse_gemini_reply(raw: &str) -> Result<GeminiReply> {
    let line = raw
        .lines()
        .nth(2)
        .ok_or_else(|| Error::Conversation("unexpected batched response shape".to_string()))?;
    let parts: Value = serde_json::from_str(line)
        .map_err(|_| Error::Conversation("unparseable batched response".to_string()))?;

    let body = parts
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|part| part.get(2).and_then(Value::as_str))
        .filter_map(|inner| serde_json::from_str::<Value>(inner).ok())
        .find(|inner| !inner[4].is_null())
        .ok_or_else(|| Error::Conversation("no candidates in batched response".to_string()))?;

    let candidate = &body[4][0];
    let text = candidate[1][0]
        .as_str()
        .ok_or_else(|| Error::Conversation("candidate carried no text".to_string()))?
        .to_string();
    let thoughts = candidate[37][0][0].as_str().map(str::to_string);

    let metadata = body[1].as_array().and_then(|meta| {
        let cid = meta.first().and_then(Value::as_str)?.to_string();
        let rcid = meta.get(2).and_then(Value::as_str).map(str::to_string);
        Some((cid, rcid))
    });

    Ok(GeminiReply {
        text,
        thoughts,
        metadata,
    })
}

#[async_trait]
impl ProviderAdapter for HttpChatAdapter {
    fn provider(&self) -> Provider {
        self.profile.provider
    }

    async fn send_turn(
        &self,
        options: &TurnOptions,
        state: &mut ConversationState,
        observer: &dyn TurnObserver,
    ) -> Result<TurnOutcome> {
        match self.profile.framing {
            Framing::Batched => self.send_batched(options, state, observer).await,
            _ => self.send_streaming(options, state, observer).await,
        }
    }

    async fn list_models(&self) -> Result<Vec<AiModel>> {
        let path = self.profile.models_path.as_deref().ok_or_else(|| {
            Error::Conversation(format!(
                "{} has no model listing endpoint",
                self.profile.provider.display_name()
            ))
        })?;
        let auth = self.resolve_auth(false).await?;
        let url = format!("{}{path}", self.profile.base_url);
        let response = self.transport.get_json(&url, &self.headers(&auth, None)).await?;

        let entries: Vec<&Value> = match response.get("data") {
            Some(Value::Array(entries)) => entries.iter().collect(),
            Some(single @ Value::Object(_)) => vec![single],
            _ => Vec::new(),
        };
        Ok(entries
            .into_iter()
            .filter_map(|entry| parse_model_entry(entry, self.profile.provider))
            .collect())
    }
}

fn parse_model_entry(entry: &Value, provider: Provider) -> Option<AiModel> {
    let id = entry.get("id").and_then(Value::as_str)?;
    let display_name = entry.get("name").and_then(Value::as_str).unwrap_or(id);
    let meta = &entry["info"]["meta"];
    let caps = &meta["capabilities"];
    let flag = |name: &str| caps.get(name).and_then(Value::as_bool).unwrap_or(false);

    let capabilities = ModelCapabilities {
        streaming: true,
        thinking: flag("thinking"),
        web_search: true,
        function_calling: flag("function_calling"),
        vision: flag("vision"),
        max_context_tokens: meta
            .get("max_context_length")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        max_generation_tokens: meta
            .get("max_generation_length")
            .and_then(Value::as_u64)
            .unwrap_or(0),
    };
    Some(AiModel::new(id, display_name, provider, capabilities))
}
