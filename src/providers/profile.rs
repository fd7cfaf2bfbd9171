//! Provider divergences as data.
//!
//! Everything that varies between backends — endpoints, auth scheme, stream
//! framing, request dialect, delta shape, threading and continuation support,
//! browser-mimicking headers — lives in a [`ProviderProfile`] value. The one
//! [`HttpChatAdapter`](super::adapter::HttpChatAdapter) interprets it; adding
//! a provider means writing a profile, not a client.

use crate::types::model::Provider;

/// How requests to this provider are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// No credential at all.
    None,
    /// `Authorization: Bearer <key>` from the credential store.
    BearerKey,
    /// Mined anti-bot token in `bx-umidtoken`, refreshed on 401/429.
    MidToken,
    /// Browser session cookie from the credential store plus a page-mined
    /// access token.
    CookieSession,
}

/// Wire framing of a completion response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `data:`-prefixed server-sent events terminated by `[DONE]`.
    Sse,
    /// Newline-delimited raw text, no event envelope.
    RawLines,
    /// One buffered response body, no streaming at all.
    Batched,
}

/// Which request builder assembles the completion body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestShape {
    /// Server-threaded web chat (`chat_id` / `parent_id`, phased messages).
    ThreadedWeb,
    /// Stateless OpenAI-style messages array with inline history.
    OpenAiStyle,
    /// Flattened `role: content` prompt string.
    PromptConcat,
    /// Doubly-encoded `f.req` form envelope.
    GeminiWeb,
}

/// How content is pulled out of a decoded stream frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaShape {
    /// `choices[0].delta` with `phase` (`think`/`answer`/`web_search`) and
    /// `status: finished` as the end marker.
    Phased,
    /// `{"type":"chat:completion","data":{phase, delta_content, edit_content}}`
    /// event envelope.
    ChatEvent,
    /// Each frame is a raw text fragment.
    RawText,
}

/// The full behavioral description of one backend.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub provider: Provider,
    pub base_url: String,
    pub completion_path: String,
    /// Thread-creation endpoint, for threaded providers only.
    pub new_chat_path: Option<String>,
    /// Live model-list endpoint; absent profiles use the static registry.
    pub models_path: Option<String>,
    pub auth: AuthScheme,
    pub framing: Framing,
    pub request_shape: RequestShape,
    pub delta_shape: DeltaShape,
    /// Server-side conversation threading via `chat_id` / `parent_id`.
    pub threaded: bool,
    /// Whether tool-call actions can be continued with a tool-result turn.
    pub tool_continuation: bool,
    /// Origin the remote expects browser traffic from, if it checks.
    pub web_origin: Option<String>,
}

const BROWSER_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";

impl ProviderProfile {
    /// Qwen web frontend: mined midtoken, SSE, server threading, tool
    /// continuation.
    pub fn qwen_web() -> Self {
        Self {
            provider: Provider::Alibaba,
            base_url: "https://chat.qwen.ai/api/v2".to_string(),
            completion_path: "/chat/completions".to_string(),
            new_chat_path: Some("/chats/new".to_string()),
            models_path: Some("/models".to_string()),
            auth: AuthScheme::MidToken,
            framing: Framing::Sse,
            request_shape: RequestShape::ThreadedWeb,
            delta_shape: DeltaShape::Phased,
            threaded: true,
            tool_continuation: true,
            web_origin: Some("https://chat.qwen.ai".to_string()),
        }
    }

    /// Zhipu web API: bearer key, SSE, stateless inline history.
    pub fn zhipu() -> Self {
        Self {
            provider: Provider::Zhipu,
            base_url: "https://chat.z.ai/api".to_string(),
            completion_path: "/chat/completions".to_string(),
            new_chat_path: None,
            models_path: Some("/models".to_string()),
            auth: AuthScheme::BearerKey,
            framing: Framing::Sse,
            request_shape: RequestShape::OpenAiStyle,
            delta_shape: DeltaShape::ChatEvent,
            threaded: false,
            tool_continuation: false,
            web_origin: None,
        }
    }

    /// Yqcloud: no auth, newline-delimited raw text, prompt concatenation.
    pub fn yqcloud() -> Self {
        Self {
            provider: Provider::Yqcloud,
            base_url: "https://api.binjie.fun/api".to_string(),
            completion_path: "/generateStream".to_string(),
            new_chat_path: None,
            models_path: None,
            auth: AuthScheme::None,
            framing: Framing::RawLines,
            request_shape: RequestShape::PromptConcat,
            delta_shape: DeltaShape::RawText,
            threaded: false,
            tool_continuation: false,
            web_origin: Some("https://chat9.yqcloud.top".to_string()),
        }
    }

    /// Gemini web frontend: session cookie plus page-mined access token,
    /// one batched form post per turn.
    pub fn gemini_web() -> Self {
        Self {
            provider: Provider::Google,
            base_url: "https://gemini.google.com".to_string(),
            completion_path:
                "/_/BardChatUi/data/assistant.lamda.BardFrontendService/StreamGenerate".to_string(),
            new_chat_path: None,
            models_path: None,
            auth: AuthScheme::CookieSession,
            framing: Framing::Batched,
            request_shape: RequestShape::GeminiWeb,
            delta_shape: DeltaShape::RawText,
            threaded: true,
            tool_continuation: false,
            web_origin: Some("https://gemini.google.com".to_string()),
        }
    }

    pub fn completion_url(&self, conversation_id: Option<&str>) -> String {
        match conversation_id {
            Some(id) if self.request_shape == RequestShape::ThreadedWeb => {
                format!("{}{}?chat_id={id}", self.base_url, self.completion_path)
            }
            _ => format!("{}{}", self.base_url, self.completion_path),
        }
    }

    /// Request headers for one call. Exact names and casing matter to the
    /// web frontends (`bx-umidtoken`, `bx-v`, `Source`).
    pub fn headers(
        &self,
        bearer: Option<&str>,
        midtoken: Option<&str>,
        cookie: Option<&str>,
        conversation_id: Option<&str>,
    ) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = Vec::new();
        let push = |headers: &mut Vec<(String, String)>, name: &str, value: String| {
            headers.push((name.to_string(), value));
        };

        match self.auth {
            AuthScheme::BearerKey => {
                if let Some(key) = bearer {
                    push(&mut headers, "Authorization", format!("Bearer {key}"));
                }
            }
            AuthScheme::MidToken => {
                // The web frontend sends a literal anonymous bearer.
                push(&mut headers, "Authorization", "Bearer".to_string());
                if let Some(token) = midtoken {
                    push(&mut headers, "bx-umidtoken", token.to_string());
                }
                push(&mut headers, "bx-v", "2.5.31".to_string());
            }
            AuthScheme::CookieSession => {
                if let Some(cookie) = cookie {
                    push(&mut headers, "Cookie", cookie.to_string());
                }
            }
            AuthScheme::None => {}
        }

        if let Some(origin) = &self.web_origin {
            push(&mut headers, "Accept", "*/*".to_string());
            push(&mut headers, "Accept-Language", "en-US,en;q=0.9".to_string());
            push(&mut headers, "Origin", origin.clone());
            push(&mut headers, "Sec-Fetch-Dest", "empty".to_string());
            push(&mut headers, "Sec-Fetch-Mode", "cors".to_string());
            push(&mut headers, "Sec-Fetch-Site", "same-origin".to_string());
            push(&mut headers, "User-Agent", BROWSER_UA.to_string());
            if self.auth == AuthScheme::MidToken {
                push(&mut headers, "Source", "web".to_string());
                let referer = match conversation_id {
                    Some(id) => format!("{origin}/c/{id}"),
                    None => format!("{origin}/"),
                };
                push(&mut headers, "Referer", referer);
            } else {
                push(&mut headers, "Referer", format!("{origin}/"));
            }
        }

        headers
    }
}
