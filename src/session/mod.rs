//! Turn orchestration: adapter routing and the four-signal lifecycle.
//!
//! [`SessionOrchestrator`] owns one adapter per provider and a shared model
//! registry. Every turn emits the same observable sequence regardless of
//! backend: `on_request_started`, zero or more `on_stream_update` calls in
//! receipt order, `on_request_completed`, then exactly one terminal signal —
//! `on_actions_processed` with the normalized outcome, or `on_error` with a
//! message. Callers drive one turn at a time per [`ConversationState`];
//! concurrent turns against the same state are a caller bug, not something
//! the core serializes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info};

use crate::demux::Demuxed;
use crate::protocol::ToolResult;
use crate::providers::{default_adapters, ProviderAdapter};
use crate::types::action::{ParsedAction, WebSource};
use crate::types::message::ChatMessage;
use crate::types::model::{AiModel, ModelRegistry, Provider, SharedRegistry};
use crate::types::state::ConversationState;
use crate::types::tool::ToolSpec;
use crate::{Error, Result};

/// Which stream a partial update belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamChannel {
    /// Model reasoning, displayed separately from the answer.
    Thinking,
    /// Answer text proper.
    Answer,
}

/// Receives turn lifecycle signals. All methods default to no-ops so
/// observers implement only what they render.
pub trait TurnObserver: Send + Sync {
    fn on_request_started(&self) {}
    /// Cumulative text for the channel so far, in receipt order.
    fn on_stream_update(&self, _channel: StreamChannel, _text: &str) {}
    fn on_request_completed(&self) {}
    /// Terminal success signal, at most once per turn.
    fn on_actions_processed(&self, _outcome: &TurnOutcome) {}
    /// Terminal failure signal, at most once per turn.
    fn on_error(&self, _message: &str) {}
    /// Server metadata assigned or advanced the conversation ids; persist now.
    fn on_state_updated(&self, _state: &ConversationState) {}
}

/// What to send this turn.
#[derive(Debug, Clone)]
pub enum TurnInput {
    UserText(String),
    /// Executed tool results for a continuation turn.
    ToolResults(Vec<ToolResult>),
}

/// Everything an adapter needs to run one turn.
#[derive(Debug, Clone)]
pub struct TurnOptions {
    pub model: AiModel,
    pub input: TurnInput,
    /// Prior history, used only by stateless providers.
    pub history: Vec<ChatMessage>,
    pub thinking: bool,
    pub web_search: bool,
    pub tools: Vec<ToolSpec>,
}

impl TurnOptions {
    pub fn user_text(model: &AiModel, text: impl Into<String>) -> Self {
        Self {
            model: model.clone(),
            input: TurnInput::UserText(text.into()),
            history: Vec::new(),
            thinking: false,
            web_search: false,
            tools: Vec::new(),
        }
    }

    pub fn tool_results(model: &AiModel, results: Vec<ToolResult>) -> Self {
        Self {
            model: model.clone(),
            input: TurnInput::ToolResults(results),
            history: Vec::new(),
            thinking: false,
            web_search: false,
            tools: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_thinking(mut self, thinking: bool) -> Self {
        self.thinking = thinking;
        self
    }

    pub fn with_web_search(mut self, web_search: bool) -> Self {
        self.web_search = web_search;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }
}

/// The normalized result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub action: ParsedAction,
    pub explanation: String,
    /// Full raw stream transcript, for caching and diagnostics.
    pub raw_transcript: String,
    /// Accumulated thinking text, empty when the model emitted none.
    pub thinking: String,
    /// Web citations harvested during the turn, deduplicated by URL.
    pub web_sources: Vec<WebSource>,
}

impl TurnOutcome {
    pub(crate) fn from_demuxed(
        demuxed: Demuxed,
        raw_transcript: String,
        thinking: String,
        web_sources: Vec<WebSource>,
    ) -> Self {
        Self {
            action: demuxed.action,
            explanation: demuxed.explanation,
            raw_transcript,
            thinking,
            web_sources,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnPhase {
    Idle,
    Sending,
    Streaming,
    Completing,
    Errored,
}

/// Routes turns to the provider adapter for the requested model and enforces
/// the signal contract around whatever the adapter does.
pub struct SessionOrchestrator {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
    registry: SharedRegistry,
    phase: Mutex<TurnPhase>,
}

impl SessionOrchestrator {
    /// Orchestrator over the built-in provider profiles and seed registry.
    pub fn new() -> Result<Self> {
        Ok(Self::with_adapters(
            default_adapters()?,
            Arc::new(ModelRegistry::with_defaults()),
        ))
    }

    pub fn with_adapters(
        adapters: Vec<Arc<dyn ProviderAdapter>>,
        registry: SharedRegistry,
    ) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.provider(), adapter))
            .collect();
        Self {
            adapters,
            registry,
            phase: Mutex::new(TurnPhase::Idle),
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Run one turn end to end, emitting the full signal sequence on
    /// `observer`. Returns the outcome that was also delivered through
    /// `on_actions_processed`, or the error delivered through `on_error`.
    pub async fn send_turn(
        &self,
        options: TurnOptions,
        state: &mut ConversationState,
        observer: Arc<dyn TurnObserver>,
    ) -> Result<TurnOutcome> {
        let adapter = self.adapter_for(options.model.provider)?;

        self.set_phase(TurnPhase::Sending);
        observer.on_request_started();
        debug!(model = %options.model.id, provider = ?options.model.provider, "turn started");

        let bridge = PhaseTrackingObserver {
            inner: observer.clone(),
            phase: &self.phase,
        };
        let result = adapter.send_turn(&options, state, &bridge).await;

        self.set_phase(TurnPhase::Completing);
        observer.on_request_completed();

        match result {
            Ok(outcome) => {
                observer.on_actions_processed(&outcome);
                self.set_phase(TurnPhase::Idle);
                info!(model = %options.model.id, "turn completed");
                Ok(outcome)
            }
            Err(e) => {
                observer.on_error(&e.to_string());
                self.set_phase(TurnPhase::Errored);
                self.set_phase(TurnPhase::Idle);
                error!(model = %options.model.id, error = %e, "turn failed");
                Err(e)
            }
        }
    }

    /// Continuation turn delivering executed tool results back to the model.
    pub async fn send_tool_results(
        &self,
        model: &AiModel,
        results: Vec<ToolResult>,
        state: &mut ConversationState,
        observer: Arc<dyn TurnObserver>,
    ) -> Result<TurnOutcome> {
        self.send_turn(TurnOptions::tool_results(model, results), state, observer)
            .await
    }

    /// Fetch the provider's live model list and swap it into the registry
    /// atomically. Independent of any in-flight turn; failure leaves the
    /// registry untouched.
    pub async fn refresh_models(&self, provider: Provider) -> Result<usize> {
        let adapter = self.adapter_for(provider)?;
        let models = adapter.list_models().await?;
        let count = models.len();
        self.registry.replace_provider(provider, models);
        info!(?provider, count, "model registry refreshed");
        Ok(count)
    }

    fn adapter_for(&self, provider: Provider) -> Result<&Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).ok_or_else(|| {
            Error::Conversation(format!(
                "no adapter configured for provider {}",
                provider.display_name()
            ))
        })
    }

    fn set_phase(&self, phase: TurnPhase) {
        *self.phase.lock().expect("phase lock poisoned") = phase;
    }
}

/// Forwards adapter-side signals and flips the phase to `Streaming` on the
/// first partial update.
struct PhaseTrackingObserver<'a> {
    inner: Arc<dyn TurnObserver>,
    phase: &'a Mutex<TurnPhase>,
}

impl TurnObserver for PhaseTrackingObserver<'_> {
    fn on_stream_update(&self, channel: StreamChannel, text: &str) {
        *self.phase.lock().expect("phase lock poisoned") = TurnPhase::Streaming;
        self.inner.on_stream_update(channel, text);
    }

    fn on_state_updated(&self, state: &ConversationState) {
        self.inner.on_state_updated(state);
    }
}
