//! # ai-chat-core
//!
//! Multi-provider AI chat orchestration core for an embedded IDE assistant.
//!
//! This crate sends user prompts to heterogeneous LLM backends — official
//! key-based APIs as well as reverse-engineered web endpoints — receives
//! streamed or batched completions, keeps cross-turn conversation continuity,
//! and normalizes the wildly different response shapes into one uniform
//! [`ParsedAction`] for the rest of the application.
//!
//! ## Core Philosophy
//!
//! - **Profiles, not provider classes**: every backend is described by a
//!   [`providers::ProviderProfile`] (endpoint, headers, auth scheme, framing,
//!   body/delta shapes); one adapter interprets them all.
//! - **Streaming-first**: Server-Sent Events and raw line-delimited streams
//!   are decoded into a unified frame stream off the caller's context.
//! - **Graceful degradation**: unexpected response shapes are demuxed down to
//!   plain text, never surfaced as turn-fatal errors.
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`transport`] | Streaming HTTP client and SSE / raw-line decoders |
//! | [`auth`] | Ephemeral anti-automation token lifecycle (mining, expiry, single-flight refresh) |
//! | [`types`] | Models, capabilities, conversation state, chat history, actions, tools |
//! | [`protocol`] | Provider payload construction (threaded and stateless shapes) |
//! | [`demux`] | Response classification into tool-call / plan / file-ops / text |
//! | [`providers`] | Provider profiles and the generic HTTP chat adapter |
//! | [`session`] | Orchestrator: adapter routing and the four-signal turn lifecycle |
//! | [`credentials`] | Per-provider credential lookup (keyring, env) |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_chat_core::session::{SessionOrchestrator, TurnObserver, TurnOptions};
//! use ai_chat_core::types::state::ConversationState;
//!
//! # async fn run(orchestrator: SessionOrchestrator, observer: std::sync::Arc<dyn TurnObserver>) -> ai_chat_core::Result<()> {
//! let model = orchestrator.registry().by_id("qwen3-coder-plus").expect("known model");
//! let mut state = ConversationState::new();
//! orchestrator
//!     .send_turn(
//!         TurnOptions::user_text(&model, "Create index.html"),
//!         &mut state,
//!         observer,
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod credentials;
pub mod demux;
pub mod protocol;
pub mod providers;
pub mod session;
pub mod transport;
pub mod types;

pub mod error;
pub use error::Error;

// Re-export the main types for convenience
pub use demux::Demuxed;
pub use session::{SessionOrchestrator, TurnObserver, TurnOptions, TurnOutcome};
pub use types::{
    action::{FileOperation, ParsedAction},
    model::{AiModel, ModelCapabilities, Provider},
    state::ConversationState,
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;
