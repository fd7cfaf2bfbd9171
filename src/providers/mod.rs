//! Provider integration layer.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`profile`] | Per-backend behavior described as data |
//! | [`adapter`] | The generic HTTP chat adapter interpreting profiles |

pub mod adapter;
pub mod profile;

use std::env;
use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::{FileTokenStore, MidTokenConfig, MidTokenManager};
use crate::credentials::KeyringCredentials;
use crate::session::{TurnObserver, TurnOptions, TurnOutcome};
use crate::transport::HttpTransport;
use crate::types::model::{AiModel, Provider};
use crate::types::state::ConversationState;
use crate::Result;

pub use adapter::HttpChatAdapter;
pub use profile::{AuthScheme, DeltaShape, Framing, ProviderProfile, RequestShape};

/// One provider backend as seen by the orchestrator.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Run one turn: authenticate, send, accumulate the stream, classify.
    /// Stream updates and state updates flow through `observer`; lifecycle
    /// signals are the orchestrator's job.
    async fn send_turn(
        &self,
        options: &TurnOptions,
        state: &mut ConversationState,
        observer: &dyn TurnObserver,
    ) -> Result<TurnOutcome>;

    /// Live model list, for providers that publish one.
    async fn list_models(&self) -> Result<Vec<AiModel>>;
}

/// Adapters for all built-in profiles, sharing one transport, the keyring
/// credential store, and a file-persisted midtoken.
pub fn default_adapters() -> Result<Vec<Arc<dyn ProviderAdapter>>> {
    let transport = Arc::new(HttpTransport::new()?);
    let credentials = Arc::new(KeyringCredentials::new());

    let token_path = env::var("AI_MIDTOKEN_CACHE")
        .map(Into::into)
        .unwrap_or_else(|_| env::temp_dir().join("ai-chat-core-midtoken.json"));
    let midtoken = Arc::new(MidTokenManager::new(
        transport.clone(),
        Arc::new(FileTokenStore::new(token_path)),
        MidTokenConfig::default(),
    ));

    Ok(vec![
        Arc::new(
            HttpChatAdapter::new(
                ProviderProfile::qwen_web(),
                transport.clone(),
                credentials.clone(),
            )
            .with_midtoken(midtoken),
        ),
        Arc::new(HttpChatAdapter::new(
            ProviderProfile::zhipu(),
            transport.clone(),
            credentials.clone(),
        )),
        Arc::new(HttpChatAdapter::new(
            ProviderProfile::yqcloud(),
            transport.clone(),
            credentials.clone(),
        )),
        Arc::new(HttpChatAdapter::new(
            ProviderProfile::gemini_web(),
            transport,
            credentials,
        )),
    ])
}
