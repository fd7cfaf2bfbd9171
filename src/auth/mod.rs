//! Anti-bot "midtoken" lifecycle for the Alibaba web endpoints.
//!
//! The token is mined out of a public JavaScript bundle, reused for a bounded
//! number of requests and a bounded wall-clock age, and refreshed in place
//! when either limit is reached. All acquisition goes through a single-flight
//! guard: concurrent callers that find no usable token wait on one fetch
//! instead of racing. Successfully mined tokens are persisted through a
//! [`TokenStore`] so a restart can reuse a still-fresh token.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::transport::HttpTransport;
use crate::types::message::now_millis;
use crate::{Error, Result};

/// Both obfuscated callback names the bundle has been observed to use.
static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:umx\.wu|__fycb)\('([^']+)'\)").expect("token pattern"));

/// Tuning knobs for the token lifecycle.
#[derive(Debug, Clone)]
pub struct MidTokenConfig {
    /// URL of the script the token is mined from.
    pub endpoint: String,
    /// A token is refreshed on the call that would reach this use count.
    pub max_uses: u32,
    /// A token older than this is refreshed regardless of use count.
    pub max_age: Duration,
}

impl Default for MidTokenConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://sg-wum.alibaba.com/w/wu.json".to_string(),
            max_uses: 20,
            max_age: Duration::from_secs(300),
        }
    }
}

/// Token value plus acquisition time, as written to a [`TokenStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedToken {
    pub value: String,
    /// Epoch milliseconds at acquisition.
    pub acquired_at_ms: u64,
}

/// Persistence port for mined tokens. Implementations must tolerate missing
/// or corrupt data by returning `None` from `load`.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<PersistedToken>;
    fn save(&self, token: &PersistedToken);
    fn clear(&self);
}

/// JSON-file-backed store. Write failures are logged and swallowed; a lost
/// persistence write only costs one extra mining round-trip later.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<PersistedToken> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    fn save(&self, token: &PersistedToken) {
        let json = match serde_json::to_string(token) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize token for persistence");
                return;
            }
        };
        if let Err(e) = std::fs::write(&self.path, json) {
            warn!(path = %self.path.display(), error = %e, "failed to persist token");
        }
    }

    fn clear(&self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// No-op store for callers that do not want cross-restart reuse.
pub struct NullTokenStore;

impl TokenStore for NullTokenStore {
    fn load(&self) -> Option<PersistedToken> {
        None
    }
    fn save(&self, _token: &PersistedToken) {}
    fn clear(&self) {}
}

#[derive(Default)]
struct TokenState {
    value: Option<String>,
    acquired_at_ms: u64,
    use_count: u32,
    loaded_from_store: bool,
}

/// Single-flight manager for the mined anti-bot token.
pub struct MidTokenManager {
    transport: Arc<HttpTransport>,
    store: Arc<dyn TokenStore>,
    config: MidTokenConfig,
    // Held across the network fetch: that is the single-flight guarantee.
    state: Mutex<TokenState>,
}

impl MidTokenManager {
    pub fn new(
        transport: Arc<HttpTransport>,
        store: Arc<dyn TokenStore>,
        config: MidTokenConfig,
    ) -> Self {
        Self {
            transport,
            store,
            config,
            state: Mutex::new(TokenState::default()),
        }
    }

    /// A usable token value, refreshing first if forced, expired by age, or
    /// about to exceed the use cap. Every successful return counts as one
    /// use of the returned token.
    pub async fn ensure_token(&self, force_refresh: bool) -> Result<String> {
        let mut state = self.state.lock().await;

        if !force_refresh {
            if state.value.is_none() && !state.loaded_from_store {
                state.loaded_from_store = true;
                if let Some(persisted) = self.store.load() {
                    debug!("adopted persisted token");
                    state.acquired_at_ms = persisted.acquired_at_ms;
                    state.value = Some(persisted.value);
                    state.use_count = 0;
                }
            }

            if let Some(value) = state.value.clone() {
                let would_be = state.use_count + 1;
                let age = Duration::from_millis(now_millis().saturating_sub(state.acquired_at_ms));
                if would_be < self.config.max_uses && age < self.config.max_age {
                    state.use_count = would_be;
                    return Ok(value);
                }
                debug!(
                    uses = state.use_count,
                    age_ms = age.as_millis() as u64,
                    "token expired, refreshing"
                );
            }
        }

        let value = self.fetch_token().await?;
        let acquired_at_ms = now_millis();
        self.store.save(&PersistedToken {
            value: value.clone(),
            acquired_at_ms,
        });
        state.value = Some(value.clone());
        state.acquired_at_ms = acquired_at_ms;
        state.use_count = 1;
        info!("acquired fresh midtoken");
        Ok(value)
    }

    /// Drop the cached token and its persisted copy. The next
    /// [`ensure_token`](Self::ensure_token) call mines a fresh one.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        state.value = None;
        state.use_count = 0;
        self.store.clear();
    }

    async fn fetch_token(&self) -> Result<String> {
        let body = self
            .transport
            .get_text(&self.config.endpoint, &[])
            .await
            .map_err(|e| Error::TokenAcquisition(format!("token endpoint unreachable: {e}")))?;

        TOKEN_PATTERN
            .captures(&body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| {
                Error::TokenAcquisition("token callback not found in script body".to_string())
            })
    }
}
