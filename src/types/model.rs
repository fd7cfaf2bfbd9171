//! Model identities, capability flags and the shared model registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

/// Backend a model is served by. Routing key for adapter selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    /// Official Gemini web endpoint driven by session cookies.
    Google,
    /// Qwen chat web API (midtoken-gated, threaded conversations).
    Alibaba,
    /// Official GLM API with bearer-key auth.
    Zhipu,
    /// Keyless free endpoint streaming raw text.
    Yqcloud,
}

impl Provider {
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Google => "Google",
            Provider::Alibaba => "Alibaba",
            Provider::Zhipu => "Zhipu",
            Provider::Yqcloud => "Yqcloud",
        }
    }

    /// Identifier used for credential lookup (`{ID}_API_KEY`, keyring entry).
    pub fn credential_id(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Alibaba => "alibaba",
            Provider::Zhipu => "zhipu",
            Provider::Yqcloud => "yqcloud",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Capability flags and context limits for a model. Immutable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelCapabilities {
    pub streaming: bool,
    pub thinking: bool,
    pub web_search: bool,
    pub function_calling: bool,
    pub vision: bool,
    /// Maximum input context length in tokens (0 = unknown).
    #[serde(default)]
    pub max_context_tokens: u64,
    /// Maximum generation length in tokens (0 = unknown).
    #[serde(default)]
    pub max_generation_tokens: u64,
}

/// An entry in the model registry. Immutable and cheap to clone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiModel {
    pub id: String,
    pub display_name: String,
    pub provider: Provider,
    pub capabilities: ModelCapabilities,
}

impl AiModel {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        provider: Provider,
        capabilities: ModelCapabilities,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            provider,
            capabilities,
        }
    }
}

fn caps(
    streaming: bool,
    thinking: bool,
    web_search: bool,
    function_calling: bool,
    vision: bool,
    max_context_tokens: u64,
    max_generation_tokens: u64,
) -> ModelCapabilities {
    ModelCapabilities {
        streaming,
        thinking,
        web_search,
        function_calling,
        vision,
        max_context_tokens,
        max_generation_tokens,
    }
}

fn seed_models() -> HashMap<Provider, Vec<AiModel>> {
    let mut map: HashMap<Provider, Vec<AiModel>> = HashMap::new();

    map.insert(
        Provider::Alibaba,
        vec![
            AiModel::new(
                "qwen3-coder-plus",
                "Qwen3-Coder",
                Provider::Alibaba,
                caps(true, false, false, true, true, 1_048_576, 65_536),
            ),
            AiModel::new(
                "qwen3-235b-a22b",
                "Qwen3-235B-A22B",
                Provider::Alibaba,
                caps(true, true, true, true, true, 131_072, 38_912),
            ),
            AiModel::new(
                "qwen3-32b",
                "Qwen3-32B",
                Provider::Alibaba,
                caps(true, true, true, true, true, 131_072, 38_912),
            ),
            AiModel::new(
                "qwen-max-latest",
                "Qwen2.5-Max",
                Provider::Alibaba,
                caps(true, true, true, true, true, 131_072, 8_192),
            ),
        ],
    );

    map.insert(
        Provider::Google,
        vec![
            AiModel::new(
                "gemini-2.5-flash",
                "Gemini 2.5 Flash",
                Provider::Google,
                caps(false, true, true, false, true, 1_048_576, 8_192),
            ),
            AiModel::new(
                "gemini-2.5-pro",
                "Gemini 2.5 Pro",
                Provider::Google,
                caps(false, true, true, false, true, 2_097_152, 8_192),
            ),
        ],
    );

    map.insert(
        Provider::Zhipu,
        vec![
            AiModel::new(
                "glm-4-plus",
                "GLM-4-Plus",
                Provider::Zhipu,
                caps(true, true, false, false, false, 128_000, 4_096),
            ),
            AiModel::new(
                "glm-4-flash",
                "GLM-4-Flash",
                Provider::Zhipu,
                caps(true, false, false, false, false, 128_000, 4_096),
            ),
        ],
    );

    map.insert(
        Provider::Yqcloud,
        vec![AiModel::new(
            "gpt-4",
            "GPT-4 (Yqcloud)",
            Provider::Yqcloud,
            caps(true, false, false, false, false, 8_192, 4_096),
        )],
    );

    map
}

/// Shared read-mostly model registry.
///
/// Reads are lock-free; a model-list refresh atomically replaces a single
/// provider's list without disturbing concurrent lookups.
pub struct ModelRegistry {
    by_provider: ArcSwap<HashMap<Provider, Vec<AiModel>>>,
}

impl ModelRegistry {
    /// Registry pre-populated with the built-in model set.
    pub fn with_defaults() -> Self {
        Self {
            by_provider: ArcSwap::from_pointee(seed_models()),
        }
    }

    pub fn empty() -> Self {
        Self {
            by_provider: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    pub fn by_id(&self, id: &str) -> Option<AiModel> {
        self.by_provider
            .load()
            .values()
            .flatten()
            .find(|m| m.id == id)
            .cloned()
    }

    pub fn by_display_name(&self, name: &str) -> Option<AiModel> {
        self.by_provider
            .load()
            .values()
            .flatten()
            .find(|m| m.display_name == name)
            .cloned()
    }

    pub fn models_for(&self, provider: Provider) -> Vec<AiModel> {
        self.by_provider
            .load()
            .get(&provider)
            .cloned()
            .unwrap_or_default()
    }

    pub fn all(&self) -> Vec<AiModel> {
        self.by_provider.load().values().flatten().cloned().collect()
    }

    /// Atomically replace one provider's model list (model refresh).
    pub fn replace_provider(&self, provider: Provider, models: Vec<AiModel>) {
        self.by_provider.rcu(|current| {
            let mut next: HashMap<Provider, Vec<AiModel>> = (**current).clone();
            next.insert(provider, models.clone());
            next
        });
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Convenience shared handle.
pub type SharedRegistry = Arc<ModelRegistry>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_resolves_by_id_and_display_name() {
        let reg = ModelRegistry::with_defaults();
        let m = reg.by_id("qwen3-coder-plus").unwrap();
        assert_eq!(m.provider, Provider::Alibaba);
        assert!(m.capabilities.function_calling);
        assert!(reg.by_display_name("GLM-4-Plus").is_some());
        assert!(reg.by_id("no-such-model").is_none());
    }

    #[test]
    fn replace_provider_swaps_one_list_only() {
        let reg = ModelRegistry::with_defaults();
        let before_google = reg.models_for(Provider::Google).len();
        reg.replace_provider(
            Provider::Alibaba,
            vec![AiModel::new(
                "qwen-next",
                "Qwen Next",
                Provider::Alibaba,
                ModelCapabilities::default(),
            )],
        );
        assert_eq!(reg.models_for(Provider::Alibaba).len(), 1);
        assert_eq!(reg.models_for(Provider::Google).len(), before_google);
        assert!(reg.by_id("qwen3-coder-plus").is_none());
    }
}
