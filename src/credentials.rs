//! Per-provider credential lookup.
//!
//! Providers that need a bearer key or a session cookie resolve it through
//! this port. The default implementation checks the OS keyring first and
//! falls back to a `{PROVIDER}_API_KEY` environment variable, so desktop and
//! CI environments both work without configuration code.

use std::collections::HashMap;
use std::env;
use std::sync::Mutex;

use keyring::Entry;

use crate::types::model::Provider;

pub trait CredentialStore: Send + Sync {
    /// The provider's API key or session cookie value, if configured.
    fn credential(&self, provider: Provider) -> Option<String>;
}

/// Keyring-backed store with environment fallback.
pub struct KeyringCredentials {
    service: String,
}

impl KeyringCredentials {
    pub fn new() -> Self {
        Self {
            service: "ai-chat-core".to_string(),
        }
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

impl Default for KeyringCredentials {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringCredentials {
    fn credential(&self, provider: Provider) -> Option<String> {
        let id = provider.credential_id();

        // 1. Try keyring
        if let Ok(entry) = Entry::new(&self.service, id) {
            if let Ok(key) = entry.get_password() {
                if !key.is_empty() {
                    return Some(key);
                }
            }
        }

        // 2. Try environment variable (PROVIDER_API_KEY)
        let env_var = format!("{}_API_KEY", id.to_uppercase());
        env::var(env_var).ok().filter(|v| !v.is_empty())
    }
}

/// In-memory store for tests and embedded configuration.
#[derive(Default)]
pub struct StaticCredentials {
    values: Mutex<HashMap<Provider, String>>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, provider: Provider, value: impl Into<String>) {
        self.values
            .lock()
            .expect("credential map poisoned")
            .insert(provider, value.into());
    }
}

impl CredentialStore for StaticCredentials {
    fn credential(&self, provider: Provider) -> Option<String> {
        self.values
            .lock()
            .expect("credential map poisoned")
            .get(&provider)
            .cloned()
    }
}
