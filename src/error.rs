use thiserror::Error;

use crate::transport::TransportError;
use crate::types::model::Provider;

/// Unified error type for the chat orchestration core.
///
/// Aggregates the low-level failure modes into the categories that matter to
/// callers: transport failures and auth/token problems terminate a turn,
/// while response-shape mismatches are absorbed by the demuxer and never
/// surface here (see [`crate::demux`]).
#[derive(Debug, Error)]
pub enum Error {
    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    /// A required credential (API key, session cookie) is missing or empty.
    /// Raised before any network call is made.
    #[error("Missing credential for {provider}: {message}")]
    Auth { provider: Provider, message: String },

    /// The anti-automation token could not be mined or refreshed.
    #[error("Token acquisition failed: {0}")]
    TokenAcquisition(String),

    /// The provider refused to open a threaded conversation.
    #[error("Conversation error: {0}")]
    Conversation(String),

    /// A `searchAndReplace` operation carried a pattern that is not valid
    /// regex. Reported distinctly so the caller never applies it literally.
    #[error("Invalid regex pattern {pattern:?}: {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when this error is a read timeout on an open connection. The
    /// streaming layer treats such timeouts as graceful completion once any
    /// bytes were received.
    pub fn is_read_timeout(&self) -> bool {
        match self {
            Error::Transport(TransportError::Http(e)) => e.is_timeout(),
            _ => false,
        }
    }

    pub(crate) fn auth(provider: Provider, message: impl Into<String>) -> Self {
        Error::Auth {
            provider,
            message: message.into(),
        }
    }
}
