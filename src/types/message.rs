//! Chat history entries passed through adapters when building payloads.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// One entry of the ordered, caller-owned chat history.
///
/// History is append-only except for a transient status placeholder the UI
/// may replace in place while a turn is streaming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: Sender,
    pub content: String,
    /// Epoch milliseconds.
    pub timestamp: u64,
    /// Marks a placeholder entry that may be replaced in place.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub transient: bool,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            content: content.into(),
            timestamp: now_millis(),
            transient: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            content: content.into(),
            timestamp: now_millis(),
            transient: false,
        }
    }

    /// A status placeholder ("Thinking…") that the UI swaps out later.
    pub fn placeholder(content: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            content: content.into(),
            timestamp: now_millis(),
            transient: true,
        }
    }

    /// Replace a transient placeholder's content in place, clearing the flag.
    pub fn resolve(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.transient = false;
    }

    pub fn role_str(&self) -> &'static str {
        match self.sender {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
