//! Per-session thread-continuity state for providers with server-assigned
//! conversation threading.

use serde::{Deserialize, Serialize};

/// Mutable, caller-owned continuity data for a threaded conversation.
///
/// `last_parent_id` becomes non-`None` only after at least one successful
/// threaded turn; the core updates both fields in place from response
/// metadata and never persists them itself (the caller does, using the JSON
/// form `{conversationId, lastParentId}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub conversation_id: Option<String>,
    pub last_parent_id: Option<String>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True before the first threaded turn of a conversation.
    pub fn is_fresh(&self) -> bool {
        self.last_parent_id.is_none()
    }

    /// Explicit reset: the next turn starts a new server-side conversation.
    pub fn reset(&mut self) {
        self.conversation_id = None;
        self.last_parent_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_preserves_fields() {
        let state = ConversationState {
            conversation_id: Some("c-123".into()),
            last_parent_id: Some("p-456".into()),
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("conversationId"));
        assert!(json.contains("lastParentId"));
        let back: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn empty_state_round_trips_as_nulls() {
        let json = serde_json::to_string(&ConversationState::new()).unwrap();
        let back: ConversationState = serde_json::from_str(&json).unwrap();
        assert!(back.is_fresh());
        assert_eq!(back, ConversationState::new());
    }
}
