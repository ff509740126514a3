//! Pure message/session store
//!
//! All conversation-view state changes go through `reduce(state, action)`:
//! a pure, synchronous function with no IO and no scheduling. `Store` wraps
//! it for shared use with lock-free snapshot reads.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parlance_protocol::{Message, MessageChanges};
use tracing::trace;

// ---------------------------------------------------------------------------
// StoreState: pure data snapshot of the loaded conversation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    pub messages: Vec<Message>,
    pub current_session_id: Option<String>,
    pub is_loading: bool,
    pub is_loading_history: bool,
    pub is_typing: bool,
    pub partial_text: String,
    pub error: Option<String>,
}

impl StoreState {
    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }
}

// ---------------------------------------------------------------------------
// Action: one variant per state change
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetMessages(Vec<Message>),
    AppendMessage(Message),
    PatchMessage {
        message_id: String,
        changes: MessageChanges,
    },
    RemoveMessage {
        message_id: String,
    },
    SetCurrentSession(Option<String>),
    SetLoading(bool),
    SetLoadingHistory(bool),
    /// Turning typing off also drops any partial text.
    SetTyping(bool),
    SetPartialText(String),
    /// Setting an error forces loading and typing off.
    SetError(Option<String>),
    Reset,
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Action::SetMessages(_) => "set_messages",
            Action::AppendMessage(_) => "append_message",
            Action::PatchMessage { .. } => "patch_message",
            Action::RemoveMessage { .. } => "remove_message",
            Action::SetCurrentSession(_) => "set_current_session",
            Action::SetLoading(_) => "set_loading",
            Action::SetLoadingHistory(_) => "set_loading_history",
            Action::SetTyping(_) => "set_typing",
            Action::SetPartialText(_) => "set_partial_text",
            Action::SetError(_) => "set_error",
            Action::Reset => "reset",
        }
    }
}

// ---------------------------------------------------------------------------
// reduce(): the pure core
// ---------------------------------------------------------------------------

/// Pure, synchronous state transition.
pub fn reduce(mut state: StoreState, action: Action) -> StoreState {
    match action {
        Action::SetMessages(messages) => {
            state.messages = messages;
        }

        Action::AppendMessage(message) => {
            state.messages.push(message);
        }

        Action::PatchMessage {
            message_id,
            changes,
        } => {
            if let Some(msg) = state.messages.iter_mut().find(|m| m.id == message_id) {
                if let Some(content) = changes.content {
                    msg.content = content;
                }
                if let Some(is_edited) = changes.is_edited {
                    msg.is_edited = is_edited;
                }
                if let Some(reactions) = changes.reactions {
                    msg.reactions = Some(reactions);
                }
                if let Some(metadata) = changes.metadata {
                    msg.metadata = Some(metadata);
                }
            }
        }

        Action::RemoveMessage { message_id } => {
            state.messages.retain(|m| m.id != message_id);
        }

        Action::SetCurrentSession(session_id) => {
            state.current_session_id = session_id;
        }

        Action::SetLoading(loading) => {
            state.is_loading = loading;
        }

        Action::SetLoadingHistory(loading) => {
            state.is_loading_history = loading;
        }

        Action::SetTyping(typing) => {
            state.is_typing = typing;
            if !typing {
                state.partial_text.clear();
            }
        }

        Action::SetPartialText(text) => {
            state.partial_text = text;
        }

        Action::SetError(error) => {
            if error.is_some() {
                state.is_loading = false;
                state.is_typing = false;
                state.partial_text.clear();
            }
            state.error = error;
        }

        Action::Reset => {
            state = StoreState::default();
        }
    }

    state
}

// ---------------------------------------------------------------------------
// Store: shared handle
// ---------------------------------------------------------------------------

/// Shared handle to the conversation state (cheap to Clone).
///
/// Writers go through `dispatch`, which applies `reduce` as an atomic
/// read-copy-update. Readers take an `Arc` snapshot without locking.
#[derive(Clone, Default)]
pub struct Store {
    state: Arc<ArcSwap<StoreState>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatch(&self, action: Action) {
        trace!(
            component = "store",
            event = "store.dispatch",
            action = action.name(),
        );
        self.state
            .rcu(|current| reduce(StoreState::clone(current), action.clone()));
    }

    /// Lock-free snapshot read.
    pub fn snapshot(&self) -> Arc<StoreState> {
        self.state.load_full()
    }

    pub fn current_session_id(&self) -> Option<String> {
        self.state.load().current_session_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlance_protocol::MessageRole;

    fn test_message(id: &str, role: MessageRole, content: &str) -> Message {
        Message {
            id: id.to_string(),
            role,
            content: content.to_string(),
            created_at: "2025-01-01T00:00:00".to_string(),
            attachments: vec![],
            reactions: None,
            parent_message_id: None,
            branch_id: None,
            is_edited: false,
            metadata: None,
        }
    }

    fn busy_state() -> StoreState {
        StoreState {
            messages: vec![test_message("m1", MessageRole::User, "hello")],
            current_session_id: Some("s1".to_string()),
            is_loading: true,
            is_loading_history: true,
            is_typing: true,
            partial_text: "partial".to_string(),
            error: Some("boom".to_string()),
        }
    }

    fn all_actions() -> Vec<Action> {
        vec![
            Action::SetMessages(vec![test_message("m2", MessageRole::Assistant, "hi")]),
            Action::AppendMessage(test_message("m3", MessageRole::User, "again")),
            Action::PatchMessage {
                message_id: "m3".to_string(),
                changes: MessageChanges {
                    content: Some("edited".to_string()),
                    ..Default::default()
                },
            },
            Action::RemoveMessage {
                message_id: "m2".to_string(),
            },
            Action::SetCurrentSession(Some("s9".to_string())),
            Action::SetLoading(true),
            Action::SetLoadingHistory(true),
            Action::SetTyping(true),
            Action::SetPartialText("Hel".to_string()),
            Action::SetError(Some("bad".to_string())),
        ]
    }

    #[test]
    fn reset_restores_initial_shape_from_any_prefix() {
        let actions = all_actions();
        for len in 0..=actions.len() {
            let state = actions[..len]
                .iter()
                .cloned()
                .fold(busy_state(), reduce);
            let reset = reduce(state, Action::Reset);
            assert_eq!(reset, StoreState::default());
            assert!(reset.messages.is_empty());
            assert!(reset.current_session_id.is_none());
            assert!(!reset.is_loading && !reset.is_loading_history && !reset.is_typing);
            assert!(reset.partial_text.is_empty());
            assert!(reset.error.is_none());

            // Reset is idempotent
            assert_eq!(reduce(reset, Action::Reset), StoreState::default());
        }
    }

    #[test]
    fn typing_off_always_clears_partial_text() {
        for partial in ["", "H", "Hello, world", "multi\nline ✓"] {
            let state = StoreState {
                is_typing: true,
                partial_text: partial.to_string(),
                ..Default::default()
            };
            let next = reduce(state, Action::SetTyping(false));
            assert!(!next.is_typing);
            assert!(next.partial_text.is_empty());
        }
    }

    #[test]
    fn typing_on_keeps_partial_text() {
        let state = StoreState {
            partial_text: "Hel".to_string(),
            ..Default::default()
        };
        let next = reduce(state, Action::SetTyping(true));
        assert!(next.is_typing);
        assert_eq!(next.partial_text, "Hel");
    }

    #[test]
    fn set_error_forces_flags_off() {
        let next = reduce(busy_state(), Action::SetError(Some("network down".to_string())));
        assert_eq!(next.error.as_deref(), Some("network down"));
        assert!(!next.is_loading);
        assert!(!next.is_typing);
        assert!(next.partial_text.is_empty());
        // Session and messages are untouched
        assert_eq!(next.current_session_id.as_deref(), Some("s1"));
        assert_eq!(next.messages.len(), 1);
    }

    #[test]
    fn clearing_error_leaves_flags_alone() {
        let next = reduce(busy_state(), Action::SetError(None));
        assert!(next.error.is_none());
        assert!(next.is_loading);
        assert!(next.is_typing);
    }

    #[test]
    fn set_messages_replaces_without_merge() {
        let next = reduce(
            busy_state(),
            Action::SetMessages(vec![test_message("m9", MessageRole::Assistant, "fresh")]),
        );
        assert_eq!(next.messages.len(), 1);
        assert_eq!(next.messages[0].id, "m9");
    }

    #[test]
    fn patch_and_remove_ignore_unknown_ids() {
        let state = busy_state();
        let patched = reduce(
            state.clone(),
            Action::PatchMessage {
                message_id: "nope".to_string(),
                changes: MessageChanges {
                    content: Some("x".to_string()),
                    ..Default::default()
                },
            },
        );
        assert_eq!(patched, state);

        let removed = reduce(
            state.clone(),
            Action::RemoveMessage {
                message_id: "nope".to_string(),
            },
        );
        assert_eq!(removed, state);
    }

    #[test]
    fn patch_updates_only_given_fields() {
        let mut reactions = parlance_protocol::Reactions::new();
        reactions.insert("like".to_string(), 2);

        let next = reduce(
            busy_state(),
            Action::PatchMessage {
                message_id: "m1".to_string(),
                changes: MessageChanges {
                    reactions: Some(reactions.clone()),
                    ..Default::default()
                },
            },
        );
        let msg = next.message("m1").expect("message");
        assert_eq!(msg.content, "hello");
        assert_eq!(msg.reactions.as_ref(), Some(&reactions));
    }

    #[test]
    fn store_dispatch_publishes_new_snapshot() {
        let store = Store::new();
        let before = store.snapshot();

        store.dispatch(Action::SetCurrentSession(Some("s1".to_string())));
        store.dispatch(Action::SetTyping(true));

        let after = store.snapshot();
        assert!(before.current_session_id.is_none());
        assert_eq!(after.current_session_id.as_deref(), Some("s1"));
        assert!(after.is_typing);
        assert_eq!(store.current_session_id().as_deref(), Some("s1"));
    }
}
