//! Chat state: active conversation, send locks, and per-conversation stream state.

use std::collections::{HashMap, HashSet};

use insight_api::{ChatEvent, ConversationId};

use crate::{
    locks::SendLocks,
    stream_state::{StreamEvent, StreamState, reduce},
};

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// All state owned by the chat core.
///
/// Plain single-threaded state; [`crate::ChatStore`] wraps it for sharing.
#[derive(Debug, Default)]
pub struct ChatState {
    pub(crate) active_conversation: Option<ConversationId>,
    pub(crate) locks: SendLocks,
    pub(crate) streams: HashMap<ConversationId, StreamState>,
    /// Sends whose request has not resolved yet
    pub(crate) unresolved_sends: usize,
    /// Turns that finished on unlocked conversations while a send was unresolved
    pub(crate) finished_while_pending: HashSet<ConversationId>,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_conversation(&self) -> Option<&ConversationId> {
        self.active_conversation.as_ref()
    }

    /// Point the UI at a conversation, or at a new one with `None`
    pub fn set_active_conversation(&mut self, conversation_id: Option<ConversationId>) {
        self.active_conversation = conversation_id;
    }

    pub fn has_active_conversation(&self) -> bool {
        self.active_conversation.is_some()
    }

    /// Snapshot of a conversation's stream state; idle and empty if never touched.
    pub fn stream_state(&self, conversation_id: &ConversationId) -> StreamState {
        self.streams
            .get(conversation_id)
            .cloned()
            .unwrap_or_else(|| StreamState::new(now_millis()))
    }

    /// Apply a reducer input to one conversation. Returns whether state changed.
    pub fn apply(&mut self, conversation_id: &ConversationId, event: &StreamEvent) -> bool {
        let now = now_millis();
        let current = self
            .streams
            .entry(conversation_id.clone())
            .or_insert_with(|| StreamState::new(now));

        match reduce(current, event, now) {
            Some(next) => {
                tracing::debug!(
                    conversation_id = %conversation_id,
                    "Stream {:?} -> {:?}",
                    current.status,
                    next.status
                );
                *current = next;
                true
            }
            None => false,
        }
    }

    /// Apply an event from the realtime channel.
    pub fn apply_chat_event(&mut self, event: ChatEvent) -> bool {
        let (conversation_id, event) = StreamEvent::from_chat_event(event);
        self.apply(&conversation_id, &event)
    }

    /// Record a turn-level failure for a conversation.
    pub fn mark_failed(&mut self, conversation_id: &ConversationId, error: impl Into<String>) {
        self.apply(
            conversation_id,
            &StreamEvent::Failed {
                error: error.into(),
            },
        );
    }

    /// Dismiss a failure without retrying. No-op unless the conversation is failed.
    pub fn clear_failure(&mut self, conversation_id: &ConversationId) -> bool {
        if !self.streams.contains_key(conversation_id) {
            return false;
        }
        self.apply(conversation_id, &StreamEvent::ClearFailure)
    }

    /// Conversations that have a stream record
    pub fn conversations(&self) -> impl Iterator<Item = &ConversationId> {
        self.streams.keys()
    }
}
