//! A cloneable, thread-safe handle to the chat state.

use parking_lot::Mutex;
use std::sync::Arc;

use insight_api::{ChatEvent, ConversationId};

use crate::{coordinator::Reconciliation, state::ChatState, stream_state::StreamState};

/// A cloneable handle to the chat state.
///
/// Every method takes the lock once, so compound operations such as the
/// new-conversation lock transfer are never observed half-applied.
#[derive(Clone, Default)]
pub struct ChatStore {
    inner: Arc<Mutex<ChatState>>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a send may start for `conversation_id` (`None` = new conversation)
    pub fn send_allowed(&self, conversation_id: Option<&ConversationId>) -> bool {
        self.inner.lock().is_send_allowed(conversation_id)
    }

    pub fn begin_send(&self, conversation_id: Option<&ConversationId>) {
        self.inner.lock().begin_send(conversation_id);
    }

    /// Check the guard and take the lock in one step. Returns `false` if a
    /// send is already in flight.
    pub fn try_begin_send(&self, conversation_id: Option<&ConversationId>) -> bool {
        let mut state = self.inner.lock();
        if !state.is_send_allowed(conversation_id) {
            return false;
        }
        state.begin_send(conversation_id);
        true
    }

    pub fn complete_send(
        &self,
        requested: Option<&ConversationId>,
        resolved: &ConversationId,
        content: &str,
    ) -> Reconciliation {
        self.inner.lock().complete_send(requested, resolved, content)
    }

    pub fn fail_send(&self, requested: Option<&ConversationId>, detail: &str) {
        self.inner.lock().fail_send(requested, detail);
    }

    pub fn release_lock(&self, conversation_id: &ConversationId) {
        self.inner.lock().release_lock(conversation_id);
    }

    /// Apply a channel event. Returns whether the conversation's state changed.
    pub fn apply_event(&self, event: ChatEvent) -> bool {
        self.inner.lock().apply_chat_event(event)
    }

    /// Apply a channel event and, if it ends a live turn, release the lock.
    ///
    /// A redelivered `completed` or `failed` for a turn that already ended is
    /// ignored and leaves any newer send's lock alone.
    pub(crate) fn apply_event_and_end_turn(&self, event: ChatEvent) -> bool {
        let conversation_id = event.conversation_id().clone();
        let terminal = event.is_terminal();

        let mut state = self.inner.lock();
        let was_failed = state
            .streams
            .get(&conversation_id)
            .is_some_and(StreamState::is_failed);
        let changed = state.apply_chat_event(event);
        if terminal && changed && !was_failed {
            state.end_turn(&conversation_id);
        }
        changed
    }

    pub fn clear_failure(&self, conversation_id: &ConversationId) -> bool {
        self.inner.lock().clear_failure(conversation_id)
    }

    /// Current stream state for a conversation; idle and empty if none exists.
    pub fn snapshot(&self, conversation_id: &ConversationId) -> StreamState {
        self.inner.lock().stream_state(conversation_id)
    }

    pub fn active_conversation(&self) -> Option<ConversationId> {
        self.inner.lock().active_conversation().cloned()
    }

    pub fn set_active_conversation(&self, conversation_id: Option<ConversationId>) {
        self.inner.lock().set_active_conversation(conversation_id);
    }

    pub fn has_active_conversation(&self) -> bool {
        self.inner.lock().has_active_conversation()
    }
}
