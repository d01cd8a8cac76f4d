//! Send lock registry

use std::collections::HashSet;

use insight_api::ConversationId;

/// Per-conversation "send in flight" flags, plus one flag for the
/// conversation that does not have an identifier yet.
///
/// At most one send may be pending for a new conversation: a second one
/// could not know whether to join the unidentified conversation or start
/// another.
#[derive(Debug, Clone, Default)]
pub struct SendLocks {
    locked: HashSet<ConversationId>,
    pending_new: bool,
}

impl SendLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a send is in flight for `conversation_id` (`None` = new conversation)
    pub fn is_locked(&self, conversation_id: Option<&ConversationId>) -> bool {
        match conversation_id {
            Some(id) => self.locked.contains(id),
            None => self.pending_new,
        }
    }

    pub fn lock(&mut self, conversation_id: Option<&ConversationId>) {
        match conversation_id {
            Some(id) => {
                self.locked.insert(id.clone());
            }
            None => self.pending_new = true,
        }
    }

    pub fn unlock(&mut self, conversation_id: Option<&ConversationId>) {
        match conversation_id {
            Some(id) => {
                self.locked.remove(id);
            }
            None => self.pending_new = false,
        }
    }

    /// Move the pending-new lock onto the identifier the server assigned.
    pub fn transfer_pending(&mut self, to: &ConversationId) {
        self.pending_new = false;
        self.locked.insert(to.clone());
    }

    /// Move a lock between concrete identifiers.
    pub fn transfer(&mut self, from: &ConversationId, to: &ConversationId) {
        self.locked.remove(from);
        self.locked.insert(to.clone());
    }
}
