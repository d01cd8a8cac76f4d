//! Send coordination: per-conversation send locks and identifier reconciliation

use insight_api::ConversationId;

use crate::state::ChatState;

/// How the identifier returned by a successful send relates to the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The send started a new conversation; its lock moved to the new identifier
    Created,
    /// The send targeted an existing conversation and the server agreed
    Existing,
    /// The server answered with a different conversation than requested
    Mismatch { requested: ConversationId },
}

impl ChatState {
    /// Whether a new send may start for `conversation_id` (`None` = new conversation).
    pub fn is_send_allowed(&self, conversation_id: Option<&ConversationId>) -> bool {
        !self.locks.is_locked(conversation_id)
    }

    /// Mark a send as in flight. Call before issuing the request.
    pub fn begin_send(&mut self, conversation_id: Option<&ConversationId>) {
        if self.locks.is_locked(conversation_id) {
            tracing::warn!(
                conversation_id = ?conversation_id,
                "begin_send on a conversation that already has a send in flight"
            );
        }
        self.locks.lock(conversation_id);
        self.unresolved_sends += 1;
        tracing::debug!(conversation_id = ?conversation_id, "Send lock taken");
    }

    /// Record a successful send.
    ///
    /// For a concrete identifier the lock stays held; only the new-conversation
    /// lock clears, moving to the resolved identifier. The server has accepted
    /// the message but generation may still be running. Release the lock with
    /// [`ChatState::release_lock`] or [`ChatState::end_turn`]. If the resolved
    /// conversation's turn already ended on the stream, the lock is released
    /// right away.
    pub fn complete_send(
        &mut self,
        requested: Option<&ConversationId>,
        resolved: &ConversationId,
        content: &str,
    ) -> Reconciliation {
        self.active_conversation = Some(resolved.clone());

        let reconciliation = match requested {
            None => {
                self.locks.transfer_pending(resolved);
                self.release_if_finished(resolved);
                Reconciliation::Created
            }
            Some(requested) if requested == resolved => Reconciliation::Existing,
            Some(requested) => {
                tracing::warn!(
                    requested = %requested,
                    resolved = %resolved,
                    "Server resolved send to a different conversation"
                );
                self.locks.transfer(requested, resolved);
                self.release_if_finished(resolved);
                Reconciliation::Mismatch {
                    requested: requested.clone(),
                }
            }
        };
        self.settle_send();

        tracing::debug!(
            conversation_id = %resolved,
            content_len = content.len(),
            ?reconciliation,
            "Send completed"
        );
        reconciliation
    }

    /// Record a failed send. For an existing conversation the error is pinned
    /// to its stream state; a new conversation has nothing to attach it to.
    pub fn fail_send(&mut self, requested: Option<&ConversationId>, detail: &str) {
        self.locks.unlock(requested);
        self.settle_send();
        match requested {
            Some(conversation_id) => {
                tracing::debug!(conversation_id = %conversation_id, "Send failed: {}", detail);
                self.mark_failed(conversation_id, detail);
            }
            None => {
                tracing::debug!("Send for new conversation failed: {}", detail);
            }
        }
    }

    /// Release a conversation's lock once its turn is fully finished.
    pub fn release_lock(&mut self, conversation_id: &ConversationId) {
        self.locks.unlock(Some(conversation_id));
        tracing::debug!(conversation_id = %conversation_id, "Send lock released");
    }

    /// A turn ended on the stream (completed or failed).
    ///
    /// Releases the conversation's lock. If the conversation holds no lock while
    /// a send is unresolved, the turn may belong to that send once the server
    /// names its conversation; it is remembered so `complete_send` does not
    /// leave the lock it moves there held forever.
    pub fn end_turn(&mut self, conversation_id: &ConversationId) {
        if !self.locks.is_locked(Some(conversation_id)) && self.unresolved_sends > 0 {
            self.finished_while_pending.insert(conversation_id.clone());
        }
        self.release_lock(conversation_id);
    }

    fn release_if_finished(&mut self, resolved: &ConversationId) {
        if self.finished_while_pending.remove(resolved) {
            tracing::debug!(
                conversation_id = %resolved,
                "Turn already finished before the send resolved"
            );
            self.locks.unlock(Some(resolved));
        }
    }

    fn settle_send(&mut self) {
        self.unresolved_sends = self.unresolved_sends.saturating_sub(1);
        if self.unresolved_sends == 0 {
            self.finished_while_pending.clear();
        }
    }
}
