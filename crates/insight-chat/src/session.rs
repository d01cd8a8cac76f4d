//! Chat session: issues sends and pumps realtime events into a shared store.

use std::sync::Arc;

use futures::StreamExt;
use insight_api::{
    ChatEvent, ChatEventStream, ConversationId, SendMessageRequest, SendMessageResponse,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{coordinator::Reconciliation, error::Result, store::ChatStore, transport::MessageSender};

/// Result of a send attempt
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// A send was already in flight for the target; no request was issued
    Rejected,
    /// The server accepted the message
    Sent {
        response: SendMessageResponse,
        reconciliation: Reconciliation,
    },
    /// The request failed; the detail has been recorded
    Failed { detail: String },
}

/// Notification that state changed for a conversation.
/// `None` refers to the not-yet-identified new conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUpdate {
    pub conversation_id: Option<ConversationId>,
}

/// Glues a [`MessageSender`], the realtime event stream, and a [`ChatStore`].
#[derive(Clone)]
pub struct ChatSession {
    store: ChatStore,
    sender: Arc<dyn MessageSender>,
    update_tx: broadcast::Sender<ChatUpdate>,
}

impl ChatSession {
    /// Create a session with a fresh store
    pub fn new(sender: Arc<dyn MessageSender>) -> Self {
        Self::with_store(ChatStore::new(), sender)
    }

    /// Create a session over an existing store
    pub fn with_store(store: ChatStore, sender: Arc<dyn MessageSender>) -> Self {
        let (update_tx, _) = broadcast::channel(256);
        Self {
            store,
            sender,
            update_tx,
        }
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    /// Subscribe to state change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ChatUpdate> {
        self.update_tx.subscribe()
    }

    /// Send a message to the active conversation (or a new one if none is active).
    pub async fn send(&self, content: impl Into<String>) -> SendOutcome {
        let target = self.store.active_conversation();
        self.send_to(target, content).await
    }

    /// Send a message to `target` (`None` starts a new conversation).
    pub async fn send_to(
        &self,
        target: Option<ConversationId>,
        content: impl Into<String>,
    ) -> SendOutcome {
        let content = content.into();
        if !self.store.try_begin_send(target.as_ref()) {
            tracing::debug!(conversation_id = ?target, "Send rejected, already in flight");
            return SendOutcome::Rejected;
        }
        self.notify(target.clone());

        let request = SendMessageRequest::new(content.clone(), target.clone());
        match self.sender.send_message(request).await {
            Ok(response) => {
                let reconciliation = self.store.complete_send(
                    target.as_ref(),
                    &response.conversation_id,
                    &content,
                );
                if target.as_ref() != Some(&response.conversation_id) {
                    self.notify(target);
                }
                self.notify(Some(response.conversation_id.clone()));
                SendOutcome::Sent {
                    response,
                    reconciliation,
                }
            }
            Err(e) => {
                let detail = e.detail();
                tracing::warn!(conversation_id = ?target, "Send failed: {}", e);
                self.store.fail_send(target.as_ref(), &detail);
                self.notify(target);
                SendOutcome::Failed { detail }
            }
        }
    }

    /// Apply one realtime event. A completed or failed event that ends a live
    /// turn releases the conversation's send lock. Returns whether state changed.
    pub fn handle_event(&self, event: ChatEvent) -> bool {
        let conversation_id = event.conversation_id().clone();
        let changed = self.store.apply_event_and_end_turn(event);
        if changed {
            self.notify(Some(conversation_id));
        }
        changed
    }

    /// Pump events until the stream ends, errors, or `cancel` fires.
    pub async fn run(&self, mut events: ChatEventStream, cancel: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Event pump cancelled");
                    return Ok(());
                }
                next = events.next() => match next {
                    Some(Ok(event)) => {
                        self.handle_event(event);
                    }
                    Some(Err(e)) => {
                        tracing::warn!("Realtime channel error: {}", e);
                        return Err(e.into());
                    }
                    None => return Ok(()),
                },
            }
        }
    }

    fn notify(&self, conversation_id: Option<ConversationId>) {
        // No receivers is fine.
        let _ = self.update_tx.send(ChatUpdate { conversation_id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_state::StreamStatus;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::Notify;

    /// A sender that answers from a canned list of results.
    struct MockSender {
        responses: Mutex<Vec<insight_api::Result<SendMessageResponse>>>,
        requests: Mutex<Vec<SendMessageRequest>>,
        gate: Option<Arc<Notify>>,
    }

    impl MockSender {
        fn new(responses: Vec<insight_api::Result<SendMessageResponse>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
                gate: None,
            }
        }

        /// Hold every response until the gate is notified.
        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }
    }

    #[async_trait]
    impl MessageSender for MockSender {
        async fn send_message(
            &self,
            request: SendMessageRequest,
        ) -> insight_api::Result<SendMessageResponse> {
            self.requests.lock().push(request);
            if let Some(ref gate) = self.gate {
                gate.notified().await;
            }
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                Err(insight_api::Error::UnexpectedResponse("no canned response".into()))
            } else {
                responses.remove(0)
            }
        }
    }

    fn ok(conversation_id: &str) -> insight_api::Result<SendMessageResponse> {
        Ok(SendMessageResponse {
            user_message_id: "m-user".into(),
            conversation_id: conversation_id.into(),
        })
    }

    fn id(s: &str) -> ConversationId {
        ConversationId::new(s)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        while !condition() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_new_conversation_end_to_end() {
        let sender = Arc::new(MockSender::new(vec![ok("c1")]));
        let session = ChatSession::new(sender.clone());

        let outcome = session.send("hello").await;
        assert!(matches!(
            outcome,
            SendOutcome::Sent {
                reconciliation: Reconciliation::Created,
                ..
            }
        ));
        assert!(sender.requests.lock()[0].conversation_id.is_none());

        let store = session.store();
        let c1 = id("c1");
        assert_eq!(store.active_conversation(), Some(c1.clone()));
        assert!(store.send_allowed(None));
        assert!(!store.send_allowed(Some(&c1)));

        session.handle_event(ChatEvent::Started {
            conversation_id: c1.clone(),
        });
        for token in ["Hi", " there"] {
            session.handle_event(ChatEvent::Token {
                conversation_id: c1.clone(),
                token: token.into(),
            });
        }
        let snapshot = store.snapshot(&c1);
        assert_eq!(snapshot.status, StreamStatus::Streaming);
        assert_eq!(snapshot.draft, "Hi there");

        session.handle_event(ChatEvent::Completed {
            conversation_id: c1.clone(),
            message_id: "m1".into(),
            content: "Hi there!".into(),
            metadata: None,
        });
        let snapshot = store.snapshot(&c1);
        assert_eq!(snapshot.status, StreamStatus::Idle);
        assert_eq!(snapshot.draft, "Hi there!");
        assert!(store.send_allowed(Some(&c1)));
    }

    #[tokio::test]
    async fn test_follow_up_targets_active_conversation() {
        let sender = Arc::new(MockSender::new(vec![ok("c1"), ok("c1")]));
        let session = ChatSession::new(sender.clone());

        session.send("first").await;
        session.store().release_lock(&id("c1"));
        let outcome = session.send("second").await;

        assert!(matches!(
            outcome,
            SendOutcome::Sent {
                reconciliation: Reconciliation::Existing,
                ..
            }
        ));
        assert_eq!(sender.requests.lock()[1].conversation_id, Some(id("c1")));
    }

    #[tokio::test]
    async fn test_send_rejected_while_in_flight() {
        let gate = Arc::new(Notify::new());
        let sender = Arc::new(MockSender::new(vec![ok("c1")]).gated(gate.clone()));
        let session = ChatSession::new(sender.clone());

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.send("one").await }
        });
        wait_until(|| !session.store().send_allowed(None)).await;

        let second = session.send("two").await;
        assert!(matches!(second, SendOutcome::Rejected));
        assert_eq!(sender.requests.lock().len(), 1);

        gate.notify_one();
        let first = first.await.unwrap();
        assert!(matches!(first, SendOutcome::Sent { .. }));
    }

    #[tokio::test]
    async fn test_stream_finishes_before_send_resolves() {
        let gate = Arc::new(Notify::new());
        let sender = Arc::new(MockSender::new(vec![ok("c7")]).gated(gate.clone()));
        let session = ChatSession::new(sender);

        let pending = tokio::spawn({
            let session = session.clone();
            async move { session.send("question").await }
        });
        wait_until(|| !session.store().send_allowed(None)).await;

        let c7 = id("c7");
        session.handle_event(ChatEvent::Started {
            conversation_id: c7.clone(),
        });
        session.handle_event(ChatEvent::Completed {
            conversation_id: c7.clone(),
            message_id: "m1".into(),
            content: "answer".into(),
            metadata: None,
        });

        gate.notify_one();
        pending.await.unwrap();

        let store = session.store();
        assert!(store.send_allowed(Some(&c7)));
        assert!(store.send_allowed(None));
        assert_eq!(store.snapshot(&c7).draft, "answer");
    }

    #[tokio::test]
    async fn test_failed_send_on_new_conversation() {
        let sender = Arc::new(MockSender::new(vec![Err(insight_api::Error::api(
            500,
            "Internal error",
        ))]));
        let session = ChatSession::new(sender);

        let outcome = session.send("hello").await;
        assert!(
            matches!(outcome, SendOutcome::Failed { ref detail } if detail == "Internal error")
        );
        assert!(session.store().send_allowed(None));
        assert!(!session.store().has_active_conversation());
    }

    #[tokio::test]
    async fn test_failed_send_on_existing_conversation() {
        let sender = Arc::new(MockSender::new(vec![Err(insight_api::Error::api(
            404,
            "Conversation not found",
        ))]));
        let session = ChatSession::new(sender);
        let c = id("c1");
        session.store().set_active_conversation(Some(c.clone()));

        session.send("hello").await;

        let snapshot = session.store().snapshot(&c);
        assert_eq!(snapshot.status, StreamStatus::Failed);
        assert_eq!(snapshot.last_error.as_deref(), Some("Conversation not found"));
        assert!(session.store().send_allowed(Some(&c)));
    }

    #[tokio::test]
    async fn test_updates_are_broadcast() {
        let sender = Arc::new(MockSender::new(vec![ok("c1")]));
        let session = ChatSession::new(sender);
        let mut updates = session.subscribe();

        session.send("hello").await;
        session.handle_event(ChatEvent::Started {
            conversation_id: id("c1"),
        });

        let mut seen = Vec::new();
        while let Ok(update) = updates.try_recv() {
            seen.push(update.conversation_id);
        }
        assert_eq!(seen, vec![None, None, Some(id("c1")), Some(id("c1"))]);
    }

    #[tokio::test]
    async fn test_run_pumps_until_stream_ends() {
        let session = ChatSession::new(Arc::new(MockSender::new(vec![])));
        let events: ChatEventStream = Box::pin(async_stream::stream! {
            yield Ok::<_, insight_api::Error>(ChatEvent::Started { conversation_id: "c1".into() });
            yield Ok(ChatEvent::ToolStart {
                conversation_id: "c1".into(),
                tool_call_id: "t1".into(),
                tool_name: "run_sql".into(),
            });
            yield Ok(ChatEvent::ToolEnd {
                conversation_id: "c1".into(),
                tool_call_id: "t1".into(),
            });
            yield Ok(ChatEvent::Token { conversation_id: "c1".into(), token: "42 rows".into() });
        });

        session.run(events, CancellationToken::new()).await.unwrap();

        let snapshot = session.store().snapshot(&id("c1"));
        assert_eq!(snapshot.draft, "42 rows");
        assert_eq!(snapshot.tools.len(), 1);
        assert!(snapshot.running_tools().next().is_none());
    }

    #[tokio::test]
    async fn test_run_returns_channel_error() {
        let session = ChatSession::new(Arc::new(MockSender::new(vec![])));
        let events: ChatEventStream = Box::pin(async_stream::stream! {
            yield Ok::<_, insight_api::Error>(ChatEvent::Started { conversation_id: "c1".into() });
            yield Err(insight_api::Error::Sse("connection reset".into()));
        });

        let err = session
            .run(events, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::Api(insight_api::Error::Sse(_))));
        assert!(session.store().snapshot(&id("c1")).is_streaming());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let session = ChatSession::new(Arc::new(MockSender::new(vec![])));
        let events: ChatEventStream =
            Box::pin(futures::stream::pending::<insight_api::Result<ChatEvent>>());
        let cancel = CancellationToken::new();
        cancel.cancel();

        session.run(events, cancel).await.unwrap();
    }
}
