//! Per-conversation stream state and the reducer that folds events into it

use insight_api::{ChatEvent, ConversationId};
use serde::{Deserialize, Serialize};

/// Status of the assistant turn for one conversation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    /// At rest (initial, or after a completed turn)
    #[default]
    Idle,
    /// Assistant turn in progress
    Streaming,
    /// Last turn ended in error
    Failed,
}

/// Status of a tool invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Running,
    Done,
}

/// A tool invocation seen during the current turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRun {
    pub tool_call_id: String,
    pub tool_name: String,
    pub status: ToolStatus,
}

/// Live display state for one conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamState {
    pub status: StreamStatus,
    /// Assistant text assembled from tokens, replaced by the final content on completion
    pub draft: String,
    /// Tool invocations in start order, unique by `tool_call_id`
    pub tools: Vec<ToolRun>,
    /// Present only while `status` is `Failed`
    pub last_error: Option<String>,
    /// Epoch milliseconds, strictly increasing on every change
    pub last_updated_at: i64,
}

impl StreamState {
    /// A fresh idle record
    pub fn new(now: i64) -> Self {
        Self {
            status: StreamStatus::Idle,
            draft: String::new(),
            tools: Vec::new(),
            last_error: None,
            last_updated_at: now,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.status == StreamStatus::Streaming
    }

    pub fn is_failed(&self) -> bool {
        self.status == StreamStatus::Failed
    }

    /// Tools that have started but not ended
    pub fn running_tools(&self) -> impl Iterator<Item = &ToolRun> {
        self.tools.iter().filter(|t| t.status == ToolStatus::Running)
    }

    fn touched(mut self, now: i64) -> Self {
        self.last_updated_at = now.max(self.last_updated_at + 1);
        self
    }
}

/// Inputs to the reducer, already scoped to one conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Started,
    Token { text: String },
    ToolStarted { tool_call_id: String, tool_name: String },
    ToolEnded { tool_call_id: String },
    Completed { content: String },
    Failed { error: String },
    /// The user dismissed the error without retrying
    ClearFailure,
}

impl StreamEvent {
    /// Split a channel event into its conversation and the reducer input.
    pub fn from_chat_event(event: ChatEvent) -> (ConversationId, Self) {
        match event {
            ChatEvent::Started { conversation_id } => (conversation_id, StreamEvent::Started),
            ChatEvent::Token {
                conversation_id,
                token,
            } => (conversation_id, StreamEvent::Token { text: token }),
            ChatEvent::ToolStart {
                conversation_id,
                tool_call_id,
                tool_name,
            } => (
                conversation_id,
                StreamEvent::ToolStarted {
                    tool_call_id,
                    tool_name,
                },
            ),
            ChatEvent::ToolEnd {
                conversation_id,
                tool_call_id,
            } => (conversation_id, StreamEvent::ToolEnded { tool_call_id }),
            ChatEvent::Completed {
                conversation_id,
                content,
                ..
            } => (conversation_id, StreamEvent::Completed { content }),
            ChatEvent::Failed {
                conversation_id,
                error,
            } => (conversation_id, StreamEvent::Failed { error }),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Started => "started",
            StreamEvent::Token { .. } => "token",
            StreamEvent::ToolStarted { .. } => "tool_start",
            StreamEvent::ToolEnded { .. } => "tool_end",
            StreamEvent::Completed { .. } => "completed",
            StreamEvent::Failed { .. } => "failed",
            StreamEvent::ClearFailure => "clear_failure",
        }
    }
}

/// Fold one event into a conversation's state.
///
/// Returns `None` when the event does not apply in the current status (the
/// state, including its timestamp, is left untouched). `started` resets the
/// record from any status; token, tool and completed events only apply while
/// streaming; `failed` is recorded from any status so that send failures on an
/// idle conversation are visible.
pub fn reduce(state: &StreamState, event: &StreamEvent, now: i64) -> Option<StreamState> {
    match (state.status, event) {
        (_, StreamEvent::Started) => Some(
            StreamState {
                status: StreamStatus::Streaming,
                last_updated_at: state.last_updated_at,
                ..StreamState::new(now)
            }
            .touched(now),
        ),

        (StreamStatus::Streaming, StreamEvent::Token { text }) => {
            let mut next = state.clone();
            next.draft.push_str(text);
            Some(next.touched(now))
        }

        (
            StreamStatus::Streaming,
            StreamEvent::ToolStarted {
                tool_call_id,
                tool_name,
            },
        ) => {
            let mut next = state.clone();
            let run = ToolRun {
                tool_call_id: tool_call_id.clone(),
                tool_name: tool_name.clone(),
                status: ToolStatus::Running,
            };
            match next.tools.iter_mut().find(|t| t.tool_call_id == *tool_call_id) {
                Some(existing) => {
                    tracing::warn!("Duplicate tool start for {}, overwriting", tool_call_id);
                    *existing = run;
                }
                None => next.tools.push(run),
            }
            Some(next.touched(now))
        }

        (StreamStatus::Streaming, StreamEvent::ToolEnded { tool_call_id }) => {
            let Some(index) = state
                .tools
                .iter()
                .position(|t| t.tool_call_id == *tool_call_id)
            else {
                tracing::warn!("Tool end for unknown call {}, ignoring", tool_call_id);
                return None;
            };
            if state.tools[index].status == ToolStatus::Done {
                return None;
            }
            let mut next = state.clone();
            next.tools[index].status = ToolStatus::Done;
            Some(next.touched(now))
        }

        (StreamStatus::Streaming, StreamEvent::Completed { content }) => Some(
            StreamState {
                status: StreamStatus::Idle,
                draft: content.clone(),
                tools: Vec::new(),
                last_error: None,
                last_updated_at: state.last_updated_at,
            }
            .touched(now),
        ),

        (_, StreamEvent::Failed { error }) => {
            let mut next = state.clone();
            next.status = StreamStatus::Failed;
            next.last_error = Some(error.clone());
            Some(next.touched(now))
        }

        (StreamStatus::Failed, StreamEvent::ClearFailure) => {
            let mut next = state.clone();
            next.status = StreamStatus::Idle;
            next.last_error = None;
            Some(next.touched(now))
        }

        (status, event) => {
            tracing::warn!("Ignoring {} event while {:?}", event.kind(), status);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &str) -> StreamEvent {
        StreamEvent::Token { text: text.into() }
    }

    fn tool_start(id: &str, name: &str) -> StreamEvent {
        StreamEvent::ToolStarted {
            tool_call_id: id.into(),
            tool_name: name.into(),
        }
    }

    fn tool_end(id: &str) -> StreamEvent {
        StreamEvent::ToolEnded {
            tool_call_id: id.into(),
        }
    }

    /// Apply events in order, treating ignored events as no-ops.
    fn fold(state: StreamState, events: &[StreamEvent]) -> StreamState {
        events.iter().enumerate().fold(state, |state, (i, event)| {
            reduce(&state, event, 1000 + i as i64).unwrap_or(state)
        })
    }

    fn streaming() -> StreamState {
        fold(StreamState::new(0), &[StreamEvent::Started])
    }

    fn failed(error: &str) -> StreamState {
        fold(
            streaming(),
            &[StreamEvent::Failed {
                error: error.into(),
            }],
        )
    }

    #[test]
    fn test_new_state_is_idle_and_empty() {
        let state = StreamState::new(5);
        assert_eq!(state.status, StreamStatus::Idle);
        assert!(state.draft.is_empty());
        assert!(state.tools.is_empty());
        assert!(state.last_error.is_none());
        assert_eq!(state.last_updated_at, 5);
    }

    #[test]
    fn test_tokens_concatenate_in_order() {
        let state = fold(streaming(), &[token("A"), token("B"), token("C")]);
        assert_eq!(state.draft, "ABC");
        assert!(state.is_streaming());
    }

    #[test]
    fn test_tokens_are_not_trimmed() {
        let state = fold(streaming(), &[token("Hi"), token(" there"), token("\n")]);
        assert_eq!(state.draft, "Hi there\n");
    }

    #[test]
    fn test_completed_replaces_draft_with_final_content() {
        let state = fold(
            streaming(),
            &[
                token("Hi"),
                token(" there"),
                tool_start("t1", "run_sql"),
                StreamEvent::Completed {
                    content: "Hi there!".into(),
                },
            ],
        );
        assert_eq!(state.status, StreamStatus::Idle);
        assert_eq!(state.draft, "Hi there!");
        assert!(state.tools.is_empty());
        assert!(state.last_error.is_none());
    }

    #[test]
    fn test_started_resets_from_every_status() {
        let busy = fold(streaming(), &[token("partial"), tool_start("t1", "chart")]);
        let failed = failed("boom");
        let idle = StreamState::new(0);

        for state in [busy, failed, idle] {
            let next = reduce(&state, &StreamEvent::Started, 10_000).unwrap();
            assert_eq!(next.status, StreamStatus::Streaming);
            assert!(next.draft.is_empty());
            assert!(next.tools.is_empty());
            assert!(next.last_error.is_none());
        }
    }

    #[test]
    fn test_tool_lifecycle() {
        let state = fold(
            streaming(),
            &[tool_start("t1", "run_sql"), tool_start("t2", "chart"), tool_end("t1")],
        );
        assert_eq!(state.tools.len(), 2);
        assert_eq!(state.tools[0].status, ToolStatus::Done);
        assert_eq!(state.tools[1].status, ToolStatus::Running);
        let running: Vec<_> = state.running_tools().map(|t| t.tool_call_id.as_str()).collect();
        assert_eq!(running, vec!["t2"]);
    }

    #[test]
    fn test_duplicate_tool_start_overwrites_in_place() {
        let state = fold(
            streaming(),
            &[
                tool_start("t1", "run_sql"),
                tool_start("t2", "chart"),
                tool_end("t1"),
                tool_start("t1", "run_sql_v2"),
            ],
        );
        assert_eq!(state.tools.len(), 2);
        assert_eq!(state.tools[0].tool_call_id, "t1");
        assert_eq!(state.tools[0].tool_name, "run_sql_v2");
        assert_eq!(state.tools[0].status, ToolStatus::Running);
    }

    #[test]
    fn test_orphan_tool_end_is_ignored() {
        let state = streaming();
        assert!(reduce(&state, &tool_end("missing"), 5000).is_none());
    }

    #[test]
    fn test_tool_end_is_idempotent() {
        let once = fold(streaming(), &[tool_start("t1", "run_sql"), tool_end("t1")]);
        assert!(reduce(&once, &tool_end("t1"), 9999).is_none());
        assert_eq!(once.tools[0].status, ToolStatus::Done);
    }

    #[test]
    fn test_events_ignored_while_idle() {
        let idle = StreamState::new(0);
        for event in [
            token("x"),
            tool_start("t1", "run_sql"),
            tool_end("t1"),
            StreamEvent::Completed {
                content: "done".into(),
            },
            StreamEvent::ClearFailure,
        ] {
            assert!(reduce(&idle, &event, 100).is_none(), "{:?} applied while idle", event);
        }
    }

    #[test]
    fn test_events_ignored_while_failed() {
        let state = failed("boom");
        for event in [
            token("x"),
            tool_start("t9", "run_sql"),
            StreamEvent::Completed {
                content: "done".into(),
            },
        ] {
            assert!(reduce(&state, &event, 100_000).is_none());
        }
    }

    #[test]
    fn test_failed_preserves_partial_output() {
        let state = fold(
            streaming(),
            &[
                token("Partial"),
                tool_start("t1", "run_sql"),
                StreamEvent::Failed {
                    error: "model unavailable".into(),
                },
            ],
        );
        assert_eq!(state.status, StreamStatus::Failed);
        assert_eq!(state.draft, "Partial");
        assert_eq!(state.tools.len(), 1);
        assert_eq!(state.last_error.as_deref(), Some("model unavailable"));
    }

    #[test]
    fn test_failed_overwrites_error() {
        let state = fold(
            failed("first"),
            &[StreamEvent::Failed {
                error: "second".into(),
            }],
        );
        assert_eq!(state.last_error.as_deref(), Some("second"));
    }

    #[test]
    fn test_failed_from_idle_is_recorded() {
        let state = reduce(
            &StreamState::new(0),
            &StreamEvent::Failed {
                error: "model unavailable".into(),
            },
            10,
        )
        .unwrap();
        assert_eq!(state.status, StreamStatus::Failed);
        assert_eq!(state.last_error.as_deref(), Some("model unavailable"));
    }

    #[test]
    fn test_clear_failure_keeps_draft() {
        let state = fold(
            streaming(),
            &[
                token("partial"),
                StreamEvent::Failed {
                    error: "boom".into(),
                },
                StreamEvent::ClearFailure,
            ],
        );
        assert_eq!(state.status, StreamStatus::Idle);
        assert!(state.last_error.is_none());
        assert_eq!(state.draft, "partial");
    }

    #[test]
    fn test_clear_failure_ignored_while_streaming() {
        assert!(reduce(&streaming(), &StreamEvent::ClearFailure, 50_000).is_none());
    }

    #[test]
    fn test_timestamp_strictly_increases_even_if_clock_stalls() {
        let start = StreamState::new(100);
        let a = reduce(&start, &StreamEvent::Started, 100).unwrap();
        let b = reduce(&a, &token("x"), 100).unwrap();
        let c = reduce(&b, &token("y"), 50).unwrap();
        assert!(a.last_updated_at > start.last_updated_at);
        assert!(b.last_updated_at > a.last_updated_at);
        assert!(c.last_updated_at > b.last_updated_at);

        let d = reduce(&c, &token("z"), 10_000).unwrap();
        assert_eq!(d.last_updated_at, 10_000);
    }

    #[test]
    fn test_from_chat_event() {
        let (id, event) = StreamEvent::from_chat_event(ChatEvent::Completed {
            conversation_id: "c1".into(),
            message_id: "m1".into(),
            content: "Hi there!".into(),
            metadata: None,
        });
        assert_eq!(id.as_str(), "c1");
        assert_eq!(
            event,
            StreamEvent::Completed {
                content: "Hi there!".into()
            }
        );

        let (_, event) = StreamEvent::from_chat_event(ChatEvent::ToolStart {
            conversation_id: "c1".into(),
            tool_call_id: "t1".into(),
            tool_name: "run_sql".into(),
        });
        assert_eq!(event, tool_start("t1", "run_sql"));
    }
}
