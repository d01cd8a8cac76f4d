//! Realtime chat event types and decoding

use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio_stream::Stream;

use crate::error::{Error, Result};
use crate::types::ConversationId;

/// Wire name of the stream started event
pub const STARTED: &str = "chat:message:started";
/// Wire name of the token event
pub const TOKEN: &str = "chat:message:token";
/// Wire name of the tool start event
pub const TOOL_START: &str = "chat:message:tool_start";
/// Wire name of the tool end event
pub const TOOL_END: &str = "chat:message:tool_end";
/// Wire name of the completed event
pub const COMPLETED: &str = "chat:message:completed";
/// Wire name of the failed event
pub const FAILED: &str = "chat:message:failed";

/// Events delivered by the realtime channel, each scoped to a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Assistant turn started
    Started { conversation_id: ConversationId },

    /// A chunk of assistant text
    Token {
        conversation_id: ConversationId,
        token: String,
    },

    /// Tool invocation started
    ToolStart {
        conversation_id: ConversationId,
        tool_call_id: String,
        tool_name: String,
    },

    /// Tool invocation finished
    ToolEnd {
        conversation_id: ConversationId,
        tool_call_id: String,
    },

    /// Assistant turn finished with authoritative content
    Completed {
        conversation_id: ConversationId,
        message_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<serde_json::Value>,
    },

    /// Assistant turn failed
    Failed {
        conversation_id: ConversationId,
        error: String,
    },
}

impl ChatEvent {
    /// Decode a named event with its JSON payload.
    pub fn decode(name: &str, data: &str) -> Result<Self> {
        let tag = match name {
            STARTED => "started",
            TOKEN => "token",
            TOOL_START => "tool_start",
            TOOL_END => "tool_end",
            COMPLETED => "completed",
            FAILED => "failed",
            other => return Err(Error::UnknownEvent(other.to_string())),
        };

        let mut payload: serde_json::Value = serde_json::from_str(data)?;
        let Some(object) = payload.as_object_mut() else {
            return Err(Error::UnexpectedResponse(format!(
                "{} payload is not an object",
                name
            )));
        };
        object.insert("type".to_string(), serde_json::Value::from(tag));

        Ok(serde_json::from_value(payload)?)
    }

    /// Wire name of this event
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::Started { .. } => STARTED,
            ChatEvent::Token { .. } => TOKEN,
            ChatEvent::ToolStart { .. } => TOOL_START,
            ChatEvent::ToolEnd { .. } => TOOL_END,
            ChatEvent::Completed { .. } => COMPLETED,
            ChatEvent::Failed { .. } => FAILED,
        }
    }

    /// Conversation this event belongs to
    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            ChatEvent::Started { conversation_id }
            | ChatEvent::Token {
                conversation_id, ..
            }
            | ChatEvent::ToolStart {
                conversation_id, ..
            }
            | ChatEvent::ToolEnd {
                conversation_id, ..
            }
            | ChatEvent::Completed {
                conversation_id, ..
            }
            | ChatEvent::Failed {
                conversation_id, ..
            } => conversation_id,
        }
    }

    /// Check if this event ends the assistant turn
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::Completed { .. } | ChatEvent::Failed { .. })
    }
}

/// A stream of realtime chat events. An `Err` item ends the stream.
pub type ChatEventStream = Pin<Box<dyn Stream<Item = Result<ChatEvent>> + Send>>;
