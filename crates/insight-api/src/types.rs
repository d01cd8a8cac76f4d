//! Core types for the chat REST API

use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-issued handle naming a chat thread.
///
/// A conversation that has not been acknowledged by the server yet has no
/// identifier at all; callers model that as `Option<ConversationId>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ConversationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Conversation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Archived,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Archived => "archived",
        }
    }
}

/// A conversation as listed by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub title: String,
    pub status: ConversationStatus,
    pub message_count: u32,
    pub last_message_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMessageRole {
    User,
    Assistant,
}

/// A persisted chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatMessageRole,
    pub content: String,
    pub created_at: String,
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<serde_json::Map<String, serde_json::Value>>>,
}

/// Body of `POST /chat/messages`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    /// `None` starts a new conversation
    pub conversation_id: Option<ConversationId>,
}

impl SendMessageRequest {
    pub fn new(content: impl Into<String>, conversation_id: Option<ConversationId>) -> Self {
        Self {
            content: content.into(),
            conversation_id,
        }
    }
}

/// Response of `POST /chat/messages`. The conversation id is always concrete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub user_message_id: String,
    pub conversation_id: ConversationId,
}

/// Query parameters for `GET /chat/conversations`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListConversationsParams {
    pub skip: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<ConversationStatus>,
    pub search: Option<String>,
}

impl ListConversationsParams {
    /// Flatten into query pairs, omitting unset fields.
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(skip) = self.skip {
            query.push(("skip", skip.to_string()));
        }
        if let Some(limit) = self.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(status) = self.status {
            query.push(("status", status.as_str().to_string()));
        }
        if let Some(ref search) = self.search {
            query.push(("search", search.clone()));
        }
        query
    }
}

/// Page of conversations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListConversationsResponse {
    pub items: Vec<ConversationSummary>,
    pub total: u32,
    pub skip: u32,
    pub limit: u32,
}

/// Response of `GET /chat/conversations/{id}/messages`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetConversationMessagesResponse {
    pub conversation_id: ConversationId,
    pub messages: Vec<ChatMessage>,
}
