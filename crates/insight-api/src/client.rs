//! REST client for the chat endpoints

use serde::de::DeserializeOwned;

use crate::{
    error::{Error, Result},
    types::{
        ConversationId, GetConversationMessagesResponse, ListConversationsParams,
        ListConversationsResponse, SendMessageRequest, SendMessageResponse,
    },
};

/// Environment variable holding the API base URL
pub const BASE_URL_ENV: &str = "INSIGHT_API_URL";
/// Environment variable holding the bearer token
pub const TOKEN_ENV: &str = "INSIGHT_API_TOKEN";

/// Chat API client
#[derive(Clone)]
pub struct ApiClient {
    pub(crate) client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a client for the given base URL (e.g. `https://host/api/v1`)
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        let trimmed = base_url.trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!(
                "base URL must start with http:// or https://, got {:?}",
                base_url
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: trimmed.to_string(),
            token: None,
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var(BASE_URL_ENV)
            .map_err(|_| Error::InvalidConfig(format!("{} is not set", BASE_URL_ENV)))?;
        let client = Self::new(base_url)?;
        Ok(match std::env::var(TOKEN_ENV) {
            Ok(token) => client.with_token(token),
            Err(_) => client,
        })
    }

    /// Attach a bearer token to every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub(crate) fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// `POST /chat/messages`
    pub async fn send_message(&self, request: &SendMessageRequest) -> Result<SendMessageResponse> {
        tracing::debug!(
            conversation_id = ?request.conversation_id,
            "Sending chat message"
        );
        let response = self
            .authorize(self.client.post(self.url("chat/messages")))
            .json(request)
            .send()
            .await?;
        parse_response(response).await
    }

    /// `GET /chat/conversations`
    pub async fn list_conversations(
        &self,
        params: &ListConversationsParams,
    ) -> Result<ListConversationsResponse> {
        let response = self
            .authorize(self.client.get(self.url("chat/conversations")))
            .query(&params.to_query())
            .send()
            .await?;
        parse_response(response).await
    }

    /// `GET /chat/conversations/{id}/messages`
    pub async fn get_conversation_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<GetConversationMessagesResponse> {
        let path = format!("chat/conversations/{}/messages", conversation_id);
        let response = self
            .authorize(self.client.get(self.url(&path)))
            .send()
            .await?;
        parse_response(response).await
    }
}

async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(error_from_body(status.as_u16(), &text));
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        Error::UnexpectedResponse(format!("{} (body: {})", e, truncate(&text, 200)))
    })
}

/// Build an error from a non-success response body.
///
/// Understands `{"detail": "..."}` and validation lists of the form
/// `{"detail": [{"msg": "..."}]}`; anything else is passed through as text.
pub(crate) fn error_from_body(status: u16, body: &str) -> Error {
    let detail = extract_detail(body).unwrap_or_else(|| {
        let body = body.trim();
        if body.is_empty() {
            format!("Request failed with status {}", status)
        } else {
            truncate(body, 500)
        }
    });

    match status {
        401 | 403 => Error::Unauthorized(detail),
        _ => Error::api(status, detail),
    }
}

fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .collect();
            if messages.is_empty() {
                None
            } else {
                Some(messages.join("; "))
            }
        }
        _ => None,
    }
}

fn truncate(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}
