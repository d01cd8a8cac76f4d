//! Transport seam for issuing the "send message" request

use async_trait::async_trait;
use insight_api::{ApiClient, SendMessageRequest, SendMessageResponse};

/// Issues the "send message" request
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> insight_api::Result<SendMessageResponse>;
}

#[async_trait]
impl MessageSender for ApiClient {
    async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> insight_api::Result<SendMessageResponse> {
        ApiClient::send_message(self, &request).await
    }
}
