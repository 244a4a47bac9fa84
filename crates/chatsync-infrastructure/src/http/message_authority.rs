//! Message authority over REST.

use async_trait::async_trait;
use chatsync_core::authority::{
    MessageAuthority, MessagePage, NewMessage, PostedMessage, decode_message_page,
};
use chatsync_core::error::{ChatSyncError, Result};
use chatsync_core::identity::IdentityId;
use serde::{Deserialize, Serialize};

use super::client::{ApiClient, rejected_status};

#[derive(Serialize)]
struct HistoryRequest<'a> {
    user: &'a str,
}

#[derive(Deserialize)]
struct HistoryDeleted {
    #[serde(default)]
    deleted_count: u64,
}

/// `MessageAuthority` speaking to `/api/messages/`.
#[derive(Debug, Clone)]
pub struct HttpMessageAuthority {
    api: ApiClient,
}

impl HttpMessageAuthority {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl MessageAuthority for HttpMessageAuthority {
    async fn list_messages(&self, user: &IdentityId, page: u32) -> Result<MessagePage> {
        let page_param = page.to_string();
        let request = self
            .api
            .get(self.api.endpoint(&["messages"]))
            .query(&[("user", user.as_str()), ("page", page_param.as_str())]);

        match self.api.execute(request).await {
            Ok(body) => decode_message_page(body),
            // Paginated backends answer 404 past the last page.
            Err(err) if page > 1 && rejected_status(&err) == Some(404) => {
                Ok(MessagePage::default())
            }
            Err(err) => Err(err),
        }
    }

    async fn post_message(&self, message: &NewMessage) -> Result<PostedMessage> {
        let request = self
            .api
            .post(self.api.endpoint(&["messages"]))
            .json(message);
        self.api.execute_as(request).await
    }

    async fn mark_viewed(&self, user: &IdentityId) -> Result<()> {
        let request = self
            .api
            .post(self.api.endpoint(&["messages", "mark_viewed"]))
            .query(&[("user", user.as_str())]);
        self.api.execute(request).await.map(|_| ())
    }

    async fn delete_history(&self, user: &IdentityId) -> Result<u64> {
        let request = self
            .api
            .post(self.api.endpoint(&["messages", "delete_history"]))
            .json(&HistoryRequest {
                user: user.as_str(),
            });
        let body = self.api.execute(request).await?;
        if body.is_null() {
            return Ok(0);
        }
        let deleted: HistoryDeleted = serde_json::from_value(body)
            .map_err(|e| ChatSyncError::decode(e.to_string()))?;
        Ok(deleted.deleted_count)
    }
}
