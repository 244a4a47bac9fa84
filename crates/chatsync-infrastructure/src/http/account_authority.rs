//! Account authority over REST.

use async_trait::async_trait;
use chatsync_core::authority::{AccountAuthority, AccountRecord, AccountUpdate};
use chatsync_core::error::{ChatSyncError, Result};
use chatsync_core::identity::IdentityId;
use serde::Serialize;
use serde_json::Value;

use super::client::{ApiClient, rejected_status};

#[derive(Serialize)]
struct NewAccount<'a> {
    name: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct Credentials<'a> {
    identifier: &'a str,
    password: &'a str,
}

/// `AccountAuthority` speaking to `/api/accounts/` and `/api/auth/login/`.
#[derive(Debug, Clone)]
pub struct HttpAccountAuthority {
    api: ApiClient,
}

impl HttpAccountAuthority {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

/// Turns a 404 into `NotFound` for `id`.
fn not_found_as_identity(err: ChatSyncError, id: &IdentityId) -> ChatSyncError {
    match rejected_status(&err) {
        Some(404) => ChatSyncError::identity_not_found(id.as_str()),
        _ => err,
    }
}

#[async_trait]
impl AccountAuthority for HttpAccountAuthority {
    async fn create_account(&self, name: &str, password: &str) -> Result<AccountRecord> {
        let request = self
            .api
            .post(self.api.endpoint(&["accounts"]))
            .json(&NewAccount { name, password });
        let record: AccountRecord = self.api.execute_as(request).await?;
        tracing::debug!(identity = %record.identifier, "authority created account");
        Ok(record)
    }

    async fn fetch_account(&self, id: &IdentityId) -> Result<Option<AccountRecord>> {
        let request = self.api.get(self.api.endpoint(&["accounts", id.as_str()]));
        match self.api.execute_as(request).await {
            Ok(record) => Ok(Some(record)),
            Err(err) if rejected_status(&err) == Some(404) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn update_account(&self, id: &IdentityId, update: &AccountUpdate) -> Result<AccountRecord> {
        let request = self
            .api
            .put(self.api.endpoint(&["accounts", id.as_str()]))
            .json(update);
        let body = self
            .api
            .execute(request)
            .await
            .map_err(|e| not_found_as_identity(e, id))?;

        if body.is_null() {
            return Ok(AccountRecord {
                identifier: id.clone(),
                name: update.name.clone().unwrap_or_default(),
            });
        }
        serde_json::from_value(body).map_err(|e| ChatSyncError::decode(e.to_string()))
    }

    async fn delete_account(&self, id: &IdentityId) -> Result<()> {
        let request = self
            .api
            .delete(self.api.endpoint(&["accounts", id.as_str()]));
        self.api
            .execute(request)
            .await
            .map(|_: Value| ())
            .map_err(|e| not_found_as_identity(e, id))
    }

    async fn login(&self, id: &IdentityId, password: &str) -> Result<AccountRecord> {
        let request = self
            .api
            .post(self.api.endpoint(&["auth", "login"]))
            .json(&Credentials {
                identifier: id.as_str(),
                password,
            });
        self.api
            .execute_as(request)
            .await
            .map_err(|err| match rejected_status(&err) {
                Some(400 | 401 | 403) => ChatSyncError::invalid_credential(id.as_str()),
                Some(404) => ChatSyncError::identity_not_found(id.as_str()),
                _ => err,
            })
    }
}
