use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::identity::IdentityId;

/// Canonical account data returned by the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub identifier: IdentityId,
    #[serde(default)]
    pub name: String,
}

/// Partial account update (`PUT /accounts/{id}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccountUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl AccountUpdate {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            password: None,
        }
    }

    pub fn password(password: impl Into<String>) -> Self {
        Self {
            name: None,
            password: Some(password.into()),
        }
    }
}

/// External system of record for accounts and credentials.
///
/// Error contract:
/// - transport failures and 5xx map to `AuthorityUnavailable`
/// - `login` with a bad or missing credential maps to `Auth(InvalidCredential)`
/// - unknown accounts map to `NotFound(Identity)`, except in
///   [`fetch_account`](Self::fetch_account) which returns `Ok(None)`
/// - other refusals map to `Rejected`
#[async_trait]
pub trait AccountAuthority: Send + Sync {
    /// `POST /accounts`: registers a new account.
    async fn create_account(&self, name: &str, password: &str) -> Result<AccountRecord>;

    /// `GET /accounts/{id}`: `None` when the authority does not know the id.
    async fn fetch_account(&self, id: &IdentityId) -> Result<Option<AccountRecord>>;

    /// `PUT /accounts/{id}`.
    async fn update_account(&self, id: &IdentityId, update: &AccountUpdate)
    -> Result<AccountRecord>;

    /// `DELETE /accounts/{id}`.
    async fn delete_account(&self, id: &IdentityId) -> Result<()>;

    /// `POST /auth/login`: verifies the credential and returns the
    /// canonical identifier and name.
    async fn login(&self, id: &IdentityId, password: &str) -> Result<AccountRecord>;
}
