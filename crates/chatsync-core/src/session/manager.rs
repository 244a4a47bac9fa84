use std::sync::Arc;

use super::model::Session;
use super::slot::SessionSlot;
use crate::authority::AccountAuthority;
use crate::cancel::{CancellationToken, cancellable};
use crate::error::{ChatSyncError, Result};
use crate::identity::{IdentityId, IdentityRegistry};

/// Manages the single active session.
///
/// `SessionManager` is responsible for:
/// - Logging in, forwarding credentials of created identities to the authority
/// - Hopping between already-known identities
/// - Logging out
/// - Dropping a restored session whose identity no longer exists
pub struct SessionManager {
    slot: Arc<SessionSlot>,
    registry: Arc<IdentityRegistry>,
    authority: Arc<dyn AccountAuthority>,
}

impl SessionManager {
    pub fn new(
        slot: Arc<SessionSlot>,
        registry: Arc<IdentityRegistry>,
        authority: Arc<dyn AccountAuthority>,
    ) -> Self {
        Self {
            slot,
            registry,
            authority,
        }
    }

    /// Validates the session restored from the durable store.
    ///
    /// A session whose identity is missing from the registry is cleared.
    ///
    /// # Returns
    ///
    /// The surviving session, if any.
    pub async fn restore(&self) -> Result<Option<Session>> {
        let Some(session) = self.slot.current().await else {
            return Ok(None);
        };
        match self.registry.get(&session.active_identity_id).await {
            Some(identity) if identity.display_name != session.display_name_snapshot => {
                let refreshed = Session::for_identity(&identity);
                Ok(Some(self.slot.set(refreshed).await?))
            }
            Some(_) => Ok(Some(session)),
            None => {
                tracing::warn!(
                    identity = %session.active_identity_id,
                    "discarding session of unknown identity"
                );
                self.slot.clear().await?;
                Ok(None)
            }
        }
    }

    pub async fn current(&self) -> Option<Session> {
        self.slot.current().await
    }

    /// Logs into `id`.
    ///
    /// Builtin identities need no credential and never contact the authority.
    /// Any other id is verified by the authority, whose canonical id and name
    /// are recorded in the registry.
    ///
    /// # Errors
    ///
    /// - `InvalidCredential` when the authority rejects the credential
    /// - `AuthorityUnavailable` when the authority cannot be reached
    pub async fn login(
        &self,
        id: &IdentityId,
        credential: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Session> {
        if self.registry.is_builtin(id) {
            let identity = self
                .registry
                .get(id)
                .await
                .ok_or_else(|| ChatSyncError::identity_not_found(id.as_str()))?;
            tracing::info!(identity = %id, "logged in");
            return self.slot.set(Session::for_identity(&identity)).await;
        }

        let record = cancellable(
            cancel,
            self.authority.login(id, credential.unwrap_or_default()),
        )
        .await?;
        let identity = self
            .registry
            .upsert_authenticated(&record.identifier, &record.name)
            .await?;

        tracing::info!(identity = %identity.id, "logged in");
        self.slot.set(Session::for_identity(&identity)).await
    }

    /// Switches to an identity already present in the registry without
    /// contacting the authority.
    pub async fn switch(&self, id: &IdentityId) -> Result<Session> {
        let identity = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| ChatSyncError::identity_not_found(id.as_str()))?;
        tracing::info!(identity = %id, "switched identity");
        self.slot.set(Session::for_identity(&identity)).await
    }

    /// Clears the session. Idempotent.
    pub async fn logout(&self) -> Result<()> {
        self.slot.clear().await
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod manager_test;
