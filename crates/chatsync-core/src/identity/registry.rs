use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use super::model::{
    BUILTIN_IDS, Identity, IdentityId, IdentityKind, MAX_CREATED_IDENTITIES, MIN_PASSWORD_LEN,
    default_builtins,
};
use crate::authority::{AccountAuthority, AccountUpdate};
use crate::cancel::{CancellationToken, cancellable};
use crate::error::{ChatSyncError, Result, ValidationError};
use crate::event::{AccountsChange, Event, EventBus};
use crate::session::SessionSlot;
use crate::store::{self, DurableStore, IDENTITIES_KEY};

/// Owner of every identity record.
///
/// Guarantees that both builtin identities are always listed, that at most
/// [`MAX_CREATED_IDENTITIES`] created identities exist, and that display
/// names are unique under case-insensitive comparison.
///
/// Mutations are serialized by an internal gate held across the authority
/// call, so two concurrent `create` calls cannot both pass the limit check.
/// The new record list is persisted before it becomes visible, and
/// `AccountsChanged` is published only after both succeeded.
pub struct IdentityRegistry {
    identities: RwLock<Vec<Identity>>,
    write_gate: Mutex<()>,
    store: Arc<dyn DurableStore>,
    session: Arc<SessionSlot>,
    authority: Arc<dyn AccountAuthority>,
    bus: Arc<EventBus>,
}

impl IdentityRegistry {
    /// Loads the persisted registry and re-merges the builtin identities.
    pub async fn load(
        store: Arc<dyn DurableStore>,
        session: Arc<SessionSlot>,
        authority: Arc<dyn AccountAuthority>,
        bus: Arc<EventBus>,
    ) -> Result<Self> {
        let stored: Vec<Identity> = store::load_json(store.as_ref(), IDENTITIES_KEY)
            .await?
            .unwrap_or_default();
        let identities = merge_with_builtins(stored);
        tracing::debug!(count = identities.len(), "identity registry loaded");

        Ok(Self {
            identities: RwLock::new(identities),
            write_gate: Mutex::new(()),
            store,
            session,
            authority,
            bus,
        })
    }

    /// Builtin identities first, then created identities in creation order.
    pub async fn list(&self) -> Vec<Identity> {
        self.identities.read().await.clone()
    }

    pub async fn get(&self, id: &IdentityId) -> Option<Identity> {
        self.identities
            .read()
            .await
            .iter()
            .find(|i| &i.id == id)
            .cloned()
    }

    pub fn is_builtin(&self, id: &IdentityId) -> bool {
        BUILTIN_IDS.contains(&id.as_str())
    }

    /// Registers a new created identity with the authority.
    pub async fn create(
        &self,
        name: &str,
        credential: &str,
        cancel: &CancellationToken,
    ) -> Result<Identity> {
        let name = validate_name(name)?;
        let _gate = self.write_gate.lock().await;
        let mut next = self.list().await;

        let created = next.iter().filter(|i| !i.is_builtin()).count();
        if created >= MAX_CREATED_IDENTITIES {
            return Err(ValidationError::LimitExceeded {
                limit: MAX_CREATED_IDENTITIES,
            }
            .into());
        }
        ensure_unique(&next, name, None)?;

        let record = cancellable(cancel, self.authority.create_account(name, credential)).await?;
        if next.iter().any(|i| i.id == record.identifier) {
            return Err(ChatSyncError::rejected(
                409,
                format!("authority reused identifier '{}'", record.identifier),
            ));
        }
        let display_name = if record.name.trim().is_empty() {
            name.to_string()
        } else {
            record.name
        };
        let identity = Identity::created(record.identifier, display_name, !credential.is_empty());
        next.push(identity.clone());
        if let Err(err) = self.commit(next).await {
            self.discard_orphan(&identity.id).await;
            return Err(err);
        }

        tracing::info!(identity = %identity.id, "created identity");
        self.bus.publish(Event::AccountsChanged(AccountsChange::Created {
            id: identity.id.clone(),
        }));
        Ok(identity)
    }

    /// Removes an account the authority created but the store never
    /// recorded, so a retry under the same name is not refused as a
    /// duplicate.
    async fn discard_orphan(&self, id: &IdentityId) {
        match self.authority.delete_account(id).await {
            Ok(()) => {
                tracing::warn!(identity = %id, "local write failed; removed the new authority account");
            }
            Err(err) => {
                tracing::warn!(identity = %id, "local write failed; authority account left orphaned: {}", err);
            }
        }
    }

    /// `create` preceded by a password/confirmation check.
    pub async fn register(
        &self,
        name: &str,
        password: &str,
        confirmation: &str,
        cancel: &CancellationToken,
    ) -> Result<Identity> {
        if password != confirmation {
            return Err(ValidationError::PasswordMismatch.into());
        }
        self.create(name, password, cancel).await
    }

    /// Renames an identity. Created identities are renamed on the authority
    /// first; builtin renames are local only.
    pub async fn rename(
        &self,
        id: &IdentityId,
        new_name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let name = validate_name(new_name)?;
        let _gate = self.write_gate.lock().await;
        let mut next = self.list().await;
        let index = position(&next, id)?;
        ensure_unique(&next, name, Some(id))?;

        if next[index].kind == IdentityKind::Created {
            cancellable(
                cancel,
                self.authority.update_account(id, &AccountUpdate::name(name)),
            )
            .await?;
        }

        next[index].display_name = name.to_string();
        self.commit(next).await?;
        self.session.rename_if_active(id, name).await?;

        tracing::info!(identity = %id, "renamed identity");
        self.bus.publish(Event::AccountsChanged(AccountsChange::Renamed {
            id: id.clone(),
            name: name.to_string(),
        }));
        Ok(())
    }

    /// Restores the identity's default display name.
    pub async fn reset_name(&self, id: &IdentityId, cancel: &CancellationToken) -> Result<()> {
        let identity = self
            .get(id)
            .await
            .ok_or_else(|| ChatSyncError::identity_not_found(id.as_str()))?;
        self.rename(id, &identity.default_name, cancel).await
    }

    /// Sets a new credential on a created identity.
    pub async fn change_credential(
        &self,
        id: &IdentityId,
        new_password: &str,
        confirmation: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if new_password != confirmation {
            return Err(ValidationError::PasswordMismatch.into());
        }
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::WeakPassword {
                min_len: MIN_PASSWORD_LEN,
            }
            .into());
        }

        let _gate = self.write_gate.lock().await;
        let mut next = self.list().await;
        let index = position(&next, id)?;
        if next[index].is_builtin() {
            return Err(ChatSyncError::forbidden("change credential", id.as_str()));
        }

        cancellable(
            cancel,
            self.authority
                .update_account(id, &AccountUpdate::password(new_password)),
        )
        .await?;

        next[index].has_credential = true;
        self.commit(next).await?;
        self.bus
            .publish(Event::AccountsChanged(AccountsChange::CredentialChanged {
                id: id.clone(),
            }));
        Ok(())
    }

    /// Deletes a created identity, logging out if it was active.
    pub async fn delete(&self, id: &IdentityId, cancel: &CancellationToken) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let mut next = self.list().await;
        let index = position(&next, id)?;
        if next[index].is_builtin() {
            return Err(ChatSyncError::forbidden("delete", id.as_str()));
        }

        match cancellable(cancel, self.authority.delete_account(id)).await {
            Ok(()) => {}
            Err(ChatSyncError::NotFound(_)) => {
                tracing::debug!(identity = %id, "authority already forgot identity");
            }
            Err(err) => return Err(err),
        }

        next.remove(index);
        self.commit(next).await?;
        self.session.clear_if_active(id).await?;

        tracing::info!(identity = %id, "deleted identity");
        self.bus
            .publish(Event::AccountsChanged(AccountsChange::Deleted { id: id.clone() }));
        Ok(())
    }

    /// Removes created identities the authority no longer knows.
    ///
    /// Each created identity is looked up individually; lookup failures are
    /// logged and the identity is kept. If anything was removed the registry
    /// is persisted once, the session is cleared when its identity was
    /// removed, and a single `AccountsChanged` is published.
    pub async fn reconcile_with_authority(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<IdentityId>> {
        let candidates: Vec<IdentityId> = self
            .list()
            .await
            .into_iter()
            .filter(|i| !i.is_builtin())
            .map(|i| i.id)
            .collect();

        let mut absent = Vec::new();
        for id in candidates {
            match cancellable(cancel, self.authority.fetch_account(&id)).await {
                Ok(Some(_)) => {}
                Ok(None) => absent.push(id),
                Err(ChatSyncError::Cancelled) => return Err(ChatSyncError::Cancelled),
                Err(err) => {
                    tracing::warn!(target: "reconcile", identity = %id, "existence check failed: {}", err);
                }
            }
        }

        if absent.is_empty() {
            return Ok(absent);
        }

        let _gate = self.write_gate.lock().await;
        let current = self.list().await;
        let removed: Vec<IdentityId> = current
            .iter()
            .filter(|i| !i.is_builtin() && absent.contains(&i.id))
            .map(|i| i.id.clone())
            .collect();
        if removed.is_empty() {
            return Ok(removed);
        }
        let next = current
            .into_iter()
            .filter(|i| !removed.contains(&i.id))
            .collect();
        self.commit(next).await?;

        for id in &removed {
            self.session.clear_if_active(id).await?;
        }

        tracing::info!(target: "reconcile", removed = removed.len(), "removed identities unknown to the authority");
        self.bus
            .publish(Event::AccountsChanged(AccountsChange::Reconciled {
                removed: removed.clone(),
            }));
        Ok(removed)
    }

    /// Records the canonical id/name returned by an authority login.
    ///
    /// Login trusts the authority but never breaks the registry invariants:
    /// when adding or renaming the record would exceed the created limit or
    /// collide with another name, the registry is left as is.
    pub async fn upsert_authenticated(&self, id: &IdentityId, name: &str) -> Result<Identity> {
        let _gate = self.write_gate.lock().await;
        let mut next = self.list().await;

        let name = name.trim();
        match next.iter().position(|i| &i.id == id) {
            Some(index) => {
                let unchanged = name.is_empty()
                    || next[index].display_name == name
                    || ensure_unique(&next, name, Some(id)).is_err();
                if unchanged {
                    return Ok(next[index].clone());
                }
                let builtin = next[index].is_builtin();
                next[index].display_name = name.to_string();
                next[index].has_credential |= !builtin;
            }
            None => {
                let created = next.iter().filter(|i| !i.is_builtin()).count();
                let fallback = Identity::created(id.clone(), name, true);
                if name.is_empty()
                    || created >= MAX_CREATED_IDENTITIES
                    || ensure_unique(&next, name, None).is_err()
                {
                    tracing::warn!(identity = %id, "authenticated identity not added to registry");
                    return Ok(fallback);
                }
                next.push(fallback);
            }
        }

        let index = position(&next, id)?;
        let identity = next[index].clone();
        self.commit(next).await?;
        self.bus
            .publish(Event::AccountsChanged(AccountsChange::Authenticated {
                id: id.clone(),
            }));
        Ok(identity)
    }

    async fn commit(&self, next: Vec<Identity>) -> Result<()> {
        store::save_json(self.store.as_ref(), IDENTITIES_KEY, &next).await?;
        *self.identities.write().await = next;
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName.into());
    }
    Ok(name)
}

fn position(identities: &[Identity], id: &IdentityId) -> Result<usize> {
    identities
        .iter()
        .position(|i| &i.id == id)
        .ok_or_else(|| ChatSyncError::identity_not_found(id.as_str()))
}

fn ensure_unique(identities: &[Identity], name: &str, except: Option<&IdentityId>) -> Result<()> {
    let taken = identities
        .iter()
        .filter(|i| Some(&i.id) != except)
        .any(|i| i.has_name(name));
    if taken {
        return Err(ValidationError::DuplicateName(name.to_string()).into());
    }
    Ok(())
}

/// Builtins first (keeping stored renames), then stored created identities.
fn merge_with_builtins(stored: Vec<Identity>) -> Vec<Identity> {
    let mut merged: Vec<Identity> = default_builtins()
        .into_iter()
        .map(|builtin| {
            stored
                .iter()
                .find(|s| s.id == builtin.id && !s.display_name.trim().is_empty())
                .map(|s| Identity {
                    display_name: s.display_name.clone(),
                    ..builtin.clone()
                })
                .unwrap_or(builtin)
        })
        .collect();

    merged.extend(
        stored
            .into_iter()
            .filter(|s| !BUILTIN_IDS.contains(&s.id.as_str()))
            .map(|s| Identity {
                kind: IdentityKind::Created,
                ..s
            }),
    );
    merged
}
