use std::sync::Arc;

use tokio::sync::Mutex;

use super::model::Session;
use crate::error::Result;
use crate::event::{Event, EventBus};
use crate::identity::IdentityId;
use crate::store::{self, DurableStore, SESSION_KEY};

/// Persisted holder of the active session.
///
/// Owned by the session manager and shared with the identity registry so
/// that renames and removals of the active identity update or clear the
/// session synchronously. Every change is written to the durable store
/// before it becomes visible and before `SessionChanged` is published.
pub struct SessionSlot {
    current: Mutex<Option<Session>>,
    store: Arc<dyn DurableStore>,
    bus: Arc<EventBus>,
}

impl SessionSlot {
    /// Restores the persisted session, if any.
    pub async fn load(store: Arc<dyn DurableStore>, bus: Arc<EventBus>) -> Result<Self> {
        let current: Option<Session> = store::load_json(store.as_ref(), SESSION_KEY).await?;
        if let Some(session) = &current {
            tracing::info!(identity = %session.active_identity_id, "restored session");
        }
        Ok(Self {
            current: Mutex::new(current),
            store,
            bus,
        })
    }

    pub async fn current(&self) -> Option<Session> {
        self.current.lock().await.clone()
    }

    /// Makes `session` the active one.
    pub async fn set(&self, session: Session) -> Result<Session> {
        let mut current = self.current.lock().await;
        store::save_json(self.store.as_ref(), SESSION_KEY, &session).await?;
        *current = Some(session.clone());
        drop(current);

        self.bus.publish(Event::SessionChanged {
            session: Some(session.clone()),
        });
        Ok(session)
    }

    /// Clears the session. Idempotent: clearing an empty slot still
    /// succeeds but publishes nothing.
    pub async fn clear(&self) -> Result<()> {
        let mut current = self.current.lock().await;
        if current.is_none() {
            return Ok(());
        }
        self.store.remove(SESSION_KEY).await?;
        *current = None;
        drop(current);

        self.bus.publish(Event::SessionChanged { session: None });
        Ok(())
    }

    /// Clears the session only if it belongs to `id`. Returns whether it did.
    pub async fn clear_if_active(&self, id: &IdentityId) -> Result<bool> {
        let mut current = self.current.lock().await;
        if !current.as_ref().is_some_and(|s| s.is_for(id)) {
            return Ok(false);
        }
        self.store.remove(SESSION_KEY).await?;
        *current = None;
        drop(current);

        tracing::info!(identity = %id, "session cleared because its identity went away");
        self.bus.publish(Event::SessionChanged { session: None });
        Ok(true)
    }

    /// Updates the display name snapshot if `id` is the active identity.
    pub async fn rename_if_active(&self, id: &IdentityId, name: &str) -> Result<bool> {
        let mut current = self.current.lock().await;
        let Some(session) = current.as_ref().filter(|s| s.is_for(id)) else {
            return Ok(false);
        };
        let renamed = Session {
            active_identity_id: session.active_identity_id.clone(),
            display_name_snapshot: name.to_string(),
        };
        store::save_json(self.store.as_ref(), SESSION_KEY, &renamed).await?;
        *current = Some(renamed.clone());
        drop(current);

        self.bus.publish(Event::SessionChanged {
            session: Some(renamed),
        });
        Ok(true)
    }
}
