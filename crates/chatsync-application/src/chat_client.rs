//! Process-wide composition of the engine.

use std::sync::Arc;

use anyhow::{Context, Result};
use chatsync_core::authority::{AccountAuthority, MessageAuthority};
use chatsync_core::cancel::CancellationToken;
use chatsync_core::config::ClientConfig;
use chatsync_core::event::EventBus;
use chatsync_core::identity::{Identity, IdentityRegistry};
use chatsync_core::message::MessageCache;
use chatsync_core::session::{SessionManager, SessionSlot};
use chatsync_core::store::DurableStore;
use chatsync_infrastructure::{
    ApiClient, ChatSyncPaths, HttpAccountAuthority, HttpMessageAuthority, LocalAuthority,
    TomlFileStore,
};

use crate::consumer::ConsumerScope;
use crate::reconcile_scheduler::ReconcileScheduler;

/// One store, one bus and the three owning components of a process.
///
/// Consumers never touch the store or the bus directly; they call the
/// registry, the session manager and the message cache, and subscribe
/// through a [`ConsumerScope`].
pub struct ChatClient {
    config: ClientConfig,
    bus: Arc<EventBus>,
    registry: Arc<IdentityRegistry>,
    sessions: Arc<SessionManager>,
    messages: Arc<MessageCache>,
}

impl ChatClient {
    /// Builds the client from configuration: a TOML store under the data
    /// directory and either the local or the HTTP authorities.
    pub async fn bootstrap(config: ClientConfig, paths: &ChatSyncPaths) -> Result<Self> {
        let store: Arc<dyn DurableStore> = Arc::new(TomlFileStore::new(paths.store_file()));

        let (accounts, messages): (Arc<dyn AccountAuthority>, Arc<dyn MessageAuthority>) =
            if config.uses_local_authority() {
                tracing::info!("using local authority");
                let local = Arc::new(LocalAuthority::new(store.clone()));
                (local.clone(), local)
            } else {
                let base = config.api_base.clone().unwrap_or_default();
                tracing::info!(api_base = %base, "using http authority");
                let api = ApiClient::new(&base, config.request_timeout())
                    .context("Failed to configure the authority client")?;
                (
                    Arc::new(HttpAccountAuthority::new(api.clone())),
                    Arc::new(HttpMessageAuthority::new(api)),
                )
            };

        Self::with_parts(config, store, accounts, messages).await
    }

    /// Builds the client around injected collaborators.
    pub async fn with_parts(
        config: ClientConfig,
        store: Arc<dyn DurableStore>,
        accounts: Arc<dyn AccountAuthority>,
        messages: Arc<dyn MessageAuthority>,
    ) -> Result<Self> {
        let bus = Arc::new(EventBus::new());
        let slot = Arc::new(
            SessionSlot::load(store.clone(), bus.clone())
                .await
                .context("Failed to load the session")?,
        );
        let registry = Arc::new(
            IdentityRegistry::load(store, slot.clone(), accounts.clone(), bus.clone())
                .await
                .context("Failed to load the identity registry")?,
        );
        let sessions = Arc::new(SessionManager::new(slot, registry.clone(), accounts));
        sessions
            .restore()
            .await
            .context("Failed to restore the session")?;
        let cache = Arc::new(MessageCache::new(
            registry.clone(),
            messages,
            bus.clone(),
            config.cache_settings(),
        ));

        Ok(Self {
            config,
            bus,
            registry,
            sessions,
            messages: cache,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<IdentityRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn messages(&self) -> &Arc<MessageCache> {
        &self.messages
    }

    /// A consumer scope whose token is a child of `parent`.
    pub fn scope(&self, parent: &CancellationToken) -> ConsumerScope {
        ConsumerScope::new(self.bus.clone(), parent)
    }

    /// Starts periodic reconciliation at the configured interval.
    pub fn start_reconcile_scheduler(&self, token: CancellationToken) -> ReconcileScheduler {
        ReconcileScheduler::start(
            self.registry.clone(),
            self.config.reconcile_interval(),
            token,
        )
    }

    /// The identity of the active session.
    pub async fn active_identity(&self) -> Result<Identity> {
        let session = self
            .sessions
            .current()
            .await
            .context("Not logged in. Run `chatsync login <id>` first")?;
        self.registry
            .get(&session.active_identity_id)
            .await
            .with_context(|| format!("Identity '{}' no longer exists", session.active_identity_id))
    }
}
