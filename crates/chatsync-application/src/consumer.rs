//! Lifetime scope of one UI consumer.

use std::sync::{Arc, Mutex, PoisonError};

use chatsync_core::cancel::CancellationToken;
use chatsync_core::event::{Channel, Event, EventBus, Subscription};

/// Ties a consumer's in-flight calls and event handlers to its lifetime.
///
/// Calls issued with [`ConsumerScope::token`] are cancelled, and handlers
/// registered through [`ConsumerScope::subscribe`] are removed, when the
/// scope is closed or dropped. A torn-down consumer therefore neither
/// applies a stale merge nor receives further events.
pub struct ConsumerScope {
    token: CancellationToken,
    bus: Arc<EventBus>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl ConsumerScope {
    pub fn new(bus: Arc<EventBus>, parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            bus,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Registers `handler` for the lifetime of this scope. Ignored once the
    /// scope is closed.
    pub fn subscribe<F>(&self, channel: Channel, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        if self.is_closed() {
            return;
        }
        let subscription = self.bus.subscribe_scoped(channel, handler);
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscription);
    }

    /// Cancels in-flight calls and unsubscribes every handler. Idempotent.
    pub fn close(&self) {
        self.token.cancel();
        let drained: Vec<Subscription> = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        drop(drained);
    }
}

impl Drop for ConsumerScope {
    fn drop(&mut self) {
        self.close();
    }
}
