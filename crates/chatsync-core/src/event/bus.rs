use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::model::{Channel, Event};

/// Callback invoked synchronously for every event on a subscribed channel.
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Token returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

struct Subscriber {
    token: SubscriptionToken,
    channel: Channel,
    handler: EventHandler,
}

/// Process-wide fan-out of change notifications.
///
/// `publish` delivers synchronously to the handlers registered on the
/// event's channel at the moment of the call, in registration order, once
/// each. Nothing is queued or replayed. Handlers run outside the internal
/// lock, so a handler may itself subscribe, unsubscribe or publish.
pub struct EventBus {
    next_token: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            next_token: AtomicU64::new(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `handler` on `channel`.
    pub fn subscribe<F>(&self, channel: Channel, handler: F) -> SubscriptionToken
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Subscriber {
            token,
            channel,
            handler: Arc::new(handler),
        });
        token
    }

    /// Like [`subscribe`](Self::subscribe), but the registration is removed
    /// when the returned guard is dropped.
    pub fn subscribe_scoped<F>(self: &Arc<Self>, channel: Channel, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let token = self.subscribe(channel, handler);
        Subscription {
            bus: Arc::downgrade(self),
            token,
        }
    }

    /// Removes a registration. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.token != token);
        subscribers.len() != before
    }

    /// Delivers `event` to the current subscribers of its channel and
    /// returns how many handlers ran.
    pub fn publish(&self, event: Event) -> usize {
        let channel = event.channel();
        let handlers: Vec<EventHandler> = self
            .lock()
            .iter()
            .filter(|s| s.channel == channel)
            .map(|s| s.handler.clone())
            .collect();

        tracing::trace!(?channel, handlers = handlers.len(), "publishing event");
        for handler in &handlers {
            handler(&event);
        }
        handlers.len()
    }

    /// Number of handlers currently registered on `channel`.
    pub fn subscriber_count(&self, channel: &Channel) -> usize {
        self.lock().iter().filter(|s| &s.channel == channel).count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Disposable registration handle; unsubscribes on drop.
pub struct Subscription {
    bus: Weak<EventBus>,
    token: SubscriptionToken,
}

impl Subscription {
    pub fn token(&self) -> SubscriptionToken {
        self.token
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.token);
        }
    }
}
