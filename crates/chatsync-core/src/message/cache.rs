//! Per-identity message engine.
//!
//! Every operation on one identity locks that identity's partition for its
//! whole duration, authority calls included, so a `send` and a `fetch_page`
//! for the same identity never interleave their merges. Partitions of
//! different identities are independent.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use super::merge::Partition;
use super::model::{DeliveryState, Direction, Message, MessageId};
use super::timeline::{MessageFilter, Timeline};
use crate::authority::{MessageAuthority, NewMessage};
use crate::cancel::{CancellationToken, cancellable, pause};
use crate::error::{ChatSyncError, Result, ValidationError};
use crate::event::{Event, EventBus, MessagesChange};
use crate::identity::{IdentityId, IdentityRegistry};

/// Delay before a reply is exposed, in milliseconds.
pub const DEFAULT_REPLY_LATENCY_MS: u64 = 480;
/// Upper bound on authority pages followed by one `fetch_page`.
pub const DEFAULT_MAX_AUTHORITY_PAGES: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Cosmetic "composing" delay before the reply of a `send` appears.
    pub reply_latency: Duration,
    pub max_authority_pages: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            reply_latency: Duration::from_millis(DEFAULT_REPLY_LATENCY_MS),
            max_authority_pages: DEFAULT_MAX_AUTHORITY_PAGES,
        }
    }
}

/// Reply text used when the authority did not produce one.
pub fn fallback_reply(display_name: &str) -> String {
    format!(
        "Thanks, {}. Our team will get back to you shortly.",
        display_name
    )
}

type SharedPartition = Arc<Mutex<Partition>>;

pub struct MessageCache {
    partitions: StdMutex<HashMap<IdentityId, SharedPartition>>,
    composing: StdMutex<HashSet<IdentityId>>,
    registry: Arc<IdentityRegistry>,
    authority: Arc<dyn MessageAuthority>,
    bus: Arc<EventBus>,
    settings: CacheSettings,
}

impl MessageCache {
    pub fn new(
        registry: Arc<IdentityRegistry>,
        authority: Arc<dyn MessageAuthority>,
        bus: Arc<EventBus>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            partitions: StdMutex::new(HashMap::new()),
            composing: StdMutex::new(HashSet::new()),
            registry,
            authority,
            bus,
            settings,
        }
    }

    fn partition(&self, identity_id: &IdentityId) -> SharedPartition {
        let mut partitions = self
            .partitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        partitions
            .entry(identity_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Partition::new(identity_id.clone()))))
            .clone()
    }

    fn publish(&self, identity_id: &IdentityId, change: MessagesChange) {
        self.bus.publish(Event::messages(identity_id, change));
    }

    /// Fetches every authority page for `identity_id`, merges the records,
    /// and returns the filtered timeline.
    ///
    /// All pages are read before anything is merged, so a failed or
    /// cancelled fetch leaves the cache untouched. The filter only shapes
    /// the returned view; every record is merged.
    pub async fn fetch_page(
        &self,
        identity_id: &IdentityId,
        filter: &MessageFilter,
        cancel: &CancellationToken,
    ) -> Result<Timeline> {
        let partition = self.partition(identity_id);
        let mut partition = partition.lock().await;

        let mut records = Vec::new();
        let mut page = 1;
        loop {
            let batch = cancellable(cancel, self.authority.list_messages(identity_id, page)).await?;
            records.extend(batch.records);
            if !batch.has_next {
                break;
            }
            if page >= self.settings.max_authority_pages {
                tracing::warn!(identity = %identity_id, pages = page, "authority paging truncated");
                break;
            }
            page += 1;
        }

        let outcome = partition.merge(records.into_iter().map(|r| r.into_message()));
        let timeline = partition.timeline(filter);
        drop(partition);

        if outcome.changed() {
            self.publish(identity_id, MessagesChange::Updated);
        }
        Ok(timeline)
    }

    /// The cached timeline, without contacting the authority.
    pub async fn timeline(&self, identity_id: &IdentityId, filter: &MessageFilter) -> Timeline {
        self.partition(identity_id).lock().await.timeline(filter)
    }

    pub async fn unread_count(&self, identity_id: &IdentityId) -> usize {
        self.partition(identity_id).lock().await.unread_count()
    }

    /// Whether a reply for `identity_id` is currently being composed.
    pub fn is_composing(&self, identity_id: &IdentityId) -> bool {
        self.composing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(identity_id)
    }

    fn set_composing(&self, identity_id: &IdentityId, on: bool) {
        let mut composing = self
            .composing
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if on {
            composing.insert(identity_id.clone());
        } else {
            composing.remove(identity_id);
        }
    }

    /// Sends `text` as `identity_id` and returns the sent message with its
    /// correlated reply.
    ///
    /// The sent entry is visible immediately as `Provisional`. When the
    /// authority refuses or cannot be reached the entry stays in the cache as
    /// `Failed` and the error is returned. Cancelling during the reply
    /// latency only shortens the delay; the reply is still recorded.
    pub async fn send(
        &self,
        identity_id: &IdentityId,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<(Message, Message)> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyText.into());
        }
        let identity = self
            .registry
            .get(identity_id)
            .await
            .ok_or_else(|| ChatSyncError::identity_not_found(identity_id.as_str()))?;

        let partition = self.partition(identity_id);
        let mut partition = partition.lock().await;

        let provisional = Message {
            id: MessageId::local(),
            identity_id: identity_id.clone(),
            text: text.to_string(),
            direction: Direction::Sent,
            created_at: Utc::now(),
            viewed: false,
            correlation_id: None,
            delivery: DeliveryState::Provisional,
        };
        partition.insert_local(provisional.clone());
        self.publish(identity_id, MessagesChange::Pending);

        let request = NewMessage {
            user: identity_id.clone(),
            text: text.to_string(),
            user_name: identity.display_name.clone(),
        };
        let posted = match cancellable(cancel, self.authority.post_message(&request)).await {
            Ok(posted) => posted,
            Err(ChatSyncError::Cancelled) => return Err(ChatSyncError::Cancelled),
            Err(err) => {
                tracing::warn!(identity = %identity_id, "send failed: {}", err);
                partition.set_delivery(&provisional.id, DeliveryState::Failed);
                drop(partition);
                self.publish(identity_id, MessagesChange::Updated);
                return Err(err);
            }
        };

        let sent = Message {
            id: posted.id,
            created_at: posted.created_at,
            delivery: DeliveryState::Confirmed,
            ..provisional.clone()
        };
        partition.replace(&provisional.id, sent.clone());

        self.set_composing(identity_id, true);
        self.publish(identity_id, MessagesChange::Composing);
        if !pause(cancel, self.settings.reply_latency).await {
            tracing::debug!(identity = %identity_id, "reply latency cut short");
        }

        let reply_text = posted
            .response_text
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| fallback_reply(&identity.display_name));
        let (reply_id, delivery) = match posted.response_id {
            Some(id) => (id, DeliveryState::Confirmed),
            None => (
                MessageId::new(format!("{}-r", sent.id)),
                DeliveryState::Provisional,
            ),
        };
        let reply = Message {
            id: reply_id,
            identity_id: identity_id.clone(),
            text: reply_text,
            direction: Direction::Received,
            created_at: Utc::now().max(sent.created_at + chrono::Duration::milliseconds(1)),
            viewed: false,
            correlation_id: Some(sent.id.clone()),
            delivery,
        };
        let reply = match partition.get(&reply.id) {
            Some(existing) => existing.clone(),
            None => {
                partition.insert_local(reply.clone());
                reply
            }
        };
        drop(partition);

        self.set_composing(identity_id, false);
        tracing::info!(identity = %identity_id, message = %sent.id, "message sent");
        self.publish(identity_id, MessagesChange::ReplyReceived);
        Ok((sent, reply))
    }

    /// Flags every received message as viewed.
    ///
    /// The local update always applies. The authority call is best effort:
    /// its failures are logged and never returned.
    pub async fn mark_viewed(
        &self,
        identity_id: &IdentityId,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let partition = self.partition(identity_id);
        let mut partition = partition.lock().await;
        let changed = partition.mark_viewed(Direction::Received);

        match cancellable(cancel, self.authority.mark_viewed(identity_id)).await {
            Ok(()) => {}
            Err(ChatSyncError::Cancelled) => {
                tracing::debug!(identity = %identity_id, "mark viewed cancelled");
            }
            Err(err) => {
                tracing::warn!(identity = %identity_id, "mark viewed not acknowledged: {}", err);
            }
        }
        drop(partition);

        if changed > 0 {
            self.publish(identity_id, MessagesChange::Viewed);
        }
        Ok(changed)
    }

    /// Deletes the identity's history on the authority, then locally.
    pub async fn delete_history(
        &self,
        identity_id: &IdentityId,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let partition = self.partition(identity_id);
        let mut partition = partition.lock().await;

        let deleted = cancellable(cancel, self.authority.delete_history(identity_id)).await?;
        partition.clear();
        drop(partition);

        tracing::info!(identity = %identity_id, deleted, "history deleted");
        self.publish(identity_id, MessagesChange::Cleared);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::{
        AccountAuthority, AccountRecord, AccountUpdate, MessagePage, MessageRecord, PostedMessage,
    };
    use crate::event::Channel;
    use crate::session::SessionSlot;
    use crate::store::testing::MemoryStore;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone};
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

    struct NoAccounts;

    #[async_trait]
    impl AccountAuthority for NoAccounts {
        async fn create_account(&self, _name: &str, _password: &str) -> Result<AccountRecord> {
            Err(ChatSyncError::unavailable("offline"))
        }
        async fn fetch_account(&self, _id: &IdentityId) -> Result<Option<AccountRecord>> {
            Ok(None)
        }
        async fn update_account(&self, id: &IdentityId, _u: &AccountUpdate) -> Result<AccountRecord> {
            Err(ChatSyncError::identity_not_found(id.as_str()))
        }
        async fn delete_account(&self, _id: &IdentityId) -> Result<()> {
            Ok(())
        }
        async fn login(&self, id: &IdentityId, _password: &str) -> Result<AccountRecord> {
            Err(ChatSyncError::invalid_credential(id.as_str()))
        }
    }

    /// Authority holding a scripted server-side history.
    #[derive(Default)]
    struct MockMessages {
        pages: StdMutex<Vec<Vec<MessageRecord>>>,
        next_id: AtomicU64,
        reply_text: StdMutex<Option<String>>,
        with_response_id: AtomicBool,
        offline: AtomicBool,
        /// Record posted messages and their replies as the authority would.
        keep_posts: AtomicBool,
        list_calls: AtomicUsize,
        viewed_calls: AtomicUsize,
    }

    impl MockMessages {
        fn check_online(&self) -> Result<()> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(ChatSyncError::unavailable("connection refused"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl MessageAuthority for MockMessages {
        async fn list_messages(&self, _user: &IdentityId, page: u32) -> Result<MessagePage> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.check_online()?;
            let pages = self.pages.lock().unwrap();
            let index = page as usize - 1;
            Ok(MessagePage {
                records: pages.get(index).cloned().unwrap_or_default(),
                count: None,
                has_next: index + 1 < pages.len(),
            })
        }

        async fn post_message(&self, message: &NewMessage) -> Result<PostedMessage> {
            self.check_online()?;
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let created_at = Utc::now();
            let response_text = self.reply_text.lock().unwrap().clone();
            let response_id = self
                .with_response_id
                .load(Ordering::SeqCst)
                .then(|| MessageId::from(id + 1000));

            if self.keep_posts.load(Ordering::SeqCst) {
                let sent = MessageRecord {
                    id: MessageId::from(id),
                    user: message.user.clone(),
                    user_name: Some(message.user_name.clone()),
                    text: message.text.clone(),
                    direction: Direction::Sent,
                    viewed: false,
                    created_at,
                };
                let reply = MessageRecord {
                    id: response_id
                        .clone()
                        .unwrap_or_else(|| MessageId::new(format!("{}-r", id))),
                    text: response_text
                        .clone()
                        .unwrap_or_else(|| fallback_reply(&message.user_name)),
                    direction: Direction::Received,
                    created_at: created_at + chrono::Duration::milliseconds(10),
                    ..sent.clone()
                };
                let mut pages = self.pages.lock().unwrap();
                if pages.is_empty() {
                    pages.push(Vec::new());
                }
                pages[0].extend([sent, reply]);
            }

            Ok(PostedMessage {
                id: MessageId::from(id),
                user: message.user.clone(),
                text: message.text.clone(),
                created_at,
                response_text,
                response_id,
            })
        }

        async fn mark_viewed(&self, _user: &IdentityId) -> Result<()> {
            self.viewed_calls.fetch_add(1, Ordering::SeqCst);
            self.check_online()
        }

        async fn delete_history(&self, _user: &IdentityId) -> Result<u64> {
            self.check_online()?;
            let mut pages = self.pages.lock().unwrap();
            let count = pages.iter().map(Vec::len).sum::<usize>() as u64;
            pages.clear();
            Ok(count)
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn record(id: &str, secs: i64, direction: Direction, text: &str) -> MessageRecord {
        MessageRecord {
            id: MessageId::new(id),
            user: IdentityId::new("A"),
            user_name: Some("User A".to_string()),
            text: text.to_string(),
            direction,
            viewed: false,
            created_at: at(secs),
        }
    }

    struct Fixture {
        cache: Arc<MessageCache>,
        authority: Arc<MockMessages>,
        bus: Arc<EventBus>,
        token: CancellationToken,
        a: IdentityId,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(EventBus::new());
        let slot = Arc::new(SessionSlot::load(store.clone(), bus.clone()).await.unwrap());
        let registry = Arc::new(
            IdentityRegistry::load(store, slot, Arc::new(NoAccounts), bus.clone())
                .await
                .unwrap(),
        );
        let authority = Arc::new(MockMessages::default());
        let settings = CacheSettings {
            reply_latency: Duration::from_millis(5),
            ..CacheSettings::default()
        };
        Fixture {
            cache: Arc::new(MessageCache::new(
                registry,
                authority.clone(),
                bus.clone(),
                settings,
            )),
            authority,
            bus,
            token: CancellationToken::new(),
            a: IdentityId::new("A"),
        }
    }

    fn record_changes(bus: &EventBus, id: &IdentityId) -> Arc<StdMutex<Vec<MessagesChange>>> {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(Channel::MessagesChanged(id.clone()), move |event| {
            if let Event::MessagesChanged { change, .. } = event {
                sink.lock().unwrap().push(*change);
            }
        });
        seen
    }

    #[tokio::test]
    async fn test_send_round_trip_produces_correlated_reply() {
        let f = fixture().await;
        let changes = record_changes(&f.bus, &f.a);

        let (sent, reply) = f.cache.send(&f.a, "  Hello  ", &f.token).await.unwrap();

        assert_eq!(sent.text, "Hello");
        assert_eq!(sent.direction, Direction::Sent);
        assert!(!sent.id.is_local());
        assert_eq!(reply.direction, Direction::Received);
        assert_eq!(reply.correlation_id, Some(sent.id.clone()));
        assert_eq!(reply.text, fallback_reply("User A"));
        assert!(reply.created_at > sent.created_at);

        let timeline = f.cache.timeline(&f.a, &MessageFilter::default()).await;
        assert_eq!(timeline.messages(), &[sent, reply]);
        assert!(!f.cache.is_composing(&f.a));
        assert_eq!(
            *changes.lock().unwrap(),
            vec![
                MessagesChange::Pending,
                MessagesChange::Composing,
                MessagesChange::ReplyReceived
            ]
        );
    }

    #[tokio::test]
    async fn test_send_uses_authority_reply_when_present() {
        let f = fixture().await;
        *f.authority.reply_text.lock().unwrap() = Some("We are on it".to_string());
        f.authority.with_response_id.store(true, Ordering::SeqCst);

        let (_, reply) = f.cache.send(&f.a, "help", &f.token).await.unwrap();
        assert_eq!(reply.text, "We are on it");
        assert_eq!(reply.id.as_str(), "1001");
        assert_eq!(reply.delivery, DeliveryState::Confirmed);
    }

    #[tokio::test]
    async fn test_send_rejects_blank_text() {
        let f = fixture().await;
        let err = f.cache.send(&f.a, " \n\t", &f.token).await.unwrap_err();
        assert_eq!(err, ValidationError::EmptyText.into());
        assert!(f.cache.timeline(&f.a, &MessageFilter::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_send_keeps_optimistic_entry() {
        let f = fixture().await;
        let changes = record_changes(&f.bus, &f.a);
        f.authority.offline.store(true, Ordering::SeqCst);

        let err = f.cache.send(&f.a, "Hello", &f.token).await.unwrap_err();
        assert!(err.is_unavailable());

        let timeline = f.cache.timeline(&f.a, &MessageFilter::default()).await;
        assert_eq!(timeline.len(), 1);
        let entry = &timeline.messages()[0];
        assert!(entry.id.is_local());
        assert_eq!(entry.delivery, DeliveryState::Failed);
        assert_eq!(
            *changes.lock().unwrap(),
            vec![MessagesChange::Pending, MessagesChange::Updated]
        );
    }

    #[tokio::test]
    async fn test_fetch_adopts_failed_entry_once_authority_has_it() {
        let f = fixture().await;
        f.authority.offline.store(true, Ordering::SeqCst);
        let _ = f.cache.send(&f.a, "Hello", &f.token).await;
        f.authority.offline.store(false, Ordering::SeqCst);
        let mut stored = record("7", 1, Direction::Sent, "Hello");
        stored.created_at = Utc::now();
        *f.authority.pages.lock().unwrap() = vec![vec![stored]];

        let timeline = f
            .cache
            .fetch_page(&f.a, &MessageFilter::default(), &f.token)
            .await
            .unwrap();

        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.messages()[0].id.as_str(), "7");
        assert_eq!(timeline.messages()[0].delivery, DeliveryState::Confirmed);
    }

    #[tokio::test]
    async fn test_fetch_follows_pages_and_is_idempotent() {
        let f = fixture().await;
        *f.authority.pages.lock().unwrap() = vec![
            vec![record("1", 1, Direction::Sent, "hi"), record("2", 2, Direction::Received, "hello")],
            vec![record("3", 3, Direction::Sent, "bye")],
        ];
        let changes = record_changes(&f.bus, &f.a);

        let first = f
            .cache
            .fetch_page(&f.a, &MessageFilter::default(), &f.token)
            .await
            .unwrap();
        let second = f
            .cache
            .fetch_page(&f.a, &MessageFilter::default(), &f.token)
            .await
            .unwrap();

        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        assert_eq!(f.authority.list_calls.load(Ordering::SeqCst), 4);
        assert_eq!(*changes.lock().unwrap(), vec![MessagesChange::Updated]);
    }

    #[tokio::test]
    async fn test_filter_shapes_view_but_everything_is_cached() {
        let f = fixture().await;
        *f.authority.pages.lock().unwrap() = vec![vec![
            record("1", 1, Direction::Sent, "Order status?"),
            record("2", 2, Direction::Received, "Your ORDER shipped"),
            record("3", 3, Direction::Received, "Anything else?"),
        ]];

        let filter = MessageFilter::default()
            .direction(Direction::Received)
            .search("order");
        let view = f.cache.fetch_page(&f.a, &filter, &f.token).await.unwrap();

        assert_eq!(view.len(), 1);
        assert_eq!(view.messages()[0].id.as_str(), "2");
        assert_eq!(
            f.cache.timeline(&f.a, &MessageFilter::default()).await.len(),
            3
        );
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_cache_untouched() {
        let f = fixture().await;
        *f.authority.pages.lock().unwrap() = vec![vec![record("1", 1, Direction::Sent, "hi")]];
        f.cache
            .fetch_page(&f.a, &MessageFilter::default(), &f.token)
            .await
            .unwrap();

        f.authority.offline.store(true, Ordering::SeqCst);
        let err = f
            .cache
            .fetch_page(&f.a, &MessageFilter::default(), &f.token)
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(f.cache.timeline(&f.a, &MessageFilter::default()).await.len(), 1);
    }

    #[tokio::test]
    async fn test_mark_viewed_is_idempotent_and_best_effort() {
        let f = fixture().await;
        *f.authority.pages.lock().unwrap() = vec![vec![
            record("1", 1, Direction::Sent, "hi"),
            record("2", 2, Direction::Received, "hello"),
        ]];
        f.cache
            .fetch_page(&f.a, &MessageFilter::default(), &f.token)
            .await
            .unwrap();
        assert_eq!(f.cache.unread_count(&f.a).await, 1);

        f.authority.offline.store(true, Ordering::SeqCst);
        assert_eq!(f.cache.mark_viewed(&f.a, &f.token).await.unwrap(), 1);
        assert_eq!(f.cache.mark_viewed(&f.a, &f.token).await.unwrap(), 0);
        assert_eq!(f.cache.unread_count(&f.a).await, 0);
        assert_eq!(f.authority.viewed_calls.load(Ordering::SeqCst), 2);

        // The authority still reports the message unviewed; viewed never resets.
        f.authority.offline.store(false, Ordering::SeqCst);
        let timeline = f
            .cache
            .fetch_page(&f.a, &MessageFilter::default(), &f.token)
            .await
            .unwrap();
        assert!(timeline.messages().iter().all(|m| m.direction == Direction::Sent || m.viewed));
    }

    #[tokio::test]
    async fn test_delete_history_clears_only_after_authority_success() {
        let f = fixture().await;
        f.cache.send(&f.a, "Hello", &f.token).await.unwrap();

        f.authority.offline.store(true, Ordering::SeqCst);
        assert!(f.cache.delete_history(&f.a, &f.token).await.is_err());
        assert_eq!(f.cache.timeline(&f.a, &MessageFilter::default()).await.len(), 2);

        f.authority.offline.store(false, Ordering::SeqCst);
        let changes = record_changes(&f.bus, &f.a);
        f.cache.delete_history(&f.a, &f.token).await.unwrap();
        assert!(f.cache.timeline(&f.a, &MessageFilter::default()).await.is_empty());
        assert_eq!(*changes.lock().unwrap(), vec![MessagesChange::Cleared]);
    }

    #[tokio::test]
    async fn test_send_then_fetch_yields_one_sent_and_one_correlated_reply() {
        for with_response_id in [false, true] {
            let f = fixture().await;
            f.authority.keep_posts.store(true, Ordering::SeqCst);
            f.authority
                .with_response_id
                .store(with_response_id, Ordering::SeqCst);

            let (sent, _) = f.cache.send(&f.a, "hello", &f.token).await.unwrap();
            let timeline = f
                .cache
                .fetch_page(&f.a, &MessageFilter::default(), &f.token)
                .await
                .unwrap();

            let sent_entries: Vec<&Message> = timeline
                .messages()
                .iter()
                .filter(|m| m.direction == Direction::Sent)
                .collect();
            let received: Vec<&Message> = timeline
                .messages()
                .iter()
                .filter(|m| m.direction == Direction::Received)
                .collect();
            assert_eq!(sent_entries.len(), 1);
            assert_eq!(sent_entries[0].text, "hello");
            assert_eq!(sent_entries[0].id, sent.id);
            assert_eq!(received.len(), 1);
            assert_eq!(received[0].correlation_id.as_ref(), Some(&sent.id));
            assert!(timeline.messages().iter().all(|m| m.delivery == DeliveryState::Confirmed));
        }
    }

    #[tokio::test]
    async fn test_fetch_after_delete_history_is_empty() {
        let f = fixture().await;
        f.authority.keep_posts.store(true, Ordering::SeqCst);
        f.cache.send(&f.a, "Hello", &f.token).await.unwrap();
        f.cache.send(&f.a, "Anyone there?", &f.token).await.unwrap();

        assert_eq!(f.cache.delete_history(&f.a, &f.token).await.unwrap(), 4);
        let timeline = f
            .cache
            .fetch_page(&f.a, &MessageFilter::default(), &f.token)
            .await
            .unwrap();
        assert!(timeline.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_sends_on_one_identity_do_not_interleave() {
        let f = fixture().await;
        let sends = (0..4).map(|i| {
            let cache = f.cache.clone();
            let a = f.a.clone();
            let token = f.token.clone();
            tokio::spawn(async move { cache.send(&a, &format!("msg {}", i), &token).await })
        });
        for handle in sends.collect::<Vec<_>>() {
            handle.await.unwrap().unwrap();
        }

        let timeline = f.cache.timeline(&f.a, &MessageFilter::default()).await;
        assert_eq!(timeline.len(), 8);
        for pair in timeline.messages().chunks(2) {
            assert_eq!(pair[0].direction, Direction::Sent);
            assert_eq!(pair[1].correlation_id.as_ref(), Some(&pair[0].id));
        }
    }

    #[tokio::test]
    async fn test_cancelled_fetch_applies_nothing() {
        let f = fixture().await;
        *f.authority.pages.lock().unwrap() = vec![vec![record("1", 1, Direction::Sent, "hi")]];
        let token = CancellationToken::new();
        token.cancel();

        let err = f
            .cache
            .fetch_page(&f.a, &MessageFilter::default(), &token)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(f.cache.timeline(&f.a, &MessageFilter::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_send_for_unknown_identity_is_not_found() {
        let f = fixture().await;
        let err = f
            .cache
            .send(&IdentityId::new("nobody"), "hi", &f.token)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
