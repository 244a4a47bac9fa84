//! Reconciliation of authoritative records with the local cache.

use std::collections::HashMap;

use chrono::Duration;

use super::model::{DeliveryState, Direction, Message, MessageId};
use super::timeline::{MessageFilter, Timeline};
use crate::error::ChatSyncError;
use crate::identity::IdentityId;

/// Clock skew tolerated between a local write and the authority's
/// timestamp for the same message. Authority records older than a local
/// entry by more than this never adopt it.
const ADOPTION_SKEW_SECS: i64 = 30;

/// Counters describing what a merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub updated: usize,
    /// Locally-assigned entries that took over an authoritative id.
    pub adopted: usize,
    /// Records refused because they conflict with an immutable field.
    pub rejected: usize,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        self.inserted + self.updated + self.adopted > 0
    }
}

/// All cached messages of one identity, keyed by normalized id.
#[derive(Debug, Clone)]
pub struct Partition {
    identity_id: IdentityId,
    entries: HashMap<MessageId, Message>,
}

impl Partition {
    pub fn new(identity_id: IdentityId) -> Self {
        Self {
            identity_id,
            entries: HashMap::new(),
        }
    }

    pub fn identity_id(&self) -> &IdentityId {
        &self.identity_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.entries.get(id)
    }

    pub fn timeline(&self, filter: &MessageFilter) -> Timeline {
        Timeline::build(self.identity_id.clone(), self.entries.values(), filter)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Inserts a locally produced entry (optimistic send or synthesized reply).
    pub fn insert_local(&mut self, message: Message) {
        self.entries.insert(message.id.clone(), message);
    }

    /// Replaces the entry stored under `old_id` with `message`, which may
    /// carry a different (authoritative) id.
    pub fn replace(&mut self, old_id: &MessageId, message: Message) {
        self.entries.remove(old_id);
        self.entries.insert(message.id.clone(), message);
    }

    pub fn set_delivery(&mut self, id: &MessageId, delivery: DeliveryState) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.delivery = delivery;
        }
    }

    /// Flags every unviewed message matching `direction` as viewed.
    /// Returns how many entries changed.
    pub fn mark_viewed(&mut self, direction: Direction) -> usize {
        let mut changed = 0;
        for entry in self.entries.values_mut() {
            if entry.direction == direction && !entry.viewed {
                entry.viewed = true;
                changed += 1;
            }
        }
        changed
    }

    pub fn unread_count(&self) -> usize {
        self.entries.values().filter(|m| m.is_unread()).count()
    }

    /// Folds authoritative records into the partition.
    ///
    /// Known ids are updated in place: `text` follows the authority, `viewed`
    /// only ever turns on, `direction` and `correlation_id` never change.
    /// Unknown ids first try to adopt a locally-assigned entry with the same
    /// direction and text; otherwise they are inserted. Applying the same
    /// records twice leaves the partition unchanged the second time.
    pub fn merge<I>(&mut self, incoming: I) -> MergeOutcome
    where
        I: IntoIterator<Item = Message>,
    {
        let mut outcome = MergeOutcome::default();

        for record in incoming {
            match self.merge_one(record) {
                Ok(Applied::Inserted) => outcome.inserted += 1,
                Ok(Applied::Updated) => outcome.updated += 1,
                Ok(Applied::Adopted) => outcome.adopted += 1,
                Ok(Applied::Unchanged) => {}
                Err(err) => {
                    tracing::warn!(identity = %self.identity_id, "rejected authority record: {}", err);
                    outcome.rejected += 1;
                }
            }
        }

        tracing::debug!(
            identity = %self.identity_id,
            inserted = outcome.inserted,
            updated = outcome.updated,
            adopted = outcome.adopted,
            rejected = outcome.rejected,
            "merged authority records"
        );
        outcome
    }

    fn merge_one(&mut self, record: Message) -> Result<Applied, ChatSyncError> {
        if record.identity_id != self.identity_id {
            return Err(ChatSyncError::conflict(record.id.as_str(), "identity_id"));
        }

        if let Some(existing) = self.entries.get_mut(&record.id) {
            return update_in_place(existing, record);
        }

        if let Some(local_id) = self.find_adoptable(&record) {
            let Some(local) = self.entries.remove(&local_id) else {
                return Ok(Applied::Unchanged);
            };
            let adopted = Message {
                viewed: local.viewed || record.viewed,
                correlation_id: local.correlation_id.or(record.correlation_id),
                delivery: DeliveryState::Confirmed,
                ..record
            };
            tracing::debug!(local = %local_id, authoritative = %adopted.id, "adopted local entry");
            self.entries.insert(adopted.id.clone(), adopted);
            return Ok(Applied::Adopted);
        }

        let mut record = record;
        record.delivery = DeliveryState::Confirmed;
        self.entries.insert(record.id.clone(), record);
        Ok(Applied::Inserted)
    }

    /// The oldest unconfirmed entry that `record` plausibly stands for.
    ///
    /// A record written before the local entry cannot be that entry's
    /// authoritative copy, so it is inserted alongside instead.
    fn find_adoptable(&self, record: &Message) -> Option<MessageId> {
        let skew = Duration::seconds(ADOPTION_SKEW_SECS);
        self.entries
            .values()
            .filter(|m| m.delivery != DeliveryState::Confirmed || m.id.is_local())
            .filter(|m| m.direction == record.direction && m.text.trim() == record.text.trim())
            .filter(|m| record.created_at >= m.created_at - skew)
            .min_by(|a, b| a.timeline_cmp(b))
            .map(|m| m.id.clone())
    }
}

enum Applied {
    Inserted,
    Updated,
    Adopted,
    Unchanged,
}

fn update_in_place(existing: &mut Message, record: Message) -> Result<Applied, ChatSyncError> {
    if existing.direction != record.direction {
        return Err(ChatSyncError::conflict(record.id.as_str(), "direction"));
    }
    if let (Some(current), Some(incoming)) = (&existing.correlation_id, &record.correlation_id)
        && current != incoming
    {
        return Err(ChatSyncError::conflict(record.id.as_str(), "correlation_id"));
    }

    let merged = Message {
        viewed: existing.viewed || record.viewed,
        correlation_id: existing.correlation_id.clone().or(record.correlation_id),
        delivery: DeliveryState::Confirmed,
        ..record
    };

    if *existing == merged {
        return Ok(Applied::Unchanged);
    }
    *existing = merged;
    Ok(Applied::Updated)
}
