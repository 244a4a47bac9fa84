use serde::{Deserialize, Serialize};

use crate::identity::IdentityId;
use crate::session::Session;

/// Logical notification channels.
///
/// `MessagesChanged` is partitioned by identity: a subscriber registered for
/// identity `A` never sees notifications about `B`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "channel", content = "identity_id", rename_all = "snake_case")]
pub enum Channel {
    AccountsChanged,
    SessionChanged,
    MessagesChanged(IdentityId),
}

/// What changed in the identity registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccountsChange {
    Created { id: IdentityId },
    Renamed { id: IdentityId, name: String },
    CredentialChanged { id: IdentityId },
    Deleted { id: IdentityId },
    /// Created identities removed because the authority no longer knows them.
    Reconciled { removed: Vec<IdentityId> },
    /// Record upserted after an authority login.
    Authenticated { id: IdentityId },
}

/// What changed in one identity's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagesChange {
    /// A sent message is shown locally while the authority call is in flight.
    Pending,
    /// Entries were inserted or updated.
    Updated,
    /// A sent message was accepted and the reply is being composed.
    Composing,
    /// The correlated reply became visible.
    ReplyReceived,
    /// Received messages were flagged viewed.
    Viewed,
    /// The whole history was removed.
    Cleared,
}

/// A notification delivered on the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    AccountsChanged(AccountsChange),
    SessionChanged {
        session: Option<Session>,
    },
    MessagesChanged {
        identity_id: IdentityId,
        change: MessagesChange,
    },
}

impl Event {
    /// The channel this event is delivered on.
    pub fn channel(&self) -> Channel {
        match self {
            Event::AccountsChanged(_) => Channel::AccountsChanged,
            Event::SessionChanged { .. } => Channel::SessionChanged,
            Event::MessagesChanged { identity_id, .. } => {
                Channel::MessagesChanged(identity_id.clone())
            }
        }
    }

    pub fn messages(identity_id: &IdentityId, change: MessagesChange) -> Self {
        Event::MessagesChanged {
            identity_id: identity_id.clone(),
            change,
        }
    }
}
