//! Message domain model.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::identity::IdentityId;

/// Prefix of ids assigned locally before the authority confirms a record.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Message identifier, normalized to its string form.
///
/// The authority issues numeric ids for stored messages and `"{n}-r"` style
/// ids for some replies; both decode into this type. Ordering is
/// numeric-aware so that `"9" < "10"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh locally-assigned id.
    pub fn local() -> Self {
        Self(format!("{}{}", LOCAL_ID_PREFIX, uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }

    fn numeric(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl Ord for MessageId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for MessageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<u64> for MessageId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(u64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => MessageId::from(n),
            RawId::Text(s) => MessageId(s),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Written by the user.
    Sent,
    /// Reply produced by the service.
    Received,
}

/// Local knowledge about whether the authority holds an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Written locally, authority call not yet answered.
    Provisional,
    /// Seen in, or acknowledged by, the authority.
    #[default]
    Confirmed,
    /// Authority call failed; the entry is kept so the user still sees it.
    Failed,
}

/// One cached chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub identity_id: IdentityId,
    pub text: String,
    pub direction: Direction,
    pub created_at: DateTime<Utc>,
    pub viewed: bool,
    /// For auto-generated replies: the sent message that triggered them.
    #[serde(default)]
    pub correlation_id: Option<MessageId>,
    #[serde(default)]
    pub delivery: DeliveryState,
}

impl Message {
    /// Total order used by every timeline: `created_at`, then `id`.
    pub fn timeline_cmp(&self, other: &Self) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.id.cmp(&other.id))
    }

    pub fn is_unread(&self) -> bool {
        self.direction == Direction::Received && !self.viewed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_decodes_numbers_and_strings() {
        let ids: Vec<MessageId> = serde_json::from_str(r#"[12, "12", "7-r"]"#).unwrap();
        assert_eq!(ids[0], ids[1]);
        assert_eq!(ids[2].as_str(), "7-r");
    }

    #[test]
    fn test_message_id_order_is_numeric_aware() {
        let mut ids = vec![
            MessageId::new("10"),
            MessageId::new("9-r"),
            MessageId::new("9"),
            MessageId::new("2"),
        ];
        ids.sort();
        let ordered: Vec<&str> = ids.iter().map(|i| i.as_str()).collect();
        assert_eq!(ordered, vec!["2", "9", "10", "9-r"]);
    }

    #[test]
    fn test_local_ids_are_recognizable() {
        let id = MessageId::local();
        assert!(id.is_local());
        assert!(!MessageId::from(3).is_local());
    }
}
