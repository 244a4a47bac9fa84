use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ChatSyncError, Result};
use crate::identity::IdentityId;
use crate::message::{DeliveryState, Direction, Message, MessageId};

/// A message as stored by the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub user: IdentityId,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub text: String,
    pub direction: Direction,
    #[serde(default)]
    pub viewed: bool,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    pub fn into_message(self) -> Message {
        Message {
            id: self.id,
            identity_id: self.user,
            text: self.text,
            direction: self.direction,
            created_at: self.created_at,
            viewed: self.viewed,
            correlation_id: None,
            delivery: DeliveryState::Confirmed,
        }
    }
}

/// One network page of `GET /messages`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessagePage {
    pub records: Vec<MessageRecord>,
    /// Total count reported by a paginated envelope.
    pub count: Option<u64>,
    /// Whether the authority reported a following page.
    pub has_next: bool,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    count: Option<u64>,
    #[serde(default)]
    next: Option<String>,
    results: Vec<MessageRecord>,
}

/// Decodes a `GET /messages` body.
///
/// Accepts either the paginated envelope `{count, next, previous, results}`
/// or a bare array of records. Any other shape is a `Decode` error.
pub fn decode_message_page(body: Value) -> Result<MessagePage> {
    if body.is_array() {
        let records: Vec<MessageRecord> = serde_json::from_value(body)
            .map_err(|e| ChatSyncError::decode(format!("message array: {}", e)))?;
        return Ok(MessagePage {
            records,
            count: None,
            has_next: false,
        });
    }

    if matches!(&body, Value::Object(map) if map.contains_key("results")) {
        let envelope: Envelope = serde_json::from_value(body)
            .map_err(|e| ChatSyncError::decode(format!("message envelope: {}", e)))?;
        return Ok(MessagePage {
            records: envelope.results,
            count: envelope.count,
            has_next: envelope.next.is_some_and(|n| !n.is_empty()),
        });
    }

    Err(ChatSyncError::decode(format!(
        "expected message array or envelope, got {}",
        shape_of(&body)
    )))
}

fn shape_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object without 'results'",
    }
}

/// Body of `POST /messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewMessage {
    pub user: IdentityId,
    pub text: String,
    pub user_name: String,
}

/// Response of `POST /messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedMessage {
    pub id: MessageId,
    pub user: IdentityId,
    #[serde(default)]
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub response_text: Option<String>,
    #[serde(default)]
    pub response_id: Option<MessageId>,
}

/// External system of record for messages.
///
/// Same error contract as [`AccountAuthority`](super::AccountAuthority).
#[async_trait]
pub trait MessageAuthority: Send + Sync {
    /// `GET /messages?user={id}&page={page}` (1-based page).
    async fn list_messages(&self, user: &IdentityId, page: u32) -> Result<MessagePage>;

    /// `POST /messages`: stores the sent message and produces a reply.
    async fn post_message(&self, message: &NewMessage) -> Result<PostedMessage>;

    /// `POST /messages/mark_viewed?user={id}`.
    async fn mark_viewed(&self, user: &IdentityId) -> Result<()>;

    /// `POST /messages/delete_history`: returns the number of deleted messages.
    async fn delete_history(&self, user: &IdentityId) -> Result<u64>;
}
