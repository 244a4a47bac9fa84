//! In-process authority backed by the durable store.
//!
//! Stands in for the REST service when no API base is configured. Accounts
//! and messages are kept as JSON documents next to the client's own state,
//! so they survive restarts like a real backend would.

use std::sync::Arc;

use async_trait::async_trait;
use chatsync_core::authority::{
    AccountAuthority, AccountRecord, AccountUpdate, MessageAuthority, MessagePage, MessageRecord,
    NewMessage, PostedMessage,
};
use chatsync_core::error::{ChatSyncError, Result};
use chatsync_core::identity::{BUILTIN_IDS, IdentityId, names_collide};
use chatsync_core::message::{Direction, MessageId};
use chatsync_core::store::{DurableStore, load_json, save_json};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

pub const LOCAL_ACCOUNTS_KEY: &str = "chatsync.local.accounts.v1";
pub const LOCAL_MESSAGES_KEY: &str = "chatsync.local.messages.v1";

const REPLY_TEMPLATES: [&str; 5] = [
    "Thanks, {name}. Our team will get back to you shortly.",
    "We received your message, {name}. It is already with the team.",
    "Perfect, {name}! Someone will talk to you in a moment.",
    "Your request has been recorded, {name}. Follow along here.",
    "Thank you! A specialist will contact you soon, {name}.",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredAccount {
    identifier: IdentityId,
    name: String,
    #[serde(default)]
    password: String,
}

impl StoredAccount {
    fn record(&self) -> AccountRecord {
        AccountRecord {
            identifier: self.identifier.clone(),
            name: self.name.clone(),
        }
    }
}

fn builtin_record(id: &IdentityId) -> Option<AccountRecord> {
    BUILTIN_IDS
        .contains(&id.as_str())
        .then(|| AccountRecord {
            identifier: id.clone(),
            name: format!("User {}", id),
        })
}

/// Local implementation of both authority contracts.
pub struct LocalAuthority {
    store: Arc<dyn DurableStore>,
    gate: Mutex<()>,
}

impl LocalAuthority {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            store,
            gate: Mutex::new(()),
        }
    }

    async fn accounts(&self) -> Result<Vec<StoredAccount>> {
        Ok(load_json(self.store.as_ref(), LOCAL_ACCOUNTS_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn save_accounts(&self, accounts: &[StoredAccount]) -> Result<()> {
        save_json(self.store.as_ref(), LOCAL_ACCOUNTS_KEY, accounts).await
    }

    async fn messages(&self) -> Result<Vec<MessageRecord>> {
        Ok(load_json(self.store.as_ref(), LOCAL_MESSAGES_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn save_messages(&self, messages: &[MessageRecord]) -> Result<()> {
        save_json(self.store.as_ref(), LOCAL_MESSAGES_KEY, messages).await
    }
}

fn new_identifier(accounts: &[StoredAccount]) -> IdentityId {
    loop {
        let simple = Uuid::new_v4().simple().to_string();
        let candidate = IdentityId::new(&simple[..8]);
        if !accounts.iter().any(|a| a.identifier == candidate) {
            return candidate;
        }
    }
}

fn next_message_id(messages: &[MessageRecord]) -> u64 {
    messages
        .iter()
        .filter_map(|m| m.id.as_str().parse::<u64>().ok())
        .max()
        .unwrap_or(0)
        + 1
}

#[async_trait]
impl AccountAuthority for LocalAuthority {
    async fn create_account(&self, name: &str, password: &str) -> Result<AccountRecord> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatSyncError::rejected(400, "name is required"));
        }

        let _gate = self.gate.lock().await;
        let mut accounts = self.accounts().await?;
        let taken = accounts.iter().any(|a| names_collide(&a.name, name))
            || BUILTIN_IDS
                .iter()
                .any(|id| names_collide(&format!("User {}", id), name));
        if taken {
            return Err(ChatSyncError::rejected(400, "name already in use"));
        }

        let account = StoredAccount {
            identifier: new_identifier(&accounts),
            name: name.to_string(),
            password: password.to_string(),
        };
        accounts.push(account.clone());
        self.save_accounts(&accounts).await?;
        Ok(account.record())
    }

    async fn fetch_account(&self, id: &IdentityId) -> Result<Option<AccountRecord>> {
        if let Some(record) = builtin_record(id) {
            return Ok(Some(record));
        }
        Ok(self
            .accounts()
            .await?
            .iter()
            .find(|a| &a.identifier == id)
            .map(StoredAccount::record))
    }

    async fn update_account(&self, id: &IdentityId, update: &AccountUpdate) -> Result<AccountRecord> {
        let _gate = self.gate.lock().await;
        let mut accounts = self.accounts().await?;
        let account = accounts
            .iter_mut()
            .find(|a| &a.identifier == id)
            .ok_or_else(|| ChatSyncError::identity_not_found(id.as_str()))?;
        if let Some(name) = &update.name {
            account.name = name.clone();
        }
        if let Some(password) = &update.password {
            account.password = password.clone();
        }
        let record = account.record();
        self.save_accounts(&accounts).await?;
        Ok(record)
    }

    async fn delete_account(&self, id: &IdentityId) -> Result<()> {
        let _gate = self.gate.lock().await;
        let mut accounts = self.accounts().await?;
        let before = accounts.len();
        accounts.retain(|a| &a.identifier != id);
        if accounts.len() == before {
            return Err(ChatSyncError::identity_not_found(id.as_str()));
        }
        self.save_accounts(&accounts).await
    }

    async fn login(&self, id: &IdentityId, password: &str) -> Result<AccountRecord> {
        if let Some(record) = builtin_record(id) {
            return Ok(record);
        }
        let accounts = self.accounts().await?;
        let account = accounts
            .iter()
            .find(|a| &a.identifier == id)
            .ok_or_else(|| ChatSyncError::identity_not_found(id.as_str()))?;
        if password.is_empty() || account.password != password {
            return Err(ChatSyncError::invalid_credential(id.as_str()));
        }
        Ok(account.record())
    }
}

#[async_trait]
impl MessageAuthority for LocalAuthority {
    /// Everything fits on the first page.
    async fn list_messages(&self, user: &IdentityId, page: u32) -> Result<MessagePage> {
        if page > 1 {
            return Ok(MessagePage::default());
        }
        let mut records: Vec<MessageRecord> = self
            .messages()
            .await?
            .into_iter()
            .filter(|m| &m.user == user)
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(MessagePage {
            count: Some(records.len() as u64),
            records,
            has_next: false,
        })
    }

    async fn post_message(&self, message: &NewMessage) -> Result<PostedMessage> {
        if message.text.trim().is_empty() {
            return Err(ChatSyncError::rejected(400, "text must be a non-empty string"));
        }

        let _gate = self.gate.lock().await;
        let mut messages = self.messages().await?;
        let id = next_message_id(&messages);
        let created_at = Utc::now();
        let slot = created_at.timestamp_subsec_millis() as usize % REPLY_TEMPLATES.len();
        let response_text = REPLY_TEMPLATES[slot].replace("{name}", &message.user_name);

        let user_name = Some(message.user_name.clone());
        messages.push(MessageRecord {
            id: MessageId::from(id),
            user: message.user.clone(),
            user_name: user_name.clone(),
            text: message.text.clone(),
            direction: Direction::Sent,
            viewed: false,
            created_at,
        });
        messages.push(MessageRecord {
            id: MessageId::new(format!("{}-r", id)),
            user: message.user.clone(),
            user_name,
            text: response_text.clone(),
            direction: Direction::Received,
            viewed: false,
            created_at: created_at + Duration::milliseconds(10),
        });
        self.save_messages(&messages).await?;

        Ok(PostedMessage {
            id: MessageId::from(id),
            user: message.user.clone(),
            text: message.text.clone(),
            created_at,
            response_text: Some(response_text),
            response_id: None,
        })
    }

    async fn mark_viewed(&self, user: &IdentityId) -> Result<()> {
        let _gate = self.gate.lock().await;
        let mut messages = self.messages().await?;
        let mut changed = false;
        for m in messages
            .iter_mut()
            .filter(|m| &m.user == user && m.direction == Direction::Received && !m.viewed)
        {
            m.viewed = true;
            changed = true;
        }
        if changed {
            self.save_messages(&messages).await?;
        }
        Ok(())
    }

    async fn delete_history(&self, user: &IdentityId) -> Result<u64> {
        let _gate = self.gate.lock().await;
        let mut messages = self.messages().await?;
        let before = messages.len();
        messages.retain(|m| &m.user != user);
        let deleted = (before - messages.len()) as u64;
        if deleted > 0 {
            self.save_messages(&messages).await?;
        }
        Ok(deleted)
    }
}
