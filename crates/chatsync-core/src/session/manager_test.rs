use super::*;
use crate::authority::{AccountRecord, AccountUpdate};
use crate::event::{AccountsChange, Channel, Event, EventBus};
use crate::store::DurableStore;
use crate::store::testing::MemoryStore;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Authority knowing a single account `C123` with password `secret1`.
#[derive(Default)]
struct MockAuthority {
    logins: AtomicUsize,
    canonical_name: Mutex<Option<String>>,
    offline: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl AccountAuthority for MockAuthority {
    async fn create_account(&self, name: &str, _password: &str) -> Result<AccountRecord> {
        Ok(AccountRecord {
            identifier: IdentityId::new("C123"),
            name: name.to_string(),
        })
    }

    async fn fetch_account(&self, _id: &IdentityId) -> Result<Option<AccountRecord>> {
        Ok(None)
    }

    async fn update_account(&self, id: &IdentityId, _update: &AccountUpdate) -> Result<AccountRecord> {
        Ok(AccountRecord {
            identifier: id.clone(),
            name: String::new(),
        })
    }

    async fn delete_account(&self, _id: &IdentityId) -> Result<()> {
        Ok(())
    }

    async fn login(&self, id: &IdentityId, password: &str) -> Result<AccountRecord> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(ChatSyncError::unavailable("connection refused"));
        }
        if id.as_str() != "C123" || password != "secret1" {
            return Err(ChatSyncError::invalid_credential(id.as_str()));
        }
        let name = self
            .canonical_name
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| "Carla".to_string());
        Ok(AccountRecord {
            identifier: id.clone(),
            name,
        })
    }
}

struct Fixture {
    manager: SessionManager,
    registry: Arc<IdentityRegistry>,
    authority: Arc<MockAuthority>,
    store: Arc<MemoryStore>,
    bus: Arc<EventBus>,
    token: CancellationToken,
}

async fn fixture_with(store: Arc<MemoryStore>) -> Fixture {
    let bus = Arc::new(EventBus::new());
    let authority = Arc::new(MockAuthority::default());
    let slot = Arc::new(SessionSlot::load(store.clone(), bus.clone()).await.unwrap());
    let registry = Arc::new(
        IdentityRegistry::load(store.clone(), slot.clone(), authority.clone(), bus.clone())
            .await
            .unwrap(),
    );
    Fixture {
        manager: SessionManager::new(slot, registry.clone(), authority.clone()),
        registry,
        authority,
        store,
        bus,
        token: CancellationToken::new(),
    }
}

async fn fixture() -> Fixture {
    fixture_with(Arc::new(MemoryStore::new())).await
}

#[tokio::test]
async fn test_builtin_login_skips_authority() {
    let f = fixture().await;
    let session = f
        .manager
        .login(&IdentityId::new("A"), None, &f.token)
        .await
        .unwrap();

    assert_eq!(session.active_identity_id.as_str(), "A");
    assert_eq!(session.display_name_snapshot, "User A");
    assert_eq!(f.authority.logins.load(Ordering::SeqCst), 0);
    assert_eq!(f.manager.current().await, Some(session));
}

#[tokio::test]
async fn test_created_login_with_empty_password_is_rejected() {
    let f = fixture().await;
    f.registry.create("Carla", "secret1", &f.token).await.unwrap();

    let err = f
        .manager
        .login(&IdentityId::new("C123"), Some(""), &f.token)
        .await
        .unwrap_err();

    assert!(matches!(err, ChatSyncError::Auth(_)));
    assert_eq!(f.manager.current().await, None);
}

#[tokio::test]
async fn test_unreachable_authority_surfaces_unavailable() {
    let f = fixture().await;
    f.authority.offline.store(true, Ordering::SeqCst);

    let err = f
        .manager
        .login(&IdentityId::new("C123"), Some("secret1"), &f.token)
        .await
        .unwrap_err();
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn test_login_trusts_canonical_name_from_authority() {
    let f = fixture().await;
    f.registry.create("Carla", "secret1", &f.token).await.unwrap();
    *f.authority.canonical_name.lock().unwrap() = Some("Carla M".to_string());

    let session = f
        .manager
        .login(&IdentityId::new("C123"), Some("secret1"), &f.token)
        .await
        .unwrap();

    assert_eq!(session.display_name_snapshot, "Carla M");
    assert_eq!(
        f.registry
            .get(&IdentityId::new("C123"))
            .await
            .unwrap()
            .display_name,
        "Carla M"
    );
}

#[tokio::test]
async fn test_login_of_unlisted_identity_adds_it() {
    let f = fixture().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    f.bus.subscribe(Channel::AccountsChanged, move |event| {
        if let Event::AccountsChanged(change) = event {
            sink.lock().unwrap().push(change.clone());
        }
    });

    f.manager
        .login(&IdentityId::new("C123"), Some("secret1"), &f.token)
        .await
        .unwrap();

    assert!(f.registry.get(&IdentityId::new("C123")).await.is_some());
    assert_eq!(
        *seen.lock().unwrap(),
        vec![AccountsChange::Authenticated {
            id: IdentityId::new("C123")
        }]
    );
}

#[tokio::test]
async fn test_switch_requires_known_identity() {
    let f = fixture().await;
    let err = f.manager.switch(&IdentityId::new("ZZ")).await.unwrap_err();
    assert!(err.is_not_found());

    let session = f.manager.switch(&IdentityId::new("B")).await.unwrap();
    assert_eq!(session.active_identity_id.as_str(), "B");
    assert_eq!(f.authority.logins.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let f = fixture().await;
    f.manager.switch(&IdentityId::new("A")).await.unwrap();
    f.manager.logout().await.unwrap();
    f.manager.logout().await.unwrap();
    assert_eq!(f.manager.current().await, None);
}

#[tokio::test]
async fn test_restore_discards_session_of_vanished_identity() {
    let f = fixture().await;
    f.registry.create("Carla", "secret1", &f.token).await.unwrap();
    f.manager.switch(&IdentityId::new("C123")).await.unwrap();
    drop(f.manager);

    // A second process whose registry no longer holds C123.
    let store = f.store.clone();
    store
        .set(crate::store::IDENTITIES_KEY, "[]".to_string())
        .await
        .unwrap();
    let restarted = fixture_with(store).await;

    assert_eq!(restarted.manager.restore().await.unwrap(), None);
    assert_eq!(restarted.manager.current().await, None);
}

#[tokio::test]
async fn test_restore_keeps_session_of_builtin() {
    let f = fixture().await;
    f.manager.switch(&IdentityId::new("B")).await.unwrap();

    let restarted = fixture_with(f.store.clone()).await;
    let restored = restarted.manager.restore().await.unwrap().unwrap();
    assert_eq!(restored.active_identity_id.as_str(), "B");
}
