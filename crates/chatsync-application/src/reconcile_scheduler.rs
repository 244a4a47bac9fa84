//! Periodic reconciliation of the identity registry with the authority.

use std::sync::Arc;
use std::time::Duration;

use chatsync_core::cancel::CancellationToken;
use chatsync_core::identity::IdentityRegistry;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

/// Background task running `reconcile_with_authority` on an interval.
///
/// The first run happens right after start. Failures are logged and the
/// loop keeps going; it stops only when its token is cancelled.
pub struct ReconcileScheduler {
    token: CancellationToken,
    wake: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl ReconcileScheduler {
    pub fn start(
        registry: Arc<IdentityRegistry>,
        every: Duration,
        token: CancellationToken,
    ) -> Self {
        let wake = Arc::new(Notify::new());
        let handle = tokio::spawn(run(registry, every, token.clone(), wake.clone()));
        Self {
            token,
            wake,
            handle,
        }
    }

    /// Requests an immediate run.
    pub fn trigger(&self) {
        self.wake.notify_one();
    }

    /// Cancels the loop and waits for it to finish.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(target: "reconcile", "scheduler task ended abnormally: {}", e);
        }
    }
}

async fn run(
    registry: Arc<IdentityRegistry>,
    every: Duration,
    token: CancellationToken,
    wake: Arc<Notify>,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(target: "reconcile", "scheduler started ({}s interval)", every.as_secs());

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
            _ = wake.notified() => {}
        }

        match registry.reconcile_with_authority(&token).await {
            Ok(removed) if removed.is_empty() => {
                tracing::debug!(target: "reconcile", "registry in sync");
            }
            Ok(removed) => {
                tracing::info!(target: "reconcile", "removed {} stale identities", removed.len());
            }
            Err(e) if e.is_cancelled() => break,
            Err(e) => {
                tracing::error!(target: "reconcile", "reconciliation failed: {}", e);
            }
        }
    }

    tracing::info!(target: "reconcile", "scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChatClient;
    use chatsync_core::authority::AccountAuthority;
    use chatsync_core::config::ClientConfig;
    use chatsync_core::event::Channel;
    use chatsync_infrastructure::{InMemoryStore, LocalAuthority};
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn wait_for(hits: &AtomicUsize, expected: usize) {
        for _ in 0..200 {
            if hits.load(Ordering::SeqCst) >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} accounts events, saw {}", expected, hits.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_scheduler_removes_identities_deleted_elsewhere() {
        let store = Arc::new(InMemoryStore::new());
        let local = Arc::new(LocalAuthority::new(store.clone()));
        let config = ClientConfig {
            reconcile_interval_secs: 3600,
            ..ClientConfig::default()
        };
        let client = ChatClient::with_parts(config, store, local.clone(), local.clone())
            .await
            .unwrap();
        let token = CancellationToken::new();

        let u1 = client.registry().create("U1", "pw", &token).await.unwrap();
        client.sessions().switch(&u1.id).await.unwrap();
        local.delete_account(&u1.id).await.unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        client.bus().subscribe(Channel::AccountsChanged, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let scheduler = client.start_reconcile_scheduler(token.clone());
        wait_for(&hits, 1).await;

        assert!(client.registry().get(&u1.id).await.is_none());
        assert_eq!(client.sessions().current().await, None);

        // trigger() runs a pass without waiting for the next tick.
        let u2 = client.registry().create("U2", "pw", &token).await.unwrap();
        scheduler.trigger();
        local.delete_account(&u2.id).await.unwrap();
        scheduler.trigger();
        wait_for(&hits, 3).await;
        assert!(client.registry().get(&u2.id).await.is_none());

        scheduler.stop().await;
    }
}
