//! Cancellation of suspension points.
//!
//! Every authority call and the cosmetic reply delay run under the caller's
//! token. A cancelled call returns [`ChatSyncError::Cancelled`] and applies
//! nothing locally.

use std::future::Future;
use std::time::Duration;

pub use tokio_util::sync::CancellationToken;

use crate::error::{ChatSyncError, Result};

/// Runs `fut` unless `token` fires first.
pub async fn cancellable<T, F>(token: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ChatSyncError::Cancelled),
        result = fut => result,
    }
}

/// Sleeps for `delay`, returning early if `token` fires. Returns `true` if
/// the full delay elapsed.
pub async fn pause(token: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
