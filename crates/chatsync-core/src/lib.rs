pub mod authority;
pub mod cancel;
pub mod config;
pub mod error;
pub mod event;
pub mod identity;
pub mod message;
pub mod session;
pub mod store;

// Re-export common error type
pub use error::{ChatSyncError, Result};
