//! Error types for the chatsync engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Input rejected before any side effect took place.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("an identity named '{0}' already exists")]
    DuplicateName(String),
    #[error("created identity limit of {limit} reached")]
    LimitExceeded { limit: usize },
    #[error("message text is empty")]
    EmptyText,
    #[error("display name is empty")]
    EmptyName,
    #[error("password and confirmation do not match")]
    PasswordMismatch,
    #[error("password must be at least {min_len} characters")]
    WeakPassword { min_len: usize },
}

/// Credential rejected by the authentication authority.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthError {
    #[error("invalid credential for '{0}'")]
    InvalidCredential(String),
}

/// A referenced record does not exist.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotFoundError {
    #[error("identity '{0}' not found")]
    Identity(String),
    #[error("message '{0}' not found")]
    Message(String),
}

/// A shared error type for the entire chatsync engine.
///
/// Validation, auth, not-found and forbidden errors are produced locally and
/// always surfaced to the caller. `AuthorityUnavailable` covers transport
/// failures and timeouts of the external authorities; `Decode` covers
/// authority responses that do not match the expected shape.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatSyncError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    /// Operation not permitted on a builtin identity.
    #[error("Forbidden: {action} on builtin identity '{id}'")]
    Forbidden { action: String, id: String },

    /// Transport failure, timeout or unexpected status from an authority.
    #[error("Authority unavailable: {0}")]
    AuthorityUnavailable(String),

    /// The authority refused the request (4xx other than auth/not-found).
    #[error("Rejected by authority ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// An authority record tried to change an immutable field of a cached one.
    #[error("Conflict on message '{id}': {field} changed")]
    Conflict { id: String, field: String },

    /// Authority response did not match the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Durable store read/write failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The caller's cancellation token fired before the operation finished.
    #[error("Operation cancelled")]
    Cancelled,
}

impl ChatSyncError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    pub fn identity_not_found(id: impl Into<String>) -> Self {
        Self::NotFound(NotFoundError::Identity(id.into()))
    }

    pub fn message_not_found(id: impl Into<String>) -> Self {
        Self::NotFound(NotFoundError::Message(id.into()))
    }

    pub fn forbidden(action: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Forbidden {
            action: action.into(),
            id: id.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::AuthorityUnavailable(message.into())
    }

    pub fn rejected(status: u16, detail: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            detail: detail.into(),
        }
    }

    pub fn conflict(id: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Conflict {
            id: id.into(),
            field: field.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn invalid_credential(id: impl Into<String>) -> Self {
        Self::Auth(AuthError::InvalidCredential(id.into()))
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::AuthorityUnavailable(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<serde_json::Error> for ChatSyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// A type alias for `Result<T, ChatSyncError>`.
pub type Result<T> = std::result::Result<T, ChatSyncError>;
