//! Identity domain model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifiers of the two builtin identities.
pub const BUILTIN_IDS: [&str; 2] = ["A", "B"];

/// Maximum number of created identities that may exist at once.
pub const MAX_CREATED_IDENTITIES: usize = 2;

/// Minimum credential length accepted by `change_credential`.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Opaque identity identifier as issued by the authority (`A`, `B`, `7f3a2c1d`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for IdentityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    /// Always present, never deleted, logs in without a credential.
    Builtin,
    /// Registered by the user; credentialed and bounded in number.
    Created,
}

/// A known user identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub display_name: String,
    pub kind: IdentityKind,
    /// Name restored by `reset_name`.
    pub default_name: String,
    pub has_credential: bool,
}

impl Identity {
    /// The builtin identity with the given id, under its default name.
    pub fn builtin(id: &str) -> Self {
        let name = format!("User {}", id);
        Self {
            id: IdentityId::new(id),
            display_name: name.clone(),
            kind: IdentityKind::Builtin,
            default_name: name,
            has_credential: false,
        }
    }

    pub fn created(id: IdentityId, name: impl Into<String>, has_credential: bool) -> Self {
        let name = name.into();
        Self {
            id,
            display_name: name.clone(),
            kind: IdentityKind::Created,
            default_name: name,
            has_credential,
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.kind == IdentityKind::Builtin
    }

    /// Case-insensitive display name comparison used for uniqueness.
    pub fn has_name(&self, name: &str) -> bool {
        names_collide(&self.display_name, name)
    }
}

/// Whether two display names are equal under case-insensitive comparison.
pub fn names_collide(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// The two builtin identities under their default names.
pub fn default_builtins() -> Vec<Identity> {
    BUILTIN_IDS.iter().map(|id| Identity::builtin(id)).collect()
}
