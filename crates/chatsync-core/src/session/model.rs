//! Session domain model.

use serde::{Deserialize, Serialize};

use crate::identity::{Identity, IdentityId};

/// The single active login.
///
/// "Logged out" is represented as the absence of a session
/// (`Option<Session>::None`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub active_identity_id: IdentityId,
    /// Display name at login time, kept current by renames.
    pub display_name_snapshot: String,
}

impl Session {
    pub fn for_identity(identity: &Identity) -> Self {
        Self {
            active_identity_id: identity.id.clone(),
            display_name_snapshot: identity.display_name.clone(),
        }
    }

    pub fn is_for(&self, id: &IdentityId) -> bool {
        &self.active_identity_id == id
    }
}
