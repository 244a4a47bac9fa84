//! Identity records and the registry that owns them.

pub mod model;
pub mod registry;

pub use model::{
    BUILTIN_IDS, Identity, IdentityId, IdentityKind, MAX_CREATED_IDENTITIES, MIN_PASSWORD_LEN,
    default_builtins, names_collide,
};
pub use registry::IdentityRegistry;
