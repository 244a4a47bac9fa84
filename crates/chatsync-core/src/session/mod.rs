//! Session domain module.
//!
//! - `model`: the persisted active session (`Session`)
//! - `slot`: persisted holder shared with the identity registry (`SessionSlot`)
//! - `manager`: login, switch and logout (`SessionManager`)

mod manager;
mod model;
mod slot;

pub use manager::SessionManager;
pub use model::Session;
pub use slot::SessionSlot;
