//! Event bus domain module.
//!
//! Components publish here after their persistence or authority call has
//! succeeded; UI consumers subscribe and re-query the component that
//! changed. No component calls another just to announce a change.
//!
//! # Module Structure
//!
//! - `model`: channels and typed payloads (`Channel`, `Event`)
//! - `bus`: synchronous fan-out (`EventBus`, `Subscription`)

mod bus;
mod model;

pub use bus::{EventBus, EventHandler, Subscription, SubscriptionToken};
pub use model::{AccountsChange, Channel, Event, MessagesChange};
