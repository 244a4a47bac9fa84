//! Contracts of the external authorities.
//!
//! The engine reconciles against two collaborators it does not own: the
//! account/authentication authority and the message authority. Concrete
//! implementations (HTTP, local mock) live in the infrastructure crate.
//!
//! # Module Structure
//!
//! - `account`: `AccountAuthority` and its records
//! - `message`: `MessageAuthority`, wire records and strict page decoding

mod account;
mod message;

pub use account::{AccountAuthority, AccountRecord, AccountUpdate};
pub use message::{
    MessageAuthority, MessagePage, MessageRecord, NewMessage, PostedMessage, decode_message_page,
};
