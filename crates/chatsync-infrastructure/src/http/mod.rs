//! HTTP implementations of the authority contracts.

mod account_authority;
mod client;
mod message_authority;

pub use account_authority::HttpAccountAuthority;
pub use client::ApiClient;
pub use message_authority::HttpMessageAuthority;
