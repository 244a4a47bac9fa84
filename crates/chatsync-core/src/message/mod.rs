//! Message domain module.
//!
//! # Module Structure
//!
//! - `model`: `Message`, `MessageId`, `Direction`, `DeliveryState`
//! - `timeline`: filtered, ordered views and display paging
//! - `merge`: per-identity partition and authority reconciliation
//! - `cache`: `MessageCache`, the serialized per-identity engine

mod cache;
mod merge;
mod model;
mod timeline;

pub use cache::{
    CacheSettings, DEFAULT_MAX_AUTHORITY_PAGES, DEFAULT_REPLY_LATENCY_MS, MessageCache, fallback_reply,
};
pub use merge::{MergeOutcome, Partition};
pub use model::{DeliveryState, Direction, LOCAL_ID_PREFIX, Message, MessageId};
pub use timeline::{MessageFilter, Timeline, TimelinePage};
