use serde::{Deserialize, Serialize};

use super::model::{Direction, Message};
use crate::identity::IdentityId;

/// Optional narrowing applied to a timeline view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFilter {
    pub direction: Option<Direction>,
    /// Case-insensitive substring matched against the message text.
    pub search: Option<String>,
}

impl MessageFilter {
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn matches(&self, message: &Message) -> bool {
        if let Some(direction) = self.direction
            && message.direction != direction
        {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => message
                .text
                .to_lowercase()
                .contains(&term.to_lowercase()),
            _ => true,
        }
    }
}

/// Ordered, deduplicated view of one identity's messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Timeline {
    pub identity_id: IdentityId,
    messages: Vec<Message>,
}

impl Timeline {
    /// Builds a timeline from cached entries, keeping those that match
    /// `filter`, ordered by `created_at` then `id`.
    pub fn build<'a, I>(identity_id: IdentityId, entries: I, filter: &MessageFilter) -> Self
    where
        I: IntoIterator<Item = &'a Message>,
    {
        let mut messages: Vec<Message> = entries
            .into_iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        messages.sort_by(Message::timeline_cmp);
        Self {
            identity_id,
            messages,
        }
    }

    pub fn empty(identity_id: IdentityId) -> Self {
        Self {
            identity_id,
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_unread()).count()
    }

    /// Same entries, most recent first (history listing order).
    pub fn newest_first(mut self) -> Self {
        self.messages.reverse();
        self
    }

    /// Slices the timeline into fixed-size display pages.
    ///
    /// `page` is 1-based; `0` is treated as `1`. A page past the end yields
    /// no items but still reports the totals.
    pub fn page(&self, page: usize, page_size: usize) -> TimelinePage {
        let page_size = page_size.max(1);
        let page = page.max(1);
        let total_items = self.messages.len();
        let total_pages = total_items.div_ceil(page_size).max(1);
        let items = self
            .messages
            .iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .cloned()
            .collect();

        TimelinePage {
            items,
            page,
            page_size,
            total_pages,
            total_items,
        }
    }
}

/// One display page of a timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelinePage {
    pub items: Vec<Message>,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

impl TimelinePage {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}
