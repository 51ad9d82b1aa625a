//! Feature mutations built on the optimistic protocol.
//!
//! Each operation validates its input first, then runs one [`Mutation`]
//! over every key the affected views read. Failures are toasted through the
//! client's [`NotificationCenter`] and returned.
//!
//! [`Mutation`]: scholaris_cache::Mutation
//! [`NotificationCenter`]: crate::notifications::NotificationCenter

pub mod applications;
pub mod chat;
pub mod community;
pub mod scholarships;

use scholaris_core::{ChatMessage, Comment, Post, TempId};

/// Records that may be inserted optimistically under a [`TempId`].
pub(crate) trait Placeholder {
    fn pending_ref(&self) -> Option<&TempId>;

    /// Same server record, regardless of placeholder state.
    fn same_record(&self, other: &Self) -> bool;
}

impl Placeholder for Post {
    fn pending_ref(&self) -> Option<&TempId> {
        self.pending_ref.as_ref()
    }

    fn same_record(&self, other: &Self) -> bool {
        self.post_id == other.post_id
    }
}

impl Placeholder for Comment {
    fn pending_ref(&self) -> Option<&TempId> {
        self.pending_ref.as_ref()
    }

    fn same_record(&self, other: &Self) -> bool {
        self.comment_id == other.comment_id
    }
}

impl Placeholder for ChatMessage {
    fn pending_ref(&self) -> Option<&TempId> {
        self.pending_ref.as_ref()
    }

    fn same_record(&self, other: &Self) -> bool {
        self.message_id == other.message_id
    }
}

/// Put `server` where the `temp` placeholder sits.
///
/// Copies of `server` that a refetch already delivered are dropped so the
/// record appears once. Without a placeholder the list is left as is.
pub(crate) fn swap_placeholder<T: Placeholder>(items: Vec<T>, temp: &TempId, server: T) -> Vec<T> {
    let Some(at) = items.iter().position(|i| i.pending_ref() == Some(temp)) else {
        return items;
    };

    let mut out = Vec::with_capacity(items.len());
    let mut slot = None;
    for (idx, item) in items.into_iter().enumerate() {
        if idx == at {
            slot = Some(out.len());
        } else if !item.same_record(&server) {
            out.push(item);
        }
    }
    if let Some(slot) = slot {
        out.insert(slot, server);
    }
    out
}

/// Apply `f` to the items matching `pred`.
pub(crate) fn map_where<T, P, F>(items: Vec<T>, pred: P, f: F) -> Vec<T>
where
    P: Fn(&T) -> bool,
    F: Fn(T) -> T,
{
    items
        .into_iter()
        .map(|item| if pred(&item) { f(item) } else { item })
        .collect()
}
