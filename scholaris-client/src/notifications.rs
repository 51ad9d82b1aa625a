//! Toast notifications surfaced by failed mutations.

use crate::config::NotificationSettings;
use chrono::{DateTime, Utc};
use scholaris_cache::MutationError;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    Retry,
    Dismiss,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub level: NotificationLevel,
    pub message: String,
    pub action: Option<NotificationAction>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            level,
            message: message.into(),
            action: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Toast for a failed mutation. Network failures offer a retry.
    pub fn mutation_failed(operation: &str, err: &MutationError) -> Self {
        let action = match err {
            MutationError::Transport { .. } => NotificationAction::Retry,
            _ => NotificationAction::Dismiss,
        };
        Notification::new(
            NotificationLevel::Error,
            format!("Could not {}: {}", operation, err),
        )
        .with_action(action)
    }

    fn expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now - self.created_at >= ttl,
            Err(_) => false,
        }
    }
}

/// Bounded queue of toasts, newest last.
#[derive(Debug)]
pub struct NotificationCenter {
    max_visible: usize,
    ttl: Duration,
    queue: Mutex<VecDeque<Notification>>,
}

impl NotificationCenter {
    pub fn new(max_visible: usize, ttl: Duration) -> Self {
        Self {
            max_visible,
            ttl,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn from_settings(settings: &NotificationSettings) -> Self {
        Self::new(settings.max_visible, Duration::from_millis(settings.ttl_ms))
    }

    /// Queue a toast. The oldest is dropped once `max_visible` is exceeded.
    pub fn push(&self, notification: Notification) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.push_back(notification);
        while queue.len() > self.max_visible {
            queue.pop_front();
        }
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(Notification::new(NotificationLevel::Error, message));
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(Notification::new(NotificationLevel::Success, message));
    }

    /// Toasts that have not yet expired at `now`.
    pub fn visible_at(&self, now: DateTime<Utc>) -> Vec<Notification> {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.retain(|n| !n.expired_at(now, self.ttl));
        queue.iter().cloned().collect()
    }

    pub fn visible(&self) -> Vec<Notification> {
        self.visible_at(Utc::now())
    }

    /// Remove one toast. Returns whether it was still queued.
    pub fn dismiss(&self, id: Uuid) -> bool {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let before = queue.len();
        queue.retain(|n| n.id != id);
        queue.len() != before
    }

    pub fn clear(&self) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oldest_toast_is_dropped() {
        let center = NotificationCenter::new(2, Duration::from_secs(5));
        center.error("first");
        center.error("second");
        center.error("third");

        let messages: Vec<String> = center.visible().into_iter().map(|n| n.message).collect();
        assert_eq!(messages, vec!["second", "third"]);
    }

    #[test]
    fn test_expired_toasts_are_pruned() {
        let center = NotificationCenter::new(3, Duration::from_millis(100));
        center.success("saved");
        let later = Utc::now() + chrono::Duration::seconds(1);
        assert!(center.visible_at(later).is_empty());
        assert!(center.visible().is_empty());
    }

    #[test]
    fn test_dismiss() {
        let center = NotificationCenter::new(3, Duration::from_secs(5));
        center.error("boom");
        let id = center.visible()[0].id;
        assert!(center.dismiss(id));
        assert!(!center.dismiss(id));
    }

    #[test]
    fn test_transport_failure_offers_retry() {
        let toast = Notification::mutation_failed("like post", &MutationError::transport("timeout"));
        assert_eq!(toast.level, NotificationLevel::Error);
        assert_eq!(toast.action, Some(NotificationAction::Retry));
        assert!(toast.message.starts_with("Could not like post"));

        let toast =
            Notification::mutation_failed("like post", &MutationError::rejected("Post not found"));
        assert_eq!(toast.action, Some(NotificationAction::Dismiss));
    }
}
