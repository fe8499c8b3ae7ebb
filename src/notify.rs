//! Per-user notification feed.
//!
//! Explicit dependency-injected service: constructed at application start,
//! dropped at shutdown. Holds newest-first feeds keyed by user, tracks read
//! state, and fans out new notifications to live subscribers over a
//! broadcast channel.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

const BROADCAST_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Dialect,
    System,
    Alert,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    pub kind: NotificationKind,
}

/// Newest-first notification feeds for all known users.
pub struct NotificationCenter {
    feeds: Mutex<HashMap<Uuid, VecDeque<Notification>>>,
    events: broadcast::Sender<Notification>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            feeds: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Record a notification for `user_id` and fan it out to subscribers.
    pub fn push(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        title: &str,
        message: &str,
    ) -> Notification {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
            read: false,
            kind,
        };

        if let Ok(mut feeds) = self.feeds.lock() {
            feeds
                .entry(user_id)
                .or_default()
                .push_front(notification.clone());
        }

        // No receivers is fine; the feed itself is the durable view.
        let _ = self.events.send(notification.clone());
        notification
    }

    /// The user's notifications, newest first.
    pub fn for_user(&self, user_id: Uuid) -> Vec<Notification> {
        self.feeds
            .lock()
            .map(|feeds| {
                feeds
                    .get(&user_id)
                    .map(|feed| feed.iter().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    pub fn unread_count(&self, user_id: Uuid) -> usize {
        self.feeds
            .lock()
            .map(|feeds| {
                feeds
                    .get(&user_id)
                    .map(|feed| feed.iter().filter(|n| !n.read).count())
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    /// Mark one notification read. Returns false when it does not exist.
    pub fn mark_as_read(&self, user_id: Uuid, notification_id: Uuid) -> bool {
        let Ok(mut feeds) = self.feeds.lock() else {
            return false;
        };
        let Some(feed) = feeds.get_mut(&user_id) else {
            return false;
        };
        match feed.iter_mut().find(|n| n.id == notification_id) {
            Some(notification) => {
                notification.read = true;
                true
            }
            None => false,
        }
    }

    /// Live feed of every notification pushed after the call.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.events.subscribe()
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

/// Compact relative-time label for feed rendering, e.g. `5m ago`.
pub fn time_ago(timestamp: DateTime<Utc>) -> String {
    let seconds = Utc::now().signed_duration_since(timestamp).num_seconds();

    let years = seconds / 31_536_000;
    if years >= 1 {
        return format!("{}y ago", years);
    }
    let months = seconds / 2_592_000;
    if months >= 1 {
        return format!("{}mo ago", months);
    }
    let days = seconds / 86_400;
    if days >= 1 {
        return format!("{}d ago", days);
    }
    let hours = seconds / 3_600;
    if hours >= 1 {
        return format!("{}h ago", hours);
    }
    let minutes = seconds / 60;
    if minutes >= 1 {
        return format!("{}m ago", minutes);
    }
    "just now".to_string()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn push_inserts_newest_first_and_counts_unread() {
        let center = NotificationCenter::new();
        let user = Uuid::new_v4();

        center.push(user, NotificationKind::System, "first", "one");
        center.push(user, NotificationKind::Dialect, "second", "two");

        let feed = center.for_user(user);
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].title, "second");
        assert_eq!(center.unread_count(user), 2);
    }

    #[test]
    fn mark_as_read_clears_one_entry() {
        let center = NotificationCenter::new();
        let user = Uuid::new_v4();

        let n = center.push(user, NotificationKind::Alert, "title", "msg");
        assert!(center.mark_as_read(user, n.id));
        assert_eq!(center.unread_count(user), 0);

        // Unknown id is reported, not swallowed
        assert!(!center.mark_as_read(user, Uuid::new_v4()));
    }

    #[test]
    fn feeds_are_per_user() {
        let center = NotificationCenter::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        center.push(alice, NotificationKind::Dialect, "hers", "msg");
        assert_eq!(center.for_user(bob).len(), 0);
        assert_eq!(center.for_user(alice).len(), 1);
    }

    #[tokio::test]
    async fn subscribers_receive_pushed_notifications() {
        let center = NotificationCenter::new();
        let mut events = center.subscribe();

        let pushed = center.push(Uuid::new_v4(), NotificationKind::System, "live", "msg");
        let received = events.recv().await.unwrap();
        assert_eq!(received.id, pushed.id);
    }

    #[test]
    fn time_ago_buckets() {
        let now = Utc::now();
        assert_eq!(time_ago(now), "just now");
        assert_eq!(time_ago(now - Duration::minutes(5)), "5m ago");
        assert_eq!(time_ago(now - Duration::hours(3)), "3h ago");
        assert_eq!(time_ago(now - Duration::days(2)), "2d ago");
    }
}
