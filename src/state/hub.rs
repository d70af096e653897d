use tokio::sync::broadcast;

use crate::dto::notify::Notification;

/// Broadcast hub fanning out domain notifications to UI and economy
/// collaborators.
///
/// Subscribers poll with `try_recv` from the host's event loop or drain the
/// receiver asynchronously; publishing never blocks and delivery errors (no
/// subscribers) are ignored.
#[derive(Debug)]
pub struct NotificationHub {
    sender: broadcast::Sender<Notification>,
}

impl NotificationHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given
    /// capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Publish a notification to all current subscribers, ignoring delivery
    /// errors.
    pub fn publish(&self, notification: Notification) {
        let _ = self.sender.send(notification);
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(64)
    }
}
