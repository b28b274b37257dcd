use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::realtime::protocol::ServerEvent;

/// Maps a user to their single live connection.
///
/// State is process-local: after a restart every user is offline until they
/// reconnect. A newer connection for the same user replaces the older one.
#[derive(Clone, Default)]
pub struct PresenceTracker {
    connections: Arc<RwLock<HashMap<Uuid, LiveConnection>>>,
}

struct LiveConnection {
    connection_id: Uuid,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `user_id` online. Events pushed to the user arrive on the returned receiver.
    pub async fn connect(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<ServerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let connection_id = Uuid::new_v4();
        let previous = self.connections.write().await.insert(
            user_id,
            LiveConnection {
                connection_id,
                sender,
            },
        );
        if let Some(previous) = previous {
            debug!(user_id = %user_id, replaced = %previous.connection_id, "presence connection replaced");
        }
        (connection_id, receiver)
    }

    /// Marks `user_id` offline if `connection_id` is still the registered connection.
    pub async fn disconnect(&self, user_id: Uuid, connection_id: Uuid) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(&user_id) {
            Some(current) if current.connection_id == connection_id => {
                connections.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.connections.read().await.contains_key(&user_id)
    }

    pub async fn connection_id(&self, user_id: Uuid) -> Option<Uuid> {
        self.connections
            .read()
            .await
            .get(&user_id)
            .map(|connection| connection.connection_id)
    }

    /// Best-effort delivery. Returns false when the user is offline or the
    /// connection has gone away; a dead connection is dropped.
    pub async fn push(&self, user_id: Uuid, event: ServerEvent) -> bool {
        let stale = {
            let connections = self.connections.read().await;
            let Some(connection) = connections.get(&user_id) else {
                return false;
            };
            match connection.sender.send(event) {
                Ok(()) => return true,
                Err(_) => connection.connection_id,
            }
        };

        debug!(user_id = %user_id, connection_id = %stale, "dropping stale presence connection");
        self.disconnect(user_id, stale).await;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::notification::{Notification, NotificationEvent, SenderSnapshot};
    use time::OffsetDateTime;

    fn event_for(receiver_id: Uuid) -> ServerEvent {
        ServerEvent::GetNotification(Notification {
            id: Uuid::new_v4(),
            receiver_id,
            sender: SenderSnapshot {
                name: "Ana".to_string(),
                avatar: None,
            },
            event: NotificationEvent::Commented,
            message: NotificationEvent::Commented.message("Ana"),
            recipe_slug: None,
            read: false,
            created_at: OffsetDateTime::now_utc(),
        })
    }

    #[tokio::test]
    async fn users_start_offline() {
        let tracker = PresenceTracker::new();
        let user = Uuid::new_v4();
        assert!(!tracker.is_online(user).await);
        assert_eq!(tracker.connection_id(user).await, None);
        assert!(!tracker.push(user, event_for(user)).await);
    }

    #[tokio::test]
    async fn connect_then_push_delivers() {
        let tracker = PresenceTracker::new();
        let user = Uuid::new_v4();
        let (connection_id, mut receiver) = tracker.connect(user).await;

        assert!(tracker.is_online(user).await);
        assert_eq!(tracker.connection_id(user).await, Some(connection_id));
        assert!(tracker.push(user, event_for(user)).await);

        let ServerEvent::GetNotification(delivered) = receiver.recv().await.unwrap();
        assert_eq!(delivered.receiver_id, user);
    }

    #[tokio::test]
    async fn disconnect_goes_offline() {
        let tracker = PresenceTracker::new();
        let user = Uuid::new_v4();
        let (connection_id, _receiver) = tracker.connect(user).await;

        assert!(tracker.disconnect(user, connection_id).await);
        assert!(!tracker.is_online(user).await);
        assert!(!tracker.disconnect(user, connection_id).await);
    }

    #[tokio::test]
    async fn stale_disconnect_keeps_newer_connection() {
        let tracker = PresenceTracker::new();
        let user = Uuid::new_v4();
        let (first, _first_rx) = tracker.connect(user).await;
        let (second, mut second_rx) = tracker.connect(user).await;

        assert!(!tracker.disconnect(user, first).await);
        assert_eq!(tracker.connection_id(user).await, Some(second));
        assert!(tracker.push(user, event_for(user)).await);
        assert!(second_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn push_to_closed_connection_drops_it() {
        let tracker = PresenceTracker::new();
        let user = Uuid::new_v4();
        let (_connection_id, receiver) = tracker.connect(user).await;
        drop(receiver);

        assert!(!tracker.push(user, event_for(user)).await);
        assert!(!tracker.is_online(user).await);
    }

    #[tokio::test]
    async fn presence_is_per_user() {
        let tracker = PresenceTracker::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (_id, mut alice_rx) = tracker.connect(alice).await;

        assert!(!tracker.push(bob, event_for(bob)).await);
        assert!(alice_rx.try_recv().is_err());
    }
}
