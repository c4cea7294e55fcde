use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use parlor_core::EventSink;
use parlor_types::events::GatewayEvent;

/// Manages all connected clients and fans events out to them.
///
/// Core components publish through the `EventSink` impl below; every live
/// connection holds a broadcast receiver and filters events for its own
/// user and chat subscriptions. Sending is fire-and-forget: a full or
/// closed channel never propagates back to the publishing operation.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for gateway events — every connection receives
    /// every event and filters locally
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Connected users: user_id -> (conn_id, name). conn_id disambiguates
    /// reconnects so a stale disconnect doesn't evict the newer connection.
    online_users: RwLock<HashMap<Uuid, (Uuid, String)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                online_users: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a user's connection. Returns the conn_id the connection
    /// must present when going offline.
    pub async fn user_online(&self, user_id: Uuid, name: String) -> Uuid {
        let conn_id = Uuid::new_v4();
        self.inner
            .online_users
            .write()
            .await
            .insert(user_id, (conn_id, name));
        conn_id
    }

    /// Remove a user's connection, but only if conn_id still matches —
    /// a newer connection may have taken over.
    pub async fn user_offline(&self, user_id: Uuid, conn_id: Uuid) {
        let mut online = self.inner.online_users.write().await;
        if let Some((current, _)) = online.get(&user_id) {
            if *current == conn_id {
                online.remove(&user_id);
            }
        }
    }

    /// Currently connected users.
    pub async fn online_users(&self) -> Vec<(Uuid, String)> {
        self.inner
            .online_users
            .read()
            .await
            .iter()
            .map(|(id, (_, name))| (*id, name.clone()))
            .collect()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for Dispatcher {
    fn publish(&self, event: GatewayEvent) {
        self.broadcast(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn published_events_reach_subscribers_in_order() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();

        let users = [Uuid::new_v4(), Uuid::new_v4()];
        let chat_id = Uuid::new_v4();

        dispatcher.publish(GatewayEvent::MessagesRead {
            chat_id,
            excluded_user_id: users[0],
        });
        dispatcher.publish(GatewayEvent::ChatUpdated { users });

        assert!(matches!(
            rx.recv().await.unwrap(),
            GatewayEvent::MessagesRead { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            GatewayEvent::ChatUpdated { .. }
        ));
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_fail() {
        let dispatcher = Dispatcher::new();
        dispatcher.publish(GatewayEvent::ChatUpdated {
            users: [Uuid::new_v4(), Uuid::new_v4()],
        });
    }

    #[tokio::test]
    async fn stale_disconnect_does_not_evict_newer_connection() {
        let dispatcher = Dispatcher::new();
        let user_id = Uuid::new_v4();

        let old_conn = dispatcher.user_online(user_id, "alice".into()).await;
        let _new_conn = dispatcher.user_online(user_id, "alice".into()).await;

        dispatcher.user_offline(user_id, old_conn).await;
        assert_eq!(dispatcher.online_users().await.len(), 1);
    }
}
