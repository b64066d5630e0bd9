use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use loreweave_types::events::GatewayEvent;

/// Tracks connected readers and fans events out to them.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Every connection receives every broadcast; story-scoped events are
    /// filtered per connection.
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// user_id -> username
    online_users: RwLock<HashMap<Uuid, String>>,

    /// user_id -> (conn_id, sender). The newest connection of a user wins.
    user_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                online_users: RwLock::new(HashMap::new()),
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Send to all connected clients. Having no listeners is not an error.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a per-user targeted channel. Returns (conn_id, receiver).
    pub async fn register_user_channel(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Unregister a per-user channel, but only if `conn_id` still owns it.
    pub async fn unregister_user_channel(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if channels.get(&user_id).is_some_and(|(cid, _)| *cid == conn_id) {
            channels.remove(&user_id);
        }
    }

    /// Push an event to one user. Returns false when the user has no live
    /// connection.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> bool {
        let channels = self.inner.user_channels.read().await;
        match channels.get(&user_id) {
            Some((_, tx)) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub async fn user_online(&self, user_id: Uuid, username: String) {
        self.inner
            .online_users
            .write()
            .await
            .insert(user_id, username.clone());

        self.broadcast(GatewayEvent::PresenceUpdate {
            user_id,
            username,
            online: true,
        });
    }

    /// Mark a user offline. Does nothing if a newer connection took over.
    pub async fn user_offline(&self, user_id: Uuid, conn_id: Uuid) {
        let is_current = {
            let channels = self.inner.user_channels.read().await;
            channels
                .get(&user_id)
                .is_some_and(|(cid, _)| *cid == conn_id)
        };
        if !is_current {
            return;
        }

        let username = self
            .inner
            .online_users
            .write()
            .await
            .remove(&user_id)
            .unwrap_or_default();

        self.unregister_user_channel(user_id, conn_id).await;

        self.broadcast(GatewayEvent::PresenceUpdate {
            user_id,
            username,
            online: false,
        });
    }

    pub async fn online_users(&self) -> Vec<(Uuid, String)> {
        self.inner
            .online_users
            .read()
            .await
            .iter()
            .map(|(id, name)| (*id, name.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn chat(text: &str) -> GatewayEvent {
        GatewayEvent::ChatBroadcast {
            text: text.into(),
            from_username: "mira".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn targeted_send_reaches_only_that_user() {
        let d = Dispatcher::new();
        let mira = Uuid::new_v4();
        let bo = Uuid::new_v4();
        let (_, mut mira_rx) = d.register_user_channel(mira).await;
        let (_, mut bo_rx) = d.register_user_channel(bo).await;

        assert!(d.send_to_user(mira, chat("psst")).await);
        assert!(matches!(mira_rx.try_recv(), Ok(GatewayEvent::ChatBroadcast { .. })));
        assert!(bo_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_absent_user_reports_false() {
        let d = Dispatcher::new();
        assert!(!d.send_to_user(Uuid::new_v4(), chat("hello?")).await);
    }

    #[tokio::test]
    async fn stale_connection_does_not_evict_newer_one() {
        let d = Dispatcher::new();
        let user = Uuid::new_v4();
        let (old_conn, _old_rx) = d.register_user_channel(user).await;
        d.user_online(user, "mira".into()).await;
        let (_new_conn, mut new_rx) = d.register_user_channel(user).await;

        d.user_offline(user, old_conn).await;
        assert_eq!(d.online_users().await.len(), 1);
        assert!(d.send_to_user(user, chat("still here")).await);
        assert!(new_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn presence_is_broadcast() {
        let d = Dispatcher::new();
        let mut rx = d.subscribe();
        let user = Uuid::new_v4();
        let (conn, _urx) = d.register_user_channel(user).await;

        d.user_online(user, "mira".into()).await;
        d.user_offline(user, conn).await;

        match rx.recv().await.unwrap() {
            GatewayEvent::PresenceUpdate { online, .. } => assert!(online),
            other => panic!("unexpected {:?}", other),
        }
        match rx.recv().await.unwrap() {
            GatewayEvent::PresenceUpdate { online, username, .. } => {
                assert!(!online);
                assert_eq!(username, "mira");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(d.online_users().await.is_empty());
    }
}
