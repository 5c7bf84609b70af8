use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::trace;
use uuid::Uuid;

use parley_types::events::GatewayEvent;

/// Fans change notifications out to every connected gateway client and
/// tracks who is online.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Every connection subscribes; workspace filtering happens per connection.
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// user_id -> (name, open connection count)
    online_users: RwLock<HashMap<Uuid, (String, usize)>>,
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
            }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        trace!("broadcast {:?}", event);
        // Err only means nobody is connected.
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a new connection for `user_id`. Announces presence only when
    /// this is the user's first open connection.
    pub async fn user_online(&self, user_id: Uuid, name: String) {
        let first = {
            let mut online = self.inner.online_users.write().await;
            let entry = online.entry(user_id).or_insert_with(|| (name.clone(), 0));
            entry.1 += 1;
            entry.1 == 1
        };

        if first {
            self.broadcast(GatewayEvent::PresenceUpdate {
                user_id,
                name,
                online: true,
            });
        }
    }

    /// Drop one connection for `user_id`. Announces the user offline once the
    /// last connection is gone.
    pub async fn user_offline(&self, user_id: Uuid) {
        let gone = {
            let mut online = self.inner.online_users.write().await;
            match online.get_mut(&user_id) {
                Some(entry) if entry.1 > 1 => {
                    entry.1 -= 1;
                    None
                }
                Some(_) => online.remove(&user_id).map(|(name, _)| name),
                None => None,
            }
        };

        if let Some(name) = gone {
            self.broadcast(GatewayEvent::PresenceUpdate {
                user_id,
                name,
                online: false,
            });
        }
    }

    /// Get list of online users.
    pub async fn online_users(&self) -> Vec<(Uuid, String)> {
        self.inner
            .online_users
            .read()
            .await
            .iter()
            .map(|(id, (name, _))| (*id, name.clone()))
            .collect()
    }
}
