use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{error, info, warn};
use uuid::Uuid;

use parley_db::{Connection, Database, members};
use parley_types::api::Claims;
use parley_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh socket may stay silent before sending `Identify`.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

type Subscriptions = Arc<RwLock<HashSet<String>>>;

/// Handle a single WebSocket connection: Identify handshake, then relay
/// workspace events the client subscribed to until either side goes away.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    let (user_id, name) = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", name, user_id);

    let ready = GatewayEvent::Ready {
        user_id,
        name: name.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    // Send existing online users to this client so they see who's already here
    for (uid, uname) in dispatcher.online_users().await {
        let event = GatewayEvent::PresenceUpdate {
            user_id: uid,
            name: uname,
            online: true,
        };
        if send_event(&mut sender, &event).await.is_err() {
            return;
        }
    }

    dispatcher.user_online(user_id, name.clone()).await;

    run_connection_loop(sender, receiver, &dispatcher, db, user_id, &name).await;

    dispatcher.user_offline(user_id).await;
    info!("{} ({}) disconnected from gateway", name, user_id);
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: &Dispatcher,
    db: Arc<Database>,
    user_id: Uuid,
    name: &str,
) {
    let mut broadcast_rx = dispatcher.subscribe();

    // Per-connection workspace subscriptions (shared between send and recv tasks).
    let subscriptions: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();
    let send_user_id = user_id.to_string();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if let Some(workspace_id) = event.workspace_id() {
                        let subscribed = send_subscriptions
                            .read()
                            .map(|subs| subs.contains(workspace_id))
                            .unwrap_or(false);
                        if !subscribed {
                            continue;
                        }
                    }

                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                    revoke_subscription(&send_subscriptions, &event, &send_user_id);
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!(
                                "Heartbeat timeout (missed {} pongs), dropping connection",
                                missed_heartbeats
                            );
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let name_recv = name.to_string();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&db, user_id, &name_recv, cmd, &subscriptions).await,
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            name_recv,
                            user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

/// Stop delivering a workspace's events once `event` ends the user's access
/// to it. The revoking event itself has already been delivered.
fn revoke_subscription(subscriptions: &Subscriptions, event: &GatewayEvent, user_id: &str) {
    let Some(workspace_id) = event.revoked_workspace(user_id) else {
        return;
    };
    if let Ok(mut subs) = subscriptions.write() {
        if subs.remove(workspace_id) {
            info!("{} unsubscribed from workspace {} after losing access", user_id, workspace_id);
        }
    }
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), ()> {
    let text = serde_json::to_string(event).map_err(|e| {
        error!("Failed to serialize gateway event: {}", e);
    })?;
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<(Uuid, String)> {
    let timeout = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let claims = verify_token(&token, jwt_secret)?;
                    return Some((claims.sub, claims.name));
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

/// Decode and validate a gateway token. Same secret and algorithm as the
/// HTTP bearer tokens.
pub fn verify_token(token: &str, jwt_secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}

async fn handle_command(
    db: &Arc<Database>,
    user_id: Uuid,
    name: &str,
    cmd: GatewayCommand,
    subscriptions: &Subscriptions,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Subscribe { workspace_ids } => {
            let requested = workspace_ids.len();
            let db = db.clone();
            let uid = user_id.to_string();
            let allowed = tokio::task::spawn_blocking(move || {
                db.with_conn(|conn| member_workspaces(conn, &uid, workspace_ids))
            })
            .await;

            let allowed = match allowed {
                Ok(Ok(allowed)) => allowed,
                Ok(Err(e)) => {
                    error!("Subscription lookup failed for {}: {}", user_id, e);
                    return;
                }
                Err(e) => {
                    error!("spawn_blocking join error: {}", e);
                    return;
                }
            };

            info!(
                "{} ({}) subscribed to {} of {} requested workspaces",
                name,
                user_id,
                allowed.len(),
                requested
            );

            if let Ok(mut subs) = subscriptions.write() {
                *subs = allowed;
            }
        }
    }
}

/// Keep only the workspaces `user_id` is a member of.
fn member_workspaces(
    conn: &Connection,
    user_id: &str,
    workspace_ids: Vec<String>,
) -> anyhow::Result<HashSet<String>> {
    let mut allowed = HashSet::new();
    for workspace_id in workspace_ids {
        if members::get_for_user(conn, &workspace_id, user_id)?.is_some() {
            allowed.insert(workspace_id);
        }
    }
    Ok(allowed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use parley_db::{users, workspaces};
    use parley_types::models::{Member, Role, Workspace};

    fn seed_user_in_workspace(
        conn: &Connection,
        user_id: &str,
        workspace_id: &str,
    ) -> anyhow::Result<()> {
        users::insert(conn, user_id, user_id, &format!("{user_id}@example.com"), "hash", 1)?;
        workspaces::insert(
            conn,
            &Workspace {
                id: workspace_id.into(),
                name: "team".into(),
                user_id: user_id.into(),
                join_code: "abc123".into(),
                creation_time: 1,
            },
        )?;
        members::insert(
            conn,
            &Member {
                id: format!("m-{user_id}"),
                user_id: user_id.into(),
                workspace_id: workspace_id.into(),
                role: Role::Admin,
                creation_time: 1,
            },
        )
    }

    #[test]
    fn test_verify_token_roundtrip() {
        let claims = Claims {
            sub: Uuid::new_v4(),
            name: "ada".into(),
            exp: (parley_db::now_millis() / 1000 + 3600) as usize,
        };
        let token =
            encode(&Header::default(), &claims, &EncodingKey::from_secret(b"s3cret")).unwrap();

        let decoded = verify_token(&token, "s3cret").unwrap();
        assert_eq!(decoded.sub, claims.sub);
        assert!(verify_token(&token, "other").is_none());
    }

    #[test]
    fn test_member_workspaces_filters_foreign() {
        let db = Database::open_in_memory().unwrap();
        let allowed = db
            .with_conn(|conn| {
                seed_user_in_workspace(conn, "u1", "w1")?;
                seed_user_in_workspace(conn, "u2", "w2")?;
                member_workspaces(conn, "u1", vec!["w1".into(), "w2".into(), "nope".into()])
            })
            .unwrap();

        assert_eq!(allowed, HashSet::from(["w1".to_string()]));
    }

    #[test]
    fn test_removed_member_loses_subscription() {
        let db = Database::open_in_memory().unwrap();
        let allowed = db
            .with_conn(|conn| {
                seed_user_in_workspace(conn, "u1", "w1")?;
                member_workspaces(conn, "u1", vec!["w1".into()])
            })
            .unwrap();
        let subscriptions: Subscriptions = Arc::new(RwLock::new(allowed));

        let other_user = GatewayEvent::MemberRemoved {
            workspace_id: "w1".into(),
            member_id: "m-u2".into(),
            user_id: "u2".into(),
        };
        revoke_subscription(&subscriptions, &other_user, "u1");
        assert!(subscriptions.read().unwrap().contains("w1"));

        db.with_tx(|tx| members::delete_cascade(tx, "m-u1")).unwrap();
        let removed = GatewayEvent::MemberRemoved {
            workspace_id: "w1".into(),
            member_id: "m-u1".into(),
            user_id: "u1".into(),
        };
        revoke_subscription(&subscriptions, &removed, "u1");
        assert!(subscriptions.read().unwrap().is_empty());
    }

    #[test]
    fn test_deleted_workspace_is_unsubscribed() {
        let subscriptions: Subscriptions =
            Arc::new(RwLock::new(HashSet::from(["w1".to_string(), "w2".to_string()])));
        let deleted = GatewayEvent::WorkspaceDeleted {
            workspace_id: "w2".into(),
        };
        revoke_subscription(&subscriptions, &deleted, "u1");
        assert_eq!(*subscriptions.read().unwrap(), HashSet::from(["w1".to_string()]));
    }
}
