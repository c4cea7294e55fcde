use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use parlor_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Decide whether an event belongs on this connection: user-scoped events
/// go to the participants they name, chat-scoped events to connections
/// subscribed to that chat.
fn should_deliver(event: &GatewayEvent, user_id: Uuid, subscriptions: &HashSet<Uuid>) -> bool {
    if let Some(users) = event.users() {
        return users.contains(&user_id);
    }
    if let Some(chat_id) = event.chat_id() {
        return subscriptions.contains(&chat_id);
    }
    false
}

/// Handle a single WebSocket connection: Identify handshake, Ready, then
/// the filtered event relay loop with heartbeat.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, jwt_secret: String) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for Identify command with JWT
    let (user_id, name) = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", name, user_id);

    // Step 2: Send Ready event
    let ready = GatewayEvent::Ready {
        user_id,
        name: name.clone(),
    };
    let Ok(ready_json) = serde_json::to_string(&ready) else {
        return;
    };
    if sender.send(Message::Text(ready_json.into())).await.is_err() {
        return;
    }

    let conn_id = dispatcher.user_online(user_id, name.clone()).await;
    let mut broadcast_rx = dispatcher.subscribe();

    // Per-connection chat subscriptions (shared between send and recv tasks).
    let subscriptions: Arc<std::sync::RwLock<HashSet<Uuid>>> =
        Arc::new(std::sync::RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward filtered broadcasts -> client, with heartbeat
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

                    {
                        let subs = send_subscriptions.read()
                            .expect("subscription lock poisoned");
                        if !should_deliver(&event, user_id, &subs) {
                            continue;
                        }
                    }

                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let name_recv = name.clone();
    let recv_subscriptions = subscriptions.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(user_id, &name_recv, cmd, &recv_subscriptions);
                    }
                    Err(e) => {
                        let preview: String = text.chars().take(200).collect();
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            name_recv, user_id, e, preview
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

    dispatcher.user_offline(user_id, conn_id).await;
    info!("{} ({}) disconnected from gateway", name, user_id);
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<(Uuid, String)> {
    use jsonwebtoken::{DecodingKey, Validation, decode};
    use parlor_types::api::Claims;

    let timeout = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some((token_data.claims.sub, token_data.claims.name));
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

fn handle_command(
    user_id: Uuid,
    name: &str,
    cmd: GatewayCommand,
    subscriptions: &Arc<std::sync::RwLock<HashSet<Uuid>>>,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        // Subscriptions are not checked against chat membership: the only
        // chat-scoped payloads are for chats whose ids a client can only
        // learn through its own authenticated REST calls. Per-subscription
        // membership checks would need a DB handle here.
        GatewayCommand::Subscribe { chat_ids } => {
            info!(
                "{} ({}) subscribing to {} chats",
                name,
                user_id,
                chat_ids.len()
            );
            let mut subs = subscriptions.write().expect("subscription lock poisoned");
            *subs = chat_ids.into_iter().collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_scoped_events_route_by_participant() {
        let me = Uuid::new_v4();
        let peer = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let subs = HashSet::new();

        let event = GatewayEvent::ChatUpdated { users: [me, peer] };
        assert!(should_deliver(&event, me, &subs));
        assert!(should_deliver(&event, peer, &subs));
        assert!(!should_deliver(&event, stranger, &subs));
    }

    #[test]
    fn chat_scoped_events_route_by_subscription() {
        let me = Uuid::new_v4();
        let chat_id = Uuid::new_v4();

        let event = GatewayEvent::MessageDeleted {
            chat_id,
            message_id: Uuid::new_v4(),
        };

        let empty = HashSet::new();
        assert!(!should_deliver(&event, me, &empty));

        let subscribed: HashSet<Uuid> = [chat_id].into_iter().collect();
        assert!(should_deliver(&event, me, &subscribed));
    }

    #[test]
    fn ready_is_never_rebroadcast() {
        let me = Uuid::new_v4();
        let event = GatewayEvent::Ready {
            user_id: me,
            name: "alice".into(),
        };

        assert!(!should_deliver(&event, me, &HashSet::new()));
    }
}
