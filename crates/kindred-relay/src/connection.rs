use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use kindred_types::events::{ChannelCommand, ChannelEvent, Delivery};

use crate::rooms::Rooms;

/// Heartbeat interval: the relay sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Serve one channel connection until either side goes away.
pub async fn handle_connection(socket: WebSocket, rooms: Rooms) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut room_rx) = rooms.connect().await;
    info!("{} connected to relay", conn_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Room events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = room_rx.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode {:?}: {}", event, e);
                            continue;
                        }
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

    // Client commands -> rooms
    let recv_rooms = rooms.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ChannelCommand>(&text) {
                    Ok(cmd) => handle_command(&recv_rooms, conn_id, cmd).await,
                    Err(e) => {
                        let raw: String = text.chars().take(200).collect();
                        warn!("{} bad command: {} -- raw: {}", conn_id, e, raw);
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

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    rooms.disconnect(conn_id).await;
    info!("{} disconnected from relay", conn_id);
}

async fn handle_command(rooms: &Rooms, conn_id: Uuid, cmd: ChannelCommand) {
    let room = cmd.room_id();
    match cmd {
        ChannelCommand::JoinChat { first_name, .. } => {
            info!("{} ({}) joining room {}", first_name, conn_id, room);
            rooms.join(conn_id, room).await;
        }

        ChannelCommand::SendMessage {
            first_name,
            last_name,
            user_id,
            text,
            ..
        } => {
            if text.trim().is_empty() {
                debug!("{} sent a blank message, ignoring", conn_id);
                return;
            }

            let event = ChannelEvent::MessageReceived(Delivery {
                first_name,
                last_name,
                sender_id: Some(user_id),
                text,
            });
            let reached = rooms.broadcast(&room, event).await;
            debug!("Message in room {} delivered to {} connections", room, reached);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindred_types::models::{RoomId, UserId};

    fn send(text: &str) -> ChannelCommand {
        ChannelCommand::SendMessage {
            first_name: "Sam".into(),
            last_name: "Park".into(),
            user_id: "U1".into(),
            target_user_id: "U2".into(),
            text: text.into(),
        }
    }

    #[tokio::test]
    async fn send_is_echoed_with_sender_id() {
        let rooms = Rooms::new();
        let (conn, mut rx) = rooms.connect().await;
        rooms
            .join(conn, RoomId::between(&UserId::new("U2"), &UserId::new("U1")))
            .await;

        handle_command(&rooms, conn, send("hello")).await;

        let ChannelEvent::MessageReceived(delivery) = rx.try_recv().unwrap();
        assert_eq!(delivery.sender_id, Some(UserId::new("U1")));
        assert_eq!(delivery.first_name, "Sam");
        assert_eq!(delivery.last_name, "Park");
        assert_eq!(delivery.text, "hello");
    }

    #[tokio::test]
    async fn blank_send_is_not_broadcast() {
        let rooms = Rooms::new();
        let (conn, mut rx) = rooms.connect().await;
        handle_command(
            &rooms,
            conn,
            ChannelCommand::JoinChat {
                first_name: "Sam".into(),
                user_id: "U1".into(),
                target_user_id: "U2".into(),
            },
        )
        .await;

        handle_command(&rooms, conn, send("  \n")).await;
        assert!(rx.try_recv().is_err());
    }
}
