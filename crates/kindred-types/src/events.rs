use serde::{Deserialize, Serialize};

use crate::models::{RoomId, UserId};

/// Commands sent FROM client TO server over the conversation channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChannelCommand {
    /// Announce presence in the room shared with `target_user_id`
    #[serde(rename = "joinChat", rename_all = "camelCase")]
    JoinChat {
        first_name: String,
        user_id: UserId,
        target_user_id: UserId,
    },

    /// Dispatch one message to the room
    #[serde(rename = "sendMessage", rename_all = "camelCase")]
    SendMessage {
        first_name: String,
        last_name: String,
        user_id: UserId,
        target_user_id: UserId,
        text: String,
    },
}

impl ChannelCommand {
    /// The room this command is addressed to.
    pub fn room_id(&self) -> RoomId {
        match self {
            Self::JoinChat {
                user_id,
                target_user_id,
                ..
            }
            | Self::SendMessage {
                user_id,
                target_user_id,
                ..
            } => RoomId::between(user_id, target_user_id),
        }
    }
}

/// Events sent FROM server TO every member of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChannelEvent {
    /// A message was dispatched to the room, echoed to its sender as well
    #[serde(rename = "messageReceived")]
    MessageReceived(Delivery),
}

/// Payload of a delivery. Carries no timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub sender_id: Option<UserId>,
    pub text: String,
}
