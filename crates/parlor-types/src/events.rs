use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::MessageView;

/// Events pushed to clients over the WebSocket gateway.
///
/// Events carrying `users` are delivered to those two participants' live
/// connections; the others are scoped to a chat and delivered to connections
/// subscribed to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, name: String },

    /// A chat was created or its summary changed (new message, read marks)
    ChatUpdated { users: [Uuid; 2] },

    /// A chat was soft-deleted by a participant
    ChatDeleted { chat_id: Uuid, users: [Uuid; 2] },

    /// A new message was posted
    MessageCreated { chat_id: Uuid, message: MessageView },

    /// A message was soft-deleted by its sender
    MessageDeleted { chat_id: Uuid, message_id: Uuid },

    /// All unread messages in the chat were marked read on behalf of
    /// `excluded_user_id` (the reader; their own view needs no badge update)
    MessagesRead {
        chat_id: Uuid,
        excluded_user_id: Uuid,
    },
}

impl GatewayEvent {
    /// The chat this event is scoped to, for subscription filtering.
    /// Events that return `None` are routed by participant instead.
    pub fn chat_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreated { chat_id, .. } => Some(*chat_id),
            Self::MessageDeleted { chat_id, .. } => Some(*chat_id),
            Self::MessagesRead { chat_id, .. } => Some(*chat_id),
            _ => None,
        }
    }

    /// The participants this event concerns, when user-scoped.
    pub fn users(&self) -> Option<[Uuid; 2]> {
        match self {
            Self::ChatUpdated { users } => Some(*users),
            Self::ChatDeleted { users, .. } => Some(*users),
            _ => None,
        }
    }
}

/// Commands sent from client to server over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Subscribe to chat-scoped events for the given chats.
    /// Replaces any previous subscription set.
    Subscribe { chat_ids: Vec<Uuid> },
}
