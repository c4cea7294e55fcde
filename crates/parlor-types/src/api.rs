use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChatSummary, MessageView};

// -- JWT Claims --

/// JWT claims shared across parlor-api (REST middleware) and parlor-gateway
/// (WebSocket authentication). Canonical definition lives here in
/// parlor-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub name: String,
    pub token: String,
}

// -- Chats --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChatRequest {
    /// Email of the user to open a chat with.
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct CreateChatResponse {
    pub result: ChatSummary,
    pub created: bool,
}

#[derive(Debug, Serialize)]
pub struct ChatListResponse {
    pub results: Vec<ChatSummary>,
}

#[derive(Debug, Serialize)]
pub struct DeleteChatResponse {
    pub deleted: bool,
}

// -- Messages --

#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    pub results: Vec<MessageView>,
}
