use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parlor_core::CoreError;
use parlor_types::api::{
    ChatListResponse, Claims, CreateChatRequest, CreateChatResponse, DeleteChatResponse,
};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_blocking;

/// GET /chats — the caller's live chats, most recent activity first.
pub async fn list_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let registry = state.registry.clone();
    let results = run_blocking(move || registry.list_chats(claims.sub)).await?;

    Ok(Json(ChatListResponse { results }))
}

/// POST /chats — resolve the target user by email and return the chat with
/// them, creating it when absent. Replays of the same request land on the
/// same chat.
pub async fn create_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let registry = state.registry.clone();

    let (result, created) = run_blocking(move || {
        let other = db
            .get_user_by_email(&req.email)?
            .ok_or(CoreError::UserNotFound)?;
        let other_id: Uuid = other
            .id
            .parse()
            .map_err(|e| anyhow::anyhow!("bad stored user id: {}", e))?;

        registry.get_or_create_chat(claims.sub, other_id)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateChatResponse { result, created }),
    ))
}

/// DELETE /chats/{chat_id} — soft delete; idempotent.
pub async fn delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let registry = state.registry.clone();
    let deleted = run_blocking(move || registry.soft_delete_chat(chat_id, claims.sub)).await?;

    Ok(Json(DeleteChatResponse { deleted }))
}
