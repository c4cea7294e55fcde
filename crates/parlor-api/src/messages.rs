use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parlor_core::{AttachmentUpload, CoreError};
use parlor_types::api::{Claims, MessageListResponse};
use parlor_types::events::GatewayEvent;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_blocking;

/// GET /chats/{chat_id}/messages — chronological messages for a chat the
/// caller participates in. Viewing has the side effect of marking the
/// caller's unread messages read, so the returned messages already carry
/// `read_at`; a follow-on `chat_updated` lets both participants refresh
/// their listing summaries.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let registry = state.registry.clone();
    let reads = state.reads.clone();
    let store = state.messages.clone();
    let events = state.events.clone();

    let results = run_blocking(move || {
        let chat = registry.get_chat(chat_id, claims.sub)?;

        reads.mark_read(chat_id, claims.sub)?;
        let messages = store.list_messages(chat_id, claims.sub)?;

        events.publish(GatewayEvent::ChatUpdated {
            users: chat.participants,
        });

        Ok(messages)
    })
    .await?;

    Ok(Json(MessageListResponse { results }))
}

/// POST /chats/{chat_id}/messages — multipart form with optional `body`
/// text and at most one `file` or `audio` part.
pub async fn send_message(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let (body, attachment) = read_upload(multipart).await?;

    let store = state.messages.clone();
    let message =
        run_blocking(move || store.append_message(chat_id, claims.sub, body, attachment)).await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// DELETE /chats/{chat_id}/messages/{message_id} — sender-only soft delete.
pub async fn delete_message(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.messages.clone();
    let message =
        run_blocking(move || store.soft_delete_message(message_id, chat_id, claims.sub)).await?;

    Ok(Json(message))
}

/// Pull `body` / `file` / `audio` out of the multipart form. Unknown parts
/// are ignored; a second attachment part is rejected rather than silently
/// dropped.
async fn read_upload(
    mut multipart: Multipart,
) -> Result<(Option<String>, Option<AttachmentUpload>), ApiError> {
    let mut body: Option<String> = None;
    let mut attachment: Option<AttachmentUpload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| CoreError::validation(format!("Malformed multipart request: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "body" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| CoreError::validation(format!("Unreadable body field: {}", e)))?;
                body = Some(text);
            }
            "file" => {
                if attachment.is_some() {
                    return Err(CoreError::validation("Only one attachment per message.").into());
                }
                let declared_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| CoreError::validation(format!("Unreadable file field: {}", e)))?;
                attachment = Some(AttachmentUpload::File {
                    bytes: bytes.to_vec(),
                    declared_name,
                    content_type,
                });
            }
            "audio" => {
                if attachment.is_some() {
                    return Err(CoreError::validation("Only one attachment per message.").into());
                }
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| CoreError::validation(format!("Unreadable audio field: {}", e)))?;
                attachment = Some(AttachmentUpload::Audio {
                    bytes: bytes.to_vec(),
                    content_type,
                });
            }
            _ => {}
        }
    }

    Ok((body, attachment))
}
