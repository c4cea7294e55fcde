//! Row-to-view assembly: parses stored ids/timestamps and resolves the
//! attachment discriminator into its concrete variant, once, at read time.

use anyhow::anyhow;
use uuid::Uuid;

use parlor_db::Database;
use parlor_db::models::{ChatRow, MessageRow, UserRow};
use parlor_types::format_bytes;
use parlor_types::models::{
    Attachment, AttachmentKind, AudioAttachment, Chat, FileAttachment, MessageView, UserPublic,
};

use crate::error::{CoreError, Result};
use crate::{parse_ts, parse_ts_opt};

pub(crate) fn parse_id(s: &str) -> Result<Uuid> {
    s.parse()
        .map_err(|e| CoreError::Internal(anyhow!("bad stored id {:?}: {}", s, e)))
}

pub(crate) fn user_public(row: UserRow) -> Result<UserPublic> {
    Ok(UserPublic {
        id: parse_id(&row.id)?,
        name: row.name,
        email: row.email,
        avatar: row.avatar,
    })
}

pub(crate) fn chat_model(row: &ChatRow) -> Result<Chat> {
    Ok(Chat {
        id: parse_id(&row.id)?,
        participants: [parse_id(&row.user_lo)?, parse_id(&row.user_hi)?],
        last_activity_at: parse_ts(&row.last_activity_at)?,
        deleted_at: parse_ts_opt(row.deleted_at.as_deref())?,
        created_at: parse_ts(&row.created_at)?,
    })
}

/// Chat by id where `user_id` is a participant, in any deletion state.
/// Non-participants get ChatNotFound, never a Forbidden that would confirm
/// the chat exists.
pub(crate) fn load_chat(db: &Database, chat_id: Uuid, user_id: Uuid) -> Result<Chat> {
    let row = db
        .get_chat(&chat_id.to_string())?
        .ok_or(CoreError::ChatNotFound)?;
    let chat = chat_model(&row)?;

    if !chat.has_participant(user_id) {
        return Err(CoreError::ChatNotFound);
    }
    Ok(chat)
}

/// Like `load_chat` but the chat must not be soft-deleted.
pub(crate) fn require_live_chat(db: &Database, chat_id: Uuid, user_id: Uuid) -> Result<Chat> {
    let chat = load_chat(db, chat_id, user_id)?;
    if chat.deleted_at.is_some() {
        return Err(CoreError::ChatNotFound);
    }
    Ok(chat)
}

pub(crate) fn message_view(db: &Database, row: &MessageRow) -> Result<MessageView> {
    let sender_row = db
        .get_user_by_id(&row.sender_id)?
        .ok_or_else(|| CoreError::Internal(anyhow!("sender {} missing", row.sender_id)))?;

    Ok(MessageView {
        id: parse_id(&row.id)?,
        chat_id: parse_id(&row.chat_id)?,
        body: row.body.clone(),
        attachment: resolve_attachment(db, row)?,
        sender: user_public(sender_row)?,
        read_at: parse_ts_opt(row.read_at.as_deref())?,
        created_at: parse_ts(&row.created_at)?,
    })
}

fn resolve_attachment(db: &Database, row: &MessageRow) -> Result<Option<Attachment>> {
    let (Some(kind), Some(id)) = (row.attachment_kind.as_deref(), row.attachment_id.as_deref())
    else {
        return Ok(None);
    };

    let kind = AttachmentKind::parse(kind)
        .ok_or_else(|| CoreError::Internal(anyhow!("unknown attachment kind {:?}", kind)))?;

    match kind {
        AttachmentKind::File => {
            let Some(file) = db.get_file_attachment(id)? else {
                return Ok(None);
            };
            Ok(Some(Attachment::File(FileAttachment {
                id: parse_id(&file.id)?,
                location: file.location,
                size_bytes: file.size_bytes as u64,
                size: format_bytes(file.size_bytes as u64),
                content_type: file.content_type,
                display_name: file.display_name,
                extension: file.extension,
                created_at: parse_ts(&file.created_at)?,
            })))
        }
        AttachmentKind::Audio => {
            let Some(audio) = db.get_audio_attachment(id)? else {
                return Ok(None);
            };
            Ok(Some(Attachment::Audio(AudioAttachment {
                id: parse_id(&audio.id)?,
                location: audio.location,
                size_bytes: audio.size_bytes as u64,
                size: format_bytes(audio.size_bytes as u64),
                content_type: audio.content_type,
                created_at: parse_ts(&audio.created_at)?,
            })))
        }
    }
}
