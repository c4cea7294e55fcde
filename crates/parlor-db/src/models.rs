//! Database row types, mapped directly from SQLite rows. Kept distinct
//! from the API models; timestamp columns stay RFC 3339 strings until the
//! core layer parses them.

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub avatar: String,
    pub created_at: String,
}

pub struct ChatRow {
    pub id: String,
    pub user_lo: String,
    pub user_hi: String,
    pub last_activity_at: String,
    pub deleted_at: Option<String>,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub body: Option<String>,
    pub attachment_kind: Option<String>,
    pub attachment_id: Option<String>,
    pub read_at: Option<String>,
    pub deleted_at: Option<String>,
    pub created_at: String,
}

pub struct FileAttachmentRow {
    pub id: String,
    pub location: String,
    pub size_bytes: i64,
    pub content_type: String,
    pub display_name: String,
    pub extension: String,
    pub created_at: String,
}

pub struct AudioAttachmentRow {
    pub id: String,
    pub location: String,
    pub size_bytes: i64,
    pub content_type: String,
    pub created_at: String,
}

/// Attachment row values staged for insertion inside the message
/// transaction. The blob itself is already stored when this exists.
#[derive(Clone)]
pub enum NewAttachmentRow {
    File {
        id: String,
        location: String,
        size_bytes: i64,
        content_type: String,
        display_name: String,
        extension: String,
    },
    Audio {
        id: String,
        location: String,
        size_bytes: i64,
        content_type: String,
    },
}

impl NewAttachmentRow {
    pub fn id(&self) -> &str {
        match self {
            Self::File { id, .. } => id,
            Self::Audio { id, .. } => id,
        }
    }

    /// Discriminator stored on the message row.
    pub fn kind_code(&self) -> &'static str {
        match self {
            Self::File { .. } => "FILE",
            Self::Audio { .. } => "AUDIO",
        }
    }
}

/// Message row values for the transactional append.
pub struct NewMessage {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub body: Option<String>,
    pub attachment: Option<NewAttachmentRow>,
}
