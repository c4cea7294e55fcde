use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public view of a user — never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPublic {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub avatar: String,
}

/// A one-to-one conversation. The participant pair is unordered:
/// `(a, b)` and `(b, a)` are the same chat, canonicalized in storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub participants: [Uuid; 2],
    pub last_activity_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    /// The participant that is not `user_id`.
    pub fn other_participant(&self, user_id: Uuid) -> Uuid {
        if self.participants[0] == user_id {
            self.participants[1]
        } else {
            self.participants[0]
        }
    }
}

/// Chat as delivered to the listing endpoint: the other participant plus
/// unseen-count and last-message summaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: Uuid,
    pub user: UserPublic,
    pub unseen_count: u64,
    pub last_message: Option<MessageView>,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A message as delivered to clients and gateway subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub body: Option<String>,
    pub attachment: Option<Attachment>,
    pub sender: UserPublic,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Attachment resolved to its concrete variant at read time.
/// Serializes externally tagged: `{"file": {...}}` or `{"audio": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attachment {
    File(FileAttachment),
    Audio(AudioAttachment),
}

impl Attachment {
    pub fn id(&self) -> Uuid {
        match self {
            Self::File(f) => f.id,
            Self::Audio(a) => a.id,
        }
    }

    /// Discriminator stored alongside the message row.
    pub fn kind(&self) -> AttachmentKind {
        match self {
            Self::File(_) => AttachmentKind::File,
            Self::Audio(_) => AttachmentKind::Audio,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttachmentKind {
    File,
    Audio,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "FILE",
            Self::Audio => "AUDIO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FILE" => Some(Self::File),
            "AUDIO" => Some(Self::Audio),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAttachment {
    pub id: Uuid,
    pub location: String,
    pub size_bytes: u64,
    /// Human-readable size ("1.5 MB"), derived from `size_bytes`.
    pub size: String,
    pub content_type: String,
    pub display_name: String,
    pub extension: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioAttachment {
    pub id: Uuid,
    pub location: String,
    pub size_bytes: u64,
    pub size: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_serializes_externally_tagged() {
        let attachment = Attachment::Audio(AudioAttachment {
            id: Uuid::new_v4(),
            location: "/media/abc".into(),
            size_bytes: 2048,
            size: "2 KB".into(),
            content_type: "audio/webm".into(),
            created_at: Utc::now(),
        });

        let json = serde_json::to_value(&attachment).unwrap();
        assert!(json.get("audio").is_some());
        assert!(json.get("file").is_none());
    }

    #[test]
    fn attachment_kind_round_trips_through_db_code() {
        assert_eq!(AttachmentKind::parse("FILE"), Some(AttachmentKind::File));
        assert_eq!(AttachmentKind::parse("AUDIO"), Some(AttachmentKind::Audio));
        assert_eq!(AttachmentKind::parse("VIDEO"), None);
        assert_eq!(AttachmentKind::File.as_str(), "FILE");
    }

    #[test]
    fn other_participant_picks_the_peer() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let chat = Chat {
            id: Uuid::new_v4(),
            participants: [a, b],
            last_activity_at: Utc::now(),
            deleted_at: None,
            created_at: Utc::now(),
        };

        assert_eq!(chat.other_participant(a), b);
        assert_eq!(chat.other_participant(b), a);
        assert!(chat.has_participant(a));
        assert!(!chat.has_participant(Uuid::new_v4()));
    }
}
