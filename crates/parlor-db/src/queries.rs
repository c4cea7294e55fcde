use crate::Database;
use crate::models::{
    AudioAttachmentRow, ChatRow, FileAttachmentRow, MessageRow, NewAttachmentRow, NewMessage,
    UserRow,
};
use anyhow::{Result, anyhow};
use rusqlite::Connection;

impl Database {
    // -- Users --

    /// Insert a user; returns false when the email is already registered.
    /// The unique email column decides, so racing registrations for the
    /// same address cannot both land.
    pub fn create_user(
        &self,
        id: &str,
        name: &str,
        email: &str,
        password_hash: &str,
        now: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, name, email, password, created_at) VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(email) DO NOTHING",
                (id, name, email, password_hash, now),
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    // -- Chats --

    /// Insert a chat for the canonical pair, or return the existing live one.
    ///
    /// The partial unique index on (user_lo, user_hi) is the authority here:
    /// the insert is attempted unconditionally and a constraint violation
    /// means another caller won the race, in which case we re-read. Never
    /// check-then-insert.
    pub fn get_or_create_chat(
        &self,
        id: &str,
        user_lo: &str,
        user_hi: &str,
        now: &str,
    ) -> Result<(ChatRow, bool)> {
        self.with_conn_mut(|conn| {
            // Two attempts: the winning row can be soft-deleted by another
            // writer between the conflicting insert and the re-read, in
            // which case the index no longer blocks and a fresh insert wins.
            for _ in 0..2 {
                let inserted = conn.execute(
                    "INSERT INTO chats (id, user_lo, user_hi, last_activity_at, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT DO NOTHING",
                    (id, user_lo, user_hi, now, now),
                )?;

                if inserted > 0 {
                    let row = query_chat_by_id(conn, id)?
                        .ok_or_else(|| anyhow!("chat {} vanished after insert", id))?;
                    return Ok((row, true));
                }

                if let Some(row) = query_active_chat_by_pair(conn, user_lo, user_hi)? {
                    return Ok((row, false));
                }
            }

            Err(anyhow!("chat pair conflict but no live row"))
        })
    }

    /// The live chat between the canonical pair, if any. Pure read.
    pub fn find_active_chat(&self, user_lo: &str, user_hi: &str) -> Result<Option<ChatRow>> {
        self.with_conn(|conn| query_active_chat_by_pair(conn, user_lo, user_hi))
    }

    /// Chat by id regardless of deletion state (ownership checks decide
    /// what the caller may learn about it).
    pub fn get_chat(&self, id: &str) -> Result<Option<ChatRow>> {
        self.with_conn(|conn| query_chat_by_id(conn, id))
    }

    /// Live chats where the user participates, most recent activity first.
    pub fn list_active_chats(&self, user_id: &str) -> Result<Vec<ChatRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_lo, user_hi, last_activity_at, deleted_at, created_at
                 FROM chats
                 WHERE (user_lo = ?1 OR user_hi = ?1) AND deleted_at IS NULL
                 ORDER BY last_activity_at DESC",
            )?;

            let rows = stmt
                .query_map([user_id], chat_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Guarded soft delete; returns false when the chat was already deleted.
    pub fn soft_delete_chat(&self, id: &str, now: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE chats SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
                (id, now),
            )?;
            Ok(changed > 0)
        })
    }

    // -- Messages --

    /// Transactional append: attachment row (if staged), message row, and
    /// the owning chat's last_activity_at bump commit together or not at all.
    pub fn append_message(&self, msg: &NewMessage, now: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if let Some(attachment) = &msg.attachment {
                insert_attachment_row(&tx, attachment, now)?;
            }

            tx.execute(
                "INSERT INTO messages (id, chat_id, sender_id, body, attachment_kind, attachment_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                (
                    &msg.id,
                    &msg.chat_id,
                    &msg.sender_id,
                    &msg.body,
                    msg.attachment.as_ref().map(|a| a.kind_code()),
                    msg.attachment.as_ref().map(|a| a.id().to_string()),
                    now,
                ),
            )?;

            tx.execute(
                "UPDATE chats SET last_activity_at = ?2 WHERE id = ?1",
                (&msg.chat_id, now),
            )?;

            tx.commit()?;
            Ok(())
        })
    }

    /// Non-deleted messages for a chat, oldest first (display order).
    pub fn list_messages(&self, chat_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, sender_id, body, attachment_kind, attachment_id,
                        read_at, deleted_at, created_at
                 FROM messages
                 WHERE chat_id = ?1 AND deleted_at IS NULL
                 ORDER BY created_at ASC, id ASC",
            )?;

            let rows = stmt
                .query_map([chat_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Message by id regardless of chat or message deletion state.
    /// Audit path: messages outlive their chat's soft delete.
    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, sender_id, body, attachment_kind, attachment_id,
                        read_at, deleted_at, created_at
                 FROM messages WHERE id = ?1",
            )?;

            let row = stmt.query_row([id], message_from_row).optional()?;
            Ok(row)
        })
    }

    /// Most recent non-deleted message of a chat, for listing summaries.
    pub fn last_message(&self, chat_id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, sender_id, body, attachment_kind, attachment_id,
                        read_at, deleted_at, created_at
                 FROM messages
                 WHERE chat_id = ?1 AND deleted_at IS NULL
                 ORDER BY created_at DESC, id DESC
                 LIMIT 1",
            )?;

            let row = stmt.query_row([chat_id], message_from_row).optional()?;
            Ok(row)
        })
    }

    /// Guarded soft delete: only the sender's own live message in the given
    /// chat matches. Returns false when nothing matched.
    pub fn soft_delete_message(
        &self,
        id: &str,
        chat_id: &str,
        sender_id: &str,
        now: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET deleted_at = ?4
                 WHERE id = ?1 AND chat_id = ?2 AND sender_id = ?3 AND deleted_at IS NULL",
                (id, chat_id, sender_id, now),
            )?;
            Ok(changed > 0)
        })
    }

    /// Mark every unread message in the chat as read, except the reader's
    /// own. Returns the number of rows marked; zero on a repeat call.
    pub fn mark_messages_read(&self, chat_id: &str, reader_id: &str, now: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET read_at = ?3
                 WHERE chat_id = ?1 AND sender_id != ?2
                   AND read_at IS NULL AND deleted_at IS NULL",
                (chat_id, reader_id, now),
            )?;
            Ok(changed)
        })
    }

    /// Unread message count for a viewer, excluding their own messages.
    pub fn unseen_count(&self, chat_id: &str, viewer_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE chat_id = ?1 AND sender_id != ?2
                   AND read_at IS NULL AND deleted_at IS NULL",
                (chat_id, viewer_id),
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    /// Batch unseen counts for a set of chats (single GROUP BY, no N+1).
    /// Chats with no unread messages are absent from the result.
    pub fn unseen_counts(
        &self,
        chat_ids: &[String],
        viewer_id: &str,
    ) -> Result<Vec<(String, u64)>> {
        if chat_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (2..=chat_ids.len() + 1).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT chat_id, COUNT(*) FROM messages
                 WHERE chat_id IN ({}) AND sender_id != ?1
                   AND read_at IS NULL AND deleted_at IS NULL
                 GROUP BY chat_id",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let mut params: Vec<&dyn rusqlite::types::ToSql> = vec![&viewer_id];
            params.extend(chat_ids.iter().map(|id| id as &dyn rusqlite::types::ToSql));

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Attachments --

    pub fn get_file_attachment(&self, id: &str) -> Result<Option<FileAttachmentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, location, size_bytes, content_type, display_name, extension, created_at
                 FROM file_attachments WHERE id = ?1",
            )?;

            let row = stmt
                .query_row([id], |row| {
                    Ok(FileAttachmentRow {
                        id: row.get(0)?,
                        location: row.get(1)?,
                        size_bytes: row.get(2)?,
                        content_type: row.get(3)?,
                        display_name: row.get(4)?,
                        extension: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_audio_attachment(&self, id: &str) -> Result<Option<AudioAttachmentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, location, size_bytes, content_type, created_at
                 FROM audio_attachments WHERE id = ?1",
            )?;

            let row = stmt
                .query_row([id], |row| {
                    Ok(AudioAttachmentRow {
                        id: row.get(0)?,
                        location: row.get(1)?,
                        size_bytes: row.get(2)?,
                        content_type: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }
}

fn insert_attachment_row(
    tx: &rusqlite::Transaction<'_>,
    attachment: &NewAttachmentRow,
    now: &str,
) -> Result<()> {
    match attachment {
        NewAttachmentRow::File {
            id,
            location,
            size_bytes,
            content_type,
            display_name,
            extension,
        } => {
            tx.execute(
                "INSERT INTO file_attachments (id, location, size_bytes, content_type, display_name, extension, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                (id, location, size_bytes, content_type, display_name, extension, now),
            )?;
        }
        NewAttachmentRow::Audio {
            id,
            location,
            size_bytes,
            content_type,
        } => {
            tx.execute(
                "INSERT INTO audio_attachments (id, location, size_bytes, content_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, location, size_bytes, content_type, now),
            )?;
        }
    }
    Ok(())
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // column is a compile-time constant from the callers above
    let sql = format!(
        "SELECT id, name, email, password, avatar, created_at FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                avatar: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_chat_by_id(conn: &Connection, id: &str) -> Result<Option<ChatRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_lo, user_hi, last_activity_at, deleted_at, created_at
         FROM chats WHERE id = ?1",
    )?;

    let row = stmt.query_row([id], chat_from_row).optional()?;
    Ok(row)
}

fn query_active_chat_by_pair(
    conn: &Connection,
    user_lo: &str,
    user_hi: &str,
) -> Result<Option<ChatRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_lo, user_hi, last_activity_at, deleted_at, created_at
         FROM chats
         WHERE user_lo = ?1 AND user_hi = ?2 AND deleted_at IS NULL",
    )?;

    let row = stmt.query_row([user_lo, user_hi], chat_from_row).optional()?;
    Ok(row)
}

fn chat_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<ChatRow, rusqlite::Error> {
    Ok(ChatRow {
        id: row.get(0)?,
        user_lo: row.get(1)?,
        user_hi: row.get(2)?,
        last_activity_at: row.get(3)?,
        deleted_at: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn message_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<MessageRow, rusqlite::Error> {
    Ok(MessageRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_id: row.get(2)?,
        body: row.get(3)?,
        attachment_kind: row.get(4)?,
        attachment_id: row.get(5)?,
        read_at: row.get(6)?,
        deleted_at: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
