use std::sync::Arc;

use anyhow::anyhow;
use tracing::warn;
use uuid::Uuid;

use parlor_db::Database;
use parlor_db::models::NewMessage;
use parlor_types::events::GatewayEvent;
use parlor_types::models::MessageView;

use crate::attachments::{AttachmentLinker, AttachmentUpload};
use crate::error::{CoreError, Result};
use crate::events::EventSink;
use crate::now_string;
use crate::views::{message_view, require_live_chat};

/// Message creation, listing, and soft deletion within a chat.
#[derive(Clone)]
pub struct MessageStore {
    db: Arc<Database>,
    linker: AttachmentLinker,
    events: Arc<dyn EventSink>,
}

impl MessageStore {
    pub fn new(db: Arc<Database>, linker: AttachmentLinker, events: Arc<dyn EventSink>) -> Self {
        Self { db, linker, events }
    }

    /// Append a message to a live chat the sender participates in.
    ///
    /// An attachment is validated and its bytes staged in the blob store
    /// first; the attachment row, message row, and chat activity bump then
    /// commit in one transaction. Either everything lands or the caller
    /// sees a failure and no message is visible. After commit,
    /// `message_created` is published before the follow-on `chat_updated`.
    pub fn append_message(
        &self,
        chat_id: Uuid,
        sender_id: Uuid,
        body: Option<String>,
        attachment: Option<AttachmentUpload>,
    ) -> Result<MessageView> {
        let body = body.filter(|b| !b.trim().is_empty());
        if body.is_none() && attachment.is_none() {
            return Err(CoreError::validation(
                "Message requires a body or an attachment.",
            ));
        }

        let chat = require_live_chat(&self.db, chat_id, sender_id)?;

        let staged = attachment.map(|upload| self.linker.link(upload)).transpose()?;

        let message_id = Uuid::new_v4();
        let new_message = NewMessage {
            id: message_id.to_string(),
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            body,
            attachment: staged.as_ref().map(|s| s.row.clone()),
        };

        if let Err(e) = self.db.append_message(&new_message, &now_string()) {
            // The blob write already happened; reverse it so the failed
            // append leaves nothing behind. A failed reversal is logged
            // with the location for a manual sweep.
            if let Some(staged) = &staged {
                if let Err(cleanup) = self.linker.discard(staged) {
                    warn!(
                        "Orphaned blob at {} after failed append: {}",
                        staged.location, cleanup
                    );
                }
            }
            return Err(e.into());
        }

        let row = self
            .db
            .get_message(&new_message.id)?
            .ok_or_else(|| CoreError::Internal(anyhow!("message {} vanished", message_id)))?;
        let view = message_view(&self.db, &row)?;

        self.events.publish(GatewayEvent::MessageCreated {
            chat_id,
            message: view.clone(),
        });
        self.events.publish(GatewayEvent::ChatUpdated {
            users: chat.participants,
        });

        Ok(view)
    }

    /// Non-deleted messages of the chat in chronological order, for a
    /// participant.
    pub fn list_messages(&self, chat_id: Uuid, requester_id: Uuid) -> Result<Vec<MessageView>> {
        require_live_chat(&self.db, chat_id, requester_id)?;

        self.db
            .list_messages(&chat_id.to_string())?
            .iter()
            .map(|row| message_view(&self.db, row))
            .collect()
    }

    /// Soft-delete a message. Only the original sender's own live message
    /// qualifies; anything else is a validation failure. Emits
    /// `message_deleted` then `chat_updated` after commit.
    pub fn soft_delete_message(
        &self,
        message_id: Uuid,
        chat_id: Uuid,
        requester_id: Uuid,
    ) -> Result<MessageView> {
        let chat = require_live_chat(&self.db, chat_id, requester_id)?;

        let deleted = self.db.soft_delete_message(
            &message_id.to_string(),
            &chat_id.to_string(),
            &requester_id.to_string(),
            &now_string(),
        )?;

        if !deleted {
            return Err(CoreError::validation("Message cannot be deleted."));
        }

        let row = self
            .db
            .get_message(&message_id.to_string())?
            .ok_or(CoreError::MessageNotFound)?;
        let view = message_view(&self.db, &row)?;

        self.events
            .publish(GatewayEvent::MessageDeleted { chat_id, message_id });
        self.events.publish(GatewayEvent::ChatUpdated {
            users: chat.participants,
        });

        Ok(view)
    }
}
