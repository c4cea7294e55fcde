use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use parlor_db::Database;
use parlor_db::models::ChatRow;
use parlor_types::events::GatewayEvent;
use parlor_types::models::{Chat, ChatSummary};

use crate::error::{CoreError, Result};
use crate::events::EventSink;
use crate::now_string;
use crate::views::{chat_model, load_chat, message_view, user_public};

/// Canonical storage order of an unordered participant pair. The partial
/// unique index on (user_lo, user_hi) depends on this being stable.
pub fn canonical_pair(a: Uuid, b: Uuid) -> (String, String) {
    if a < b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Chat lifecycle: creation with pair dedup, listing summaries, soft delete.
#[derive(Clone)]
pub struct ChatRegistry {
    db: Arc<Database>,
    events: Arc<dyn EventSink>,
}

impl ChatRegistry {
    pub fn new(db: Arc<Database>, events: Arc<dyn EventSink>) -> Self {
        Self { db, events }
    }

    /// The live chat between the two users, if any. Pure read.
    pub fn find_chat(&self, requester_id: Uuid, other_id: Uuid) -> Result<Option<Chat>> {
        let (lo, hi) = canonical_pair(requester_id, other_id);
        let row = self.db.find_active_chat(&lo, &hi)?;
        row.as_ref().map(chat_model).transpose()
    }

    /// Return the live chat for the pair, creating it if absent.
    ///
    /// The insert races against concurrent callers for the same pair; the
    /// storage layer's unique index decides the winner and the loser reads
    /// the winning row back. A conflict is never surfaced. Emits
    /// `chat_updated` only when a row was actually created, after commit.
    pub fn get_or_create_chat(
        &self,
        requester_id: Uuid,
        other_id: Uuid,
    ) -> Result<(ChatSummary, bool)> {
        if requester_id == other_id {
            return Err(CoreError::validation("Cannot open a chat with yourself."));
        }

        let (lo, hi) = canonical_pair(requester_id, other_id);
        let id = Uuid::new_v4().to_string();
        let (row, created) = self.db.get_or_create_chat(&id, &lo, &hi, &now_string())?;

        let summary = self.summarize(&row, requester_id)?;

        if created {
            self.events.publish(GatewayEvent::ChatUpdated {
                users: [requester_id, other_id],
            });
        }

        Ok((summary, created))
    }

    /// Live chats for a user, most recent activity first, each with the
    /// other participant, unseen count, and last message. Unseen counts are
    /// fetched in one batched query.
    pub fn list_chats(&self, user_id: Uuid) -> Result<Vec<ChatSummary>> {
        let rows = self.db.list_active_chats(&user_id.to_string())?;

        let chat_ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let unseen: HashMap<String, u64> = self
            .db
            .unseen_counts(&chat_ids, &user_id.to_string())?
            .into_iter()
            .collect();

        rows.iter()
            .map(|row| {
                let count = unseen.get(&row.id).copied().unwrap_or(0);
                self.summarize_with_count(row, user_id, count)
            })
            .collect()
    }

    /// The live chat by id, for a participant. Non-participants get
    /// ChatNotFound.
    pub fn get_chat(&self, chat_id: Uuid, requester_id: Uuid) -> Result<Chat> {
        crate::views::require_live_chat(&self.db, chat_id, requester_id)
    }

    /// Soft-delete a chat on behalf of a participant. Idempotent: returns
    /// false when the chat was already deleted. Emits `chat_deleted` only
    /// when this call actually marked the row.
    pub fn soft_delete_chat(&self, chat_id: Uuid, requester_id: Uuid) -> Result<bool> {
        let chat = load_chat(&self.db, chat_id, requester_id)?;

        let deleted = self
            .db
            .soft_delete_chat(&chat_id.to_string(), &now_string())?;

        if deleted {
            self.events.publish(GatewayEvent::ChatDeleted {
                chat_id,
                users: chat.participants,
            });
        }

        Ok(deleted)
    }

    /// Summary of one chat as seen by `viewer_id`.
    pub fn summarize(&self, row: &ChatRow, viewer_id: Uuid) -> Result<ChatSummary> {
        let count = self.db.unseen_count(&row.id, &viewer_id.to_string())?;
        self.summarize_with_count(row, viewer_id, count)
    }

    fn summarize_with_count(
        &self,
        row: &ChatRow,
        viewer_id: Uuid,
        unseen_count: u64,
    ) -> Result<ChatSummary> {
        let chat = chat_model(row)?;
        let other_id = chat.other_participant(viewer_id);

        let other_row = self
            .db
            .get_user_by_id(&other_id.to_string())?
            .ok_or(CoreError::UserNotFound)?;

        let last_message = self
            .db
            .last_message(&row.id)?
            .map(|m| message_view(&self.db, &m))
            .transpose()?;

        Ok(ChatSummary {
            id: chat.id,
            user: user_public(other_row)?,
            unseen_count,
            last_message,
            last_activity_at: chat.last_activity_at,
            created_at: chat.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordingSink;
    use crate::testutil::{register_user, test_db};

    fn registry(db: &Arc<Database>) -> (ChatRegistry, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        (ChatRegistry::new(db.clone(), sink.clone()), sink)
    }

    #[test]
    fn creating_twice_in_either_order_returns_same_chat() {
        let db = test_db();
        let alice = register_user(&db, "alice@example.com");
        let bruno = register_user(&db, "bruno@example.com");
        let (registry, sink) = registry(&db);

        let (first, created) = registry.get_or_create_chat(alice, bruno).unwrap();
        assert!(created);

        let (second, created) = registry.get_or_create_chat(bruno, alice).unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);

        // Only the creating call announced the chat
        let events = sink.take();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], GatewayEvent::ChatUpdated { .. }));
    }

    #[test]
    fn self_chat_is_rejected() {
        let db = test_db();
        let alice = register_user(&db, "alice@example.com");
        let (registry, _) = registry(&db);

        let result = registry.get_or_create_chat(alice, alice);
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[test]
    fn fresh_chat_summary_has_no_unseen_and_no_last_message() {
        let db = test_db();
        let alice = register_user(&db, "alice@example.com");
        let bruno = register_user(&db, "bruno@example.com");
        let (registry, _) = registry(&db);

        let (summary, _) = registry.get_or_create_chat(alice, bruno).unwrap();

        assert_eq!(summary.user.id, bruno);
        assert_eq!(summary.unseen_count, 0);
        assert!(summary.last_message.is_none());
    }

    #[test]
    fn find_chat_searches_both_orderings() {
        let db = test_db();
        let alice = register_user(&db, "alice@example.com");
        let bruno = register_user(&db, "bruno@example.com");
        let (registry, _) = registry(&db);

        assert!(registry.find_chat(alice, bruno).unwrap().is_none());

        registry.get_or_create_chat(alice, bruno).unwrap();

        let found = registry.find_chat(bruno, alice).unwrap().unwrap();
        assert!(found.has_participant(alice));
        assert!(found.has_participant(bruno));
    }

    #[test]
    fn delete_requires_participant_and_reports_not_found() {
        let db = test_db();
        let alice = register_user(&db, "alice@example.com");
        let bruno = register_user(&db, "bruno@example.com");
        let carla = register_user(&db, "carla@example.com");
        let (registry, _) = registry(&db);

        let (chat, _) = registry.get_or_create_chat(alice, bruno).unwrap();

        // Outsiders see NotFound, not Forbidden
        let result = registry.soft_delete_chat(chat.id, carla);
        assert!(matches!(result, Err(CoreError::ChatNotFound)));
    }

    #[test]
    fn delete_is_idempotent_and_emits_once() {
        let db = test_db();
        let alice = register_user(&db, "alice@example.com");
        let bruno = register_user(&db, "bruno@example.com");
        let (registry, sink) = registry(&db);

        let (chat, _) = registry.get_or_create_chat(alice, bruno).unwrap();
        sink.take();

        assert!(registry.soft_delete_chat(chat.id, bruno).unwrap());
        assert!(!registry.soft_delete_chat(chat.id, bruno).unwrap());

        let events = sink.take();
        assert_eq!(events.len(), 1);
        match &events[0] {
            GatewayEvent::ChatDeleted { chat_id, users } => {
                assert_eq!(*chat_id, chat.id);
                assert!(users.contains(&alice) && users.contains(&bruno));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn summary_tracks_unseen_count_and_last_message_through_a_conversation() {
        use crate::attachments::AttachmentLinker;
        use crate::attachments::tests::CountingStore;
        use crate::messages::MessageStore;
        use crate::reads::ReadTracker;
        use crate::NullSink;

        let db = test_db();
        let alice = register_user(&db, "alice@example.com");
        let bruno = register_user(&db, "bruno@example.com");
        let (registry, _) = registry(&db);
        let store = MessageStore::new(
            db.clone(),
            AttachmentLinker::new(Arc::new(CountingStore::default())),
            Arc::new(NullSink),
        );
        let tracker = ReadTracker::new(db.clone(), Arc::new(NullSink));

        let (chat, _) = registry.get_or_create_chat(alice, bruno).unwrap();

        // Bruno writes; Alice's listing shows one unseen and the message
        store
            .append_message(chat.id, bruno, Some("hi".into()), None)
            .unwrap();
        let listing = registry.list_chats(alice).unwrap();
        assert_eq!(listing[0].unseen_count, 1);
        assert_eq!(
            listing[0].last_message.as_ref().unwrap().body.as_deref(),
            Some("hi")
        );

        // Alice views the chat; her unseen count drops to zero
        tracker.mark_read(chat.id, alice).unwrap();
        let listing = registry.list_chats(alice).unwrap();
        assert_eq!(listing[0].unseen_count, 0);
        assert!(listing[0].last_message.as_ref().unwrap().read_at.is_some());
    }

    #[test]
    fn deleted_chat_no_longer_listed_for_either_user() {
        let db = test_db();
        let alice = register_user(&db, "alice@example.com");
        let bruno = register_user(&db, "bruno@example.com");
        let (registry, _) = registry(&db);

        let (chat, _) = registry.get_or_create_chat(alice, bruno).unwrap();
        registry.soft_delete_chat(chat.id, alice).unwrap();

        assert!(registry.list_chats(alice).unwrap().is_empty());
        assert!(registry.list_chats(bruno).unwrap().is_empty());
    }
}
