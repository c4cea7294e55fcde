use std::sync::Arc;

use uuid::Uuid;

use parlor_db::Database;
use parlor_types::events::GatewayEvent;

use crate::error::Result;
use crate::events::EventSink;
use crate::now_string;
use crate::views::require_live_chat;

/// Read receipts: marking messages read and counting unseen ones.
#[derive(Clone)]
pub struct ReadTracker {
    db: Arc<Database>,
    events: Arc<dyn EventSink>,
}

impl ReadTracker {
    pub fn new(db: Arc<Database>, events: Arc<dyn EventSink>) -> Self {
        Self { db, events }
    }

    /// Mark every unread message in the chat as read on behalf of a
    /// participant, skipping their own messages. Idempotent: a repeat call
    /// marks zero and is not an error. Emits `messages_read` carrying the
    /// reader as `excluded_user_id` so subscribers can clear badges without
    /// re-querying.
    pub fn mark_read(&self, chat_id: Uuid, reader_id: Uuid) -> Result<usize> {
        require_live_chat(&self.db, chat_id, reader_id)?;

        let marked = self.db.mark_messages_read(
            &chat_id.to_string(),
            &reader_id.to_string(),
            &now_string(),
        )?;

        self.events.publish(GatewayEvent::MessagesRead {
            chat_id,
            excluded_user_id: reader_id,
        });

        Ok(marked)
    }

    /// Unread, non-deleted messages in the chat not sent by the viewer.
    pub fn unseen_count(&self, chat_id: Uuid, viewer_id: Uuid) -> Result<u64> {
        Ok(self
            .db
            .unseen_count(&chat_id.to_string(), &viewer_id.to_string())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachments::AttachmentLinker;
    use crate::attachments::tests::CountingStore;
    use crate::chats::ChatRegistry;
    use crate::messages::MessageStore;
    use crate::{CoreError, NullSink, RecordingSink};
    use crate::testutil::{register_user, test_db};

    struct Fixture {
        tracker: ReadTracker,
        store: MessageStore,
        sink: Arc<RecordingSink>,
        chat_id: Uuid,
        alice: Uuid,
        bruno: Uuid,
    }

    fn fixture() -> Fixture {
        let db = test_db();
        let alice = register_user(&db, "alice@example.com");
        let bruno = register_user(&db, "bruno@example.com");

        let registry = ChatRegistry::new(db.clone(), Arc::new(NullSink));
        let (chat, _) = registry.get_or_create_chat(alice, bruno).unwrap();

        let sink = Arc::new(RecordingSink::new());
        let store = MessageStore::new(
            db.clone(),
            AttachmentLinker::new(Arc::new(CountingStore::default())),
            Arc::new(NullSink),
        );
        let tracker = ReadTracker::new(db, sink.clone());

        Fixture {
            tracker,
            store,
            sink,
            chat_id: chat.id,
            alice,
            bruno,
        }
    }

    #[test]
    fn mark_read_is_idempotent_and_skips_own_messages() {
        let f = fixture();

        f.store
            .append_message(f.chat_id, f.bruno, Some("one".into()), None)
            .unwrap();
        f.store
            .append_message(f.chat_id, f.bruno, Some("two".into()), None)
            .unwrap();
        f.store
            .append_message(f.chat_id, f.alice, Some("mine".into()), None)
            .unwrap();

        assert_eq!(f.tracker.unseen_count(f.chat_id, f.alice).unwrap(), 2);

        assert_eq!(f.tracker.mark_read(f.chat_id, f.alice).unwrap(), 2);
        assert_eq!(f.tracker.mark_read(f.chat_id, f.alice).unwrap(), 0);

        assert_eq!(f.tracker.unseen_count(f.chat_id, f.alice).unwrap(), 0);
        // Alice's own message is still unseen for Bruno
        assert_eq!(f.tracker.unseen_count(f.chat_id, f.bruno).unwrap(), 1);
    }

    #[test]
    fn unseen_count_never_counts_own_messages() {
        let f = fixture();

        for i in 0..5 {
            f.store
                .append_message(f.chat_id, f.alice, Some(format!("msg {}", i)), None)
                .unwrap();
        }

        assert_eq!(f.tracker.unseen_count(f.chat_id, f.alice).unwrap(), 0);
        assert_eq!(f.tracker.unseen_count(f.chat_id, f.bruno).unwrap(), 5);
    }

    #[test]
    fn mark_read_announces_the_reader_as_excluded() {
        let f = fixture();

        f.store
            .append_message(f.chat_id, f.bruno, Some("hi".into()), None)
            .unwrap();
        f.tracker.mark_read(f.chat_id, f.alice).unwrap();

        let events = f.sink.take();
        assert_eq!(events.len(), 1);
        match &events[0] {
            GatewayEvent::MessagesRead {
                chat_id,
                excluded_user_id,
            } => {
                assert_eq!(*chat_id, f.chat_id);
                assert_eq!(*excluded_user_id, f.alice);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn marking_messages_read_sets_read_at_for_the_peer_view() {
        let f = fixture();

        f.store
            .append_message(f.chat_id, f.bruno, Some("hi".into()), None)
            .unwrap();
        f.tracker.mark_read(f.chat_id, f.alice).unwrap();

        let messages = f.store.list_messages(f.chat_id, f.alice).unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].read_at.is_some());
    }

    #[test]
    fn non_participant_cannot_mark_read() {
        let f = fixture();

        let result = f.tracker.mark_read(f.chat_id, Uuid::new_v4());
        assert!(matches!(result, Err(CoreError::ChatNotFound)));
    }
}
