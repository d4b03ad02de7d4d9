//! Integration tests for the session store and its persistence

mod test_utils;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use ragchat::session::{
        DecodedSessions, DocumentDescriptor, MemorySessionPersistence, Message, MessagePatch,
        Sender, SessionPersistence, SessionStore, decode_sessions,
    };

    use crate::test_utils::test_store;

    fn assert_pointer_valid(store: &SessionStore) {
        assert!(!store.sessions().is_empty());
        assert!(
            store
                .sessions()
                .iter()
                .any(|s| s.id == store.current_session_id())
        );
    }

    fn document(id: &str, filename: &str) -> DocumentDescriptor {
        DocumentDescriptor {
            document_session_id: id.to_string(),
            filename: filename.to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
            num_chunks: 4,
        }
    }

    fn store_from_blob(blob: serde_json::Value) -> (SessionStore, MemorySessionPersistence) {
        let persistence = MemorySessionPersistence::with_blob(&blob.to_string());
        let store = SessionStore::initialize(Box::new(persistence.clone()));
        (store, persistence)
    }

    /// Tests a first run creates exactly one session with a welcome message
    #[test]
    fn it_bootstraps_on_first_load() {
        let (store, persistence) = test_store();

        assert_eq!(store.sessions().len(), 1);
        assert_eq!(store.current_session_id(), store.sessions()[0].id);
        let messages = &store.current_session().messages;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, Sender::Bot);

        // The bootstrap session is written out right away
        assert_eq!(persistence.load(), store.sessions());
    }

    /// Tests the session list is never empty and the pointer always valid
    #[test]
    fn it_keeps_pointer_valid_across_creates_and_deletes() {
        let (mut store, _) = test_store();

        for step in 0..60 {
            match step % 5 {
                0 | 2 => {
                    store.new_session();
                }
                1 => {
                    let id = store.current_session_id().to_string();
                    store.delete_session(&id);
                }
                3 => {
                    let last = store.sessions().last().map(|s| s.id.clone()).unwrap();
                    store.delete_session(&last);
                }
                _ => {
                    let ids: Vec<String> = store.sessions().iter().map(|s| s.id.clone()).collect();
                    for id in ids {
                        store.delete_session(&id);
                        assert_pointer_valid(&store);
                    }
                }
            }
            assert_pointer_valid(&store);
        }
    }

    /// Tests deleting the only session synthesizes a fresh one
    #[test]
    fn it_replaces_the_last_deleted_session() {
        let (mut store, _) = test_store();
        let only = store.current_session_id().to_string();
        store.add_message(Message::user("hello"));

        assert!(store.delete_session(&only));

        assert_eq!(store.sessions().len(), 1);
        assert_ne!(store.current_session_id(), only);
        let messages = &store.current_session().messages;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, Sender::Bot);
    }

    /// Tests the transcript survives a save and a reload exactly
    #[test]
    fn it_round_trips_messages_through_persistence() {
        let (mut store, persistence) = test_store();
        store.add_message(Message::user("What's in the report?"));
        let err_id = store.add_message(Message::bot("..."));
        store.update_message(&err_id, &MessagePatch::error("502 Bad Gateway"));
        store.attach_document(document("doc-1", "report.pdf"));
        store.new_session();
        store.add_message(Message::user("second session"));

        let reloaded = SessionStore::initialize(Box::new(persistence.clone()));
        assert_eq!(reloaded.sessions(), store.sessions());
    }

    /// Tests applying the same patch twice equals applying it once
    #[test]
    fn it_applies_updates_idempotently() {
        let (mut store, _) = test_store();
        let id = store.add_message(Message::user("draft"));
        let patch = MessagePatch {
            text: Some("final".to_string()),
            is_error: Some(true),
            error_message: Some(Some("failed".to_string())),
        };

        assert!(store.update_message(&id, &patch));
        let once = store.current_session().clone();
        assert!(store.update_message(&id, &patch));
        assert_eq!(store.current_session(), &once);
    }

    /// Tests truncation keeps the target message and drops the rest
    #[test]
    fn it_truncates_after_a_message() {
        let (mut store, _) = store_from_blob(json!([{
            "id": "s1",
            "name": "Session",
            "messages": [
                {"id": "m1", "sender": "user", "text": "one"},
                {"id": "m2", "sender": "bot", "text": "two"},
                {"id": "m3", "sender": "user", "text": "three"}
            ]
        }]));

        assert!(store.remove_messages_after("m2"));

        let ids: Vec<&str> = store
            .current_session()
            .messages
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    /// Tests attaching twice keeps only the latest document
    #[test]
    fn it_replaces_attached_documents() {
        let (mut store, persistence) = test_store();
        store.attach_document(document("doc-1", "first.pdf"));
        store.attach_document(document("doc-2", "second.pdf"));

        assert_eq!(
            store.current_session().document,
            Some(document("doc-2", "second.pdf"))
        );
        let blob = persistence.blob().unwrap();
        assert!(blob.contains("doc-2"));
        assert!(!blob.contains("doc-1"));
    }

    /// Tests appending keeps insertion order and caller ids
    #[test]
    fn it_appends_messages_in_order() {
        let (mut store, _) = store_from_blob(json!([{
            "id": "s1",
            "name": "Session",
            "messages": [{"id": "1", "sender": "bot", "text": "hi"}]
        }]));

        let id = store.add_message(Message::with_id("2", Sender::User, "hello"));

        assert_eq!(id, "2");
        assert_eq!(
            store.current_session().messages,
            vec![
                Message::with_id("1", Sender::Bot, "hi"),
                Message::with_id("2", Sender::User, "hello"),
            ]
        );
    }

    /// Tests a corrupted blob is treated as no saved state
    #[test]
    fn it_recovers_from_corrupted_storage() {
        let persistence = MemorySessionPersistence::with_blob("{not json");
        assert!(matches!(
            decode_sessions("{not json"),
            DecodedSessions::Invalid(_)
        ));
        assert!(persistence.load().is_empty());

        let store = SessionStore::initialize(Box::new(persistence.clone()));
        assert_eq!(store.sessions().len(), 1);
        assert_eq!(store.current_session().messages.len(), 1);
        assert_eq!(store.current_session().messages[0].sender, Sender::Bot);

        // The corrupt blob is replaced by the fresh session
        assert_eq!(persistence.load(), store.sessions());
    }

    /// Tests a repeated message id in one session doesn't cost the others
    #[test]
    fn it_keeps_every_session_when_message_ids_repeat() {
        let (store, persistence) = store_from_blob(json!([
            {
                "id": "s1",
                "name": "Kept",
                "messages": [
                    {"id": "1", "sender": "user", "text": "important"},
                    {"id": "2", "sender": "bot", "text": "noted"}
                ]
            },
            {
                "id": "s2",
                "name": "Same millisecond",
                "messages": [
                    {"id": "1700000000000", "sender": "user", "text": "first"},
                    {"id": "1700000000000", "sender": "bot", "text": "second"}
                ]
            }
        ]));

        assert_eq!(store.sessions().len(), 2);
        assert_eq!(store.sessions()[0].messages[0].text, "important");
        let repaired = &store.session("s2").unwrap().messages;
        assert_eq!(repaired.len(), 2);
        assert_ne!(repaired[0].id, repaired[1].id);
        assert_eq!(repaired[1].text, "second");

        // Loading alone never overwrites the saved sessions
        assert!(persistence.blob().unwrap().contains("important"));
    }

    /// Tests switching to an unknown session keeps the current one
    #[test]
    fn it_ignores_switches_to_unknown_sessions() {
        let (mut store, _) = store_from_blob(json!([
            {"id": "A", "name": "A", "messages": []},
            {"id": "B", "name": "B", "messages": []}
        ]));
        assert_eq!(store.current_session_id(), "A");

        assert!(!store.switch_session("nonexistent"));
        assert_eq!(store.current_session_id(), "A");

        assert!(store.switch_session("B"));
        assert_eq!(store.current_session_id(), "B");
    }

    /// Tests every mutation is mirrored to persistence
    #[test]
    fn it_persists_after_each_mutation() {
        let (mut store, persistence) = test_store();

        let id = store.add_message(Message::user("hello"));
        assert!(persistence.blob().unwrap().contains("hello"));

        store.update_message(&id, &MessagePatch::text("hello again"));
        assert!(persistence.blob().unwrap().contains("hello again"));

        let new_id = store.new_session();
        assert!(persistence.blob().unwrap().contains(&new_id));

        store.delete_session(&new_id);
        assert!(!persistence.blob().unwrap().contains(&new_id));
    }
}
