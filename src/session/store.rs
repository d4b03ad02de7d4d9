//! The authoritative in-memory session state.
//!
//! Every mutation settles the in-memory list first, repairs the current
//! session pointer and then mirrors the whole list to the persistence
//! adapter. No operation fails for a missing id or an empty list: they
//! fall back to a no-op or to a corrective default instead.
use std::sync::{Arc, RwLock};

use super::models::{DocumentDescriptor, Message, MessagePatch, Session, new_id};
use super::persist::SessionPersistence;

pub type SharedSessionStore = Arc<RwLock<SessionStore>>;

pub struct SessionStore {
    sessions: Vec<Session>,
    current_session_id: String,
    persistence: Box<dyn SessionPersistence>,
}

impl SessionStore {
    /// Loads saved sessions, bootstrapping a fresh one when nothing
    /// usable was stored.
    pub fn initialize(persistence: Box<dyn SessionPersistence>) -> Self {
        let mut sessions = persistence.load();
        let loaded = !sessions.is_empty();
        if !loaded {
            tracing::debug!("No saved sessions, creating a new one");
            sessions.push(Session::bootstrap());
        }
        let current_session_id = sessions[0].id.clone();

        let store = Self {
            sessions,
            current_session_id,
            persistence,
        };
        if !loaded {
            store.persist();
        }
        store
    }

    pub fn into_shared(self) -> SharedSessionStore {
        Arc::new(RwLock::new(self))
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == session_id)
    }

    pub fn current_session_id(&self) -> &str {
        &self.current_session_id
    }

    pub fn current_session(&self) -> &Session {
        // The pointer is repaired after every structural change and the
        // list is never empty
        self.session(&self.current_session_id)
            .unwrap_or(&self.sessions[0])
    }

    /// Appends to the current session. Returns the message id, which is
    /// generated when the message has none.
    pub fn add_message(&mut self, message: Message) -> String {
        let session_id = self.current_session_id.clone();
        self.add_message_to(&session_id, message)
            .unwrap_or_default()
    }

    /// Appends to a specific session, returning `None` if it no longer
    /// exists.
    pub fn add_message_to(&mut self, session_id: &str, mut message: Message) -> Option<String> {
        let session = self.session_mut(session_id)?;
        if message.id.is_empty() || session.message(&message.id).is_some() {
            if !message.id.is_empty() {
                tracing::warn!(
                    "Message id {} already used in session {}, assigning a new one",
                    message.id,
                    session_id
                );
            }
            message.id = new_id();
        }
        let id = message.id.clone();
        session.messages.push(message);
        self.persist();
        Some(id)
    }

    /// Merges `patch` into the matching message of the current session.
    /// Returns false when no message matched.
    pub fn update_message(&mut self, message_id: &str, patch: &MessagePatch) -> bool {
        let session_id = self.current_session_id.clone();
        self.update_message_in(&session_id, message_id, patch)
    }

    pub fn update_message_in(
        &mut self,
        session_id: &str,
        message_id: &str,
        patch: &MessagePatch,
    ) -> bool {
        let Some(msg) = self
            .session_mut(session_id)
            .and_then(|s| s.messages.iter_mut().find(|m| m.id == message_id))
        else {
            return false;
        };
        msg.apply(patch);
        self.persist();
        true
    }

    /// Truncates the current session so it ends at (and includes) the
    /// given message. An unknown id leaves the transcript untouched.
    pub fn remove_messages_after(&mut self, message_id: &str) -> bool {
        let session_id = self.current_session_id.clone();
        let Some(session) = self.session_mut(&session_id) else {
            return false;
        };
        let Some(idx) = session.position_of(message_id) else {
            tracing::debug!("Message {} not found, nothing truncated", message_id);
            return false;
        };
        session.messages.truncate(idx + 1);
        self.persist();
        true
    }

    pub fn switch_session(&mut self, session_id: &str) -> bool {
        let found = self.session(session_id).is_some();
        if found {
            self.current_session_id = session_id.to_string();
        } else {
            tracing::warn!("Can't switch to unknown session {}", session_id);
        }
        self.repair_current();
        self.persist();
        found
    }

    /// Prepends a fresh session and makes it current. Returns its id.
    pub fn new_session(&mut self) -> String {
        let session = Session::bootstrap();
        let id = session.id.clone();
        self.sessions.insert(0, session);
        self.current_session_id = id.clone();
        self.persist();
        id
    }

    /// Removes a session. The list is never left empty: deleting the
    /// last session replaces it with a fresh one.
    pub fn delete_session(&mut self, session_id: &str) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != session_id);
        let removed = self.sessions.len() != before;
        if !removed {
            tracing::warn!("Can't delete unknown session {}", session_id);
            return false;
        }

        if self.sessions.is_empty() {
            self.sessions.push(Session::bootstrap());
        }
        self.repair_current();
        self.persist();
        true
    }

    /// Sets the current session's document, replacing any previous one.
    pub fn attach_document(&mut self, document: DocumentDescriptor) {
        let session_id = self.current_session_id.clone();
        self.attach_document_to(&session_id, document);
    }

    pub fn attach_document_to(&mut self, session_id: &str, document: DocumentDescriptor) -> bool {
        let Some(session) = self.session_mut(session_id) else {
            return false;
        };
        session.document = Some(document);
        self.persist();
        true
    }

    /// Clears the current session's document, returning what was
    /// attached.
    pub fn detach_document(&mut self) -> Option<DocumentDescriptor> {
        let session_id = self.current_session_id.clone();
        self.detach_document_from(&session_id)
    }

    pub fn detach_document_from(&mut self, session_id: &str) -> Option<DocumentDescriptor> {
        let previous = self.session_mut(session_id)?.document.take();
        if previous.is_some() {
            self.persist();
        }
        previous
    }

    fn session_mut(&mut self, session_id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == session_id)
    }

    fn repair_current(&mut self) {
        if self.session(&self.current_session_id).is_none() {
            if let Some(first) = self.sessions.first() {
                tracing::debug!(
                    "Current session {} is gone, switching to {}",
                    self.current_session_id,
                    first.id
                );
                self.current_session_id = first.id.clone();
            }
        }
    }

    fn persist(&self) {
        self.persistence.save(&self.sessions);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::models::Sender;
    use crate::session::persist::MemorySessionPersistence;

    fn store() -> SessionStore {
        SessionStore::initialize(Box::new(MemorySessionPersistence::new()))
    }

    fn texts(store: &SessionStore) -> Vec<String> {
        store
            .current_session()
            .messages
            .iter()
            .map(|m| m.text.clone())
            .collect()
    }

    #[test]
    fn it_generates_ids_for_messages_without_one() {
        let mut store = store();
        let id = store.add_message(Message::user("hello"));
        assert!(!id.is_empty());
        assert_eq!(store.current_session().messages.last().unwrap().id, id);
    }

    #[test]
    fn it_replaces_colliding_message_ids() {
        let mut store = store();
        let first = store.add_message(Message::with_id("1", Sender::User, "a"));
        let second = store.add_message(Message::with_id("1", Sender::User, "b"));
        assert_eq!(first, "1");
        assert_ne!(second, "1");
    }

    #[test]
    fn it_ignores_updates_for_unknown_ids() {
        let mut store = store();
        let before = store.current_session().clone();
        assert!(!store.update_message("missing", &MessagePatch::text("x")));
        assert_eq!(store.current_session(), &before);
    }

    #[test]
    fn it_leaves_transcript_alone_when_truncating_at_unknown_id() {
        let mut store = store();
        store.add_message(Message::user("one"));
        store.add_message(Message::user("two"));
        assert!(!store.remove_messages_after("missing"));
        assert_eq!(texts(&store).len(), 3);
    }

    #[test]
    fn it_prepends_new_sessions_and_makes_them_current() {
        let mut store = store();
        let first = store.current_session_id().to_string();
        let second = store.new_session();
        assert_ne!(first, second);
        assert_eq!(store.sessions()[0].id, second);
        assert_eq!(store.sessions()[1].id, first);
        assert_eq!(store.current_session_id(), second);
    }

    #[test]
    fn it_keeps_current_when_deleting_another_session() {
        let mut store = store();
        let old = store.current_session_id().to_string();
        let new = store.new_session();
        assert!(store.delete_session(&old));
        assert_eq!(store.current_session_id(), new);
        assert_eq!(store.sessions().len(), 1);
    }

    #[test]
    fn it_promotes_first_remaining_session_on_delete() {
        let mut store = store();
        let a = store.current_session_id().to_string();
        let b = store.new_session();
        let c = store.new_session();
        store.switch_session(&b);

        assert!(store.delete_session(&b));
        assert_eq!(store.current_session_id(), c);
        assert!(store.session(&a).is_some());
    }

    #[test]
    fn it_detaches_documents_idempotently() {
        let mut store = store();
        assert!(store.detach_document().is_none());
        store.attach_document(DocumentDescriptor {
            document_session_id: "doc".to_string(),
            filename: "a.pdf".to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
            num_chunks: 3,
        });
        assert_eq!(
            store.detach_document().map(|d| d.document_session_id),
            Some("doc".to_string())
        );
        assert!(store.detach_document().is_none());
        assert!(store.current_session().document.is_none());
    }

    #[test]
    fn it_drops_writes_to_deleted_sessions() {
        let mut store = store();
        let old = store.current_session_id().to_string();
        store.new_session();
        store.delete_session(&old);
        assert!(store.add_message_to(&old, Message::bot("late")).is_none());
        assert!(!store.update_message_in(&old, "x", &MessagePatch::text("late")));
    }
}
