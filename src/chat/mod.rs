//! Drives a conversation: ties user intents to the session store, the
//! backend gateway and the stored credential.
//!
//! Replies are written to the session that was current when the request
//! was issued, even if the user has switched away in the meantime. If
//! that session was deleted, the reply is dropped.
use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Result, anyhow};
use tokio::sync::watch;

use crate::credential::{CredentialStore, KeyStatus};
use crate::gateway::{
    BackendGateway, ChatRequest, DocumentUpload, FileChatRequest, GatewayError, HealthStatus,
};
use crate::session::{
    DocumentDescriptor, Message, MessagePatch, Sender, SessionStore, SharedSessionStore,
};

pub const ERROR_REPLY: &str = "Sorry, I couldn't get a response. Please try again.";
pub const UPLOAD_ERROR_REPLY: &str = "Sorry, the document couldn't be processed.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitBlocked {
    BackendUnavailable,
    MissingCredential,
    MalformedCredential,
}

impl fmt::Display for SubmitBlocked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SubmitBlocked::BackendUnavailable => "The backend is unavailable.",
            SubmitBlocked::MissingCredential => "No API key is set. Use /key <key> to set one.",
            SubmitBlocked::MalformedCredential => "The API key should start with \"sk-\".",
        };
        write!(f, "{}", msg)
    }
}

impl std::error::Error for SubmitBlocked {}

#[derive(Clone, Debug)]
pub struct ChatSettings {
    pub model: String,
    pub system_prompt: String,
}

/// The bot message a request produced and the session it landed in.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    pub session_id: String,
    pub message: Message,
}

pub struct ChatController {
    store: SharedSessionStore,
    gateway: Arc<dyn BackendGateway>,
    credentials: Arc<CredentialStore>,
    health: watch::Receiver<HealthStatus>,
    settings: ChatSettings,
}

impl ChatController {
    pub fn new(
        store: SharedSessionStore,
        gateway: Arc<dyn BackendGateway>,
        credentials: Arc<CredentialStore>,
        health: watch::Receiver<HealthStatus>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            credentials,
            health,
            settings,
        }
    }

    pub fn store(&self) -> &SharedSessionStore {
        &self.store
    }

    /// Read access for rendering. Don't hold it across an await.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, SessionStore>> {
        self.store
            .read()
            .map_err(|_| anyhow!("Session store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, SessionStore>> {
        self.store
            .write()
            .map_err(|_| anyhow!("Session store lock poisoned"))
    }

    pub fn health(&self) -> HealthStatus {
        *self.health.borrow()
    }

    /// Submission needs a reachable backend and a well-formed key.
    pub fn can_submit(&self) -> Result<String, SubmitBlocked> {
        if self.health() != HealthStatus::Healthy {
            return Err(SubmitBlocked::BackendUnavailable);
        }
        match self.credentials.status() {
            KeyStatus::Missing => Err(SubmitBlocked::MissingCredential),
            KeyStatus::Malformed => Err(SubmitBlocked::MalformedCredential),
            KeyStatus::Valid => self
                .credentials
                .get()
                .ok_or(SubmitBlocked::MissingCredential),
        }
    }

    /// Sends a user message in the current session and records the reply.
    pub async fn submit(&self, text: &str) -> Result<Reply> {
        let api_key = self.can_submit()?;
        let (session_id, document) = {
            let mut store = self.write()?;
            store.add_message(Message::user(text));
            let session = store.current_session();
            (session.id.clone(), session.document.clone())
        };
        self.request_reply(&session_id, document, text, &api_key)
            .await
    }

    /// Replaces the text of a user message, drops everything after it
    /// and asks again. Returns `None` when `message_id` doesn't name a
    /// user message in the current session.
    pub async fn edit_and_regenerate(&self, message_id: &str, text: &str) -> Result<Option<Reply>> {
        let api_key = self.can_submit()?;
        let (session_id, document) = {
            let mut store = self.write()?;
            let is_user_message = store
                .current_session()
                .message(message_id)
                .is_some_and(|m| m.sender == Sender::User);
            if !is_user_message {
                return Ok(None);
            }
            store.update_message(message_id, &MessagePatch::text(text));
            store.remove_messages_after(message_id);
            let session = store.current_session();
            (session.id.clone(), session.document.clone())
        };
        let reply = self
            .request_reply(&session_id, document, text, &api_key)
            .await?;
        Ok(Some(reply))
    }

    async fn request_reply(
        &self,
        session_id: &str,
        document: Option<DocumentDescriptor>,
        text: &str,
        api_key: &str,
    ) -> Result<Reply> {
        let result = match document {
            Some(doc) => {
                tracing::debug!("Asking document {}", doc.document_session_id);
                self.gateway
                    .send_file_chat(&FileChatRequest {
                        session_id: doc.document_session_id,
                        question: text.to_string(),
                        api_key: api_key.to_string(),
                        model: self.settings.model.clone(),
                    })
                    .await
            }
            None => {
                self.gateway
                    .send_chat(&ChatRequest {
                        system_prompt: self.settings.system_prompt.clone(),
                        user_message: text.to_string(),
                        model: self.settings.model.clone(),
                        api_key: api_key.to_string(),
                    })
                    .await
            }
        };

        let message = match result {
            Ok(reply) => Message::bot(&reply),
            Err(e) => {
                tracing::error!("Chat request failed: {}", e);
                self.handle_rejected_credential(&e);
                Message::error(ERROR_REPLY, &e.detail())
            }
        };
        self.record_reply(session_id, message)
    }

    fn record_reply(&self, session_id: &str, mut message: Message) -> Result<Reply> {
        let mut store = self.write()?;
        match store.add_message_to(session_id, message.clone()) {
            Some(id) => {
                message.id = id;
            }
            None => {
                tracing::debug!("Session {} was deleted, dropping reply", session_id);
            }
        }
        Ok(Reply {
            session_id: session_id.to_string(),
            message,
        })
    }

    fn handle_rejected_credential(&self, err: &GatewayError) {
        if err.is_unauthorized() {
            tracing::warn!("Backend rejected the API key, clearing it");
            if let Err(e) = self.credentials.reject() {
                tracing::error!("Failed to clear API key: {}", e);
            }
        }
    }

    /// Uploads a document and attaches it to the current session. Any
    /// previously attached document is replaced on success and cleared
    /// on failure, and the backend is asked to forget it either way.
    pub async fn upload_document(&self, path: &Path) -> Result<Reply> {
        let api_key = self.can_submit()?;
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("Invalid file name: {}", path.display()))?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        let session_id = self.read()?.current_session_id().to_string();

        let result = self
            .gateway
            .upload_document(DocumentUpload { filename, bytes }, &api_key)
            .await;

        let (message, orphaned) = match result {
            Ok(doc) => {
                tracing::info!(
                    "Indexed {} as {} ({} chunks)",
                    doc.filename,
                    doc.document_session_id,
                    doc.num_chunks
                );
                let text = format!(
                    "\"{}\" is ready. Ask me anything about it ({} chunks, size {}, overlap {}).",
                    doc.filename, doc.num_chunks, doc.chunk_size, doc.chunk_overlap
                );
                (Message::bot(&text), self.attach_uploaded(&session_id, doc)?)
            }
            Err(e) => {
                tracing::error!("Upload failed: {}", e);
                self.handle_rejected_credential(&e);
                let detached = self.write()?.detach_document_from(&session_id);
                (Message::error(UPLOAD_ERROR_REPLY, &e.detail()), detached)
            }
        };
        if let Some(doc) = &orphaned {
            self.forget_document(doc).await;
        }
        self.record_reply(&session_id, message)
    }

    /// Attaches a freshly indexed document and returns whichever
    /// descriptor no session refers to anymore: the one it replaced, or
    /// the new one if the session is gone.
    fn attach_uploaded(
        &self,
        session_id: &str,
        doc: DocumentDescriptor,
    ) -> Result<Option<DocumentDescriptor>> {
        let mut store = self.write()?;
        let previous = store.session(session_id).and_then(|s| s.document.clone());
        if !store.attach_document_to(session_id, doc.clone()) {
            tracing::debug!("Session {} was deleted, releasing upload", session_id);
            return Ok(Some(doc));
        }
        Ok(previous.filter(|p| p.document_session_id != doc.document_session_id))
    }

    /// Detaches the current document and asks the backend to forget it.
    /// Local state is cleared whatever the backend says.
    pub async fn remove_document(&self) -> Result<Option<DocumentDescriptor>> {
        let removed = self.write()?.detach_document();
        if let Some(doc) = &removed {
            self.forget_document(doc).await;
        }
        Ok(removed)
    }

    async fn forget_document(&self, doc: &DocumentDescriptor) {
        if let Err(e) = self
            .gateway
            .remove_document(&doc.document_session_id)
            .await
        {
            tracing::warn!(
                "Failed to remove document {} from backend: {}",
                doc.document_session_id,
                e
            );
        }
    }

    pub fn new_session(&self) -> Result<String> {
        Ok(self.write()?.new_session())
    }

    pub fn switch_session(&self, session_id: &str) -> Result<bool> {
        Ok(self.write()?.switch_session(session_id))
    }

    /// Deletes a session and releases its document on the backend.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let document = {
            let mut store = self.write()?;
            let document = store.session(session_id).and_then(|s| s.document.clone());
            if !store.delete_session(session_id) {
                return Ok(false);
            }
            document
        };
        if let Some(doc) = &document {
            self.forget_document(doc).await;
        }
        Ok(true)
    }
}
