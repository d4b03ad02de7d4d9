//! Durable mirror of the session list.
//!
//! The whole list is written as one JSON blob. Anything that fails to
//! decode into a well-formed list is treated the same as having no
//! saved state.
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use super::models::{Session, new_id};

pub trait SessionPersistence: Send + Sync {
    /// Returns the saved sessions, or an empty list when nothing usable
    /// is stored.
    fn load(&self) -> Vec<Session>;

    /// Best-effort write of the full list. Empty lists are not written.
    fn save(&self, sessions: &[Session]);
}

#[derive(Debug, PartialEq)]
pub enum DecodedSessions {
    Valid(Vec<Session>),
    Invalid(String),
}

/// Decodes a session blob and checks the invariants serde can't.
/// Session ids must be present and unique or the blob is rejected.
/// Empty or repeated message ids are given fresh ones instead.
pub fn decode_sessions(raw: &str) -> DecodedSessions {
    let mut sessions: Vec<Session> = match serde_json::from_str(raw) {
        Ok(sessions) => sessions,
        Err(e) => return DecodedSessions::Invalid(format!("malformed session blob: {}", e)),
    };

    let mut session_ids = HashSet::new();
    for session in &sessions {
        if session.id.is_empty() {
            return DecodedSessions::Invalid("session with empty id".to_string());
        }
        if !session_ids.insert(session.id.as_str()) {
            return DecodedSessions::Invalid(format!("duplicate session id {}", session.id));
        }
    }

    for session in &mut sessions {
        repair_message_ids(session);
    }
    DecodedSessions::Valid(sessions)
}

fn repair_message_ids(session: &mut Session) {
    let mut seen = HashSet::new();
    for msg in &mut session.messages {
        if msg.id.is_empty() || seen.contains(&msg.id) {
            let fresh = new_id();
            tracing::warn!(
                "Message id {:?} in session {} is empty or repeated, using {}",
                msg.id,
                session.id,
                fresh
            );
            msg.id = fresh;
        }
        seen.insert(msg.id.clone());
    }
}

fn decode_or_empty(raw: &str, source: &str) -> Vec<Session> {
    match decode_sessions(raw) {
        DecodedSessions::Valid(sessions) => sessions,
        DecodedSessions::Invalid(reason) => {
            tracing::warn!("Discarding saved sessions from {}: {}", source, reason);
            Vec::new()
        }
    }
}

/// Stores the blob in a single JSON file.
pub struct FileSessionPersistence {
    path: PathBuf,
}

impl FileSessionPersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }

        // Write to a sibling file first so a crash mid-write never
        // leaves a truncated blob behind
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, bytes)?;
        match fs::rename(&tmp_path, &self.path) {
            Ok(()) => Ok(()),
            Err(rename_err) => {
                if self.path.exists() {
                    fs::remove_file(&self.path)?;
                    fs::rename(&tmp_path, &self.path)
                } else {
                    Err(rename_err)
                }
            }
        }
    }
}

impl SessionPersistence for FileSessionPersistence {
    fn load(&self) -> Vec<Session> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => decode_or_empty(&raw, &self.path.display().to_string()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    fn save(&self, sessions: &[Session]) {
        if sessions.is_empty() {
            return;
        }
        let bytes = match serde_json::to_vec_pretty(sessions) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("Failed to serialize sessions: {}", e);
                return;
            }
        };
        if let Err(e) = self.write(&bytes) {
            tracing::error!("Failed to write {}: {}", self.path.display(), e);
        }
    }
}

/// Keeps the blob in memory. Cloning shares the same slot, which lets
/// a second store reload what the first one saved.
#[derive(Clone, Default)]
pub struct MemorySessionPersistence {
    blob: Arc<Mutex<Option<String>>>,
}

impl MemorySessionPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(raw: &str) -> Self {
        Self {
            blob: Arc::new(Mutex::new(Some(raw.to_string()))),
        }
    }

    /// The last saved blob, if any
    pub fn blob(&self) -> Option<String> {
        self.blob
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SessionPersistence for MemorySessionPersistence {
    fn load(&self) -> Vec<Session> {
        match self.blob() {
            Some(raw) => decode_or_empty(&raw, "memory"),
            None => Vec::new(),
        }
    }

    fn save(&self, sessions: &[Session]) {
        if sessions.is_empty() {
            return;
        }
        match serde_json::to_string(sessions) {
            Ok(raw) => {
                *self.blob.lock().unwrap_or_else(PoisonError::into_inner) = Some(raw);
            }
            Err(e) => tracing::error!("Failed to serialize sessions: {}", e),
        }
    }
}
