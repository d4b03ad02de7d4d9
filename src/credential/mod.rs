//! The provider API key, kept in its own file and announced to
//! interested views whenever it changes.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, PoisonError, RwLock};

use anyhow::{Result, anyhow};
use regex::Regex;
use tokio::sync::broadcast;

static API_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^sk-[A-Za-z0-9_\-]+$").expect("Invalid regex"));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyStatus {
    Missing,
    Malformed,
    Valid,
}

/// Checks a key against the provider's `sk-` prefix convention.
pub fn validate_api_key(key: Option<&str>) -> KeyStatus {
    match key.map(str::trim) {
        None | Some("") => KeyStatus::Missing,
        Some(key) if API_KEY_RE.is_match(key) => KeyStatus::Valid,
        Some(_) => KeyStatus::Malformed,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialEvent {
    Set,
    /// Removed by the user
    Cleared,
    /// Removed because the backend refused it
    Rejected,
}

pub struct CredentialStore {
    path: PathBuf,
    key: RwLock<Option<String>>,
    events: broadcast::Sender<CredentialEvent>,
}

impl CredentialStore {
    /// Opens the store backed by the file at `path`. A missing file
    /// means no key has been saved yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let key = match fs::read_to_string(&path) {
            Ok(raw) => Some(raw.trim().to_string()).filter(|k| !k.is_empty()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(anyhow!("Failed to read {}: {}", path.display(), e)),
        };
        let (events, _) = broadcast::channel(16);

        Ok(Self {
            path,
            key: RwLock::new(key),
            events,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Option<String> {
        self.key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> KeyStatus {
        validate_api_key(self.get().as_deref())
    }

    pub fn set(&self, key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            return self.clear();
        }
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(&self.path, key)?;
        self.replace(Some(key.to_string()));
        self.publish(CredentialEvent::Set);
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.remove(CredentialEvent::Cleared)
    }

    /// Clears a key the backend refused. Subscribers see `Rejected` so
    /// they can ask for a new one.
    pub fn reject(&self) -> Result<()> {
        self.remove(CredentialEvent::Rejected)
    }

    fn remove(&self, event: CredentialEvent) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.replace(None);
        self.publish(event);
        Ok(())
    }

    /// Receives every change made after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CredentialEvent> {
        self.events.subscribe()
    }

    fn replace(&self, key: Option<String>) {
        let mut current = self.key.write().unwrap_or_else(|poisoned| {
            tracing::warn!("Credential lock poisoned, recovering");
            poisoned.into_inner()
        });
        *current = key;
    }

    fn publish(&self, event: CredentialEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
