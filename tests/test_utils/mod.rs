//! Test utilities for integration tests
#![allow(dead_code)]
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::watch;

use ragchat::chat::{ChatController, ChatSettings};
use ragchat::credential::CredentialStore;
use ragchat::gateway::{BackendGateway, HealthStatus, HttpGateway};
use ragchat::session::{MemorySessionPersistence, SessionStore};

pub const TEST_API_KEY: &str = "sk-test-key";
pub const TEST_MODEL: &str = "gpt-4.1-mini";
pub const TEST_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// A store backed by an in-memory blob. The returned persistence
/// shares the blob so tests can inspect what was saved or reload it.
pub fn test_store() -> (SessionStore, MemorySessionPersistence) {
    let persistence = MemorySessionPersistence::new();
    let store = SessionStore::initialize(Box::new(persistence.clone()));
    (store, persistence)
}

pub struct TestChat {
    pub controller: ChatController,
    pub credentials: Arc<CredentialStore>,
    pub health: watch::Sender<HealthStatus>,
    pub persistence: MemorySessionPersistence,
    // Keeps the credential file alive for the duration of the test
    pub dir: TempDir,
}

/// Creates a controller pointed at a mock backend, with a valid key
/// stored and the backend reported healthy.
pub fn test_chat(server_url: &str) -> TestChat {
    let gateway = HttpGateway::new(&format!("{}/api", server_url), Duration::from_secs(5))
        .expect("Failed to build gateway");
    test_chat_with_gateway(Arc::new(gateway))
}

pub fn test_chat_with_gateway(gateway: Arc<dyn BackendGateway>) -> TestChat {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let credentials = Arc::new(
        CredentialStore::open(dir.path().join("api_key")).expect("Failed to open credentials"),
    );
    credentials
        .set(TEST_API_KEY)
        .expect("Failed to store API key");

    let (health, health_rx) = watch::channel(HealthStatus::Healthy);

    let persistence = MemorySessionPersistence::new();
    let store = SessionStore::initialize(Box::new(persistence.clone())).into_shared();
    let controller = ChatController::new(
        store,
        gateway,
        Arc::clone(&credentials),
        health_rx,
        ChatSettings {
            model: TEST_MODEL.to_string(),
            system_prompt: TEST_SYSTEM_PROMPT.to_string(),
        },
    );

    TestChat {
        controller,
        credentials,
        health,
        persistence,
        dir,
    }
}
