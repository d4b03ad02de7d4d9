//! Client for the external chat/RAG backend.
mod client;
pub mod public;

use async_trait::async_trait;
use thiserror::Error;

pub use client::HttpGateway;
pub use public::{ChatRequest, DocumentUpload, FileChatRequest};

use crate::session::DocumentDescriptor;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{detail}")]
    Request { status: u16, detail: String },

    #[error("Unexpected response from backend: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Human-readable text suitable for showing next to an error
    /// message in the transcript.
    pub fn detail(&self) -> String {
        match self {
            GatewayError::Request { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }

    /// The backend rejected the credential.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GatewayError::Request { status: 401, .. })
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[async_trait]
pub trait BackendGateway: Send + Sync {
    async fn check_health(&self) -> HealthStatus;

    /// Plain conversation turn, used when no document is attached.
    async fn send_chat(&self, request: &ChatRequest) -> GatewayResult<String>;

    /// Retrieval-augmented turn against a previously uploaded document.
    async fn send_file_chat(&self, request: &FileChatRequest) -> GatewayResult<String>;

    async fn upload_document(
        &self,
        upload: DocumentUpload,
        api_key: &str,
    ) -> GatewayResult<DocumentDescriptor>;

    async fn remove_document(&self, document_session_id: &str) -> GatewayResult<()>;
}
