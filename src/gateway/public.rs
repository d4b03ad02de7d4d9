//! Wire types for the backend API
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::DocumentDescriptor;

// Splitter settings the backend uses when it doesn't report them
const DEFAULT_CHUNK_SIZE: u32 = 1000;
const DEFAULT_CHUNK_OVERLAP: u32 = 200;

#[derive(Serialize, Clone, Debug)]
pub struct ChatRequest {
    pub system_prompt: String,
    pub user_message: String,
    pub model: String,
    pub api_key: String,
}

#[derive(Serialize, Clone, Debug)]
pub struct FileChatRequest {
    // The document session, not the chat session
    pub session_id: String,
    pub question: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Clone, Debug)]
pub struct DocumentUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Deserialize, Debug)]
pub struct UploadResponse {
    pub session_id: String,
    pub filename: Option<String>,
    pub chunk_size: Option<u32>,
    pub chunk_overlap: Option<u32>,
    pub num_chunks: Option<u32>,
}

impl UploadResponse {
    pub fn into_descriptor(self, local_filename: &str) -> DocumentDescriptor {
        DocumentDescriptor {
            document_session_id: self.session_id,
            filename: self.filename.unwrap_or_else(|| local_filename.to_string()),
            chunk_size: self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            chunk_overlap: self.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP),
            num_chunks: self.num_chunks.unwrap_or(0),
        }
    }
}

/// FastAPI error body. `detail` is usually a string but validation
/// errors send a list.
#[derive(Deserialize, Debug)]
pub struct ErrorBody {
    pub detail: Value,
}

impl ErrorBody {
    pub fn detail_text(&self) -> String {
        match &self.detail {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Chat replies are plain text, but a JSON-encoded string or an object
/// carrying `detail` are also accepted.
pub fn reply_text(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::String(s)) => s,
        Ok(Value::Object(obj)) => match obj.get("detail") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => body.to_string(),
        },
        _ => body.to_string(),
    }
}
