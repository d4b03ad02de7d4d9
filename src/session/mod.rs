//! Client-side chat session state: the data model, the store that owns
//! it and the adapter that mirrors it to durable storage.
pub mod models;
pub mod persist;
pub mod store;

pub use models::{DocumentDescriptor, Message, MessagePatch, Sender, Session};
pub use persist::{
    DecodedSessions, FileSessionPersistence, MemorySessionPersistence, SessionPersistence,
    decode_sessions,
};
pub use store::{SessionStore, SharedSessionStore};
