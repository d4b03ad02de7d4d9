pub mod chat;
pub mod cli;
pub mod core;
pub mod credential;
pub mod gateway;
pub mod health;
pub mod session;
