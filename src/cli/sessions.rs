use anyhow::Result;

use crate::core::AppConfig;
use crate::session::{FileSessionPersistence, Session, SessionPersistence};

pub fn describe(session: &Session) -> String {
    let mut line = format!(
        "{}  {}  ({} messages)",
        session.id,
        session.name,
        session.messages.len()
    );
    if let Some(doc) = &session.document {
        line.push_str(&format!("  [{}]", doc.filename));
    }
    line
}

pub fn run(config: &AppConfig) -> Result<()> {
    let sessions = FileSessionPersistence::new(&config.sessions_path).load();
    if sessions.is_empty() {
        println!("No saved sessions");
    }
    for session in &sessions {
        println!("{}", describe(session));
    }
    Ok(())
}
