use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::broadcast::Receiver;

use super::sessions::describe;
use crate::chat::{ChatController, ChatSettings, Reply};
use crate::core::AppConfig;
use crate::credential::{CredentialEvent, CredentialStore};
use crate::gateway::{BackendGateway, HealthStatus, HttpGateway};
use crate::health::HealthMonitor;
use crate::session::{FileSessionPersistence, Message, Sender, Session, SessionStore};

const HELP: &str = "\
Commands:
  /sessions           list sessions
  /new                start a new session
  /switch <n|id>      switch to a session by number or id prefix
  /delete <n|id>      delete a session
  /history            show the current transcript
  /edit <n> <text>    replace message n and ask again
  /upload <path>      attach a document to this session
  /detach             remove the attached document
  /key [<key>|clear]  set or clear the API key
  /quit               exit";

#[derive(Debug, PartialEq)]
pub enum Input {
    Message(String),
    Help,
    Sessions,
    New,
    Switch(String),
    Delete(String),
    History,
    Edit(usize, String),
    Upload(PathBuf),
    Detach,
    SetKey(String),
    ClearKey,
    Quit,
    Invalid(String),
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line.to_string());
    };
    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };

    match (name, rest) {
        ("help", _) => Input::Help,
        ("sessions", _) => Input::Sessions,
        ("new", _) => Input::New,
        ("history", _) => Input::History,
        ("detach", _) => Input::Detach,
        ("quit" | "exit", _) => Input::Quit,
        ("switch", target) if !target.is_empty() => Input::Switch(target.to_string()),
        ("delete", target) if !target.is_empty() => Input::Delete(target.to_string()),
        ("upload", path) if !path.is_empty() => Input::Upload(PathBuf::from(path)),
        ("key", "clear") => Input::ClearKey,
        ("key", key) if !key.is_empty() => Input::SetKey(key.to_string()),
        ("edit", args) => match args.split_once(char::is_whitespace) {
            Some((n, text)) if !text.trim().is_empty() => match n.parse::<usize>() {
                Ok(n) if n > 0 => Input::Edit(n, text.trim().to_string()),
                _ => Input::Invalid(format!("Not a message number: {}", n)),
            },
            _ => Input::Invalid("Usage: /edit <n> <text>".to_string()),
        },
        ("switch" | "delete" | "upload" | "key", _) => {
            Input::Invalid(format!("/{} needs an argument, see /help", name))
        }
        _ => Input::Invalid(format!("Unknown command: /{}", name)),
    }
}

/// Resolves a 1-based position in the session list or a unique id
/// prefix to a session id.
pub fn resolve_session(sessions: &[Session], target: &str) -> Option<String> {
    if let Ok(n) = target.parse::<usize>() {
        if n > 0 && n <= sessions.len() {
            return Some(sessions[n - 1].id.clone());
        }
    }
    let mut matches = sessions.iter().filter(|s| s.id.starts_with(target));
    match (matches.next(), matches.next()) {
        (Some(session), None) => Some(session.id.clone()),
        _ => None,
    }
}

fn format_message(n: usize, msg: &Message) -> String {
    let who = match msg.sender {
        Sender::User => "you",
        Sender::Bot => "bot",
    };
    match (&msg.error_message, msg.is_error) {
        (Some(detail), true) => format!("[{}] {}> {} ({})", n, who, msg.text, detail),
        _ => format!("[{}] {}> {}", n, who, msg.text),
    }
}

fn render_session(session: &Session) {
    match &session.document {
        Some(doc) => println!("== {} [{}]", session.name, doc.filename),
        None => println!("== {}", session.name),
    }
    for (i, msg) in session.messages.iter().enumerate() {
        println!("{}", format_message(i + 1, msg));
    }
}

fn render_current(controller: &ChatController) -> Result<()> {
    let store = controller.read()?;
    render_session(store.current_session());
    Ok(())
}

fn render_reply(controller: &ChatController, reply: &Reply) -> Result<()> {
    let store = controller.read()?;
    if store.current_session_id() != reply.session_id {
        return Ok(());
    }
    let n = store.current_session().messages.len();
    println!("{}", format_message(n, &reply.message));
    Ok(())
}

fn prompt_for_key(rl: &mut DefaultEditor, credentials: &CredentialStore) -> Result<()> {
    match rl.readline("API key (blank to skip): ") {
        Ok(line) if !line.trim().is_empty() => credentials.set(&line),
        Ok(_) => Ok(()),
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(()),
        Err(err) => Err(anyhow!("Failed to read API key: {}", err)),
    }
}

/// Drains pending key events and reports whether the key ended up
/// rejected by the backend. A key the user cleared themselves doesn't
/// count.
fn key_was_rejected(events: &mut Receiver<CredentialEvent>) -> bool {
    let mut rejected = false;
    while let Ok(event) = events.try_recv() {
        rejected = event == CredentialEvent::Rejected;
    }
    rejected
}

fn drain_key_events(
    events: &mut Receiver<CredentialEvent>,
    rl: &mut DefaultEditor,
    credentials: &CredentialStore,
) -> Result<()> {
    if key_was_rejected(events) {
        println!("The backend rejected the API key.");
        prompt_for_key(rl, credentials)?;
        // Drop the event our own prompt just produced
        while events.try_recv().is_ok() {}
    }
    Ok(())
}

async fn handle_input(
    controller: &ChatController,
    credentials: &CredentialStore,
    input: Input,
) -> Result<bool> {
    match input {
        Input::Message(text) => match controller.submit(&text).await {
            Ok(reply) => render_reply(controller, &reply)?,
            Err(e) => println!("! {}", e),
        },
        Input::Help => println!("{}", HELP),
        Input::Sessions => {
            let store = controller.read()?;
            for (i, session) in store.sessions().iter().enumerate() {
                let marker = if session.id == store.current_session_id() {
                    "*"
                } else {
                    " "
                };
                println!("{}{} {}", marker, i + 1, describe(session));
            }
        }
        Input::New => {
            controller.new_session()?;
            render_current(controller)?;
        }
        Input::Switch(target) => {
            let resolved = resolve_session(controller.read()?.sessions(), &target);
            match resolved {
                Some(id) => {
                    controller.switch_session(&id)?;
                    render_current(controller)?;
                }
                None => println!("! No session matches {}", target),
            }
        }
        Input::Delete(target) => {
            let resolved = resolve_session(controller.read()?.sessions(), &target);
            match resolved {
                Some(id) => {
                    controller.delete_session(&id).await?;
                    render_current(controller)?;
                }
                None => println!("! No session matches {}", target),
            }
        }
        Input::History => render_current(controller)?,
        Input::Edit(n, text) => {
            let message_id = controller
                .read()?
                .current_session()
                .messages
                .get(n - 1)
                .map(|m| m.id.clone());
            let Some(message_id) = message_id else {
                println!("! No message {}", n);
                return Ok(true);
            };
            match controller.edit_and_regenerate(&message_id, &text).await {
                Ok(Some(_)) => render_current(controller)?,
                Ok(None) => println!("! Only your own messages can be edited"),
                Err(e) => println!("! {}", e),
            }
        }
        Input::Upload(path) => match controller.upload_document(&path).await {
            Ok(reply) => render_reply(controller, &reply)?,
            Err(e) => println!("! {}", e),
        },
        Input::Detach => match controller.remove_document().await? {
            Some(doc) => println!("Removed {}", doc.filename),
            None => println!("No document attached"),
        },
        Input::SetKey(key) => {
            credentials.set(&key)?;
            if let Err(e) = controller.can_submit() {
                println!("! {}", e);
            }
        }
        Input::ClearKey => credentials.clear()?,
        Input::Quit => return Ok(false),
        Input::Invalid(reason) => println!("! {}", reason),
    }
    Ok(true)
}

pub async fn run(config: &AppConfig) -> Result<()> {
    let mut rl = DefaultEditor::new().map_err(|e| anyhow!("Editor failed: {}", e))?;

    let credentials = Arc::new(CredentialStore::open(&config.credential_path)?);
    if credentials.get().is_none() {
        if let Some(key) = &config.openai_api_key {
            credentials.set(key)?;
        }
    }
    let mut key_events = credentials.subscribe();

    let gateway: Arc<dyn BackendGateway> = Arc::new(HttpGateway::new(
        &config.api_base_url,
        config.request_timeout,
    )?);
    let monitor = HealthMonitor::start(Arc::clone(&gateway), config.health_interval);

    let persistence = FileSessionPersistence::new(&config.sessions_path);
    let store = SessionStore::initialize(Box::new(persistence)).into_shared();
    let controller = ChatController::new(
        store,
        gateway,
        Arc::clone(&credentials),
        monitor.subscribe(),
        ChatSettings {
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
        },
    );

    println!("Type a message, or /help for commands.");
    render_current(&controller)?;

    let mut last_health = controller.health();
    loop {
        let health = monitor.status();
        if health != last_health {
            match health {
                HealthStatus::Healthy => println!("Backend is back online."),
                HealthStatus::Unhealthy => {
                    println!("! Backend is unreachable, messages can't be sent.")
                }
            }
            last_health = health;
        }
        drain_key_events(&mut key_events, &mut rl, &credentials)?;

        let readline = rl.readline(">>> ");
        match readline {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line.as_str());
                if !handle_input(&controller, &credentials, parse_input(&line)).await? {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}
