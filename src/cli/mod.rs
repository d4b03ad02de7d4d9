use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod chat;
pub mod health;
pub mod key;
pub mod sessions;

use crate::core::AppConfig;
use crate::core::logging::init_tracing;

#[derive(Subcommand)]
enum Command {
    /// Start an interactive chat
    Chat {},
    /// Check whether the backend is reachable
    Health {},
    /// List saved chat sessions
    Sessions {},
    /// Show, set or clear the stored API key
    Key {
        #[arg(long, conflicts_with = "clear")]
        set: Option<String>,
        #[arg(long, action, default_value = "false")]
        clear: bool,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();
    init_tracing();

    let config = AppConfig::default();
    tracing::debug!("Using storage at {}", config.storage_path.display());

    // Handle each sub command
    match args.command {
        Some(Command::Chat {}) | None => {
            chat::run(&config).await?;
        }
        Some(Command::Health {}) => {
            health::run(&config).await?;
        }
        Some(Command::Sessions {}) => {
            sessions::run(&config)?;
        }
        Some(Command::Key { set, clear }) => {
            key::run(&config, set, clear)?;
        }
    }

    Ok(())
}
