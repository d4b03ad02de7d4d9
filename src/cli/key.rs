use anyhow::Result;

use crate::core::AppConfig;
use crate::credential::{CredentialStore, KeyStatus, validate_api_key};

pub fn run(config: &AppConfig, set: Option<String>, clear: bool) -> Result<()> {
    let credentials = CredentialStore::open(&config.credential_path)?;

    if clear {
        credentials.clear()?;
        println!("API key cleared");
        return Ok(());
    }

    if let Some(key) = set {
        if validate_api_key(Some(&key)) == KeyStatus::Malformed {
            println!("Warning: the key doesn't look like a provider key (expected \"sk-...\")");
        }
        credentials.set(&key)?;
        println!("API key saved to {}", credentials.path().display());
        return Ok(());
    }

    let status = match credentials.status() {
        KeyStatus::Missing => "not set",
        KeyStatus::Malformed => "set, but malformed",
        KeyStatus::Valid => "set",
    };
    println!("API key is {}", status);
    Ok(())
}
