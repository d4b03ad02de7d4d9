use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://localhost:8000/api";
const DEFAULT_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60 * 10;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub storage_path: PathBuf,
    pub sessions_path: PathBuf,
    pub credential_path: PathBuf,
    pub api_base_url: String,
    pub model: String,
    pub system_prompt: String,
    pub health_interval: Duration,
    pub request_timeout: Duration,
    // Seed credential, only used when nothing has been stored yet
    pub openai_api_key: Option<String>,
}

impl AppConfig {
    /// Builds a config rooted at `storage_path` with every other value
    /// at its default.
    pub fn with_storage_path(storage_path: impl Into<PathBuf>) -> Self {
        let storage_path = storage_path.into();
        Self {
            sessions_path: storage_path.join("sessions.json"),
            credential_path: storage_path.join("api_key"),
            storage_path,
            api_base_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            health_interval: Duration::from_secs(DEFAULT_HEALTH_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            openai_api_key: None,
        }
    }
}

fn secs_from_env(key: &str, default: u64) -> Duration {
    match env::var(key) {
        Ok(val) => match val.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                tracing::warn!("Ignoring invalid {}={:?}, using {}s", key, val, default);
                Duration::from_secs(default)
            }
        },
        Err(_) => Duration::from_secs(default),
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let storage_path = env::var("RAGCHAT_STORAGE_PATH").unwrap_or("./".to_string());
        let defaults = Self::with_storage_path(storage_path);

        let api_base_url = env::var("RAGCHAT_API_URL").unwrap_or(defaults.api_base_url);
        let model = env::var("RAGCHAT_MODEL").unwrap_or(defaults.model);
        let system_prompt =
            env::var("RAGCHAT_SYSTEM_PROMPT").unwrap_or(defaults.system_prompt);
        let health_interval =
            secs_from_env("RAGCHAT_HEALTH_INTERVAL_SECS", DEFAULT_HEALTH_INTERVAL_SECS);
        let request_timeout =
            secs_from_env("RAGCHAT_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS);
        let openai_api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        Self {
            api_base_url,
            model,
            system_prompt,
            health_interval,
            request_timeout,
            openai_api_key,
            ..defaults
        }
    }
}
