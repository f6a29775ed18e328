use std::env;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::remote::firestore::PollSettings;

pub const DEFAULT_CONFIG_PATH: &str = "config/unichat.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Firestore,
    /// In-process collections; nothing leaves the machine.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendKind,
    pub project_id: String,
    pub api_key: String,
    pub database_path: String,
    pub session_path: String,
    /// Shown as the author of outgoing messages.
    pub sender_name: String,
    /// Put in front of entered numbers; an empty `--country-code` opts out.
    pub default_country_code: Option<String>,
    pub poll_interval_ms: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Firestore,
            project_id: String::new(),
            api_key: String::new(),
            database_path: "data/contacts.db".to_string(),
            session_path: "data/session.json".to_string(),
            sender_name: "You".to_string(),
            default_country_code: Some("+1".to_string()),
            poll_interval_ms: 1000,
            backoff_initial_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

impl AppConfig {
    /// Settings from the JSON file at `path` with `UNICHAT_*` overrides on
    /// top. A missing or malformed file leaves the defaults in place.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let mut config = Self::from_file(path.as_ref());
        config.apply_env();
        config
    }

    fn from_file(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::info!("No config at {}; using defaults", path.display());
                return Self::default();
            }
            Err(err) => {
                log::warn!("Cannot read config {}: {err}; using defaults", path.display());
                return Self::default();
            }
        };
        serde_json::from_str(&content).unwrap_or_else(|err| {
            log::warn!("Invalid config {}: {err}; using defaults", path.display());
            Self::default()
        })
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            backoff_initial: Duration::from_millis(self.backoff_initial_ms.max(1)),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
        }
    }

    /// Apply `UNICHAT_*` environment overrides (a `.env` file counts).
    fn apply_env(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(project_id) = lookup("UNICHAT_PROJECT_ID") {
            self.project_id = project_id;
        }
        if let Some(api_key) = lookup("UNICHAT_API_KEY") {
            self.api_key = api_key;
        }
        if let Some(backend) = lookup("UNICHAT_BACKEND") {
            match backend.trim().to_ascii_lowercase().as_str() {
                "firestore" => self.backend = BackendKind::Firestore,
                "memory" => self.backend = BackendKind::Memory,
                other => log::warn!("Unknown UNICHAT_BACKEND `{other}`; keeping {:?}", self.backend),
            }
        }
    }
}
