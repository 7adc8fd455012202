//! Configuration file support for Studyflow.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/studyflow/config.toml`.
//! Secrets never live in the file: the backend and assistant sections name
//! the environment variables that hold their keys.

use crate::{Error, Result, UserId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub user: UserConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub assistant: AssistantConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// The identity every command acts as
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub id: Option<UserId>,

    #[serde(default = "default_username")]
    pub username: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            id: None,
            username: default_username(),
        }
    }
}

/// Which data store implementation to use
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// JSON document in the data directory
    #[default]
    Local,
    /// Hosted PostgREST-style data service
    Remote,
}

/// Data service connection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_backend_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            url: None,
            api_key_env: default_backend_key_env(),
            access_token_env: default_access_token_env(),
        }
    }
}

/// Completion endpoint settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default = "default_assistant_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_assistant_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_assistant_key_env")]
    pub api_key_env: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            endpoint: default_assistant_endpoint(),
            model: default_assistant_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt: default_system_prompt(),
            api_key_env: default_assistant_key_env(),
        }
    }
}

/// Focus session defaults
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_minutes")]
    pub default_minutes: u32,

    #[serde(default = "default_duration_options")]
    pub duration_options: Vec<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_minutes: default_minutes(),
            duration_options: default_duration_options(),
        }
    }
}

impl SessionConfig {
    /// Resolve a requested session length, falling back to `default_minutes`.
    ///
    /// Only lengths listed in `duration_options` are accepted.
    pub fn resolve_minutes(&self, requested: Option<u32>) -> Result<u32> {
        let minutes = requested.unwrap_or(self.default_minutes);
        if self.duration_options.contains(&minutes) {
            Ok(minutes)
        } else {
            Err(Error::Validation(format!(
                "Session length {} min is not offered; choose one of {}",
                minutes,
                self.options_list()
            )))
        }
    }

    /// Duration options as `15, 25, 30` for prompts and errors
    pub fn options_list(&self) -> String {
        self.duration_options
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(std::env::temp_dir);
    base.join("studyflow")
}

fn default_username() -> String {
    "student".into()
}

fn default_backend_key_env() -> String {
    "STUDYFLOW_BACKEND_KEY".into()
}

fn default_access_token_env() -> String {
    "STUDYFLOW_ACCESS_TOKEN".into()
}

fn default_assistant_endpoint() -> String {
    "https://api.groq.com/openai/v1/chat/completions".into()
}

fn default_assistant_model() -> String {
    "llama-3.1-8b-instant".into()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    300
}

fn default_system_prompt() -> String {
    "You are a helpful study assistant. Provide clear, concise answers to student \
     questions. Keep responses under 200 words and focus on explaining concepts simply."
        .into()
}

fn default_assistant_key_env() -> String {
    "GROQ_API_KEY".into()
}

fn default_minutes() -> u32 {
    25
}

fn default_duration_options() -> Vec<u32> {
    vec![15, 25, 30, 45, 60]
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(std::env::temp_dir);
        base.join("studyflow").join("config.toml")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = self.to_toml()?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Reject settings no command could work with
    pub fn validate(&self) -> Result<()> {
        if self.session.default_minutes == 0 {
            return Err(Error::Config("session.default_minutes must be positive".into()));
        }
        if self.session.duration_options.is_empty() {
            return Err(Error::Config("session.duration_options must not be empty".into()));
        }
        if self.session.duration_options.contains(&0) {
            return Err(Error::Config(
                "session.duration_options must all be positive".into(),
            ));
        }
        if !self.session.duration_options.contains(&self.session.default_minutes) {
            return Err(Error::Config(format!(
                "session.default_minutes {} is not one of session.duration_options ({})",
                self.session.default_minutes,
                self.session.options_list()
            )));
        }
        if !(0.0..=2.0).contains(&self.assistant.temperature) {
            return Err(Error::Config(format!(
                "assistant.temperature {} outside 0.0..=2.0",
                self.assistant.temperature
            )));
        }
        if self.backend.kind == BackendKind::Remote
            && self.backend.url.as_deref().map_or(true, |u| u.trim().is_empty())
        {
            return Err(Error::Config("backend.url is required for the remote backend".into()));
        }
        Ok(())
    }

    /// Path of the local JSON store inside the data directory
    pub fn local_store_path(data_dir: &Path) -> PathBuf {
        data_dir.join("studyflow.json")
    }
}

/// Read a secret from the environment variable named by a config field
pub fn secret_from_env(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::Config(format!("environment variable {} is not set", var))),
    }
}
