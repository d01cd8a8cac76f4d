//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Configuration for insight
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API base URL, e.g. "http://localhost:8000/api/v1"
    pub base_url: Option<String>,
    /// Bearer token (alternative to INSIGHT_API_TOKEN)
    pub api_token: Option<String>,
    /// Realtime events endpoint, relative to the base URL
    pub events_path: Option<String>,
    /// Conversation to continue when none is given on the command line
    pub default_conversation: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("insight")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("INSIGHT_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            base_url: Some("http://localhost:8000/api/v1".to_string()),
            api_token: None,
            events_path: Some(insight_api::realtime::DEFAULT_EVENTS_PATH.to_string()),
            default_conversation: None,
        };

        default_config.save()?;
        Ok(path)
    }

    /// Get the API token, checking config then env
    pub fn api_token(&self) -> Option<String> {
        self.api_token
            .clone()
            .or_else(|| std::env::var(insight_api::client::TOKEN_ENV).ok())
    }

    /// Get the base URL, checking config then env
    pub fn base_url(&self) -> Option<String> {
        self.base_url
            .clone()
            .or_else(|| std::env::var(insight_api::client::BASE_URL_ENV).ok())
    }

    pub fn events_path(&self) -> &str {
        self.events_path
            .as_deref()
            .unwrap_or(insight_api::realtime::DEFAULT_EVENTS_PATH)
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# insight configuration file
# Place at ~/.config/insight/config.toml (Linux/Mac) or %APPDATA%\insight\config.toml (Windows)

# API base URL
base_url = "http://localhost:8000/api/v1"

# Realtime events endpoint, relative to base_url
events_path = "events"

# Conversation to continue by default (optional)
# default_conversation = "..."

# Bearer token (optional - INSIGHT_API_TOKEN is preferred)
# api_token = "..."
"#
}
