//! Application configuration: optional TOML file plus environment overrides.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DEFAULT_CONFIG_FILE: &str = "replybot.toml";
const DOTENV_FILE: &str = ".env";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub reddit: RedditConfig,
    pub openai: OpenAiConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub user_agent: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            username: None,
            password: None,
            user_agent: format!("replybot/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub system_prompt: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-3.5-turbo".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            system_prompt: "You are a reddit bot. Your job is to provide short and relevant \
                            replies to the reddit posts."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://reddit.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            static_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub batch_size: u32,
    /// Pause after each posted reply; Reddit throttles new accounts hard.
    pub reply_delay_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            reply_delay_secs: 660,
            poll_interval_secs: 0,
        }
    }
}

impl AppConfig {
    /// Loads the config file (explicit path, or `replybot.toml` when present),
    /// then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Self::default()
                }
            }
        };

        if let Some(dotenv) = unread_dotenv(Path::new(".")) {
            warn!(
                "{} is not read; export its variables or move them into {}",
                dotenv.display(),
                DEFAULT_CONFIG_FILE
            );
        }

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let config: AppConfig = toml::from_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Applies overrides from a key lookup; `load` passes the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |target: &mut Option<String>, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *target = Some(value);
            }
        };

        set(&mut self.reddit.client_id, "REDDIT_CLIENT_ID");
        set(&mut self.reddit.client_secret, "REDDIT_CLIENT_SECRET");
        set(&mut self.reddit.username, "REDDIT_USERNAME");
        set(&mut self.reddit.password, "REDDIT_PASSWORD");
        set(&mut self.openai.api_key, "OPENAI_API_KEY");

        if let Some(user_agent) = lookup("REDDIT_USER_AGENT") {
            self.reddit.user_agent = user_agent;
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            self.openai.model = model;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(host) = lookup("REPLYBOT_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("REPLYBOT_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                field: "REPLYBOT_PORT".to_string(),
                value: port.clone(),
            })?;
        }

        Ok(())
    }

    /// Checks that the credentials the external services need are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            (&self.reddit.client_id, "REDDIT_CLIENT_ID"),
            (&self.reddit.client_secret, "REDDIT_CLIENT_SECRET"),
            (&self.reddit.username, "REDDIT_USERNAME"),
            (&self.reddit.password, "REDDIT_PASSWORD"),
            (&self.openai.api_key, "OPENAI_API_KEY"),
        ];

        for (value, var_name) in required {
            if value.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::MissingEnvironmentVariable {
                    var_name: var_name.to_string(),
                });
            }
        }

        if self.monitor.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "monitor.batch_size".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(())
    }
}

/// A `.env` file in `dir`, which `load` does not read.
fn unread_dotenv(dir: &Path) -> Option<PathBuf> {
    let path = dir.join(DOTENV_FILE);
    path.is_file().then_some(path)
}
