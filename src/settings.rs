use std::env;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::services::rewards::{DEFAULT_MAX_WIN, DEFAULT_MIN_WIN};

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Server {
    pub listen: String,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Telegram {
    pub bot_token: String,
    pub webapp_url: String,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Storage {
    pub backend: StorageBackend,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Postgres {
    pub url: String,
    pub max_connections: u32,
}

impl Default for Postgres {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Rewards {
    pub min_win: i64,
    pub max_win: i64,
    pub initial_boxes: i32,
}

impl Default for Rewards {
    fn default() -> Self {
        Self {
            min_win: DEFAULT_MIN_WIN,
            max_win: DEFAULT_MAX_WIN,
            initial_boxes: 1,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Auth {
    /// Maximum accepted age of a launch payload. Unset means no limit.
    pub max_age_secs: Option<u64>,
}

impl Auth {
    pub fn max_age(&self) -> Option<chrono::Duration> {
        self.max_age_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .map(chrono::Duration::seconds)
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: Server,
    pub telegram: Telegram,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub postgres: Postgres,
    #[serde(default)]
    pub rewards: Rewards,
    #[serde(default)]
    pub auth: Auth,
}

impl Settings {
    /// Load `path` (optional), then `LUCKYBOX__*` variables, then the plain
    /// `BOT_TOKEN`, `WEBAPP_URL`, `WEBHOOK_URL` and `DB_URL` variables.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("LUCKYBOX")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("telegram.bot_token", env::var("BOT_TOKEN").ok())?
            .set_override_option("telegram.webapp_url", env::var("WEBAPP_URL").ok())?
            .set_override_option("telegram.webhook_url", env::var("WEBHOOK_URL").ok())?
            .set_override_option("postgres.url", env::var("DB_URL").ok())?
            .build()?;

        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| Err(ConfigError::Message(message.to_string()));

        if self.telegram.bot_token.trim().is_empty() {
            return invalid("telegram.bot_token must not be empty");
        }
        if self.telegram.webapp_url.trim().is_empty() {
            return invalid("telegram.webapp_url must not be empty");
        }
        if self.rewards.min_win < 1 {
            return invalid("rewards.min_win must be at least 1");
        }
        if self.rewards.min_win > self.rewards.max_win {
            return invalid("rewards.min_win must not exceed rewards.max_win");
        }
        if self.rewards.initial_boxes < 0 {
            return invalid("rewards.initial_boxes must not be negative");
        }
        if self.storage.backend == StorageBackend::Postgres && self.postgres.url.is_empty() {
            return invalid("postgres.url is required for the postgres storage backend");
        }

        Ok(())
    }
}
