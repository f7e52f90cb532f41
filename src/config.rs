//! Configuration system for altbot.
//!
//! Layered from three sources, later wins:
//!
//! 1. **Compiled defaults** - the values the production bot runs with
//! 2. **User config file** - `~/.config/altbot/config.toml`
//! 3. **Environment variables** - `ALTBOT_*` prefix
//!
//! # Example Configuration File
//!
//! ```toml
//! [bot]
//! screen_name = "AltBotUY"
//! accept_dm_tweet_id = "1388241118695333894"
//!
//! [processing]
//! last_n_tweets = 10
//! kindly_sleep_secs = 60
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{BotError, Result};

/// Main configuration structure for altbot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bot identity and collaborator handles.
    pub bot: BotConfig,
    /// Path-related configuration.
    pub paths: PathsConfig,
    /// Processing behavior knobs.
    pub processing: ProcessingConfig,
}

/// Bot identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// The bot's own handle.
    /// Environment variable: `ALTBOT_SCREEN_NAME`
    pub screen_name: String,

    /// Marker tweet whose retweeters form the allowed-to-DM set.
    pub accept_dm_tweet_id: String,

    /// Seed value for the last-processed-mention cursor on first run.
    pub mention_cursor_seed: i64,

    /// Maintainer contacted via DM when a run dies unexpectedly.
    pub maintainer_screen_name: String,
    pub maintainer_user_id: i64,
}

/// Path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Path to the `SQLite` database file.
    /// Environment variable: `ALTBOT_DB`
    pub db: Option<PathBuf>,
}

/// What to do when a tweet under inspection carries no images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoMediaPolicy {
    /// Mark processed and move on silently.
    Skip,
    /// Reply telling the asker no images were found.
    Reply,
}

/// Processing behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Number of recent timeline tweets inspected per account.
    pub last_n_tweets: usize,

    /// Maximum accounts handled per report-request mention.
    pub max_mentions_to_process: usize,

    /// Age in days after which an account's history is refreshed before
    /// answering a report request.
    pub refresh_window_days: i64,

    /// Seconds slept between remote pagination requests, minus time
    /// already spent processing the page.
    pub kindly_sleep_secs: u64,

    /// Maximum characters per tweet segment when threading long replies.
    pub max_tweet_chars: usize,

    /// No-media behavior on the account-watch path.
    pub no_media_in_watch: NoMediaPolicy,

    /// No-media behavior when answering a reply-chain query.
    pub no_media_in_mentions: NoMediaPolicy,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            screen_name: "AltBotUY".to_string(),
            accept_dm_tweet_id: "1388241118695333894".to_string(),
            mention_cursor_seed: 1_388_241_118_695_333_894,
            maintainer_screen_name: "ro_laguna_".to_string(),
            maintainer_user_id: 0,
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            last_n_tweets: 10,
            max_mentions_to_process: 5,
            refresh_window_days: 7,
            kindly_sleep_secs: 60,
            max_tweet_chars: 250,
            no_media_in_watch: NoMediaPolicy::Skip,
            no_media_in_mentions: NoMediaPolicy::Reply,
        }
    }
}

/// Default data directory for altbot.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("altbot")
}

/// Default database path.
#[must_use]
pub fn default_db_path() -> PathBuf {
    default_data_dir().join("altbot.db")
}

/// Default user config file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("altbot").join("config.toml"))
}

impl Config {
    /// Load configuration: defaults, then the config file (explicit path or
    /// the default location), then environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly given config file is missing or
    /// unparseable. A missing file at the default location is fine.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match explicit_path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| BotError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&contents).map_err(|e| BotError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(db) = std::env::var("ALTBOT_DB") {
            self.paths.db = Some(PathBuf::from(db));
        }
        if let Ok(name) = std::env::var("ALTBOT_SCREEN_NAME") {
            self.bot.screen_name = name;
        }
        if let Ok(value) = std::env::var("ALTBOT_KINDLY_SLEEP_SECS") {
            match value.parse() {
                Ok(secs) => self.processing.kindly_sleep_secs = secs,
                Err(_) => warn!("Ignoring invalid ALTBOT_KINDLY_SLEEP_SECS: {value}"),
            }
        }
    }

    /// Resolve the database path, falling back to the default location.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.paths.db.clone().unwrap_or_else(default_db_path)
    }
}
