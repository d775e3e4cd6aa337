//! Bot configuration.
//!
//! # File Format
//!
//! Stored as JSON; every field is optional and falls back to the default:
//!
//! ```json
//! {
//!   "allowedChats": { "test_chat": -762022584 },
//!   "availableDates": ["12.8", "19.8"],
//!   "dataDir": "data",
//!   "deferredFlush": false,
//!   "pollTimeoutSecs": 30,
//!   "transcriptDir": null
//! }
//! ```
//!
//! The bot token is never stored here; it comes from `TELEGRAM_TOKEN`.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::managers::StoreOptions;
use crate::paths::expand_home;
use crate::persistence::ChatId;

/// Environment variable holding the bot API token.
pub const TOKEN_ENV_VAR: &str = "TELEGRAM_TOKEN";

/// Subdirectory of `dataDir` holding the ledger files.
const LEDGER_SUBDIR: &str = "chat_data";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Environment variable {0} is not set")]
    MissingToken(&'static str),
}

/// Static configuration injected into the command layer and the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BotConfig {
    /// Chats the bot answers in, by a human-readable name.
    pub allowed_chats: BTreeMap<String, ChatId>,

    /// Date labels users may sign up for, in display order.
    pub available_dates: Vec<String>,

    /// Root directory for persistent data. `~` is expanded.
    pub data_dir: String,

    /// Write ledgers only on flush (shutdown) instead of after every change.
    pub deferred_flush: bool,

    /// Long-poll timeout passed to the transport.
    pub poll_timeout_secs: u64,

    /// When set, inbound and outbound messages are logged here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_dir: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            allowed_chats: BTreeMap::from([("test_chat".to_string(), -762022584)]),
            available_dates: vec!["12.8".to_string(), "19.8".to_string()],
            data_dir: "data".to_string(),
            deferred_flush: false,
            poll_timeout_secs: 30,
            transcript_dir: None,
        }
    }
}

impl BotConfig {
    /// Load configuration from a JSON file.
    ///
    /// Unlike the persistence loaders, a missing file is an error here: the
    /// path was asked for explicitly.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn is_chat_allowed(&self, chat_id: ChatId) -> bool {
        self.allowed_chats.values().any(|id| *id == chat_id)
    }

    pub fn is_date_available(&self, date: &str) -> bool {
        self.available_dates.iter().any(|d| d == date)
    }

    /// Directory the reservation store persists into.
    pub fn ledger_dir(&self) -> PathBuf {
        expand_home(&self.data_dir).join(LEDGER_SUBDIR)
    }

    pub fn transcript_dir(&self) -> Option<PathBuf> {
        self.transcript_dir.as_deref().map(expand_home)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            deferred_flush: self.deferred_flush,
        }
    }
}

/// Read the bot token from the environment.
pub fn token_from_env() -> Result<String, ConfigError> {
    match env::var(TOKEN_ENV_VAR) {
        Ok(token) if !token.trim().is_empty() => Ok(token),
        _ => Err(ConfigError::MissingToken(TOKEN_ENV_VAR)),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_matches_original_signup_sheet() {
        let config = BotConfig::default();

        assert!(config.is_chat_allowed(-762022584));
        assert!(!config.is_chat_allowed(316821571));
        assert!(config.is_date_available("12.8"));
        assert!(config.is_date_available("19.8"));
        assert!(!config.is_date_available("26.8"));
        assert!(!config.deferred_flush);
    }

    #[test]
    fn load_fills_missing_fields_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"allowedChats": {"club": 42}, "deferredFlush": true}"#,
        )
        .unwrap();

        let config = BotConfig::load(&path).unwrap();

        assert!(config.is_chat_allowed(42));
        assert!(!config.is_chat_allowed(-762022584));
        assert!(config.deferred_flush);
        assert!(config.store_options().deferred_flush);
        assert_eq!(config.available_dates, vec!["12.8", "19.8"]);
        assert_eq!(config.poll_timeout_secs, 30);
    }

    #[test]
    fn load_missing_file_is_error() {
        let dir = tempdir().unwrap();
        let result = BotConfig::load(&dir.path().join("missing.json"));

        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn load_invalid_json_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"availableDates": "12.8"}"#).unwrap();

        assert!(matches!(
            BotConfig::load(&path),
            Err(ConfigError::Json { .. })
        ));
    }

    #[test]
    fn ledger_dir_is_under_data_dir() {
        let config = BotConfig {
            data_dir: "/var/lib/signup".to_string(),
            ..BotConfig::default()
        };

        assert_eq!(
            config.ledger_dir(),
            PathBuf::from("/var/lib/signup/chat_data")
        );
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = BotConfig {
            transcript_dir: Some("/tmp/transcripts".to_string()),
            ..BotConfig::default()
        };

        let json = serde_json::to_string(&config).unwrap();
        let parsed: BotConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, config);
    }
}
