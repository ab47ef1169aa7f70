//! Configuration management for Crosspost

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::types::{Account, AccountData};

/// Default proxy relaying OAuth-signed Twitter requests
pub const DEFAULT_TWITTER_PROXY: &str = "http://localhost:4201";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub posting: PostingConfig,
    #[serde(default)]
    pub twitter: TwitterConfig,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout", with = "duration_str")]
    pub timeout: Duration,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// What to do when media processing is still unconfirmed after the poll budget
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnconfirmedMediaPolicy {
    /// Attach the media id anyway; the platform usually finishes processing
    #[default]
    Proceed,
    /// Treat the upload as failed
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingConfig {
    #[serde(default = "default_poll_interval", with = "duration_str")]
    pub media_poll_interval: Duration,
    #[serde(default = "default_poll_attempts")]
    pub media_poll_attempts: u32,
    #[serde(default)]
    pub unconfirmed_media: UnconfirmedMediaPolicy,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_accounts: usize,
}

impl Default for PostingConfig {
    fn default() -> Self {
        Self {
            media_poll_interval: default_poll_interval(),
            media_poll_attempts: default_poll_attempts(),
            unconfirmed_media: UnconfirmedMediaPolicy::default(),
            max_concurrent_accounts: default_max_concurrent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterConfig {
    #[serde(default = "default_twitter_proxy")]
    pub proxy_url: String,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            proxy_url: default_twitter_proxy(),
        }
    }
}

/// An account entry; credentials come inline or from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub id: String,
    pub platform: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub credentials_file: Option<String>,
}

impl AccountConfig {
    /// Resolve into an [`Account`], reading the credentials file if one is set
    ///
    /// Inline `data` keys override keys from the file.
    pub fn to_account(&self) -> Result<Account> {
        let mut data = serde_json::Map::new();

        if let Some(file) = &self.credentials_file {
            let path = shellexpand::full(file).map_err(|e| ConfigError::InvalidValue {
                field: format!("accounts.{}.credentials_file", self.id),
                reason: e.to_string(),
            })?;
            let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::ReadError)?;
            let value: serde_json::Value =
                serde_json::from_str(&content).map_err(|e| ConfigError::InvalidValue {
                    field: format!("accounts.{}.credentials_file", self.id),
                    reason: e.to_string(),
                })?;
            match value {
                serde_json::Value::Object(map) => data.extend(map),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: format!("accounts.{}.credentials_file", self.id),
                        reason: "expected a JSON object".to_string(),
                    }
                    .into())
                }
            }
        }

        if let Some(serde_json::Value::Object(inline)) = &self.data {
            data.extend(inline.clone());
        }

        Ok(Account {
            id: self.id.clone(),
            platform: self.platform.clone(),
            alias: self.alias.clone(),
            data: AccountData(data),
        })
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("crosspost/{}", env!("CARGO_PKG_VERSION"))
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(4)
}

fn default_poll_attempts() -> u32 {
    10
}

fn default_max_concurrent() -> usize {
    4
}

fn default_twitter_proxy() -> String {
    DEFAULT_TWITTER_PROXY.to_string()
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the posting pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.posting.media_poll_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "posting.media_poll_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if self.posting.max_concurrent_accounts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "posting.max_concurrent_accounts".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }

        let mut seen = HashSet::new();
        for account in &self.accounts {
            if !seen.insert(account.id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "accounts".to_string(),
                    reason: format!("duplicate account id '{}'", account.id),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Resolve every configured account
    pub fn accounts(&self) -> Result<Vec<Account>> {
        self.accounts.iter().map(AccountConfig::to_account).collect()
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CROSSPOST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosspost").join("config.toml"))
}

/// Durations written as humantime strings ("4s", "1m 30s")
mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
