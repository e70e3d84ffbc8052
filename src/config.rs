use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::archive::{RetryPolicy, TOKEN_ENV_VAR};
use crate::batch::DEFAULT_WORKERS;
use crate::candidates::DEFAULT_ARCHIVE_URL;
use crate::catalog::DEFAULT_CATALOG_URL;
use crate::error::FetchError;

pub const DEFAULT_CONFIG_FILE: &str = "gnss-fetch.json";

/// Run settings. Every field is optional in the JSON file and falls back to
/// the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub archive_url: String,
    pub catalog_url: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub workers: usize,
    pub token_env: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            archive_url: DEFAULT_ARCHIVE_URL.to_string(),
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            timeout_secs: 60,
            max_attempts: 3,
            retry_delay_secs: 5,
            workers: DEFAULT_WORKERS,
            token_env: TOKEN_ENV_VAR.to_string(),
        }
    }
}

impl FetchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: Duration::from_secs(self.retry_delay_secs),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(self) -> Result<Self, FetchError> {
        if self.max_attempts == 0 {
            return Err(FetchError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(FetchError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(FetchError::InvalidConfig(
                "timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.token_env.trim().is_empty() {
            return Err(FetchError::InvalidConfig(
                "token_env must name an environment variable".to_string(),
            ));
        }
        Ok(self)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `gnss-fetch.json` in the current directory when it
    /// exists, or the defaults.
    pub fn resolve(path: Option<&str>) -> Result<FetchConfig, FetchError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return FetchConfig::default().validate();
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| FetchError::ConfigRead(config_path.clone()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<FetchConfig, FetchError> {
        let config: FetchConfig =
            serde_json::from_str(content).map_err(|err| FetchError::ConfigParse(err.to_string()))?;
        config.validate()
    }
}
