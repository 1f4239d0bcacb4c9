//! Client configuration.
//!
//! Resolution order, later wins: defaults, TOML file, environment, then
//! whatever the command line overrides on the returned value.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::service::StalePolicy;

const ENV_API_URL: &str = "SERVER_MANAGER_API_URL";
const ENV_TIMEOUT: &str = "SERVER_MANAGER_TIMEOUT_SECS";
const ENV_WATCH_INTERVAL: &str = "SERVER_MANAGER_WATCH_INTERVAL_SECS";
const ENV_DROP_STALE: &str = "SERVER_MANAGER_DROP_STALE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the server manager backend.
    pub api_url: String,
    pub timeout_secs: u64,
    pub pool_max_idle_per_host: usize,
    /// Seconds between re-checks in watch mode.
    pub watch_interval_secs: u64,
    /// Discard completions superseded by a newer call of the same kind.
    pub drop_stale_completions: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".into(),
            timeout_secs: 30,
            pool_max_idle_per_host: 5,
            watch_interval_secs: 30,
            drop_stale_completions: false,
        }
    }
}

impl Config {
    /// Load from `path` (or the default location) and the environment.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match Self::resolve_path(path) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.normalize();
        Ok(config)
    }

    /// Parse a TOML config file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Explicit paths are always used; the default location only if it exists.
    fn resolve_path(path: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = path {
            return Some(PathBuf::from(shellexpand::tilde(path).into_owned()));
        }
        let default = default_config_path()?;
        default.exists().then_some(default)
    }

    /// Overlay environment values read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_API_URL) {
            self.api_url = v;
        }
        if let Some(v) = lookup(ENV_TIMEOUT) {
            self.timeout_secs = parse_env(ENV_TIMEOUT, v)?;
        }
        if let Some(v) = lookup(ENV_WATCH_INTERVAL) {
            self.watch_interval_secs = parse_env(ENV_WATCH_INTERVAL, v)?;
        }
        if let Some(v) = lookup(ENV_DROP_STALE) {
            self.drop_stale_completions = match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        key: ENV_DROP_STALE,
                        value: v,
                    })
                }
            };
        }
        Ok(())
    }

    pub fn normalize(&mut self) {
        let trimmed = self.api_url.trim().trim_end_matches('/');
        self.api_url = trimmed.to_string();
    }

    pub fn stale_policy(&self) -> StalePolicy {
        if self.drop_stale_completions {
            StalePolicy::DropStale
        } else {
            StalePolicy::LastCompletionWins
        }
    }
}

/// `<config dir>/server-manager/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("server-manager").join("config.toml"))
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}
