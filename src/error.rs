//! Error types.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a call to the remote server API.
///
/// Every variant is reported to the user the same way: as a terminal
/// error state carrying [`RemoteError::detail`]. Nothing is retried.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{code} - {message}")]
    Status { code: u16, message: String },
    #[error("invalid response body: {0}")]
    Decode(String),
    #[error("response missing data.{0}")]
    MissingPayload(&'static str),
}

impl RemoteError {
    /// Human-readable description handed to the error state and notifier.
    pub fn detail(&self) -> String {
        self.to_string()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
}
