//! Walker configuration and state types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::WalkerError;
use crate::progress::DEFAULT_CACHE_FILE;
use crate::retry::RetryConfig;

/// Configuration for a walker instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkerConfig {
    /// Signum node URL. Best to use a local node:
    /// testnet `http://localhost:6876`, mainnet `http://localhost:8125`.
    pub node_host: String,
    /// Trace-level logging when `true`, info-level otherwise.
    pub verbose: bool,
    /// Polling interval in listen mode (milliseconds).
    pub poll_interval_ms: u64,
    /// Retries for a failing cycle in walk mode before giving up.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub retry_backoff_ms: u64,
    /// Cursor file. `None` (or an empty path) keeps the cursor in memory only.
    pub cache_path: Option<PathBuf>,
    /// Timeout for a single node request (milliseconds).
    pub request_timeout_ms: u64,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            node_host: "http://localhost:8125".into(),
            verbose: false,
            poll_interval_ms: 5_000,
            max_retries: 3,
            retry_backoff_ms: 1_000,
            cache_path: Some(PathBuf::from(DEFAULT_CACHE_FILE)),
            request_timeout_ms: 30_000,
        }
    }
}

impl WalkerConfig {
    /// Load a configuration from a JSON file; missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self, WalkerError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            WalkerError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            WalkerError::Configuration(format!("invalid config {}: {e}", path.display()))
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.retry_backoff_ms),
            ..RetryConfig::default()
        }
    }

    /// The cursor file, or `None` for memory-only mode.
    pub fn cache_file(&self) -> Option<PathBuf> {
        self.cache_path
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
    }

    pub fn validate(&self) -> Result<(), WalkerError> {
        if self.poll_interval_ms == 0 {
            return Err(WalkerError::Configuration(
                "poll interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Runtime state of the walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalkerState {
    /// Not running.
    Idle,
    /// Catching up to the tip.
    Walking,
    /// Polling for new blocks.
    Listening,
    /// Terminated; no further runs.
    Stopped,
}

impl std::fmt::Display for WalkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Walking => write!(f, "walking"),
            Self::Listening => write!(f, "listening"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
