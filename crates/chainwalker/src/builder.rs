//! Fluent builder API for creating walkers.
//!
//! # Example
//!
//! ```rust,no_run
//! use chainwalker::WalkerBuilder;
//!
//! # fn main() -> Result<(), chainwalker::WalkerError> {
//! let walker = WalkerBuilder::new()
//!     .node_host("http://localhost:6876")
//!     .interval_seconds(2)
//!     .max_retries(5)
//!     .cache_path("./walker.cache.json")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use chainwalker_core::config::WalkerConfig;
use chainwalker_core::error::WalkerError;
use chainwalker_core::ledger::LedgerClient;

use crate::logging;
use crate::signum::SignumClient;
use crate::walker::Walker;

/// Fluent builder for [`Walker`].
#[derive(Default)]
pub struct WalkerBuilder {
    config: WalkerConfig,
    ledger: Option<Arc<dyn LedgerClient>>,
}

impl WalkerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration, e.g. one loaded from a file.
    pub fn from_config(config: WalkerConfig) -> Self {
        Self {
            config,
            ledger: None,
        }
    }

    /// Set the Signum node URL.
    pub fn node_host(mut self, host: impl Into<String>) -> Self {
        self.config.node_host = host.into();
        self
    }

    /// Log at trace level instead of info.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    /// Set the listen polling interval in whole seconds.
    pub fn interval_seconds(mut self, seconds: u64) -> Self {
        self.config.poll_interval_ms = seconds.saturating_mul(1_000);
        self
    }

    /// Set the listen polling interval in milliseconds.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Set how often a failing walk cycle is retried before giving up.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set the delay before the first retry.
    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    /// Set the timeout for a single node request.
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = ms;
        self
    }

    /// Set the cursor file location.
    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cache_path = Some(path.into());
        self
    }

    /// Keep the cursor in memory only. Nothing is written to disk.
    pub fn memory_only(mut self) -> Self {
        self.config.cache_path = None;
        self
    }

    /// Use `ledger` instead of an HTTP client for `node_host`.
    ///
    /// Mostly for tests, together with [`MockLedger`](chainwalker_core::MockLedger).
    pub fn ledger(mut self, ledger: Arc<dyn LedgerClient>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Build the configuration without creating a walker.
    pub fn build_config(self) -> WalkerConfig {
        self.config
    }

    /// Validate the configuration, install the log subscriber and create the walker.
    pub fn build(self) -> Result<Walker, WalkerError> {
        self.config.validate()?;
        logging::init(self.config.verbose);

        let ledger = match self.ledger {
            Some(ledger) => ledger,
            None => Arc::new(SignumClient::new(
                &self.config.node_host,
                self.config.request_timeout(),
            )?),
        };
        Walker::new(self.config, ledger)
    }
}
