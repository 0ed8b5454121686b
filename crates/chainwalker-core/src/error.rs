//! Error types for the chainwalker pipeline.

use thiserror::Error;

/// Errors that can occur while walking or listening.
#[derive(Debug, Error)]
pub enum WalkerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Block {height} not found")]
    BlockNotFound { height: u64 },

    #[error("Handler error in '{handler}': {reason}")]
    Handler { handler: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Node {node} not reachable: {reason}")]
    NodeUnreachable { node: String, reason: String },

    #[error("{0}")]
    Other(String),
}

impl WalkerError {
    /// Error returned by `walk`/`listen` when no data handler is registered.
    pub fn no_handler() -> Self {
        Self::Configuration(
            "No handler set, register a block, transaction or pending transactions handler"
                .into(),
        )
    }

    /// Convenience constructor for handler implementations.
    pub fn handler(handler: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Handler {
            handler: handler.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if the ledger reported that the requested block does not exist yet.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::BlockNotFound { .. })
    }

    /// Returns `true` if repeating the failed cycle may succeed.
    ///
    /// Storage and configuration failures are surfaced to the caller right away.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::Configuration(_))
    }

    /// Tags an error raised inside a handler with the handler kind.
    ///
    /// Errors that already carry a handler name are kept as they are.
    pub(crate) fn in_handler(self, kind: &str) -> Self {
        match self {
            Self::Handler { .. } => self,
            other => Self::Handler {
                handler: kind.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_handler_message() {
        let err = WalkerError::no_handler();
        assert!(err.to_string().contains("No handler set"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn classification() {
        assert!(WalkerError::BlockNotFound { height: 7 }.is_not_found());
        assert!(!WalkerError::Ledger("timeout".into()).is_not_found());
        assert!(WalkerError::Ledger("timeout".into()).is_retryable());
        assert!(WalkerError::handler("block", "boom").is_retryable());
        assert!(!WalkerError::Storage("disk full".into()).is_retryable());
    }

    #[test]
    fn in_handler_keeps_existing_tag() {
        let tagged = WalkerError::handler("accounts", "db down").in_handler("transaction");
        assert_eq!(tagged.to_string(), "Handler error in 'accounts': db down");

        let wrapped = WalkerError::Other("boom".into()).in_handler("block");
        assert_eq!(wrapped.to_string(), "Handler error in 'block': boom");
    }
}
