//! The ledger collaborator: where blocks and unconfirmed transactions come from.

use async_trait::async_trait;

use crate::error::WalkerError;
use crate::types::{Block, Transaction};

/// Trait for reading blocks and unconfirmed transactions from a node.
///
/// Implementations: `SignumClient` (HTTP, in the `chainwalker` crate) and
/// [`MockLedger`](crate::mock::MockLedger) for tests.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetch the block at `height`, or the current tip when `height` is `None`.
    ///
    /// Must fail with [`WalkerError::BlockNotFound`] when the height does not
    /// exist yet, and with any other variant for transport/protocol failures.
    async fn get_block_by_height(
        &self,
        height: Option<u64>,
        include_transactions: bool,
    ) -> Result<Block, WalkerError>;

    /// Fetch the node's current set of unconfirmed transactions.
    async fn get_unconfirmed_transactions(&self) -> Result<Vec<Transaction>, WalkerError>;

    /// Human readable endpoint, used in log lines.
    fn endpoint(&self) -> &str;
}

/// Resolve the current chain tip height.
pub async fn tip_height(ledger: &dyn LedgerClient) -> Result<u64, WalkerError> {
    tracing::trace!(node = ledger.endpoint(), "resolving chain tip");
    match ledger.get_block_by_height(None, false).await {
        Ok(block) => Ok(block.height),
        Err(e) => {
            tracing::error!(node = ledger.endpoint(), error = %e, "node not reachable");
            Err(WalkerError::NodeUnreachable {
                node: ledger.endpoint().to_string(),
                reason: e.to_string(),
            })
        }
    }
}
