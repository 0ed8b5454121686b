//! Handler traits + the set of registered handlers.
//!
//! Dispatch order within one cycle is fixed: pending transactions, then each
//! transaction of the block, then the block itself.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::error::WalkerError;
use crate::types::{Block, Transaction, WalkContext};

/// Called once per block, after all of its transactions were handled.
///
/// The block carries its full transaction list.
#[async_trait]
pub trait BlockHandler: Send + Sync {
    async fn handle_block(&self, block: &Block, ctx: &WalkContext) -> Result<(), WalkerError>;
}

/// Called once for each transaction of a block, newest first.
#[async_trait]
pub trait TransactionHandler: Send + Sync {
    async fn handle_transaction(
        &self,
        tx: &Transaction,
        ctx: &WalkContext,
    ) -> Result<(), WalkerError>;
}

/// Called on every cycle with the node's current unconfirmed transactions.
///
/// The same transactions are delivered again on later cycles until they are
/// confirmed; tracking what was already seen is up to the handler.
#[async_trait]
pub trait PendingTransactionsHandler: Send + Sync {
    async fn handle_pending(
        &self,
        transactions: &[Transaction],
        ctx: &WalkContext,
    ) -> Result<(), WalkerError>;
}

/// Called once when the walker stops. Close connections etc. here.
#[async_trait]
pub trait BeforeQuitHandler: Send + Sync {
    async fn before_quit(&self, ctx: &WalkContext) -> Result<(), WalkerError>;
}

// ─── Closure adapters ────────────────────────────────────────────────────────

/// Wraps an async closure so it can be registered as any handler kind.
///
/// The closure receives owned clones of the dispatched data.
///
/// ```rust,no_run
/// use chainwalker_core::{handler_fn, Block, WalkContext, WalkerError};
///
/// let on_block = handler_fn(|block: Block, _ctx: WalkContext| async move {
///     println!("block #{}", block.height);
///     Ok::<_, WalkerError>(())
/// });
/// ```
pub struct FnHandler<F>(F);

pub fn handler_fn<F>(f: F) -> FnHandler<F> {
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> BlockHandler for FnHandler<F>
where
    F: Fn(Block, WalkContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), WalkerError>> + Send,
{
    async fn handle_block(&self, block: &Block, ctx: &WalkContext) -> Result<(), WalkerError> {
        (self.0)(block.clone(), ctx.clone()).await
    }
}

#[async_trait]
impl<F, Fut> TransactionHandler for FnHandler<F>
where
    F: Fn(Transaction, WalkContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), WalkerError>> + Send,
{
    async fn handle_transaction(
        &self,
        tx: &Transaction,
        ctx: &WalkContext,
    ) -> Result<(), WalkerError> {
        (self.0)(tx.clone(), ctx.clone()).await
    }
}

#[async_trait]
impl<F, Fut> PendingTransactionsHandler for FnHandler<F>
where
    F: Fn(Vec<Transaction>, WalkContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), WalkerError>> + Send,
{
    async fn handle_pending(
        &self,
        transactions: &[Transaction],
        ctx: &WalkContext,
    ) -> Result<(), WalkerError> {
        (self.0)(transactions.to_vec(), ctx.clone()).await
    }
}

#[async_trait]
impl<F, Fut> BeforeQuitHandler for FnHandler<F>
where
    F: Fn(WalkContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), WalkerError>> + Send,
{
    async fn before_quit(&self, ctx: &WalkContext) -> Result<(), WalkerError> {
        (self.0)(ctx.clone()).await
    }
}

// ─── HandlerSet ──────────────────────────────────────────────────────────────

/// One optional slot per handler kind; registering again replaces the slot.
#[derive(Clone, Default)]
pub struct HandlerSet {
    pending: Option<Arc<dyn PendingTransactionsHandler>>,
    transaction: Option<Arc<dyn TransactionHandler>>,
    block: Option<Arc<dyn BlockHandler>>,
    before_quit: Option<Arc<dyn BeforeQuitHandler>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pending(&mut self, handler: Arc<dyn PendingTransactionsHandler>) {
        self.pending = Some(handler);
    }

    pub fn set_transaction(&mut self, handler: Arc<dyn TransactionHandler>) {
        self.transaction = Some(handler);
    }

    pub fn set_block(&mut self, handler: Arc<dyn BlockHandler>) {
        self.block = Some(handler);
    }

    pub fn set_before_quit(&mut self, handler: Arc<dyn BeforeQuitHandler>) {
        self.before_quit = Some(handler);
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn has_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    pub fn has_block(&self) -> bool {
        self.block.is_some()
    }

    /// Returns `true` if at least one pending/transaction/block handler is set.
    pub fn has_data_handler(&self) -> bool {
        self.has_pending() || self.has_transaction() || self.has_block()
    }

    pub async fn dispatch_pending(
        &self,
        transactions: &[Transaction],
        ctx: &WalkContext,
    ) -> Result<(), WalkerError> {
        match &self.pending {
            Some(h) => h
                .handle_pending(transactions, ctx)
                .await
                .map_err(|e| e.in_handler("pending transactions")),
            None => Ok(()),
        }
    }

    pub async fn dispatch_transaction(
        &self,
        tx: &Transaction,
        ctx: &WalkContext,
    ) -> Result<(), WalkerError> {
        match &self.transaction {
            Some(h) => h
                .handle_transaction(tx, ctx)
                .await
                .map_err(|e| e.in_handler("transaction")),
            None => Ok(()),
        }
    }

    pub async fn dispatch_block(&self, block: &Block, ctx: &WalkContext) -> Result<(), WalkerError> {
        match &self.block {
            Some(h) => h
                .handle_block(block, ctx)
                .await
                .map_err(|e| e.in_handler("block")),
            None => Ok(()),
        }
    }

    pub async fn dispatch_before_quit(&self, ctx: &WalkContext) -> Result<(), WalkerError> {
        match &self.before_quit {
            Some(h) => h.before_quit(ctx).await.map_err(|e| e.in_handler("before quit")),
            None => Ok(()),
        }
    }
}
