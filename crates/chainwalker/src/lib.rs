//! ChainWalker: walk and listen to the Signum blockchain.
//!
//! Register handlers for blocks, transactions and pending transactions, then
//! either `walk` from a height up to the tip or `listen` for new blocks.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use chainwalker::{handler_fn, Transaction, WalkContext, WalkerBuilder, WalkerError};
//!
//! # async fn run() -> Result<(), WalkerError> {
//! let walker = WalkerBuilder::new()
//!     .node_host("http://localhost:8125")
//!     .build()?;
//!
//! walker.on_transaction(handler_fn(|tx: Transaction, _ctx: WalkContext| async move {
//!     println!("{} from {:?}", tx.id, tx.sender);
//!     Ok::<_, WalkerError>(())
//! }));
//!
//! walker.walk(Some(552_000)).await?;
//! walker.listen().await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod logging;
pub mod signum;
pub mod walker;

pub use builder::WalkerBuilder;
pub use signum::SignumClient;
pub use walker::Walker;

pub use chainwalker_core::{
    handler_fn, BeforeQuitHandler, Block, BlockHandler, CycleOutcome, FnHandler, HandlerSet,
    LedgerClient, MockLedger, PendingTransactionsHandler, ProgressRecord, ProgressStore,
    RetryConfig, RetryPolicy, Transaction, TransactionHandler, WalkContext, WalkMode,
    WalkerConfig, WalkerError, WalkerState,
};
