//! chainwalker-core: foundation for walking and listening to a Signum ledger.
//!
//! # Architecture
//!
//! ```text
//! Walker (walk | listen | stop)
//!     ├── ProgressStore   (resumable cursor, memory or JSON file)
//!     ├── RetryPolicy     (bounded retries around one cycle, walk only)
//!     ├── CycleProcessor  (fetch → sort → dispatch → checkpoint)
//!     ├── IntervalJob     (non-overlapping periodic runs, listen only)
//!     └── HandlerSet      (pending / transaction / block / before-quit)
//! ```

pub mod config;
pub mod cycle;
pub mod error;
pub mod handler;
pub mod ledger;
pub mod mock;
pub mod progress;
pub mod retry;
pub mod scheduler;
pub mod types;

pub use config::{WalkerConfig, WalkerState};
pub use cycle::{CycleOutcome, CycleProcessor};
pub use error::WalkerError;
pub use handler::{
    handler_fn, BeforeQuitHandler, BlockHandler, FnHandler, HandlerSet,
    PendingTransactionsHandler, TransactionHandler,
};
pub use ledger::LedgerClient;
pub use mock::MockLedger;
pub use progress::{ProgressRecord, ProgressStore, ProgressUpdate};
pub use retry::{RetryConfig, RetryPolicy};
pub use scheduler::IntervalJob;
pub use types::{Block, Transaction, WalkContext, WalkMode};
