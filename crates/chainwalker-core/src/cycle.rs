//! One processing cycle: fetch → sort → dispatch → checkpoint.
//!
//! A cycle works on exactly one height, `last_confirmed_height + 1`:
//!
//! 1. Read the cursor.
//! 2. Deliver unconfirmed transactions (if a pending handler is set).
//! 3. Fetch the next block; "not found" means caught up and ends the cycle.
//! 4. Restrict the block's transactions to the ids still owed from an earlier
//!    partial attempt at the same height.
//! 5. Deliver transactions newest first, crossing each id off as it succeeds.
//! 6. Deliver the block.
//! 7. Persist the cursor, whatever the outcome.
//!
//! Handler and fetch errors become part of the [`CycleOutcome`]; only storage
//! failures escape as `Err`.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::WalkerError;
use crate::handler::HandlerSet;
use crate::ledger::LedgerClient;
use crate::progress::{ProgressStore, ProgressUpdate};
use crate::types::{sort_newest_first, Transaction, WalkContext, WalkMode};

/// Result of a single cycle.
#[derive(Debug)]
pub struct CycleOutcome {
    /// Cursor height after the cycle.
    pub processed_height: u64,
    /// The failure that ended the cycle early, if any.
    pub error: Option<WalkerError>,
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<u64, WalkerError> {
        match self.error {
            None => Ok(self.processed_height),
            Some(e) => Err(e),
        }
    }
}

/// Runs cycles against a shared progress store.
///
/// The store stays locked for the whole cycle, so cycles sharing a store never
/// interleave their read-modify-persist sequences.
pub struct CycleProcessor {
    ledger: Arc<dyn LedgerClient>,
    handlers: HandlerSet,
    store: Arc<Mutex<ProgressStore>>,
    mode: WalkMode,
    poll_interval: Duration,
}

impl CycleProcessor {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        handlers: HandlerSet,
        store: Arc<Mutex<ProgressStore>>,
        mode: WalkMode,
    ) -> Self {
        Self {
            ledger,
            handlers,
            store,
            mode,
            poll_interval: Duration::from_secs(5),
        }
    }

    /// Interval a listen cycle is expected to fit into.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Execute one cycle.
    pub async fn run(&self) -> Result<CycleOutcome, WalkerError> {
        let started = Instant::now();
        tracing::trace!(mode = %self.mode, "starting cycle");

        let mut store = self.store.lock().await;
        store.read().await?;
        let last = store.last_confirmed_height();
        let carried = store.pending_transaction_ids().clone();
        let ctx = WalkContext::new(self.ledger.clone(), self.mode);

        let mut undelivered = carried.clone();
        let step = self.step(last, &carried, &mut undelivered, &ctx).await;
        let (processed_height, error, pending) = match step {
            Ok(Some(height)) => (height, None, BTreeSet::new()),
            Ok(None) => (last, None, carried),
            Err(e) => {
                tracing::error!(height = last + 1, error = %e, "Processing Error: {e}");
                (last, Some(e), undelivered)
            }
        };

        tracing::trace!(
            height = processed_height,
            pending = pending.len(),
            "finalizing cycle, updating cursor"
        );
        store.update(ProgressUpdate {
            last_confirmed_height: Some(processed_height),
            last_error: Some(error.as_ref().map(ToString::to_string).unwrap_or_default()),
            pending_transaction_ids: Some(pending),
        });
        store.persist().await?;
        drop(store);

        let elapsed = started.elapsed();
        if self.mode == WalkMode::Listen && elapsed > self.poll_interval {
            tracing::warn!(
                took_ms = elapsed.as_millis() as u64,
                interval_ms = self.poll_interval.as_millis() as u64,
                "Entire processing cycle took {:.2} seconds, but processing interval is {:.2} seconds.",
                elapsed.as_secs_f64(),
                self.poll_interval.as_secs_f64()
            );
        }
        tracing::trace!(duration_ms = elapsed.as_millis() as u64, "finished cycle");

        Ok(CycleOutcome {
            processed_height,
            error,
        })
    }

    /// Dispatch work for `last + 1`. `Ok(None)` means the block does not exist yet.
    async fn step(
        &self,
        last: u64,
        carried: &BTreeSet<String>,
        undelivered: &mut BTreeSet<String>,
        ctx: &WalkContext,
    ) -> Result<Option<u64>, WalkerError> {
        if self.handlers.has_pending() {
            tracing::trace!("fetching pending transactions");
            let pending = self.ledger.get_unconfirmed_transactions().await?;
            if !pending.is_empty() {
                self.handlers.dispatch_pending(&pending, ctx).await?;
            }
        }

        let next = last + 1;
        tracing::trace!(height = next, "fetching block");
        let block = match self.ledger.get_block_by_height(Some(next), true).await {
            Ok(block) => block,
            Err(e) if e.is_not_found() => {
                tracing::trace!(height = next, "block not found, waiting");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if self.handlers.has_transaction() {
            let mut transactions = select_transactions(&block.transactions, carried);
            tracing::trace!(count = transactions.len(), "processing transactions");
            *undelivered = transactions.iter().map(|tx| tx.id.clone()).collect();
            sort_newest_first(&mut transactions);
            for tx in &transactions {
                tracing::trace!(tx = %tx.id, "calling transaction handler");
                self.handlers.dispatch_transaction(tx, ctx).await?;
                undelivered.remove(&tx.id);
            }
        }

        if self.handlers.has_block() {
            tracing::trace!(height = block.height, "calling block handler");
            self.handlers.dispatch_block(&block, ctx).await?;
        }

        Ok(Some(block.height))
    }
}

/// The transactions to deliver for a block.
///
/// An empty `owed` set selects everything; otherwise only the ids left over
/// from an earlier partial attempt at the same height are selected.
pub fn select_transactions(transactions: &[Transaction], owed: &BTreeSet<String>) -> Vec<Transaction> {
    transactions
        .iter()
        .filter(|tx| owed.is_empty() || owed.contains(&tx.id))
        .cloned()
        .collect()
}
