//! In-memory ledger for tests and offline runs.
//!
//! Blocks above the configured tip behave as "not mined yet", so a test can
//! grow the chain by moving the tip forward.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::WalkerError;
use crate::ledger::LedgerClient;
use crate::types::{Block, Transaction};

/// A fixture-backed [`LedgerClient`].
#[derive(Default)]
pub struct MockLedger {
    blocks: Mutex<BTreeMap<u64, Block>>,
    tip: Mutex<Option<u64>>,
    pending: Mutex<Vec<Transaction>>,
    block_failures: AtomicU32,
    pending_failures: AtomicU32,
    requested: Mutex<Vec<u64>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger holding `blocks`; the tip is the highest block.
    pub fn with_blocks(blocks: impl IntoIterator<Item = Block>) -> Self {
        let ledger = Self::new();
        for block in blocks {
            ledger.push_block(block);
        }
        ledger
    }

    /// A block without transactions, handy for filler heights.
    pub fn empty_block(height: u64) -> Block {
        Block {
            id: format!("block-{height}"),
            height,
            timestamp: height,
            number_of_transactions: 0,
            previous_block: height.checked_sub(1).map(|h| format!("block-{h}")),
            generator: None,
            transactions: vec![],
            extra: Default::default(),
        }
    }

    pub fn push_block(&self, block: Block) {
        lock(&self.blocks).insert(block.height, block);
    }

    /// Pin the tip; heights above it report "not found". `None` follows the highest block.
    pub fn set_tip(&self, tip: Option<u64>) {
        *lock(&self.tip) = tip;
    }

    /// The height reported as chain tip.
    pub fn tip(&self) -> Option<u64> {
        let pinned = *lock(&self.tip);
        pinned.or_else(|| lock(&self.blocks).keys().next_back().copied())
    }

    pub fn set_pending(&self, transactions: Vec<Transaction>) {
        *lock(&self.pending) = transactions;
    }

    /// Make the next `n` block-by-height fetches fail with a transient ledger error.
    pub fn fail_block_fetches(&self, n: u32) {
        self.block_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` unconfirmed-transaction fetches fail.
    pub fn fail_pending_fetches(&self, n: u32) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Every explicit height requested so far, in request order.
    pub fn requested_heights(&self) -> Vec<u64> {
        lock(&self.requested).clone()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_block_by_height(
        &self,
        height: Option<u64>,
        include_transactions: bool,
    ) -> Result<Block, WalkerError> {
        let tip = self.tip();
        let block = match height {
            None => {
                let tip = tip.ok_or_else(|| WalkerError::Ledger("mock chain is empty".into()))?;
                lock(&self.blocks)
                    .get(&tip)
                    .cloned()
                    .ok_or_else(|| WalkerError::Ledger(format!("no block stored at tip {tip}")))?
            }
            Some(h) => {
                lock(&self.requested).push(h);
                if Self::take_failure(&self.block_failures) {
                    return Err(WalkerError::Ledger(format!("injected failure fetching block {h}")));
                }
                if tip.map_or(true, |tip| h > tip) {
                    return Err(WalkerError::BlockNotFound { height: h });
                }
                lock(&self.blocks)
                    .get(&h)
                    .cloned()
                    .ok_or(WalkerError::BlockNotFound { height: h })?
            }
        };

        if include_transactions {
            Ok(block)
        } else {
            Ok(Block {
                transactions: vec![],
                ..block
            })
        }
    }

    async fn get_unconfirmed_transactions(&self) -> Result<Vec<Transaction>, WalkerError> {
        if Self::take_failure(&self.pending_failures) {
            return Err(WalkerError::Ledger("injected failure fetching unconfirmed transactions".into()));
        }
        Ok(lock(&self.pending).clone())
    }

    fn endpoint(&self) -> &str {
        "Mock Ledger"
    }
}
