//! Walker orchestration: walk, listen and stop.
//!
//! # walk
//! Resume from the cursor (or a later explicit height), resolve the tip once,
//! then run retry-wrapped cycles back to back until the tip is reached or a
//! stop is requested.
//!
//! # listen
//! Jump the cursor to the current tip and run one cycle per poll interval.
//! A failed cycle is logged; the next tick retries the same height.
//!
//! # stop
//! Cancel the poll job, let a walk finish its current cycle, then call the
//! before-quit handler once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chainwalker_core::config::{WalkerConfig, WalkerState};
use chainwalker_core::cycle::CycleProcessor;
use chainwalker_core::error::WalkerError;
use chainwalker_core::handler::{
    BeforeQuitHandler, BlockHandler, HandlerSet, PendingTransactionsHandler, TransactionHandler,
};
use chainwalker_core::ledger::{self, LedgerClient};
use chainwalker_core::progress::{ProgressRecord, ProgressStore};
use chainwalker_core::retry::RetryPolicy;
use chainwalker_core::scheduler::IntervalJob;
use chainwalker_core::types::{WalkContext, WalkMode};

/// Walks and/or listens to the ledger, calling the registered handlers.
///
/// Handlers are called in this order for every block:
/// 1. pending transactions handler
/// 2. transaction handler (once per transaction, newest first)
/// 3. block handler
///
/// and, when stopping, the before-quit handler.
pub struct Walker {
    config: WalkerConfig,
    ledger: Arc<dyn LedgerClient>,
    handlers: RwLock<HandlerSet>,
    store: Arc<tokio::sync::Mutex<ProgressStore>>,
    retry: RetryPolicy,
    state: Mutex<WalkerState>,
    job: Mutex<Option<IntervalJob>>,
    stop_requested: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Walker {
    /// Create a walker reading from `ledger`.
    pub fn new(config: WalkerConfig, ledger: Arc<dyn LedgerClient>) -> Result<Self, WalkerError> {
        config.validate()?;
        Ok(Self {
            store: Arc::new(tokio::sync::Mutex::new(ProgressStore::new(config.cache_file()))),
            retry: RetryPolicy::new(config.retry()),
            config,
            ledger,
            handlers: RwLock::new(HandlerSet::new()),
            state: Mutex::new(WalkerState::Idle),
            job: Mutex::new(None),
            stop_requested: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &WalkerConfig {
        &self.config
    }

    /// The ledger client, e.g. for follow-up queries outside handlers.
    pub fn ledger(&self) -> Arc<dyn LedgerClient> {
        self.ledger.clone()
    }

    pub fn state(&self) -> WalkerState {
        *lock(&self.state)
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Snapshot of the cursor as last read or written by this walker.
    pub async fn progress(&self) -> ProgressRecord {
        self.store.lock().await.record().clone()
    }

    // ─── Handler registration ────────────────────────────────────────────────

    /// Set the block handler. Called after the transaction handler, with the
    /// block's transactions attached.
    pub fn on_block(&self, handler: impl BlockHandler + 'static) -> &Self {
        self.handlers_mut().set_block(Arc::new(handler));
        self
    }

    /// Set the transaction handler, called once for each transaction in a block.
    pub fn on_transaction(&self, handler: impl TransactionHandler + 'static) -> &Self {
        self.handlers_mut().set_transaction(Arc::new(handler));
        self
    }

    /// Set the pending transactions handler.
    ///
    /// It receives all unconfirmed transactions on every cycle; telling new
    /// from already seen ones is the handler's job.
    pub fn on_pending_transactions(
        &self,
        handler: impl PendingTransactionsHandler + 'static,
    ) -> &Self {
        self.handlers_mut().set_pending(Arc::new(handler));
        self
    }

    /// Set the handler called once on `stop`, for cleanups on the caller's side.
    pub fn on_before_quit(&self, handler: impl BeforeQuitHandler + 'static) -> &Self {
        self.handlers_mut().set_before_quit(Arc::new(handler));
        self
    }

    // ─── Operations ──────────────────────────────────────────────────────────

    /// Walk from `start_height` up to the current tip as fast as the handlers allow.
    ///
    /// If the cursor is already past `start_height`, the walk continues from the
    /// cursor instead, so an interrupted walk picks up where it stopped. To
    /// really start from scratch the cursor file has to be reset.
    ///
    /// A failing cycle is retried `max_retries` times before the error is returned.
    pub async fn walk(&self, start_height: Option<u64>) -> Result<(), WalkerError> {
        let handlers = self.data_handlers()?;
        {
            let mut state = lock(&self.state);
            match *state {
                WalkerState::Stopped => {
                    tracing::warn!("walker is stopped, not walking");
                    return Ok(());
                }
                WalkerState::Idle => *state = WalkerState::Walking,
                WalkerState::Walking | WalkerState::Listening => {}
            }
        }

        let result = self.walk_to_tip(start_height, handlers).await;
        let mut state = lock(&self.state);
        if *state == WalkerState::Walking {
            *state = WalkerState::Idle;
        }
        result
    }

    async fn walk_to_tip(
        &self,
        start_height: Option<u64>,
        handlers: HandlerSet,
    ) -> Result<(), WalkerError> {
        let start = {
            let mut store = self.store.lock().await;
            store.read().await?;
            let start = start_height.unwrap_or(0).max(store.last_confirmed_height());
            store.reposition(start);
            store.persist().await?;
            start
        };
        tracing::info!(
            node = self.ledger.endpoint(),
            start,
            "ChainWalker catching up node {} starting at block {start}",
            self.ledger.endpoint()
        );

        let tip = ledger::tip_height(self.ledger.as_ref()).await?;
        let processor = self.processor(handlers, WalkMode::Walk);
        let processor = &processor;

        let mut processed = start;
        while processed < tip && !self.is_stop_requested() {
            let height = self
                .retry
                .run(move |_| async move { processor.run().await?.into_result() })
                .await?;
            if height == processed {
                return Err(WalkerError::Ledger(format!(
                    "block {} below tip {tip} was reported as not found",
                    processed + 1
                )));
            }
            processed = height;
            if processed % 1000 == 0 {
                tracing::info!(height = processed, "Processed block {processed}");
            }
        }

        tracing::info!(height = processed, tip, stopped = self.is_stop_requested(), "walk finished");
        Ok(())
    }

    /// Listen for new blocks, starting at the current tip.
    ///
    /// Returns once the poll job is scheduled. Run [`walk`](Self::walk) first if
    /// the history since the cursor matters: listen skips any backlog.
    pub async fn listen(&self) -> Result<(), WalkerError> {
        let handlers = self.data_handlers()?;
        {
            let mut state = lock(&self.state);
            match *state {
                WalkerState::Listening => {
                    tracing::warn!("Already running");
                    return Ok(());
                }
                WalkerState::Stopped => {
                    tracing::warn!("walker is stopped, not listening");
                    return Ok(());
                }
                WalkerState::Idle | WalkerState::Walking => *state = WalkerState::Listening,
            }
        }

        let job = match self.schedule(handlers).await {
            Ok(job) => job,
            Err(e) => {
                let mut state = lock(&self.state);
                if *state == WalkerState::Listening {
                    *state = WalkerState::Idle;
                }
                return Err(e);
            }
        };

        let raced_stop = {
            let mut slot = lock(&self.job);
            if self.is_stop_requested() {
                Some(job)
            } else {
                *slot = Some(job);
                None
            }
        };
        if let Some(job) = raced_stop {
            job.stop().await;
        }
        Ok(())
    }

    async fn schedule(&self, handlers: HandlerSet) -> Result<IntervalJob, WalkerError> {
        let tip = ledger::tip_height(self.ledger.as_ref()).await?;
        {
            let mut store = self.store.lock().await;
            store.read().await?;
            store.reposition(tip);
            store.persist().await?;
        }

        tracing::info!(
            node = self.ledger.endpoint(),
            tip,
            "ChainWalker is listening to {}...",
            self.ledger.endpoint()
        );

        let processor = Arc::new(self.processor(handlers, WalkMode::Listen));
        Ok(IntervalJob::start("walker", self.config.poll_interval(), move || {
            let processor = processor.clone();
            async move {
                match processor.run().await {
                    Ok(outcome) => {
                        if let Some(e) = outcome.error {
                            tracing::warn!(
                                height = outcome.processed_height + 1,
                                error = %e,
                                "cycle failed, retrying on next tick"
                            );
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "cycle could not update the cursor"),
                }
            }
        }))
    }

    /// Stop walking/listening and call the before-quit handler.
    ///
    /// Idempotent. A walk in progress finishes its current cycle first, and
    /// so does a listen cycle unless the call comes from one of its handlers.
    pub async fn stop(&self) {
        if self.stop_requested.swap(true, Ordering::SeqCst) {
            tracing::debug!("stop already requested");
            return;
        }
        tracing::info!("Shutting down...");

        let job = lock(&self.job).take();
        if let Some(job) = job {
            job.stop().await;
        }

        let previous = std::mem::replace(&mut *lock(&self.state), WalkerState::Stopped);
        let mode = match previous {
            WalkerState::Listening => WalkMode::Listen,
            _ => WalkMode::Walk,
        };

        let handlers = self.handlers_read().clone();
        let ctx = WalkContext::new(self.ledger.clone(), mode);
        if let Err(e) = handlers.dispatch_before_quit(&ctx).await {
            tracing::error!(error = %e, "before-quit handler failed");
        }
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    fn processor(&self, handlers: HandlerSet, mode: WalkMode) -> CycleProcessor {
        CycleProcessor::new(self.ledger.clone(), handlers, self.store.clone(), mode)
            .with_poll_interval(self.config.poll_interval())
    }

    fn data_handlers(&self) -> Result<HandlerSet, WalkerError> {
        let handlers = self.handlers_read().clone();
        if handlers.has_data_handler() {
            Ok(handlers)
        } else {
            Err(WalkerError::no_handler())
        }
    }

    fn handlers_read(&self) -> std::sync::RwLockReadGuard<'_, HandlerSet> {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn handlers_mut(&self) -> std::sync::RwLockWriteGuard<'_, HandlerSet> {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner)
    }
}
