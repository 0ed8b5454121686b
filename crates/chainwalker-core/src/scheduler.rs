//! Periodic job runner used by listen mode.
//!
//! The work runs immediately on start and then once per period. A run is
//! always awaited before the next tick is considered, and ticks that fire while
//! a run is in progress are dropped, never queued: after a slow run the next
//! one starts on the following period boundary. Two runs never overlap.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    /// Id of the job whose run is executing on the current task.
    static RUNNING_JOB: u64;
}

/// Handle to a running interval job.
pub struct IntervalJob {
    id: u64,
    name: String,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl IntervalJob {
    /// Spawn `work` on the current Tokio runtime, every `period`.
    ///
    /// `period` must be non-zero.
    pub fn start<F, Fut>(name: impl Into<String>, period: Duration, mut work: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed);
        let name = name.into();
        let (shutdown, mut stopped) = watch::channel(false);
        let job = name.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stopped.changed() => break,
                }
                if *stopped.borrow() {
                    break;
                }
                tracing::trace!(job = %job, "running scheduled task");
                RUNNING_JOB.scope(id, work()).await;
                if drop_missed_tick(&mut ticker).await {
                    tracing::debug!(job = %job, "run overran its period, tick dropped");
                }
            }
            tracing::debug!(job = %job, "scheduled job finished");
        });

        Self {
            id,
            name,
            shutdown,
            handle,
        }
    }

    /// Cancel future runs and wait for an in-flight run to complete.
    ///
    /// Called from within one of this job's own runs, it only cancels: the
    /// loop ends once that run returns.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if RUNNING_JOB.try_with(|running| *running == self.id).unwrap_or(false) {
            tracing::debug!(job = %self.name, "stop requested by the job itself");
            return;
        }
        if let Err(e) = self.handle.await {
            tracing::error!(job = %self.name, error = %e, "scheduled job panicked");
        }
    }
}

/// Consume a tick that became due while the last run was in progress.
async fn drop_missed_tick(ticker: &mut Interval) -> bool {
    tokio::select! {
        biased;
        _ = ticker.tick() => true,
        _ = std::future::ready(()) => false,
    }
}
