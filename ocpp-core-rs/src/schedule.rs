//! Periodic background work
//!
//! Each [`PeriodicTask`] owns one interval timer and a one-permit semaphore.
//! A tick that finds the previous cycle still running is skipped instead of
//! queued.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct Counters {
    runs: AtomicU64,
    skipped: AtomicU64,
}

/// Handle to a running periodic task; stops the task when dropped
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    counters: Arc<Counters>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Start running `job` every `period`, first cycle immediately
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, job: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let counters = Arc::new(Counters::default());
        let cancel = CancellationToken::new();
        let permit = Arc::new(Semaphore::new(1));
        let job = Arc::new(job);

        let token = cancel.clone();
        let stats = Arc::clone(&counters);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Ok(guard) = Arc::clone(&permit).try_acquire_owned() else {
                            stats.skipped.fetch_add(1, Ordering::Relaxed);
                            debug!("{}: previous cycle still running, skipping", name);
                            continue;
                        };
                        stats.runs.fetch_add(1, Ordering::Relaxed);
                        let job = Arc::clone(&job);
                        tokio::spawn(async move {
                            (*job)().await;
                            drop(guard);
                        });
                    }
                }
            }
            debug!("{}: stopped", name);
        });

        info!("{}: every {:?}", name, period);
        Self {
            name,
            counters,
            cancel,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Cycles started so far
    pub fn runs(&self) -> u64 {
        self.counters.runs.load(Ordering::Relaxed)
    }

    /// Ticks dropped because a cycle was still running
    pub fn skipped(&self) -> u64 {
        self.counters.skipped.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
