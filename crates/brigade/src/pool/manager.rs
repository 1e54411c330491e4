//! Asynchronous worker pool for finite job batches.
//!
//! This module defines the [`WorkerPool`] struct, which runs batches of jobs
//! on a fixed number of Tokio worker tasks. Each batch gets its own claim
//! queue, completion latch and bounded result channel; every batch is linked
//! to the pool's shared [`CancellationToken`] so the pool can be shut down as
//! a whole.

use super::{
    state::BatchState,
    worker::{Departure, worker_loop},
};
use crate::{Batch, Completion, JobResult, PoolConfig, Processor, Result, telemetry};
use core::time::Duration;
use portable_atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::{
    runtime::Handle,
    sync::mpsc,
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;

/// A fixed-size pool of asynchronous workers.
///
/// Submitting a batch spawns `num_workers` workers that drain the batch's
/// jobs, publish one [`JobResult`] per job, and exit once the queue is
/// exhausted. The last worker out closes the batch exactly once.
///
/// ```
/// use brigade::{PoolConfig, WorkerPool};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> brigade::Result<()> {
/// let pool = WorkerPool::new(PoolConfig::new(3), |job: u64| async move {
///     Ok::<_, String>(job * 2)
/// })?;
///
/// let (results, completion) = pool.submit(1..=9).collect_all().await;
/// assert_eq!(results.len(), 9);
/// assert!(!completion.is_cancelled());
/// # Ok(())
/// # }
/// ```
pub struct WorkerPool<P> {
    config: PoolConfig,
    processor: Arc<P>,
    shutdown_token: CancellationToken,
    runtime: Handle,
    inflight: Arc<AtomicUsize>,
}

impl<P> WorkerPool<P> {
    /// Creates a pool running `processor` on `config.num_workers` workers.
    ///
    /// Workers are spawned on the Tokio runtime this is called from.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the configuration is invalid
    /// (see [`PoolConfig::validate`]) or if there is no current Tokio runtime.
    ///
    /// [`Error::InvalidConfiguration`]: crate::Error::InvalidConfiguration
    pub fn new(config: PoolConfig, processor: P) -> Result<Self> {
        Self::with_shutdown(config, processor, CancellationToken::new())
    }

    /// Like [`new`](Self::new), but every batch is cancelled when
    /// `shutdown_token` is.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_shutdown(
        config: PoolConfig,
        processor: P,
        shutdown_token: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| {
            crate::Error::invalid(format!("WorkerPool requires a Tokio runtime: {e}"))
        })?;

        #[cfg(feature = "tracing")]
        tracing::debug!("Worker pool ready with {} workers", config.num_workers);

        Ok(Self {
            config,
            processor: Arc::new(processor),
            shutdown_token,
            runtime,
            inflight: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub const fn num_workers(&self) -> usize {
        self.config.num_workers
    }

    /// Number of batches whose workers have not all exited yet.
    pub fn batches_inflight(&self) -> usize {
        self.inflight.load(Ordering::Relaxed)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Submits a batch of jobs and starts the workers.
    ///
    /// All jobs are queued before the first worker starts. The returned
    /// [`Batch`] yields one result per job in completion order. An empty batch
    /// completes immediately with no results.
    ///
    /// Submitting to a pool that has been shut down returns a batch that is
    /// already cancelled: no job is started and all of them come back in
    /// [`Completion::Cancelled`].
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(workers = self.config.num_workers)))]
    pub fn submit<J, I>(&self, jobs: I) -> Batch<J, P::Output>
    where
        P: Processor<J>,
        J: Send + 'static,
        I: IntoIterator<Item = J>,
    {
        let state = Arc::new(BatchState::new(
            jobs,
            self.config.num_workers,
            self.shutdown_token.child_token(),
            Arc::clone(&self.inflight),
        ));
        let (tx, rx) = mpsc::channel(self.config.result_buffer_size);

        telemetry::increment_jobs_submitted(state.submitted() as u64);
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Submitting {} jobs to {} workers",
            state.submitted(),
            self.config.num_workers
        );

        // Worker ids are 1-based.
        for worker_id in 1..=self.config.num_workers {
            let ticket = Departure::new(worker_id, Arc::clone(&state), tx.clone());
            self.runtime.spawn(worker_loop(
                ticket,
                Arc::clone(&self.processor),
                self.config.job_timeout,
            ));
        }
        // Only the workers may hold senders: the channel closes when the last
        // one exits.
        drop(tx);

        if let Some(deadline) = self.config.deadline {
            self.runtime.spawn(watch_deadline(
                deadline,
                state.token().clone(),
                state.done().clone(),
            ));
        }

        Batch::new(rx, state)
    }

    /// Submits a batch and waits for all of its results.
    pub async fn run<J, I>(&self, jobs: I) -> (Vec<JobResult<P::Output>>, Completion<J>)
    where
        P: Processor<J>,
        J: Send + 'static,
        I: IntoIterator<Item = J>,
    {
        self.submit(jobs).collect_all().await
    }

    /// Gracefully shuts down the pool.
    ///
    /// - Cancels the shared [`CancellationToken`], so every running batch
    ///   stops claiming jobs and later submissions start nothing.
    /// - Waits up to `grace` for running batches to finish their in-flight
    ///   jobs. Their consumers must keep draining results for that to happen.
    ///
    /// Returns the number of batches still running when the grace period
    /// ended (zero on a clean shutdown).
    pub async fn shutdown(&self, grace: Duration) -> usize {
        // === Phase 1: Stop claiming new jobs ===
        #[cfg(feature = "tracing")]
        tracing::info!("Cancelling all batches");
        self.shutdown_token.cancel();

        // === Phase 2: Wait for in-flight jobs to drain ===
        #[cfg(feature = "tracing")]
        tracing::info!("Draining in-flight batches ({} active)", self.batches_inflight());
        let drain_result = timeout(grace, async {
            while self.batches_inflight() > 0 {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        match drain_result {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::info!("Worker pool shutdown complete");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Graceful drain timed out ({} batches still active)",
                    self.batches_inflight()
                );
            }
        }

        self.batches_inflight()
    }
}

/// Cancels a batch once `deadline` elapses, unless it finishes or is cancelled
/// first.
async fn watch_deadline(deadline: Duration, token: CancellationToken, done: CancellationToken) {
    tokio::select! {
        () = sleep(deadline) => {
            #[cfg(feature = "tracing")]
            tracing::info!("Batch deadline of {deadline:?} elapsed, cancelling");
            token.cancel();
        }
        () = done.cancelled() => {}
        () = token.cancelled() => {}
    }
}
