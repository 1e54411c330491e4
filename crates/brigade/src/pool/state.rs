use super::{latch::CompletionLatch, queue::JobQueue};
use crate::{Completion, telemetry};
use parking_lot::Mutex;
use portable_atomic::{AtomicUsize, Ordering};
use std::{sync::Arc, time::Instant};
use tokio_util::sync::CancellationToken;

/// Everything the workers of one batch share.
///
/// Besides the job queue and the completion latch, this holds the counters the
/// finalizer turns into a [`Completion`], plus the slot it stores that
/// completion in. The slot is always filled before the result channel closes,
/// so a consumer that has seen end-of-data can take it without waiting.
pub struct BatchState<J> {
    queue: JobQueue<J>,
    latch: CompletionLatch,
    submitted: usize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    token: CancellationToken,
    done: CancellationToken,
    completion: Mutex<Option<Completion<J>>>,
    inflight: Arc<AtomicUsize>,
    started: Instant,
}

impl<J> BatchState<J> {
    pub fn new(
        jobs: impl IntoIterator<Item = J>,
        num_workers: usize,
        token: CancellationToken,
        inflight: Arc<AtomicUsize>,
    ) -> Self {
        let queue = JobQueue::new(jobs);
        let submitted = queue.len();
        inflight.fetch_add(1, Ordering::Relaxed);

        Self {
            queue,
            latch: CompletionLatch::new(num_workers),
            submitted,
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            token,
            done: CancellationToken::new(),
            completion: Mutex::new(None),
            inflight,
            started: Instant::now(),
        }
    }

    pub const fn submitted(&self) -> usize {
        self.submitted
    }

    pub const fn queue(&self) -> &JobQueue<J> {
        &self.queue
    }

    /// Cancelled to stop the batch.
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancelled by the finalizer once every worker has exited.
    pub const fn done(&self) -> &CancellationToken {
        &self.done
    }

    pub fn finalizations(&self) -> usize {
        self.latch.finalizations()
    }

    /// Counts one processed job.
    pub fn record(&self, ok: bool) {
        if ok {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
            telemetry::increment_jobs_succeeded();
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
            telemetry::increment_jobs_failed();
        }
    }

    /// Called exactly once per worker as it exits. The last worker out runs
    /// [`finalize`](Self::finalize).
    pub fn depart(&self) {
        if self.latch.arrive() {
            self.finalize();
        }
    }

    fn finalize(&self) {
        let completion = self.summarize();

        if let Completion::Cancelled {
            ref unprocessed, ..
        } = completion
        {
            #[cfg(feature = "tracing")]
            tracing::info!(
                "Batch cancelled: {} of {} jobs processed, {} never started",
                completion.processed(),
                self.submitted,
                unprocessed.len()
            );
            telemetry::increment_batches_cancelled();
            telemetry::increment_jobs_unprocessed(unprocessed.len() as u64);
        } else {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                "Batch finished: {} jobs processed ({} failed)",
                self.submitted,
                completion.failed()
            );
        }
        telemetry::record_batch_duration(self.started.elapsed().as_secs_f64() * 1_000.0);

        *self.completion.lock() = Some(completion);
        self.inflight.fetch_sub(1, Ordering::Relaxed);
        self.done.cancel();
    }

    fn summarize(&self) -> Completion<J> {
        let unprocessed = self.queue.drain();
        let succeeded = self.succeeded.load(Ordering::Acquire);
        let failed = self.failed.load(Ordering::Acquire);
        let processed = succeeded + failed;

        if processed == self.submitted {
            Completion::Finished {
                submitted: self.submitted,
                failed,
            }
        } else {
            Completion::Cancelled {
                submitted: self.submitted,
                processed,
                failed,
                unprocessed,
            }
        }
    }

    /// Takes the completion stored by the finalizer.
    ///
    /// Only called after the result channel has closed, at which point the
    /// finalizer has run.
    pub fn take_completion(&self) -> Completion<J> {
        self.completion
            .lock()
            .take()
            .unwrap_or_else(|| self.summarize())
    }
}
