//! The consumer side of a submitted batch.
//!
//! A [`Batch`] is returned by [`WorkerPool::submit`]. It yields one
//! [`JobResult`] per processed job, in completion order, and then signals
//! end-of-data exactly once. After end-of-data the batch's [`Completion`]
//! tells the caller whether every job ran or the batch was cancelled, and
//! hands back any job that was never started.
//!
//! [`WorkerPool::submit`]: crate::WorkerPool::submit

use crate::{Error, Result, pool::BatchState};
use core::{
    pin::Pin,
    task::{Context, Poll},
};
use futures::Stream;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The outcome of processing exactly one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult<O> {
    /// Position of the job in the submitted sequence (zero-based).
    pub index: usize,
    /// The worker (`1..=num_workers`) that processed the job.
    pub worker_id: usize,
    /// The job's output, or a [`Error::JobProcessingFault`].
    pub outcome: Result<O>,
}

impl<O> JobResult<O> {
    pub const fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Returns `true` if the job failed, panicked, or timed out.
    pub const fn is_fault(&self) -> bool {
        self.outcome.is_err()
    }

    pub fn into_outcome(self) -> Result<O> {
        self.outcome
    }
}

/// How a batch terminated.
///
/// A batch is [`Finished`](Self::Finished) when every submitted job produced a
/// result, even if a cancellation request arrived after the last job was
/// claimed. Otherwise it is [`Cancelled`](Self::Cancelled) and `unprocessed`
/// holds every job that no worker ever started, paired with its submission
/// index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<J> {
    Finished {
        submitted: usize,
        failed: usize,
    },
    Cancelled {
        submitted: usize,
        processed: usize,
        failed: usize,
        unprocessed: Vec<(usize, J)>,
    },
}

impl<J> Completion<J> {
    pub const fn submitted(&self) -> usize {
        match self {
            Self::Finished { submitted, .. } | Self::Cancelled { submitted, .. } => *submitted,
        }
    }

    /// Number of jobs that produced a result (successful or not).
    pub const fn processed(&self) -> usize {
        match self {
            Self::Finished { submitted, .. } => *submitted,
            Self::Cancelled { processed, .. } => *processed,
        }
    }

    pub const fn failed(&self) -> usize {
        match self {
            Self::Finished { failed, .. } | Self::Cancelled { failed, .. } => *failed,
        }
    }

    pub const fn succeeded(&self) -> usize {
        self.processed() - self.failed()
    }

    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Jobs that were never started. Empty for a finished batch.
    pub fn unprocessed(&self) -> &[(usize, J)] {
        match self {
            Self::Finished { .. } => &[],
            Self::Cancelled { unprocessed, .. } => unprocessed,
        }
    }

    /// Converts the completion into the number of processed jobs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the batch did not run to the end.
    pub fn into_result(self) -> Result<usize> {
        match self {
            Self::Finished { submitted, .. } => Ok(submitted),
            Self::Cancelled {
                submitted,
                processed,
                ..
            } => Err(Error::Cancelled {
                processed,
                unprocessed: submitted - processed,
            }),
        }
    }
}

/// Handle to a running batch.
///
/// Results are consumed with [`recv`](Self::recv) or through the [`Stream`]
/// implementation. The sequence is finite and not restartable: it ends once
/// every worker has exited, and never before every produced result has been
/// delivered.
///
/// Dropping a batch before draining it cancels the remaining work.
pub struct Batch<J, O> {
    results: mpsc::Receiver<JobResult<O>>,
    state: Arc<BatchState<J>>,
}

impl<J, O> Batch<J, O> {
    pub(crate) const fn new(
        results: mpsc::Receiver<JobResult<O>>,
        state: Arc<BatchState<J>>,
    ) -> Self {
        Self { results, state }
    }

    /// Number of jobs submitted in this batch.
    pub fn len(&self) -> usize {
        self.state.submitted()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receives the next result, or `None` at end-of-data.
    pub async fn recv(&mut self) -> Option<JobResult<O>> {
        self.results.recv().await
    }

    /// Asks the workers to stop claiming jobs.
    ///
    /// Jobs already in flight still complete and are delivered. Jobs not yet
    /// claimed are reported in [`Completion::Cancelled`].
    pub fn cancel(&self) {
        self.state.token().cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.token().is_cancelled()
    }

    /// The token controlling this batch. Cancelling it is equivalent to
    /// calling [`cancel`](Self::cancel).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.state.token().clone()
    }

    /// How many times the batch's end-of-data finalizer ran: `0` while
    /// workers are still running, `1` afterwards.
    pub fn finalizations(&self) -> usize {
        self.state.finalizations()
    }

    /// Drains the remaining results without reading them and returns how the
    /// batch terminated.
    pub async fn wait(mut self) -> Completion<J> {
        while self.results.recv().await.is_some() {}
        self.state.take_completion()
    }

    /// Drains every remaining result and returns them with the batch's
    /// completion.
    pub async fn collect_all(mut self) -> (Vec<JobResult<O>>, Completion<J>) {
        let mut results = Vec::with_capacity(self.len());
        while let Some(result) = self.results.recv().await {
            results.push(result);
        }
        (results, self.state.take_completion())
    }
}

impl<J, O> Stream for Batch<J, O> {
    type Item = JobResult<O>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().results.poll_recv(cx)
    }
}
