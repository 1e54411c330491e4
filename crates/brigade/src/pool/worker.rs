use super::state::BatchState;
use crate::{Error, JobResult, Processor, Result};
use core::{any::Any, panic::AssertUnwindSafe, time::Duration};
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A worker's ticket out of the batch.
///
/// Created before the worker task is spawned and moved into it. Whichever way
/// the task ends (returning, unwinding, or being dropped unpolled by a
/// runtime that is shutting down) the ticket is dropped, the worker is
/// counted out of the completion latch, and the last worker out finalizes the
/// batch. Its result sender is dropped only after that, so the result channel
/// cannot close before the completion has been stored.
pub struct Departure<J, O> {
    worker_id: usize,
    state: Arc<BatchState<J>>,
    tx: mpsc::Sender<JobResult<O>>,
}

impl<J, O> Departure<J, O> {
    pub const fn new(
        worker_id: usize,
        state: Arc<BatchState<J>>,
        tx: mpsc::Sender<JobResult<O>>,
    ) -> Self {
        Self {
            worker_id,
            state,
            tx,
        }
    }
}

impl<J, O> Drop for Departure<J, O> {
    fn drop(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::trace!("Worker {} stopped", self.worker_id);
        self.state.depart();
    }
}

/// Worker task: claims jobs from the batch queue until it is exhausted or the
/// batch is cancelled.
///
/// Each claimed job is run through the shared [`Processor`]. Every outcome,
/// including an error, a panic, or a timeout, becomes exactly one
/// [`JobResult`] published on the batch's result channel.
///
/// # Arguments
///
/// - `ticket`: This worker's [`Departure`], holding its id, the shared batch
///   state and its result sender.
/// - `processor`: The processor shared by all workers of the pool.
/// - `job_timeout`: Optional upper bound on a single job.
///
/// # Behavior
///
/// - Checks for cancellation before every claim, so a cancelled batch never
///   starts another job. A job already in flight runs to completion and its
///   result is still delivered.
/// - Waits for room when the result channel is full.
/// - If the consumer dropped the batch, cancels it so the other workers stop
///   too, and exits.
pub async fn worker_loop<J, P>(
    ticket: Departure<J, P::Output>,
    processor: Arc<P>,
    job_timeout: Option<Duration>,
) where
    J: Send + 'static,
    P: Processor<J>,
{
    let worker_id = ticket.worker_id;
    let state = &ticket.state;

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    loop {
        if state.token().is_cancelled() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Worker {worker_id} observed cancellation");
            break;
        }

        let Some((index, job)) = state.queue().claim() else {
            break;
        };

        let outcome = perform(worker_id, index, processor.as_ref(), job, job_timeout).await;
        state.record(outcome.is_ok());

        let result = JobResult {
            index,
            worker_id,
            outcome,
        };
        if let Err(_e) = ticket.tx.send(result).await {
            #[cfg(feature = "tracing")]
            tracing::debug!("Worker {worker_id} lost its consumer, cancelling batch: {_e}");
            state.token().cancel();
            break;
        }
    }
}

async fn perform<J, P>(
    worker_id: usize,
    index: usize,
    processor: &P,
    job: J,
    job_timeout: Option<Duration>,
) -> Result<P::Output>
where
    P: Processor<J>,
{
    // `process` itself may panic before returning a future, so it is called
    // inside the guarded block.
    let fut = AssertUnwindSafe(async move { processor.process(job).await }).catch_unwind();

    let caught = match job_timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(caught) => caught,
            Err(_) => return Err(fault(index, worker_id, format!("timed out after {limit:?}"))),
        },
        None => fut.await,
    };

    match caught {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(fault(index, worker_id, e.to_string())),
        Err(payload) => Err(fault(
            index,
            worker_id,
            format!("panicked: {}", panic_message(&*payload)),
        )),
    }
}

fn fault(index: usize, worker_id: usize, reason: String) -> Error {
    #[cfg(feature = "tracing")]
    tracing::warn!("Worker {worker_id} failed job {index}: {reason}");
    Error::JobProcessingFault {
        index,
        worker_id,
        reason,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic payload")
}
