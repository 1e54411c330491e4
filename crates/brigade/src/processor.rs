use core::{fmt, future::Future};
use std::sync::Arc;

/// The work a pool's workers perform on each job.
///
/// A processor is shared by every worker of a pool, so it must be `Sync`.
/// Each call handles exactly one job and yields either an output or an error;
/// errors are wrapped into a [`JobProcessingFault`] result by the worker, so a
/// failing job never takes the batch down with it.
///
/// Any async closure `Fn(J) -> impl Future<Output = Result<O, E>>` is a
/// processor:
///
/// ```
/// use brigade::Processor;
///
/// fn assert_processor<P: Processor<u64>>(_: P) {}
///
/// assert_processor(|job: u64| async move { Ok::<_, String>(job * 2) });
/// ```
///
/// [`JobProcessingFault`]: crate::Error::JobProcessingFault
pub trait Processor<J>: Send + Sync + 'static {
    /// The value produced for a successful job.
    type Output: Send + 'static;
    /// The error produced for a failed job.
    type Error: fmt::Display + Send + 'static;

    /// Processes a single job.
    fn process(&self, job: J) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;
}

impl<J, F, Fut, O, E> Processor<J> for F
where
    F: Fn(J) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send,
    O: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    type Output = O;
    type Error = E;

    fn process(&self, job: J) -> impl Future<Output = Result<O, E>> + Send {
        self(job)
    }
}

/// Error returned by a [`Blocking`] processor.
#[derive(Debug, thiserror::Error)]
pub enum BlockingError<E> {
    /// The job itself returned an error.
    #[error("{0}")]
    Job(E),

    /// The blocking task was cancelled before it produced anything, which
    /// only happens while the runtime is shutting down.
    #[error("Blocking task aborted: {0}")]
    Aborted(tokio::task::JoinError),
}

/// Adapts a synchronous, CPU-bound function into a [`Processor`].
///
/// Each job runs on Tokio's blocking thread pool via
/// [`tokio::task::spawn_blocking`], so heavy computation doesn't stall the
/// async workers. A panic inside the function is re-raised in the worker,
/// where it is reported like any other job panic.
///
/// A blocking closure can't be interrupted. If the pool's per-job timeout
/// fires, the worker reports the fault and moves on, but the closure runs to
/// completion on the blocking pool and its output is discarded.
///
/// ```
/// use brigade::{Blocking, Processor};
///
/// fn assert_processor<P: Processor<u64>>(_: P) {}
///
/// assert_processor(Blocking::new(|n: u64| Ok::<_, String>((1..=n).product::<u64>())));
/// ```
pub struct Blocking<F>(Arc<F>);

impl<F> Blocking<F> {
    pub fn new(f: F) -> Self {
        Self(Arc::new(f))
    }
}

impl<F> Clone for Blocking<F> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<J, F, O, E> Processor<J> for Blocking<F>
where
    J: Send + 'static,
    F: Fn(J) -> Result<O, E> + Send + Sync + 'static,
    O: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    type Output = O;
    type Error = BlockingError<E>;

    fn process(&self, job: J) -> impl Future<Output = Result<O, Self::Error>> + Send {
        let f = Arc::clone(&self.0);
        async move {
            match tokio::task::spawn_blocking(move || f(job)).await {
                Ok(res) => res.map_err(BlockingError::Job),
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => Err(BlockingError::Aborted(e)),
            }
        }
    }
}
