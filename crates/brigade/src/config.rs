use crate::{Error, Result};
use core::time::Duration;

/// Default capacity of the bounded result channel between workers and the
/// consumer of a [`Batch`](crate::Batch).
pub const DEFAULT_RESULT_BUFFER_SIZE: usize = 64;

/// Settings for a [`WorkerPool`](crate::WorkerPool).
///
/// The worker count is fixed for the lifetime of the pool. Every batch
/// submitted to the pool runs on exactly `num_workers` workers, regardless of
/// how many jobs it contains.
///
/// ```
/// use brigade::PoolConfig;
/// use core::time::Duration;
///
/// let config = PoolConfig::new(3)
///     .with_result_buffer_size(16)
///     .with_deadline(Duration::from_secs(30));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of workers spawned per batch.
    pub num_workers: usize,
    /// Capacity of the result channel. Workers wait when it is full, which
    /// gives natural backpressure against a slow consumer.
    pub result_buffer_size: usize,
    /// Upper bound on a single job. A job exceeding it is reported as a
    /// [`Error::JobProcessingFault`] and the worker moves on.
    ///
    /// Timing out drops the job's future. For a [`Blocking`](crate::Blocking)
    /// processor that only detaches the closure: it keeps running on Tokio's
    /// blocking pool, possibly past the end of the batch, while the worker
    /// starts its next job. More than `num_workers` computations can then be
    /// running at once.
    pub job_timeout: Option<Duration>,
    /// Upper bound on a whole batch. When it elapses the batch is cancelled:
    /// in-flight jobs finish, unclaimed jobs are never started.
    pub deadline: Option<Duration>,
}

impl PoolConfig {
    /// Creates a configuration with `num_workers` workers and defaults for
    /// everything else.
    pub const fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            result_buffer_size: DEFAULT_RESULT_BUFFER_SIZE,
            job_timeout: None,
            deadline: None,
        }
    }

    #[must_use]
    pub const fn with_result_buffer_size(mut self, size: usize) -> Self {
        self.result_buffer_size = size;
        self
    }

    #[must_use]
    pub const fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Checks that the configuration can run a batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if:
    /// - `num_workers` is zero.
    /// - `result_buffer_size` is zero.
    /// - `job_timeout` or `deadline` is set to zero.
    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(Error::invalid("num_workers must be greater than 0"));
        }

        if self.result_buffer_size == 0 {
            return Err(Error::invalid("result_buffer_size must be greater than 0"));
        }

        if self.job_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::invalid("job_timeout must be greater than 0"));
        }

        if self.deadline.is_some_and(|d| d.is_zero()) {
            return Err(Error::invalid("deadline must be greater than 0"));
        }

        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}
