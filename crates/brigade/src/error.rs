//! Error types for the worker pool.
//!
//! This module defines the central `Error` enum, which captures every case a
//! caller of the pool can observe. Only configuration errors and cancellation
//! affect a batch as a whole; a failing job is reported through its own
//! result and never aborts the other workers.
//!
//! ## Error Cases
//! - `InvalidConfiguration`: The pool was built with unusable settings (e.g.
//!   zero workers). No worker is ever started.
//! - `JobProcessingFault`: A single job returned an error, panicked, or timed
//!   out. Carried inside that job's [`JobResult`](crate::JobResult).
//! - `Cancelled`: The batch was stopped before every job was claimed.

/// A result type defaulting to the pool's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for the worker pool.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The pool configuration is unusable.
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    /// Processing one job failed. The rest of the batch is unaffected.
    #[error("Job {index} failed on worker {worker_id}: {reason}")]
    JobProcessingFault {
        index: usize,
        worker_id: usize,
        reason: String,
    },

    /// The batch was cancelled with `unprocessed` jobs never started.
    #[error("Batch cancelled after {processed} jobs ({unprocessed} never started)")]
    Cancelled { processed: usize, unprocessed: usize },
}

impl Error {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error describes a single failed job.
    pub const fn is_job_fault(&self) -> bool {
        matches!(self, Self::JobProcessingFault { .. })
    }

    /// Returns `true` if this error describes a cancelled batch.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
