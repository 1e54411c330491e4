//! The worker pool and the machinery shared by the workers of a batch.
//!
//! ## Structure
//!
//! - [`manager`] - [`WorkerPool`], the entry point that spawns workers.
//! - `worker` - the per-worker claim/process/publish loop.
//! - `queue` - the shared claim queue.
//! - `latch` - the countdown latch that elects the batch finalizer.
//! - `state` - per-batch shared state and the finalize action.

pub mod manager;

mod latch;
mod queue;
mod state;
mod worker;

#[cfg(test)]
mod tests;

pub use manager::WorkerPool;
pub(crate) use state::BatchState;
