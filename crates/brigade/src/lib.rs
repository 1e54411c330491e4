#![doc = include_str!("../README.md")]

mod batch;
mod config;
mod error;
mod pool;
mod processor;
mod telemetry;

pub use crate::batch::*;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::pool::WorkerPool;
pub use crate::processor::*;
// Public re-export so callers can build shutdown tokens without depending on
// `tokio-util` directly.
pub use tokio_util::sync::CancellationToken;
