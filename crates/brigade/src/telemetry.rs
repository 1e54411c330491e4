//! # Metrics
//!
//! With the `metrics` feature the pool records OpenTelemetry instruments
//! through the global meter provider, under the `brigade` scope. Installing a
//! provider (and an exporter) is left to the application; without one the
//! instruments are no-ops. Without the feature every hook below compiles to
//! nothing.
//!
//! ## Instruments
//!
//! - `jobs_submitted` (counter): jobs submitted across all batches.
//! - `jobs_succeeded` / `jobs_failed` (counters): processed jobs by outcome.
//! - `jobs_unprocessed` (counter): jobs never started because their batch was
//!   cancelled.
//! - `batches_cancelled` (counter): batches that ended early.
//! - `batch_duration` (histogram, ms): submit to finalize.

#[cfg(feature = "metrics")]
use opentelemetry::{
    InstrumentationScope,
    metrics::{Counter, Histogram},
};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(feature = "metrics")]
struct Instruments {
    jobs_submitted: Counter<u64>,
    jobs_succeeded: Counter<u64>,
    jobs_failed: Counter<u64>,
    jobs_unprocessed: Counter<u64>,
    batches_cancelled: Counter<u64>,
    batch_duration_ms: Histogram<f64>,
}

#[cfg(feature = "metrics")]
static INSTRUMENTS: OnceLock<Instruments> = OnceLock::new();

// Built on first use so the application gets a chance to install its meter
// provider before any batch runs.
#[cfg(feature = "metrics")]
fn instruments() -> &'static Instruments {
    INSTRUMENTS.get_or_init(|| {
        let scope = InstrumentationScope::builder("brigade")
            .with_version(env!("CARGO_PKG_VERSION"))
            .build();
        let meter = opentelemetry::global::meter_with_scope(scope);

        Instruments {
            jobs_submitted: meter
                .u64_counter("jobs_submitted")
                .with_description("Total jobs submitted to worker pools")
                .build(),
            jobs_succeeded: meter
                .u64_counter("jobs_succeeded")
                .with_description("Jobs that produced an output")
                .build(),
            jobs_failed: meter
                .u64_counter("jobs_failed")
                .with_description("Jobs that errored, panicked or timed out")
                .build(),
            jobs_unprocessed: meter
                .u64_counter("jobs_unprocessed")
                .with_description("Jobs never started because their batch was cancelled")
                .build(),
            batches_cancelled: meter
                .u64_counter("batches_cancelled")
                .with_description("Batches that ended before every job ran")
                .build(),
            batch_duration_ms: meter
                .f64_histogram("batch_duration")
                .with_unit("ms")
                .with_description("Time from submit to the last worker exiting")
                .build(),
        }
    })
}

// Convenience functions that compile to no-ops when metrics are disabled
#[cfg(feature = "metrics")]
pub fn increment_jobs_submitted(count: u64) {
    instruments().jobs_submitted.add(count, &[]);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_jobs_submitted(_count: u64) {}

#[cfg(feature = "metrics")]
pub fn increment_jobs_succeeded() {
    instruments().jobs_succeeded.add(1, &[]);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_jobs_succeeded() {}

#[cfg(feature = "metrics")]
pub fn increment_jobs_failed() {
    instruments().jobs_failed.add(1, &[]);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_jobs_failed() {}

#[cfg(feature = "metrics")]
pub fn increment_jobs_unprocessed(count: u64) {
    instruments().jobs_unprocessed.add(count, &[]);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_jobs_unprocessed(_count: u64) {}

#[cfg(feature = "metrics")]
pub fn increment_batches_cancelled() {
    instruments().batches_cancelled.add(1, &[]);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_batches_cancelled() {}

#[cfg(feature = "metrics")]
pub fn record_batch_duration(duration_ms: f64) {
    instruments().batch_duration_ms.record(duration_ms, &[]);
}

#[cfg(not(feature = "metrics"))]
pub fn record_batch_duration(_duration_ms: f64) {}
