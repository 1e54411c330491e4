#![doc = include_str!("../README.md")]

mod demo;

use brigade::{CancellationToken, Completion, JobResult, WorkerPool};
use clap::Parser;
use demo::config::{CliArgs, DemoConfig};
use demo::telemetry::init_telemetry;
use rand::Rng;
use std::time::Duration;
use tokio::{signal, time::sleep};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = DemoConfig::try_from(args)?;

    let providers = init_telemetry()?;
    log_startup_info(&config);

    let res = run(config).await;

    providers.shutdown();
    res
}

async fn run(config: DemoConfig) -> anyhow::Result<()> {
    let DemoConfig {
        pool: pool_config,
        num_jobs,
        max_delay,
        fail_job,
    } = config;

    let pool = WorkerPool::new(pool_config, move |job: u64| async move {
        let delay = rand::rng().random_range(Duration::ZERO..max_delay);
        sleep(delay).await;

        if fail_job == Some(job) {
            return Err(format!("job {job} refused to cooperate"));
        }
        Ok(job * 2)
    })?;

    println!(
        "Submitting {num_jobs} jobs to {} workers",
        pool.num_workers()
    );
    let mut batch = pool.submit(1..=num_jobs);
    tokio::spawn(cancel_on_signal(batch.cancellation_token()));

    while let Some(result) = batch.recv().await {
        println!("{}", describe(&result));
    }

    let completion = batch.wait().await;
    summarize(&completion);
    completion.into_result()?;

    #[cfg(feature = "tracing")]
    tracing::info!("Demo finished");
    Ok(())
}

/// One line per result, naming the worker that processed the job. The worker
/// is only known once the result comes back.
fn describe(result: &JobResult<u64>) -> String {
    // Jobs are numbered from 1, indices from 0.
    let job = result.index + 1;
    match &result.outcome {
        Ok(doubled) => format!(
            "Worker {} processed job {job} -> {doubled}",
            result.worker_id
        ),
        Err(e) => format!("Worker {} failed job {job}: {e}", result.worker_id),
    }
}

fn summarize(completion: &Completion<u64>) {
    match completion {
        Completion::Finished { submitted, failed } => {
            println!("All {submitted} jobs processed ({failed} failed)");
        }
        Completion::Cancelled {
            submitted,
            processed,
            failed,
            unprocessed,
        } => {
            println!(
                "Batch cancelled: {processed} of {submitted} jobs processed ({failed} failed)"
            );
            let never_started: Vec<_> = unprocessed.iter().map(|(_, job)| *job).collect();
            println!("Never started: {never_started:?}");
        }
    }
}

fn log_startup_info(_config: &DemoConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!("Starting demo with full config: {:#?}", _config);
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting demo with {} workers and {} jobs",
            _config.pool.num_workers,
            _config.num_jobs
        );
    }
}

/// Cancels the batch on Ctrl+C or SIGTERM. Returns early if the batch is
/// cancelled some other way.
async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
        () = token.cancelled() => return,
    }

    println!("Interrupted: cancelling the batch, in-flight jobs will still report");
    token.cancel();
}
