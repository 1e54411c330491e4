use anyhow::bail;
use brigade::PoolConfig;
use clap::Parser;
use std::time::Duration;

/// Runtime configuration for the `brigade-demo` binary.
///
/// The defaults reproduce the classic walkthrough: three workers draining
/// nine jobs, each of which sleeps for a random delay before doubling its
/// input. Every value can be set on the command line or through the
/// environment (a `.env` file is honored).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "brigade-demo",
    version,
    about = "Fan a batch of jobs out to a bounded pool of workers"
)]
pub struct CliArgs {
    /// Number of worker tasks draining the batch.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = 3)]
    pub num_workers: usize,

    /// Number of jobs to submit. Jobs are numbered `1..=NUM_JOBS`.
    ///
    /// Environment variable: `NUM_JOBS`
    #[arg(long, env = "NUM_JOBS", default_value_t = 9)]
    pub num_jobs: u64,

    /// Upper bound (exclusive) of the simulated work delay, in milliseconds.
    /// Each job sleeps for a random duration below this bound.
    ///
    /// Environment variable: `MAX_DELAY_MS`
    #[arg(long, env = "MAX_DELAY_MS", default_value_t = 1_000)]
    pub max_delay_ms: u64,

    /// Job number that fails instead of producing a result, to show that a
    /// faulty job doesn't disturb the rest of the batch.
    ///
    /// Environment variable: `FAIL_JOB`
    #[arg(long, env = "FAIL_JOB")]
    pub fail_job: Option<u64>,

    /// Cancel the batch once this many milliseconds have passed. Jobs that
    /// were never started are listed at the end.
    ///
    /// Environment variable: `DEADLINE_MS`
    #[arg(long, env = "DEADLINE_MS")]
    pub deadline_ms: Option<u64>,

    /// Fail any single job that takes longer than this many milliseconds.
    ///
    /// Environment variable: `JOB_TIMEOUT_MS`
    #[arg(long, env = "JOB_TIMEOUT_MS")]
    pub job_timeout_ms: Option<u64>,

    /// Capacity of the result buffer between the workers and the printer.
    ///
    /// Environment variable: `RESULT_BUFFER_SIZE`
    #[arg(long, env = "RESULT_BUFFER_SIZE", default_value_t = brigade::DEFAULT_RESULT_BUFFER_SIZE)]
    pub result_buffer_size: usize,
}

#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub pool: PoolConfig,
    pub num_jobs: u64,
    pub max_delay: Duration,
    pub fail_job: Option<u64>,
}

impl TryFrom<CliArgs> for DemoConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        if args.max_delay_ms == 0 {
            bail!("MAX_DELAY_MS must be greater than 0");
        }

        if let Some(job) = args.fail_job {
            if !(1..=args.num_jobs).contains(&job) {
                bail!(
                    "FAIL_JOB ({}) must name one of the submitted jobs (1..={})",
                    job,
                    args.num_jobs
                );
            }
        }

        let mut pool =
            PoolConfig::new(args.num_workers).with_result_buffer_size(args.result_buffer_size);
        if let Some(ms) = args.deadline_ms {
            pool = pool.with_deadline(Duration::from_millis(ms));
        }
        if let Some(ms) = args.job_timeout_ms {
            pool = pool.with_job_timeout(Duration::from_millis(ms));
        }
        pool.validate()?;

        Ok(Self {
            pool,
            num_jobs: args.num_jobs,
            max_delay: Duration::from_millis(args.max_delay_ms),
            fail_job: args.fail_job,
        })
    }
}
