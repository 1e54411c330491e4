use crate::{Blocking, Completion, Error, JobResult, PoolConfig, WorkerPool};
use core::time::Duration;
use futures::StreamExt;
use portable_atomic::{AtomicUsize, Ordering};
use rand::Rng;
use std::{collections::HashSet, sync::Arc, time::Instant};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

async fn double(job: u64) -> Result<u64, String> {
    Ok(job * 2)
}

async fn run_batch(num_workers: usize, num_jobs: usize) {
    let pool = WorkerPool::new(PoolConfig::new(num_workers), |job: usize| async move {
        tokio::task::yield_now().await;
        Ok::<_, String>(job * 2)
    })
    .unwrap();

    let mut batch = pool.submit(0..num_jobs);
    assert_eq!(batch.len(), num_jobs);

    let mut seen = HashSet::new();
    while let Some(result) = batch.recv().await {
        assert!(
            (1..=num_workers).contains(&result.worker_id),
            "worker id {} out of range",
            result.worker_id
        );
        assert_eq!(result.outcome, Ok(result.index * 2));
        assert!(
            seen.insert(result.index),
            "duplicate result for job {}",
            result.index
        );
    }

    assert_eq!(seen.len(), num_jobs);
    assert_eq!(batch.finalizations(), 1);
    assert_eq!(pool.batches_inflight(), 0);
    // end-of-data is sticky
    assert!(batch.recv().await.is_none());
    assert_eq!(
        batch.wait().await,
        Completion::Finished {
            submitted: num_jobs,
            failed: 0
        }
    );
}

async fn run_random_delays(num_workers: usize, num_jobs: u32) {
    let config = PoolConfig::new(num_workers).with_result_buffer_size(1);
    let pool = WorkerPool::new(config, |job: u32| async move {
        let delay = rand::rng().random_range(0..500);
        sleep(Duration::from_micros(delay)).await;
        Ok::<_, String>(job)
    })
    .unwrap();

    let (results, completion) = pool.run(0..num_jobs).await;
    let indices: HashSet<_> = results.iter().map(|r| r.index).collect();
    assert_eq!(results.len(), num_jobs as usize);
    assert_eq!(indices.len(), num_jobs as usize);
    assert!(!completion.is_cancelled());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_job_yields_exactly_one_result() {
    for num_workers in [1, 3, 10] {
        for num_jobs in [0, 1, 10, 1_000] {
            run_batch(num_workers, num_jobs).await;
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn random_delays_never_lose_or_duplicate_results() {
    for _ in 0..100 {
        run_random_delays(4, 20).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_batch_terminates_immediately() {
    let pool = WorkerPool::new(PoolConfig::new(1), double).unwrap();
    let batch = pool.submit(Vec::<u64>::new());
    assert!(batch.is_empty());

    let (results, completion) = timeout(Duration::from_secs(1), batch.collect_all())
        .await
        .expect("empty batch should complete");
    assert!(results.is_empty());
    assert_eq!(
        completion,
        Completion::Finished {
            submitted: 0,
            failed: 0
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_worker_preserves_submission_order() {
    let pool = WorkerPool::new(PoolConfig::new(1), |job: char| async move {
        Ok::<_, String>(job.to_ascii_uppercase())
    })
    .unwrap();

    let (results, completion) = pool.run(['a', 'b', 'c', 'd', 'e']).await;
    let indices: Vec<_> = results.iter().map(|r| r.index).collect();
    let outputs: Vec<_> = results.into_iter().map(|r| r.outcome.unwrap()).collect();

    assert_eq!(indices, [0, 1, 2, 3, 4]);
    assert_eq!(outputs, ['A', 'B', 'C', 'D', 'E']);
    assert_eq!(completion.processed(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn more_workers_than_jobs() {
    let pool = WorkerPool::new(PoolConfig::new(10), double).unwrap();
    let mut batch = pool.submit([1_u64, 2, 3]);

    let mut count = 0;
    while batch.recv().await.is_some() {
        count += 1;
    }

    assert_eq!(count, 3);
    assert_eq!(batch.finalizations(), 1);
    assert!(!batch.wait().await.is_cancelled());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failing_job_does_not_affect_the_others() {
    let pool = WorkerPool::new(PoolConfig::new(3), |job: u64| async move {
        if job == 3 {
            Err(format!("job {job} is cursed"))
        } else {
            Ok(job * 2)
        }
    })
    .unwrap();

    let (results, completion) = pool.run(1..=5_u64).await;
    assert_eq!(results.len(), 5);

    let faults: Vec<_> = results.iter().filter(|r| r.is_fault()).collect();
    assert_eq!(faults.len(), 1);
    assert_eq!(
        faults[0].outcome,
        Err(Error::JobProcessingFault {
            index: 2,
            worker_id: faults[0].worker_id,
            reason: "job 3 is cursed".into(),
        })
    );

    let mut outputs: Vec<_> = results
        .into_iter()
        .filter_map(|r| r.into_outcome().ok())
        .collect();
    outputs.sort_unstable();
    assert_eq!(outputs, [2, 4, 8, 10]);
    assert_eq!(
        completion,
        Completion::Finished {
            submitted: 5,
            failed: 1
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn panicking_job_becomes_a_fault() {
    let pool = WorkerPool::new(PoolConfig::new(2), |job: u64| async move {
        if job == 2 {
            panic!("job two exploded");
        }
        Ok::<_, String>(job)
    })
    .unwrap();

    let (results, completion) = pool.run(0..6_u64).await;
    assert_eq!(results.len(), 6);

    let fault = results.iter().find(|r| r.is_fault()).unwrap();
    assert_eq!(fault.index, 2);
    let err = fault.outcome.as_ref().unwrap_err();
    assert!(err.is_job_fault());
    assert!(err.to_string().contains("panicked: job two exploded"));
    assert_eq!(completion.failed(), 1);
    assert_eq!(completion.succeeded(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panic_before_the_job_future_is_a_fault() {
    // A single worker: a lost job would strand everything after it.
    let pool = WorkerPool::new(PoolConfig::new(1), |job: u64| {
        if job == 2 {
            panic!("job two rejected up front");
        }
        async move { Ok::<_, String>(job) }
    })
    .unwrap();

    let (results, completion) = pool.run(0..5_u64).await;
    assert_eq!(results.len(), 5);

    let faults: Vec<_> = results.iter().filter(|r| r.is_fault()).collect();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].index, 2);
    assert!(
        faults[0]
            .outcome
            .as_ref()
            .unwrap_err()
            .to_string()
            .contains("panicked: job two rejected up front")
    );
    assert_eq!(
        completion,
        Completion::Finished {
            submitted: 5,
            failed: 1
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn blocking_panic_becomes_a_fault() {
    let processor = Blocking::new(|n: u64| {
        if n == 2 {
            panic!("two");
        }
        Ok::<_, String>(n + 1)
    });
    let pool = WorkerPool::new(PoolConfig::new(2), processor).unwrap();

    let (results, completion) = pool.run(0..4_u64).await;
    let fault = results.iter().find(|r| r.is_fault()).unwrap();
    assert_eq!(fault.index, 2);
    assert!(
        fault
            .outcome
            .as_ref()
            .unwrap_err()
            .to_string()
            .contains("panicked: two")
    );
    assert_eq!(
        completion,
        Completion::Finished {
            submitted: 4,
            failed: 1
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_job_times_out() {
    let config = PoolConfig::new(2).with_job_timeout(Duration::from_millis(50));
    let pool = WorkerPool::new(config, |job: u64| async move {
        if job == 1 {
            sleep(Duration::from_secs(10)).await;
        }
        Ok::<_, String>(job)
    })
    .unwrap();

    let start = Instant::now();
    let (results, completion) = pool.run(0..4_u64).await;
    assert!(start.elapsed() < Duration::from_secs(5));

    let fault = results.iter().find(|r| r.is_fault()).unwrap();
    assert_eq!(fault.index, 1);
    assert!(
        fault
            .outcome
            .as_ref()
            .unwrap_err()
            .to_string()
            .contains("timed out")
    );
    assert_eq!(completion.failed(), 1);
    assert!(!completion.is_cancelled());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn timed_out_blocking_job_keeps_running_detached() {
    let finished = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&finished);
    let processor = Blocking::new(move |job: u64| {
        std::thread::sleep(Duration::from_millis(200));
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>(job)
    });
    let config = PoolConfig::new(1).with_job_timeout(Duration::from_millis(20));
    let pool = WorkerPool::new(config, processor).unwrap();

    let (results, completion) = pool.run([7_u64]).await;
    assert!(results[0].is_fault());
    assert_eq!(completion.failed(), 1);
    // the batch is over, the closure is not
    assert_eq!(finished.load(Ordering::SeqCst), 0);

    timeout(Duration::from_secs(2), async {
        while finished.load(Ordering::SeqCst) == 0 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("detached blocking closure should still complete");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duplicate_jobs_are_processed_independently() {
    let pool = WorkerPool::new(PoolConfig::new(3), double).unwrap();

    let (results, _) = pool.run([7_u64, 7, 7, 7]).await;
    let indices: HashSet<_> = results.iter().map(|r| r.index).collect();

    assert_eq!(results.len(), 4);
    assert_eq!(indices.len(), 4);
    assert!(results.iter().all(|r| r.outcome == Ok(14)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_reports_unprocessed_jobs() {
    let pool = WorkerPool::new(PoolConfig::new(2), |job: u32| async move {
        sleep(Duration::from_millis(5)).await;
        Ok::<_, String>(job)
    })
    .unwrap();

    let mut batch = pool.submit(0..100_u32);
    let mut results: Vec<JobResult<u32>> = Vec::new();
    while let Some(result) = batch.recv().await {
        results.push(result);
        if results.len() == 4 {
            batch.cancel();
        }
    }
    assert!(batch.is_cancelled());

    let completion = batch.wait().await;
    assert!(completion.is_cancelled());
    assert_eq!(completion.processed(), results.len());
    assert!(results.len() >= 4 && results.len() < 100);

    let delivered: HashSet<_> = results.iter().map(|r| r.index).collect();
    let unprocessed = completion.unprocessed();
    assert_eq!(delivered.len() + unprocessed.len(), 100);
    for (index, job) in unprocessed {
        assert!(!delivered.contains(index));
        assert_eq!(*job as usize, *index);
    }

    assert_eq!(
        completion.into_result(),
        Err(Error::Cancelled {
            processed: results.len(),
            unprocessed: 100 - results.len(),
        })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_after_last_result_still_finishes() {
    let pool = WorkerPool::new(PoolConfig::new(2), double).unwrap();

    let mut batch = pool.submit(0..8_u64);
    while batch.recv().await.is_some() {}
    batch.cancel();

    assert_eq!(
        batch.wait().await,
        Completion::Finished {
            submitted: 8,
            failed: 0
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deadline_cancels_the_batch() {
    let config = PoolConfig::new(2).with_deadline(Duration::from_millis(50));
    let pool = WorkerPool::new(config, |job: u32| async move {
        sleep(Duration::from_millis(20)).await;
        Ok::<_, String>(job)
    })
    .unwrap();

    let (results, completion) = pool.run(0..100_u32).await;
    assert!(completion.is_cancelled());
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(results.len() + completion.unprocessed().len(), 100);
    assert!(matches!(
        completion.into_result(),
        Err(Error::Cancelled { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deadline_not_reached_finishes() {
    let config = PoolConfig::new(2).with_deadline(Duration::from_secs(30));
    let pool = WorkerPool::new(config, double).unwrap();

    let start = Instant::now();
    let (results, completion) = pool.run(0..10_u64).await;
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(results.len(), 10);
    assert!(!completion.is_cancelled());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submit_after_shutdown_starts_nothing() {
    let shutdown = CancellationToken::new();
    let pool = WorkerPool::with_shutdown(PoolConfig::new(3), double, shutdown.clone()).unwrap();
    shutdown.cancel();
    assert!(pool.is_shutdown());

    let (results, completion) = pool.run(vec![1_u64, 2, 3]).await;
    assert!(results.is_empty());
    assert_eq!(
        completion,
        Completion::Cancelled {
            submitted: 3,
            processed: 0,
            failed: 0,
            unprocessed: vec![(0, 1), (1, 2), (2, 3)],
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_drains_running_batches() {
    let pool = WorkerPool::new(PoolConfig::new(2), |job: u32| async move {
        sleep(Duration::from_millis(10)).await;
        Ok::<_, String>(job)
    })
    .unwrap();

    let consumer = tokio::spawn(pool.submit(0..1_000_u32).wait());
    sleep(Duration::from_millis(30)).await;

    let remaining = pool.shutdown(Duration::from_secs(2)).await;
    assert_eq!(remaining, 0);
    assert!(pool.is_shutdown());

    let completion = consumer.await.unwrap();
    assert!(completion.is_cancelled());
    assert_eq!(
        completion.processed() + completion.unprocessed().len(),
        1_000
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dropping_the_batch_stops_the_workers() {
    let started = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&started);
    let config = PoolConfig::new(2).with_result_buffer_size(1);
    let pool = WorkerPool::new(config, move |job: u32| {
        counter.fetch_add(1, Ordering::Relaxed);
        async move {
            sleep(Duration::from_millis(1)).await;
            Ok::<_, String>(job)
        }
    })
    .unwrap();

    let batch = pool.submit(0..1_000_u32);
    sleep(Duration::from_millis(20)).await;
    drop(batch);

    timeout(Duration::from_secs(2), async {
        while pool.batches_inflight() > 0 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("workers should exit once the batch is dropped");
    assert!(started.load(Ordering::Relaxed) < 1_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pool_runs_concurrent_batches() {
    let pool = WorkerPool::new(PoolConfig::new(3), double).unwrap();

    let first = pool.submit(0..50_u64);
    let second = pool.submit(100..120_u64);
    assert!(pool.batches_inflight() <= 2);

    let ((a, done_a), (b, done_b)) = tokio::join!(first.collect_all(), second.collect_all());
    assert_eq!(a.len(), 50);
    assert_eq!(b.len(), 20);
    assert!(!done_a.is_cancelled() && !done_b.is_cancelled());
    assert_eq!(pool.batches_inflight(), 0);

    // the pool is reusable
    let (again, _) = pool.run(0..5_u64).await;
    assert_eq!(again.len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batch_is_a_stream() {
    let pool = WorkerPool::new(PoolConfig::new(4), double).unwrap();

    let results: Vec<JobResult<u64>> = pool.submit(1..=20_u64).collect().await;
    let mut outputs: Vec<_> = results.into_iter().map(|r| r.outcome.unwrap()).collect();
    outputs.sort_unstable();

    assert_eq!(outputs, (1..=20).map(|n| n * 2).collect::<Vec<u64>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn workers_run_in_parallel() {
    let pool = WorkerPool::new(PoolConfig::new(4), |job: u32| async move {
        sleep(Duration::from_millis(100)).await;
        Ok::<_, String>(job)
    })
    .unwrap();

    let start = Instant::now();
    let (results, _) = pool.run(0..4_u32).await;
    let elapsed = start.elapsed();

    assert_eq!(results.len(), 4);
    assert!(elapsed < Duration::from_millis(300), "took {elapsed:?}");
}

#[tokio::test]
async fn zero_workers_is_rejected() {
    let err = WorkerPool::new(PoolConfig::new(0), double).err();
    assert!(matches!(err, Some(Error::InvalidConfiguration { .. })));

    let config = PoolConfig::new(2).with_result_buffer_size(0);
    let err = WorkerPool::new(config, double).err();
    assert!(matches!(err, Some(Error::InvalidConfiguration { .. })));
}

#[test]
fn pool_requires_a_runtime() {
    let err = WorkerPool::new(PoolConfig::new(2), double).err();
    assert!(matches!(err, Some(Error::InvalidConfiguration { .. })));
}
