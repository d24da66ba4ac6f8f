use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use kanal::{unbounded, ReceiveErrorTimeout, Receiver, Sender};
use num_bigint::BigInt;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::error::BatchError;
use crate::payload::Payload;
use crate::planner::Batch;

/// What a worker produced for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchResult {
    /// One value per index of the batch, in index order.
    Completed(Vec<BigInt>),
    Failed(BatchError),
    /// Skipped without running because the run was cancelled or the batch lies
    /// past a failed one.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub batch: Batch,
    pub result: BatchResult,
    pub elapsed: Duration,
}

/// Result of waiting on the pool for one polling interval.
#[derive(Debug)]
pub enum Poll {
    Ready(BatchOutcome),
    Idle,
}

/// Fixed set of worker threads applying a payload to batches.
///
/// Workers share nothing mutable with each other or with the orchestrator:
/// each gets the batch by value and sends its values back over a channel
/// tagged with the batch, so outcomes may arrive in any order.
pub struct WorkerPool<P> {
    pool: ThreadPool,
    threads: Vec<JoinHandle<()>>,
    payload: Arc<P>,
    cancel: CancellationToken,
    cutoff: Arc<AtomicUsize>,
    tx: Sender<BatchOutcome>,
    rx: Receiver<BatchOutcome>,
}

impl<P: Payload + 'static> WorkerPool<P> {
    pub fn new(
        workers: usize,
        payload: Arc<P>,
        cancel: CancellationToken,
    ) -> Result<Self, ThreadPoolBuildError> {
        let mut threads = Vec::with_capacity(workers);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("payload-worker-{i}"))
            .spawn_handler(|worker| {
                let mut builder = thread::Builder::new();
                if let Some(name) = worker.name() {
                    builder = builder.name(name.to_owned());
                }
                if let Some(stack_size) = worker.stack_size() {
                    builder = builder.stack_size(stack_size);
                }
                threads.push(builder.spawn(move || worker.run())?);
                Ok(())
            })
            .build()?;

        let (tx, rx) = unbounded();
        debug!(workers, payload = payload.name(), "Worker pool started");

        Ok(Self {
            pool,
            threads,
            payload,
            cancel,
            cutoff: Arc::new(AtomicUsize::new(usize::MAX)),
            tx,
            rx,
        })
    }

    pub fn workers(&self) -> usize {
        self.threads.len()
    }

    /// Queues a batch. Its outcome is delivered through [`WorkerPool::poll`].
    pub fn submit(&self, batch: Batch) {
        let payload = Arc::clone(&self.payload);
        let cancel = self.cancel.clone();
        let cutoff = Arc::clone(&self.cutoff);
        let tx = self.tx.clone();

        self.pool.spawn(move || {
            let started = Instant::now();
            let skip = cancel.is_cancelled() || batch.ordinal >= cutoff.load(Ordering::Acquire);
            let result = if skip {
                trace!(ordinal = batch.ordinal, "Skipping batch");
                BatchResult::Cancelled
            } else {
                trace!(
                    ordinal = batch.ordinal,
                    start = batch.start,
                    len = batch.len,
                    "Batch started"
                );
                run_batch(payload.as_ref(), batch)
            };

            // The orchestrator drops the receiver once it stops waiting.
            let _ = tx.send(BatchOutcome {
                batch,
                result,
                elapsed: started.elapsed(),
            });
        });
    }

    /// Workers skip every batch at or past `ordinal` that has not started yet.
    pub fn restrict_to(&self, ordinal: usize) {
        self.cutoff.fetch_min(ordinal, Ordering::AcqRel);
    }

    /// Waits up to `timeout` for the next outcome.
    pub fn poll(&self, timeout: Duration) -> Poll {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Poll::Ready(outcome),
            Err(ReceiveErrorTimeout::Timeout) => Poll::Idle,
            // The pool keeps a sender alive, so the channel cannot close under it.
            Err(_) => Poll::Idle,
        }
    }

    /// Outcomes already delivered, without blocking.
    pub fn drain_ready(&self) -> Vec<BatchOutcome> {
        let mut ready = Vec::new();
        while let Ok(Some(outcome)) = self.rx.try_recv() {
            ready.push(outcome);
        }
        ready
    }

    /// Stops the pool.
    ///
    /// With `join` set the worker threads are joined, which only returns once
    /// every running batch has finished. Without it they are detached: they exit
    /// after their current batch and never start another.
    pub fn shutdown(self, join: bool) {
        let WorkerPool { pool, threads, .. } = self;
        drop(pool);

        if !join {
            info!(
                workers = threads.len(),
                "Detached worker threads; in-flight batches are abandoned"
            );
            return;
        }

        for handle in threads {
            let name = handle.thread().name().map(str::to_owned);
            if handle.join().is_err() {
                error!(worker = ?name, "Worker thread panicked");
            }
        }
        debug!("Worker pool joined");
    }
}

/// Applies `payload` to every index of `batch`, stopping at the first failure.
///
/// A panic inside the payload is caught and reported against its index so it
/// only fails this batch.
pub fn run_batch<P: Payload + ?Sized>(payload: &P, batch: Batch) -> BatchResult {
    let mut values = Vec::with_capacity(batch.len as usize);
    for index in batch.range() {
        match panic::catch_unwind(AssertUnwindSafe(|| payload.compute(index))) {
            Ok(Ok(value)) => values.push(value),
            Ok(Err(source)) => return BatchResult::Failed(BatchError::Payload { index, source }),
            Err(panic) => {
                return BatchResult::Failed(BatchError::Panicked {
                    index,
                    message: panic_message(panic.as_ref()),
                })
            }
        }
    }
    BatchResult::Completed(values)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PayloadError;
    use crate::payload::{payload_fn, Identity};
    use crate::planner::plan;

    const POLL: Duration = Duration::from_millis(50);

    fn collect_all<P: Payload + 'static>(pool: &WorkerPool<P>, n: usize) -> Vec<BatchOutcome> {
        let deadline = Instant::now() + Duration::from_secs(30);
        let mut outcomes = Vec::new();
        while outcomes.len() < n {
            assert!(Instant::now() < deadline, "timed out waiting for batches");
            if let Poll::Ready(outcome) = pool.poll(POLL) {
                outcomes.push(outcome);
            }
        }
        outcomes.sort_by_key(|o| o.batch.ordinal);
        outcomes
    }

    #[test]
    fn run_batch_applies_payload_in_order() {
        let batch = Batch {
            ordinal: 0,
            start: 7,
            len: 3,
        };
        let expected: Vec<BigInt> = (7..10u64).map(BigInt::from).collect();
        assert_eq!(
            run_batch(&Identity, batch),
            BatchResult::Completed(expected)
        );
    }

    #[test]
    fn run_batch_reports_failing_index() {
        let payload = payload_fn("fails-at-5", |i| {
            if i == 5 {
                Err(PayloadError::Failed("boom".into()))
            } else {
                Ok(BigInt::from(i))
            }
        });
        let batch = Batch {
            ordinal: 1,
            start: 4,
            len: 4,
        };
        assert_eq!(
            run_batch(&payload, batch),
            BatchResult::Failed(BatchError::Payload {
                index: 5,
                source: PayloadError::Failed("boom".into()),
            })
        );
    }

    #[test]
    fn run_batch_contains_panics() {
        let payload = payload_fn("panics", |i| {
            if i == 2 {
                panic!("index {i} exploded");
            }
            Ok(BigInt::from(i))
        });
        let batch = Batch {
            ordinal: 0,
            start: 0,
            len: 4,
        };
        match run_batch(&payload, batch) {
            BatchResult::Failed(BatchError::Panicked { index, message }) => {
                assert_eq!(index, 2);
                assert_eq!(message, "index 2 exploded");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn pool_runs_every_batch_and_a_failure_stays_local() {
        let payload = payload_fn("fails-at-13", |i| {
            if i == 13 {
                Err(PayloadError::Failed("bad index".into()))
            } else {
                Ok(BigInt::from(i * 2))
            }
        });
        let pool = WorkerPool::new(3, Arc::new(payload), CancellationToken::new()).unwrap();
        assert_eq!(pool.workers(), 3);

        let batches = plan(0, 40, 10).unwrap();
        for batch in &batches {
            pool.submit(*batch);
        }
        let outcomes = collect_all(&pool, batches.len());
        pool.shutdown(true);

        for outcome in &outcomes {
            match (&outcome.result, outcome.batch.ordinal) {
                (BatchResult::Failed(BatchError::Payload { index: 13, .. }), 1) => {}
                (BatchResult::Completed(values), _) => {
                    let expected: Vec<BigInt> =
                        outcome.batch.range().map(|i| BigInt::from(i * 2)).collect();
                    assert_eq!(values, &expected);
                }
                (other, ordinal) => panic!("batch {ordinal}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn cancelled_pool_skips_unstarted_batches() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pool = WorkerPool::new(2, Arc::new(Identity), cancel).unwrap();
        let batches = plan(0, 30, 5).unwrap();
        for batch in &batches {
            pool.submit(*batch);
        }
        let outcomes = collect_all(&pool, batches.len());
        assert!(outcomes.iter().all(|o| o.result == BatchResult::Cancelled));
        assert!(pool.drain_ready().is_empty());
        pool.shutdown(true);
    }

    #[test]
    fn restricted_pool_skips_batches_past_cutoff() {
        let pool = WorkerPool::new(2, Arc::new(Identity), CancellationToken::new()).unwrap();
        pool.restrict_to(2);
        pool.restrict_to(4);
        let batches = plan(0, 50, 10).unwrap();
        for batch in &batches {
            pool.submit(*batch);
        }
        let outcomes = collect_all(&pool, batches.len());
        pool.shutdown(true);

        for outcome in outcomes {
            let skipped = outcome.result == BatchResult::Cancelled;
            assert_eq!(
                skipped,
                outcome.batch.ordinal >= 2,
                "batch {}",
                outcome.batch.ordinal
            );
        }
    }
}
