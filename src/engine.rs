use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::aggregator::{Aggregate, BatchFailure, ResultAggregator};
use crate::checkpoint::{CheckpointMeta, CheckpointStore};
use crate::config::EngineConfig;
use crate::error::{CheckpointError, EngineError};
use crate::interrupt::{cancel_on_shutdown_signal, InterruptController, RunState, StopReason};
use crate::payload::Payload;
use crate::planner::{plan, Batch};
use crate::pool::{BatchOutcome, BatchResult, Poll, WorkerPool};
use crate::sequence::Sequence;

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub requested: u64,
    /// Values taken from the latest checkpoint.
    pub loaded: u64,
    /// Length of the checkpoint written by this run.
    pub achieved: u64,
    /// Values computed by this run that made it into the checkpoint.
    pub computed: u64,
    pub status: RunState,
    pub stop_reason: Option<StopReason>,
    pub checkpoint: CheckpointMeta,
    pub failures: Vec<BatchFailure>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.status == RunState::Done
    }
}

/// Extends the latest checkpoint to a requested length.
///
/// ```no_run
/// use adic_sequence::{config::EngineConfig, engine::Engine, payload::Identity};
/// let engine = Engine::new(EngineConfig::new("results").with_batch_size(2), Identity)?;
/// let report = engine.run(5)?;
/// assert_eq!(report.checkpoint.count, 5);
/// # Ok::<(), adic_sequence::error::EngineError>(())
/// ```
pub struct Engine<P> {
    config: EngineConfig,
    payload: Arc<P>,
    cancel: CancellationToken,
}

impl<P> Clone for Engine<P> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            payload: Arc::clone(&self.payload),
            cancel: self.cancel.clone(),
        }
    }
}

impl<P: Payload + 'static> Engine<P> {
    pub fn new(config: EngineConfig, payload: P) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config,
            payload: Arc::new(payload),
            cancel: CancellationToken::new(),
        })
    }

    /// Uses `cancel` instead of a private token, so callers can stop runs.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The token that stops runs of this engine and its clones.
    ///
    /// Cancellation is permanent. A cancelled engine finishes the current run
    /// as a partial one, and every later `run` stops before computing anything
    /// and only rewrites the values it loaded. Build a new engine, or pass a
    /// fresh token to [`Engine::with_cancel_token`], to compute again.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn store(&self) -> CheckpointStore {
        CheckpointStore::new(self.config.output_dir.clone(), self.config.naming.clone())
    }

    /// Runs to `requested` values and writes exactly one new checkpoint.
    ///
    /// Blocks until the checkpoint is written. Interruption and failed batches
    /// shorten the checkpoint instead of failing the run; only an unreadable
    /// checkpoint, bad configuration or I/O errors are returned as errors.
    pub fn run(&self, requested: u64) -> Result<RunReport, EngineError> {
        let started = Instant::now();
        let store = self.store();
        info!(
            requested,
            payload = self.payload.name(),
            workers = self.config.workers,
            batch_size = self.config.batch_size,
            dir = %store.dir().display(),
            "Starting run"
        );

        let sequence = load_latest(&store)?;
        self.run_from(&store, sequence, requested, started)
    }

    fn run_from(
        &self,
        store: &CheckpointStore,
        mut sequence: Sequence,
        requested: u64,
        started: Instant,
    ) -> Result<RunReport, EngineError> {
        let loaded = sequence.len();

        if requested <= loaded {
            info!(
                loaded,
                requested, "Checkpoint already holds enough values, no computation needed"
            );
            sequence.truncate(requested);
            let checkpoint = store.writer().write(&sequence)?;
            return Ok(RunReport {
                requested,
                loaded,
                achieved: requested,
                computed: 0,
                status: RunState::Done,
                stop_reason: None,
                checkpoint,
                failures: Vec::new(),
                elapsed: started.elapsed(),
            });
        }

        let batches = plan(loaded, requested, self.config.batch_size)?;
        debug!(
            batches = batches.len(),
            start = loaded,
            end = requested,
            "Planned batches"
        );

        let (aggregate, mut controller) = self.compute(&batches)?;
        let computed = aggregate.values.len() as u64;
        if aggregate.discarded_batches > 0 {
            warn!(
                discarded = aggregate.discarded_batches,
                "Completed batches past the first gap were discarded"
            );
        }
        sequence.extend(aggregate.values);

        let achieved = sequence.len();
        let checkpoint = store.writer().write(&sequence)?;
        let status = controller.finish(achieved, requested);

        let report = RunReport {
            requested,
            loaded,
            achieved,
            computed,
            status,
            stop_reason: controller.stop_reason(),
            checkpoint,
            failures: aggregate.failures,
            elapsed: started.elapsed(),
        };

        if report.is_complete() {
            info!(
                achieved,
                computed,
                elapsed_secs = report.elapsed.as_secs_f64(),
                path = %report.checkpoint.path.display(),
                "Run finished"
            );
        } else {
            warn!(
                achieved,
                requested,
                computed,
                failures = report.failures.len(),
                reason = ?report.stop_reason,
                elapsed_secs = report.elapsed.as_secs_f64(),
                path = %report.checkpoint.path.display(),
                "Run finished early, partial checkpoint written"
            );
        }

        Ok(report)
    }

    /// Runs on the blocking pool and cancels the run on Ctrl+C or SIGTERM.
    ///
    /// The salvaged checkpoint is written before this returns.
    pub async fn run_until_ctrl_c(self, requested: u64) -> Result<RunReport, EngineError> {
        let watcher = tokio::spawn(cancel_on_shutdown_signal(self.cancel.clone()));
        let outcome = tokio::task::spawn_blocking(move || self.run(requested)).await;
        watcher.abort();
        let report = outcome??;
        Ok(report)
    }

    fn compute(&self, batches: &[Batch]) -> Result<(Aggregate, InterruptController), EngineError> {
        let total = batches.len();
        let window = self.config.workers.saturating_mul(2);
        let mut controller = InterruptController::new(self.cancel.clone());
        let mut aggregator = ResultAggregator::new(batches);
        let pool = WorkerPool::new(
            self.config.workers,
            Arc::clone(&self.payload),
            self.cancel.clone(),
        )?;

        let mut submitted = 0;
        loop {
            if controller.check_cancelled() {
                break;
            }

            while controller.accepts_submissions()
                && submitted < total
                && in_flight(submitted, total, &aggregator) < window
            {
                pool.submit(batches[submitted]);
                submitted += 1;
            }

            if aggregator.resolved_below(controller.wait_bound(total)) {
                break;
            }

            if let Poll::Ready(outcome) = pool.poll(self.config.poll_interval) {
                handle_outcome(&pool, &mut controller, &mut aggregator, outcome, total);
            }
        }

        controller.begin_finalizing();
        for outcome in pool.drain_ready() {
            handle_outcome(&pool, &mut controller, &mut aggregator, outcome, total);
        }

        let abandoned = in_flight(submitted, total, &aggregator);
        if abandoned > 0 {
            debug!(abandoned, "Not waiting for in-flight batches");
        }
        pool.shutdown(abandoned == 0);

        Ok((aggregator.collect(), controller))
    }
}

fn load_latest(store: &CheckpointStore) -> Result<Sequence, EngineError> {
    let Some(meta) = store.locate_latest()? else {
        info!("No checkpoint found, starting from index 0");
        return Ok(Sequence::new());
    };
    load_or_empty(store, &meta)
}

/// Loads `meta`, treating a checkpoint that disappeared since it was located
/// as no checkpoint at all.
fn load_or_empty(store: &CheckpointStore, meta: &CheckpointMeta) -> Result<Sequence, EngineError> {
    match store.load(meta) {
        Ok(sequence) => {
            if sequence.len() != meta.count {
                warn!(
                    path = %meta.path.display(),
                    named = meta.count,
                    parsed = sequence.len(),
                    "Checkpoint name disagrees with its content, using the parsed values"
                );
            }
            Ok(sequence)
        }
        Err(CheckpointError::Missing { path }) => {
            warn!(
                path = %path.display(),
                "Checkpoint vanished before loading, starting from index 0"
            );
            Ok(Sequence::new())
        }
        Err(e) => Err(e.into()),
    }
}

fn in_flight(submitted: usize, total: usize, aggregator: &ResultAggregator) -> usize {
    let resolved = total - aggregator.pending();
    submitted.saturating_sub(resolved)
}

fn handle_outcome<P: Payload + 'static>(
    pool: &WorkerPool<P>,
    controller: &mut InterruptController,
    aggregator: &mut ResultAggregator,
    outcome: BatchOutcome,
    total: usize,
) {
    let batch = outcome.batch;
    let elapsed = outcome.elapsed;
    let skipped = matches!(outcome.result, BatchResult::Cancelled);

    match aggregator.record(outcome) {
        Some(e) => {
            error!(
                ordinal = batch.ordinal,
                start = batch.start,
                end = batch.end(),
                error = %e,
                "Batch failed"
            );
            let cutoff = controller.batch_failed(batch.ordinal);
            pool.restrict_to(cutoff);
        }
        None if skipped => debug!(ordinal = batch.ordinal, "Batch skipped"),
        None => info!(
            batch = batch.ordinal + 1,
            of = total,
            start = batch.start,
            end = batch.end(),
            elapsed_secs = elapsed.as_secs_f64(),
            "Batch completed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PayloadError;
    use crate::payload::{payload_fn, Identity};
    use num_bigint::BigInt;
    use std::fs;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> EngineConfig {
        EngineConfig::new(dir.path())
            .with_workers(2)
            .with_batch_size(2)
            .with_poll_interval(Duration::from_millis(20))
    }

    #[test]
    fn rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Engine::new(config(&dir).with_batch_size(0), Identity),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn failure_truncates_to_batches_before_it() {
        let dir = TempDir::new().unwrap();
        let payload = payload_fn("fails-at-7", |i| {
            if i == 7 {
                Err(PayloadError::Failed("unlucky".into()))
            } else {
                Ok(BigInt::from(i))
            }
        });
        let engine = Engine::new(config(&dir), payload).unwrap();

        let report = engine.run(20).unwrap();
        assert_eq!(report.status, RunState::DonePartial);
        assert_eq!(
            report.stop_reason,
            Some(StopReason::BatchFailure { ordinal: 3 })
        );
        assert_eq!(report.achieved, 6);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].batch.start, 6);
        assert_eq!(
            fs::read_to_string(dir.path().join("output_n=6.txt")).unwrap(),
            "0 1 2 3 4 5"
        );
    }

    #[test]
    fn cancelled_before_start_keeps_loaded_values() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::new(config(&dir), Identity).unwrap();
        engine.run(4).unwrap();

        engine.cancel_token().cancel();
        let report = engine.run(10).unwrap();
        assert_eq!(report.status, RunState::DonePartial);
        assert_eq!(report.stop_reason, Some(StopReason::Cancelled));
        assert_eq!(report.loaded, 4);
        assert_eq!(report.achieved, 4);
        assert_eq!(report.checkpoint.path, dir.path().join("output_n=4.txt"));

        let again = engine.run(10).unwrap();
        assert_eq!(again.stop_reason, Some(StopReason::Cancelled));
        assert_eq!(again.computed, 0);

        let fresh = engine.with_cancel_token(CancellationToken::new());
        assert!(fresh.run(10).unwrap().is_complete());
    }

    #[test]
    fn vanished_checkpoint_restarts_from_zero() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::new(config(&dir), Identity).unwrap();
        let store = engine.store();
        let gone = CheckpointMeta {
            count: 9,
            path: dir.path().join("output_n=9.txt"),
        };

        let sequence = load_or_empty(&store, &gone).unwrap();
        assert!(sequence.is_empty());

        let report = engine
            .run_from(&store, sequence, 5, Instant::now())
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.loaded, 0);
        assert_eq!(report.computed, 5);
        assert_eq!(
            fs::read_to_string(dir.path().join("output_n=5.txt")).unwrap(),
            "0 1 2 3 4"
        );
    }

    #[test]
    fn unreadable_checkpoint_is_not_treated_as_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("output_n=2.txt");
        fs::write(&path, "1 oops").unwrap();
        let store = CheckpointStore::new(dir.path(), Default::default());

        let err = load_or_empty(&store, &CheckpointMeta { count: 2, path }).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Checkpoint(CheckpointError::Corrupt { .. })
        ));
    }

    #[test]
    fn name_mismatch_trusts_content() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("output_n=5.txt"), "0 1 2").unwrap();
        let engine = Engine::new(config(&dir), Identity).unwrap();

        let report = engine.run(4).unwrap();
        assert_eq!(report.loaded, 3);
        assert_eq!(report.computed, 1);
        assert_eq!(
            fs::read_to_string(dir.path().join("output_n=4.txt")).unwrap(),
            "0 1 2 3"
        );
    }
}
