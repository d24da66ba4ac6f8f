use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::checkpoint::CheckpointNaming;
use crate::error::EngineError;

pub const DEFAULT_BATCH_SIZE: u64 = 100;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Settings for one engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding checkpoint files.
    pub output_dir: PathBuf,
    pub naming: CheckpointNaming,
    /// Worker threads in the pool.
    pub workers: usize,
    /// Indices per batch.
    pub batch_size: u64,
    /// Upper bound on how long a cancellation goes unnoticed.
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            naming: CheckpointNaming::default(),
            workers: num_cpus::get().max(1),
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl EngineConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_naming(mut self, naming: CheckpointNaming) -> Self {
        self.naming = naming;
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.workers == 0 {
            return Err(EngineError::Config("workers must be greater than 0".into()));
        }
        if self.batch_size == 0 {
            return Err(EngineError::Config("batch size must be positive".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(EngineError::Config("poll interval must be non-zero".into()));
        }
        Ok(())
    }
}

/// Picks the worker count: the requested value, or hardware concurrency when
/// none was given. Asking for more workers than cores only warns.
pub fn resolve_workers(requested: Option<usize>) -> usize {
    let cores = num_cpus::get().max(1);
    match requested {
        None => cores,
        Some(workers) => {
            if workers > cores {
                warn!(workers, cores, "More workers requested than cores");
            }
            workers
        }
    }
}
