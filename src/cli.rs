use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use adic_sequence::analysis::{eliminate_from_three, positions_report, value_positions};
use adic_sequence::checkpoint::{CheckpointNaming, CheckpointStore};
use adic_sequence::config::{resolve_workers, EngineConfig, DEFAULT_BATCH_SIZE};
use adic_sequence::payload::PayloadKind;
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SEPARATORS: &[char] = &['/', '\\'];

/// Command line for the `adic-sequence` binary.
///
/// Every option can also come from the environment or a `.env` file in the
/// working directory.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "adic-sequence",
    version,
    about = "Computes a number-theoretic sequence in parallel, resuming from checkpoints",
    subcommand_negates_reqs = true
)]
pub struct CliArgs {
    /// Total number of sequence values the checkpoint should hold.
    ///
    /// Values already present in the latest checkpoint are reused. Asking for
    /// fewer values than it holds writes a trimmed copy without computing.
    #[arg(required = true)]
    pub count: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Command>,

    /// Per-index function to compute.
    ///
    /// Environment variable: `PAYLOAD`
    #[arg(long, env = "PAYLOAD", value_enum, default_value_t = PayloadKind::Lucas2Adic)]
    pub payload: PayloadKind,

    /// Directory holding checkpoint files.
    ///
    /// Only one run may use a directory at a time.
    ///
    /// Environment variable: `OUTPUT_DIR`
    #[arg(long, env = "OUTPUT_DIR", default_value = ".", global = true)]
    pub output_dir: PathBuf,

    /// Number of worker threads. Defaults to the number of logical CPUs.
    ///
    /// Environment variable: `WORKERS`
    #[arg(short, long, env = "WORKERS")]
    pub workers: Option<usize>,

    /// Indices per batch. A batch is the unit of work and of cancellation.
    ///
    /// Environment variable: `BATCH_SIZE`
    #[arg(long, env = "BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: u64,

    /// How often, in milliseconds, the run checks for Ctrl+C while waiting.
    ///
    /// Environment variable: `POLL_INTERVAL_MS`
    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 250)]
    pub poll_interval_ms: u64,

    /// Checkpoint file name prefix, before `n=<count>`.
    ///
    /// Environment variable: `CHECKPOINT_PREFIX`
    #[arg(long, env = "CHECKPOINT_PREFIX", default_value = "output_", global = true)]
    pub checkpoint_prefix: String,

    /// Checkpoint file name suffix, after `n=<count>`.
    ///
    /// Environment variable: `CHECKPOINT_SUFFIX`
    #[arg(long, env = "CHECKPOINT_SUFFIX", default_value = ".txt", global = true)]
    pub checkpoint_suffix: String,

    /// Log filter used when `RUST_LOG` is not set.
    ///
    /// Environment variable: `LOG_LEVEL`
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,
}

/// Reports over the latest checkpoint instead of computing.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Lists the 1-based positions of every distinct value and saves them
    /// next to the checkpoint as `<prefix>n=<count>_positions<suffix>`.
    Positions,
    /// Removes 3, 4, 5, ... in turn and prints the index each was first
    /// found at, plus a 0/1 flag for a single survivor.
    #[command(name = "verify-01")]
    Verify01,
}

impl CliArgs {
    /// Validated checkpoint naming from the prefix and suffix options.
    pub fn naming(&self) -> anyhow::Result<CheckpointNaming> {
        let (prefix, suffix) = (&self.checkpoint_prefix, &self.checkpoint_suffix);
        if prefix.contains(SEPARATORS) || suffix.contains(SEPARATORS) {
            bail!("prefix and suffix must not contain path separators");
        }
        if suffix.starts_with(|c: char| c.is_ascii_digit()) {
            bail!("checkpoint suffix must not start with a digit");
        }
        Ok(CheckpointNaming::new(prefix.as_str(), suffix.as_str()))
    }

    pub fn store(&self) -> anyhow::Result<CheckpointStore> {
        Ok(CheckpointStore::new(&self.output_dir, self.naming()?))
    }
}

/// Validated settings for one invocation.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub count: u64,
    pub payload: PayloadKind,
    pub engine: EngineConfig,
}

impl TryFrom<CliArgs> for RunSettings {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let Some(count) = args.count else {
            bail!("a target count is required");
        };
        if args.workers == Some(0) {
            bail!("WORKERS must be greater than 0");
        }
        if args.batch_size == 0 {
            bail!("BATCH_SIZE must be greater than 0");
        }
        if args.poll_interval_ms == 0 {
            bail!("POLL_INTERVAL_MS must be greater than 0");
        }
        let naming = args.naming()?;

        let engine = EngineConfig::new(args.output_dir)
            .with_workers(resolve_workers(args.workers))
            .with_batch_size(args.batch_size)
            .with_poll_interval(Duration::from_millis(args.poll_interval_ms))
            .with_naming(naming);

        Ok(Self {
            count,
            payload: args.payload,
            engine,
        })
    }
}

/// Runs a report subcommand against the latest checkpoint in `store` and
/// returns what it prints.
pub fn run_command(command: Command, store: &CheckpointStore) -> anyhow::Result<String> {
    let Some((meta, sequence)) = store.load_latest()? else {
        bail!("no checkpoint found in {}", store.dir().display());
    };
    info!(path = %meta.path.display(), count = meta.count, "Analysing checkpoint");

    match command {
        Command::Positions => {
            let report = positions_report(&value_positions(&sequence));
            let path = store
                .dir()
                .join(store.naming().report_name(meta.count, "positions"));
            fs::write(&path, &report)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Positions report written");
            Ok(report)
        }
        Command::Verify01 => {
            let indexes = eliminate_from_three(&sequence);
            let line: Vec<String> = indexes.iter().map(usize::to_string).collect();
            Ok(format!("{}\n", line.join(" ")))
        }
    }
}

/// Installs the stdout subscriber. `RUST_LOG` overrides `level`.
pub fn init_logging(level: &str) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_thread_names(true))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
