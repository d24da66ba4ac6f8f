//! # Resumable Sequence Computation
//!
//! This library computes long integer sequences whose terms are expensive,
//! independent functions of their index (for example the 2-adic valuation of
//! a Lucas-style combination of huge Fibonacci numbers), spreads the work over
//! a pool of worker threads and persists progress in checkpoint files so a
//! run that takes hours can be interrupted and resumed.
//!
//! ## Pipeline
//!
//! A run goes through these stages, each in its own module:
//!
//! 1. **`checkpoint::CheckpointStore`** finds the checkpoint with the largest
//!    element count (`output_n=<count>.txt`) and loads it.
//! 2. **`planner::plan`** splits the missing index range into fixed-size
//!    batches.
//! 3. **`pool::WorkerPool`** runs the payload over each batch on a fixed set of
//!    rayon worker threads; outcomes come back over a `kanal` channel in
//!    completion order.
//! 4. **`aggregator::ResultAggregator`** puts outcomes back in index order and
//!    keeps only the contiguous prefix, so a checkpoint never has holes.
//! 5. **`interrupt::InterruptController`** tracks the
//!    `Running -> Draining -> Finalizing -> Done | DonePartial` state machine
//!    that lets Ctrl+C or a failing batch stop the run without losing finished
//!    work.
//! 6. **`checkpoint::CheckpointWriter`** writes the result to a new checkpoint
//!    named by its actual length, via a staging file and a rename.
//!
//! `engine::Engine` ties the stages together. `analysis` reports on a
//! finished checkpoint: where each value occurs, and the elimination check
//! behind the binary's `verify-01` command.
//!
//! ## Payloads
//!
//! `payload::Payload` is the per-index function being parallelized. The
//! crate ships `Lucas2Adic`, `Fibonacci`, `RudinShapiro`, `Paperfolding` and
//! `Identity`; `payload::payload_fn` wraps any closure. The big-integer
//! Fibonacci terms come from 2x2 matrix exponentiation in `math`.
//!
//! ## Errors
//!
//! `error::EngineError` covers what aborts a run: unreadable checkpoints,
//! invalid configuration, I/O failures and worker pool setup. A failing
//! payload only fails its own batch and shortens the checkpoint; it is
//! reported in `engine::RunReport::failures`.
//!
//! ## Usage Example
//! ```rust
//! use adic_sequence::{config::EngineConfig, engine::Engine, payload::Lucas2Adic};
//! use num_bigint::BigInt;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let engine = Engine::new(EngineConfig::new(dir.path()).with_batch_size(2), Lucas2Adic).unwrap();
//! let report = engine.run(5).unwrap();
//! assert!(report.is_complete());
//!
//! let stored = engine.store().load(&report.checkpoint).unwrap();
//! let expected: Vec<BigInt> = [3, 6, 3, 4, 3].into_iter().map(BigInt::from).collect();
//! assert_eq!(stored.values(), expected.as_slice());
//! ```

pub mod aggregator;
pub mod analysis;
pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod error;
pub mod interrupt;
pub mod math;
pub mod payload;
pub mod planner;
pub mod pool;
pub mod sequence;
