use num_bigint::BigInt;
use tracing::warn;

use crate::error::BatchError;
use crate::planner::Batch;
use crate::pool::{BatchOutcome, BatchResult};

/// Status of one batch in the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    Pending,
    Completed(Vec<BigInt>),
    Failed(BatchError),
    Cancelled,
}

impl BatchStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, BatchStatus::Pending)
    }
}

/// A batch that produced no values because its payload failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub batch: Batch,
    pub error: BatchError,
}

/// The contiguous values recovered from a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregate {
    /// Values for `start..start + values.len()`.
    pub values: Vec<BigInt>,
    /// Completed batches dropped because they lie past the first gap.
    pub discarded_batches: usize,
    pub failures: Vec<BatchFailure>,
}

/// Reassembles batch outcomes by their position in the plan.
///
/// Outcomes may arrive in any order. [`ResultAggregator::collect`] returns the
/// longest run of completed batches starting at the first one; anything after
/// the first pending, failed or cancelled batch is discarded so the sequence
/// never has holes.
#[derive(Debug)]
pub struct ResultAggregator {
    batches: Vec<Batch>,
    assignment: Vec<BatchStatus>,
    pending: usize,
    // Lowest ordinal still pending.
    frontier: usize,
}

impl ResultAggregator {
    pub fn new(batches: &[Batch]) -> Self {
        debug_assert!(batches.iter().enumerate().all(|(i, b)| b.ordinal == i));
        Self {
            batches: batches.to_vec(),
            assignment: vec![BatchStatus::Pending; batches.len()],
            pending: batches.len(),
            frontier: 0,
        }
    }

    pub fn status(&self, ordinal: usize) -> Option<&BatchStatus> {
        self.assignment.get(ordinal)
    }

    /// Batches without an outcome yet.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// True when every batch before `ordinal` has an outcome.
    pub fn resolved_below(&self, ordinal: usize) -> bool {
        self.frontier >= ordinal
    }

    /// Stores an outcome. Returns the error if the batch failed.
    pub fn record(&mut self, outcome: BatchOutcome) -> Option<BatchError> {
        let ordinal = outcome.batch.ordinal;
        let Some(slot) = self.assignment.get_mut(ordinal) else {
            warn!(ordinal, "Outcome for a batch outside the plan");
            return None;
        };
        if !slot.is_pending() {
            warn!(ordinal, "Duplicate outcome for batch ignored");
            return None;
        }

        let expected = self.batches[ordinal].len;
        let status = match outcome.result {
            BatchResult::Completed(values) if values.len() as u64 == expected => {
                BatchStatus::Completed(values)
            }
            BatchResult::Completed(values) => BatchStatus::Failed(BatchError::LengthMismatch {
                start: outcome.batch.start,
                got: values.len(),
                expected,
            }),
            BatchResult::Failed(error) => BatchStatus::Failed(error),
            BatchResult::Cancelled => BatchStatus::Cancelled,
        };

        let failure = match &status {
            BatchStatus::Failed(error) => Some(error.clone()),
            _ => None,
        };
        *slot = status;
        self.pending -= 1;
        while self
            .assignment
            .get(self.frontier)
            .is_some_and(|status| !status.is_pending())
        {
            self.frontier += 1;
        }
        failure
    }

    /// Consumes the assignment and returns its contiguous completed prefix.
    pub fn collect(self) -> Aggregate {
        let mut aggregate = Aggregate::default();
        let mut contiguous = true;

        for (batch, status) in self.batches.into_iter().zip(self.assignment) {
            match status {
                BatchStatus::Completed(values) if contiguous => aggregate.values.extend(values),
                BatchStatus::Completed(_) => aggregate.discarded_batches += 1,
                BatchStatus::Failed(error) => {
                    contiguous = false;
                    aggregate.failures.push(BatchFailure { batch, error });
                }
                BatchStatus::Pending | BatchStatus::Cancelled => contiguous = false,
            }
        }

        aggregate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PayloadError;
    use crate::planner::plan;
    use std::time::Duration;

    fn completed(batch: Batch) -> BatchOutcome {
        BatchOutcome {
            batch,
            result: BatchResult::Completed(batch.range().map(BigInt::from).collect()),
            elapsed: Duration::ZERO,
        }
    }

    fn values(range: std::ops::Range<u64>) -> Vec<BigInt> {
        range.map(BigInt::from).collect()
    }

    #[test]
    fn reverse_completion_is_reassembled_in_index_order() {
        let batches = plan(0, 23, 5).unwrap();
        let mut aggregator = ResultAggregator::new(&batches);
        for batch in batches.iter().rev() {
            assert!(aggregator.record(completed(*batch)).is_none());
        }
        assert_eq!(aggregator.pending(), 0);

        let aggregate = aggregator.collect();
        assert_eq!(aggregate.values, values(0..23));
        assert_eq!(aggregate.discarded_batches, 0);
    }

    #[test]
    fn prefix_stops_at_first_missing_batch() {
        let batches = plan(0, 30, 10).unwrap();
        let mut aggregator = ResultAggregator::new(&batches);
        aggregator.record(completed(batches[2]));
        aggregator.record(completed(batches[0]));
        assert!(aggregator.resolved_below(1));
        assert!(!aggregator.resolved_below(2));

        let aggregate = aggregator.collect();
        assert_eq!(aggregate.values, values(0..10));
        assert_eq!(aggregate.discarded_batches, 1);
    }

    #[test]
    fn failed_batch_truncates_and_is_reported() {
        let batches = plan(100, 130, 10).unwrap();
        let mut aggregator = ResultAggregator::new(&batches);
        let error = BatchError::Payload {
            index: 115,
            source: PayloadError::Failed("nope".into()),
        };
        aggregator.record(completed(batches[0]));
        let reported = aggregator.record(BatchOutcome {
            batch: batches[1],
            result: BatchResult::Failed(error.clone()),
            elapsed: Duration::ZERO,
        });
        assert_eq!(reported, Some(error.clone()));
        aggregator.record(completed(batches[2]));

        let aggregate = aggregator.collect();
        assert_eq!(aggregate.values, values(100..110));
        assert_eq!(
            aggregate.failures,
            vec![BatchFailure {
                batch: batches[1],
                error
            }]
        );
    }

    #[test]
    fn short_result_counts_as_failure() {
        let batches = plan(0, 4, 4).unwrap();
        let mut aggregator = ResultAggregator::new(&batches);
        let reported = aggregator.record(BatchOutcome {
            batch: batches[0],
            result: BatchResult::Completed(values(0..3)),
            elapsed: Duration::ZERO,
        });
        assert!(matches!(
            reported,
            Some(BatchError::LengthMismatch {
                got: 3,
                expected: 4,
                ..
            })
        ));
        assert!(aggregator.collect().values.is_empty());
    }

    #[test]
    fn cancelled_and_duplicate_outcomes() {
        let batches = plan(0, 20, 10).unwrap();
        let mut aggregator = ResultAggregator::new(&batches);
        aggregator.record(completed(batches[0]));
        aggregator.record(completed(batches[0]));
        aggregator.record(BatchOutcome {
            batch: batches[1],
            result: BatchResult::Cancelled,
            elapsed: Duration::ZERO,
        });
        assert_eq!(aggregator.pending(), 0);
        assert_eq!(aggregator.status(1), Some(&BatchStatus::Cancelled));

        let aggregate = aggregator.collect();
        assert_eq!(aggregate.values, values(0..10));
        assert!(aggregate.failures.is_empty());
    }
}
