use std::ops::Range;

use crate::error::PlanError;

/// A contiguous index range submitted to a worker as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Batch {
    /// Position of the batch in its plan.
    pub ordinal: usize,
    pub start: u64,
    pub len: u64,
}

impl Batch {
    pub fn end(&self) -> u64 {
        self.start + self.len
    }

    pub fn range(&self) -> Range<u64> {
        self.start..self.end()
    }
}

/// Splits `[start, end)` into ascending batches of `batch_size` indices; only
/// the last one may be shorter.
///
/// ```
/// use adic_sequence::planner::plan;
/// let batches = plan(10, 25, 6).unwrap();
/// let ranges: Vec<_> = batches.iter().map(|b| b.range()).collect();
/// assert_eq!(ranges, vec![10..16, 16..22, 22..25]);
/// ```
pub fn plan(start: u64, end: u64, batch_size: u64) -> Result<Vec<Batch>, PlanError> {
    if batch_size == 0 {
        return Err(PlanError::ZeroBatchSize);
    }
    if start > end {
        return Err(PlanError::InvertedRange { start, end });
    }

    let total = end - start;
    let count = total.div_ceil(batch_size);
    let batches = (0..count)
        .map(|ordinal| {
            let batch_start = start + ordinal * batch_size;
            Batch {
                ordinal: ordinal as usize,
                start: batch_start,
                len: batch_size.min(end - batch_start),
            }
        })
        .collect();

    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_tiles(start: u64, end: u64, size: u64) {
        let batches = plan(start, end, size).unwrap();
        assert_eq!(batches.len() as u64, (end - start).div_ceil(size));
        assert_eq!(batches.iter().map(|b| b.len).sum::<u64>(), end - start);

        let mut cursor = start;
        for (i, batch) in batches.iter().enumerate() {
            assert_eq!(batch.ordinal, i);
            assert_eq!(batch.start, cursor, "gap or overlap at batch {i}");
            assert!(batch.len > 0);
            cursor = batch.end();
        }
        assert_eq!(cursor, end);

        if let Some(last) = batches.last() {
            let rem = (end - start) % size;
            assert_eq!(last.len, if rem == 0 { size } else { rem });
            assert!(batches[..batches.len() - 1].iter().all(|b| b.len == size));
        }
    }

    #[test]
    fn tiles_every_small_range() {
        for start in 0..12 {
            for end in start..40 {
                for size in 1..9 {
                    assert_tiles(start, end, size);
                }
            }
        }
    }

    #[test]
    fn tiles_large_offsets() {
        assert_tiles(1_000_000_000, 1_000_002_017, 100);
        assert_tiles(u64::MAX - 10, u64::MAX, 3);
    }

    #[test]
    fn empty_range_has_no_batches() {
        assert!(plan(5, 5, 3).unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(plan(0, 10, 0), Err(PlanError::ZeroBatchSize));
        assert_eq!(
            plan(10, 3, 2),
            Err(PlanError::InvertedRange { start: 10, end: 3 })
        );
    }
}
