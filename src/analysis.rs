//! Reports over a finished sequence.

use std::collections::BTreeMap;
use std::fmt::Write;

use num_bigint::BigInt;

use crate::sequence::Sequence;

/// First value the elimination in [`eliminate_from_three`] looks for.
pub const ELIMINATION_START: u32 = 3;

/// 1-based positions of every distinct value, ordered by value.
///
/// ```
/// use adic_sequence::analysis::value_positions;
/// use adic_sequence::sequence::Sequence;
/// use num_bigint::BigInt;
///
/// let seq: Sequence = [3, 6, 3].into_iter().map(BigInt::from).collect();
/// let positions = value_positions(&seq);
/// assert_eq!(positions[&BigInt::from(3)], vec![1, 3]);
/// ```
pub fn value_positions(sequence: &Sequence) -> BTreeMap<BigInt, Vec<u64>> {
    let mut positions: BTreeMap<BigInt, Vec<u64>> = BTreeMap::new();
    for (position, value) in (1u64..).zip(sequence.values()) {
        positions.entry(value.clone()).or_default().push(position);
    }
    positions
}

/// One `value: [positions]` line per distinct value.
pub fn positions_report(positions: &BTreeMap<BigInt, Vec<u64>>) -> String {
    let mut report = String::new();
    for (value, at) in positions {
        let _ = writeln!(report, "{value}: {at:?}");
    }
    report
}

/// Repeatedly removes the smallest remaining value, starting at 3.
///
/// For `v = 3, 4, 5, ...` while more than one value is left, records the
/// 0-based index of the first `v` in what remains and removes every `v`.
/// Stops at the first `v` that does not occur. If exactly one value survives,
/// a final `0` is appended when it equals the next `v` and `1` otherwise.
pub fn eliminate_from_three(sequence: &Sequence) -> Vec<usize> {
    let mut remaining = sequence.values().to_vec();
    let mut current = BigInt::from(ELIMINATION_START);
    let mut indexes = Vec::new();

    while remaining.len() > 1 {
        let Some(index) = remaining.iter().position(|v| *v == current) else {
            break;
        };
        indexes.push(index);
        remaining.retain(|v| *v != current);
        current += 1;
    }

    if let [last] = remaining.as_slice() {
        indexes.push(if *last == current { 0 } else { 1 });
    }
    indexes
}
