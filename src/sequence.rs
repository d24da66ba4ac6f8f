use num_bigint::BigInt;

/// Values for indices `0..len()`, with no gaps.
///
/// Only the orchestrating thread owns a `Sequence`; workers hand back plain
/// vectors that are appended once they are known to extend the prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sequence {
    values: Vec<BigInt>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> u64 {
        self.values.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[BigInt] {
        &self.values
    }

    pub fn into_values(self) -> Vec<BigInt> {
        self.values
    }

    /// Appends values for indices `len()..len() + values.len()`.
    pub fn extend(&mut self, values: impl IntoIterator<Item = BigInt>) {
        self.values.extend(values);
    }

    /// Keeps only the first `n` values.
    pub fn truncate(&mut self, n: u64) {
        self.values.truncate(usize::try_from(n).unwrap_or(usize::MAX));
    }

    /// True when `self` starts with every value of `other`.
    pub fn starts_with(&self, other: &Sequence) -> bool {
        self.values.starts_with(&other.values)
    }
}

impl From<Vec<BigInt>> for Sequence {
    fn from(values: Vec<BigInt>) -> Self {
        Self { values }
    }
}

impl FromIterator<BigInt> for Sequence {
    fn from_iter<I: IntoIterator<Item = BigInt>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
